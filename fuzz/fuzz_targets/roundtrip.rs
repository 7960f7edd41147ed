#![no_main]
use libfuzzer_sys::fuzz_target;

use std::rc::Rc;

use exi_stream::{ExiOptions, Grammar, QName, Value, XmlEvent};

const NAMES: [&str; 4] = ["a", "b", "c", "item"];

// Jedes Byte waehlt eine Aktion; das Ergebnis ist immer wohlgeformt.
fn events(data: &[u8]) -> Vec<XmlEvent> {
    let mut out = vec![XmlEvent::StartDocument, XmlEvent::StartElement(QName::new("", "root"))];
    let mut depth = 1usize;
    let mut in_start_tag = true;
    for &byte in data {
        let name = NAMES[usize::from(byte >> 6)];
        match byte & 3 {
            0 if depth < 64 => {
                out.push(XmlEvent::StartElement(QName::new("", name)));
                depth += 1;
                in_start_tag = true;
                continue;
            }
            1 if depth > 1 => {
                out.push(XmlEvent::EndElement);
                depth -= 1;
            }
            2 if in_start_tag => {
                out.push(XmlEvent::Attribute {
                    qname: QName::new("", format!("at{}", (byte >> 2) & 0xF)),
                    value: Value::String(Rc::from(name)),
                });
                continue;
            }
            _ => {
                let text = format!("{}", byte >> 2);
                out.push(XmlEvent::Characters(Value::String(Rc::from(text.as_str()))));
            }
        }
        in_start_tag = false;
    }
    out.extend(std::iter::repeat_n(XmlEvent::EndElement, depth));
    out.push(XmlEvent::EndDocument);
    out
}

fuzz_target!(|data: &[u8]| {
    let grammar = Grammar::schema_less();
    let events = events(data);
    // Doppelte Attributnamen sind erlaubt; der Coder prueft sie nicht
    let bytes =
        exi_stream::encode(grammar.clone(), ExiOptions::default(), &events).expect("encode");
    let decoded = exi_stream::decode(grammar, ExiOptions::default(), &bytes).expect("decode");
    assert_eq!(decoded, events);
});
