//! Round-trip tests over the public API: encode a stream of events, decode
//! the bytes with an identically configured decoder, compare.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use exi_stream::channel::{
    BitDecoderChannel, BitEncoderChannel, ByteDecoderChannel, ByteEncoderChannel, DecoderChannel,
    EncoderChannel,
};
use exi_stream::{
    CodingMode, Datatype, Decoder, DocType, Encoder, Event, ExiOptions, Grammar, GrammarBuilder,
    NamespaceDeclaration, Preserve, ProcessingInstruction, Profile, QName, RuleKind, Value,
    XmlEvent, decode, encode,
};

fn se(local: &str) -> XmlEvent {
    XmlEvent::StartElement(QName::new("", local))
}

fn ee() -> XmlEvent {
    XmlEvent::EndElement
}

fn ch(text: &str) -> XmlEvent {
    XmlEvent::Characters(Value::String(Rc::from(text)))
}

fn at(local: &str, value: &str) -> XmlEvent {
    XmlEvent::Attribute { qname: QName::new("", local), value: Value::String(Rc::from(value)) }
}

fn document(body: Vec<XmlEvent>) -> Vec<XmlEvent> {
    let mut events = vec![XmlEvent::StartDocument];
    events.extend(body);
    events.push(XmlEvent::EndDocument);
    events
}

fn roundtrip(grammar: &Arc<Grammar>, options: &ExiOptions, events: &[XmlEvent]) -> Vec<XmlEvent> {
    let bytes = encode(grammar.clone(), options.clone(), events).unwrap();
    decode(grammar.clone(), options.clone(), &bytes).unwrap()
}

fn catalog() -> Vec<XmlEvent> {
    document(vec![
        se("catalog"),
        at("version", "2"),
        se("book"),
        at("id", "b1"),
        at("lang", "en"),
        se("title"),
        ch("Rust"),
        ee(),
        se("price"),
        ch("39.90"),
        ee(),
        ee(),
        se("book"),
        at("id", "b2"),
        at("lang", "en"),
        se("title"),
        ch("Rust"),
        ee(),
        se("price"),
        ch("12.00"),
        ee(),
        ee(),
        ee(),
    ])
}

// ============================================================================
// Schema-less
// ============================================================================

#[test]
fn schema_less_bit_packed() {
    let events = catalog();
    assert_eq!(roundtrip(&Grammar::schema_less(), &ExiOptions::default(), &events), events);
}

#[test]
fn schema_less_byte_packed() {
    let events = catalog();
    let options = ExiOptions::default().with_coding_mode(CodingMode::BytePacked);
    assert_eq!(roundtrip(&Grammar::schema_less(), &options, &events), events);
}

#[test]
fn repeated_values_compress() {
    let grammar = Grammar::schema_less();
    let once = document(vec![se("r"), se("v"), ch("some longer text value"), ee(), ee()]);
    let mut body = vec![se("r")];
    for _ in 0..10 {
        body.extend([se("v"), ch("some longer text value"), ee()]);
    }
    body.push(ee());
    let many = document(body);

    let one = encode(grammar.clone(), ExiOptions::default(), &once).unwrap();
    let ten = encode(grammar.clone(), ExiOptions::default(), &many).unwrap();
    // Wiederholungen kosten nur Event Code + Compact ID
    assert!(ten.len() < one.len() + 9 * 4, "{} vs {}", ten.len(), one.len());
    assert_eq!(decode(grammar, ExiOptions::default(), &ten).unwrap(), many);
}

#[test]
fn fragment_with_several_roots() {
    let options = ExiOptions::default().with_fragment();
    let events = document(vec![se("a"), ch("1"), ee(), se("b"), ee(), se("a"), ee()]);
    assert_eq!(roundtrip(&Grammar::schema_less(), &options, &events), events);
}

#[test]
fn deep_nesting() {
    let mut body = Vec::new();
    for i in 0..200 {
        body.push(se(&format!("e{}", i % 7)));
    }
    body.push(ch("leaf"));
    body.extend((0..200).map(|_| ee()));
    let events = document(body);
    assert_eq!(roundtrip(&Grammar::schema_less(), &ExiOptions::default(), &events), events);
}

#[test]
fn bounded_value_table() {
    let mut body = vec![se("r")];
    for i in 0..40 {
        body.extend([se("v"), ch(&format!("value-{}", i % 5)), ee()]);
        body.push(filler_text(i));
    }
    body.push(ee());
    let events = document(body);

    let grammar = Grammar::schema_less();
    for options in [
        ExiOptions::default().with_value_partition_capacity(3),
        ExiOptions::default().with_value_partition_capacity(0),
        ExiOptions::default().with_value_max_length(5),
        ExiOptions::default().with_value_partition_capacity(2).with_value_max_length(8),
    ] {
        assert_eq!(roundtrip(&grammar, &options, &events), events, "{options:?}");
    }
}

fn filler_text(i: usize) -> XmlEvent {
    ch(if i % 3 == 0 { "" } else { "tail" })
}

// ============================================================================
// Fidelity
// ============================================================================

#[test]
fn comments_and_pis_preserved() {
    let preserve = Preserve { comments: true, pis: true, ..Default::default() };
    let options = ExiOptions::default().with_preserve(preserve);
    let pi =
        ProcessingInstruction { target: "xml-stylesheet".into(), data: "href=\"a.css\"".into() };
    let events = document(vec![
        XmlEvent::Comment("head".into()),
        XmlEvent::ProcessingInstruction(pi.clone()),
        se("a"),
        XmlEvent::Comment("in start tag".into()),
        at("x", "1"),
        ch("t"),
        XmlEvent::ProcessingInstruction(pi),
        ee(),
        XmlEvent::Comment("tail".into()),
    ]);
    assert_eq!(roundtrip(&Grammar::schema_less(), &options, &events), events);
}

#[test]
fn comments_dropped_by_default() {
    let events = document(vec![
        XmlEvent::Comment("head".into()),
        se("a"),
        XmlEvent::Comment("c".into()),
        ee(),
    ]);
    let decoded = roundtrip(&Grammar::schema_less(), &ExiOptions::default(), &events);
    assert_eq!(decoded, document(vec![se("a"), ee()]));
}

#[test]
fn doctype_and_entity_references() {
    let options = ExiOptions::default().with_preserve(Preserve { dtd: true, ..Default::default() });
    let doctype = DocType {
        name: "note".into(),
        public_id: String::new(),
        system_id: "note.dtd".into(),
        text: "<!ENTITY w \"world\">".into(),
    };
    let events = document(vec![
        XmlEvent::DocType(doctype),
        se("note"),
        ch("hello "),
        XmlEvent::EntityReference("w".into()),
        ee(),
    ]);
    assert_eq!(roundtrip(&Grammar::schema_less(), &options, &events), events);
}

fn preserve_prefixes() -> ExiOptions {
    ExiOptions::default().with_preserve(Preserve { prefixes: true, ..Default::default() })
}

/// Prefix jedes SE/AT/NS-Events; `QName`-Gleichheit ignoriert ihn.
fn prefixes(events: &[XmlEvent]) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|event| match event {
            XmlEvent::StartElement(qname) | XmlEvent::Attribute { qname, .. } => {
                Some(qname.prefix.as_deref().map(str::to_string))
            }
            XmlEvent::NamespaceDeclaration(decl) => Some(Some(decl.prefix.to_string())),
            _ => None,
        })
        .collect()
}

fn local_ns(prefix: &str, uri: &str) -> NamespaceDeclaration {
    NamespaceDeclaration { local_element_ns: true, ..NamespaceDeclaration::new(prefix, uri) }
}

#[test]
fn prefixes_preserved() {
    let events = document(vec![
        XmlEvent::StartElement(QName::with_prefix("urn:p", "root", "p")),
        XmlEvent::NamespaceDeclaration(NamespaceDeclaration::new("p", "urn:p")),
        XmlEvent::Attribute {
            qname: QName::with_prefix("urn:p", "x", "p"),
            value: Value::String(Rc::from("1")),
        },
        XmlEvent::StartElement(QName::with_prefix("urn:p", "child", "p")),
        ee(),
        ee(),
    ]);
    let decoded = roundtrip(&Grammar::schema_less(), &preserve_prefixes(), &events);

    // Das NS nennt den Prefix des Wurzelelements
    let mut expected = events.clone();
    expected[2] = XmlEvent::NamespaceDeclaration(local_ns("p", "urn:p"));
    assert_eq!(decoded, expected);
    let p = Some("p".to_string());
    assert_eq!(prefixes(&decoded), [p.clone(), p.clone(), p.clone(), p]);
}

/// Ein neuer Prefix fuer eine URI mit schon bekanntem Prefix kommt erst mit
/// dem NS des Elements. Die leere URI hat den Prefix "" von Anfang an.
#[test]
fn second_prefix_for_known_uri() {
    let events = document(vec![
        XmlEvent::StartElement(QName::with_prefix("urn:p", "root", "p")),
        XmlEvent::NamespaceDeclaration(NamespaceDeclaration::new("p", "urn:p")),
        XmlEvent::StartElement(QName::with_prefix("urn:p", "child", "q")),
        XmlEvent::NamespaceDeclaration(NamespaceDeclaration::new("o", "urn:other")),
        XmlEvent::NamespaceDeclaration(NamespaceDeclaration::new("q", "urn:p")),
        XmlEvent::StartElement(QName::new("", "plain")),
        ee(),
        ee(),
        ee(),
    ]);
    let decoded = roundtrip(&Grammar::schema_less(), &preserve_prefixes(), &events);

    assert_eq!(decoded[2], XmlEvent::NamespaceDeclaration(local_ns("p", "urn:p")));
    let other = NamespaceDeclaration::new("o", "urn:other");
    assert_eq!(decoded[4], XmlEvent::NamespaceDeclaration(other));
    assert_eq!(decoded[5], XmlEvent::NamespaceDeclaration(local_ns("q", "urn:p")));
    let some = |p: &str| Some(p.to_string());
    assert_eq!(
        prefixes(&decoded),
        [some("p"), some("p"), some("q"), some("o"), some("q"), some("")]
    );
}

// ============================================================================
// Schema-informed
// ============================================================================

/// `order` mit Pflichtattributen `id` (unsigned) und `qty` (0..100), dann
/// beliebig viele nillable `item`-Elemente mit Integer-Inhalt.
fn order_grammar() -> Arc<Grammar> {
    let mut b = GrammarBuilder::new();
    let order_start = b.add_rule(RuleKind::TypeStart);
    let order_attrs = b.add_rule(RuleKind::TypeAttributes);
    let order_content = b.add_rule(RuleKind::TypeContent);
    let item_start = b.add_rule(RuleKind::TypeStart);
    let item_end = b.add_rule(RuleKind::TypeContent);
    let item_empty = b.add_rule(RuleKind::TypeStart);

    let item = b.element(QName::new("urn:o", "item"), item_start);
    let qty = Datatype::bounded_integer(0, 100).unwrap();
    let id = Event::attribute(QName::new("", "id"), Datatype::UnsignedInteger);
    b.push(order_start, id, Some(order_attrs)).unwrap();
    b.push(order_attrs, Event::attribute(QName::new("", "qty"), qty), Some(order_content)).unwrap();
    b.push(order_content, Event::StartElement(item), Some(order_content)).unwrap();
    b.push(order_content, Event::EndElement, None).unwrap();
    b.set_content(order_start, order_content).unwrap();
    b.set_content(order_attrs, order_content).unwrap();

    b.push(item_start, Event::Characters(Datatype::Integer), Some(item_end)).unwrap();
    b.push(item_end, Event::EndElement, None).unwrap();
    b.push(item_empty, Event::EndElement, None).unwrap();
    b.set_content(item_start, item_end).unwrap();
    b.set_nillable(item_start, item_empty).unwrap();

    let order = b.element(QName::new("urn:o", "order"), order_start);
    b.global_element(order);
    b.build().unwrap()
}

fn order(id: &str, qty: &str, items: &[&str]) -> Vec<XmlEvent> {
    let mut body =
        vec![XmlEvent::StartElement(QName::new("urn:o", "order")), at("id", id), at("qty", qty)];
    for item in items {
        body.push(XmlEvent::StartElement(QName::new("urn:o", "item")));
        if item.is_empty() {
            body.push(XmlEvent::Attribute {
                qname: QName::xsi_nil(),
                value: Value::String(Rc::from("true")),
            });
        } else {
            body.push(ch(item));
        }
        body.push(ee());
    }
    body.push(ee());
    document(body)
}

fn typed(events: Vec<XmlEvent>) -> Vec<XmlEvent> {
    events
        .into_iter()
        .map(|event| match event {
            XmlEvent::Attribute { qname, value: Value::String(s) } => {
                let value = match qname.local_name.as_ref() {
                    "id" => Value::UnsignedInteger(s.trim().parse().unwrap()),
                    "qty" => Value::Integer(s.trim().parse().unwrap()),
                    _ => Value::Boolean(s.as_ref() == "true"),
                };
                XmlEvent::Attribute { qname, value }
            }
            XmlEvent::Characters(Value::String(s)) => {
                XmlEvent::Characters(Value::Integer(s.trim().parse().unwrap()))
            }
            other => other,
        })
        .collect()
}

#[test]
fn schema_informed_typed_values() {
    let grammar = order_grammar();
    let events = order("17", "42", &["-5", "", "3"]);
    assert_eq!(roundtrip(&grammar, &ExiOptions::default(), &events), typed(events));
}

#[test]
fn schema_informed_strict() {
    let grammar = order_grammar();
    let options = ExiOptions::default().with_strict();
    let events = order("1", "100", &["", "9000000000"]);
    assert_eq!(roundtrip(&grammar, &options, &events), typed(events));

    // qty ausserhalb 0..100 laesst sich nicht typisiert codieren
    let invalid = order("1", "101", &[]);
    assert!(encode(grammar, options, &invalid).is_err());
}

#[test]
fn schema_informed_lexical_values() {
    let grammar = order_grammar();
    let preserve = Preserve { lexical_values: true, ..Default::default() };
    let options = ExiOptions::default().with_preserve(preserve);
    let events = order(" 17", "042", &["+5", "", "3 "]);
    assert_eq!(roundtrip(&grammar, &options, &events), events);
}

#[test]
fn schema_informed_undeclared_content() {
    let grammar = order_grammar();
    let events = document(vec![
        XmlEvent::StartElement(QName::new("urn:o", "order")),
        at("id", "1"),
        at("qty", "2"),
        se("note"),
        ch("free text"),
        ee(),
        ch("trailing"),
        ee(),
    ]);
    let decoded = roundtrip(&grammar, &ExiOptions::default(), &events);
    assert_eq!(decoded, typed_attributes_only(events));
}

fn typed_attributes_only(events: Vec<XmlEvent>) -> Vec<XmlEvent> {
    events
        .into_iter()
        .map(|event| match event {
            XmlEvent::Attribute { qname, value: Value::String(s) }
                if qname.local_name.as_ref() == "id" =>
            {
                XmlEvent::Attribute { qname, value: Value::UnsignedInteger(s.parse().unwrap()) }
            }
            XmlEvent::Attribute { qname, value: Value::String(s) } => {
                XmlEvent::Attribute { qname, value: Value::Integer(s.parse().unwrap()) }
            }
            other => other,
        })
        .collect()
}

#[test]
fn xsi_type_switches_grammar() {
    let mut b = GrammarBuilder::new();
    let short = b.add_rule(RuleKind::TypeStart);
    let short_end = b.add_rule(RuleKind::TypeContent);
    b.push(short, Event::Characters(Datatype::Integer), Some(short_end)).unwrap();
    b.push(short_end, Event::EndElement, None).unwrap();
    b.named_type(QName::new("urn:t", "short"), short);
    let grammar = b.build().unwrap();

    let events = document(vec![
        se("v"),
        XmlEvent::NamespaceDeclaration(NamespaceDeclaration::new("t", "urn:t")),
        XmlEvent::Attribute { qname: QName::xsi_type(), value: Value::String(Rc::from("t:short")) },
        ch("12"),
        ee(),
    ]);
    let decoded = roundtrip(&grammar, &ExiOptions::default(), &events);
    assert_eq!(
        decoded,
        document(vec![
            se("v"),
            XmlEvent::Attribute {
                qname: QName::xsi_type(),
                value: Value::QName(QName::new("urn:t", "short")),
            },
            XmlEvent::Characters(Value::Integer(12)),
            ee(),
        ])
    );
}

// ============================================================================
// Profile und Instanz-Wiederverwendung
// ============================================================================

#[test]
fn ultra_constrained_profile() {
    let options = ExiOptions::default().with_profile(Profile::UltraConstrained);
    let events = catalog();
    assert_eq!(roundtrip(&Grammar::schema_less(), &options, &events), events);
}

/// Geteilter Puffer, damit ein Encoder mehrere Laeufe schreiben kann.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn encoder_reuse_is_deterministic() {
    let grammar = Grammar::schema_less();
    let events = catalog();
    let mut encoder = Encoder::new(grammar, ExiOptions::default()).unwrap();
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let buf = SharedBuf::default();
        encoder.set_output_stream(buf.clone());
        for event in &events {
            encoder.encode_event(event).unwrap();
        }
        outputs.push(buf.0.take());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert!(!outputs[0].is_empty());
}

// ============================================================================
// Eingebettete Kanaele
// ============================================================================

const HEADER: u32 = 0b10110;
const HEADER_BITS: u8 = 5;

fn bit(bytes: &[u8], index: usize) -> u8 {
    (bytes[index / 8] >> (7 - index % 8)) & 1
}

fn read_all(decoder: &mut Decoder<'_>) -> Vec<XmlEvent> {
    let mut events = Vec::new();
    while let Some(event) = decoder.read_event().unwrap() {
        events.push(event);
    }
    events
}

/// Der Body beginnt mitten im Byte hinter fremden Header-Bits.
#[test]
fn bit_packed_body_after_header_bits() {
    let grammar = Grammar::schema_less();
    let events = catalog();
    let mut out = Vec::new();
    {
        let mut channel = BitEncoderChannel::new(&mut out);
        channel.encode_n_bit_unsigned_integer(HEADER, HEADER_BITS).unwrap();
        let mut encoder = Encoder::new(grammar.clone(), ExiOptions::default()).unwrap();
        encoder.set_output_channel(Box::new(channel));
        for event in &events {
            encoder.encode_event(event).unwrap();
        }
    }

    // Gleiche Body-Bits wie allein, nur um den Header verschoben
    let plain = encode(grammar.clone(), ExiOptions::default(), &events).unwrap();
    assert_eq!(u32::from(out[0] >> (8 - HEADER_BITS)), HEADER);
    for i in 0..(plain.len() - 1) * 8 {
        assert_eq!(bit(&out, usize::from(HEADER_BITS) + i), bit(&plain, i), "bit {i}");
    }

    let mut channel = BitDecoderChannel::new(&out[..]);
    assert_eq!(channel.decode_n_bit_unsigned_integer(HEADER_BITS).unwrap(), HEADER);
    let mut decoder = Decoder::new(grammar, ExiOptions::default()).unwrap();
    decoder.set_input_channel(Box::new(channel));
    assert_eq!(read_all(&mut decoder), events);
}

/// Byte-packed: Header und Trailer bleiben unberuehrt.
#[test]
fn byte_packed_body_between_header_and_trailer() {
    let grammar = Grammar::schema_less();
    let options = ExiOptions::default().with_coding_mode(CodingMode::BytePacked);
    let events = catalog();
    let mut out = Vec::new();
    {
        let mut channel = ByteEncoderChannel::new(&mut out);
        channel.write_bytes(b"EXI$").unwrap();
        channel.encode_n_bit_unsigned_integer(HEADER, HEADER_BITS).unwrap();
        let mut encoder = Encoder::new(grammar.clone(), options.clone()).unwrap();
        encoder.set_output_channel(Box::new(channel));
        for event in &events {
            encoder.encode_event(event).unwrap();
        }
    }
    let plain = encode(grammar.clone(), options.clone(), &events).unwrap();
    assert_eq!(out[..5], [b'E', b'X', b'I', b'$', 0b10110]);
    assert_eq!(out[5..], plain[..]);
    out.extend_from_slice(b"tail");

    let mut rest = &out[..];
    {
        let mut channel = ByteDecoderChannel::new(&mut rest);
        let mut magic = [0u8; 4];
        channel.read_bytes(&mut magic).unwrap();
        assert_eq!(&magic, b"EXI$");
        assert_eq!(channel.decode_n_bit_unsigned_integer(HEADER_BITS).unwrap(), HEADER);
        let mut decoder = Decoder::new(grammar, options).unwrap();
        decoder.set_input_channel(Box::new(channel));
        assert_eq!(read_all(&mut decoder), events);
    }
    assert_eq!(rest, b"tail");
}

// ============================================================================
// Zufallsdokumente
// ============================================================================

/// Deterministischer xorshift64.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

const NAMES: [&str; 5] = ["a", "b", "item", "x", "long-element-name"];
const TEXTS: [&str; 6] = ["", "0", "hello", "hello", "ümlaut €", "a much longer piece of text"];

fn random_element(rng: &mut Rng, depth: usize, out: &mut Vec<XmlEvent>) {
    out.push(se(NAMES[rng.below(NAMES.len() as u64) as usize]));
    for i in 0..rng.below(3) {
        out.push(at(&format!("at{i}"), TEXTS[rng.below(TEXTS.len() as u64) as usize]));
    }
    let children = if depth > 5 { 0 } else { rng.below(4) };
    for _ in 0..children {
        if rng.below(3) == 0 {
            out.push(ch(TEXTS[rng.below(TEXTS.len() as u64) as usize]));
        } else {
            random_element(rng, depth + 1, out);
        }
    }
    out.push(ee());
}

#[test]
fn random_documents_roundtrip() {
    let grammar = Grammar::schema_less();
    let mut rng = Rng(0x2545_F491_4F6C_DD1D);
    for round in 0..50 {
        let mut body = Vec::new();
        random_element(&mut rng, 0, &mut body);
        let events = document(body);
        let options = match round % 4 {
            0 => ExiOptions::default(),
            1 => ExiOptions::default().with_coding_mode(CodingMode::BytePacked),
            2 => ExiOptions::default().with_value_partition_capacity(2),
            _ => ExiOptions::default().with_profile(Profile::UltraConstrained),
        };
        assert_eq!(roundtrip(&grammar, &options, &events), events, "round {round}");
    }
}
