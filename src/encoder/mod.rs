//! Encode half of the event-code state machine.
//!
//! Push model: every `encode_*` call selects the first matching production
//! of the current rule (declared before namespace wildcard before generic
//! before undeclared), writes its event code and content, and moves the
//! traversal exactly as the decoder does when reading it back.
//!
//! Events whose fidelity option is off are dropped with an
//! [`Error::EventNotPreserved`] warning.

use std::borrow::Cow;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use crate::channel::{BitEncoderChannel, ByteEncoderChannel, EncoderChannel};
use crate::coder::BodyCoder;
use crate::datatype::{self, Datatype, Value, ValueCodec};
use crate::error::{Error, ErrorHandler, Result};
use crate::event::{
    DocType, Event, EventType, NamespaceDeclaration, ProcessingInstruction, XmlEvent,
};
use crate::event_code::{CodeEntry, CodeTable, EventCode};
use crate::grammar::{Grammar, RuleRef};
use crate::options::{CodingMode, ExiOptions};
use crate::qname::{self, QName};
use crate::string;

type Matcher<'m> = &'m dyn Fn(&CodeEntry) -> bool;

/// First production accepted by the matchers, tried in order.
fn select(table: &CodeTable, matchers: &[Matcher<'_>]) -> Option<(EventCode, CodeEntry)> {
    matchers
        .iter()
        .find_map(|matcher| {
            table.find(|entry| matcher(entry)).map(|(code, entry)| (code, entry.clone()))
        })
}

/// Stream encoder bound to one grammar.
///
/// Bind an output with [`set_output_stream`](Self::set_output_stream) or
/// [`set_output_channel`](Self::set_output_channel) before every document.
pub struct Encoder<'a> {
    coder: BodyCoder,
    channel: Option<Box<dyn EncoderChannel + 'a>>,
}

impl<'a> Encoder<'a> {
    /// Creates an encoder; no output is bound yet.
    ///
    /// # Errors
    ///
    /// `InvalidOptionCombination` if `options` do not validate.
    pub fn new(grammar: Arc<Grammar>, options: ExiOptions) -> Result<Self> {
        Ok(Self { coder: BodyCoder::new(grammar, options)?, channel: None })
    }

    /// Options of this encoder.
    pub fn options(&self) -> &ExiOptions {
        &self.coder.options
    }

    /// Replaces the warning sink.
    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.coder.set_error_handler(handler);
    }

    /// Replaces the value codec catalog.
    pub fn set_value_codec(&mut self, codec: Box<dyn ValueCodec>) {
        self.coder.value_codec = codec;
    }

    /// Binds a byte sink with the channel matching the coding mode and
    /// starts a new run.
    pub fn set_output_stream<W: Write + 'a>(&mut self, sink: W) {
        let channel: Box<dyn EncoderChannel + 'a> = match self.coder.options.coding_mode() {
            CodingMode::BitPacked => Box::new(BitEncoderChannel::new(sink)),
            CodingMode::BytePacked => Box::new(ByteEncoderChannel::new(sink)),
        };
        self.set_output_channel(channel);
    }

    /// Binds a pre-built channel and starts a new run.
    pub fn set_output_channel(&mut self, channel: Box<dyn EncoderChannel + 'a>) {
        log::debug!("encoder bound to {:?} channel", channel.coding_mode());
        self.channel = Some(channel);
        self.coder.init_for_each_run();
    }

    fn channel<'c>(
        channel: &'c mut Option<Box<dyn EncoderChannel + 'a>>,
    ) -> Result<&'c mut (dyn EncoderChannel + 'a)> {
        channel.as_deref_mut().ok_or(Error::ChannelNotBound)
    }

    fn not_allowed(&self, event: &'static str) -> Error {
        let current = self.coder.traversal.current_rule();
        Error::EventNotAllowed {
            event: Cow::Borrowed(event),
            grammar_state: Cow::Owned(format!("{:?}", self.coder.traversal.rule(current).kind())),
        }
    }

    // Sucht die Produktion, ohne etwas zu schreiben
    fn production(
        &self,
        event: &'static str,
        matchers: &[Matcher<'_>],
    ) -> Result<(CodeTable, EventCode, CodeEntry)> {
        let table = self.coder.code_table();
        match select(&table, matchers) {
            Some((code, entry)) => Ok((table, code, entry)),
            None => Err(self.not_allowed(event)),
        }
    }

    fn write_code(&mut self, table: &CodeTable, code: &EventCode) -> Result<()> {
        table.encode(Self::channel(&mut self.channel)?, code)
    }

    fn advance(&mut self, next: Option<RuleRef>) {
        if let Some(next) = next {
            self.coder.traversal.set_current_rule(next);
        }
    }

    // Lexikalischen oder fremd typisierten Wert in den Zieltyp bringen
    fn coerce(&self, datatype: &Datatype, value: &Value) -> Result<Value> {
        let codec = &self.coder.value_codec;
        let coerced = match (datatype, value) {
            (Datatype::QName, Value::QName(_)) => Some(value.clone()),
            (Datatype::QName, _) => None,
            (_, Value::String(lexical)) => codec.parse(datatype, lexical),
            (_, other) => codec.parse(datatype, &other.to_string()),
        };
        coerced.ok_or_else(|| Error::InvalidValue(format!("'{value}' is not a valid {datatype:?}")))
    }

    /// Writes SD.
    pub fn encode_start_document(&mut self) -> Result<()> {
        let (table, code, entry) =
            self.production("SD", &[&|e: &CodeEntry| e.event_type == EventType::StartDocument])?;
        self.write_code(&table, &code)?;
        self.advance(entry.next);
        Ok(())
    }

    /// Writes ED and flushes the channel.
    pub fn encode_end_document(&mut self) -> Result<()> {
        let (table, code, _) =
            self.production("ED", &[&|e: &CodeEntry| e.event_type == EventType::EndDocument])?;
        self.write_code(&table, &code)?;
        Self::channel(&mut self.channel)?.flush()?;
        log::debug!("encoder finished document");
        Ok(())
    }

    /// Writes SE for `qname`.
    pub fn encode_start_element(&mut self, qname: &QName) -> Result<()> {
        let (table, code, entry) = self.production(
            "SE",
            &[
                &|e: &CodeEntry| {
                    matches!(&e.event, Some(Event::StartElement(decl)) if decl.qname == *qname)
                },
                &|e: &CodeEntry| {
                    matches!(&e.event, Some(Event::StartElementNs(uri)) if *uri == qname.uri)
                },
                &|e: &CodeEntry| e.event_type == EventType::StartElementGeneric,
                &|e: &CodeEntry| e.event_type == EventType::StartElementGenericUndeclared,
            ],
        )?;
        let rule = self.coder.traversal.current_rule();
        let preserve = self.coder.preserve_prefixes();
        self.write_code(&table, &code)?;

        let channel = Self::channel(&mut self.channel)?;
        let names = &mut self.coder.string_table;
        let traversal = &mut self.coder.traversal;
        let decl = match &entry.event {
            Some(Event::StartElement(decl)) => {
                qname::encode_declared_qname(channel, names, qname, preserve)?;
                Arc::clone(decl)
            }
            Some(Event::StartElementNs(_)) => {
                qname::encode_local_qname(channel, names, qname, preserve)?;
                traversal.resolve_or_create_generic_start_element(qname)
            }
            _ => {
                qname::encode_qname(channel, names, qname, preserve)?;
                traversal.resolve_or_create_generic_start_element(qname)
            }
        };
        if entry.event_type.is_undeclared() {
            traversal.learn(rule, Event::StartElement(Arc::clone(&decl)));
        }
        traversal.push_element(&decl, qname.clone(), entry.next.unwrap_or(rule));
        Ok(())
    }

    /// Writes EE.
    pub fn encode_end_element(&mut self) -> Result<()> {
        let (table, code, entry) = self.production(
            "EE",
            &[
                &|e: &CodeEntry| e.event_type == EventType::EndElement,
                &|e: &CodeEntry| e.event_type == EventType::EndElementUndeclared,
            ],
        )?;
        let rule = self.coder.traversal.current_rule();
        self.write_code(&table, &code)?;
        if entry.event_type.is_undeclared() {
            self.coder.traversal.learn(rule, Event::EndElement);
        }
        self.coder.traversal.pop_element()?;
        Ok(())
    }

    /// Writes AT from a lexical value.
    ///
    /// An xsi:type value `prefix:local` is resolved against the in-scope
    /// namespace declarations; an unprefixed name without a default
    /// namespace binding is in no namespace.
    pub fn encode_attribute(&mut self, qname: &QName, lexical: &str) -> Result<()> {
        if qname.is_xsi_type() {
            let (prefix, local) = qname::split_lexical(lexical.trim());
            let uri = match self.coder.traversal.resolve_uri(prefix) {
                Some(uri) => uri,
                None if prefix.is_empty() => Arc::from(""),
                None => return Err(Error::UnresolvablePrefix(prefix.to_string())),
            };
            return self.encode_attribute_value(qname, &datatype::qname_value(uri, prefix, local));
        }
        self.encode_attribute_value(qname, &Value::String(Rc::from(lexical)))
    }

    /// Writes AT with an already typed value.
    pub fn encode_attribute_value(&mut self, qname: &QName, value: &Value) -> Result<()> {
        let xsi_type = qname.is_xsi_type();
        let xsi_nil = qname.is_xsi_nil();
        let (table, code, entry) = self.production(
            "AT",
            &[
                &|e: &CodeEntry| {
                    matches!(&e.event, Some(Event::Attribute(decl)) if decl.qname == *qname)
                },
                &|e: &CodeEntry| xsi_type && e.event_type == EventType::AttributeXsiType,
                &|e: &CodeEntry| xsi_nil && e.event_type == EventType::AttributeXsiNil,
                &|e: &CodeEntry| {
                    matches!(&e.event, Some(Event::AttributeNs(uri)) if *uri == qname.uri)
                },
                &|e: &CodeEntry| e.event_type == EventType::AttributeGeneric,
                &|e: &CodeEntry| e.event_type == EventType::AttributeGenericUndeclared,
            ],
        )?;
        let rule = self.coder.traversal.current_rule();
        let schema_informed = self.coder.traversal.rule(rule).is_schema_informed();
        let datatype = if xsi_type {
            Datatype::QName
        } else if xsi_nil && schema_informed {
            Datatype::Boolean
        } else {
            self.coder.attribute_datatype(entry.event.as_ref(), qname)
        };
        let value = self.coerce(&datatype, value)?;
        let plain = !xsi_type && !(xsi_nil && schema_informed);

        let preserve = self.coder.preserve_prefixes();
        self.write_code(&table, &code)?;
        let channel = Self::channel(&mut self.channel)?;
        let names = &mut self.coder.string_table;
        match (entry.event_type, &entry.event) {
            (_, Some(Event::Attribute(_)))
            | (EventType::AttributeXsiType | EventType::AttributeXsiNil, _) => {
                qname::encode_declared_qname(channel, names, qname, preserve)?;
            }
            (_, Some(Event::AttributeNs(_))) => {
                qname::encode_local_qname(channel, names, qname, preserve)?
            }
            _ => qname::encode_qname(channel, names, qname, preserve)?,
        }
        if entry.event_type.is_undeclared() && plain {
            self.coder.traversal.learn(rule, Event::attribute(qname.clone(), datatype.clone()));
        }

        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        self.coder.value_codec.write_value(&datatype, &value, channel, qname, table)?;
        self.advance(entry.next);
        let redirect = if xsi_type {
            self.coder.xsi_type_redirect(&value)
        } else if !plain {
            self.coder.xsi_nil_redirect(rule, &value)
        } else {
            None
        };
        self.advance(redirect);
        Ok(())
    }

    /// Writes CH from a lexical value.
    pub fn encode_characters(&mut self, lexical: &str) -> Result<()> {
        self.encode_characters_value(&Value::String(Rc::from(lexical)))
    }

    /// Writes CH.
    ///
    /// A typed CH production is used when the value fits its datatype;
    /// otherwise non-strict grammars fall back to untyped CH.
    pub fn encode_characters_value(&mut self, value: &Value) -> Result<()> {
        let table = self.coder.code_table();
        let mut typed = None;
        if let Some((code, entry)) = table.find(|e| e.event_type == EventType::Characters)
            && let Some(Event::Characters(datatype)) = &entry.event
        {
            match self.coerce(datatype, value) {
                Ok(coerced) => typed = Some((code, entry.clone(), datatype.clone(), coerced)),
                Err(err) if self.coder.options.strict() => return Err(err),
                Err(_) => log::trace!("CH value does not fit {datatype:?}, using untyped CH"),
            }
        }
        let (code, entry, datatype, value) = match typed {
            Some(found) => found,
            None => {
                let (code, entry) = select(
                    &table,
                    &[
                        &|e: &CodeEntry| e.event_type == EventType::CharactersGeneric,
                        &|e: &CodeEntry| e.event_type == EventType::CharactersGenericUndeclared,
                    ],
                )
                .ok_or_else(|| self.not_allowed("CH"))?;
                (code, entry, Datatype::String, self.coerce(&Datatype::String, value)?)
            }
        };

        let rule = self.coder.traversal.current_rule();
        self.write_code(&table, &code)?;
        if entry.event_type.is_undeclared() {
            self.coder.traversal.learn(rule, Event::CharactersGeneric);
        }
        let context = self.coder.value_context();
        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        self.coder.value_codec.write_value(&datatype, &value, channel, &context, table)?;
        self.advance(entry.next);
        Ok(())
    }

    /// Writes NS (with preserved prefixes) and binds the prefix in the
    /// current element either way.
    ///
    /// `local_element_ns` is derived: it is set exactly when the declaration
    /// binds the prefix and URI of the current element's name.
    pub fn encode_namespace_declaration(&mut self, decl: &NamespaceDeclaration) -> Result<()> {
        let local_element_ns = self.coder.traversal.element_qname().is_some_and(|element| {
            element.uri == decl.uri && element.prefix.as_deref() == Some(&*decl.prefix)
        });
        let decl = NamespaceDeclaration { local_element_ns, ..decl.clone() };
        if !self.coder.preserve_prefixes() {
            return self.coder.traversal.declare_prefix(decl);
        }
        let (table, code, entry) = self.production(
            "NS",
            &[&|e: &CodeEntry| e.event_type == EventType::NamespaceDeclaration],
        )?;
        self.write_code(&table, &code)?;
        let channel = Self::channel(&mut self.channel)?;
        qname::encode_namespace_declaration(channel, &mut self.coder.string_table, &decl)?;
        self.coder.traversal.declare_prefix(decl)?;
        self.advance(entry.next);
        Ok(())
    }

    // Gemeinsamer Pfad fuer CM, PI, DT und ER: nur Strings als Inhalt
    fn encode_strings(
        &mut self,
        event: &'static str,
        event_type: EventType,
        preserved: bool,
        parts: &[&str],
    ) -> Result<()> {
        if !preserved {
            self.coder.throw_warning(Error::EventNotPreserved(event));
            return Ok(());
        }
        let (table, code, entry) =
            self.production(event, &[&|e: &CodeEntry| e.event_type == event_type])?;
        self.write_code(&table, &code)?;
        let channel = Self::channel(&mut self.channel)?;
        for part in parts {
            string::encode(channel, part)?;
        }
        self.advance(entry.next);
        Ok(())
    }

    /// Writes CM.
    pub fn encode_comment(&mut self, text: &str) -> Result<()> {
        let preserved = self.coder.options.preserve().comments;
        self.encode_strings("CM", EventType::Comment, preserved, &[text])
    }

    /// Writes PI.
    pub fn encode_processing_instruction(&mut self, pi: &ProcessingInstruction) -> Result<()> {
        let preserved = self.coder.options.preserve().pis;
        let parts = [pi.target.as_str(), pi.data.as_str()];
        self.encode_strings("PI", EventType::ProcessingInstruction, preserved, &parts)
    }

    /// Writes DT.
    pub fn encode_doctype(&mut self, doctype: &DocType) -> Result<()> {
        let preserved = self.coder.options.preserve().dtd;
        let parts = [
            doctype.name.as_str(),
            doctype.public_id.as_str(),
            doctype.system_id.as_str(),
            doctype.text.as_str(),
        ];
        self.encode_strings("DT", EventType::DocType, preserved, &parts)
    }

    /// Writes ER.
    pub fn encode_entity_reference(&mut self, name: &str) -> Result<()> {
        let preserved = self.coder.options.preserve().dtd;
        self.encode_strings("ER", EventType::EntityReference, preserved, &[name])
    }

    /// Name of the innermost open element.
    pub fn element_qname(&self) -> Option<&QName> {
        self.coder.traversal.element_qname()
    }

    /// Nearest in-scope binding of `prefix`.
    pub fn resolve_uri(&self, prefix: &str) -> Option<Arc<str>> {
        self.coder.traversal.resolve_uri(prefix)
    }

    /// Encodes one event.
    pub fn encode_event(&mut self, event: &XmlEvent) -> Result<()> {
        match event {
            XmlEvent::StartDocument => self.encode_start_document(),
            XmlEvent::EndDocument => self.encode_end_document(),
            XmlEvent::StartElement(qname) => self.encode_start_element(qname),
            XmlEvent::EndElement => self.encode_end_element(),
            XmlEvent::Attribute { qname, value: Value::String(lexical) } => {
                self.encode_attribute(qname, lexical)
            }
            XmlEvent::Attribute { qname, value } => self.encode_attribute_value(qname, value),
            XmlEvent::Characters(value) => self.encode_characters_value(value),
            XmlEvent::NamespaceDeclaration(decl) => self.encode_namespace_declaration(decl),
            XmlEvent::Comment(text) => self.encode_comment(text),
            XmlEvent::ProcessingInstruction(pi) => self.encode_processing_instruction(pi),
            XmlEvent::DocType(doctype) => self.encode_doctype(doctype),
            XmlEvent::EntityReference(name) => self.encode_entity_reference(name),
        }
    }
}

/// Encodes `events` into a new buffer.
///
/// # Errors
///
/// Any fatal encode error.
pub fn encode(grammar: Arc<Grammar>, options: ExiOptions, events: &[XmlEvent]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = Encoder::new(grammar, options)?;
        encoder.set_output_stream(&mut out);
        for event in events {
            encoder.encode_event(event)?;
        }
    }
    Ok(out)
}
