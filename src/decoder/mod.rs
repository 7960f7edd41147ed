//! Decode half of the event-code state machine.
//!
//! Pull model: [`Decoder::next`] resolves the next event code against the
//! current rule and reports its kind; exactly one matching `decode_*` call
//! then reads the event content and moves the traversal on. After ED,
//! `next` returns `Ok(None)`.
//!
//! # Beispiel
//!
//! ```
//! use exi_stream::decoder::decode;
//! use exi_stream::encoder::encode;
//! use exi_stream::event::XmlEvent;
//! use exi_stream::grammar::Grammar;
//! use exi_stream::options::ExiOptions;
//! use exi_stream::qname::QName;
//!
//! let events = vec![
//!     XmlEvent::StartDocument,
//!     XmlEvent::StartElement(QName::new("", "root")),
//!     XmlEvent::EndElement,
//!     XmlEvent::EndDocument,
//! ];
//! let grammar = Grammar::schema_less();
//! let bytes = encode(grammar.clone(), ExiOptions::default(), &events).unwrap();
//! let decoded = decode(grammar, ExiOptions::default(), &bytes).unwrap();
//! assert_eq!(decoded, events);
//! ```

use std::io::Read;
use std::sync::Arc;

use crate::channel::{BitDecoderChannel, ByteDecoderChannel, DecoderChannel};
use crate::coder::BodyCoder;
use crate::datatype::{Datatype, Value, ValueCodec};
use crate::error::{Error, ErrorHandler, Result};
use crate::event::{
    DocType, Event, EventType, NamespaceDeclaration, ProcessingInstruction, XmlEvent,
};
use crate::grammar::{Grammar, RuleRef};
use crate::options::{CodingMode, ExiOptions};
use crate::qname::{self, QName};
use crate::string;

/// The event code resolved by [`Decoder::next`], not yet consumed.
#[derive(Debug, Clone)]
struct Pending {
    event_type: EventType,
    event: Option<Event>,
    next: Option<RuleRef>,
    rule: RuleRef,
}

/// Welcher Sonderfall ein Attribut ist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XsiKind {
    Type,
    Nil,
    Plain,
}

/// Stream decoder bound to one grammar.
///
/// Re-bind an input with [`set_input_stream`](Self::set_input_stream) or
/// [`set_input_channel`](Self::set_input_channel) before every document;
/// after a fatal error the instance must be re-bound as well.
pub struct Decoder<'a> {
    coder: BodyCoder,
    channel: Option<Box<dyn DecoderChannel + 'a>>,
    pending: Option<Pending>,
    finished: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder; no input is bound yet.
    ///
    /// # Errors
    ///
    /// `InvalidOptionCombination` if `options` do not validate.
    pub fn new(grammar: Arc<Grammar>, options: ExiOptions) -> Result<Self> {
        Ok(Self {
            coder: BodyCoder::new(grammar, options)?,
            channel: None,
            pending: None,
            finished: false,
        })
    }

    /// Options of this decoder.
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

    /// Binds a byte source with the channel matching the coding mode and
    /// starts a new run.
    pub fn set_input_stream<R: Read + 'a>(&mut self, source: R) {
        let channel: Box<dyn DecoderChannel + 'a> = match self.coder.options.coding_mode() {
            CodingMode::BitPacked => Box::new(BitDecoderChannel::new(source)),
            CodingMode::BytePacked => Box::new(ByteDecoderChannel::new(source)),
        };
        self.set_input_channel(channel);
    }

    /// Binds a pre-built channel and starts a new run.
    pub fn set_input_channel(&mut self, channel: Box<dyn DecoderChannel + 'a>) {
        log::debug!("decoder bound to {:?} channel", channel.coding_mode());
        self.channel = Some(channel);
        self.pending = None;
        self.finished = false;
        self.coder.init_for_each_run();
    }

    fn channel<'c>(
        channel: &'c mut Option<Box<dyn DecoderChannel + 'a>>,
    ) -> Result<&'c mut (dyn DecoderChannel + 'a)> {
        channel.as_deref_mut().ok_or(Error::ChannelNotBound)
    }

    /// Resolves the next event code; `Ok(None)` once ED was decoded.
    ///
    /// Calling `next` again before the event is consumed returns the same
    /// kind without reading.
    ///
    /// # Errors
    ///
    /// `ChannelNotBound`, `InvalidEventCode` or `PrematureEndOfStream`.
    pub fn next(&mut self) -> Result<Option<EventType>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(pending) = &self.pending {
            return Ok(Some(pending.event_type));
        }
        let rule = self.coder.traversal.current_rule();
        let table = self.coder.code_table();
        let channel = Self::channel(&mut self.channel)?;
        let (_, entry) = table.decode(channel)?;
        let event_type = entry.event_type;
        self.pending =
            Some(Pending { event_type, event: entry.event.clone(), next: entry.next, rule });
        Ok(Some(event_type))
    }

    // Zustandspruefung vor jeder Mutation
    fn take_pending(&mut self, call: &'static str, allowed: &[EventType]) -> Result<Pending> {
        match self.pending.take() {
            Some(pending) if allowed.contains(&pending.event_type) => Ok(pending),
            other => {
                let pending = other.as_ref().map(|p| p.event_type);
                self.pending = other;
                Err(Error::DecodeState { call, pending })
            }
        }
    }

    fn advance(&mut self, next: Option<RuleRef>) {
        if let Some(next) = next {
            self.coder.traversal.set_current_rule(next);
        }
    }

    /// Consumes SD.
    pub fn decode_start_document(&mut self) -> Result<()> {
        let pending = self.take_pending("decode_start_document", &[EventType::StartDocument])?;
        self.advance(pending.next);
        Ok(())
    }

    /// Consumes ED; afterwards [`next`](Self::next) returns `Ok(None)`.
    pub fn decode_end_document(&mut self) -> Result<()> {
        self.take_pending("decode_end_document", &[EventType::EndDocument])?;
        self.finished = true;
        log::debug!("decoder reached end of document");
        Ok(())
    }

    /// Consumes SE and returns the element name.
    pub fn decode_start_element(&mut self) -> Result<QName> {
        let pending = self.take_pending(
            "decode_start_element",
            &[
                EventType::StartElement,
                EventType::StartElementNs,
                EventType::StartElementGeneric,
                EventType::StartElementGenericUndeclared,
            ],
        )?;
        let preserve = self.coder.preserve_prefixes();
        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        let traversal = &mut self.coder.traversal;
        let (qname, decl) = match &pending.event {
            Some(Event::StartElement(decl)) => {
                let qname = qname::decode_declared_qname(channel, table, &decl.qname, preserve)?;
                (qname, Arc::clone(decl))
            }
            Some(Event::StartElementNs(uri)) => {
                let qname = qname::decode_local_qname(channel, table, uri, preserve)?;
                let decl = traversal.resolve_or_create_generic_start_element(&qname);
                (qname, decl)
            }
            _ => {
                let qname = qname::decode_qname(channel, table, preserve)?;
                let decl = traversal.resolve_or_create_generic_start_element(&qname);
                (qname, decl)
            }
        };
        if pending.event_type.is_undeclared() {
            traversal.learn(pending.rule, Event::StartElement(Arc::clone(&decl)));
        }
        traversal.push_element(&decl, qname.clone(), pending.next.unwrap_or(pending.rule));
        Ok(qname)
    }

    /// Consumes EE and returns the name of the closed element.
    pub fn decode_end_element(&mut self) -> Result<QName> {
        let pending = self.take_pending(
            "decode_end_element",
            &[EventType::EndElement, EventType::EndElementUndeclared],
        )?;
        if pending.event_type.is_undeclared() {
            self.coder.traversal.learn(pending.rule, Event::EndElement);
        }
        let frame = self.coder.traversal.pop_element()?;
        frame.qname().cloned().ok_or(Error::StackUnderflow)
    }

    /// Consumes AT and returns name and value.
    ///
    /// xsi:type values are QNames and switch the element to the named
    /// type; xsi:nil values in schema-informed rules are booleans and `true`
    /// switches to the empty type.
    pub fn decode_attribute(&mut self) -> Result<(QName, Value)> {
        let pending = self.take_pending(
            "decode_attribute",
            &[
                EventType::Attribute,
                EventType::AttributeNs,
                EventType::AttributeGeneric,
                EventType::AttributeGenericUndeclared,
                EventType::AttributeXsiType,
                EventType::AttributeXsiNil,
            ],
        )?;
        let preserve = self.coder.preserve_prefixes();
        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        let qname = match (pending.event_type, &pending.event) {
            (_, Some(Event::Attribute(decl))) => {
                qname::decode_declared_qname(channel, table, &decl.qname, preserve)?
            }
            (_, Some(Event::AttributeNs(uri))) => {
                qname::decode_local_qname(channel, table, uri, preserve)?
            }
            (EventType::AttributeXsiType, _) => {
                qname::decode_declared_qname(channel, table, &QName::xsi_type(), preserve)?
            }
            (EventType::AttributeXsiNil, _) => {
                qname::decode_declared_qname(channel, table, &QName::xsi_nil(), preserve)?
            }
            _ => qname::decode_qname(channel, table, preserve)?,
        };

        let schema_informed = self.coder.traversal.rule(pending.rule).is_schema_informed();
        let (datatype, xsi) = if qname.is_xsi_type() {
            (Datatype::QName, XsiKind::Type)
        } else if qname.is_xsi_nil() && schema_informed {
            (Datatype::Boolean, XsiKind::Nil)
        } else {
            (self.coder.attribute_datatype(pending.event.as_ref(), &qname), XsiKind::Plain)
        };
        if pending.event_type.is_undeclared() && xsi == XsiKind::Plain {
            let learned = Event::attribute(qname.clone(), datatype.clone());
            self.coder.traversal.learn(pending.rule, learned);
        }

        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        let value = self.coder.value_codec.read_value(&datatype, channel, &qname, table)?;
        self.advance(pending.next);
        let redirect = match xsi {
            XsiKind::Type => self.coder.xsi_type_redirect(&value),
            XsiKind::Nil => self.coder.xsi_nil_redirect(pending.rule, &value),
            XsiKind::Plain => None,
        };
        self.advance(redirect);
        Ok((qname, value))
    }

    /// Consumes CH and returns the value.
    pub fn decode_characters(&mut self) -> Result<Value> {
        let pending = self.take_pending(
            "decode_characters",
            &[
                EventType::Characters,
                EventType::CharactersGeneric,
                EventType::CharactersGenericUndeclared,
            ],
        )?;
        let datatype = match &pending.event {
            Some(Event::Characters(datatype)) => datatype.clone(),
            _ => Datatype::String,
        };
        if pending.event_type.is_undeclared() {
            self.coder.traversal.learn(pending.rule, Event::CharactersGeneric);
        }
        let context = self.coder.value_context();
        let channel = Self::channel(&mut self.channel)?;
        let table = &mut self.coder.string_table;
        let value = self.coder.value_codec.read_value(&datatype, channel, &context, table)?;
        self.advance(pending.next);
        Ok(value)
    }

    /// Consumes NS and binds the prefix in the current element.
    ///
    /// A declaration with `local_element_ns` also supplies the prefix of the
    /// current element; see [`element_prefix`](Self::element_prefix).
    pub fn decode_namespace_declaration(&mut self) -> Result<NamespaceDeclaration> {
        let pending =
            self.take_pending("decode_namespace_declaration", &[EventType::NamespaceDeclaration])?;
        let channel = Self::channel(&mut self.channel)?;
        let decl = qname::decode_namespace_declaration(channel, &mut self.coder.string_table)?;
        self.coder.traversal.declare_prefix(decl.clone())?;
        self.advance(pending.next);
        Ok(decl)
    }

    /// Consumes CM.
    pub fn decode_comment(&mut self) -> Result<String> {
        let pending = self.take_pending("decode_comment", &[EventType::Comment])?;
        let text = string::decode(Self::channel(&mut self.channel)?)?;
        self.advance(pending.next);
        Ok(text)
    }

    /// Consumes PI.
    pub fn decode_processing_instruction(&mut self) -> Result<ProcessingInstruction> {
        let pending = self
            .take_pending("decode_processing_instruction", &[EventType::ProcessingInstruction])?;
        let channel = Self::channel(&mut self.channel)?;
        let target = string::decode(channel)?;
        let data = string::decode(channel)?;
        self.advance(pending.next);
        Ok(ProcessingInstruction { target, data })
    }

    /// Consumes DT.
    pub fn decode_doctype(&mut self) -> Result<DocType> {
        let pending = self.take_pending("decode_doctype", &[EventType::DocType])?;
        let channel = Self::channel(&mut self.channel)?;
        let doctype = DocType {
            name: string::decode(channel)?,
            public_id: string::decode(channel)?,
            system_id: string::decode(channel)?,
            text: string::decode(channel)?,
        };
        self.advance(pending.next);
        Ok(doctype)
    }

    /// Consumes ER and returns the entity name.
    pub fn decode_entity_reference(&mut self) -> Result<String> {
        let pending = self.take_pending("decode_entity_reference", &[EventType::EntityReference])?;
        let name = string::decode(Self::channel(&mut self.channel)?)?;
        self.advance(pending.next);
        Ok(name)
    }

    /// Name of the innermost open element.
    pub fn element_qname(&self) -> Option<&QName> {
        self.coder.traversal.element_qname()
    }

    /// `{uri}local` form of the innermost open element.
    pub fn element_qname_as_string(&mut self) -> Option<&str> {
        self.coder.traversal.element_qname_string()
    }

    /// Prefix of the innermost open element. Known after SE when the URI
    /// already had prefixes, otherwise after its local-element-ns NS.
    pub fn element_prefix(&self) -> Option<&str> {
        self.coder.traversal.element_prefix()
    }

    /// NS events decoded so far for the innermost open element.
    pub fn declared_prefix_declarations(&self) -> &[NamespaceDeclaration] {
        self.coder.traversal.declared_prefix_declarations()
    }

    /// Nearest in-scope binding of `prefix`.
    pub fn resolve_uri(&self, prefix: &str) -> Option<Arc<str>> {
        self.coder.traversal.resolve_uri(prefix)
    }

    /// Decodes one complete event; `Ok(None)` after ED.
    pub fn read_event(&mut self) -> Result<Option<XmlEvent>> {
        use EventType as T;

        let Some(event_type) = self.next()? else { return Ok(None) };
        let event = match event_type {
            T::StartDocument => {
                self.decode_start_document()?;
                XmlEvent::StartDocument
            }
            T::EndDocument => {
                self.decode_end_document()?;
                XmlEvent::EndDocument
            }
            T::StartElement
            | T::StartElementNs
            | T::StartElementGeneric
            | T::StartElementGenericUndeclared => {
                XmlEvent::StartElement(self.decode_start_element()?)
            }
            T::EndElement | T::EndElementUndeclared => {
                self.decode_end_element()?;
                XmlEvent::EndElement
            }
            T::Attribute
            | T::AttributeNs
            | T::AttributeGeneric
            | T::AttributeGenericUndeclared
            | T::AttributeXsiType
            | T::AttributeXsiNil => {
                let (qname, value) = self.decode_attribute()?;
                XmlEvent::Attribute { qname, value }
            }
            T::Characters | T::CharactersGeneric | T::CharactersGenericUndeclared => {
                XmlEvent::Characters(self.decode_characters()?)
            }
            T::NamespaceDeclaration => {
                XmlEvent::NamespaceDeclaration(self.decode_namespace_declaration()?)
            }
            T::Comment => XmlEvent::Comment(self.decode_comment()?),
            T::ProcessingInstruction => {
                XmlEvent::ProcessingInstruction(self.decode_processing_instruction()?)
            }
            T::DocType => XmlEvent::DocType(self.decode_doctype()?),
            T::EntityReference => XmlEvent::EntityReference(self.decode_entity_reference()?),
        };
        Ok(Some(event))
    }
}

/// Decodes a complete document (or fragment) from `bytes`.
///
/// A prefix announced by a local-element-ns NS is written back into the
/// preceding SE event.
///
/// # Errors
///
/// Any fatal decode error.
pub fn decode(grammar: Arc<Grammar>, options: ExiOptions, bytes: &[u8]) -> Result<Vec<XmlEvent>> {
    let mut decoder = Decoder::new(grammar, options)?;
    decoder.set_input_stream(bytes);
    let mut events = Vec::new();
    let mut start_tag = None;
    while let Some(event) = decoder.read_event()? {
        match &event {
            XmlEvent::StartElement(_) => start_tag = Some(events.len()),
            XmlEvent::NamespaceDeclaration(decl) if decl.local_element_ns => {
                let open = start_tag.and_then(|index| events.get_mut(index));
                if let Some(XmlEvent::StartElement(qname)) = open {
                    qname.prefix = Some(Arc::clone(&decl.prefix));
                }
            }
            _ => {}
        }
        events.push(event);
    }
    Ok(events)
}
