//! Event model: grammar terminals, production kinds, and the owned content
//! records handed across the coder boundary.
//!
//! A grammar production carries an [`Event`] (the terminal it matches). The
//! event-code tables additionally synthesise *undeclared* productions that
//! have no counterpart in the grammar; both are reported to callers as an
//! [`EventType`].

use std::cmp::Ordering;
use std::sync::Arc;

use crate::datatype::{Datatype, Value};
use crate::grammar::{AttributeDecl, ElementDecl};
use crate::qname::QName;

/// Terminal symbol of a grammar production.
#[derive(Debug, Clone)]
pub enum Event {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE(qname): a declared element.
    StartElement(Arc<ElementDecl>),
    /// SE(uri:*): any local name in one namespace.
    StartElementNs(Arc<str>),
    /// SE(*)
    StartElementGeneric,
    /// EE
    EndElement,
    /// AT(qname): a declared attribute with its datatype.
    Attribute(Arc<AttributeDecl>),
    /// AT(uri:*)
    AttributeNs(Arc<str>),
    /// AT(*)
    AttributeGeneric,
    /// CH with a declared datatype.
    Characters(Datatype),
    /// CH (untyped)
    CharactersGeneric,
    /// NS
    NamespaceDeclaration,
    /// CM
    Comment,
    /// PI
    ProcessingInstruction,
    /// DT
    DocType,
    /// ER
    EntityReference,
}

impl Event {
    /// Declared attribute production for `qname`.
    pub fn attribute(qname: QName, datatype: Datatype) -> Self {
        Self::Attribute(Arc::new(AttributeDecl { qname, datatype }))
    }

    /// Production kind this terminal resolves to when matched at level one.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::StartDocument => EventType::StartDocument,
            Self::EndDocument => EventType::EndDocument,
            Self::StartElement(_) => EventType::StartElement,
            Self::StartElementNs(_) => EventType::StartElementNs,
            Self::StartElementGeneric => EventType::StartElementGeneric,
            Self::EndElement => EventType::EndElement,
            Self::Attribute(_) => EventType::Attribute,
            Self::AttributeNs(_) => EventType::AttributeNs,
            Self::AttributeGeneric => EventType::AttributeGeneric,
            Self::Characters(_) => EventType::Characters,
            Self::CharactersGeneric => EventType::CharactersGeneric,
            Self::NamespaceDeclaration => EventType::NamespaceDeclaration,
            Self::Comment => EventType::Comment,
            Self::ProcessingInstruction => EventType::ProcessingInstruction,
            Self::DocType => EventType::DocType,
            Self::EntityReference => EventType::EntityReference,
        }
    }

    // Rang fuer die Sortierung schema-informierter Produktionen:
    // deklarierte Attribute, Wildcards, dann Elemente, EE, CH.
    fn rank(&self) -> u8 {
        match self {
            Self::StartDocument => 0,
            Self::Attribute(_) => 1,
            Self::AttributeNs(_) => 2,
            Self::AttributeGeneric => 3,
            Self::StartElement(_) => 4,
            Self::StartElementNs(_) => 5,
            Self::StartElementGeneric => 6,
            Self::EndElement => 7,
            Self::Characters(_) => 8,
            Self::CharactersGeneric => 9,
            Self::EndDocument => 10,
            Self::NamespaceDeclaration => 11,
            Self::DocType => 12,
            Self::EntityReference => 13,
            Self::Comment => 14,
            Self::ProcessingInstruction => 15,
        }
    }
}

/// Total order used to arrange level-one productions of schema-informed
/// rules.
///
/// Declared events come before wildcards of the same kind; declared names are
/// ordered by local name, then namespace.
pub fn compare_events(a: &Event, b: &Event) -> Ordering {
    match (a, b) {
        (Event::StartElement(x), Event::StartElement(y)) => x.qname.cmp(&y.qname),
        (Event::Attribute(x), Event::Attribute(y)) => x.qname.cmp(&y.qname),
        (Event::StartElementNs(x), Event::StartElementNs(y))
        | (Event::AttributeNs(x), Event::AttributeNs(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Production kind a resolved event code stands for.
///
/// The `*Undeclared` variants and the two xsi kinds only exist in the
/// synthesised second/third levels of an event-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE(qname)
    StartElement,
    /// SE(uri:*)
    StartElementNs,
    /// SE(*) at level one.
    StartElementGeneric,
    /// SE(*) at a deeper level; triggers learning in built-in rules.
    StartElementGenericUndeclared,
    /// EE at level one.
    EndElement,
    /// EE at a deeper level.
    EndElementUndeclared,
    /// AT(qname)
    Attribute,
    /// AT(uri:*)
    AttributeNs,
    /// AT(*) at level one.
    AttributeGeneric,
    /// AT(*) at a deeper level.
    AttributeGenericUndeclared,
    /// AT(xsi:type)
    AttributeXsiType,
    /// AT(xsi:nil)
    AttributeXsiNil,
    /// CH with a declared datatype.
    Characters,
    /// CH (untyped) at level one.
    CharactersGeneric,
    /// CH (untyped) at a deeper level.
    CharactersGenericUndeclared,
    /// NS
    NamespaceDeclaration,
    /// CM
    Comment,
    /// PI
    ProcessingInstruction,
    /// DT
    DocType,
    /// ER
    EntityReference,
}

impl EventType {
    /// `true` for the kinds produced by the synthesised levels that make a
    /// built-in rule learn a new production.
    pub fn is_undeclared(self) -> bool {
        matches!(
            self,
            Self::StartElementGenericUndeclared
                | Self::EndElementUndeclared
                | Self::AttributeGenericUndeclared
                | Self::CharactersGenericUndeclared
        )
    }
}

/// Content of a namespace declaration (NS).
///
/// With `local_element_ns` set the prefix is the one of the enclosing element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    /// Gebundene URI.
    pub uri: Arc<str>,
    /// Prefix ("" for the default namespace).
    pub prefix: Arc<str>,
    /// Prefix applies to the element that carries this declaration.
    pub local_element_ns: bool,
}

impl NamespaceDeclaration {
    /// Declaration that does not name the element prefix.
    pub fn new(prefix: impl Into<Arc<str>>, uri: impl Into<Arc<str>>) -> Self {
        Self { uri: uri.into(), prefix: prefix.into(), local_element_ns: false }
    }
}

/// Content of a processing instruction (PI).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingInstruction {
    /// Ziel.
    pub target: String,
    /// Daten.
    pub data: String,
}

/// Content of a document type declaration (DT).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocType {
    /// Root element name.
    pub name: String,
    /// Public identifier ("" if absent).
    pub public_id: String,
    /// System identifier ("" if absent).
    pub system_id: String,
    /// Internal subset text.
    pub text: String,
}

/// A decoded or to-be-encoded event with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE
    StartElement(QName),
    /// EE
    EndElement,
    /// AT
    Attribute {
        /// Attribute name.
        qname: QName,
        /// Typed or lexical value.
        value: Value,
    },
    /// CH
    Characters(Value),
    /// NS
    NamespaceDeclaration(NamespaceDeclaration),
    /// CM
    Comment(String),
    /// PI
    ProcessingInstruction(ProcessingInstruction),
    /// DT
    DocType(DocType),
    /// ER
    EntityReference(String),
}
