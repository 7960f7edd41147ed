//! exi-stream – grammar-driven streaming EXI body coder
//!
//! Encodes and decodes the body of an EXI 1.0 stream: bit or byte channel,
//! string table with bounded value partitions, grammar traversal with
//! runtime learning, and the event-code state machine on top. Header,
//! compression and schema compilation live outside this crate; a
//! [`Grammar`] is handed in ready-made.
//!
//! # Beispiel
//!
//! ```
//! use std::rc::Rc;
//! use exi_stream::{ExiOptions, Grammar, QName, Value, XmlEvent};
//! use exi_stream::decoder::decode;
//! use exi_stream::encoder::encode;
//!
//! let events = vec![
//!     XmlEvent::StartDocument,
//!     XmlEvent::StartElement(QName::new("", "greeting")),
//!     XmlEvent::Characters(Value::String(Rc::from("Hello"))),
//!     XmlEvent::EndElement,
//!     XmlEvent::EndDocument,
//! ];
//! let grammar = Grammar::schema_less();
//! let bytes = encode(grammar.clone(), ExiOptions::default(), &events).unwrap();
//!
//! let decoded = decode(grammar, ExiOptions::default(), &bytes).unwrap();
//! assert_eq!(decoded, events);
//! ```

pub mod bit_width;
pub mod bitstream;
pub mod boolean;
pub mod channel;
mod coder;
pub mod context;
pub mod datatype;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod event;
pub mod event_code;
pub mod grammar;
pub mod integer;
pub mod n_bit_unsigned_integer;
pub mod options;
pub mod qname;
pub mod string;
pub mod string_table;
pub mod traversal;
pub mod unsigned_integer;

pub use error::{Error, ErrorHandler, LogErrorHandler, Result};

/// HashMap mit ahash (schnell, nicht DoS-resistent, nur intern).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

/// IndexSet mit ahash (stabile Indizes fuer Compact IDs).
pub(crate) type FastIndexSet<K> = indexmap::IndexSet<K, ahash::RandomState>;

// Public API: Events
pub use event::{DocType, Event, EventType, NamespaceDeclaration, ProcessingInstruction, XmlEvent};

// Public API: Options
pub use options::{CodingMode, ExiOptions, Preserve, Profile};

// Public API: Grammar
pub use grammar::{AttributeDecl, ElementDecl, Grammar, GrammarBuilder, RuleId, RuleKind, RuleRef};

// Public API: Encoder/Decoder
pub use decoder::{Decoder, decode};
pub use encoder::{Encoder, encode};
pub use event_code::EventCode;

// Public API: Types
pub use datatype::{Datatype, LexicalValueCodec, TypedValueCodec, Value, ValueCodec};
pub use qname::QName;
pub use string_table::StringTable;
