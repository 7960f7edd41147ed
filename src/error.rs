//! Central error types for the stream coder.
//!
//! Fatal kinds abort the current document run; the coder must be
//! re-initialised (`set_input_stream` / `set_output_stream`) before reuse.
//! Warnings are not returned but routed through an [`ErrorHandler`].

use core::fmt;
use std::borrow::Cow;
use std::io;

use crate::event::EventType;

/// All error kinds raised by the channel, the string table and the coders.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A decode call was issued while the pending event code resolved to a
    /// production that call does not handle.
    DecodeState {
        /// The decode call that was invoked.
        call: &'static str,
        /// The production kind the last event code resolved to (`None` if
        /// no event code is pending).
        pending: Option<EventType>,
    },
    /// The byte source ended while bits were still owed.
    PrematureEndOfStream,
    /// `pop_element` was called with only the root context left.
    StackUnderflow,
    /// The same (uri, prefix) pair was declared twice in one scope.
    DuplicatePrefix {
        /// Gebundener Prefix.
        prefix: String,
        /// Gebundene Namespace-URI.
        uri: String,
    },
    /// An event code does not select any production of the current rule.
    InvalidEventCode {
        /// Die gelesenen Event-Code-Teile.
        event_code: Cow<'static, str>,
        /// Regel-Art in der der Fehler auftrat.
        grammar_state: Cow<'static, str>,
    },
    /// The grammar has no production for the event the encoder was asked to write.
    EventNotAllowed {
        /// Das angefragte Event.
        event: Cow<'static, str>,
        /// Regel-Art in der der Fehler auftrat.
        grammar_state: Cow<'static, str>,
    },
    /// A compact identifier is out of range or was evicted.
    InvalidCompactId(usize),
    /// A decoded code point is a surrogate or exceeds U+10FFFF.
    InvalidCodePoint(u64),
    /// An integer exceeds the representable range.
    IntegerOverflow,
    /// A lexical value does not match its datatype.
    InvalidValue(String),
    /// A namespace prefix has no in-scope declaration.
    UnresolvablePrefix(String),
    /// Options that must not be combined.
    InvalidOptionCombination,
    /// A grammar refers to a rule it does not contain.
    InvalidGrammar(String),
    /// A coding call was made before a source/sink was bound.
    ChannelNotBound,
    /// I/O failure of the underlying byte source or sink.
    IoError(String),
    /// Warning: an event was dropped because its fidelity option is off.
    EventNotPreserved(&'static str),
    /// Warning: xsi:type names a type without a grammar.
    XsiTypeNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeState { call, pending: Some(pending) } => {
                write!(f, "invalid decode state: {call} called while pending event is {pending:?}")
            }
            Self::DecodeState { call, pending: None } => {
                write!(f, "invalid decode state: {call} called without a pending event code")
            }
            Self::PrematureEndOfStream => write!(f, "premature end of stream"),
            Self::StackUnderflow => write!(f, "element context stack underflow"),
            Self::DuplicatePrefix { prefix, uri } => {
                write!(f, "prefix '{prefix}' already bound to '{uri}' in this scope")
            }
            Self::InvalidEventCode { event_code, grammar_state } => {
                if grammar_state.is_empty() {
                    write!(f, "invalid event code '{event_code}'")
                } else {
                    write!(f, "invalid event code '{event_code}' in state '{grammar_state}'")
                }
            }
            Self::EventNotAllowed { event, grammar_state } => {
                write!(f, "event {event} not allowed in state '{grammar_state}'")
            }
            Self::InvalidCompactId(id) => write!(f, "invalid or evicted compact identifier {id}"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X}"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            Self::UnresolvablePrefix(pfx) => write!(f, "unresolvable namespace prefix '{pfx}'"),
            Self::InvalidOptionCombination => write!(f, "invalid option combination"),
            Self::InvalidGrammar(msg) => write!(f, "invalid grammar: {msg}"),
            Self::ChannelNotBound => write!(f, "no input/output channel bound"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::EventNotPreserved(what) => {
                write!(f, "skipped {what}: fidelity option not enabled")
            }
            Self::XsiTypeNotFound(name) => write!(f, "xsi:type '{name}' has no type grammar"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::PrematureEndOfStream
        } else {
            Self::IoError(err.to_string())
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Receives non-fatal conditions raised while coding.
///
/// Replaceable per coder instance via `set_error_handler`.
pub trait ErrorHandler {
    /// Called for a suspicious but recoverable condition; coding continues.
    fn warning(&mut self, warning: &Error);
}

/// Default handler: reports warnings through `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn warning(&mut self, warning: &Error) {
        log::warn!("{warning}");
    }
}
