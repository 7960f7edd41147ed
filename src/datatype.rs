//! Datatypes, typed values and the value codec contract.
//!
//! A [`ValueCodec`] reads exactly the bits a datatype's representation
//! defines and touches the channel only through its public primitives.
//! Two catalogs ship with the crate: [`TypedValueCodec`] (the built-in typed
//! representations) and [`LexicalValueCodec`] (every value as a string through
//! the string table, used when lexical values are preserved).

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::bit_width::for_count;
use crate::channel::{DecoderChannel, EncoderChannel};
use crate::qname::{self, QName};
use crate::string_table::{self, StringTable};
use crate::{Error, Result, boolean, integer, n_bit_unsigned_integer, unsigned_integer};

/// Datatype of an attribute or character content production.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// Untyped string content (also the default for undeclared content).
    String,
    /// xsd:boolean.
    Boolean,
    /// Unbounded signed integer.
    Integer,
    /// Non-negative integer.
    UnsignedInteger,
    /// Bounded integer: an n-bit offset from `lower_bound`.
    NBitInteger {
        /// Kleinster zulaessiger Wert.
        lower_bound: i64,
        /// Bitbreite des Offsets.
        bits: u8,
    },
    /// QName value (xsi:type).
    QName,
}

impl Datatype {
    /// Bounded integer for the inclusive range `[min, max]`.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `max < min` or the range needs more than 32 bits.
    pub fn bounded_integer(min: i64, max: i64) -> Result<Self> {
        let range = i128::from(max) - i128::from(min);
        if range < 0 || range >= i128::from(u32::MAX) {
            return Err(Error::InvalidValue(format!("bounded range [{min}, {max}]")));
        }
        let bits = for_count(range as usize + 1);
        Ok(Self::NBitInteger { lower_bound: min, bits })
    }
}

/// A decoded typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// String content.
    String(Rc<str>),
    /// Boolean.
    Boolean(bool),
    /// Signed integer (also the result of bounded integers).
    Integer(i64),
    /// Unsigned integer.
    UnsignedInteger(u64),
    /// QName.
    QName(QName),
}

/// Canonical lexical form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::UnsignedInteger(u) => write!(f, "{u}"),
            Self::QName(q) => write!(f, "{q}"),
        }
    }
}

/// Per-datatype read/write contract used by content coding.
pub trait ValueCodec {
    /// Reads one value of `datatype`; `context` is the naming context for the
    /// string table.
    fn read_value(
        &self,
        datatype: &Datatype,
        channel: &mut dyn DecoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<Value>;

    /// Parses a lexical value for `datatype`; `None` if it does not match.
    fn parse(&self, datatype: &Datatype, lexical: &str) -> Option<Value>;

    /// Writes `value` (as returned by [`parse`](Self::parse)).
    fn write_value(
        &self,
        datatype: &Datatype,
        value: &Value,
        channel: &mut dyn EncoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<()>;

    /// `true` if `lexical` is representable as `datatype`.
    fn is_valid(&self, datatype: &Datatype, lexical: &str) -> bool {
        self.parse(datatype, lexical).is_some()
    }
}

/// Built-in typed representations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedValueCodec {
    preserve_prefixes: bool,
}

impl TypedValueCodec {
    /// `preserve_prefixes` controls whether QName values carry their prefix.
    pub fn new(preserve_prefixes: bool) -> Self {
        Self { preserve_prefixes }
    }
}

impl ValueCodec for TypedValueCodec {
    fn read_value(
        &self,
        datatype: &Datatype,
        channel: &mut dyn DecoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<Value> {
        Ok(match *datatype {
            Datatype::String => Value::String(string_table::decode_value(channel, table, context)?),
            Datatype::Boolean => Value::Boolean(boolean::decode(channel)?),
            Datatype::Integer => Value::Integer(integer::decode(channel)?),
            Datatype::UnsignedInteger => Value::UnsignedInteger(unsigned_integer::decode(channel)?),
            Datatype::NBitInteger { lower_bound, bits } => {
                let offset = n_bit_unsigned_integer::decode(channel, bits)?;
                let value = lower_bound
                    .checked_add(i64::from(offset))
                    .ok_or(Error::IntegerOverflow)?;
                Value::Integer(value)
            }
            Datatype::QName => {
                Value::QName(qname::decode_qname(channel, table, self.preserve_prefixes)?)
            }
        })
    }

    fn parse(&self, datatype: &Datatype, lexical: &str) -> Option<Value> {
        match *datatype {
            Datatype::String => Some(Value::String(Rc::from(lexical))),
            Datatype::Boolean => boolean::parse(lexical).map(Value::Boolean),
            Datatype::Integer => lexical.trim().parse().ok().map(Value::Integer),
            Datatype::UnsignedInteger => lexical.trim().parse().ok().map(Value::UnsignedInteger),
            Datatype::NBitInteger { lower_bound, bits } => {
                let value: i64 = lexical.trim().parse().ok()?;
                let offset = i128::from(value) - i128::from(lower_bound);
                let limit = 1i128 << bits;
                (0..limit).contains(&offset).then_some(Value::Integer(value))
            }
            // Prefix-Aufloesung braucht den Namespace-Kontext; erledigt der Encoder
            Datatype::QName => None,
        }
    }

    fn write_value(
        &self,
        datatype: &Datatype,
        value: &Value,
        channel: &mut dyn EncoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<()> {
        match (datatype, value) {
            (Datatype::String, Value::String(s)) => {
                string_table::encode_value(channel, table, context, s)
            }
            (Datatype::Boolean, Value::Boolean(b)) => boolean::encode(channel, *b),
            (Datatype::Integer, Value::Integer(i)) => integer::encode(channel, *i),
            (Datatype::UnsignedInteger, Value::UnsignedInteger(u)) => {
                unsigned_integer::encode(channel, *u)
            }
            (Datatype::NBitInteger { lower_bound, bits }, Value::Integer(i)) => {
                let offset = i128::from(*i) - i128::from(*lower_bound);
                if !(0..1i128 << bits).contains(&offset) {
                    return Err(Error::InvalidValue(format!(
                        "{i} outside the {bits}-bit range above {lower_bound}"
                    )));
                }
                n_bit_unsigned_integer::encode(channel, offset as u32, *bits)
            }
            (Datatype::QName, Value::QName(q)) => {
                qname::encode_qname(channel, table, q, self.preserve_prefixes)
            }
            (dt, v) => Err(Error::InvalidValue(format!("{v} is not a {dt:?} value"))),
        }
    }
}

/// Lexical representation: every value is a string through the string table.
///
/// QName values (xsi:type) keep their QName representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalValueCodec {
    typed: TypedValueCodec,
}

impl LexicalValueCodec {
    /// See [`TypedValueCodec::new`].
    pub fn new(preserve_prefixes: bool) -> Self {
        Self { typed: TypedValueCodec::new(preserve_prefixes) }
    }
}

impl ValueCodec for LexicalValueCodec {
    fn read_value(
        &self,
        datatype: &Datatype,
        channel: &mut dyn DecoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<Value> {
        match datatype {
            Datatype::QName => self.typed.read_value(datatype, channel, context, table),
            _ => Ok(Value::String(string_table::decode_value(channel, table, context)?)),
        }
    }

    fn parse(&self, datatype: &Datatype, lexical: &str) -> Option<Value> {
        match datatype {
            Datatype::QName => None,
            _ => Some(Value::String(Rc::from(lexical))),
        }
    }

    fn write_value(
        &self,
        datatype: &Datatype,
        value: &Value,
        channel: &mut dyn EncoderChannel,
        context: &QName,
        table: &mut StringTable,
    ) -> Result<()> {
        match (datatype, value) {
            (Datatype::QName, _) => {
                self.typed.write_value(datatype, value, channel, context, table)
            }
            (_, Value::String(s)) => string_table::encode_value(channel, table, context, s),
            (_, other) => string_table::encode_value(channel, table, context, &other.to_string()),
        }
    }
}

/// Builds a QName value from a resolved URI and a lexical `prefix:local`.
pub(crate) fn qname_value(uri: Arc<str>, prefix: &str, local: &str) -> Value {
    Value::QName(QName { uri, local_name: Arc::from(local), prefix: Some(Arc::from(prefix)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ByteDecoderChannel, ByteEncoderChannel};

    fn round_trip(codec: &dyn ValueCodec, dt: &Datatype, lexical: &str) -> (Vec<u8>, Value) {
        let ctx = QName::new("", "v");
        let value = codec.parse(dt, lexical).unwrap();
        let mut table = StringTable::new(None, None);
        let mut ch = ByteEncoderChannel::new(Vec::new());
        codec.write_value(dt, &value, &mut ch, &ctx, &mut table).unwrap();
        let bytes = ch.into_inner();

        let mut table = StringTable::new(None, None);
        let mut ch = ByteDecoderChannel::new(&bytes[..]);
        let decoded = codec.read_value(dt, &mut ch, &ctx, &mut table).unwrap();
        assert_eq!(decoded, value);
        (bytes, decoded)
    }

    #[test]
    fn n_bit_integer_adds_lower_bound() {
        let dt = Datatype::bounded_integer(-10, 10).unwrap();
        assert_eq!(dt, Datatype::NBitInteger { lower_bound: -10, bits: 5 });
        let (bytes, value) = round_trip(&TypedValueCodec::default(), &dt, "-3");
        assert_eq!(bytes, vec![7]);
        assert_eq!(value, Value::Integer(-3));
    }

    #[test]
    fn n_bit_integer_rejects_out_of_range() {
        let dt = Datatype::bounded_integer(0, 3).unwrap();
        let codec = TypedValueCodec::default();
        assert!(codec.is_valid(&dt, "3"));
        assert!(!codec.is_valid(&dt, "4"));
        assert!(!codec.is_valid(&dt, "-1"));
        assert!(Datatype::bounded_integer(5, 4).is_err());
    }

    #[test]
    fn n_bit_integer_write_checks_both_bounds() {
        let dt = Datatype::bounded_integer(10, 13).unwrap();
        let codec = TypedValueCodec::default();
        let ctx = QName::new("", "v");
        let mut table = StringTable::new(None, None);
        let mut ch = ByteEncoderChannel::new(Vec::new());
        for value in [9, 14, 20, i64::MAX] {
            let err = codec
                .write_value(&dt, &Value::Integer(value), &mut ch, &ctx, &mut table)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidValue(_)), "{value}");
        }
        codec.write_value(&dt, &Value::Integer(13), &mut ch, &ctx, &mut table).unwrap();
        assert_eq!(ch.into_inner(), vec![3]);
    }

    #[test]
    fn typed_round_trips() {
        let codec = TypedValueCodec::default();
        round_trip(&codec, &Datatype::Boolean, "1");
        round_trip(&codec, &Datatype::Integer, "-12345");
        round_trip(&codec, &Datatype::UnsignedInteger, "18446744073709551615");
        round_trip(&codec, &Datatype::String, "text");
        assert!(!codec.is_valid(&Datatype::Integer, "abc"));
        assert!(!codec.is_valid(&Datatype::QName, "p:x"));
    }

    #[test]
    fn lexical_codec_keeps_lexical_form() {
        let codec = LexicalValueCodec::default();
        let (_, value) = round_trip(&codec, &Datatype::Integer, "007");
        assert_eq!(value, Value::String(Rc::from("007")));
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let codec = TypedValueCodec::default();
        let mut table = StringTable::new(None, None);
        let mut ch = ByteEncoderChannel::new(Vec::new());
        let ctx = QName::new("", "v");
        let err = codec
            .write_value(&Datatype::Boolean, &Value::Integer(1), &mut ch, &ctx, &mut table)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-4).to_string(), "-4");
        assert_eq!(Value::QName(QName::with_prefix("urn:x", "T", "x")).to_string(), "x:T");
    }
}
