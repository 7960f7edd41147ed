//! Boolean (EXI §7.1.2): a 1-bit unsigned integer, 0 = false.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Result, n_bit_unsigned_integer};

/// Encodes a boolean.
#[inline]
pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: bool) -> Result<()> {
    n_bit_unsigned_integer::encode(channel, u32::from(value), 1)
}

/// Decodes a boolean.
#[inline]
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<bool> {
    Ok(n_bit_unsigned_integer::decode(channel, 1)? == 1)
}

/// Parses the lexical forms `true`, `false`, `1`, `0` (surrounding whitespace allowed).
pub fn parse(lexical: &str) -> Option<bool> {
    match lexical.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitDecoderChannel, BitEncoderChannel};

    #[test]
    fn one_bit_each() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, true).unwrap();
        encode(&mut ch, false).unwrap();
        encode(&mut ch, true).unwrap();
        ch.flush().unwrap();
        let bytes = ch.into_inner();
        assert_eq!(bytes, vec![0b1010_0000]);

        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert!(decode(&mut ch).unwrap());
        assert!(!decode(&mut ch).unwrap());
        assert!(decode(&mut ch).unwrap());
    }

    #[test]
    fn lexical_forms() {
        assert_eq!(parse("true"), Some(true));
        assert_eq!(parse(" 0 "), Some(false));
        assert_eq!(parse("yes"), None);
    }
}
