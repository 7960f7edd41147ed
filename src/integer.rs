//! Signed integer (EXI §7.1.5, unbounded case).
//!
//! A one-bit sign (1 = negative) followed by the magnitude as unsigned
//! integer; negative values carry `-value - 1`.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, boolean, unsigned_integer};

/// Encodes a signed integer.
pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: i64) -> Result<()> {
    if value >= 0 {
        boolean::encode(channel, false)?;
        unsigned_integer::encode(channel, value as u64)
    } else {
        boolean::encode(channel, true)?;
        // (-value - 1) ohne Overflow bei i64::MIN
        unsigned_integer::encode(channel, !(value as u64))
    }
}

/// Decodes a signed integer.
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<i64> {
    let negative = boolean::decode(channel)?;
    let magnitude = unsigned_integer::decode(channel)?;
    if magnitude > i64::MAX as u64 {
        return Err(Error::IntegerOverflow);
    }
    if negative {
        Ok(-(magnitude as i64) - 1)
    } else {
        Ok(magnitude as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ByteDecoderChannel, ByteEncoderChannel};

    fn round_trip(value: i64) -> i64 {
        let mut ch = ByteEncoderChannel::new(Vec::new());
        encode(&mut ch, value).unwrap();
        let bytes = ch.into_inner();
        decode(&mut ByteDecoderChannel::new(&bytes[..])).unwrap()
    }

    #[test]
    fn extremes() {
        for v in [0, 1, -1, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(round_trip(v), v);
        }
    }

    #[test]
    fn minus_one_has_zero_magnitude() {
        let mut ch = ByteEncoderChannel::new(Vec::new());
        encode(&mut ch, -1).unwrap();
        // Byte-Modus: Vorzeichen als ganzes Byte, dann Betrag 0
        assert_eq!(ch.into_inner(), vec![0x01, 0x00]);
    }
}
