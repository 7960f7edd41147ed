//! Variable-length unsigned integer (EXI §7.1.6).
//!
//! Each octet carries 7 data bits and a continuation bit in the MSB; the least
//! significant group comes first.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result};

/// Encodes `value` in 7-bit groups.
#[inline]
pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: u64) -> Result<()> {
    if value < 128 {
        // Fast-Path: ein Byte (ASCII, kleine Laengen)
        return channel.write_byte(value as u8);
    }
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            return channel.write_byte(low7);
        }
        channel.write_byte(0x80 | low7)?;
    }
}

/// Decodes a 7-bit-group integer.
///
/// # Errors
///
/// `IntegerOverflow` if the value does not fit into 64 bits.
#[inline]
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<u64> {
    let byte = channel.read_byte()?;
    if byte & 0x80 == 0 {
        return Ok(u64::from(byte));
    }
    let mut result = u64::from(byte & 0x7F);
    let mut shift: u32 = 7;
    loop {
        let byte = channel.read_byte()?;
        let data = u64::from(byte & 0x7F);
        // Beim 10. Byte ist nur noch Daten-Bit 0 gueltig
        if shift == 63 && (data > 1 || byte & 0x80 != 0) {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Decodes into a `usize` (lengths, compact identifiers).
pub(crate) fn decode_usize<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<usize> {
    usize::try_from(decode(channel)?).map_err(|_| Error::IntegerOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BitDecoderChannel, BitEncoderChannel};

    fn encoded(value: u64) -> Vec<u8> {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, value).unwrap();
        ch.flush().unwrap();
        ch.into_inner()
    }

    #[test]
    fn group_layout() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(127), vec![0x7F]);
        assert_eq!(encoded(128), vec![0x80, 0x01]);
        assert_eq!(encoded(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn round_trip_boundaries() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            let bytes = encoded(value);
            let mut ch = BitDecoderChannel::new(&bytes[..]);
            assert_eq!(decode(&mut ch).unwrap(), value);
        }
    }

    #[test]
    fn overflow_rejected() {
        let mut bytes = vec![0xFFu8; 9];
        bytes.push(0x02);
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(decode(&mut ch), Err(Error::IntegerOverflow));
    }

    #[test]
    fn truncated_group_is_premature_end() {
        let bytes = [0x80u8];
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(decode(&mut ch), Err(Error::PrematureEndOfStream));
    }
}
