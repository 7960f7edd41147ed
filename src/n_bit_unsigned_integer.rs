//! n-bit unsigned integer (EXI §7.1.9).
//!
//! Bit-packed: exactly `n` bits. Byte-packed: `⌈n/8⌉` bytes, least
//! significant first. `n = 0` omits the value entirely; the channel decides
//! which representation applies.

use crate::Result;
use crate::channel::{DecoderChannel, EncoderChannel};

/// Encodes `value` in `n` bits.
#[inline]
pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: u32, n: u8) -> Result<()> {
    debug_assert!(
        n >= 32 || value < (1u32 << n),
        "value {value} does not fit in {n} bits"
    );
    channel.encode_n_bit_unsigned_integer(value, n)
}

/// Decodes an `n`-bit value.
#[inline]
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C, n: u8) -> Result<u32> {
    channel.decode_n_bit_unsigned_integer(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{
        BitDecoderChannel, BitEncoderChannel, ByteDecoderChannel, ByteEncoderChannel,
    };

    #[test]
    fn zero_bits_omitted() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, 0, 0).unwrap();
        ch.flush().unwrap();
        assert!(ch.into_inner().is_empty());

        let mut ch = BitDecoderChannel::new(&[][..]);
        assert_eq!(decode(&mut ch, 0).unwrap(), 0);
    }

    #[test]
    fn bit_and_byte_packed_agree_on_values() {
        for (value, n) in [(0u32, 1u8), (1, 1), (5, 3), (255, 8), (256, 9), (0xFFFF_FFFF, 32)] {
            let mut bit = BitEncoderChannel::new(Vec::new());
            encode(&mut bit, value, n).unwrap();
            bit.flush().unwrap();
            let bit_bytes = bit.into_inner();

            let mut byte = ByteEncoderChannel::new(Vec::new());
            encode(&mut byte, value, n).unwrap();
            let byte_bytes = byte.into_inner();
            assert_eq!(byte_bytes.len(), usize::from(n).div_ceil(8));

            assert_eq!(decode(&mut BitDecoderChannel::new(&bit_bytes[..]), n).unwrap(), value);
            assert_eq!(decode(&mut ByteDecoderChannel::new(&byte_bytes[..]), n).unwrap(), value);
        }
    }
}
