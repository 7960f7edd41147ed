//! Decoder / encoder channels: the only view the coders have of the wire.
//!
//! The bit-packed channel tracks sub-byte alignment through [`BitReader`] /
//! [`BitWriter`]. The byte-packed channel stores every n-bit unsigned integer
//! in `⌈n/8⌉` whole bytes, least significant byte first, and never leaves a
//! partial byte behind.
//!
//! Both traits are object safe so that a pre-built channel can be handed to a
//! coder embedded in a larger framed container.

use std::io::{Read, Write};

use crate::bit_width::mask;
use crate::bitstream::{BitReader, BitWriter};
use crate::options::CodingMode;
use crate::Result;

/// Read side of the wire.
pub trait DecoderChannel {
    /// Reads an n-bit unsigned integer, `n` in `0..=32`.
    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u32>;
    /// Reads one octet (unsigned integer groups, code points).
    fn read_byte(&mut self) -> Result<u8>;
    /// Fills `buf` with the next octets.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;
    /// Skips to the next byte boundary.
    fn align(&mut self);
    /// Skips `n` octets.
    fn skip(&mut self, n: u64) -> Result<()>;
    /// Alignment this channel implements.
    fn coding_mode(&self) -> CodingMode;
}

/// Write side of the wire.
pub trait EncoderChannel {
    /// Writes the lower `n` bits of `value` as an n-bit unsigned integer.
    fn encode_n_bit_unsigned_integer(&mut self, value: u32, n: u8) -> Result<()>;
    /// Writes one octet.
    fn write_byte(&mut self, byte: u8) -> Result<()>;
    /// Writes a run of octets.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Pads to the next byte boundary.
    fn align(&mut self) -> Result<()>;
    /// Aligns and flushes the underlying sink.
    fn flush(&mut self) -> Result<()>;
    /// Alignment this channel implements.
    fn coding_mode(&self) -> CodingMode;
}

// ============================================================================
// Bit-packed
// ============================================================================

/// Bit-packed read channel.
#[derive(Debug)]
pub struct BitDecoderChannel<R> {
    reader: BitReader<R>,
}

impl<R: Read> BitDecoderChannel<R> {
    /// Wraps a byte source.
    pub fn new(source: R) -> Self {
        Self { reader: BitReader::new(source) }
    }
}

impl<R: Read> DecoderChannel for BitDecoderChannel<R> {
    #[inline]
    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u32> {
        self.reader.read_bits(n)
    }

    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        self.reader.read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_bytes(buf)
    }

    fn align(&mut self) {
        self.reader.align();
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        self.reader.skip(n)
    }

    fn coding_mode(&self) -> CodingMode {
        CodingMode::BitPacked
    }
}

/// Bit-packed write channel.
#[derive(Debug)]
pub struct BitEncoderChannel<W: Write> {
    writer: BitWriter<W>,
}

impl<W: Write> BitEncoderChannel<W> {
    /// Wraps a byte sink.
    pub fn new(sink: W) -> Self {
        Self { writer: BitWriter::new(sink) }
    }

    /// Returns the sink. Call [`EncoderChannel::flush`] first.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> EncoderChannel for BitEncoderChannel<W> {
    #[inline]
    fn encode_n_bit_unsigned_integer(&mut self, value: u32, n: u8) -> Result<()> {
        self.writer.write_bits(value, n)
    }

    #[inline]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.writer.write_byte(byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_bytes(bytes)
    }

    fn align(&mut self) -> Result<()> {
        self.writer.align()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    fn coding_mode(&self) -> CodingMode {
        CodingMode::BitPacked
    }
}

// ============================================================================
// Byte-packed
// ============================================================================

/// Anzahl Bytes fuer einen n-Bit-Wert im Byte-Modus: `⌈n/8⌉`.
#[inline]
fn byte_count(n: u8) -> usize {
    usize::from(n).div_ceil(8)
}

/// Byte-packed read channel.
#[derive(Debug)]
pub struct ByteDecoderChannel<R> {
    source: R,
}

impl<R: Read> ByteDecoderChannel<R> {
    /// Wraps a byte source.
    pub fn new(source: R) -> Self {
        Self { source }
    }
}

impl<R: Read> DecoderChannel for ByteDecoderChannel<R> {
    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32, "bit count must be 0..=32, got {n}");
        let mut bytes = [0u8; 4];
        let len = byte_count(n);
        self.source.read_exact(&mut bytes[..len])?;
        // Little-Endian: niederwertigstes Byte zuerst; Fuellbits oberhalb von n fallen weg
        Ok(u32::from_le_bytes(bytes) & mask(n))
    }

    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.source.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf)?;
        Ok(())
    }

    fn align(&mut self) {}

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            let skipped =
                std::io::copy(&mut (&mut self.source).take(remaining), &mut std::io::sink())?;
            if skipped == 0 {
                return Err(crate::Error::PrematureEndOfStream);
            }
            remaining -= skipped;
        }
        Ok(())
    }

    fn coding_mode(&self) -> CodingMode {
        CodingMode::BytePacked
    }
}

/// Byte-packed write channel.
#[derive(Debug)]
pub struct ByteEncoderChannel<W> {
    sink: W,
}

impl<W: Write> ByteEncoderChannel<W> {
    /// Wraps a byte sink.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> EncoderChannel for ByteEncoderChannel<W> {
    fn encode_n_bit_unsigned_integer(&mut self, value: u32, n: u8) -> Result<()> {
        debug_assert!(n <= 32, "bit count must be 0..=32, got {n}");
        let len = byte_count(n);
        self.sink.write_all(&value.to_le_bytes()[..len])?;
        Ok(())
    }

    #[inline]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.sink.write_all(&[byte])?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        Ok(())
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    fn coding_mode(&self) -> CodingMode {
        CodingMode::BytePacked
    }
}
