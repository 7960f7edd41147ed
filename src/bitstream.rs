//! Bit-level reader and writer over a byte source / sink.
//!
//! Bits are packed MSB first within each byte (EXI §7.1). Both halves keep
//! exactly one in-flight byte plus a capacity counter; everything else lives
//! in the underlying `Read` / `Write`.

use std::io::{self, Read, Write};

use crate::bit_width::mask;
use crate::{Error, Result};

/// Reads bits MSB first from any [`Read`] source.
///
/// `capacity` zaehlt die noch ungelesenen Bits in `buffer` (0..=8); die
/// ungelesenen Bits sind immer die niederwertigsten.
#[derive(Debug)]
pub struct BitReader<R> {
    inner: R,
    buffer: u8,
    capacity: u8,
}

impl<R: Read> BitReader<R> {
    /// Creates a reader positioned at the first bit of `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: 0, capacity: 0 }
    }

    /// Holt das naechste Rohbyte; EOF wird zu `PrematureEndOfStream`.
    #[inline]
    fn next_raw(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Returns the next bit.
    ///
    /// # Errors
    ///
    /// `PrematureEndOfStream` if the source is exhausted.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.capacity == 0 {
            self.buffer = self.next_raw()?;
            self.capacity = 8;
        }
        self.capacity -= 1;
        Ok((self.buffer >> self.capacity) & 1 == 1)
    }

    /// Reads an `n`-bit unsigned big-endian integer, `n` in `0..=32`.
    ///
    /// # Errors
    ///
    /// `PrematureEndOfStream` if the source ends before `n` bits were read.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32, "bit count must be 0..=32, got {n}");
        if n == 0 {
            return Ok(0);
        }
        // Puffer reicht
        if n <= self.capacity {
            self.capacity -= n;
            return Ok((u32::from(self.buffer) >> self.capacity) & mask(n));
        }
        // Leerer Puffer, genau ein Byte: direkt durchreichen
        if self.capacity == 0 && n == 8 {
            return Ok(u32::from(self.next_raw()?));
        }

        let mut remaining = n - self.capacity;
        let mut result = u32::from(self.buffer) & mask(self.capacity);
        self.capacity = 0;
        while remaining >= 8 {
            result = (result << 8) | u32::from(self.next_raw()?);
            remaining -= 8;
        }
        if remaining > 0 {
            self.buffer = self.next_raw()?;
            self.capacity = 8 - remaining;
            result = (result << remaining) | (u32::from(self.buffer) >> self.capacity);
        }
        Ok(result)
    }

    /// Discards the unread rest of the current byte.
    #[inline]
    pub fn align(&mut self) {
        self.capacity = 0;
    }

    /// `true` if no bits of a partially consumed byte are pending.
    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.capacity == 0
    }

    /// Reads 8 bits; a direct byte read when aligned.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.capacity == 0 {
            self.next_raw()
        } else {
            Ok(self.read_bits(8)? as u8)
        }
    }

    /// Fills `buf` with the next `buf.len() * 8` bits.
    ///
    /// Aligned: direct copy from the source. Unaligned: the raw bytes are read
    /// in bulk and every output byte is rebuilt right to left from the high
    /// bits of the previous raw byte and the low bits of the next one.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        if len == 0 {
            return Ok(());
        }
        if self.capacity == 0 {
            self.inner.read_exact(buf)?;
            return Ok(());
        }

        let cap = self.capacity;
        let first = self.buffer;
        self.inner.read_exact(&mut buf[..len - 1])?;
        let last = self.next_raw()?;

        let shift_high = 8 - cap;
        let mut low = last;
        for i in (0..len).rev() {
            let high = if i == 0 { first } else { buf[i - 1] };
            buf[i] = (high << shift_high) | (low >> cap);
            low = high;
        }
        // Die niederwertigen `cap` Bits von `last` bleiben ungelesen.
        self.buffer = last;
        Ok(())
    }

    /// Skips `n` bytes.
    ///
    /// Aligned: copies into `io::sink()` until `n` bytes are consumed, since a
    /// single bulk skip may stop short. Unaligned: 8 bits at a time.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if self.capacity == 0 {
            let mut remaining = n;
            while remaining > 0 {
                let skipped = io::copy(&mut (&mut self.inner).take(remaining), &mut io::sink())?;
                if skipped == 0 {
                    return Err(Error::PrematureEndOfStream);
                }
                remaining -= skipped;
            }
        } else {
            for _ in 0..n {
                self.read_bits(8)?;
            }
        }
        Ok(())
    }

    /// Consumes the reader, returning the source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes bits MSB first into any [`Write`] sink.
///
/// `capacity` zaehlt die noch freien Bits im aktuellen Byte (8 = leer).
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    inner: W,
    buffer: u32,
    capacity: u8,
}

impl<W: Write> BitWriter<W> {
    /// Creates a writer positioned at the first bit of `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, buffer: 0, capacity: 8 }
    }

    #[inline]
    fn flush_buffer(&mut self) -> Result<()> {
        self.inner.write_all(&[self.buffer as u8])?;
        self.buffer = 0;
        self.capacity = 8;
        Ok(())
    }

    /// Writes a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.buffer = (self.buffer << 1) | u32::from(bit);
        self.capacity -= 1;
        if self.capacity == 0 {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Writes the lower `n` bits of `value`, MSB first, `n` in `0..=32`.
    pub fn write_bits(&mut self, value: u32, n: u8) -> Result<()> {
        debug_assert!(n <= 32, "bit count must be 0..=32, got {n}");
        if n == 0 {
            return Ok(());
        }
        if n <= self.capacity {
            self.buffer = (self.buffer << n) | (value & mask(n));
            self.capacity -= n;
            if self.capacity == 0 {
                self.flush_buffer()?;
            }
            return Ok(());
        }

        // Aktuelles Byte auffuellen, dann ganze Bytes, Rest in den Puffer
        let mut rest = n - self.capacity;
        self.buffer = (self.buffer << self.capacity) | ((value >> rest) & mask(self.capacity));
        self.flush_buffer()?;
        while rest >= 8 {
            rest -= 8;
            self.inner.write_all(&[(value >> rest) as u8])?;
        }
        self.buffer = value & mask(rest);
        self.capacity = 8 - rest;
        Ok(())
    }

    /// Pads the current byte with zero bits and emits it. No-op when aligned.
    pub fn align(&mut self) -> Result<()> {
        if self.capacity < 8 {
            self.buffer <<= self.capacity;
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// `true` if no partial byte is pending.
    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.capacity == 8
    }

    /// Writes 8 bits; a direct byte write when aligned.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.capacity == 8 {
            self.inner.write_all(&[byte])?;
            Ok(())
        } else {
            self.write_bits(u32::from(byte), 8)
        }
    }

    /// Writes a byte slice; a single `write_all` when aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.capacity == 8 {
            self.inner.write_all(bytes)?;
            return Ok(());
        }
        for &b in bytes {
            self.write_bits(u32::from(b), 8)?;
        }
        Ok(())
    }

    /// Aligns and flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.align()?;
        self.inner.flush()?;
        Ok(())
    }

    /// Returns the sink; pending bits are lost unless [`flush`](Self::flush) ran first.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
