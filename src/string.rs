//! String literal (EXI §7.1.10, no restricted character set).
//!
//! Length in characters as unsigned integer, then every code point as
//! unsigned integer. The string table (EXI §7.3) shifts the length by a
//! hit/miss offset; [`encode_with_offset`] and [`decode_chars`] serve that.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze fuer die Vorab-Allokation, unabhaengig von der gelesenen Laenge.
const MAX_PREALLOC: usize = 64 * 1024;

/// Encodes a length-prefixed string.
pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: &str) -> Result<()> {
    encode_with_offset(channel, value, 0)
}

/// Encodes `value` with its character count shifted by `offset`.
pub fn encode_with_offset<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    value: &str,
    offset: u64,
) -> Result<()> {
    if value.is_ascii() {
        // ASCII: ein Byte pro Code Point, identisch mit dem Rohbyte
        unsigned_integer::encode(channel, value.len() as u64 + offset)?;
        return channel.write_bytes(value.as_bytes());
    }
    unsigned_integer::encode(channel, value.chars().count() as u64 + offset)?;
    for ch in value.chars() {
        unsigned_integer::encode(channel, u64::from(u32::from(ch)))?;
    }
    Ok(())
}

/// Decodes a length-prefixed string.
///
/// # Errors
///
/// `InvalidCodePoint` for surrogates or values above U+10FFFF.
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<String> {
    let len = unsigned_integer::decode(channel)?;
    decode_chars(channel, len)
}

/// Decodes `len` code points whose length prefix was already consumed.
pub fn decode_chars<C: DecoderChannel + ?Sized>(channel: &mut C, len: u64) -> Result<String> {
    let cap = usize::try_from(len).unwrap_or(MAX_PREALLOC).min(MAX_PREALLOC);
    let mut s = String::with_capacity(cap);
    for _ in 0..len {
        let cp = unsigned_integer::decode(channel)?;
        let ch = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidCodePoint(cp))?;
        s.push(ch);
    }
    Ok(s)
}
