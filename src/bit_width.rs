//! Bitbreiten-Berechnung `⌈log₂(n)⌉` fuer Event Codes und Compact IDs.

/// Anzahl Bits um `n` unterschiedliche Werte zu codieren: `⌈log₂(n)⌉`.
///
/// - `n = 0` oder `n = 1`: 0 Bits
/// - `n = 2`: 1 Bit
/// - `n = 3..4`: 2 Bits
/// - `n = 5..8`: 3 Bits
#[inline]
pub fn for_count(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Mask with the lowest `bits` bits set; `bits` may be 0..=32.
#[inline]
pub(crate) fn mask(bits: u8) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}
