//! Modified UTF-8 as used by `CONSTANT_Utf8` entries.
//!
//! Differs from standard UTF-8 in two places: U+0000 is written as the two-byte sequence
//! `C0 80`, and supplementary characters are written as a surrogate pair with each half encoded
//! as a three-byte sequence.

use crate::Result;

/// Decodes modified UTF-8 into a `String`.
///
/// Unpaired surrogates decode to U+FFFD.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated or invalid byte sequences.
pub fn decode(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        // Plain ASCII, the overwhelmingly common case for names and descriptors
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = u16::from(bytes[i]);
        if b0 & 0x80 == 0 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push(((b0 & 0x1F) << 6) | b1);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push(((b0 & 0x0F) << 12) | (b1 << 6) | b2);
            i += 3;
        } else {
            return Err(malformed_error!("Invalid modified UTF-8 lead byte {:#x}", b0));
        }
    }

    Ok(char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        Some(&b) => Err(malformed_error!(
            "Invalid modified UTF-8 continuation byte {:#x}",
            b
        )),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encodes `value` as modified UTF-8.
#[must_use]
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push((0xC0 | ((unit >> 6) & 0x1F)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
            _ => {
                out.push((0xE0 | ((unit >> 12) & 0x0F)) as u8);
                out.push((0x80 | ((unit >> 6) & 0x3F)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        assert_eq!(encode("java/lang/Object"), b"java/lang/Object");
        assert_eq!(decode(b"()V").unwrap(), "()V");
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_as_surrogates() {
        let encoded = encode("\u{1F600}");
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[0], 0xED);
        assert_eq!(decode(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn bmp_three_bytes() {
        assert_eq!(encode("\u{20AC}"), vec![0xE2, 0x82, 0xAC]);
        assert_eq!(decode(&[0xE2, 0x82, 0xAC]).unwrap(), "\u{20AC}");
    }

    #[test]
    fn truncated_sequence() {
        assert!(decode(&[0xE2, 0x82]).is_err());
        assert!(decode(&[0xFF]).is_err());
    }
}
