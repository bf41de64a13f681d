//! Code39 fixture rows.

use crate::decoder::code39::{ALPHABET, ASTERISK_ENCODING, CHARACTER_ENCODINGS};

/// Element widths (narrow 1, wide 3) of `*text*`, starting with a bar.
/// Characters outside the 43-character set are rejected.
pub fn elements(text: &str) -> Option<Vec<u32>> {
    let mut patterns = vec![ASTERISK_ENCODING];
    for c in text.bytes() {
        let i = ALPHABET.iter().position(|&a| a == c)?;
        patterns.push(CHARACTER_ENCODINGS[i]);
    }
    patterns.push(ASTERISK_ENCODING);
    let mut out = Vec::with_capacity(patterns.len() * 10);
    for (k, p) in patterns.iter().enumerate() {
        for bit in (0..9).rev() {
            out.push(if (p >> bit) & 1 == 1 { 3 } else { 1 });
        }
        if k + 1 < patterns.len() {
            out.push(1);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_width() {
        let e = elements("A").expect("valid");
        // three characters of 15 modules plus two gaps
        assert_eq!(e.iter().sum::<u32>(), 47);
        assert!(elements("a").is_none());
    }
}
