//! Code39 family: Standard, Full ASCII and PZN.
//!
//! Each character is nine elements (five bars, four spaces), three of them
//! wide, separated by a light inter-character gap. Narrow and wide are split
//! by the lowest threshold that leaves exactly three wide elements, so any
//! wide/narrow ratio between 2 and 3 reads the same.

use super::LinearRead;
use crate::config::Code39Checksum;
use crate::models::{BarcodeType, BarcodeTypes};

pub(crate) const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-. $/+%";

/// Nine-bit wide/narrow patterns, first element in the most significant bit
pub(crate) const CHARACTER_ENCODINGS: [u16; 43] = [
    0x034, 0x121, 0x061, 0x160, 0x031, 0x130, 0x070, 0x025, 0x124, 0x064, // 0-9
    0x109, 0x049, 0x148, 0x019, 0x118, 0x058, 0x00D, 0x10C, 0x04C, 0x01C, // A-J
    0x103, 0x043, 0x142, 0x013, 0x112, 0x052, 0x007, 0x106, 0x046, 0x016, // K-T
    0x181, 0x0C1, 0x1C0, 0x091, 0x190, 0x0D0, 0x085, 0x184, 0x0C4, 0x0A8, // U-$
    0x0A2, 0x08A, 0x02A, // /-%
];

/// Start/stop character `*`
pub(crate) const ASTERISK_ENCODING: u16 = 0x094;

/// Wide/narrow pattern of nine runs, `None` unless exactly three are wide
fn to_pattern(counts: &[u32]) -> Option<u16> {
    let mut max_narrow = 0u32;
    loop {
        let min_counter = counts.iter().copied().filter(|&c| c > max_narrow).min()?;
        max_narrow = min_counter;
        let mut wide = 0;
        let mut total_wide = 0u32;
        let mut pattern = 0u16;
        for (i, &c) in counts.iter().enumerate() {
            if c > max_narrow {
                pattern |= 1 << (8 - i);
                wide += 1;
                total_wide += c;
            }
        }
        if wide == 3 {
            // no single wide element may dominate the others
            if counts
                .iter()
                .any(|&c| c > max_narrow && c * 2 >= total_wide)
            {
                return None;
            }
            return Some(pattern);
        }
        if wide < 3 {
            return None;
        }
    }
}

fn pattern_to_char(pattern: u16) -> Option<u8> {
    if pattern == ASTERISK_ENCODING {
        return Some(b'*');
    }
    CHARACTER_ENCODINGS
        .iter()
        .position(|&p| p == pattern)
        .map(|i| ALPHABET[i])
}

fn char_value(c: u8) -> Option<usize> {
    ALPHABET.iter().position(|&a| a == c)
}

/// Modulo-43 check character for `data`
pub(crate) fn mod43_check(data: &[u8]) -> Option<u8> {
    let mut sum = 0usize;
    for &c in data {
        sum += char_value(c)?;
    }
    Some(ALPHABET[sum % 43])
}

/// Expand Full ASCII shift pairs; `None` on an invalid pair
pub(crate) fn decode_extended(raw: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let c = raw[i];
        if matches!(c, b'+' | b'$' | b'%' | b'/') {
            let next = *raw.get(i + 1)?;
            let decoded: u8 = match c {
                b'+' if next.is_ascii_uppercase() => next + 32,
                b'$' if next.is_ascii_uppercase() => next - 64,
                b'%' => match next {
                    b'A'..=b'E' => next - 38,
                    b'F'..=b'J' => next - 11,
                    b'K'..=b'O' => next + 16,
                    b'P'..=b'T' => next + 43,
                    b'U' => 0,
                    b'V' => b'@',
                    b'W' => b'`',
                    b'X' | b'Y' | b'Z' => 127,
                    _ => return None,
                },
                b'/' => match next {
                    b'A'..=b'O' => next - 32,
                    b'Z' => b':',
                    _ => return None,
                },
                _ => return None,
            };
            out.push(decoded as char);
            i += 2;
        } else {
            out.push(c as char);
            i += 1;
        }
    }
    Some(out)
}

/// Validate a PZN body (digits after the leading '-'): PZN7 weights 2..7,
/// PZN8 weights 1..7, check digit is the weighted sum modulo 11
pub(crate) fn pzn_valid(digits: &[u8]) -> bool {
    if !(digits.len() == 7 || digits.len() == 8) || !digits.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let first_weight = if digits.len() == 7 { 2 } else { 1 };
    let (body, check) = digits.split_at(digits.len() - 1);
    let sum: u32 = body
        .iter()
        .enumerate()
        .map(|(i, &d)| (d - b'0') as u32 * (first_weight + i as u32))
        .sum();
    let expected = sum % 11;
    expected < 10 && expected == (check[0] - b'0') as u32
}

/// Raw characters between start and stop on a run sequence, with the run
/// index range they cover
fn read_symbol(runs: &[u32], first_dark: bool, start: usize) -> Option<(Vec<u8>, usize)> {
    let dark = |i: usize| first_dark ^ (i % 2 == 1);
    if !dark(start) || start + 9 > runs.len() {
        return None;
    }
    if to_pattern(&runs[start..start + 9]) != Some(ASTERISK_ENCODING) {
        return None;
    }
    let char_width: u32 = runs[start..start + 9].iter().sum();
    // leading quiet zone of at least half a character
    if start == 0 || runs[start - 1] * 2 < char_width {
        return None;
    }
    let mut raw = Vec::new();
    let mut i = start + 10;
    loop {
        if i + 9 > runs.len() {
            return None;
        }
        let counts = &runs[i..i + 9];
        let width: u32 = counts.iter().sum();
        if width * 2 < char_width || width > char_width * 2 {
            return None;
        }
        let c = pattern_to_char(to_pattern(counts)?)?;
        if c == b'*' {
            let after = i + 9;
            // trailing quiet zone, or the end of the line
            if after < runs.len() && runs[after] * 2 < char_width {
                return None;
            }
            return Some((raw, after));
        }
        // inter-character gap must be light and no wider than a character
        if runs.get(i + 9).is_some_and(|&gap| gap > width) {
            return None;
        }
        raw.push(c);
        i += 10;
    }
}

/// Decode every Code39-family symbol on one line of runs.
pub fn decode_runs(
    runs: &[u32],
    first_dark: bool,
    kinds: BarcodeTypes,
    checksum: Code39Checksum,
) -> Vec<LinearRead> {
    let mut out = decode_direction(runs, first_dark, kinds, checksum);
    let mut reversed: Vec<u32> = runs.to_vec();
    reversed.reverse();
    let rev_first_dark = first_dark ^ (runs.len() % 2 == 0);
    let total: usize = runs.iter().map(|&r| r as usize).sum();
    for mut read in decode_direction(&reversed, rev_first_dark, kinds, checksum) {
        let (s, e) = (total - read.end, total - read.start);
        read.start = s;
        read.end = e;
        read.reversed = true;
        out.push(read);
    }
    out
}

fn decode_direction(
    runs: &[u32],
    first_dark: bool,
    kinds: BarcodeTypes,
    checksum: Code39Checksum,
) -> Vec<LinearRead> {
    let mut out = Vec::new();
    let mut offsets = Vec::with_capacity(runs.len() + 1);
    let mut pos = 0usize;
    for &r in runs {
        offsets.push(pos);
        pos += r as usize;
    }
    offsets.push(pos);

    let mut i = 0;
    while i + 9 <= runs.len() {
        let Some((raw, end_run)) = read_symbol(runs, first_dark, i) else {
            i += 1;
            continue;
        };
        let start = offsets[i];
        let end = offsets[end_run];
        if let Some((symbology, text)) = interpret(&raw, kinds, checksum) {
            let modules = (raw.len() + 2) as f32 * 13.0;
            out.push(LinearRead {
                symbology,
                text,
                start,
                end,
                reversed: false,
                module_len: (end - start) as f32 / modules,
                confidence: 1.0,
            });
        }
        i = end_run;
    }
    out
}

/// Apply PZN, check-character and Full ASCII rules to raw characters
fn interpret(
    raw: &[u8],
    kinds: BarcodeTypes,
    checksum: Code39Checksum,
) -> Option<(BarcodeType, String)> {
    if raw.is_empty() {
        return None;
    }
    if kinds.contains(BarcodeType::Pzn) && raw[0] == b'-' && pzn_valid(&raw[1..]) {
        let digits = String::from_utf8_lossy(&raw[1..]).into_owned();
        return Some((BarcodeType::Pzn, digits));
    }
    let data = match checksum {
        Code39Checksum::None => raw,
        Code39Checksum::Mod43 => {
            let (body, check) = raw.split_at(raw.len() - 1);
            if body.is_empty() || mod43_check(body)? != check[0] {
                tracing::trace!("code39 check character mismatch");
                return None;
            }
            body
        }
    };
    let has_shift = data.iter().any(|c| matches!(c, b'+' | b'$' | b'%' | b'/'));
    if kinds.contains(BarcodeType::Code39Extended)
        && (has_shift || !kinds.contains(BarcodeType::Code39))
    {
        if let Some(text) = decode_extended(data) {
            return Some((BarcodeType::Code39Extended, text));
        }
    }
    if kinds.contains(BarcodeType::Code39) {
        return Some((
            BarcodeType::Code39,
            String::from_utf8_lossy(data).into_owned(),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs_for(text: &str, narrow: u32, wide: u32) -> Vec<u32> {
        let mut runs = vec![10 * narrow];
        let chars: Vec<u16> = std::iter::once(ASTERISK_ENCODING)
            .chain(text.bytes().map(|c| {
                let i = ALPHABET.iter().position(|&a| a == c).unwrap();
                CHARACTER_ENCODINGS[i]
            }))
            .chain(std::iter::once(ASTERISK_ENCODING))
            .collect();
        for (k, p) in chars.iter().enumerate() {
            for bit in (0..9).rev() {
                runs.push(if p >> bit & 1 == 1 { wide } else { narrow });
            }
            if k + 1 < chars.len() {
                runs.push(narrow);
            }
        }
        runs.push(10 * narrow);
        runs
    }

    #[test]
    fn test_pattern_threshold() {
        assert_eq!(to_pattern(&[2, 2, 2, 5, 5, 2, 5, 2, 2]), Some(0x034));
        assert_eq!(to_pattern(&[3, 3, 3, 7, 8, 3, 6, 2, 3]), Some(0x034));
        assert_eq!(to_pattern(&[1; 9]), None);
    }

    #[test]
    fn test_decodes_standard() {
        let runs = runs_for("CODE-39", 2, 5);
        let reads = decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::None);
        let forward: Vec<_> = reads.iter().filter(|r| !r.reversed).collect();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].text, "CODE-39");
        assert_eq!(forward[0].symbology, BarcodeType::Code39);
        assert_eq!(forward[0].start, 20);
    }

    #[test]
    fn test_decodes_reversed_line() {
        let mut runs = runs_for("ABC", 3, 8);
        runs.reverse();
        let reads = decode_runs(&runs, false, BarcodeTypes::CODE39_FAMILY, Code39Checksum::None);
        assert_eq!(reads.len(), 1);
        assert!(reads[0].reversed);
        assert_eq!(reads[0].text, "ABC");
    }

    #[test]
    fn test_checksum_policy() {
        let check = mod43_check(b"ABC").unwrap() as char;
        let good = format!("ABC{}", check);
        let runs = runs_for(&good, 2, 5);
        let reads = decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::Mod43);
        assert_eq!(reads[0].text, "ABC");
        // corrupt check character
        let bad_check = if check == 'Z' { 'Y' } else { 'Z' };
        let runs = runs_for(&format!("ABC{}", bad_check), 2, 5);
        assert!(decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::Mod43).is_empty());
    }

    #[test]
    fn test_full_ascii() {
        assert_eq!(decode_extended(b"+H+E+L+L+O").as_deref(), Some("hello"));
        assert_eq!(decode_extended(b"A/A%U$M").as_deref(), Some("A!\0\r"));
        assert_eq!(decode_extended(b"/Z%V").as_deref(), Some(":@"));
        assert!(decode_extended(b"+1").is_none());
        assert!(decode_extended(b"AB%").is_none());
        let runs = runs_for("+A+B", 2, 5);
        let reads = decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::None);
        assert_eq!(reads[0].symbology, BarcodeType::Code39Extended);
        assert_eq!(reads[0].text, "ab");
    }

    #[test]
    fn test_pzn() {
        // PZN7 123456 -> (1*2+2*3+3*4+4*5+5*6+6*7) % 11 = 112 % 11 = 2
        assert!(pzn_valid(b"1234562"));
        assert!(!pzn_valid(b"1234563"));
        // PZN8 0123456 -> (0*1+1*2+2*3+3*4+4*5+5*6+6*7) % 11 = 112 % 11 = 2
        assert!(pzn_valid(b"01234562"));
        let runs = runs_for("-1234562", 2, 5);
        let reads = decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::None);
        assert_eq!(reads[0].symbology, BarcodeType::Pzn);
        assert_eq!(reads[0].text, "1234562");
    }

    #[test]
    fn test_missing_quiet_zone() {
        let mut runs = runs_for("AB", 2, 5);
        runs[0] = 2;
        assert!(decode_runs(&runs, false, BarcodeTypes::ALL, Code39Checksum::None).is_empty());
    }
}
