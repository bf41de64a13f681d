//! Bit-stream grammar of DataBar Expanded.
//!
//! The leading bits select an encodation method: compressed GTIN with
//! optional weight, price or date fields, or a free general-purpose field.
//! General-purpose data switches between numeric, alphanumeric and ISO-646
//! states through latch sequences; FNC1 ends a variable-length element.

use crate::decoder::gs1;

const FNC1: u8 = 10;
const GTIN_BITS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Numeric,
    Alpha,
    Iso646,
}

enum Block {
    Continue,
    Finished { remaining: Option<u8> },
}

struct Field {
    pos: usize,
    text: String,
    remaining: Option<u8>,
}

struct FieldDecoder<'a> {
    bits: &'a [bool],
    pos: usize,
    encoding: Encoding,
    buffer: String,
}

fn value(bits: &[bool], pos: usize, len: usize) -> Option<u32> {
    let slice = bits.get(pos..pos + len)?;
    Some(slice.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32))
}

impl<'a> FieldDecoder<'a> {
    fn new(bits: &'a [bool]) -> Self {
        Self {
            bits,
            pos: 0,
            encoding: Encoding::Numeric,
            buffer: String::new(),
        }
    }

    fn size(&self) -> usize {
        self.bits.len()
    }

    fn bit(&self, pos: usize) -> bool {
        self.bits.get(pos).copied().unwrap_or(false)
    }

    fn value(&self, pos: usize, len: usize) -> Option<u32> {
        value(self.bits, pos, len)
    }

    /// Decode element strings from `start` to the end, parsing each
    /// FNC1-terminated chunk into `(AI)value` form
    fn decode_all(&mut self, out: &mut String, start: usize) -> Option<()> {
        let mut pos = start;
        let mut remaining = None;
        loop {
            let field = self.decode_field(pos, remaining)?;
            if !field.text.is_empty() {
                out.push_str(&gs1::parse_fields(&field.text)?);
            }
            remaining = field.remaining;
            if field.pos == pos {
                break;
            }
            pos = field.pos;
        }
        Some(())
    }

    fn decode_field(&mut self, pos: usize, remaining: Option<u8>) -> Option<Field> {
        self.buffer.clear();
        if let Some(d) = remaining {
            self.buffer.push((b'0' + d) as char);
        }
        self.pos = pos;
        let remaining = self.parse_blocks()?;
        Some(Field {
            pos: self.pos,
            text: self.buffer.clone(),
            remaining,
        })
    }

    fn parse_blocks(&mut self) -> Option<Option<u8>> {
        loop {
            let initial = self.pos;
            let block = match self.encoding {
                Encoding::Alpha => self.alpha_block()?,
                Encoding::Iso646 => self.iso_block()?,
                Encoding::Numeric => self.numeric_block()?,
            };
            if let Block::Finished { remaining } = block {
                return Some(remaining);
            }
            if initial == self.pos {
                return Some(None);
            }
        }
    }

    fn still_numeric(&self, pos: usize) -> bool {
        if pos + 7 > self.size() {
            return pos + 4 <= self.size();
        }
        (pos..pos + 4).any(|i| self.bit(i))
    }

    fn decode_numeric(&self, pos: usize) -> Option<(usize, u8, u8)> {
        if pos + 7 > self.size() {
            let numeric = self.value(pos, 4)?;
            if numeric == 0 {
                return Some((self.size(), FNC1, FNC1));
            }
            let digit = u8::try_from(numeric - 1).ok().filter(|&d| d <= FNC1)?;
            return Some((self.size(), digit, FNC1));
        }
        let numeric = self.value(pos, 7)?;
        if numeric < 8 {
            return None;
        }
        let first = ((numeric - 8) / 11) as u8;
        let second = ((numeric - 8) % 11) as u8;
        (first <= FNC1).then_some((pos + 7, first, second))
    }

    fn numeric_block(&mut self) -> Option<Block> {
        while self.still_numeric(self.pos) {
            let (next, first, second) = self.decode_numeric(self.pos)?;
            self.pos = next;
            if first == FNC1 {
                let remaining = (second != FNC1).then_some(second);
                return Some(Block::Finished { remaining });
            }
            self.buffer.push((b'0' + first) as char);
            if second == FNC1 {
                return Some(Block::Finished { remaining: None });
            }
            self.buffer.push((b'0' + second) as char);
        }
        if self.numeric_to_alpha_latch(self.pos) {
            self.encoding = Encoding::Alpha;
            self.pos += 4;
        }
        Some(Block::Continue)
    }

    fn numeric_to_alpha_latch(&self, pos: usize) -> bool {
        if pos + 1 > self.size() {
            return false;
        }
        (pos..(pos + 4).min(self.size())).all(|i| !self.bit(i))
    }

    fn alpha_or_iso_to_numeric_latch(&self, pos: usize) -> bool {
        if pos + 3 > self.size() {
            return false;
        }
        (pos..pos + 3).all(|i| !self.bit(i))
    }

    fn alpha_iso_swap_latch(&self, pos: usize) -> bool {
        if pos + 1 > self.size() {
            return false;
        }
        (0..5)
            .take_while(|&i| pos + i < self.size())
            .all(|i| if i == 2 { self.bit(pos + 2) } else { !self.bit(pos + i) })
    }

    fn finish_text_block(&mut self, other: Encoding) {
        if self.alpha_or_iso_to_numeric_latch(self.pos) {
            self.pos += 3;
            self.encoding = Encoding::Numeric;
        } else if self.alpha_iso_swap_latch(self.pos) {
            if self.pos + 5 < self.size() {
                self.pos += 5;
            } else {
                self.pos = self.size();
            }
            self.encoding = other;
        }
    }

    fn still_alpha(&self, pos: usize) -> bool {
        let Some(five) = self.value(pos, 5) else {
            return false;
        };
        if (5..16).contains(&five) {
            return true;
        }
        self.value(pos, 6).is_some_and(|six| (16..63).contains(&six))
    }

    // (next position, character or None for FNC1)
    fn decode_alpha(&self, pos: usize) -> Option<(usize, Option<char>)> {
        let five = self.value(pos, 5)?;
        if five == 15 {
            return Some((pos + 5, None));
        }
        if (5..15).contains(&five) {
            return Some((pos + 5, Some((b'0' + (five - 5) as u8) as char)));
        }
        let six = self.value(pos, 6)?;
        if (32..58).contains(&six) {
            return Some((pos + 6, Some((six as u8 + 33) as char)));
        }
        let c = match six {
            58 => '*',
            59 => ',',
            60 => '-',
            61 => '.',
            62 => '/',
            _ => return None,
        };
        Some((pos + 6, Some(c)))
    }

    fn alpha_block(&mut self) -> Option<Block> {
        while self.still_alpha(self.pos) {
            let (next, c) = self.decode_alpha(self.pos)?;
            self.pos = next;
            match c {
                Some(c) => self.buffer.push(c),
                None => return Some(Block::Finished { remaining: None }),
            }
        }
        self.finish_text_block(Encoding::Iso646);
        Some(Block::Continue)
    }

    fn still_iso(&self, pos: usize) -> bool {
        let Some(five) = self.value(pos, 5) else {
            return false;
        };
        if (5..16).contains(&five) {
            return true;
        }
        let Some(seven) = self.value(pos, 7) else {
            return false;
        };
        if (64..116).contains(&seven) {
            return true;
        }
        self.value(pos, 8).is_some_and(|eight| (232..253).contains(&eight))
    }

    fn decode_iso(&self, pos: usize) -> Option<(usize, Option<char>)> {
        let five = self.value(pos, 5)?;
        if five == 15 {
            return Some((pos + 5, None));
        }
        if (5..15).contains(&five) {
            return Some((pos + 5, Some((b'0' + (five - 5) as u8) as char)));
        }
        let seven = self.value(pos, 7)?;
        if (64..90).contains(&seven) {
            return Some((pos + 7, Some((seven as u8 + 1) as char)));
        }
        if (90..116).contains(&seven) {
            return Some((pos + 7, Some((seven as u8 + 7) as char)));
        }
        let c = match self.value(pos, 8)? {
            232 => '!',
            233 => '"',
            234 => '%',
            235 => '&',
            236 => '\'',
            237 => '(',
            238 => ')',
            239 => '*',
            240 => '+',
            241 => ',',
            242 => '-',
            243 => '.',
            244 => '/',
            245 => ':',
            246 => ';',
            247 => '<',
            248 => '=',
            249 => '>',
            250 => '?',
            251 => '_',
            252 => ' ',
            _ => return None,
        };
        Some((pos + 8, Some(c)))
    }

    fn iso_block(&mut self) -> Option<Block> {
        while self.still_iso(self.pos) {
            let (next, c) = self.decode_iso(self.pos)?;
            self.pos = next;
            match c {
                Some(c) => self.buffer.push(c),
                None => return Some(Block::Finished { remaining: None }),
            }
        }
        self.finish_text_block(Encoding::Alpha);
        Some(Block::Continue)
    }
}

/// Twelve GTIN digits in four 10-bit groups followed by the check digit.
/// `prefix` holds the leading digit already written.
fn push_compressed_gtin(bits: &[bool], out: &mut String, pos: usize, prefix: char) -> Option<()> {
    let mut digits = String::with_capacity(14);
    digits.push(prefix);
    for i in 0..4 {
        let group = value(bits, pos + 10 * i, 10)?;
        if group > 999 {
            return None;
        }
        digits.push_str(&format!("{group:03}"));
    }
    let check = gs1::gtin_check_digit(&digits)?;
    out.push_str("(01)");
    out.push_str(&digits);
    out.push((b'0' + check) as char);
    Some(())
}

fn ai01_and_other_ais(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 4;
    let first = value(bits, HEADER, 4)?;
    if first > 9 {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER + 4, (b'0' + first as u8) as char)?;
    FieldDecoder::new(bits).decode_all(&mut out, HEADER + 4 + GTIN_BITS)?;
    Some(out)
}

fn any_ai(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 5;
    let mut out = String::new();
    FieldDecoder::new(bits).decode_all(&mut out, HEADER)?;
    Some(out)
}

fn push_weight(out: &mut String, ai: &str, weight: u32) {
    out.push('(');
    out.push_str(ai);
    out.push(')');
    out.push_str(&format!("{weight:06}"));
}

/// 01 + 3103: variable-measure GTIN with a 15-bit net weight in kilograms
fn ai01_3103(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 5;
    const WEIGHT: usize = 15;
    if bits.len() != HEADER + GTIN_BITS + WEIGHT {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER, '9')?;
    let weight = value(bits, HEADER + GTIN_BITS, WEIGHT)?;
    push_weight(&mut out, "3103", weight);
    Some(out)
}

/// 01 + 3202/3203: weight in pounds, the decimal position folded into the value
fn ai01_320x(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 5;
    const WEIGHT: usize = 15;
    if bits.len() != HEADER + GTIN_BITS + WEIGHT {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER, '9')?;
    let weight = value(bits, HEADER + GTIN_BITS, WEIGHT)?;
    if weight < 10_000 {
        push_weight(&mut out, "3202", weight);
    } else {
        push_weight(&mut out, "3203", weight - 10_000);
    }
    Some(out)
}

/// 01 + 392x: price with the decimal position in two bits
fn ai01_392x(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 8;
    if bits.len() < HEADER + GTIN_BITS {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER, '9')?;
    let decimals = value(bits, HEADER + GTIN_BITS, 2)?;
    out.push_str(&format!("(392{decimals})"));
    let field = FieldDecoder::new(bits).decode_field(HEADER + GTIN_BITS + 2, None)?;
    out.push_str(&field.text);
    Some(out)
}

/// 01 + 393x: price with an ISO 4217 currency code
fn ai01_393x(bits: &[bool]) -> Option<String> {
    const HEADER: usize = 8;
    if bits.len() < HEADER + GTIN_BITS {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER, '9')?;
    let decimals = value(bits, HEADER + GTIN_BITS, 2)?;
    let currency = value(bits, HEADER + GTIN_BITS + 2, 10)?;
    if currency > 999 {
        return None;
    }
    out.push_str(&format!("(393{decimals}){currency:03}"));
    let field = FieldDecoder::new(bits).decode_field(HEADER + GTIN_BITS + 12, None)?;
    out.push_str(&field.text);
    Some(out)
}

/// 01 + 310x/320x + 11/13/15/17: weight and a compressed YYMMDD date
fn ai01_weight_date(bits: &[bool], weight_ai: &str, date_ai: &str) -> Option<String> {
    const HEADER: usize = 8;
    const WEIGHT: usize = 20;
    const DATE: usize = 16;
    if bits.len() != HEADER + GTIN_BITS + WEIGHT + DATE {
        return None;
    }
    let mut out = String::new();
    push_compressed_gtin(bits, &mut out, HEADER, '9')?;
    let weight = value(bits, HEADER + GTIN_BITS, WEIGHT)?;
    let ai = format!("{weight_ai}{}", weight / 100_000);
    push_weight(&mut out, &ai, weight % 100_000);
    let mut date = value(bits, HEADER + GTIN_BITS + WEIGHT, DATE)?;
    // all-ones date means "no date"
    if date != 38_400 {
        let day = date % 32;
        date /= 32;
        let month = date % 12 + 1;
        let year = date / 12;
        out.push_str(&format!("({date_ai}){year:02}{month:02}{day:02}"));
    }
    Some(out)
}

/// Decode the data characters' bit stream (linkage flag first) into GS1
/// element strings
pub fn decode_bits(bits: &[bool]) -> Option<String> {
    if bits.len() < 5 {
        return None;
    }
    if bits[1] {
        return ai01_and_other_ais(bits);
    }
    if !bits[2] {
        return any_ai(bits);
    }
    match value(bits, 1, 4)? {
        4 => return ai01_3103(bits),
        5 => return ai01_320x(bits),
        _ => {}
    }
    match value(bits, 1, 5)? {
        12 => return ai01_392x(bits),
        13 => return ai01_393x(bits),
        _ => {}
    }
    let (weight_ai, date_ai) = match value(bits, 1, 7)? {
        56 => ("310", "11"),
        57 => ("320", "11"),
        58 => ("310", "13"),
        59 => ("320", "13"),
        60 => ("310", "15"),
        61 => ("320", "15"),
        62 => ("310", "17"),
        63 => ("320", "17"),
        _ => return None,
    };
    ai01_weight_date(bits, weight_ai, date_ai)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(bits: &mut Vec<bool>, value: u32, len: usize) {
        for i in (0..len).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    }

    fn pad_to_chars(bits: &mut Vec<bool>) {
        while bits.len() % 12 != 0 {
            bits.push(false);
        }
    }

    #[test]
    fn test_ai01_3103() {
        let mut bits = Vec::new();
        push(&mut bits, 0b0_0100, 5);
        for group in [1, 234, 567, 890] {
            push(&mut bits, group, 10);
        }
        push(&mut bits, 1750, 15);
        assert_eq!(bits.len(), 60);
        assert_eq!(
            decode_bits(&bits).as_deref(),
            Some("(01)90012345678908(3103)001750")
        );
    }

    #[test]
    fn test_any_ai_numeric_with_fnc1() {
        let mut bits = Vec::new();
        push(&mut bits, 0b0_00_00, 5);
        // "10" "12" "34" FNC1 then "21" "99"
        for (a, b) in [(1, 0), (1, 2), (3, 4), (FNC1 as u32, 2), (1, 9), (9, FNC1 as u32)] {
            push(&mut bits, 8 + 11 * a + b, 7);
        }
        pad_to_chars(&mut bits);
        assert_eq!(decode_bits(&bits).as_deref(), Some("(10)1234(21)99"));
    }

    #[test]
    fn test_alphanumeric_latch() {
        let mut bits = Vec::new();
        push(&mut bits, 0b0_00_00, 5);
        push(&mut bits, 8 + 11, 7); // "10"
        push(&mut bits, 0, 4); // latch to alphanumeric
        push(&mut bits, 32, 6); // 'A'
        push(&mut bits, 33, 6); // 'B'
        push(&mut bits, 5 + 7, 5); // '7'
        pad_to_chars(&mut bits);
        assert_eq!(decode_bits(&bits).as_deref(), Some("(10)AB7"));
    }

    #[test]
    fn test_weight_and_date() {
        let mut bits = Vec::new();
        push(&mut bits, 0b0_0111_000, 8); // 310x + (11)
        for group in [1, 234, 567, 890] {
            push(&mut bits, group, 10);
        }
        push(&mut bits, 2 * 100_000 + 1234, 20);
        // 2024-03-15: ((24 * 12) + 2) * 32 + 15
        push(&mut bits, (24 * 12 + 2) * 32 + 15, 16);
        assert_eq!(bits.len(), 84);
        assert_eq!(
            decode_bits(&bits).as_deref(),
            Some("(01)90012345678908(3102)001234(11)240315")
        );
    }

    #[test]
    fn test_rejects_bad_gtin_group() {
        let mut bits = Vec::new();
        push(&mut bits, 0b0_0100, 5);
        push(&mut bits, 1000, 10);
        push(&mut bits, 0, 45);
        assert!(decode_bits(&bits).is_none());
    }
}
