//! PDF417 high-level decoding.
//!
//! The data codewords (after the length descriptor) are a sequence of
//! compaction segments: text, byte and numeric, with ECI designators in
//! between and an optional Macro PDF417 control block at the end.

use crate::config::TextEncoding;
use crate::decoder::eci::EciOutput as Output;
use crate::decoder::PayloadError;

/// Latch to text compaction
pub const M_LATCH_TEXT: u32 = 900;
/// Latch to byte compaction (length not a multiple of 6)
pub const M_LATCH_BYTE: u32 = 901;
/// Latch to numeric compaction
pub const M_LATCH_NUMERIC: u32 = 902;
/// Next codeword is a single byte
pub const M_SHIFT_BYTE: u32 = 913;
/// Reader initialisation flag
pub const M_READER_INIT: u32 = 921;
/// Last segment of a macro sequence
pub const MACRO_TERMINATOR: u32 = 922;
/// Macro optional field designator
pub const MACRO_OPTIONAL_FIELD: u32 = 923;
/// Latch to byte compaction (length a multiple of 6)
pub const M_LATCH_BYTE_M6: u32 = 924;
/// User defined ECI
pub const ECI_CUSTOM_ID: u32 = 925;
/// General purpose ECI
pub const ECI_GENERAL_ID: u32 = 926;
/// Character set ECI
pub const ECI_CHARSET: u32 = 927;
/// Macro PDF417 control block
pub const MACRO_BLOCK: u32 = 928;

const MIXED_CHARS: &[u8; 25] = b"0123456789&\r\t,:#-.$/+%*=^";
const PUNCT_CHARS: &[u8; 29] = b";<>@[\\]_`~!\r\t,:\n-.$/\"|*()?{}'";

/// Macro PDF417 control block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacroBlock {
    pub segment_index: usize,
    pub file_id: String,
    pub segment_count: Option<usize>,
    pub file_name: Option<String>,
    pub last_segment: bool,
}

/// Decoded content of one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdf417Payload {
    pub text: String,
    pub bytes: Vec<u8>,
    pub macro_block: Option<MacroBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubMode {
    Alpha,
    Lower,
    Mixed,
    Punct,
    AlphaShift,
    PunctShift,
}

struct TextState {
    mode: SubMode,
    prior: SubMode,
}

impl TextState {
    fn new() -> Self {
        Self {
            mode: SubMode::Alpha,
            prior: SubMode::Alpha,
        }
    }

    fn shift(&mut self, to: SubMode) {
        self.prior = self.mode;
        self.mode = to;
    }

    fn value(&mut self, v: u32, out: &mut Output) {
        let ch = match self.mode {
            SubMode::Alpha => match v {
                0..=25 => Some(b'A' + v as u8),
                26 => Some(b' '),
                27 => {
                    self.mode = SubMode::Lower;
                    None
                }
                28 => {
                    self.mode = SubMode::Mixed;
                    None
                }
                _ => {
                    self.shift(SubMode::PunctShift);
                    None
                }
            },
            SubMode::Lower => match v {
                0..=25 => Some(b'a' + v as u8),
                26 => Some(b' '),
                27 => {
                    self.shift(SubMode::AlphaShift);
                    None
                }
                28 => {
                    self.mode = SubMode::Mixed;
                    None
                }
                _ => {
                    self.shift(SubMode::PunctShift);
                    None
                }
            },
            SubMode::Mixed => match v {
                0..=24 => Some(MIXED_CHARS[v as usize]),
                25 => {
                    self.mode = SubMode::Punct;
                    None
                }
                26 => Some(b' '),
                27 => {
                    self.mode = SubMode::Lower;
                    None
                }
                28 => {
                    self.mode = SubMode::Alpha;
                    None
                }
                _ => {
                    self.shift(SubMode::PunctShift);
                    None
                }
            },
            SubMode::Punct => match v {
                0..=28 => Some(PUNCT_CHARS[v as usize]),
                _ => {
                    self.mode = SubMode::Alpha;
                    None
                }
            },
            SubMode::AlphaShift => {
                self.mode = self.prior;
                match v {
                    0..=25 => Some(b'A' + v as u8),
                    26 => Some(b' '),
                    _ => None,
                }
            }
            SubMode::PunctShift => {
                self.mode = self.prior;
                match v {
                    0..=28 => Some(PUNCT_CHARS[v as usize]),
                    _ => {
                        self.mode = SubMode::Alpha;
                        None
                    }
                }
            }
        };
        if let Some(c) = ch {
            out.push(c);
        }
    }
}

/// Text compaction from `i` up to the next mode codeword; returns the index
/// of that codeword
fn text_compaction(cw: &[u32], mut i: usize, out: &mut Output) -> Result<usize, PayloadError> {
    let mut state = TextState::new();
    while i < cw.len() {
        match cw[i] {
            v if v < 900 => {
                state.value(v / 30, out);
                state.value(v % 30, out);
                i += 1;
            }
            M_SHIFT_BYTE => {
                let b = *cw.get(i + 1).ok_or(PayloadError::Truncated)?;
                out.push(u8::try_from(b).map_err(|_| PayloadError::BadValue(b))?);
                i += 2;
            }
            M_LATCH_TEXT => {
                state = TextState::new();
                i += 1;
            }
            _ => break,
        }
    }
    Ok(i)
}

/// Byte compaction: five codewords carry six bytes, leftovers one byte each.
/// Under 901 the final group is always carried as single bytes.
fn byte_compaction(cw: &[u32], i: usize, latch: u32, out: &mut Output) -> Result<usize, PayloadError> {
    let end = cw[i..]
        .iter()
        .position(|&c| c >= 900)
        .map_or(cw.len(), |p| i + p);
    let seg = &cw[i..end];
    let groups = if latch == M_LATCH_BYTE_M6 {
        seg.len() / 5
    } else {
        seg.len().saturating_sub(1) / 5
    };
    for g in seg.chunks(5).take(groups) {
        let value = g.iter().fold(0u64, |acc, &c| acc * 900 + c as u64);
        if value >> 48 != 0 {
            return Err(PayloadError::BadValue(g[0]));
        }
        for k in (0..6).rev() {
            out.push((value >> (8 * k)) as u8);
        }
    }
    for &c in &seg[groups * 5..] {
        out.push(u8::try_from(c).map_err(|_| PayloadError::BadValue(c))?);
    }
    Ok(end)
}

/// Decimal digits of a group of base-900 codewords, leading `1` removed
fn base900_to_decimal(group: &[u32]) -> Result<String, PayloadError> {
    // little-endian decimal digits
    let mut digits: Vec<u8> = vec![0];
    for &c in group {
        let mut carry = c;
        for d in digits.iter_mut() {
            let v = *d as u32 * 900 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    let text: String = digits.iter().rev().map(|&d| (b'0' + d) as char).collect();
    text.strip_prefix('1')
        .map(str::to_string)
        .ok_or(PayloadError::BadValue(group.first().copied().unwrap_or(0)))
}

/// Numeric compaction in groups of up to fifteen codewords
fn numeric_compaction(cw: &[u32], i: usize, out: &mut Output) -> Result<usize, PayloadError> {
    let end = cw[i..]
        .iter()
        .position(|&c| c >= 900)
        .map_or(cw.len(), |p| i + p);
    for group in cw[i..end].chunks(15) {
        for b in base900_to_decimal(group)?.bytes() {
            out.push(b);
        }
    }
    Ok(end)
}

fn numeric_field(cw: &[u32], i: usize) -> Result<(usize, usize), PayloadError> {
    let mut field = Output::default();
    let end = numeric_compaction(cw, i, &mut field)?;
    let digits = String::from_utf8_lossy(&field.bytes()).into_owned();
    let value = digits
        .parse::<usize>()
        .map_err(|_| PayloadError::BadValue(cw.get(i).copied().unwrap_or(0)))?;
    Ok((value, end))
}

fn macro_block(cw: &[u32], mut i: usize, encoding: TextEncoding) -> Result<(MacroBlock, usize), PayloadError> {
    if i + 2 > cw.len() {
        return Err(PayloadError::Truncated);
    }
    let index = base900_to_decimal(&cw[i..i + 2])?;
    let mut block = MacroBlock {
        segment_index: index.parse().map_err(|_| PayloadError::BadValue(cw[i]))?,
        ..MacroBlock::default()
    };
    i += 2;
    while i < cw.len() && cw[i] < 900 {
        block.file_id.push_str(&format!("{:03}", cw[i]));
        i += 1;
    }
    while i < cw.len() {
        match cw[i] {
            MACRO_OPTIONAL_FIELD => {
                let designator = *cw.get(i + 1).ok_or(PayloadError::Truncated)?;
                i += 2;
                match designator {
                    0 => {
                        let mut name = Output::default();
                        i = text_compaction(cw, i, &mut name)?;
                        block.file_name = Some(name.text(encoding));
                    }
                    1 => {
                        let (count, end) = numeric_field(cw, i)?;
                        block.segment_count = Some(count);
                        i = end;
                    }
                    // timestamp, sender, addressee, size, checksum: skipped
                    2..=6 => {
                        while i < cw.len() && cw[i] < 900 {
                            i += 1;
                        }
                    }
                    other => return Err(PayloadError::BadValue(other)),
                }
            }
            MACRO_TERMINATOR => {
                block.last_segment = true;
                i += 1;
            }
            other => return Err(PayloadError::UnknownMode(other)),
        }
    }
    Ok((block, i))
}

/// Decode corrected data codewords; `codewords[0]` is the length descriptor
pub fn decode(codewords: &[u32], encoding: TextEncoding) -> Result<Pdf417Payload, PayloadError> {
    let declared = *codewords.first().ok_or(PayloadError::Truncated)? as usize;
    if declared == 0 || declared > codewords.len() {
        return Err(PayloadError::BadLength {
            declared,
            available: codewords.len(),
        });
    }
    let cw = &codewords[..declared];
    let mut out = Output::default();
    let mut macro_info = None;
    let mut i = 1;
    while i < cw.len() {
        i = match cw[i] {
            M_LATCH_TEXT => text_compaction(cw, i + 1, &mut out)?,
            latch @ (M_LATCH_BYTE | M_LATCH_BYTE_M6) => byte_compaction(cw, i + 1, latch, &mut out)?,
            M_LATCH_NUMERIC => numeric_compaction(cw, i + 1, &mut out)?,
            M_SHIFT_BYTE => {
                let b = *cw.get(i + 1).ok_or(PayloadError::Truncated)?;
                out.push(u8::try_from(b).map_err(|_| PayloadError::BadValue(b))?);
                i + 2
            }
            ECI_CHARSET => {
                out.set_eci(*cw.get(i + 1).ok_or(PayloadError::Truncated)?);
                i + 2
            }
            ECI_GENERAL_ID => {
                if i + 2 >= cw.len() {
                    return Err(PayloadError::Truncated);
                }
                i + 3
            }
            ECI_CUSTOM_ID => i + 2,
            M_READER_INIT => i + 1,
            MACRO_BLOCK => {
                let (block, end) = macro_block(cw, i + 1, encoding)?;
                macro_info = Some(block);
                end
            }
            v if v < 900 => text_compaction(cw, i, &mut out)?,
            other => return Err(PayloadError::UnknownMode(other)),
        };
    }
    Ok(Pdf417Payload {
        text: out.text(encoding),
        bytes: out.bytes(),
        macro_block: macro_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_length(mut data: Vec<u32>) -> Vec<u32> {
        data.insert(0, data.len() as u32 + 1);
        data
    }

    fn to_base900(mut value: u128, len: usize) -> Vec<u32> {
        let mut out = vec![0u32; len];
        for slot in out.iter_mut().rev() {
            *slot = (value % 900) as u32;
            value /= 900;
        }
        out
    }

    #[test]
    fn test_text_submodes() {
        // H LL e l l o SP AS W o r l d PS ! PS
        let cw = with_length(vec![237, 131, 344, 807, 674, 521, 119, 329]);
        let payload = decode(&cw, TextEncoding::Utf8).expect("text");
        assert_eq!(payload.text, "Hello World!");
        assert!(payload.macro_block.is_none());
    }

    #[test]
    fn test_mixed_and_punct_latches() {
        // ML 1 2 PL ( ) AL B
        let values = [28, 1, 2, 25, 23, 24, 29, 1];
        let data: Vec<u32> = values.chunks(2).map(|p| p[0] * 30 + p[1]).collect();
        let payload = decode(&with_length(data), TextEncoding::Utf8).expect("text");
        assert_eq!(payload.text, "12()B");
    }

    #[test]
    fn test_byte_compaction_group_and_tail() {
        let mut data = vec![M_LATCH_BYTE];
        data.extend(to_base900(0x0102_0304_0506, 5));
        data.push(0x41);
        let payload = decode(&with_length(data), TextEncoding::Latin1).expect("bytes");
        assert_eq!(payload.bytes, vec![1, 2, 3, 4, 5, 6, 0x41]);
    }

    #[test]
    fn test_numeric_compaction() {
        let mut data = vec![M_LATCH_NUMERIC];
        data.extend(to_base900(112_345_678_901, 4));
        let payload = decode(&with_length(data), TextEncoding::Utf8).expect("digits");
        assert_eq!(payload.text, "12345678901");
    }

    #[test]
    fn test_eci_selects_utf8() {
        let data = vec![ECI_CHARSET, 26, M_LATCH_BYTE, 0xC3, 0xA9];
        let payload = decode(&with_length(data), TextEncoding::Latin1).expect("eci");
        assert_eq!(payload.text, "\u{e9}");
    }

    #[test]
    fn test_macro_block() {
        // "AB" then segment 0 of 3 in file 017042, last segment
        let data = vec![1, MACRO_BLOCK, 111, 100, 17, 42, MACRO_OPTIONAL_FIELD, 1, 13, MACRO_TERMINATOR];
        let payload = decode(&with_length(data), TextEncoding::Utf8).expect("macro");
        assert_eq!(payload.text, "AB");
        let block = payload.macro_block.expect("block");
        assert_eq!(block.segment_index, 0);
        assert_eq!(block.file_id, "017042");
        assert_eq!(block.segment_count, Some(3));
        assert!(block.last_segment);
    }

    #[test]
    fn test_rejects_bad_length_and_mode() {
        assert!(matches!(
            decode(&[10, 1, 2], TextEncoding::Utf8),
            Err(PayloadError::BadLength { .. })
        ));
        assert_eq!(
            decode(&[2, 915], TextEncoding::Utf8),
            Err(PayloadError::UnknownMode(915))
        );
    }
}
