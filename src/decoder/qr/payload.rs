//! Segment decoding of corrected QR and Micro QR data codewords.

use crate::config::TextEncoding;
use crate::decoder::eci::EciOutput;
use crate::decoder::PayloadError;
use crate::models::{StructuredAppend, Version};

const ALPHANUMERIC: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";
const GROUP_SEPARATOR: u8 = 0x1D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Terminator,
    Numeric,
    Alphanumeric,
    Byte,
    Kanji,
    Eci,
    StructuredAppend,
    Fnc1First,
    Fnc1Second,
}

impl Mode {
    fn from_indicator(version: Version, bits: u32) -> Result<Self, PayloadError> {
        let mode = match version {
            Version::Micro(_) => match bits {
                0 => Mode::Numeric,
                1 => Mode::Alphanumeric,
                2 => Mode::Byte,
                3 => Mode::Kanji,
                _ => return Err(PayloadError::UnknownMode(bits)),
            },
            Version::Model2(_) => match bits {
                0b0000 => Mode::Terminator,
                0b0001 => Mode::Numeric,
                0b0010 => Mode::Alphanumeric,
                0b0011 => Mode::StructuredAppend,
                0b0100 => Mode::Byte,
                0b0101 => Mode::Fnc1First,
                0b0111 => Mode::Eci,
                0b1000 => Mode::Kanji,
                0b1001 => Mode::Fnc1Second,
                _ => return Err(PayloadError::UnknownMode(bits)),
            },
        };
        Ok(mode)
    }

    /// Width of the character count field
    fn count_bits(self, version: Version) -> Result<usize, PayloadError> {
        let bits = match version {
            Version::Micro(m) => {
                let m = m as usize;
                match self {
                    Mode::Numeric => m + 2,
                    Mode::Alphanumeric if m >= 2 => m + 1,
                    Mode::Byte if m >= 3 => m + 1,
                    Mode::Kanji if m >= 3 => m,
                    _ => return Err(PayloadError::UnknownMode(self as u32)),
                }
            }
            Version::Model2(v) => {
                let class = match v {
                    0..=9 => 0,
                    10..=26 => 1,
                    _ => 2,
                };
                match self {
                    Mode::Numeric => [10, 12, 14][class],
                    Mode::Alphanumeric => [9, 11, 13][class],
                    Mode::Byte => [8, 16, 16][class],
                    Mode::Kanji => [8, 10, 12][class],
                    _ => 0,
                }
            }
        };
        Ok(bits)
    }
}

/// Width of the mode indicator
fn mode_bits(version: Version) -> usize {
    match version {
        Version::Micro(m) => m as usize - 1,
        Version::Model2(_) => 4,
    }
}

/// Length of the all-zero terminator
fn terminator_bits(version: Version) -> usize {
    match version {
        Version::Micro(m) => 2 * m as usize + 1,
        Version::Model2(_) => 4,
    }
}

/// FNC1 placement declared by the symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fnc1 {
    /// GS1 data
    First,
    /// Industry data with its application indicator
    Second(u8),
}

/// Decoded content of one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub text: String,
    pub bytes: Vec<u8>,
    pub structured_append: Option<StructuredAppend>,
    pub fnc1: Option<Fnc1>,
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    len: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8], len: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            len: len.min(bytes.len() * 8),
        }
    }

    fn remaining(&self) -> usize {
        self.len - self.pos
    }

    fn peek(&self, n: usize) -> Option<u32> {
        if n > self.remaining() {
            return None;
        }
        Some((self.pos..self.pos + n).fold(0u32, |acc, p| {
            (acc << 1) | ((self.bytes[p / 8] >> (7 - p % 8)) & 1) as u32
        }))
    }

    fn read(&mut self, n: usize) -> Result<u32, PayloadError> {
        let value = self.peek(n).ok_or(PayloadError::Truncated)?;
        self.pos += n;
        Ok(value)
    }
}

fn numeric(reader: &mut BitReader, mut count: usize, out: &mut EciOutput) -> Result<(), PayloadError> {
    while count > 0 {
        let (digits, bits, limit) = match count {
            1 => (1, 4, 10),
            2 => (2, 7, 100),
            _ => (3, 10, 1000),
        };
        let value = reader.read(bits)?;
        if value >= limit {
            return Err(PayloadError::BadValue(value));
        }
        let text = format!("{:0width$}", value, width = digits);
        out.extend(text.as_bytes());
        count -= digits;
    }
    Ok(())
}

fn alphanumeric(reader: &mut BitReader, mut count: usize, gs1: bool, out: &mut EciOutput) -> Result<(), PayloadError> {
    let mut chars = Vec::with_capacity(count);
    while count > 0 {
        if count >= 2 {
            let value = reader.read(11)?;
            if value >= 45 * 45 {
                return Err(PayloadError::BadValue(value));
            }
            chars.push(ALPHANUMERIC[value as usize / 45]);
            chars.push(ALPHANUMERIC[value as usize % 45]);
            count -= 2;
        } else {
            let value = reader.read(6)?;
            let ch = *ALPHANUMERIC.get(value as usize).ok_or(PayloadError::BadValue(value))?;
            chars.push(ch);
            count -= 1;
        }
    }
    if gs1 {
        // "%%" is a literal percent, a lone '%' is FNC1
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == b'%' {
                if chars.get(i + 1) == Some(&b'%') {
                    out.push(b'%');
                    i += 1;
                } else {
                    out.push(GROUP_SEPARATOR);
                }
            } else {
                out.push(chars[i]);
            }
            i += 1;
        }
    } else {
        out.extend(&chars);
    }
    Ok(())
}

fn kanji(reader: &mut BitReader, count: usize, out: &mut EciOutput) -> Result<(), PayloadError> {
    for _ in 0..count {
        let value = reader.read(13)?;
        let mut sjis = ((value / 0xC0) << 8) | (value % 0xC0);
        sjis += if sjis < 0x1F00 { 0x8140 } else { 0xC140 };
        out.push((sjis >> 8) as u8);
        out.push(sjis as u8);
    }
    Ok(())
}

fn eci_designator(reader: &mut BitReader) -> Result<u32, PayloadError> {
    let first = reader.read(8)?;
    if first & 0x80 == 0 {
        Ok(first & 0x7F)
    } else if first & 0xC0 == 0x80 {
        Ok(((first & 0x3F) << 8) | reader.read(8)?)
    } else if first & 0xE0 == 0xC0 {
        Ok(((first & 0x1F) << 16) | reader.read(16)?)
    } else {
        Err(PayloadError::BadValue(first))
    }
}

/// Decode the data codewords of a symbol; `data_bits` limits the stream for
/// symbols whose last data codeword is only four bits
pub fn decode(
    data: &[u8],
    data_bits: usize,
    version: Version,
    encoding: TextEncoding,
) -> Result<QrPayload, PayloadError> {
    let mut reader = BitReader::new(data, data_bits);
    let mut out = EciOutput::default();
    let mut structured_append = None;
    let mut fnc1 = None;
    let terminator = terminator_bits(version);

    loop {
        match reader.peek(terminator) {
            None | Some(0) => break,
            Some(_) => {}
        }
        let mode = Mode::from_indicator(version, reader.read(mode_bits(version))?)?;
        match mode {
            Mode::Terminator => break,
            Mode::StructuredAppend => {
                let index = reader.read(4)? as usize;
                let count = reader.read(4)? as usize + 1;
                let parity = reader.read(8)?;
                structured_append = Some(StructuredAppend {
                    index,
                    count: Some(count),
                    id: parity.to_string(),
                });
            }
            Mode::Fnc1First => fnc1 = Some(Fnc1::First),
            Mode::Fnc1Second => fnc1 = Some(Fnc1::Second(reader.read(8)? as u8)),
            Mode::Eci => {
                let eci = eci_designator(&mut reader)?;
                out.set_eci(eci);
            }
            Mode::Numeric | Mode::Alphanumeric | Mode::Byte | Mode::Kanji => {
                let count = reader.read(mode.count_bits(version)?)? as usize;
                match mode {
                    Mode::Numeric => numeric(&mut reader, count, &mut out)?,
                    Mode::Alphanumeric => alphanumeric(&mut reader, count, fnc1.is_some(), &mut out)?,
                    Mode::Kanji => kanji(&mut reader, count, &mut out)?,
                    _ => {
                        for _ in 0..count {
                            out.push(reader.read(8)? as u8);
                        }
                    }
                }
            }
        }
    }

    Ok(QrPayload {
        text: out.text(encoding),
        bytes: out.bytes(),
        structured_append,
        fnc1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack a bit string ("0101 ...", spaces ignored) into bytes
    fn pack(bits: &str) -> (Vec<u8>, usize) {
        let bits: Vec<bool> = bits.chars().filter(|c| !c.is_whitespace()).map(|c| c == '1').collect();
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        (bytes, bits.len())
    }

    fn v1(bits: &str) -> Result<QrPayload, PayloadError> {
        let (bytes, len) = pack(bits);
        decode(&bytes, len, Version::Model2(1), TextEncoding::Utf8)
    }

    #[test]
    fn test_alphanumeric_hello_world() {
        // mode, count 11, five pairs and one single, terminator
        let payload = v1(
            "0010 000001011 01100001011 01111000110 10001011100 10110111000 10011010100 001101 0000",
        )
        .unwrap();
        assert_eq!(payload.text, "HELLO WORLD");
    }

    #[test]
    fn test_numeric_groups() {
        // "01234567": 012 345 67
        let payload = v1("0001 0000001000 0000001100 0101011001 1000011 0000").unwrap();
        assert_eq!(payload.text, "01234567");
        assert!(v1("0001 0000000011 1111101000").is_err());
    }

    #[test]
    fn test_byte_with_eci() {
        // ECI 26 then byte "é" (C3 A9)
        let payload = v1("0111 00011010 0100 00000010 11000011 10101001 0000").unwrap();
        assert_eq!(payload.text, "é");
        assert_eq!(payload.bytes, vec![0xC3, 0xA9]);
        // ISO-8859-1 via ECI 3
        let payload = v1("0111 00000011 0100 00000001 11101001").unwrap();
        assert_eq!(payload.text, "é");
    }

    #[test]
    fn test_structured_append_and_fnc1() {
        // SA 2 of 4, parity 0x5A; FNC1 first; alnum "1%A" -> "1\x1dA"
        let payload = v1("0011 0001 0011 01011010 0101 0010 000000011 00001010011 001010 0000").unwrap();
        let sa = payload.structured_append.unwrap();
        assert_eq!((sa.index, sa.count, sa.id.as_str()), (1, Some(4), "90"));
        assert_eq!(payload.fnc1, Some(Fnc1::First));
        assert_eq!(payload.text, "1\u{1d}A");
    }

    #[test]
    fn test_kanji_to_shift_jis() {
        // 0x935F -> 0x0D9F, 0xE4AA -> 0x1AAA
        let payload = v1("1000 00000010 0110110011111 1101010101010").unwrap();
        assert_eq!(payload.bytes, vec![0x93, 0x5F, 0xE4, 0xAA]);
    }

    #[test]
    fn test_unknown_mode_and_truncation() {
        assert_eq!(v1("0110 0000"), Err(PayloadError::UnknownMode(6)));
        assert_eq!(v1("0100 00000011 01000001"), Err(PayloadError::Truncated));
    }

    #[test]
    fn test_micro_modes() {
        // M1: numeric only, 3-bit count, "5" then 3-bit terminator
        let (bytes, _) = pack("001 0101 000 0000 0000 0000");
        let payload = decode(&bytes, 20, Version::Micro(1), TextEncoding::Utf8).unwrap();
        assert_eq!(payload.text, "5");
        // M2: alnum mode bit 1, 3-bit count, "AB" (10*45+11 = 461)
        let (bytes, len) = pack("1 010 00111001101 00000");
        let payload = decode(&bytes, len, Version::Micro(2), TextEncoding::Utf8).unwrap();
        assert_eq!(payload.text, "AB");
        // M4: byte mode 010, 5-bit count
        let (bytes, len) = pack("010 00001 01111010 000000000");
        let payload = decode(&bytes, len, Version::Micro(4), TextEncoding::Utf8).unwrap();
        assert_eq!(payload.text, "z");
    }
}
