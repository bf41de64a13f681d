//! Payload bytes grouped by Extended Channel Interpretation.

use crate::config::TextEncoding;

/// UTF-8
pub const ECI_UTF8: u32 = 26;

/// Bytes grouped by the ECI in force when they were produced
#[derive(Debug, Default)]
pub struct EciOutput {
    segments: Vec<(Option<u32>, Vec<u8>)>,
}

impl EciOutput {
    pub fn push(&mut self, byte: u8) {
        match self.segments.last_mut() {
            Some((_, bytes)) => bytes.push(byte),
            None => self.segments.push((None, vec![byte])),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Bytes after this call are interpreted under `eci`
    pub fn set_eci(&mut self, eci: u32) {
        self.segments.push((Some(eci), Vec::new()));
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|(_, b)| b.is_empty())
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.segments.iter().flat_map(|(_, b)| b.iter().copied()).collect()
    }

    /// Text of every segment; segments without a known ECI use `encoding`
    pub fn text(&self, encoding: TextEncoding) -> String {
        self.segments
            .iter()
            .map(|(eci, bytes)| match eci {
                Some(ECI_UTF8) => String::from_utf8_lossy(bytes).into_owned(),
                Some(1) | Some(3) => TextEncoding::Latin1.decode(bytes),
                _ => encoding.decode(bytes),
            })
            .collect()
    }
}
