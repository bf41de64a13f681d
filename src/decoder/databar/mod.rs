//! GS1 DataBar family.
//!
//! Both variants are built from *pairs*: a finder pattern flanked by two
//! data characters. Pairs are observed line by line in either reading
//! direction, collected across lines, and only joined into symbols once the
//! whole image has been visited, which is what makes stacked layouts work.

pub mod combinatorics;
pub mod expanded;
pub mod general;
pub mod omni;

use crate::decoder::recovery::{RecoveryCache, SearchLimits};
use crate::models::BarcodeType;

pub use expanded::ExpandedCollector;
pub use omni::OmniCollector;

/// Pixel extent of a decoded row segment on one scan line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Scan line index (row `y` or column `x`)
    pub line: usize,
    /// First dark pixel along the line
    pub start: usize,
    /// One past the last dark pixel
    pub end: usize,
}

/// A DataBar symbol assembled from pairs seen on one or more lines
#[derive(Debug, Clone, PartialEq)]
pub struct DataBarRead {
    pub symbology: BarcodeType,
    /// GS1 element string in `(AI)value` form
    pub text: String,
    /// Outermost observations of every row, in forward line coordinates
    pub spans: Vec<Span>,
    /// True when the symbol was read against the line direction
    pub reversed: bool,
    pub module_len: f32,
    pub confidence: f32,
}

/// Value and checksum contribution of one decoded character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataCharacter {
    pub value: u32,
    pub checksum_portion: u32,
}

/// Runs of one scan line in a chosen reading direction
pub(crate) struct DirectedRuns {
    runs: Vec<u32>,
    offsets: Vec<usize>,
    first_dark: bool,
    total: usize,
    forward: bool,
}

impl DirectedRuns {
    pub(crate) fn new(runs: &[u32], first_dark: bool, forward: bool) -> Self {
        let mut directed = runs.to_vec();
        let first_dark = if forward {
            first_dark
        } else {
            directed.reverse();
            first_dark ^ (runs.len() % 2 == 0)
        };
        let mut offsets = Vec::with_capacity(directed.len());
        let mut pos = 0usize;
        for &r in &directed {
            offsets.push(pos);
            pos += r as usize;
        }
        Self {
            runs: directed,
            offsets,
            first_dark,
            total: pos,
            forward,
        }
    }

    pub(crate) fn runs(&self) -> &[u32] {
        &self.runs
    }

    pub(crate) fn first_dark(&self) -> bool {
        self.first_dark
    }

    pub(crate) fn is_forward(&self) -> bool {
        self.forward
    }

    fn is_dark(&self, index: usize) -> bool {
        self.first_dark ^ (index % 2 == 1)
    }

    /// Pixel range from the first dark run in `from..=to` through the last
    /// one, in forward line coordinates
    pub(crate) fn dark_extent(&self, from: usize, to: usize) -> Option<(usize, usize)> {
        let to = to.min(self.runs.len().checked_sub(1)?);
        let first = (from..=to).find(|&i| self.is_dark(i))?;
        let last = (first..=to).rev().find(|&i| self.is_dark(i))?;
        let start = self.offsets[first];
        let end = self.offsets[last] + self.runs[last] as usize;
        Some(if self.forward {
            (start, end)
        } else {
            (self.total - end, self.total - start)
        })
    }
}

/// Integer module widths of one character.
///
/// The rounded reading is tried first; if it does not sum to `modules` or
/// `valid` rejects it, the bounded recovery search runs through `cache`.
/// The flag reports whether recovery was needed.
pub(crate) fn resolve_widths(
    counters: &[u32],
    modules: u32,
    max_width: u32,
    cache: &mut RecoveryCache<Vec<u32>>,
    valid: impl Fn(&[u32]) -> bool,
) -> Option<(Vec<u32>, bool)> {
    let total: u32 = counters.iter().sum();
    if total == 0 {
        return None;
    }
    let scale = modules as f32 / total as f32;
    let measured: Vec<f32> = counters.iter().map(|&c| c as f32 * scale).collect();
    let exact: Vec<u32> = measured
        .iter()
        .map(|m| (m.round().max(0.0) as u32).clamp(1, max_width))
        .collect();
    if exact.iter().sum::<u32>() == modules && valid(&exact) {
        return Some((exact, false));
    }
    let limits = SearchLimits::new(1, max_width);
    cache
        .recover(&measured, &limits, |w| {
            (w.iter().sum::<u32>() == modules && valid(w)).then(|| w.to_vec())
        })
        .map(|w| (w, true))
}

/// Odd (even-indexed) and even (odd-indexed) elements of a character
pub(crate) fn split_elements(widths: &[u32]) -> ([u32; 4], [u32; 4]) {
    let mut odd = [0u32; 4];
    let mut even = [0u32; 4];
    for (i, &w) in widths.iter().take(8).enumerate() {
        if i % 2 == 0 {
            odd[i / 2] = w;
        } else {
            even[i / 2] = w;
        }
    }
    (odd, even)
}

/// Interleave odd and even element widths back into reading order
pub(crate) fn join_elements(odd: &[u32], even: &[u32]) -> [u32; 8] {
    let mut out = [0u32; 8];
    for i in 0..4 {
        out[2 * i] = odd[i];
        out[2 * i + 1] = even[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directed_runs_extent() {
        // light 3, dark 2, light 1, dark 4, light 5
        let runs = [3, 2, 1, 4, 5];
        let fwd = DirectedRuns::new(&runs, false, true);
        assert_eq!(fwd.dark_extent(0, 4), Some((3, 10)));
        let rev = DirectedRuns::new(&runs, false, false);
        assert_eq!(rev.runs(), &[5, 4, 1, 2, 3]);
        assert!(!rev.first_dark());
        // same pixels, reported in forward coordinates
        assert_eq!(rev.dark_extent(0, 4), Some((3, 10)));
        assert_eq!(rev.dark_extent(0, 1), Some((6, 10)));
    }

    #[test]
    fn test_resolve_widths_exact_and_recovered() {
        let mut cache = RecoveryCache::new(16);
        let (w, recovered) =
            resolve_widths(&[4, 8, 4, 4], 5, 3, &mut cache, |_| true).expect("exact");
        assert_eq!(w, vec![1, 2, 1, 1]);
        assert!(!recovered);

        // rounding gives 2+2+2 = 6 for a 5-module character
        let (w, recovered) = resolve_widths(&[5, 5, 5], 5, 3, &mut cache, |w| w[2] == 1)
            .expect("recovered");
        assert_eq!(w.iter().sum::<u32>(), 5);
        assert_eq!(w[2], 1);
        assert!(recovered);
    }

    #[test]
    fn test_split_and_join() {
        let widths = [1, 2, 3, 4, 5, 6, 7, 8];
        let (odd, even) = split_elements(&widths);
        assert_eq!(odd, [1, 3, 5, 7]);
        assert_eq!(even, [2, 4, 6, 8]);
        assert_eq!(join_elements(&odd, &even), widths);
    }
}
