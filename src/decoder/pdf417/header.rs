//! Row indicators and the symbol header.
//!
//! Every row starts and ends with a row indicator codeword. Each one carries
//! the row group (`row / 3`) and, depending on the row's cluster, one of the
//! row count, the column count or the error-correction level. Many row lines
//! are read and each field is decided by majority vote.

use super::codewords::{self, Codeword, START_PATTERN, STOP_PATTERN};
use super::frame::{RowLine, SymbolFrame};
use crate::decoder::recovery::RecoveryCache;
use crate::detector::pattern::PatternTemplate;
use crate::models::BitImage;
use tracing::trace;

/// Rows, data columns and error-correction level of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pdf417Header {
    pub rows: usize,
    pub columns: usize,
    pub ec_level: u8,
}

impl Pdf417Header {
    pub const MIN_ROWS: usize = 3;
    pub const MAX_ROWS: usize = 90;
    pub const MAX_COLUMNS: usize = 30;

    /// Header from voted fields, if they describe a possible symbol
    pub fn new(rows: usize, columns: usize, ec_level: u8) -> Option<Self> {
        let header = Self {
            rows,
            columns,
            ec_level,
        };
        let valid = (Self::MIN_ROWS..=Self::MAX_ROWS).contains(&rows)
            && (1..=Self::MAX_COLUMNS).contains(&columns)
            && ec_level <= 8
            && header.codeword_count() <= codewords::CODEWORD_VALUES - 1
            && header.ec_codewords() < header.codeword_count();
        valid.then_some(header)
    }

    /// Data and error-correction codewords in the grid
    pub fn codeword_count(&self) -> usize {
        self.rows * self.columns
    }

    pub fn ec_codewords(&self) -> usize {
        2usize << self.ec_level
    }

    /// Symbol width in modules: start, both indicators, data, stop
    pub fn module_width(&self) -> usize {
        17 * self.columns + 69
    }

    /// Cluster used by row `row`
    pub fn cluster(row: usize) -> u8 {
        (row % 3 * 3) as u8
    }
}

/// Caches for the three clusters; recovery results depend on the cluster
pub struct ClusterCaches {
    caches: [RecoveryCache<u16>; 3],
}

impl ClusterCaches {
    pub fn new() -> Self {
        Self {
            caches: std::array::from_fn(|_| RecoveryCache::with_default_size()),
        }
    }

    /// Value of a codeword expected in `cluster`
    pub fn resolve(&mut self, runs: &[u32], cluster: u8) -> Option<(u16, bool)> {
        let cache = self.caches.get_mut(cluster as usize / 3)?;
        codewords::resolve(runs, cluster, cache)
    }

    /// Value and cluster of a codeword whose cluster is unknown
    pub fn resolve_any(&mut self, runs: &[u32]) -> Option<Codeword> {
        if let Some(cw) = codewords::nearest(runs) {
            return Some(cw);
        }
        for cluster in [0u8, 3, 6] {
            if let Some((value, _)) = self.resolve(runs, cluster) {
                return Some(Codeword { value, cluster });
            }
        }
        None
    }
}

impl Default for ClusterCaches {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RowGroups,
    EcAndRows,
    Columns,
}

/// Field carried by an indicator of cluster `cluster` on the given side
fn indicator_field(cluster: u8, left: bool) -> Field {
    match (cluster / 3, left) {
        (0, true) | (1, false) => Field::RowGroups,
        (1, true) | (2, false) => Field::EcAndRows,
        _ => Field::Columns,
    }
}

/// Accumulated indicator readings
#[derive(Debug, Clone)]
pub struct HeaderVotes {
    row_groups: [u32; 30],
    ec_rows: [u32; 30],
    columns: [u32; 30],
    rows: Vec<(usize, f32)>,
}

impl Default for HeaderVotes {
    fn default() -> Self {
        Self {
            row_groups: [0; 30],
            ec_rows: [0; 30],
            columns: [0; 30],
            rows: Vec::new(),
        }
    }
}

impl HeaderVotes {
    /// Count one indicator; returns the row number it names
    pub fn indicator(&mut self, cw: Codeword, left: bool) -> Option<usize> {
        let value = cw.value as usize;
        if value >= 900 {
            return None;
        }
        let field = value % 30;
        let slot = match indicator_field(cw.cluster, left) {
            Field::RowGroups => &mut self.row_groups[field],
            Field::EcAndRows => &mut self.ec_rows[field],
            Field::Columns => &mut self.columns[field],
        };
        *slot += 1;
        Some(3 * (value / 30) + cw.cluster as usize / 3)
    }

    /// Record that row `row` was seen at height `v`
    pub fn observe_row(&mut self, row: usize, v: f32) {
        self.rows.push((row, v));
    }

    fn winner(counts: &[u32; 30]) -> Option<usize> {
        let (index, &count) = counts.iter().enumerate().max_by_key(|&(i, &c)| (c, usize::MAX - i))?;
        (count > 0).then_some(index)
    }

    /// Majority header
    pub fn resolve(&self) -> Option<Pdf417Header> {
        let groups = Self::winner(&self.row_groups)?;
        let ec_rows = Self::winner(&self.ec_rows)?;
        let columns = Self::winner(&self.columns)?;
        Pdf417Header::new(3 * groups + ec_rows % 3 + 1, columns + 1, (ec_rows / 3) as u8)
    }

    /// Median observed height of each row
    pub fn row_centres(&self, rows: usize) -> Vec<Option<f32>> {
        let mut per_row: Vec<Vec<f32>> = vec![Vec::new(); rows];
        for &(row, v) in &self.rows {
            if let Some(list) = per_row.get_mut(row) {
                list.push(v);
            }
        }
        per_row
            .into_iter()
            .map(|mut list| {
                if list.is_empty() {
                    return None;
                }
                list.sort_by(f32::total_cmp);
                Some(list[list.len() / 2])
            })
            .collect()
    }
}

/// The header plus the row lines it was read from
#[derive(Debug, Clone)]
pub struct HeaderReading {
    pub header: Pdf417Header,
    /// Median height of each row, where observed
    pub row_centres: Vec<Option<f32>>,
    /// Sampled lines with the row their indicators named
    pub lines: Vec<(RowLine, Option<usize>)>,
}

impl HeaderReading {
    /// Height of `row`: observed, else interpolated from the frame
    pub fn row_v(&self, row: usize) -> f32 {
        self.row_centres
            .get(row)
            .copied()
            .flatten()
            .unwrap_or((row as f32 + 0.5) / self.header.rows as f32)
    }
}

/// Indicators at both ends of a line: codeword following the start pattern
/// and codeword preceding the stop pattern
fn line_indicators(line: &RowLine, caches: &mut ClusterCaches) -> (Option<Codeword>, Option<Codeword>) {
    let Some((s, e)) = line.dark_span() else {
        return (None, None);
    };
    let runs = line.runs();
    if e + 1 - s < 17 + 16 {
        return (None, None);
    }
    let start = PatternTemplate::from_modules(&START_PATTERN, Some(true));
    let stop = PatternTemplate::from_modules(&STOP_PATTERN, Some(true));
    let left = (start.variance(&runs[s..s + 8], 0.8) < 0.3)
        .then(|| caches.resolve_any(&runs[s + 8..s + 16]))
        .flatten();
    let right = (stop.variance(&runs[e - 8..=e], 0.8) < 0.3)
        .then(|| caches.resolve_any(&runs[e - 16..e - 8]))
        .flatten();
    (left, right)
}

/// Read enough row lines to vote the header
pub fn read_header(image: &BitImage, frame: &SymbolFrame, caches: &mut ClusterCaches) -> Option<HeaderReading> {
    let count = (frame.height_px().round() as usize).clamp(12, 600);
    let mut votes = HeaderVotes::default();
    let mut lines = Vec::with_capacity(count);
    for i in 0..count {
        let v = (i as f32 + 0.5) / count as f32;
        let line = frame.sample_row(image, v);
        let (left, right) = line_indicators(&line, caches);
        let left_row = left.and_then(|cw| votes.indicator(cw, true));
        let right_row = right.and_then(|cw| votes.indicator(cw, false));
        let row = match (left_row, right_row) {
            (Some(a), Some(b)) if a != b => None,
            (a, b) => a.or(b),
        };
        if let Some(row) = row {
            votes.observe_row(row, v);
        }
        lines.push((line, row));
    }
    let header = votes.resolve()?;
    trace!(
        rows = header.rows,
        columns = header.columns,
        ec_level = header.ec_level,
        "pdf417 header"
    );
    Some(HeaderReading {
        header,
        row_centres: votes.row_centres(header.rows),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(row: usize, header: &Pdf417Header) -> (Codeword, Codeword) {
        let group = 30 * (row / 3);
        let rows_hi = (header.rows - 1) / 3;
        let ec_rows = header.ec_level as usize * 3 + (header.rows - 1) % 3;
        let cols = header.columns - 1;
        let (l, r) = match row % 3 {
            0 => (rows_hi, cols),
            1 => (ec_rows, rows_hi),
            _ => (cols, ec_rows),
        };
        let cluster = Pdf417Header::cluster(row);
        (
            Codeword {
                value: (group + l) as u16,
                cluster,
            },
            Codeword {
                value: (group + r) as u16,
                cluster,
            },
        )
    }

    #[test]
    fn test_votes_resolve_header_and_buffer() {
        let truth = Pdf417Header {
            rows: 6,
            columns: 4,
            ec_level: 2,
        };
        let mut votes = HeaderVotes::default();
        for row in 0..truth.rows {
            let (l, r) = indicators(row, &truth);
            assert_eq!(votes.indicator(l, true), Some(row));
            assert_eq!(votes.indicator(r, false), Some(row));
        }
        // a misread column indicator is outvoted
        votes.indicator(
            Codeword {
                value: 7,
                cluster: 6,
            },
            true,
        );
        let header = votes.resolve().expect("header");
        assert_eq!(header, truth);
        assert_eq!(header.codeword_count(), 24);
        assert_eq!(header.ec_codewords(), 8);
        assert_eq!(header.module_width(), 137);
    }

    #[test]
    fn test_header_limits() {
        assert!(Pdf417Header::new(2, 4, 0).is_none());
        assert!(Pdf417Header::new(3, 31, 0).is_none());
        assert!(Pdf417Header::new(90, 30, 0).is_none());
        // eight codewords cannot hold sixteen parity codewords
        assert!(Pdf417Header::new(4, 2, 3).is_none());
        assert!(Pdf417Header::new(3, 1, 0).is_some());
    }

    #[test]
    fn test_row_centres_take_median() {
        let mut votes = HeaderVotes::default();
        for v in [0.1, 0.12, 0.5, 0.11] {
            votes.observe_row(0, v);
        }
        votes.observe_row(2, 0.8);
        let centres = votes.row_centres(3);
        assert_eq!(centres[0], Some(0.12));
        assert_eq!(centres[1], None);
        assert_eq!(centres[2], Some(0.8));
    }
}
