//! Codeword grid extraction.
//!
//! Four strategies of increasing robustness, each filling a fresh buffer:
//! a regular grid over the region corners, run reading between voted column
//! boundaries, a lattice grid through the observed row centres and column
//! boundaries, and an adaptive lattice that falls back to run reading for
//! codewords it cannot resolve.

use std::borrow::Cow;

use super::codewords::{self, CODEWORD_MODULES};
use super::frame::{RowLine, SymbolFrame};
use super::header::{ClusterCaches, HeaderReading, Pdf417Header};
use crate::decoder::config;
use crate::decoder::reed_solomon::CodewordBlock;
use crate::detector::grid::{Lattice, SamplingGrid};
use crate::models::{BitImage, BitMatrix};
use crate::utils::line::run_lengths;

/// Extraction strategies, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectGrid,
    ColumnAnchored,
    LatticeGrid,
    AdaptiveGrid,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::DirectGrid,
        Strategy::ColumnAnchored,
        Strategy::LatticeGrid,
        Strategy::AdaptiveGrid,
    ];
}

/// Codeword buffer of one extraction attempt, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodewordGrid {
    header: Pdf417Header,
    values: Vec<Option<u16>>,
}

impl CodewordGrid {
    pub fn new(header: Pdf417Header) -> Self {
        Self {
            header,
            values: vec![None; header.codeword_count()],
        }
    }

    pub fn header(&self) -> &Pdf417Header {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        self.values
            .get(row * self.header.columns + col)
            .copied()
            .flatten()
    }

    pub fn set(&mut self, row: usize, col: usize, value: u16) {
        if col < self.header.columns {
            if let Some(slot) = self.values.get_mut(row * self.header.columns + col) {
                *slot = Some(value);
            }
        }
    }

    /// Positions never read
    pub fn missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Codewords with unread positions zeroed and flagged as erasures
    pub fn to_block(&self) -> CodewordBlock {
        let codewords = self.values.iter().map(|v| v.unwrap_or(0) as u32).collect();
        let erasures = self
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();
        CodewordBlock::with_erasures(codewords, erasures)
    }
}

/// Histogram vote: mean of the values in the fullest bin and its neighbours
pub fn histogram_vote(values: &[f32], bin_width: f32) -> Option<f32> {
    if values.is_empty() || bin_width <= 0.0 {
        return None;
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let bin = |v: f32| ((v - min) / bin_width) as usize;
    let bins = bin(values.iter().copied().fold(f32::NEG_INFINITY, f32::max)) + 1;
    let mut counts = vec![0u32; bins];
    for &v in values {
        counts[bin(v)] += 1;
    }
    let (peak, _) = counts
        .iter()
        .enumerate()
        .max_by_key(|&(i, &c)| (c, usize::MAX - i))?;
    let near: Vec<f32> = values
        .iter()
        .copied()
        .filter(|&v| bin(v).abs_diff(peak) <= 1)
        .collect();
    Some(near.iter().sum::<f32>() / near.len() as f32)
}

/// Codeword of 17 module samples starting at `x0` on row `row`
fn module_codeword(bits: &BitMatrix, row: usize, x0: usize, cluster: u8, runs: &mut Vec<u32>) -> Option<u16> {
    let line: Vec<bool> = (x0..x0 + CODEWORD_MODULES as usize)
        .map(|x| bits.get(x, row))
        .collect();
    let first_dark = run_lengths(&line, runs);
    if !first_dark || runs.len() != 8 {
        return None;
    }
    codewords::lookup(runs)
        .filter(|cw| cw.cluster == cluster)
        .map(|cw| cw.value)
}

/// Extraction state shared by the strategies of one region
pub struct Extractor<'a> {
    image: &'a BitImage,
    frame: &'a SymbolFrame,
    reading: &'a HeaderReading,
    /// Frame positions of the codeword boundaries, left indicator to stop
    boundaries: Vec<f32>,
}

impl<'a> Extractor<'a> {
    pub fn new(image: &'a BitImage, frame: &'a SymbolFrame, reading: &'a HeaderReading) -> Self {
        let boundaries = Self::vote_boundaries(reading);
        Self {
            image,
            frame,
            reading,
            boundaries,
        }
    }

    fn header(&self) -> &Pdf417Header {
        &self.reading.header
    }

    /// Codeword boundaries from every line whose runs split cleanly into
    /// codewords; nominal positions where no line does
    fn vote_boundaries(reading: &HeaderReading) -> Vec<f32> {
        let header = reading.header;
        let count = header.columns + 3;
        let width = header.module_width() as f32;
        let expected_runs = 17 + 8 * (header.columns + 2);
        let mut samples: Vec<Vec<f32>> = vec![Vec::new(); count];
        for (line, _) in &reading.lines {
            let Some((s, e)) = line.dark_span() else {
                continue;
            };
            if e + 1 - s != expected_runs {
                continue;
            }
            for (j, list) in samples.iter_mut().enumerate() {
                list.push(line.run_t(s + 8 + 8 * j));
            }
        }
        let bin = 0.5 / width;
        samples
            .iter()
            .enumerate()
            .map(|(j, list)| {
                histogram_vote(list, bin).unwrap_or((17.0 * (j as f32 + 1.0)) / width)
            })
            .collect()
    }

    /// Run a strategy into a fresh buffer
    pub fn extract(&self, strategy: Strategy, caches: &mut ClusterCaches) -> Option<CodewordGrid> {
        match strategy {
            Strategy::DirectGrid => {
                let header = self.header();
                let grid = SamplingGrid::regular(
                    self.frame.region().polygon(),
                    header.module_width() as f32,
                    header.rows as f32,
                );
                Some(self.from_sampling_grid(&grid, false))
            }
            Strategy::ColumnAnchored => {
                let mut grid = CodewordGrid::new(*self.header());
                for row in 0..self.header().rows {
                    for (col, value) in self.anchored_row(row, 0..self.header().columns, caches) {
                        grid.set(row, col, value);
                    }
                }
                Some(grid)
            }
            Strategy::LatticeGrid => {
                let lattice = self.lattice()?;
                Some(self.from_sampling_grid(&SamplingGrid::NonUniform(lattice), true))
            }
            Strategy::AdaptiveGrid => {
                let lattice = self.lattice()?;
                let mut grid = self.from_sampling_grid(&SamplingGrid::adaptive(lattice), true);
                for row in 0..self.header().rows {
                    let missing: Vec<usize> = (0..self.header().columns)
                        .filter(|&col| grid.get(row, col).is_none())
                        .collect();
                    if missing.is_empty() {
                        continue;
                    }
                    for (col, value) in self.anchored_row(row, missing.into_iter(), caches) {
                        grid.set(row, col, value);
                    }
                }
                Some(grid)
            }
        }
    }

    fn from_sampling_grid(&self, grid: &SamplingGrid, jitter: bool) -> CodewordGrid {
        let header = *self.header();
        let bits = grid.extract_points(self.image, header.module_width(), header.rows, jitter);
        let mut out = CodewordGrid::new(header);
        let mut runs = Vec::with_capacity(8);
        for row in 0..header.rows {
            let cluster = Pdf417Header::cluster(row);
            for col in 0..header.columns {
                let x0 = 34 + 17 * col;
                if let Some(value) = module_codeword(&bits, row, x0, cluster, &mut runs) {
                    out.set(row, col, value);
                }
            }
        }
        out
    }

    /// Lattice through the codeword boundaries of the rows with an observed centre
    fn lattice(&self) -> Option<Lattice> {
        let observed: Vec<(usize, f32)> = self
            .reading
            .row_centres
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.map(|v| (row, v)))
            .collect();
        let xs: Vec<f32> = (0..self.boundaries.len())
            .map(|j| 17.0 * (j as f32 + 1.0))
            .collect();
        let ys: Vec<f32> = observed.iter().map(|&(row, _)| row as f32 + 0.5).collect();
        let mut points = Vec::with_capacity(xs.len() * ys.len());
        for &(_, v) in &observed {
            points.extend(self.boundaries.iter().map(|&t| self.frame.point(t, v)));
        }
        Lattice::new(xs, ys, points)
    }

    /// Lines to read for `row`: the sampled lines nearest its centre, or a
    /// fresh line through the centre
    fn row_lines(&self, row: usize) -> Vec<Cow<'_, RowLine>> {
        let centre = self.reading.row_v(row);
        let mut lines: Vec<&RowLine> = self
            .reading
            .lines
            .iter()
            .filter(|(_, r)| *r == Some(row))
            .map(|(line, _)| line)
            .collect();
        lines.sort_by(|a, b| (a.v - centre).abs().total_cmp(&(b.v - centre).abs()));
        lines.truncate(config::pdf417_row_samples());
        if lines.is_empty() {
            return vec![Cow::Owned(self.frame.sample_row(self.image, centre))];
        }
        lines.into_iter().map(Cow::Borrowed).collect()
    }

    /// Majority value of each requested column of `row`, read from runs
    /// between the voted boundaries
    fn anchored_row(
        &self,
        row: usize,
        columns: impl Iterator<Item = usize>,
        caches: &mut ClusterCaches,
    ) -> Vec<(usize, u16)> {
        let cluster = Pdf417Header::cluster(row);
        let lines = self.row_lines(row);
        let mut runs = Vec::with_capacity(9);
        let mut out = Vec::new();
        for col in columns {
            let (Some(&from), Some(&to)) = (self.boundaries.get(col + 1), self.boundaries.get(col + 2)) else {
                continue;
            };
            let mut votes: Vec<(u16, u32)> = Vec::new();
            for line in &lines {
                line.segment_runs(from, to, &mut runs);
                if runs.len() != 8 {
                    continue;
                }
                if let Some((value, _)) = caches.resolve(&runs, cluster) {
                    match votes.iter_mut().find(|(v, _)| *v == value) {
                        Some((_, count)) => *count += 1,
                        None => votes.push((value, 1)),
                    }
                }
            }
            if let Some(&(value, _)) = votes.iter().max_by_key(|&&(_, count)| count) {
                out.push((col, value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Pdf417Header {
        Pdf417Header::new(6, 4, 2).expect("header")
    }

    #[test]
    fn test_grid_buffer_matches_header() {
        let mut grid = CodewordGrid::new(header());
        assert_eq!(grid.len(), 24);
        assert_eq!(grid.missing(), 24);
        grid.set(1, 2, 77);
        grid.set(0, 4, 5);
        assert_eq!(grid.get(1, 2), Some(77));
        assert_eq!(grid.missing(), 23);
        let block = grid.to_block();
        assert_eq!(block.codewords.len(), 24);
        assert_eq!(block.codewords[6], 77);
        assert_eq!(block.erasures.len(), 23);
        assert!(!block.erasures.contains(&6));
    }

    #[test]
    fn test_histogram_vote_ignores_outliers() {
        let values = [0.50, 0.51, 0.505, 0.49, 0.9, 0.1];
        let voted = histogram_vote(&values, 0.02).expect("vote");
        assert!((voted - 0.50).abs() < 0.02, "voted {voted}");
        assert!(histogram_vote(&[], 0.1).is_none());
    }

    #[test]
    fn test_module_codeword() {
        let widths = codewords::pattern(3, 123).expect("pattern");
        let mut bits = BitMatrix::new(20, 2);
        let mut x = 1usize;
        for (i, &w) in widths.iter().enumerate() {
            if i % 2 == 0 {
                bits.set_region(x, 1, w as usize, 1);
            }
            x += w as usize;
        }
        let mut runs = Vec::new();
        assert_eq!(module_codeword(&bits, 1, 1, 3, &mut runs), Some(123));
        assert_eq!(module_codeword(&bits, 1, 1, 0, &mut runs), None);
        assert_eq!(module_codeword(&bits, 0, 1, 3, &mut runs), None);
    }
}
