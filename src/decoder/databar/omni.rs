//! GS1 DataBar Omnidirectional, Truncated and Stacked.
//!
//! A symbol is two pairs: the left pair (outside character 1, finder,
//! inside character 2) and the right pair, which is the mirror image of a
//! left pair. Read against the line direction, a right pair has exactly the
//! layout of a left pair, so every pair is decoded the same way and the
//! roles are settled when pairs are joined by the finder checksum.

use super::combinatorics::{rss_value, rss_widths};
use super::{
    join_elements, resolve_widths, split_elements, DataBarRead, DataCharacter, DirectedRuns, Span,
};
use crate::decoder::gs1;
use crate::decoder::recovery::RecoveryCache;
use crate::detector::pattern::{merge_noise_runs, FoundPattern, PatternFinder, PatternTemplate};
use crate::models::BarcodeType;
use tracing::{debug, trace};

/// Finder widths in reading order of a left pair
pub(crate) const FINDER_PATTERNS: [[u8; 5]; 9] = [
    [3, 8, 2, 1, 1],
    [3, 5, 5, 1, 1],
    [3, 3, 7, 1, 1],
    [3, 1, 9, 1, 1],
    [2, 7, 4, 1, 1],
    [2, 5, 6, 1, 1],
    [2, 3, 8, 1, 1],
    [1, 5, 7, 1, 1],
    [1, 3, 9, 1, 1],
];

const OUTSIDE_EVEN_TOTAL_SUBSET: [u32; 5] = [1, 10, 34, 70, 126];
const INSIDE_ODD_TOTAL_SUBSET: [u32; 4] = [4, 20, 48, 81];
const OUTSIDE_GSUM: [u32; 6] = [0, 161, 961, 2015, 2715, 2841];
const INSIDE_GSUM: [u32; 5] = [0, 336, 1036, 1516, 1597];
const OUTSIDE_ODD_WIDEST: [u32; 5] = [8, 6, 4, 3, 1];
const INSIDE_ODD_WIDEST: [u32; 4] = [2, 4, 6, 8];

const OUTSIDE_MODULES: u32 = 16;
const INSIDE_MODULES: u32 = 15;
pub(crate) const PAIR_RADIX: u32 = 1597;
pub(crate) const LEFT_RADIX: u64 = 4_537_077;

fn base9_portion(counts: &[u32; 4]) -> u32 {
    counts.iter().rev().fold(0, |acc, &c| acc * 9 + c)
}

fn within(counts: &[u32; 4], widest: u32) -> bool {
    counts.iter().all(|&c| (1..=widest).contains(&c))
}

/// Decode an outer character (16 modules) from its widths in reading order
pub(crate) fn outside_character(widths: &[u32]) -> Option<DataCharacter> {
    if widths.len() != 8 {
        return None;
    }
    let (odd, even) = split_elements(widths);
    let odd_sum: u32 = odd.iter().sum();
    if odd_sum % 2 != 0 || !(4..=12).contains(&odd_sum) {
        return None;
    }
    let group = ((12 - odd_sum) / 2) as usize;
    let odd_widest = OUTSIDE_ODD_WIDEST[group];
    let even_widest = 9 - odd_widest;
    if !within(&odd, odd_widest) || !within(&even, even_widest) || !even.contains(&1) {
        return None;
    }
    let v_odd = rss_value(&odd, odd_widest, false);
    let v_even = rss_value(&even, even_widest, true);
    let t_even = OUTSIDE_EVEN_TOTAL_SUBSET[group];
    if v_even >= t_even {
        return None;
    }
    let value = v_odd * t_even + v_even + OUTSIDE_GSUM[group];
    if value >= OUTSIDE_GSUM[group + 1] {
        return None;
    }
    Some(DataCharacter {
        value,
        checksum_portion: base9_portion(&odd) + 3 * base9_portion(&even),
    })
}

/// Decode an inner character (15 modules) from its widths in reading order
pub(crate) fn inside_character(widths: &[u32]) -> Option<DataCharacter> {
    if widths.len() != 8 {
        return None;
    }
    let (odd, even) = split_elements(widths);
    let even_sum: u32 = even.iter().sum();
    if even_sum % 2 != 0 || !(4..=10).contains(&even_sum) {
        return None;
    }
    let group = ((10 - even_sum) / 2) as usize;
    let odd_widest = INSIDE_ODD_WIDEST[group];
    let even_widest = 9 - odd_widest;
    if !within(&odd, odd_widest) || !within(&even, even_widest) || !odd.contains(&1) {
        return None;
    }
    let v_odd = rss_value(&odd, odd_widest, true);
    let v_even = rss_value(&even, even_widest, false);
    let t_odd = INSIDE_ODD_TOTAL_SUBSET[group];
    if v_odd >= t_odd {
        return None;
    }
    let value = v_even * t_odd + v_odd + INSIDE_GSUM[group];
    if value >= INSIDE_GSUM[group + 1] {
        return None;
    }
    Some(DataCharacter {
        value,
        checksum_portion: base9_portion(&odd) + 3 * base9_portion(&even),
    })
}

/// Element widths of outer character `value`
pub(crate) fn outside_widths(value: u32) -> Option<[u32; 8]> {
    let group = (0..5).rev().find(|&g| OUTSIDE_GSUM[g] <= value)?;
    if value >= OUTSIDE_GSUM[5] {
        return None;
    }
    let rem = value - OUTSIDE_GSUM[group];
    let t_even = OUTSIDE_EVEN_TOTAL_SUBSET[group];
    let odd_widest = OUTSIDE_ODD_WIDEST[group];
    let odd_modules = 12 - 2 * group as u32;
    let odd = rss_widths(rem / t_even, odd_modules, 4, odd_widest, false);
    let even = rss_widths(rem % t_even, OUTSIDE_MODULES - odd_modules, 4, 9 - odd_widest, true);
    Some(join_elements(&odd, &even))
}

/// Element widths of inner character `value`
pub(crate) fn inside_widths(value: u32) -> Option<[u32; 8]> {
    let group = (0..4).rev().find(|&g| INSIDE_GSUM[g] <= value)?;
    if value >= INSIDE_GSUM[4] {
        return None;
    }
    let rem = value - INSIDE_GSUM[group];
    let t_odd = INSIDE_ODD_TOTAL_SUBSET[group];
    let odd_widest = INSIDE_ODD_WIDEST[group];
    let even_modules = 10 - 2 * group as u32;
    let odd = rss_widths(rem % t_odd, INSIDE_MODULES - even_modules, 4, odd_widest, true);
    let even = rss_widths(rem / t_odd, even_modules, 4, 9 - odd_widest, false);
    Some(join_elements(&odd, &even))
}

/// Left and right finder values carrying checksum `check` (0..79)
pub(crate) fn finders_for_checksum(check: u32) -> (u8, u8) {
    let mut c = check;
    if c >= 8 {
        c += 1;
    }
    if c >= 72 {
        c += 1;
    }
    ((c / 9) as u8, (c % 9) as u8)
}

fn checksum_matches(left: &PairObservation, right: &PairObservation) -> bool {
    let check = (left.checksum + 16 * right.checksum) % 79;
    let mut target = 9 * left.finder as u32 + right.finder as u32;
    if target > 72 {
        target -= 1;
    }
    if target > 8 {
        target -= 1;
    }
    check == target
}

/// One pair as seen on consecutive lines
#[derive(Debug, Clone)]
struct PairObservation {
    value: u32,
    checksum: u32,
    finder: u8,
    forward: bool,
    first: Span,
    last: Span,
    module_len: f32,
    recovered: bool,
    hits: u32,
}

impl PairObservation {
    fn extent(&self) -> (usize, usize) {
        (
            self.first.start.min(self.last.start),
            self.first.end.max(self.last.end),
        )
    }
}

/// Accumulates DataBar pairs over the scan lines of one direction.
///
/// Lines must be fed in increasing order; symbols are produced by
/// [`OmniCollector::finish`] once every line has been seen.
pub struct OmniCollector {
    finder: PatternFinder,
    outside_cache: RecoveryCache<Vec<u32>>,
    inside_cache: RecoveryCache<Vec<u32>>,
    observations: Vec<PairObservation>,
    merged: Vec<u32>,
}

impl Default for OmniCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl OmniCollector {
    pub fn new() -> Self {
        let templates = FINDER_PATTERNS
            .iter()
            .map(|f| PatternTemplate::from_modules(f, None))
            .collect();
        Self {
            finder: PatternFinder::new(templates).with_noise_merge(false),
            outside_cache: RecoveryCache::with_default_size(),
            inside_cache: RecoveryCache::with_default_size(),
            observations: Vec::new(),
            merged: Vec::new(),
        }
    }

    /// Decode every pair on line `line` in both reading directions
    pub fn scan_line(&mut self, line: usize, runs: &[u32], first_dark: bool) {
        let mut merged = std::mem::take(&mut self.merged);
        merge_noise_runs(runs, &mut merged);
        for forward in [true, false] {
            let directed = DirectedRuns::new(&merged, first_dark, forward);
            self.finder.load_runs(directed.runs(), directed.first_dark());
            for found in best_per_run(self.finder.matches()) {
                if let Some(obs) = self.decode_pair(&directed, &found, line) {
                    self.record(obs);
                }
            }
        }
        self.merged = merged;
    }

    fn decode_pair(
        &mut self,
        directed: &DirectedRuns,
        found: &FoundPattern,
        line: usize,
    ) -> Option<PairObservation> {
        let runs = directed.runs();
        let f = found.run_index;
        if f < 9 || f + 13 > runs.len() {
            return None;
        }
        let module = found.module_len;
        let guard = runs[f - 9] as f32 / module;
        if !(0.4..=2.2).contains(&guard) {
            return None;
        }
        let outside_counts = &runs[f - 8..f];
        let mut inside_counts = [0u32; 8];
        inside_counts.copy_from_slice(&runs[f + 5..f + 13]);
        inside_counts.reverse();
        let plausible = |counts: &[u32], modules: u32| {
            let unit = counts.iter().sum::<u32>() as f32 / modules as f32;
            (0.7..=1.4).contains(&(unit / module))
        };
        if !plausible(outside_counts, OUTSIDE_MODULES) || !plausible(&inside_counts, INSIDE_MODULES) {
            return None;
        }
        let (outside_w, r1) = resolve_widths(outside_counts, OUTSIDE_MODULES, 8, &mut self.outside_cache, |w| {
            outside_character(w).is_some()
        })?;
        let (inside_w, r2) = resolve_widths(&inside_counts, INSIDE_MODULES, 8, &mut self.inside_cache, |w| {
            inside_character(w).is_some()
        })?;
        let outside = outside_character(&outside_w)?;
        let inside = inside_character(&inside_w)?;

        // a right pair read backwards starts with a one-module guard bar
        let from = if f >= 10 && runs[f - 10] as f32 / module <= 2.2 { f - 10 } else { f - 9 };
        let (start, end) = directed.dark_extent(from, f + 12)?;
        let span = Span { line, start, end };
        trace!(line, finder = found.template, forward = directed.is_forward(), "DataBar pair");
        Some(PairObservation {
            value: PAIR_RADIX * outside.value + inside.value,
            checksum: outside.checksum_portion + 4 * inside.checksum_portion,
            finder: found.template as u8,
            forward: directed.is_forward(),
            first: span,
            last: span,
            module_len: module,
            recovered: r1 || r2,
            hits: 1,
        })
    }

    fn record(&mut self, obs: PairObservation) {
        let reach = (obs.module_len * 10.0) as usize + 2;
        let slack = (obs.module_len * 3.0) as usize + 1;
        let existing = self.observations.iter_mut().find(|o| {
            o.value == obs.value
                && o.finder == obs.finder
                && o.forward == obs.forward
                && obs.first.line.saturating_sub(o.last.line) <= reach
                && o.last.start.abs_diff(obs.first.start) <= slack
        });
        match existing {
            Some(o) => {
                o.last = obs.first;
                o.hits += 1;
                o.recovered &= obs.recovered;
            }
            None => self.observations.push(obs),
        }
    }

    /// Join collected pairs into symbols
    pub fn finish(self) -> Vec<DataBarRead> {
        let obs = self.observations;
        let mut candidates: Vec<(f32, usize, usize, bool)> = Vec::new();
        for (i, a) in obs.iter().enumerate().filter(|(_, o)| o.forward) {
            for (j, b) in obs.iter().enumerate().filter(|(_, o)| !o.forward) {
                let Some(distance) = arrangement(a, b) else {
                    continue;
                };
                for left_is_a in [true, false] {
                    let (l, r) = if left_is_a { (a, b) } else { (b, a) };
                    if checksum_matches(l, r) {
                        let score = distance - 0.01 * (a.hits + b.hits) as f32;
                        candidates.push((score, i, j, left_is_a));
                    }
                }
            }
        }
        candidates.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut used = vec![false; obs.len()];
        let mut out = Vec::new();
        for (_, i, j, left_is_a) in candidates {
            if used[i] || used[j] {
                continue;
            }
            let (a, b) = (&obs[i], &obs[j]);
            let (l, r) = if left_is_a { (a, b) } else { (b, a) };
            let symbol = LEFT_RADIX * l.value as u64 + r.value as u64;
            // the 10^13 digit is the composite linkage flag
            let digits = format!("{:013}", symbol % 10_000_000_000_000);
            let Some(check) = gs1::gtin_check_digit(&digits) else {
                continue;
            };
            used[i] = true;
            used[j] = true;
            let confidence = if l.recovered || r.recovered { 0.8 } else { 1.0 };
            out.push(DataBarRead {
                symbology: BarcodeType::DataBar,
                text: format!("(01){digits}{check}"),
                spans: vec![a.first, a.last, b.first, b.last],
                reversed: !l.forward,
                module_len: (a.module_len + b.module_len) * 0.5,
                confidence,
            });
        }
        debug!(pairs = obs.len(), symbols = out.len(), "DataBar pairing");
        out
    }
}

/// Keep the lowest-error finder match at each run index
pub(crate) fn best_per_run(mut found: Vec<FoundPattern>) -> Vec<FoundPattern> {
    found.sort_by(|a, b| a.run_index.cmp(&b.run_index).then(a.error.total_cmp(&b.error)));
    found.dedup_by_key(|f| f.run_index);
    found
}

/// Distance score when `b` (read backwards) can complete `a` (read forwards):
/// beside it on the same lines, or in the rows that follow
fn arrangement(a: &PairObservation, b: &PairObservation) -> Option<f32> {
    let module = (a.module_len + b.module_len) * 0.5;
    let (a_start, a_end) = a.extent();
    let (b_start, b_end) = b.extent();
    let same_lines = a.first.line <= b.last.line && b.first.line <= a.last.line;
    if same_lines {
        // compare spans line against line, following the slant of `a`
        let drift = if a.last.line > a.first.line {
            (a.last.start as f32 - a.first.start as f32) / (a.last.line - a.first.line) as f32
        } else {
            0.0
        };
        let gap_at = |sa: &Span, sb: &Span| {
            let shift = drift * (sb.line as f32 - sa.line as f32);
            (sb.start as f32 - sa.end as f32 - shift).abs()
        };
        let gap = gap_at(&a.first, &b.first).min(gap_at(&a.last, &b.last));
        return (gap <= 3.0 * module).then_some(gap);
    }
    if b.first.line <= a.last.line {
        return None;
    }
    let gap = (b.first.line - a.last.line) as f32;
    if gap > 12.0 * module + 2.0 {
        return None;
    }
    let overlap = a_end.min(b_end) as f32 - a_start.max(b_start) as f32;
    let narrower = (a_end - a_start).min(b_end - b_start) as f32;
    (overlap >= 0.5 * narrower).then_some(gap)
}
