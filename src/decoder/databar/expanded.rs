//! GS1 DataBar Expanded and Expanded Stacked.
//!
//! A row is a chain of pairs spaced 21 elements apart. Finders of even pairs
//! read forward and those of odd pairs read backward, so each chain knows
//! the parity of its first pair. Chains seen on different rows are joined in
//! row order until the finder sequence and the check character agree.

use super::combinatorics::{rss_value, rss_widths};
use super::omni::best_per_run;
use super::{general, join_elements, resolve_widths, split_elements, DataBarRead, DirectedRuns, Span};
use crate::decoder::recovery::RecoveryCache;
use crate::detector::pattern::{merge_noise_runs, FoundPattern, PatternFinder, PatternTemplate};
use crate::models::BarcodeType;
use tracing::{debug, trace};

/// Finder widths of even pairs in reading order (A to F)
pub(crate) const FINDER_PATTERNS: [[u8; 5]; 6] = [
    [1, 8, 4, 1, 1],
    [3, 6, 4, 1, 1],
    [3, 4, 6, 1, 1],
    [3, 2, 8, 1, 1],
    [2, 6, 5, 1, 1],
    [2, 2, 9, 1, 1],
];

const A: u8 = 0;
const B: u8 = 1;
const C: u8 = 2;
const D: u8 = 3;
const E: u8 = 4;
const F: u8 = 5;

/// Finder sequence of a symbol with `index + 2` pairs
const FINDER_SEQUENCES: [&[u8]; 10] = [
    &[A, A],
    &[A, B, B],
    &[A, C, B, D],
    &[A, E, B, D, C],
    &[A, E, B, D, D, F],
    &[A, E, B, D, E, F, F],
    &[A, A, B, B, C, C, D, D],
    &[A, A, B, B, C, C, D, E, E],
    &[A, A, B, B, C, C, D, E, F, F],
    &[A, A, B, B, C, D, D, E, E, F, F],
];

const SYMBOL_WIDEST: [u32; 5] = [7, 5, 4, 3, 1];
const EVEN_TOTAL_SUBSET: [u32; 5] = [4, 20, 52, 104, 204];
const GSUM: [u32; 6] = [0, 348, 1388, 2948, 3988, 4192];
const CHAR_MODULES: u32 = 17;
const PAIR_ELEMENTS: usize = 21;
const MAX_PAIRS: usize = 11;

const WEIGHTS: [[u32; 8]; 23] = build_weights();

// consecutive powers of 3 modulo 211
const fn build_weights() -> [[u32; 8]; 23] {
    let mut table = [[0u32; 8]; 23];
    let mut w = 1u32;
    let mut row = 0;
    while row < 23 {
        let mut col = 0;
        while col < 8 {
            table[row][col] = w;
            w = w * 3 % 211;
            col += 1;
        }
        row += 1;
    }
    table
}

/// Weight row of a character; the check character has none
fn weight_row(pair: usize, finder: u8, left: bool) -> Option<usize> {
    let row = 4 * finder as usize + if pair % 2 == 0 { 0 } else { 2 } + usize::from(!left);
    row.checked_sub(1)
}

/// One Expanded character with its element counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpandedChar {
    pub value: u32,
    odd: [u32; 4],
    even: [u32; 4],
}

impl ExpandedChar {
    fn checksum_portion(&self, row: usize) -> u32 {
        (0..4)
            .map(|i| self.odd[i] * WEIGHTS[row][2 * i] + self.even[i] * WEIGHTS[row][2 * i + 1])
            .sum()
    }
}

fn within(counts: &[u32; 4], widest: u32) -> bool {
    counts.iter().all(|&c| (1..=widest).contains(&c))
}

/// Decode a 17-module character from its widths in reading order
pub(crate) fn expanded_character(widths: &[u32]) -> Option<ExpandedChar> {
    if widths.len() != 8 {
        return None;
    }
    let (odd, even) = split_elements(widths);
    let odd_sum: u32 = odd.iter().sum();
    if odd_sum % 2 != 0 || !(4..=12).contains(&odd_sum) {
        return None;
    }
    let group = ((13 - odd_sum) / 2) as usize;
    let odd_widest = SYMBOL_WIDEST[group];
    let even_widest = 9 - odd_widest;
    if !within(&odd, odd_widest) || !within(&even, even_widest) || !odd.contains(&1) {
        return None;
    }
    let t_even = EVEN_TOTAL_SUBSET[group];
    let t_odd = (GSUM[group + 1] - GSUM[group]) / t_even;
    let v_odd = rss_value(&odd, odd_widest, true);
    let v_even = rss_value(&even, even_widest, false);
    if v_odd >= t_odd || v_even >= t_even {
        return None;
    }
    Some(ExpandedChar {
        value: v_odd * t_even + v_even + GSUM[group],
        odd,
        even,
    })
}

/// Element widths of character `value`
pub(crate) fn expanded_widths(value: u32) -> Option<[u32; 8]> {
    if value >= GSUM[5] {
        return None;
    }
    let group = (0..5).rev().find(|&g| GSUM[g] <= value)?;
    let rem = value - GSUM[group];
    let t_even = EVEN_TOTAL_SUBSET[group];
    let odd_widest = SYMBOL_WIDEST[group];
    let odd_modules = 12 - 2 * group as u32;
    let odd = rss_widths(rem / t_even, odd_modules, 4, odd_widest, true);
    let even = rss_widths(rem % t_even, CHAR_MODULES - odd_modules, 4, 9 - odd_widest, false);
    Some(join_elements(&odd, &even))
}

/// Per-pair element widths, left to right, of a symbol carrying the 12-bit
/// data character values `data`. The check character is computed here.
pub(crate) fn pair_elements(data: &[u32]) -> Option<Vec<Vec<u32>>> {
    let chars = data.len() + 1;
    let pairs = chars.div_ceil(2);
    if chars < 4 || pairs > MAX_PAIRS {
        return None;
    }
    let sequence = FINDER_SEQUENCES[pairs - 2];
    let mut widths = Vec::with_capacity(chars);
    widths.push([0u32; 8]);
    let mut sum = 0u32;
    for (i, &value) in data.iter().enumerate() {
        let c = i + 1;
        let pair = c / 2;
        let w = expanded_widths(value)?;
        let ch = expanded_character(&w)?;
        let row = weight_row(pair, sequence[pair], c % 2 == 0)?;
        sum += ch.checksum_portion(row);
        widths.push(w);
    }
    let check = 211 * (chars as u32 - 4) + sum % 211;
    widths[0] = expanded_widths(check)?;

    let mut out = Vec::with_capacity(pairs);
    for (k, &finder) in sequence.iter().enumerate() {
        let mut elements: Vec<u32> = widths[2 * k].to_vec();
        let mut f: Vec<u32> = FINDER_PATTERNS[finder as usize].iter().map(|&m| m as u32).collect();
        if k % 2 == 1 {
            f.reverse();
        }
        elements.extend(f);
        if let Some(right) = widths.get(2 * k + 1) {
            elements.extend(right.iter().rev());
        }
        out.push(elements);
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExpandedPair {
    finder: u8,
    left: ExpandedChar,
    right: Option<ExpandedChar>,
}

/// A chain of pairs read on consecutive lines of one row
#[derive(Debug, Clone)]
struct Fragment {
    pairs: Vec<ExpandedPair>,
    odd_start: bool,
    forward: bool,
    first: Span,
    last: Span,
    module_len: f32,
    recovered: bool,
    hits: u32,
}

impl Fragment {
    fn extent(&self) -> (usize, usize) {
        (
            self.first.start.min(self.last.start),
            self.first.end.max(self.last.end),
        )
    }
}

fn sequence_allows(finders: &[u8]) -> bool {
    FINDER_SEQUENCES
        .iter()
        .any(|seq| seq.len() >= finders.len() && seq[..finders.len()] == *finders)
}

/// Element string of a complete pair list, if the sequence and check
/// character agree
fn complete(pairs: &[&ExpandedPair]) -> Option<String> {
    let n = pairs.len();
    let sequence = FINDER_SEQUENCES.get(n.checked_sub(2)?)?;
    if pairs.iter().zip(sequence.iter()).any(|(p, &f)| p.finder != f) {
        return None;
    }
    if pairs[..n - 1].iter().any(|p| p.right.is_none()) {
        return None;
    }
    let mut sum = 0u32;
    let mut count = 1u32;
    let mut data = Vec::with_capacity(2 * n);
    for (k, p) in pairs.iter().enumerate() {
        if k > 0 {
            sum += p.left.checksum_portion(weight_row(k, p.finder, true)?);
            count += 1;
            data.push(p.left.value);
        }
        if let Some(right) = p.right {
            sum += right.checksum_portion(weight_row(k, p.finder, false)?);
            count += 1;
            data.push(right.value);
        }
    }
    if count < 4 || pairs[0].left.value != 211 * (count - 4) + sum % 211 {
        return None;
    }
    let mut bits = Vec::with_capacity(12 * data.len());
    for value in data {
        for i in (0..12).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    }
    general::decode_bits(&bits)
}

/// Accumulates Expanded row chains over the scan lines of one direction
pub struct ExpandedCollector {
    finder: PatternFinder,
    cache: RecoveryCache<Vec<u32>>,
    fragments: Vec<Fragment>,
    merged: Vec<u32>,
}

impl Default for ExpandedCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpandedCollector {
    pub fn new() -> Self {
        let templates = FINDER_PATTERNS
            .iter()
            .map(|f| PatternTemplate::from_modules(f, None))
            .collect();
        Self {
            finder: PatternFinder::new(templates)
                .with_reversed()
                .with_noise_merge(false),
            cache: RecoveryCache::with_default_size(),
            fragments: Vec::new(),
            merged: Vec::new(),
        }
    }

    /// Number of distinct row chains collected so far
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Decode every pair chain on line `line` in both reading directions
    pub fn scan_line(&mut self, line: usize, runs: &[u32], first_dark: bool) {
        let mut merged = std::mem::take(&mut self.merged);
        merge_noise_runs(runs, &mut merged);
        for forward in [true, false] {
            let directed = DirectedRuns::new(&merged, first_dark, forward);
            self.finder.load_runs(directed.runs(), directed.first_dark());
            let found = best_per_run(self.finder.matches());
            let mut consumed = vec![false; found.len()];
            for k in 0..found.len() {
                if consumed[k] {
                    continue;
                }
                let mut members = vec![k];
                while let Some(next) = found.iter().position(|m| {
                    let last = &found[members[members.len() - 1]];
                    m.run_index == last.run_index + PAIR_ELEMENTS && m.reversed != last.reversed
                }) {
                    members.push(next);
                }
                let chain: Vec<&FoundPattern> = members.iter().map(|&i| &found[i]).collect();
                // a failed head must not swallow the chain of a real one
                if let Some(fragment) = self.decode_chain(&directed, &chain, line) {
                    for &i in &members[..fragment.pairs.len()] {
                        consumed[i] = true;
                    }
                    self.record(fragment);
                }
            }
        }
        self.merged = merged;
    }

    fn read_char(
        &mut self,
        runs: &[u32],
        from: usize,
        backwards: bool,
        module: f32,
    ) -> Option<(ExpandedChar, bool)> {
        let mut counts = [0u32; 8];
        counts.copy_from_slice(runs.get(from..from + 8)?);
        if backwards {
            counts.reverse();
        }
        let unit = counts.iter().sum::<u32>() as f32 / CHAR_MODULES as f32;
        if !(0.7..=1.4).contains(&(unit / module)) {
            return None;
        }
        let (widths, recovered) = resolve_widths(&counts, CHAR_MODULES, 8, &mut self.cache, |w| {
            expanded_character(w).is_some()
        })?;
        Some((expanded_character(&widths)?, recovered))
    }

    fn decode_chain(
        &mut self,
        directed: &DirectedRuns,
        chain: &[&FoundPattern],
        line: usize,
    ) -> Option<Fragment> {
        let runs = directed.runs();
        let head = chain.first()?;
        let f0 = head.run_index;
        if f0 < 9 {
            return None;
        }
        let guard = runs[f0 - 9] as f32 / head.module_len;
        if !(0.4..=2.2).contains(&guard) {
            return None;
        }
        let mut pairs = Vec::new();
        let mut recovered = false;
        let mut last_run = f0 + 4;
        for found in chain {
            let f = found.run_index;
            let module = found.module_len;
            let Some((left, r)) = self.read_char(runs, f - 8, false, module) else {
                break;
            };
            recovered |= r;
            let right = self.read_char(runs, f + 5, true, module);
            let finder = found.template as u8;
            match right {
                Some((right, r)) => {
                    recovered |= r;
                    pairs.push(ExpandedPair {
                        finder,
                        left,
                        right: Some(right),
                    });
                    last_run = f + 12;
                }
                None => {
                    pairs.push(ExpandedPair {
                        finder,
                        left,
                        right: None,
                    });
                    last_run = f + 4;
                    break;
                }
            }
        }
        if pairs.is_empty() {
            return None;
        }
        let (start, end) = directed.dark_extent(f0 - 9, last_run)?;
        let span = Span { line, start, end };
        trace!(line, pairs = pairs.len(), forward = directed.is_forward(), "DataBar Expanded chain");
        Some(Fragment {
            pairs,
            odd_start: head.reversed,
            forward: directed.is_forward(),
            first: span,
            last: span,
            module_len: head.module_len,
            recovered,
            hits: 1,
        })
    }

    fn record(&mut self, fragment: Fragment) {
        let reach = (fragment.module_len * 10.0) as usize + 2;
        let slack = (fragment.module_len * 3.0) as usize + 1;
        let existing = self.fragments.iter_mut().find(|f| {
            f.pairs == fragment.pairs
                && f.odd_start == fragment.odd_start
                && f.forward == fragment.forward
                && fragment.first.line.saturating_sub(f.last.line) <= reach
                && f.last.start.abs_diff(fragment.first.start) <= slack
        });
        match existing {
            Some(f) => {
                f.last = fragment.first;
                f.hits += 1;
                f.recovered &= fragment.recovered;
            }
            None => self.fragments.push(fragment),
        }
    }

    /// Join collected chains into symbols
    pub fn finish(self) -> Vec<DataBarRead> {
        let frags = self.fragments;
        let mut starts: Vec<usize> = (0..frags.len())
            .filter(|&i| !frags[i].odd_start && frags[i].pairs[0].finder == A)
            .collect();
        starts.sort_by(|&a, &b| frags[b].hits.cmp(&frags[a].hits));

        let mut used = vec![false; frags.len()];
        let mut out = Vec::new();
        for s in starts {
            if used[s] {
                continue;
            }
            for descending in [false, true] {
                let mut path = vec![s];
                if let Some(text) = assemble(&frags, &used, &mut path, descending) {
                    for &i in &path {
                        used[i] = true;
                    }
                    let parts: Vec<&Fragment> = path.iter().map(|&i| &frags[i]).collect();
                    let recovered = parts.iter().any(|f| f.recovered);
                    out.push(DataBarRead {
                        symbology: BarcodeType::DataBarExpanded,
                        text,
                        spans: parts.iter().flat_map(|f| [f.first, f.last]).collect(),
                        reversed: !parts[0].forward,
                        module_len: parts.iter().map(|f| f.module_len).sum::<f32>()
                            / parts.len() as f32,
                        confidence: if recovered { 0.8 } else { 1.0 },
                    });
                    break;
                }
            }
        }
        debug!(chains = frags.len(), symbols = out.len(), "DataBar Expanded assembly");
        out
    }
}

/// Depth-first join of row chains following `path`, rows strictly after
/// (or, with `descending`, before) the last chain taken
fn assemble(frags: &[Fragment], used: &[bool], path: &mut Vec<usize>, descending: bool) -> Option<String> {
    let pairs: Vec<&ExpandedPair> = path.iter().flat_map(|&i| frags[i].pairs.iter()).collect();
    if let Some(text) = complete(&pairs) {
        return Some(text);
    }
    let finders: Vec<u8> = pairs.iter().map(|p| p.finder).collect();
    if pairs.len() >= MAX_PAIRS
        || pairs.last().is_some_and(|p| p.right.is_none())
        || !sequence_allows(&finders)
    {
        return None;
    }
    let last = &frags[*path.last()?];
    let (l_start, l_end) = last.extent();
    let reach = 12.0 * last.module_len + 2.0;
    let mut next: Vec<(usize, usize)> = frags
        .iter()
        .enumerate()
        .filter(|(i, f)| !used[*i] && !path.contains(i) && f.odd_start == (pairs.len() % 2 == 1))
        .filter_map(|(i, f)| {
            let gap = if descending {
                last.first.line.checked_sub(f.last.line)?
            } else {
                f.first.line.checked_sub(last.last.line)?
            };
            if gap == 0 || gap as f32 > reach {
                return None;
            }
            let (s, e) = f.extent();
            (s.max(l_start) < e.min(l_end)).then_some((i, gap))
        })
        .collect();
    next.sort_by_key(|&(_, gap)| gap);
    for (i, _) in next {
        path.push(i);
        if let Some(text) = assemble(frags, used, path, descending) {
            return Some(text);
        }
        path.pop();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs_for(pairs: &[Vec<u32>], scale: u32) -> Vec<u32> {
        // quiet zone merged with the leading guard space
        let mut runs = vec![10 * scale, scale];
        for p in pairs {
            runs.extend(p.iter().map(|&w| w * scale));
        }
        runs.push(scale);
        runs.push(10 * scale);
        runs
    }

    fn ai01_3103_data() -> Vec<u32> {
        let mut bits = Vec::new();
        let mut push = |value: u32, len: usize| {
            for i in (0..len).rev() {
                bits.push((value >> i) & 1 == 1);
            }
        };
        push(0b0_0100, 5);
        for group in [1, 234, 567, 890] {
            push(group, 10);
        }
        push(1750, 15);
        bits.chunks(12)
            .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32))
            .collect()
    }

    #[test]
    fn test_weights_table() {
        assert_eq!(WEIGHTS[0], [1, 3, 9, 27, 81, 32, 96, 77]);
        assert_eq!(WEIGHTS[1], [20, 60, 180, 118, 143, 7, 21, 63]);
    }

    #[test]
    fn test_character_values() {
        for value in [0, 347, 348, 1387, 1388, 2947, 2948, 3987, 3988, 4191] {
            let widths = expanded_widths(value).expect("widths");
            assert_eq!(widths.iter().sum::<u32>(), CHAR_MODULES);
            assert_eq!(expanded_character(&widths).map(|c| c.value), Some(value));
        }
        assert!(expanded_widths(4192).is_none());
    }

    #[test]
    fn test_single_row_symbol() {
        let data = ai01_3103_data();
        assert_eq!(data.len(), 5);
        let pairs = pair_elements(&data).expect("layout");
        assert_eq!(pairs.len(), 3);
        let runs = runs_for(&pairs, 2);
        let mut collector = ExpandedCollector::new();
        for line in 0..3 {
            collector.scan_line(line, &runs, false);
        }
        let reads = collector.finish();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].text, "(01)90012345678908(3103)001750");
        assert!(!reads[0].reversed);
        assert_eq!(reads[0].symbology, BarcodeType::DataBarExpanded);
    }

    #[test]
    fn test_reversed_row() {
        let data = ai01_3103_data();
        let pairs = pair_elements(&data).expect("layout");
        let mut runs = runs_for(&pairs, 3);
        runs.reverse();
        let mut collector = ExpandedCollector::new();
        collector.scan_line(0, &runs, false);
        let reads = collector.finish();
        assert_eq!(reads.len(), 1);
        assert!(reads[0].reversed);
    }

    #[test]
    fn test_stacked_rows() {
        let data = ai01_3103_data();
        let pairs = pair_elements(&data).expect("layout");
        let top = runs_for(&pairs[..2], 2);
        let bottom = runs_for(&pairs[2..], 2);
        let mut collector = ExpandedCollector::new();
        for line in 0..6 {
            collector.scan_line(line, &top, false);
        }
        for line in 10..16 {
            collector.scan_line(line, &bottom, false);
        }
        assert!(collector.fragment_count() >= 2);
        let reads = collector.finish();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].text, "(01)90012345678908(3103)001750");
        assert_eq!(reads[0].spans.len(), 4);
    }

    #[test]
    fn test_corrupted_check_character_is_rejected() {
        let data = ai01_3103_data();
        let mut pairs = pair_elements(&data).expect("layout");
        // swap the check character for another valid character
        let other = expanded_widths(7).expect("widths");
        pairs[0][..8].copy_from_slice(&other);
        let runs = runs_for(&pairs, 2);
        let mut collector = ExpandedCollector::new();
        collector.scan_line(0, &runs, false);
        assert!(collector.finish().is_empty());
    }
}
