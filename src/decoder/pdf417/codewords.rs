//! PDF417 symbol characters.
//!
//! A codeword is 17 modules: four bars and four spaces, each one to six
//! modules wide, starting with a bar. The cluster of a pattern is
//! `(b1 - b2 + b3 - b4 + 9) mod 9` over its bar widths; rows use clusters 0,
//! 3 and 6 in turn. Within a cluster, patterns are assigned to the values
//! 0..929 in lexicographic order of their width sequence.

use crate::decoder::recovery::{RecoveryCache, SearchLimits};
use std::sync::OnceLock;

/// Codeword values per cluster
pub const CODEWORD_VALUES: usize = 929;
/// Modules per codeword
pub const CODEWORD_MODULES: u32 = 17;

/// Start pattern, bar first
pub const START_PATTERN: [u8; 8] = [8, 1, 1, 1, 1, 1, 1, 3];
/// Stop pattern, bar first
pub const STOP_PATTERN: [u8; 9] = [7, 1, 1, 3, 1, 1, 1, 2, 1];

struct CodewordTable {
    // packed widths per (cluster / 3, value)
    patterns: [Vec<u32>; 3],
    // (packed widths, value, cluster / 3), sorted by key
    lookup: Vec<(u32, u16, u8)>,
}

static TABLE: OnceLock<CodewordTable> = OnceLock::new();

fn pack(widths: &[u32]) -> Option<u32> {
    if widths.len() != 8 {
        return None;
    }
    widths.iter().try_fold(0u32, |acc, &w| {
        (1..=6).contains(&w).then_some((acc << 3) | (w - 1))
    })
}

fn unpack(key: u32) -> [u32; 8] {
    let mut out = [0u32; 8];
    for (i, w) in out.iter_mut().enumerate() {
        *w = ((key >> (3 * (7 - i))) & 7) + 1;
    }
    out
}

/// Cluster number of a width sequence
pub fn cluster_of(widths: &[u32]) -> u32 {
    (widths[0] + widths[4] + 18 - widths[2] - widths[6]) % 9
}

fn build() -> CodewordTable {
    let mut patterns: [Vec<u32>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut widths = [1u32; 8];
    // odometer over 1..=6 in lexicographic order
    loop {
        if widths.iter().sum::<u32>() == CODEWORD_MODULES {
            let cluster = cluster_of(&widths);
            if cluster % 3 == 0 {
                let list = &mut patterns[(cluster / 3) as usize];
                if list.len() < CODEWORD_VALUES {
                    if let Some(key) = pack(&widths) {
                        list.push(key);
                    }
                }
            }
        }
        let mut i = 7;
        loop {
            if widths[i] < 6 {
                widths[i] += 1;
                break;
            }
            widths[i] = 1;
            if i == 0 {
                return finish(patterns);
            }
            i -= 1;
        }
    }
}

fn finish(patterns: [Vec<u32>; 3]) -> CodewordTable {
    let mut lookup: Vec<(u32, u16, u8)> = patterns
        .iter()
        .enumerate()
        .flat_map(|(c, list)| {
            list.iter()
                .enumerate()
                .map(move |(value, &key)| (key, value as u16, c as u8))
        })
        .collect();
    lookup.sort_unstable_by_key(|e| e.0);
    CodewordTable { patterns, lookup }
}

fn table() -> &'static CodewordTable {
    TABLE.get_or_init(build)
}

/// A decoded symbol character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codeword {
    pub value: u16,
    /// 0, 3 or 6
    pub cluster: u8,
}

/// Codeword for integer module widths (bar first)
pub fn lookup(widths: &[u32]) -> Option<Codeword> {
    let key = pack(widths)?;
    let t = table();
    let i = t.lookup.binary_search_by_key(&key, |e| e.0).ok()?;
    let (_, value, c) = t.lookup[i];
    Some(Codeword {
        value,
        cluster: c * 3,
    })
}

/// Module widths of `value` in `cluster` (0, 3 or 6)
pub fn pattern(cluster: u8, value: u16) -> Option<[u32; 8]> {
    if cluster % 3 != 0 {
        return None;
    }
    let key = *table().patterns.get(cluster as usize / 3)?.get(value as usize)?;
    Some(unpack(key))
}

/// Runs scaled to a 17-module total
fn measure(runs: &[u32]) -> Option<Vec<f32>> {
    let total: u32 = runs.iter().sum();
    if runs.len() != 8 || total == 0 {
        return None;
    }
    let scale = CODEWORD_MODULES as f32 / total as f32;
    Some(runs.iter().map(|&r| r as f32 * scale).collect())
}

/// Codeword of pixel runs by plain rounding, in whatever cluster it falls
pub fn nearest(runs: &[u32]) -> Option<Codeword> {
    let widths: Vec<u32> = measure(runs)?
        .iter()
        .map(|m| (m.round().max(1.0) as u32).min(6))
        .collect();
    lookup(&widths)
}

/// Value of one codeword from its eight pixel runs.
///
/// Exact rounding is tried first, then the bounded recovery search limited
/// to patterns of the expected cluster. The flag reports recovery.
pub fn resolve(runs: &[u32], cluster: u8, cache: &mut RecoveryCache<u16>) -> Option<(u16, bool)> {
    let measured = measure(runs)?;
    if let Some(cw) = nearest(runs).filter(|cw| cw.cluster == cluster) {
        return Some((cw.value, false));
    }
    cache
        .recover(&measured, &SearchLimits::new(1, 6), |w| {
            lookup(w)
                .filter(|cw| cw.cluster == cluster)
                .map(|cw| cw.value)
        })
        .map(|v| (v, true))
}
