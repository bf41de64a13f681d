//! Recovery of integer module widths from noisy real-valued measurements.
//!
//! Each measured width offers three integer candidates (nearest, +1, -1).
//! Combinations are visited in increasing total rounding error through a
//! best-first expansion, so the exact reading is always tried first and the
//! search stays bounded by an iteration count and an error ceiling.

use crate::decoder::config;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate reading of one symbol character
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeChar {
    /// Integer module widths used
    pub widths: Vec<u32>,
    /// Decoded character value
    pub value: u32,
    /// Summed rounding error of `widths`
    pub error: f32,
}

impl Eq for BarcodeChar {}

impl PartialOrd for BarcodeChar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BarcodeChar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error
            .total_cmp(&other.error)
            .then_with(|| self.value.cmp(&other.value))
    }
}

/// Bounds of one search
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Smallest admissible width
    pub min_width: u32,
    /// Largest admissible width
    pub max_width: u32,
    /// Combinations examined before giving up
    pub max_iterations: usize,
    /// Largest summed rounding error accepted
    pub max_error: f32,
}

impl SearchLimits {
    /// Width range with the process-wide iteration and error bounds
    pub fn new(min_width: u32, max_width: u32) -> Self {
        Self {
            min_width,
            max_width,
            max_iterations: config::recovery_max_iterations(),
            max_error: config::recovery_max_error(),
        }
    }
}

/// Per-position integer options sorted by rounding error
fn options(measured: f32, limits: &SearchLimits) -> Vec<(u32, f32)> {
    let nearest = measured.round().max(0.0) as i64;
    let mut out: Vec<(u32, f32)> = [nearest, nearest + 1, nearest - 1]
        .iter()
        .filter(|&&v| v >= limits.min_width as i64 && v <= limits.max_width as i64)
        .map(|&v| (v as u32, (measured - v as f32).abs()))
        .collect();
    if out.is_empty() {
        // measurement far outside the range: clamp
        let v = nearest.clamp(limits.min_width as i64, limits.max_width as i64) as u32;
        out.push((v, (measured - v as f32).abs()));
    }
    out.sort_by(|a, b| a.1.total_cmp(&b.1));
    out
}

#[derive(Debug, PartialEq)]
struct State {
    error: f32,
    choice: Vec<u8>,
    // lowest position this state may still advance
    pivot: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    // min-heap on error
    fn cmp(&self, other: &Self) -> Ordering {
        other.error.total_cmp(&self.error)
    }
}

/// Search width combinations for one that `accept` turns into a value.
///
/// Returns the accepted value, the integer widths and their total error.
pub fn recover<T>(
    measured: &[f32],
    limits: &SearchLimits,
    mut accept: impl FnMut(&[u32]) -> Option<T>,
) -> Option<(T, Vec<u32>, f32)> {
    if measured.is_empty() {
        return None;
    }
    let opts: Vec<Vec<(u32, f32)>> = measured.iter().map(|&m| options(m, limits)).collect();
    let mut heap = BinaryHeap::new();
    heap.push(State {
        error: opts.iter().map(|o| o[0].1).sum(),
        choice: vec![0; measured.len()],
        pivot: 0,
    });
    let mut widths = vec![0u32; measured.len()];
    let mut iterations = 0usize;
    while let Some(state) = heap.pop() {
        if state.error > limits.max_error || iterations >= limits.max_iterations {
            break;
        }
        iterations += 1;
        for (i, &c) in state.choice.iter().enumerate() {
            widths[i] = opts[i][c as usize].0;
        }
        if let Some(value) = accept(&widths) {
            return Some((value, widths, state.error));
        }
        // each combination is produced once: only advance positions >= pivot
        for i in state.pivot..measured.len() {
            let c = state.choice[i] as usize;
            if c + 1 < opts[i].len() {
                let mut choice = state.choice.clone();
                choice[i] += 1;
                let error = state.error - opts[i][c].1 + opts[i][c + 1].1;
                heap.push(State {
                    error,
                    choice,
                    pivot: i,
                });
            }
        }
    }
    None
}

/// Direct-mapped memo of recovery outcomes keyed by quantized measurements.
///
/// Each worker owns one; collisions simply overwrite.
#[derive(Debug, Clone)]
pub struct RecoveryCache<T> {
    slots: Vec<Option<Slot<T>>>,
    mask: usize,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    key: [u16; 16],
    len: u8,
    value: Option<T>,
}

const QUANTUM: f32 = 8.0;

fn quantize(measured: &[f32]) -> Option<[u16; 16]> {
    if measured.len() > 16 {
        return None;
    }
    let mut key = [0u16; 16];
    for (k, &m) in key.iter_mut().zip(measured) {
        *k = (m * QUANTUM).round().clamp(0.0, u16::MAX as f32) as u16;
    }
    Some(key)
}

fn fnv1a(key: &[u16]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &k in key {
        for b in k.to_le_bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
    }
    h
}

impl<T: Clone> RecoveryCache<T> {
    /// Cache with `slots` entries (rounded up to a power of two)
    pub fn new(slots: usize) -> Self {
        let slots = slots.max(1).next_power_of_two();
        Self {
            slots: vec![None; slots],
            mask: slots - 1,
        }
    }

    /// Cache sized by the process-wide setting
    pub fn with_default_size() -> Self {
        Self::new(config::recovery_cache_slots())
    }

    /// Memoized outcome for these measurements: `Some(None)` records a failure
    pub fn get(&self, measured: &[f32]) -> Option<Option<T>> {
        let key = quantize(measured)?;
        let len = measured.len();
        let slot = self.slots[fnv1a(&key[..len]) as usize & self.mask].as_ref()?;
        (slot.len as usize == len && slot.key == key).then(|| slot.value.clone())
    }

    /// Record an outcome
    pub fn insert(&mut self, measured: &[f32], value: Option<T>) {
        let Some(key) = quantize(measured) else {
            return;
        };
        let len = measured.len();
        let index = fnv1a(&key[..len]) as usize & self.mask;
        self.slots[index] = Some(Slot {
            key,
            len: len as u8,
            value,
        });
    }

    /// `recover` through the cache
    pub fn recover(
        &mut self,
        measured: &[f32],
        limits: &SearchLimits,
        accept: impl FnMut(&[u32]) -> Option<T>,
    ) -> Option<T> {
        if let Some(hit) = self.get(measured) {
            return hit;
        }
        let found = recover(measured, limits, accept).map(|(v, _, _)| v);
        self.insert(measured, found.clone());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SearchLimits {
        SearchLimits {
            min_width: 1,
            max_width: 9,
            max_iterations: 64,
            max_error: 3.0,
        }
    }

    #[test]
    fn test_exact_reading_first() {
        let mut calls = 0;
        let found = recover(&[1.1, 2.9, 4.0], &limits(), |w| {
            calls += 1;
            Some(w.to_vec())
        });
        let (value, _, error) = found.unwrap();
        assert_eq!(value, vec![1, 3, 4]);
        assert!((error - 0.2).abs() < 1e-5);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_finds_cheapest_valid_combination() {
        // nearest reading sums to 10; dropping the first width costs least
        let found = recover(&[2.55, 3.45, 3.7], &limits(), |w| {
            (w.iter().sum::<u32>() == 9).then_some(())
        });
        let (_, widths, _) = found.unwrap();
        assert_eq!(widths, vec![2, 3, 4]);
    }

    #[test]
    fn test_visits_in_increasing_error() {
        let mut seen = Vec::new();
        let measured = [1.3, 4.8, 2.5];
        let _ = recover(&measured, &limits(), |w| {
            let err: f32 = w
                .iter()
                .zip(&measured)
                .map(|(&a, &m)| (a as f32 - m).abs())
                .sum();
            seen.push(err);
            None::<()>
        });
        assert!(seen.len() > 1);
        assert!(seen.windows(2).all(|p| p[0] <= p[1] + 1e-5));
        // no combination visited twice: 3 * 3 * 3 at most
        assert!(seen.len() <= 27);
    }

    #[test]
    fn test_iteration_bound() {
        let mut bounded = limits();
        bounded.max_iterations = 5;
        let mut calls = 0;
        let found = recover(&[2.5; 6], &bounded, |_| {
            calls += 1;
            None::<()>
        });
        assert!(found.is_none());
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_cache_hits_and_failures() {
        let mut cache: RecoveryCache<u32> = RecoveryCache::new(16);
        let m = [1.0, 2.0, 3.0];
        let mut calls = 0;
        assert_eq!(
            cache.recover(&m, &limits(), |w| {
                calls += 1;
                Some(w.iter().sum())
            }),
            Some(6)
        );
        assert_eq!(cache.recover(&m, &limits(), |_| unreachable!()), Some(6));
        assert_eq!(calls, 1);
        cache.insert(&[5.0], None);
        assert_eq!(cache.get(&[5.0]), Some(None));
        assert_eq!(cache.get(&[6.0]), None);
    }

    #[test]
    fn test_barcode_char_orders_by_error() {
        let mut chars = vec![
            BarcodeChar { widths: vec![1], value: 4, error: 0.5 },
            BarcodeChar { widths: vec![1], value: 2, error: 0.1 },
        ];
        chars.sort();
        assert_eq!(chars[0].value, 2);
    }
}
