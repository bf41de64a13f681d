//! Reed-Solomon correction properties over GF(256) and GF(929).

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_barcode::decoder::reed_solomon::{CodewordBlock, ReedSolomon};

/// Distinct positions below `len`
fn positions(len: usize, max: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::btree_set(0..len, 0..=max).prop_map(|s| s.into_iter().collect())
}

proptest! {
    #[test]
    fn qr_corrects_up_to_half_parity(
        data in prop::collection::vec(0u32..256, 1..60),
        parity in 2usize..31,
        seed in prop::collection::vec(1u32..256, 15),
        errors in 0usize..16,
    ) {
        let rs = ReedSolomon::qr(parity);
        let original = rs.encode(&data);
        let errors = errors.min(parity / 2);
        let mut damaged = original.clone();
        let len = damaged.len();
        for (k, e) in seed.iter().take(errors).enumerate() {
            let i = (k * 7919 + 13) % len;
            damaged[i] ^= e;
        }
        let mut block = CodewordBlock::new(damaged);
        let correction = rs.decode(&mut block).expect("within capacity");
        prop_assert_eq!(&block.codewords, &original);
        prop_assert!(correction.errors <= errors);
        prop_assert!((0.0..=1.0).contains(&correction.confidence));
    }

    #[test]
    fn pdf417_corrects_errors_and_erasures(
        data in prop::collection::vec(0u32..929, 1..120),
        level in 1u8..5,
        erasures in positions(16, 8),
        offsets in prop::collection::vec(1u32..929, 4),
    ) {
        let parity = 2usize << level;
        let rs = ReedSolomon::pdf417(parity);
        let original = rs.encode(&data);
        let mut damaged = original.clone();
        let len = damaged.len();
        let erasures: Vec<usize> = erasures.into_iter().filter(|&i| i < len).take(parity / 2).collect();
        for &i in &erasures {
            damaged[i] = 0;
        }
        // 2 * errors + erasures stays within the parity count
        let budget = (parity - erasures.len()) / 2;
        for (k, &offset) in offsets.iter().take(budget).enumerate() {
            let Some(i) = (len - 1).checked_sub(k * 3) else {
                break;
            };
            if !erasures.contains(&i) {
                damaged[i] = (damaged[i] + offset) % 929;
            }
        }
        let mut block = CodewordBlock::with_erasures(damaged, erasures);
        rs.decode(&mut block).expect("within capacity");
        prop_assert_eq!(&block.codewords, &original);
    }
}

/// Damage `count` distinct positions of a fresh block; `field_size` 256 adds by
/// xor, anything else adds modulo the prime
fn overloaded_block(rs: &ReedSolomon, field_size: u32, count: usize, rng: &mut StdRng) -> (Vec<u32>, Vec<u32>) {
    let len = rng.gen_range(rs.parity() + 10..rs.parity() + 60);
    let data: Vec<u32> = (0..len - rs.parity()).map(|_| rng.gen_range(0..field_size)).collect();
    let original = rs.encode(&data);
    let mut damaged = original.clone();
    let mut hit = Vec::with_capacity(count);
    while hit.len() < count {
        let i = rng.gen_range(0..len);
        if hit.contains(&i) {
            continue;
        }
        hit.push(i);
        let offset = rng.gen_range(1..field_size);
        damaged[i] = if field_size == 256 {
            damaged[i] ^ offset
        } else {
            (damaged[i] + offset) % field_size
        };
    }
    (original, damaged)
}

fn overload_outcomes(field_size: u32, make: fn(usize) -> ReedSolomon, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let trials = 200;
    let mut rejected = 0;
    for trial in 0..trials {
        let rs = make([8, 10, 16][trial % 3]);
        let capacity = rs.parity() / 2;
        let count = rng.gen_range(capacity + 1..=2 * capacity);
        let (original, damaged) = overloaded_block(&rs, field_size, count, &mut rng);
        let mut block = CodewordBlock::new(damaged);
        match rs.decode(&mut block) {
            Err(_) => rejected += 1,
            Ok(correction) => {
                assert!(correction.errors <= capacity, "trial {trial}: {correction:?}");
                assert_ne!(block.codewords, original, "trial {trial}");
            }
        }
    }
    assert!(rejected * 100 >= trials * 95, "only {rejected} of {trials} rejected");
}

#[test]
fn test_qr_overload_is_rejected() {
    overload_outcomes(256, ReedSolomon::qr, 7);
}

#[test]
fn test_pdf417_overload_is_rejected() {
    overload_outcomes(929, ReedSolomon::pdf417, 11);
}
