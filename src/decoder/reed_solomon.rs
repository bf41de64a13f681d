//! Reed-Solomon error and erasure correction over a finite field.
//!
//! One algorithm serves every symbology; only the field (prime 929 for
//! PDF417, GF(256) with primitive 0x11D for QR and Micro QR) and the first
//! generator root differ. Codeword `j` of an `n`-symbol block is the
//! coefficient of `x^(n-1-j)`, so its error locator is `X = alpha^(n-1-j)`.

use std::sync::OnceLock;
use thiserror::Error;

/// Reasons a codeword block cannot be corrected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RsError {
    #[error("{erasures} erasures exceed {parity} parity codewords")]
    TooManyErasures { erasures: usize, parity: usize },
    #[error("block of {len} codewords is longer than the field allows")]
    BlockTooLong { len: usize },
    #[error("codeword {value} is outside the field")]
    InvalidSymbol { value: u32 },
    #[error("error count exceeds correction capacity")]
    TooManyErrors,
    #[error("locator of degree {degree} has {roots} roots")]
    LocatorMismatch { degree: usize, roots: usize },
    #[error("declared erasures were not located")]
    ErasuresNotLocated,
    #[error("zero denominator in error evaluation")]
    ZeroDenominator,
    #[error("syndromes remain after correction")]
    VerificationFailed,
}

/// Log/antilog tables for a prime field or a binary extension field
#[derive(Debug)]
pub struct GaloisField {
    size: u32,
    binary: bool,
    exp: Vec<u32>,
    log: Vec<u32>,
}

impl GaloisField {
    /// GF(p) with primitive element `generator`
    pub fn prime(modulus: u32, generator: u32) -> Self {
        let order = (modulus - 1) as usize;
        let mut exp = vec![0u32; order * 2];
        let mut log = vec![0u32; modulus as usize];
        let mut x = 1u32;
        for i in 0..order * 2 {
            exp[i] = x;
            x = (x * generator) % modulus;
        }
        for (i, &e) in exp.iter().take(order).enumerate() {
            log[e as usize] = i as u32;
        }
        Self {
            size: modulus,
            binary: false,
            exp,
            log,
        }
    }

    /// GF(2^m) of `size` elements reduced by `primitive`, generator alpha = 2
    pub fn binary(size: u32, primitive: u32) -> Self {
        let order = (size - 1) as usize;
        let mut exp = vec![0u32; order * 2];
        let mut log = vec![0u32; size as usize];
        let mut x = 1u32;
        for i in 0..order * 2 {
            exp[i] = x;
            x <<= 1;
            if x >= size {
                x ^= primitive;
            }
        }
        for (i, &e) in exp.iter().take(order).enumerate() {
            log[e as usize] = i as u32;
        }
        Self {
            size,
            binary: true,
            exp,
            log,
        }
    }

    /// Number of field elements
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Order of the multiplicative group
    pub fn order(&self) -> usize {
        (self.size - 1) as usize
    }

    pub fn add(&self, a: u32, b: u32) -> u32 {
        if self.binary { a ^ b } else { (a + b) % self.size }
    }

    pub fn sub(&self, a: u32, b: u32) -> u32 {
        if self.binary {
            a ^ b
        } else {
            (self.size + a - b) % self.size
        }
    }

    pub fn neg(&self, a: u32) -> u32 {
        self.sub(0, a)
    }

    pub fn mul(&self, a: u32, b: u32) -> u32 {
        if a == 0 || b == 0 {
            return 0;
        }
        self.exp[(self.log[a as usize] + self.log[b as usize]) as usize]
    }

    /// Multiplicative inverse; `None` for zero
    pub fn inv(&self, a: u32) -> Option<u32> {
        if a == 0 {
            return None;
        }
        Some(self.exp[self.order() - self.log[a as usize] as usize])
    }

    pub fn div(&self, a: u32, b: u32) -> Option<u32> {
        self.inv(b).map(|ib| self.mul(a, ib))
    }

    /// `alpha^power` for any power, negative powers included
    pub fn exp(&self, power: i64) -> u32 {
        self.exp[power.rem_euclid(self.order() as i64) as usize]
    }

    /// Discrete log; `None` for zero
    pub fn log(&self, a: u32) -> Option<u32> {
        (a != 0).then(|| self.log[a as usize])
    }

    /// The integer `i` as a field element (`i * 1`)
    pub fn from_int(&self, i: usize) -> u32 {
        if self.binary {
            (i & 1) as u32
        } else {
            (i % self.size as usize) as u32
        }
    }
}

static QR_FIELD: OnceLock<GaloisField> = OnceLock::new();
static PDF417_FIELD: OnceLock<GaloisField> = OnceLock::new();

/// GF(256), x^8 + x^4 + x^3 + x^2 + 1
pub fn qr_field() -> &'static GaloisField {
    QR_FIELD.get_or_init(|| GaloisField::binary(256, 0x11D))
}

/// GF(929) with generator 3
pub fn pdf417_field() -> &'static GaloisField {
    PDF417_FIELD.get_or_init(|| GaloisField::prime(929, 3))
}

/// Codewords plus the positions known to be unreadable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodewordBlock {
    pub codewords: Vec<u32>,
    pub erasures: Vec<usize>,
}

impl CodewordBlock {
    pub fn new(codewords: Vec<u32>) -> Self {
        Self {
            codewords,
            erasures: Vec::new(),
        }
    }

    pub fn with_erasures(codewords: Vec<u32>, erasures: Vec<usize>) -> Self {
        Self {
            codewords,
            erasures,
        }
    }
}

/// Outcome of a successful correction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Codewords changed (errors plus erasures)
    pub errors: usize,
    /// Unused correction margin, `(parity - errors) / parity`
    pub confidence: f32,
}

/// A Reed-Solomon code: field, parity count and first generator root
#[derive(Debug, Clone, Copy)]
pub struct ReedSolomon {
    field: &'static GaloisField,
    parity: usize,
    first_root: i64,
}

impl ReedSolomon {
    pub fn new(field: &'static GaloisField, parity: usize, first_root: i64) -> Self {
        Self {
            field,
            parity,
            first_root,
        }
    }

    /// QR and Micro QR block code (roots alpha^0 ..)
    pub fn qr(parity: usize) -> Self {
        Self::new(qr_field(), parity, 0)
    }

    /// PDF417 code (roots 3^1 ..)
    pub fn pdf417(parity: usize) -> Self {
        Self::new(pdf417_field(), parity, 1)
    }

    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Append parity codewords to `data`
    pub fn encode(&self, data: &[u32]) -> Vec<u32> {
        let f = self.field;
        let t = self.parity;
        // generator, descending and monic
        let mut gen_asc = vec![1u32];
        for k in 0..t {
            let root = f.exp(self.first_root + k as i64);
            let mut next = vec![0u32; gen_asc.len() + 1];
            for (i, &c) in gen_asc.iter().enumerate() {
                next[i + 1] = f.add(next[i + 1], c);
                next[i] = f.sub(next[i], f.mul(root, c));
            }
            gen_asc = next;
        }
        let gen_desc: Vec<u32> = gen_asc.iter().rev().copied().collect();

        let mut rem = vec![0u32; t];
        for &d in data {
            let feedback = f.add(d, rem.first().copied().unwrap_or(0));
            if t > 0 {
                rem.rotate_left(1);
                rem[t - 1] = 0;
            }
            for j in 0..t {
                rem[j] = f.sub(rem[j], f.mul(feedback, gen_desc[j + 1]));
            }
        }
        let mut out = data.to_vec();
        out.extend(rem.iter().map(|&r| f.neg(r)));
        out
    }

    fn syndromes(&self, codewords: &[u32]) -> Vec<u32> {
        let f = self.field;
        (0..self.parity)
            .map(|k| {
                let a = f.exp(self.first_root + k as i64);
                codewords
                    .iter()
                    .fold(0u32, |acc, &c| f.add(f.mul(acc, a), c))
            })
            .collect()
    }

    /// Correct `block` in place.
    pub fn decode(&self, block: &mut CodewordBlock) -> Result<Correction, RsError> {
        let f = self.field;
        let n = block.codewords.len();
        let t = self.parity;
        if n > f.order() {
            return Err(RsError::BlockTooLong { len: n });
        }
        if let Some(&value) = block.codewords.iter().find(|&&c| c >= f.size()) {
            return Err(RsError::InvalidSymbol { value });
        }
        let mut erasures: Vec<usize> = block.erasures.iter().copied().filter(|&e| e < n).collect();
        erasures.sort_unstable();
        erasures.dedup();
        if erasures.len() > t {
            return Err(RsError::TooManyErasures {
                erasures: erasures.len(),
                parity: t,
            });
        }

        let syn = self.syndromes(&block.codewords);
        if syn.iter().all(|&s| s == 0) {
            return Ok(Correction {
                errors: 0,
                confidence: 1.0,
            });
        }

        let rho = erasures.len();
        let locator_exp = |pos: usize| (n - 1 - pos) as i64;

        // erasure locator: prod(1 - X_i x)
        let mut gamma = vec![1u32];
        for &pos in &erasures {
            let x = f.exp(locator_exp(pos));
            gamma = poly_mul(f, &gamma, &[1, f.neg(x)]);
        }

        let (lambda, l) = self.berlekamp_massey(&syn, gamma, rho);
        let lambda = poly_trim(lambda);
        let degree = lambda.len() - 1;
        if 2 * (l.saturating_sub(rho)) + rho > t || degree != l {
            return Err(RsError::TooManyErrors);
        }

        // Chien search over the block's positions
        let mut positions = Vec::with_capacity(degree);
        for pos in 0..n {
            let x_inv = f.exp(-locator_exp(pos));
            if poly_eval(f, &lambda, x_inv) == 0 {
                positions.push(pos);
                if positions.len() == degree {
                    break;
                }
            }
        }
        if positions.len() != degree {
            return Err(RsError::LocatorMismatch {
                degree,
                roots: positions.len(),
            });
        }
        if positions.len() < rho || !erasures.iter().all(|e| positions.contains(e)) {
            return Err(RsError::ErasuresNotLocated);
        }

        // Forney: e = -X^(1-b) * Omega(X^-1) / Lambda'(X^-1)
        let mut omega = poly_mul(f, &syn, &lambda);
        omega.truncate(t);
        let derivative: Vec<u32> = lambda
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &c)| f.mul(f.from_int(i), c))
            .collect();
        for &pos in &positions {
            let e = locator_exp(pos);
            let x_inv = f.exp(-e);
            let denominator = poly_eval(f, &derivative, x_inv);
            let numerator = f.mul(f.exp(e * (1 - self.first_root)), poly_eval(f, &omega, x_inv));
            let magnitude = f
                .div(numerator, denominator)
                .ok_or(RsError::ZeroDenominator)?;
            let c = &mut block.codewords[pos];
            // subtracting -m is adding m
            *c = f.add(*c, magnitude);
        }

        if self.syndromes(&block.codewords).iter().any(|&s| s != 0) {
            return Err(RsError::VerificationFailed);
        }
        let found = positions.len();
        Ok(Correction {
            errors: found,
            confidence: if t == 0 {
                1.0
            } else {
                (t.saturating_sub(found)) as f32 / t as f32
            },
        })
    }

    /// Berlekamp-Massey seeded with the erasure locator; returns the
    /// combined locator and its register length
    fn berlekamp_massey(&self, syn: &[u32], gamma: Vec<u32>, rho: usize) -> (Vec<u32>, usize) {
        let f = self.field;
        let mut lambda = gamma.clone();
        let mut b = gamma;
        let mut l = rho;
        for r in (rho + 1)..=self.parity {
            let mut delta = 0u32;
            for (j, &coef) in lambda.iter().enumerate() {
                if j < r {
                    delta = f.add(delta, f.mul(coef, syn[r - 1 - j]));
                }
            }
            let mut xb = Vec::with_capacity(b.len() + 1);
            xb.push(0);
            xb.extend_from_slice(&b);
            if delta == 0 {
                b = xb;
                continue;
            }
            let scaled: Vec<u32> = xb.iter().map(|&c| f.mul(delta, c)).collect();
            let next = poly_sub(f, &lambda, &scaled);
            if 2 * l < r + rho {
                // delta is non-zero here
                let inv = f.inv(delta).unwrap_or(0);
                b = lambda.iter().map(|&c| f.mul(inv, c)).collect();
                l = r + rho - l;
            } else {
                b = xb;
            }
            lambda = next;
        }
        (lambda, l)
    }
}

fn poly_mul(f: &GaloisField, a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = vec![0u32; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out[i + j] = f.add(out[i + j], f.mul(x, y));
        }
    }
    out
}

fn poly_sub(f: &GaloisField, a: &[u32], b: &[u32]) -> Vec<u32> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            f.sub(x, y)
        })
        .collect()
}

fn poly_trim(mut p: Vec<u32>) -> Vec<u32> {
    while p.len() > 1 && p.last() == Some(&0) {
        p.pop();
    }
    p
}

/// Evaluate an ascending-coefficient polynomial
fn poly_eval(f: &GaloisField, p: &[u32], x: u32) -> u32 {
    p.iter().rev().fold(0u32, |acc, &c| f.add(f.mul(acc, x), c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_field_tables() {
        let qr = qr_field();
        assert_eq!(qr.exp(8), 29);
        assert_eq!(qr.exp(255), 1);
        assert_eq!(qr.mul(qr.inv(0x53).unwrap(), 0x53), 1);
        let pdf = pdf417_field();
        assert_eq!(pdf.exp(1), 3);
        assert_eq!(pdf.exp(928), 1);
        assert_eq!(pdf.mul(pdf.inv(400).unwrap(), 400), 1);
        assert_eq!(pdf.sub(3, 5), 927);
        assert_eq!(pdf.from_int(930), 1);
        assert_eq!(qr.from_int(3), 1);
        assert!(qr.inv(0).is_none());
    }

    #[test]
    fn test_known_qr_block() {
        // "HELLO WORLD" 1-M data codewords and their published parity
        let data: Vec<u32> = vec![
            32, 91, 11, 120, 209, 114, 220, 77, 67, 64, 236, 17, 236, 17, 236, 17,
        ];
        let rs = ReedSolomon::qr(10);
        let encoded = rs.encode(&data);
        assert_eq!(
            &encoded[16..],
            &[196, 35, 39, 119, 235, 215, 231, 226, 93, 23]
        );
    }

    #[test]
    fn test_clean_block_has_full_confidence() {
        let rs = ReedSolomon::pdf417(8);
        let mut block = CodewordBlock::new(rs.encode(&[5, 453, 178, 121, 239]));
        let c = rs.decode(&mut block).unwrap();
        assert_eq!(c.errors, 0);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_erasures_only() {
        let rs = ReedSolomon::pdf417(8);
        let original = rs.encode(&[5, 453, 178, 121, 239]);
        let mut block = CodewordBlock::with_erasures(original.clone(), (0..8).collect());
        for i in 0..8 {
            block.codewords[i] = 0;
        }
        let c = rs.decode(&mut block).unwrap();
        assert_eq!(block.codewords, original);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_too_many_erasures() {
        let rs = ReedSolomon::qr(4);
        let mut block = CodewordBlock::with_erasures(rs.encode(&[1, 2, 3]), vec![0, 1, 2, 3, 4]);
        assert!(matches!(
            rs.decode(&mut block),
            Err(RsError::TooManyErasures { erasures: 5, parity: 4 })
        ));
    }

    #[test]
    fn test_single_error_confidence() {
        let rs = ReedSolomon::qr(10);
        let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let original = rs.encode(&data);
        let mut block = CodewordBlock::new(original.clone());
        block.codewords[3] ^= 0xAB;
        let c = rs.decode(&mut block).unwrap();
        assert_eq!(block.codewords, original);
        assert_eq!(c.errors, 1);
        assert!((c.confidence - 0.9).abs() < 1e-6);
    }

    fn corrupt(
        field: &GaloisField,
        codewords: &mut [u32],
        positions: &[usize],
        deltas: &[u32],
    ) -> Vec<usize> {
        let mut used = Vec::new();
        for (&p, &d) in positions.iter().zip(deltas) {
            let p = p % codewords.len();
            if used.contains(&p) {
                continue;
            }
            let d = 1 + d % (field.size() - 1);
            codewords[p] = field.add(codewords[p], d);
            used.push(p);
        }
        used
    }

    proptest! {
        #[test]
        fn prop_qr_corrects_half_parity(
            data in prop::collection::vec(0u32..256, 1..60),
            parity in 2usize..30,
            positions in prop::collection::vec(0usize..1000, 0..15),
            deltas in prop::collection::vec(0u32..1000, 15),
        ) {
            let rs = ReedSolomon::qr(parity);
            let original = rs.encode(&data);
            let mut block = CodewordBlock::new(original.clone());
            let limit = parity / 2;
            let take = positions.len().min(limit);
            corrupt(qr_field(), &mut block.codewords, &positions[..take], &deltas);
            prop_assert!(rs.decode(&mut block).is_ok());
            prop_assert_eq!(block.codewords, original);
        }

        #[test]
        fn prop_pdf417_corrects_errors_and_erasures(
            data in prop::collection::vec(0u32..929, 1..80),
            level in 0u32..6,
            positions in prop::collection::vec(0usize..1000, 0..40),
            deltas in prop::collection::vec(0u32..1000, 40),
            erase in 0usize..20,
        ) {
            let parity = 1usize << (level + 1);
            let rs = ReedSolomon::pdf417(parity);
            let original = rs.encode(&data);
            let mut block = CodewordBlock::new(original.clone());
            let erasures = erase.min(parity);
            let errors = (parity - erasures) / 2;
            let take = positions.len().min(errors + erasures);
            let used = corrupt(pdf417_field(), &mut block.codewords, &positions[..take], &deltas);
            block.erasures = used.iter().copied().take(erasures).collect();
            prop_assert!(rs.decode(&mut block).is_ok());
            prop_assert_eq!(block.codewords, original);
        }
    }
}
