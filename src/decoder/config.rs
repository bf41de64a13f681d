//! Process-wide tuning knobs, read once from the environment.

use std::sync::OnceLock;

fn parse_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

static RECOVERY_MAX_ITERATIONS: OnceLock<usize> = OnceLock::new();

/// Candidate combinations examined per recovery search
pub(crate) fn recovery_max_iterations() -> usize {
    *RECOVERY_MAX_ITERATIONS
        .get_or_init(|| parse_env_usize("BARCODE_RECOVERY_MAX_ITERATIONS", 64).clamp(1, 4096))
}

static RECOVERY_MAX_ERROR: OnceLock<f32> = OnceLock::new();

/// Largest summed rounding error a recovered width vector may carry
pub(crate) fn recovery_max_error() -> f32 {
    *RECOVERY_MAX_ERROR
        .get_or_init(|| parse_env_f32("BARCODE_RECOVERY_MAX_ERROR", 2.5).clamp(0.5, 8.0))
}

static RECOVERY_CACHE_SLOTS: OnceLock<usize> = OnceLock::new();

/// Slots in each worker's recovery cache (rounded up to a power of two)
pub(crate) fn recovery_cache_slots() -> usize {
    *RECOVERY_CACHE_SLOTS.get_or_init(|| {
        parse_env_usize("BARCODE_RECOVERY_CACHE_SLOTS", 1024)
            .clamp(16, 1 << 16)
            .next_power_of_two()
    })
}

static PDF417_ROW_SAMPLES: OnceLock<usize> = OnceLock::new();

/// Scan lines kept per PDF417 row for majority voting
pub(crate) fn pdf417_row_samples() -> usize {
    *PDF417_ROW_SAMPLES.get_or_init(|| parse_env_usize("BARCODE_PDF417_ROW_SAMPLES", 5).clamp(1, 15))
}

static QR_ALIGNMENT_RADIUS: OnceLock<usize> = OnceLock::new();

/// Search radius, in modules, around a predicted alignment pattern
pub(crate) fn qr_alignment_radius() -> usize {
    *QR_ALIGNMENT_RADIUS.get_or_init(|| parse_env_usize("BARCODE_QR_ALIGNMENT_RADIUS", 3).clamp(1, 8))
}

static LINE_BAND_RADIUS: OnceLock<usize> = OnceLock::new();

/// Parallel lines on each side voted into every pixel of a linear scan line
pub(crate) fn line_band_radius() -> usize {
    *LINE_BAND_RADIUS.get_or_init(|| parse_env_usize("BARCODE_LINE_BAND_RADIUS", 2).clamp(0, 4))
}

static MAX_REGIONS_PER_PASS: OnceLock<usize> = OnceLock::new();

/// Upper bound on candidate regions decoded per symbology pass
pub(crate) fn max_regions_per_pass() -> usize {
    *MAX_REGIONS_PER_PASS
        .get_or_init(|| parse_env_usize("BARCODE_MAX_REGIONS_PER_PASS", 64).clamp(1, 1024))
}
