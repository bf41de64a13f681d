use crate::models::BitMatrix;

/// Otsu's optimal threshold: pixels strictly below it are dark
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &pixel in gray {
        histogram[pixel as usize] += 1;
    }

    let total = gray.len() as f64;
    if total == 0.0 {
        return 128;
    }
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    // running dark-class weight and sum
    let mut weight_dark = 0.0f64;
    let mut sum_dark = 0.0f64;
    let mut max_variance = 0.0f64;
    let mut optimal = 128u8;
    for t in 1..=255usize {
        weight_dark += histogram[t - 1] as f64;
        sum_dark += (t - 1) as f64 * histogram[t - 1] as f64;
        let weight_light = total - weight_dark;
        if weight_dark == 0.0 || weight_light == 0.0 {
            continue;
        }
        let mean_dark = sum_dark / weight_dark;
        let mean_light = (sum_all - sum_dark) / weight_light;
        let variance =
            (weight_dark / total) * (weight_light / total) * (mean_dark - mean_light).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal = t as u8;
        }
    }
    optimal
}

/// Global threshold: pixels below `threshold` are dark
pub fn threshold_binarize(gray: &[u8], width: usize, height: usize, threshold: u8) -> BitMatrix {
    let mut binary = BitMatrix::new(width, height);
    for y in 0..height {
        let row = &gray[y * width..(y + 1) * width];
        for (x, &pixel) in row.iter().enumerate() {
            if pixel < threshold {
                binary.set(x, y, true);
            }
        }
    }
    binary
}
