//! Raster and geometry helpers.
//!
//! - Binarization (Otsu's method and fixed thresholds)
//! - Perspective transforms
//! - Run lengths and edge tracking

pub mod binarization;
pub mod geometry;
pub mod line;
