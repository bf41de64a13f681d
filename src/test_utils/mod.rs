//! Synthetic symbol fixtures for tests and benchmarks.
//!
//! These builders lay out module matrices for every supported symbology so
//! the decoders can be exercised without image files. They are not a
//! barcode generation feature.

pub mod canvas;
pub mod code39;
pub mod databar;
pub mod pdf417;
pub mod qr;
