//! Symbol location shared by every symbology.
//!
//! - [`pattern`]: run-length template matching on scan lines
//! - [`region`]: promotion of line matches to located quadrilaterals
//! - [`finder`]: square finder patterns of matrix codes
//! - [`alignment`]: alignment patterns and their position grid
//! - [`grid`]: module-to-raster sampling grids

pub mod alignment;
pub mod finder;
pub mod grid;
pub mod pattern;
pub mod region;
