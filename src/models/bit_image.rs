//! Binarized raster owned by the scanner for the duration of one scan.

use super::{BitMatrix, Point, Rect};
use crate::error::ScanError;
use crate::utils::binarization::{otsu_threshold, threshold_binarize};

/// Black/white raster with an optional clip rectangle.
///
/// Pixels outside the image or outside the clip read as white, so every
/// accessor is total and callers never bounds-check.
#[derive(Debug, Clone)]
pub struct BitImage {
    bits: BitMatrix,
    threshold: u8,
    clip: Rect,
}

impl BitImage {
    /// Binarize 8-bit grayscale samples. `threshold` of `None` selects Otsu.
    pub fn from_gray(
        gray: &[u8],
        width: usize,
        height: usize,
        threshold: Option<u8>,
    ) -> Result<Self, ScanError> {
        if width == 0 || height == 0 {
            return Err(ScanError::invalid_image("zero-sized raster"));
        }
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| ScanError::invalid_image("raster dimensions overflow"))?;
        if gray.len() != expected {
            return Err(ScanError::invalid_image(format!(
                "expected {} samples for {}x{}, got {}",
                expected,
                width,
                height,
                gray.len()
            )));
        }
        let threshold = threshold.unwrap_or_else(|| otsu_threshold(gray));
        let bits = threshold_binarize(gray, width, height, threshold);
        Ok(Self {
            bits,
            threshold,
            clip: Rect::new(0, 0, width as i32, height as i32),
        })
    }

    /// Wrap an already binarized matrix (`true` = dark)
    pub fn from_bits(bits: BitMatrix) -> Self {
        let clip = Rect::new(0, 0, bits.width() as i32, bits.height() as i32);
        Self {
            bits,
            threshold: 128,
            clip,
        }
    }

    /// Binarize an `image` crate luma buffer
    pub fn from_luma(img: &image::GrayImage, threshold: Option<u8>) -> Result<Self, ScanError> {
        Self::from_gray(
            img.as_raw(),
            img.width() as usize,
            img.height() as usize,
            threshold,
        )
    }

    /// Restrict scanning to `clip`, which must overlap the image
    pub fn with_clip(mut self, clip: Rect) -> Result<Self, ScanError> {
        let full = Rect::new(0, 0, self.width() as i32, self.height() as i32);
        let clip = full.intersect(&clip);
        if clip.is_empty() {
            return Err(ScanError::invalid_image("clip rectangle lies outside the image"));
        }
        self.clip = clip;
        Ok(self)
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.bits.width()
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.bits.height()
    }

    /// Gray level separating dark from light
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Active scan rectangle
    pub fn clip(&self) -> Rect {
        self.clip
    }

    /// Underlying bits, ignoring the clip
    pub fn bits(&self) -> &BitMatrix {
        &self.bits
    }

    /// True if the pixel is dark and inside the clip
    #[inline]
    pub fn is_black(&self, x: i32, y: i32) -> bool {
        self.clip.contains(x, y) && self.bits.get(x as usize, y as usize)
    }

    /// Sample the pixel containing a sub-pixel point
    #[inline]
    pub fn sample(&self, p: Point) -> bool {
        self.is_black(p.x.floor() as i32, p.y.floor() as i32)
    }

    /// Fill `out` with row `y`, reusing its allocation
    pub fn row_into(&self, y: usize, out: &mut Vec<bool>) {
        out.clear();
        out.extend((0..self.width()).map(|x| self.is_black(x as i32, y as i32)));
    }

    /// Left-right mirror of the image and its clip
    pub fn mirrored(&self) -> BitImage {
        let w = self.width() as i32;
        BitImage {
            bits: self.bits.flip_horizontal(),
            threshold: self.threshold,
            clip: Rect {
                left: w - self.clip.right,
                top: self.clip.top,
                right: w - self.clip.left,
                bottom: self.clip.bottom,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gray_validates_length() {
        assert!(BitImage::from_gray(&[0u8; 5], 2, 2, None).is_err());
        assert!(BitImage::from_gray(&[], 0, 0, None).is_err());
        let img = BitImage::from_gray(&[0, 255, 255, 0], 2, 2, Some(128)).unwrap();
        assert!(img.is_black(0, 0));
        assert!(!img.is_black(1, 0));
        assert!(!img.is_black(5, 5));
    }

    #[test]
    fn test_clip_hides_pixels() {
        let mut bits = BitMatrix::new(4, 4);
        bits.set_region(0, 0, 4, 4);
        let img = BitImage::from_bits(bits).with_clip(Rect::new(1, 1, 2, 2)).unwrap();
        assert!(!img.is_black(0, 0));
        assert!(img.is_black(1, 1));
        let mut row = Vec::new();
        img.row_into(1, &mut row);
        assert_eq!(row, vec![false, true, true, false]);
        assert!(BitImage::from_bits(BitMatrix::new(4, 4))
            .with_clip(Rect::new(10, 10, 2, 2))
            .is_err());
    }

    #[test]
    fn test_from_luma() {
        let luma = image::GrayImage::from_raw(3, 1, vec![10, 200, 10]).expect("buffer");
        let img = BitImage::from_luma(&luma, None).expect("image");
        assert_eq!((img.width(), img.height()), (3, 1));
        assert!(img.is_black(0, 0));
        assert!(!img.is_black(1, 0));
        assert!(img.is_black(2, 0));
    }

    #[test]
    fn test_mirror() {
        let mut bits = BitMatrix::new(4, 1);
        bits.set(0, 0, true);
        let img = BitImage::from_bits(bits).mirrored();
        assert!(img.is_black(3, 0));
        assert!(!img.is_black(0, 0));
    }
}
