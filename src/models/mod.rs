pub mod barcode;
pub mod bit_image;
pub mod matrix;
pub mod point;
pub mod symbol;

pub use barcode::{BarcodeType, BarcodeTypes, FoundBarcode, StructuredAppend};
pub use bit_image::BitImage;
pub use matrix::BitMatrix;
pub use point::{Point, PointI, Rect};
pub use symbol::{ECLevel, MaskPattern, SymbolMatrix, Version};
