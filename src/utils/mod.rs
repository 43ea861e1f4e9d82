pub mod binary_cursor;
pub mod color;
pub mod image_processing;
pub mod parsing;

// Re-export commonly used items
pub use binary_cursor::{BinaryCursor, BinaryWriter};
pub use color::ColorCache;
