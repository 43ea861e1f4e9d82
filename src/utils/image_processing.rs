//! Frame preparation for the LCD panels.
//!
//! Converts truecolor images into the RGB565 byte stream the panels expect,
//! picks the byte order per transport and resolution, and splits encoded
//! frames into transport-sized chunks.

use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;

use crate::error::Result;
use crate::protocol::ProtocolKind;

/// Bytes per encoded RGB565 pixel.
pub const BYTES_PER_PIXEL: usize = 2;

/// Byte order of each 16-bit RGB565 pixel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelByteOrder {
    BigEndian,
    LittleEndian,
}

/// Display rotation applied before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a direction in degrees (0/90/180/270) to a rotation.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            _ => Rotation::None,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => img,
            Rotation::Deg90 => img.rotate90(),
            Rotation::Deg180 => img.rotate180(),
            Rotation::Deg270 => img.rotate270(),
        }
    }
}

/// Truncate an 8-bit RGB triple to 5-6-5.
pub fn rgb_to_565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Byte order the panel firmware expects.
///
/// SCSI panels at 320x320 take big-endian pixels; every other resolution
/// and every other transport takes little-endian. This is a firmware quirk
/// and must stay asymmetric.
pub fn byte_order_for(protocol: ProtocolKind, width: u32, height: u32) -> PixelByteOrder {
    if protocol == ProtocolKind::Scsi && width == 320 && height == 320 {
        PixelByteOrder::BigEndian
    } else {
        PixelByteOrder::LittleEndian
    }
}

/// Encode packed RGB888 bytes into RGB565 with the given byte order.
///
/// A trailing partial pixel is ignored.
pub fn encode_rgb565(rgb: &[u8], order: PixelByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * BYTES_PER_PIXEL);
    for px in rgb.chunks_exact(3) {
        let value = rgb_to_565(px[0], px[1], px[2]);
        match order {
            PixelByteOrder::BigEndian => out.extend_from_slice(&value.to_be_bytes()),
            PixelByteOrder::LittleEndian => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
    out
}

/// Split `total_bytes` into `(offset, length)` pieces of at most `chunk_size`.
///
/// The final piece carries the remainder. Zero-sized input yields no pieces.
pub fn chunk_frame(total_bytes: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (0..total_bytes)
        .step_by(chunk_size)
        .map(|offset| (offset, chunk_size.min(total_bytes - offset)))
        .collect()
}

/// Encoded frame size for a resolution.
pub fn frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Rotate, resize to the panel and return packed RGB888.
pub fn prepare_rgb(img: &DynamicImage, width: u32, height: u32, rotation: Rotation) -> Vec<u8> {
    let rotated = rotation.apply(img.clone());
    let resized = if rotated.width() == width && rotated.height() == height {
        rotated
    } else {
        rotated.resize_exact(width, height, FilterType::Triangle)
    };
    resized.to_rgb8().into_raw()
}

/// Prepare an image as an RGB565 frame for the given panel.
pub fn prepare_frame(
    img: &DynamicImage,
    protocol: ProtocolKind,
    width: u32,
    height: u32,
    rotation: Rotation,
) -> Vec<u8> {
    let rgb = prepare_rgb(img, width, height, rotation);
    encode_rgb565(&rgb, byte_order_for(protocol, width, height))
}

/// Load an image file and prepare it as an RGB565 frame.
pub fn load_frame(
    path: &Path,
    protocol: ProtocolKind,
    width: u32,
    height: u32,
    rotation: Rotation,
) -> Result<Vec<u8>> {
    let img = image::open(path)?;
    Ok(prepare_frame(&img, protocol, width, height, rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_rgb_to_565() {
        assert_eq!(rgb_to_565(255, 255, 255), 0xFFFF);
        assert_eq!(rgb_to_565(255, 0, 0), 0xF800);
        assert_eq!(rgb_to_565(0, 255, 0), 0x07E0);
        assert_eq!(rgb_to_565(0, 0, 255), 0x001F);
        assert_eq!(rgb_to_565(7, 3, 7), 0);
    }

    #[test]
    fn test_byte_order_quirk() {
        assert_eq!(
            byte_order_for(ProtocolKind::Scsi, 320, 320),
            PixelByteOrder::BigEndian
        );
        assert_eq!(
            byte_order_for(ProtocolKind::Scsi, 480, 480),
            PixelByteOrder::LittleEndian
        );
        assert_eq!(
            byte_order_for(ProtocolKind::Bulk, 320, 320),
            PixelByteOrder::LittleEndian
        );
        assert_eq!(
            byte_order_for(ProtocolKind::HidType2, 320, 320),
            PixelByteOrder::LittleEndian
        );
    }

    #[test]
    fn test_encode_byte_orders() {
        let red = [255u8, 0, 0];
        assert_eq!(encode_rgb565(&red, PixelByteOrder::BigEndian), vec![0xF8, 0x00]);
        assert_eq!(encode_rgb565(&red, PixelByteOrder::LittleEndian), vec![0x00, 0xF8]);
    }

    #[test]
    fn test_chunk_320() {
        let chunks = chunk_frame(frame_size(320, 320), 0x10000);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().map(|c| c.1).sum::<usize>(), 204_800);
        assert!(chunks.iter().all(|c| c.1 <= 65_536));
        assert_eq!(chunks[3], (0x30000, 204_800 - 0x30000));
    }

    #[test]
    fn test_chunk_480() {
        let chunks = chunk_frame(frame_size(480, 480), 0x10000);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks.iter().map(|c| c.1).sum::<usize>(), 460_800);
    }

    #[test]
    fn test_chunk_edge_cases() {
        assert!(chunk_frame(0, 512).is_empty());
        assert_eq!(chunk_frame(1024, 512), vec![(0, 512), (512, 512)]);
    }

    #[test]
    fn test_prepare_frame_resizes_and_rotates() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let dynamic = DynamicImage::ImageRgb8(img);

        let rgb = prepare_rgb(&dynamic, 2, 4, Rotation::Deg90);
        assert_eq!(rgb.len(), 2 * 4 * 3);
        // Top-left moves to top-right after a 90 degree turn.
        assert_eq!(&rgb[3..6], &[255, 0, 0]);

        let frame = prepare_frame(&dynamic, ProtocolKind::Scsi, 320, 320, Rotation::None);
        assert_eq!(frame.len(), 204_800);
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(45), Rotation::None);
    }
}
