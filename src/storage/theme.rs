//! Theme export container (`.tr`).
//!
//! Byte-compatible with the files exported by the vendor's Windows tool.
//! All integers are little-endian, strings carry a 7-bit length prefix.
//!
//! ```text
//! [u8; 4]  magic DD DC DD DC
//! bool     show_system_info
//! i32      element count, then each element:
//!            i32 mode, mode_sub, x, y, main_count, sub_count
//!            str font_name; f32 font_size; u8 font_style, font_unit, font_charset
//!            u8 a, r, g, b; str text
//! bool     show_background, show_screenshot
//! i32      direction, ui_mode, mode
//! bool     hide_screenshot_bg; i32 x4 screenshot rect
//! bool     show_mask; i32 x2 mask center
//! [u8]     10240 bytes of 0xDC
//! i32      mask length (0 = none), mask bytes
//! i32      0 = static background (i32 length, bytes, 0 length = none)
//!          N > 0 = animation with N frames (timestamps, then length-prefixed JPEGs)
//! ```
//!
//! Files starting with `DC DC` come from an older exporter and decode to
//! [`ThemeContainer::legacy_default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrccError};
use crate::protocol::status::hex_spaced;
use crate::storage::animation::AnimationContainer;
use crate::utils::binary_cursor::{BinaryCursor, BinaryWriter};

pub const TR_MAGIC: [u8; 4] = [0xDD, 0xDC, 0xDD, 0xDC];
pub const TR_LEGACY_MAGIC: [u8; 2] = [0xDC, 0xDC];
const PADDING_BYTE: u8 = 0xDC;
const PADDING_LEN: usize = 10_240;

// =============================================================================
// Types
// =============================================================================

/// One overlay item. Order in [`ThemeContainer::elements`] is render order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayElement {
    pub mode: i32,
    pub mode_sub: i32,
    pub x: i32,
    pub y: i32,
    pub main_count: i32,
    pub sub_count: i32,
    pub font_name: String,
    pub font_size: f32,
    pub font_style: u8,
    pub font_unit: u8,
    pub font_charset: u8,
    /// A, R, G, B.
    pub color: [u8; 4],
    pub text: String,
}

impl Default for OverlayElement {
    fn default() -> Self {
        Self {
            mode: 0,
            mode_sub: 0,
            x: 0,
            y: 0,
            main_count: 0,
            sub_count: 0,
            font_name: "Microsoft YaHei".into(),
            font_size: 36.0,
            font_style: 0,
            font_unit: 3,
            font_charset: 134,
            color: [255, 255, 255, 255],
            text: String::new(),
        }
    }
}

/// Layout flags of a theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeLayout {
    pub show_system_info: bool,
    pub show_background: bool,
    pub show_screenshot: bool,
    /// Rotation in degrees.
    pub direction: i32,
    pub ui_mode: i32,
    pub mode: i32,
    pub hide_screenshot_bg: bool,
    /// x, y, width, height.
    pub screenshot_rect: [i32; 4],
    pub show_mask: bool,
    pub mask_center: [i32; 2],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemeContainer {
    pub layout: ThemeLayout,
    pub elements: Vec<OverlayElement>,
    /// Encoded image (PNG or JPEG).
    pub background: Option<Vec<u8>>,
    pub mask: Option<Vec<u8>>,
    pub animation: Option<AnimationContainer>,
}

impl ThemeContainer {
    /// What a `DC DC` file decodes to: system info on, background shown, no overlays.
    pub fn legacy_default() -> Self {
        Self {
            layout: ThemeLayout {
                show_system_info: true,
                show_background: true,
                ..ThemeLayout::default()
            },
            ..Self::default()
        }
    }

    pub fn has_background(&self) -> bool {
        self.background.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn has_mask(&self) -> bool {
        self.mask.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub fn has_animation(&self) -> bool {
        self.animation.as_ref().is_some_and(|a| !a.is_empty())
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Serialize the whole container.
    ///
    /// A theme carries either a static background or an animation, not both.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.has_background() && self.has_animation() {
            return Err(TrccError::Unsupported(
                "a theme cannot embed both a background image and an animation".into(),
            ));
        }

        let mut w = BinaryWriter::with_capacity(PADDING_LEN + 1024);
        w.write_bytes(&TR_MAGIC);
        w.write_bool(self.layout.show_system_info);

        w.write_i32(self.elements.len() as i32);
        for element in &self.elements {
            write_element(&mut w, element);
        }

        let l = &self.layout;
        w.write_bool(l.show_background);
        w.write_bool(l.show_screenshot);
        w.write_i32(l.direction);
        w.write_i32(l.ui_mode);
        w.write_i32(l.mode);
        w.write_bool(l.hide_screenshot_bg);
        for v in l.screenshot_rect {
            w.write_i32(v);
        }
        w.write_bool(l.show_mask);
        for v in l.mask_center {
            w.write_i32(v);
        }

        w.write_fill(PADDING_BYTE, PADDING_LEN);

        write_blob(&mut w, self.mask.as_deref());

        match &self.animation {
            Some(anim) if !anim.is_empty() => anim.encode_body(&mut w),
            _ => {
                w.write_i32(0);
                write_blob(&mut w, self.background.as_deref());
            }
        }
        Ok(w.into_inner())
    }

    // =========================================================================
    // Import
    // =========================================================================

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.starts_with(&TR_LEGACY_MAGIC) {
            tracing::warn!("Legacy DC DC theme container, using default layout");
            return Ok(Self::legacy_default());
        }
        if !data.starts_with(&TR_MAGIC) {
            return Err(TrccError::BadMagic {
                expected: hex_spaced(&TR_MAGIC),
                found: hex_spaced(&data[..data.len().min(4)]),
            });
        }

        let mut c = BinaryCursor::new(&data[TR_MAGIC.len()..]);
        let show_system_info = c.read_bool()?;

        let count = c.read_i32()?;
        let count = usize::try_from(count)
            .map_err(|_| TrccError::CorruptContainer(format!("negative element count {}", count)))?;
        // Smallest possible element is 37 bytes.
        if count.saturating_mul(37) > c.remaining() {
            return Err(TrccError::CorruptContainer(format!(
                "element count {} exceeds remaining {} bytes",
                count,
                c.remaining()
            )));
        }
        let elements = (0..count)
            .map(|_| read_element(&mut c))
            .collect::<Result<Vec<_>>>()?;

        let layout = ThemeLayout {
            show_system_info,
            show_background: c.read_bool()?,
            show_screenshot: c.read_bool()?,
            direction: c.read_i32()?,
            ui_mode: c.read_i32()?,
            mode: c.read_i32()?,
            hide_screenshot_bg: c.read_bool()?,
            screenshot_rect: [c.read_i32()?, c.read_i32()?, c.read_i32()?, c.read_i32()?],
            show_mask: c.read_bool()?,
            mask_center: [c.read_i32()?, c.read_i32()?],
        };

        c.skip(PADDING_LEN)?;

        let mask = read_blob(&mut c)?;

        let (background, animation) = match c.read_i32()? {
            0 => (read_blob(&mut c)?, None),
            n if n > 0 => {
                let anim = AnimationContainer::decode_frames_after_count(&mut c, n as usize)?;
                (None, Some(anim))
            }
            n => {
                return Err(TrccError::CorruptContainer(format!(
                    "negative background marker {}",
                    n
                )));
            }
        };

        Ok(Self {
            layout,
            elements,
            background,
            mask,
            animation,
        })
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::decode(&data)
    }

    /// Encode fully in memory, then write in one call.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn write_element(w: &mut BinaryWriter, e: &OverlayElement) {
    w.write_i32(e.mode);
    w.write_i32(e.mode_sub);
    w.write_i32(e.x);
    w.write_i32(e.y);
    w.write_i32(e.main_count);
    w.write_i32(e.sub_count);
    w.write_7bit_string(&e.font_name);
    w.write_f32(e.font_size);
    w.write_u8(e.font_style);
    w.write_u8(e.font_unit);
    w.write_u8(e.font_charset);
    w.write_bytes(&e.color);
    w.write_7bit_string(&e.text);
}

fn read_element(c: &mut BinaryCursor<'_>) -> Result<OverlayElement> {
    Ok(OverlayElement {
        mode: c.read_i32()?,
        mode_sub: c.read_i32()?,
        x: c.read_i32()?,
        y: c.read_i32()?,
        main_count: c.read_i32()?,
        sub_count: c.read_i32()?,
        font_name: c.read_7bit_string()?,
        font_size: c.read_f32()?,
        font_style: c.read_u8()?,
        font_unit: c.read_u8()?,
        font_charset: c.read_u8()?,
        color: [c.read_u8()?, c.read_u8()?, c.read_u8()?, c.read_u8()?],
        text: c.read_7bit_string()?,
    })
}

/// i32 length then bytes; zero length means absent.
fn write_blob(w: &mut BinaryWriter, blob: Option<&[u8]>) {
    let blob = blob.unwrap_or_default();
    w.write_i32(blob.len() as i32);
    w.write_bytes(blob);
}

fn read_blob(c: &mut BinaryCursor<'_>) -> Result<Option<Vec<u8>>> {
    let len = c.read_i32()?;
    match usize::try_from(len) {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(c.read_bytes(n)?.to_vec())),
        Err(_) => Err(TrccError::CorruptContainer(format!("negative blob length {}", len))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(mode: i32, text: &str) -> OverlayElement {
        OverlayElement {
            mode,
            x: 10 * mode,
            y: 20,
            text: text.into(),
            ..OverlayElement::default()
        }
    }

    #[test]
    fn test_empty_theme_size() {
        let bytes = ThemeContainer::default().encode().unwrap();
        // magic + flag + count + layout + padding + mask len + marker + bg len
        let layout = 2 + 3 * 4 + 1 + 4 * 4 + 1 + 2 * 4;
        assert_eq!(bytes.len(), 4 + 1 + 4 + layout + PADDING_LEN + 4 + 4 + 4);
        assert_eq!(&bytes[..4], &TR_MAGIC);
    }

    #[test]
    fn test_element_bytes() {
        let theme = ThemeContainer {
            elements: vec![element(1, "CPU")],
            ..ThemeContainer::default()
        };
        let bytes = theme.encode().unwrap();
        let e = &bytes[9..];
        assert_eq!(&e[0..4], &1i32.to_le_bytes());
        assert_eq!(&e[4 * 6..4 * 6 + 16], b"\x0fMicrosoft YaHei");
        let after_name = 24 + 16;
        assert_eq!(&e[after_name..after_name + 4], &36.0f32.to_le_bytes());
        assert_eq!(&e[after_name + 4..after_name + 7], &[0, 3, 134]);
        assert_eq!(&e[after_name + 7..after_name + 11], &[255, 255, 255, 255]);
        assert_eq!(&e[after_name + 11..after_name + 15], b"\x03CPU");
    }

    #[test]
    fn test_round_trip_with_images() {
        let theme = ThemeContainer {
            layout: ThemeLayout {
                direction: 90,
                show_background: true,
                screenshot_rect: [1, 2, 300, 400],
                mask_center: [160, 160],
                ..ThemeLayout::default()
            },
            elements: vec![element(1, "a"), element(2, &"x".repeat(300))],
            background: Some(vec![0x89, b'P', b'N', b'G']),
            mask: Some(vec![1, 2, 3]),
            animation: None,
        };
        let decoded = ThemeContainer::decode(&theme.encode().unwrap()).unwrap();
        assert_eq!(decoded, theme);
    }

    #[test]
    fn test_embedded_animation() {
        let anim = AnimationContainer::new(vec![0, 42], vec![vec![1; 5], vec![2; 7]]).unwrap();
        let theme = ThemeContainer {
            animation: Some(anim.clone()),
            ..ThemeContainer::default()
        };
        let decoded = ThemeContainer::decode(&theme.encode().unwrap()).unwrap();
        assert_eq!(decoded.animation, Some(anim));
        assert!(!decoded.has_background());
    }

    #[test]
    fn test_embedded_animation_keeps_one_timestamp_per_frame() {
        assert!(AnimationContainer::new(vec![0], vec![vec![1, 2, 3], vec![4, 5]]).is_err());

        let anim = AnimationContainer::new(vec![0, 40, 80], vec![vec![1; 3], vec![2; 2], vec![3]]).unwrap();
        let theme = ThemeContainer {
            animation: Some(anim),
            ..ThemeContainer::default()
        };
        let decoded = ThemeContainer::decode(&theme.encode().unwrap()).unwrap();
        let embedded = decoded.animation.unwrap();
        assert_eq!(embedded.timestamps(), &[0, 40, 80]);
        assert_eq!(embedded.frames().len(), 3);
    }

    #[test]
    fn test_background_and_animation_conflict() {
        let theme = ThemeContainer {
            background: Some(vec![1]),
            animation: Some(AnimationContainer::new(vec![0], vec![vec![1]]).unwrap()),
            ..ThemeContainer::default()
        };
        assert!(matches!(theme.encode(), Err(TrccError::Unsupported(_))));
    }

    #[test]
    fn test_legacy_and_bad_magic() {
        let legacy = ThemeContainer::decode(&[0xDC, 0xDC, 0x00]).unwrap();
        assert_eq!(legacy, ThemeContainer::legacy_default());

        let err = ThemeContainer::decode(&[0xDD, 0xDD, 0xDD, 0xDD]).unwrap_err();
        match err {
            TrccError::BadMagic { expected, found } => {
                assert_eq!(expected, "dd dc dd dc");
                assert_eq!(found, "dd dd dd dd");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_theme() {
        let bytes = ThemeContainer::default().encode().unwrap();
        let err = ThemeContainer::decode(&bytes[..100]).unwrap_err();
        assert!(err.is_corrupt_container());
    }
}
