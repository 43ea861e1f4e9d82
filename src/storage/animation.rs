//! Animation container (`Theme.zt`).
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! u8   magic 0xDC
//! i32  frame count N
//! N x  i32 timestamp (ms)
//! N x  (i32 length, JPEG bytes)
//! ```

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageOutputFormat};

use crate::error::{Result, TrccError};
use crate::utils::binary_cursor::{BinaryCursor, BinaryWriter};
use crate::utils::image_processing::{Rotation, prepare_rgb};

pub const ZT_MAGIC: u8 = 0xDC;
/// Delay used when a single frame leaves nothing to diff against (~24 fps).
pub const DEFAULT_FRAME_DELAY_MS: u32 = 42;
const JPEG_QUALITY: u8 = 90;

/// Timestamped JPEG frames.
///
/// Built only through [`AnimationContainer::new`], [`AnimationContainer::from_images`]
/// or a decoder, so there is always one timestamp per frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationContainer {
    timestamps: Vec<i32>,
    frames: Vec<Vec<u8>>,
}

/// One decoded frame, packed RGB888.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub delay_ms: u32,
}

impl AnimationContainer {
    pub fn new(timestamps: Vec<i32>, frames: Vec<Vec<u8>>) -> Result<Self> {
        if timestamps.len() != frames.len() {
            return Err(TrccError::InvalidInput(format!(
                "{} timestamps for {} frames",
                timestamps.len(),
                frames.len()
            )));
        }
        Ok(Self { timestamps, frames })
    }

    /// JPEG-encode images at a fixed frame interval.
    pub fn from_images(images: &[DynamicImage], interval_ms: u32) -> Result<Self> {
        let mut frames = Vec::with_capacity(images.len());
        for img in images {
            let mut buf = Vec::new();
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
            frames.push(buf);
        }
        let timestamps = (0..images.len())
            .map(|i| (i as u64 * interval_ms as u64).min(i32::MAX as u64) as i32)
            .collect();
        Ok(Self { timestamps, frames })
    }

    /// Frame timestamps in ms.
    pub fn timestamps(&self) -> &[i32] {
        &self.timestamps
    }

    /// JPEG payloads, one per timestamp.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn into_parts(self) -> (Vec<i32>, Vec<Vec<u8>>) {
        (self.timestamps, self.frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Per-frame delays from timestamp differences, at least 1 ms each.
    ///
    /// The last frame repeats the previous delay.
    pub fn delays(&self) -> Vec<u32> {
        let mut delays: Vec<u32> = Vec::with_capacity(self.timestamps.len());
        for i in 0..self.timestamps.len() {
            let delay = match self.timestamps.get(i + 1) {
                Some(&next) => i64::from(next) - i64::from(self.timestamps[i]),
                None => delays.last().map_or(i64::from(DEFAULT_FRAME_DELAY_MS), |&d| i64::from(d)),
            };
            delays.push(delay.clamp(1, i64::from(u32::MAX)) as u32);
        }
        delays
    }

    /// Total playback time of one loop.
    pub fn duration_ms(&self) -> u64 {
        self.delays().iter().map(|&d| u64::from(d)).sum()
    }

    // =========================================================================
    // Codec
    // =========================================================================

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BinaryWriter::with_capacity(
            5 + self.timestamps.len() * 8 + self.frames.iter().map(Vec::len).sum::<usize>(),
        );
        w.write_u8(ZT_MAGIC);
        self.encode_body(&mut w);
        w.into_inner()
    }

    /// Everything after the magic byte. Themes embed this form.
    pub(crate) fn encode_body(&self, w: &mut BinaryWriter) {
        debug_assert_eq!(self.timestamps.len(), self.frames.len());
        w.write_i32(self.frames.len() as i32);
        for &ts in &self.timestamps {
            w.write_i32(ts);
        }
        for frame in &self.frames {
            w.write_i32(frame.len() as i32);
            w.write_bytes(frame);
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = BinaryCursor::new(data);
        let magic = cursor.read_u8().map_err(|_| TrccError::BadMagic {
            expected: format!("{:02X}", ZT_MAGIC),
            found: "empty file".into(),
        })?;
        if magic != ZT_MAGIC {
            return Err(TrccError::BadMagic {
                expected: format!("{:02X}", ZT_MAGIC),
                found: format!("{:02X}", magic),
            });
        }
        Self::decode_body(&mut cursor)
    }

    /// Parse from the frame count onwards.
    pub(crate) fn decode_body(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        let count = cursor.read_i32()?;
        let count = usize::try_from(count)
            .map_err(|_| TrccError::CorruptContainer(format!("negative frame count {}", count)))?;
        Self::decode_frames_after_count(cursor, count)
    }

    pub(crate) fn decode_frames_after_count(cursor: &mut BinaryCursor<'_>, count: usize) -> Result<Self> {
        // Each frame needs at least 8 bytes (timestamp + length).
        if count.saturating_mul(8) > cursor.remaining() {
            return Err(TrccError::CorruptContainer(format!(
                "frame count {} exceeds remaining {} bytes",
                count,
                cursor.remaining()
            )));
        }

        let timestamps = (0..count)
            .map(|_| cursor.read_i32())
            .collect::<Result<Vec<_>>>()?;

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let len = cursor.read_i32()?;
            let len = usize::try_from(len).map_err(|_| {
                TrccError::CorruptContainer(format!("frame {} has negative length {}", index, len))
            })?;
            frames.push(cursor.read_bytes(len)?.to_vec());
        }
        Ok(Self { timestamps, frames })
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::decode(&data)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }

    // =========================================================================
    // Frame Decoding
    // =========================================================================

    /// Decode every JPEG to RGB, resized to `target` when given.
    pub fn decode_frames(&self, target: Option<(u32, u32)>) -> Result<Vec<DecodedFrame>> {
        let delays = self.delays();
        self.frames
            .iter()
            .zip(delays)
            .map(|(jpeg, delay_ms)| {
                let img = image::load_from_memory(jpeg)?;
                let (width, height) = target.unwrap_or((img.width(), img.height()));
                Ok(DecodedFrame {
                    rgb: prepare_rgb(&img, width, height, Rotation::None),
                    width,
                    height,
                    delay_ms,
                })
            })
            .collect()
    }
}

// =============================================================================
// Player
// =============================================================================

/// Playback cursor over decoded frames.
#[derive(Debug, Clone)]
pub struct AnimationPlayer {
    frames: Vec<DecodedFrame>,
    index: usize,
    playing: bool,
    looping: bool,
}

impl AnimationPlayer {
    /// A looping player, paused on the first frame.
    pub fn new(frames: Vec<DecodedFrame>) -> Self {
        Self {
            frames,
            index: 0,
            playing: false,
            looping: true,
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Start or resume. A finished animation restarts from the first frame.
    pub fn play(&mut self) {
        if self.index >= self.frames.len() {
            self.index = 0;
        }
        self.playing = !self.frames.is_empty();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&DecodedFrame> {
        self.frames.get(self.index)
    }

    /// Return the current frame and advance.
    ///
    /// `None` when paused, or once a non-looping animation has finished.
    pub fn next_frame(&mut self) -> Option<&DecodedFrame> {
        if !self.playing || self.index >= self.frames.len() {
            return None;
        }
        let current = self.index;
        self.index += 1;
        if self.index >= self.frames.len() {
            if self.looping {
                self.index = 0;
            } else {
                self.playing = false;
            }
        }
        self.frames.get(current)
    }

    /// Jump to a frame, clamped to the last one.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.frames.len().saturating_sub(1));
    }

    /// Position as a fraction in `[0, 1)`.
    pub fn progress(&self) -> f32 {
        if self.frames.is_empty() {
            0.0
        } else {
            self.index.min(self.frames.len() - 1) as f32 / self.frames.len() as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn container(timestamps: &[i32]) -> AnimationContainer {
        let frames = timestamps.iter().map(|&t| vec![t as u8; 3]).collect();
        AnimationContainer::new(timestamps.to_vec(), frames).unwrap()
    }

    #[test]
    fn test_delays() {
        assert_eq!(container(&[0, 42, 84, 126]).delays(), vec![42, 42, 42, 42]);
        assert_eq!(container(&[0, 100, 150]).delays(), vec![100, 50, 50]);
        assert_eq!(container(&[7]).delays(), vec![42]);
        assert_eq!(container(&[50, 50, 10]).delays(), vec![1, 1, 1]);
        assert!(container(&[]).delays().is_empty());
    }

    #[test]
    fn test_layout() {
        let zt = container(&[0, 40]);
        let bytes = zt.encode();
        assert_eq!(bytes[0], 0xDC);
        assert_eq!(&bytes[1..5], &2i32.to_le_bytes());
        assert_eq!(&bytes[9..13], &40i32.to_le_bytes());
        assert_eq!(&bytes[13..17], &3i32.to_le_bytes());
        assert_eq!(bytes.len(), 1 + 4 + 8 + 2 * (4 + 3));
        assert_eq!(AnimationContainer::decode(&bytes).unwrap(), zt);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = container(&[0]).encode();
        bytes[0] = 0xDD;
        let err = AnimationContainer::decode(&bytes).unwrap_err();
        assert!(err.is_corrupt_container());
        assert!(err.to_string().contains("DD"));
        assert!(AnimationContainer::decode(&[]).unwrap_err().is_corrupt_container());
    }

    #[test]
    fn test_truncated_and_inflated_counts() {
        let bytes = container(&[0, 42]).encode();
        let err = AnimationContainer::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, TrccError::OutOfData { .. }));

        let mut huge = vec![0xDC];
        huge.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            AnimationContainer::decode(&huge),
            Err(TrccError::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(AnimationContainer::new(vec![0, 1], vec![vec![]]).is_err());
        let err = AnimationContainer::new(vec![0], vec![vec![1, 2, 3], vec![4, 5]]).unwrap_err();
        assert!(matches!(err, TrccError::InvalidInput(_)));
    }

    #[test]
    fn test_encoded_count_matches_timestamps() {
        let zt = container(&[0, 42, 84]);
        let (timestamps, frames) = zt.clone().into_parts();
        assert_eq!(timestamps.len(), frames.len());

        let bytes = zt.encode();
        assert_eq!(&bytes[1..5], &3i32.to_le_bytes());
        let decoded = AnimationContainer::decode(&bytes).unwrap();
        assert_eq!(decoded.timestamps().len(), decoded.frames().len());
        assert_eq!(decoded, zt);
    }

    #[test]
    fn test_decode_frames_resizes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([200, 10, 10])));
        let zt = AnimationContainer::from_images(&[img.clone(), img], 50).unwrap();
        assert_eq!(zt.timestamps(), &[0, 50]);

        let frames = zt.decode_frames(Some((4, 4))).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].rgb.len(), 4 * 4 * 3);
        assert_eq!(frames[1].delay_ms, 50);

        let native = zt.decode_frames(None).unwrap();
        assert_eq!((native[0].width, native[0].height), (16, 8));
    }

    fn frame(delay_ms: u32) -> DecodedFrame {
        DecodedFrame {
            rgb: vec![],
            width: 1,
            height: 1,
            delay_ms,
        }
    }

    #[test]
    fn test_player_loops() {
        let mut player = AnimationPlayer::new(vec![frame(1), frame(2), frame(3)]);
        assert!(player.next_frame().is_none());

        player.play();
        let delays: Vec<u32> = (0..5).filter_map(|_| player.next_frame().map(|f| f.delay_ms)).collect();
        assert_eq!(delays, vec![1, 2, 3, 1, 2]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_player_stops_without_loop() {
        let mut player = AnimationPlayer::new(vec![frame(1), frame(2)]);
        player.set_looping(false);
        player.play();
        assert!(player.next_frame().is_some());
        assert!(player.next_frame().is_some());
        assert!(player.next_frame().is_none());
        assert!(!player.is_playing());
    }

    #[test]
    fn test_player_replays_after_finish() {
        let mut player = AnimationPlayer::new(vec![frame(1), frame(2)]);
        player.set_looping(false);
        player.play();
        while player.next_frame().is_some() {}
        assert!(!player.is_playing());
        assert!(player.progress() < 1.0);

        player.play();
        assert!(player.is_playing());
        assert_eq!(player.position(), 0);
        assert_eq!(player.next_frame().map(|f| f.delay_ms), Some(1));
        assert_eq!(player.next_frame().map(|f| f.delay_ms), Some(2));
        assert!(player.next_frame().is_none());
    }

    #[test]
    fn test_player_seek_and_progress() {
        let mut player = AnimationPlayer::new(vec![frame(1), frame(2), frame(3), frame(4)]);
        player.seek(2);
        assert_eq!(player.progress(), 0.5);
        player.seek(99);
        assert_eq!(player.position(), 3);
        player.pause();
        assert!(!player.is_playing());
    }
}
