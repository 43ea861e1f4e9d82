//! Theme (.tr) and animation (.zt) files on disk.

use std::path::PathBuf;

use image::{DynamicImage, Rgb, RgbImage};
use trcc_rust_devices::storage::{
    AnimationContainer, AnimationPlayer, OverlayElement, ThemeContainer, ThemeLayout,
};
use trcc_rust_devices::TrccError;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("trcc-{}-{}", std::process::id(), name))
}

fn solid(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb(color)))
}

#[test]
fn test_theme_file_round_trip() {
    let theme = ThemeContainer {
        layout: ThemeLayout {
            show_system_info: true,
            show_background: true,
            direction: 90,
            ..ThemeLayout::default()
        },
        elements: vec![
            OverlayElement {
                mode: 1,
                x: 12,
                y: 40,
                text: "CPU".into(),
                ..OverlayElement::default()
            },
            OverlayElement {
                mode: 2,
                mode_sub: 1,
                x: 160,
                y: 40,
                font_name: "Arial".into(),
                font_size: 24.5,
                color: [255, 0, 200, 255],
                ..OverlayElement::default()
            },
        ],
        background: Some(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]),
        mask: None,
        animation: None,
    };

    let path = temp_path("round-trip.tr");
    theme.write_file(&path).unwrap();
    let loaded = ThemeContainer::read_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.elements.len(), 2);
    assert_eq!(loaded.elements[1].font_name, "Arial");
    assert_eq!(loaded.layout.direction, 90);
    assert!(loaded.has_background());
    assert!(!loaded.has_mask());
    assert_eq!(loaded, theme);
}

#[test]
fn test_empty_theme_end_to_end() {
    let theme = ThemeContainer {
        layout: ThemeLayout {
            show_system_info: false,
            show_background: true,
            direction: 0,
            ..ThemeLayout::default()
        },
        ..ThemeContainer::default()
    };

    let path = temp_path("empty.tr");
    theme.write_file(&path).unwrap();
    let loaded = ThemeContainer::read_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(!loaded.layout.show_system_info);
    assert!(loaded.layout.show_background);
    assert_eq!(loaded.layout.direction, 0);
    assert!(loaded.elements.is_empty());
    assert!(!loaded.has_background());
    assert!(!loaded.has_animation());
    assert_eq!(loaded, theme);
}

#[test]
fn test_theme_layout_serializes_to_json() {
    let layout = ThemeLayout {
        direction: 180,
        screenshot_rect: [0, 0, 320, 320],
        ..ThemeLayout::default()
    };
    let json = serde_json::to_string(&layout).unwrap();
    assert!(json.contains("\"direction\":180"));
    let back: ThemeLayout = serde_json::from_str(&json).unwrap();
    assert_eq!(back, layout);
}

#[test]
fn test_animation_file_and_playback() {
    let images = [solid([255, 0, 0]), solid([0, 255, 0]), solid([0, 0, 255]), solid([9, 9, 9])];
    let anim = AnimationContainer::from_images(&images, 42).unwrap();
    assert_eq!(anim.delays(), vec![42, 42, 42, 42]);
    assert_eq!(anim.duration_ms(), 168);

    let path = temp_path("anim.zt");
    anim.write_file(&path).unwrap();
    let loaded = AnimationContainer::read_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, anim);

    let frames = loaded.decode_frames(Some((4, 2))).unwrap();
    let mut player = AnimationPlayer::new(frames);
    player.set_looping(false);
    player.play();

    let mut shown = 0;
    while let Some(frame) = player.next_frame() {
        assert_eq!(frame.rgb.len(), 4 * 2 * 3);
        assert_eq!(frame.delay_ms, 42);
        shown += 1;
    }
    assert_eq!(shown, 4);
}

#[test]
fn test_animation_bad_magic_file() {
    let path = temp_path("bad.zt");
    std::fs::write(&path, [0xDD, 1, 0, 0, 0]).unwrap();
    let err = AnimationContainer::read_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();

    assert!(matches!(err, TrccError::BadMagic { .. }));
    assert!(err.is_corrupt_container());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = ThemeContainer::read_file(&temp_path("does-not-exist.tr")).unwrap_err();
    assert!(matches!(err, TrccError::Io(_)));
}
