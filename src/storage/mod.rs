//! Theme and animation containers.
//!
//! Both formats are read and written whole: decode takes the complete
//! byte stream and encode assembles every section in memory first.

pub mod animation;
pub mod theme;

pub use animation::{AnimationContainer, AnimationPlayer, DecodedFrame};
pub use theme::{OverlayElement, ThemeContainer, ThemeLayout};
