//! Thermalright TRCC Devices Library
//!
//! Rust drivers for Thermalright cooler LCDs and ARGB LED controllers.
//!
//! # Features
//!
//! - SCSI (via `sg_raw`), USB bulk and HID Type 2 / Type 3 LCD panels
//! - 64-byte HID LED controllers and 10-channel KVM LED controllers
//! - Device registry with cached, lazily opened drivers
//! - `.tr` theme and `.zt` animation container codecs
//!
//! # Example
//!
//! ```no_run
//! use trcc_rust_devices::{DeviceDescriptor, DeviceDriver, DeviceRegistry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = DeviceRegistry::system();
//!     let desc = DeviceDescriptor::from_known(0x0416, 0x5302, "").ok_or("unknown device")?;
//!
//!     let driver = registry.get_protocol(&desc)?;
//!     let mut driver = driver.lock().map_err(|_| "poisoned")?;
//!
//!     let info = driver.handshake()?;
//!     println!("{}", info);
//!
//!     if let Some((w, h)) = info.resolution() {
//!         let black = vec![0u8; (w * h * 2) as usize];
//!         driver.send_frame(&black, w, h)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use config::DriverConfig;
pub use device::{DeviceDescriptor, DeviceDriver, DeviceRegistry, ProtocolDriver};
pub use error::{Result, TrccError};
pub use protocol::{HandshakeResult, ProtocolKind};
pub use storage::{AnimationContainer, ThemeContainer};
