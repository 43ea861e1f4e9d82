//! Device abstraction layer for Thermalright LCD and LED controllers.
//!
//! Transports (sg_raw, nusb, hidapi) sit behind the traits in
//! [`transport`]; protocol drivers own one lazily opened transport each,
//! and [`registry::DeviceRegistry`] routes descriptors to drivers.

pub mod bulk;
pub mod bulk_lcd;
pub mod driver;
pub mod hid;
pub mod hid_lcd;
pub mod kvm_led;
pub mod led;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod registry;
pub mod scsi;
pub mod sg_raw;
pub mod transport;

pub use bulk::{UsbEndpointTransport, is_usb_device_present};
pub use bulk_lcd::BulkDriver;
pub use driver::{DeviceDriver, ProtocolDriver};
pub use hid_lcd::{HidLcdDriver, HidVariant};
pub use kvm_led::KvmLedDriver;
pub use led::LedDriver;
pub use registry::{
    DeviceDescriptor, DeviceRegistry, Implementation, SharedDriver, SystemTransportProvider,
    TransportKind, TransportProvider,
};
pub use scsi::ScsiDriver;
pub use sg_raw::{SgRawPassthrough, is_sg_raw_available};
