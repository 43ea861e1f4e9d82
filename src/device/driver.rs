//! Device-agnostic driver interface.
//!
//! Every protocol variant implements [`DeviceDriver`]; [`ProtocolDriver`]
//! is the closed set of variants the registry can hand out.

use crate::device::bulk_lcd::BulkDriver;
use crate::device::hid_lcd::HidLcdDriver;
use crate::device::kvm_led::KvmLedDriver;
use crate::device::led::LedDriver;
use crate::device::scsi::ScsiDriver;
use crate::error::Result;
use crate::protocol::{DriverState, HandshakeResult, ProtocolKind};

/// Deferred constructor for a transport handle. Called on first use.
pub type Opener<T> = Box<dyn FnMut() -> Result<Box<T>> + Send>;

/// Lazily opened transport handle.
pub struct Connection<T: ?Sized> {
    opener: Opener<T>,
    handle: Option<Box<T>>,
}

impl<T: ?Sized> Connection<T> {
    pub fn new(opener: Opener<T>) -> Self {
        Self {
            opener,
            handle: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the transport if needed and return it.
    pub fn get(&mut self) -> Result<&mut T> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => (self.opener)()?,
        };
        Ok(&mut **self.handle.insert(handle))
    }

    /// Drop the handle. `on_close` runs first so the transport can release resources.
    pub fn close_with(&mut self, on_close: impl FnOnce(&mut T)) {
        if let Some(mut handle) = self.handle.take() {
            on_close(&mut handle);
        }
    }
}

/// Operations shared by every protocol driver.
pub trait DeviceDriver {
    fn protocol(&self) -> ProtocolKind;

    fn state(&self) -> DriverState;

    /// Run the handshake.
    ///
    /// Transport failures are `Err`. A device that answers with an
    /// unrecognized payload yields `Ok` with `error` set, and the driver
    /// stays `Open` so the next call retries.
    fn handshake(&mut self) -> Result<HandshakeResult>;

    /// Send one frame. Handshakes first when not yet handshaken.
    fn send_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()>;

    /// Release the transport and return to `Closed`.
    fn close(&mut self);

    /// Last successful handshake, if any.
    fn handshake_info(&self) -> Option<&HandshakeResult>;
}

/// Closed set of driver variants, chosen once at creation.
pub enum ProtocolDriver {
    Scsi(ScsiDriver),
    HidLcd(HidLcdDriver),
    Bulk(BulkDriver),
    Led(LedDriver),
    KvmLed(KvmLedDriver),
}

impl ProtocolDriver {
    fn inner(&self) -> &dyn DeviceDriver {
        match self {
            ProtocolDriver::Scsi(d) => d,
            ProtocolDriver::HidLcd(d) => d,
            ProtocolDriver::Bulk(d) => d,
            ProtocolDriver::Led(d) => d,
            ProtocolDriver::KvmLed(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DeviceDriver {
        match self {
            ProtocolDriver::Scsi(d) => d,
            ProtocolDriver::HidLcd(d) => d,
            ProtocolDriver::Bulk(d) => d,
            ProtocolDriver::Led(d) => d,
            ProtocolDriver::KvmLed(d) => d,
        }
    }

    pub fn is_led(&self) -> bool {
        self.protocol().is_led()
    }

    pub fn as_led_mut(&mut self) -> Option<&mut LedDriver> {
        match self {
            ProtocolDriver::Led(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_kvm_led_mut(&mut self) -> Option<&mut KvmLedDriver> {
        match self {
            ProtocolDriver::KvmLed(d) => Some(d),
            _ => None,
        }
    }
}

impl DeviceDriver for ProtocolDriver {
    fn protocol(&self) -> ProtocolKind {
        self.inner().protocol()
    }

    fn state(&self) -> DriverState {
        self.inner().state()
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        self.inner_mut().handshake()
    }

    fn send_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        self.inner_mut().send_frame(pixels, width, height)
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }

    fn handshake_info(&self) -> Option<&HandshakeResult> {
        self.inner().handshake_info()
    }
}

impl std::fmt::Debug for ProtocolDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolDriver")
            .field("protocol", &self.protocol())
            .field("state", &self.state())
            .finish()
    }
}
