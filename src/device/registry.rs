//! Device descriptors, protocol routing and the per-device driver cache.
//!
//! `create_protocol` only picks and constructs a driver; no I/O happens
//! until its first `handshake`/`send_frame`. `get_protocol` keeps one
//! shared driver per device so concurrent callers serialize on its mutex.

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DriverConfig;
use crate::device::bulk::UsbEndpointTransport;
use crate::device::bulk_lcd::BulkDriver;
use crate::device::driver::{DeviceDriver, Opener, ProtocolDriver};
use crate::device::hid::HidReportTransport;
use crate::device::hid_lcd::{HidLcdDriver, HidVariant};
use crate::device::kvm_led::KvmLedDriver;
use crate::device::led::LedDriver;
use crate::device::scsi::ScsiDriver;
use crate::device::sg_raw::SgRawPassthrough;
use crate::device::transport::{ScsiPassthrough, Sleeper, ThreadSleeper, Transport};
use crate::error::{Result, TrccError};
use crate::protocol::*;
use crate::utils::color::ColorCache;

// =============================================================================
// Descriptors
// =============================================================================

/// How the device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// SCSI-generic node, e.g. `/dev/sg1`.
    Scsi,
    UsbBulk,
    UsbHid,
}

/// What sits behind the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementation {
    Lcd,
    HidLed,
    KvmLed,
}

/// Static entry in the known-device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vid: u16,
    pub pid: u16,
    pub vendor: &'static str,
    pub product: &'static str,
    pub transport: TransportKind,
    /// 1 = SCSI, 2 = HID Type 2, 3 = HID Type 3.
    pub device_type: u8,
    pub implementation: Implementation,
}

const fn known(
    vid: u16,
    pid: u16,
    vendor: &'static str,
    product: &'static str,
    transport: TransportKind,
    device_type: u8,
    implementation: Implementation,
) -> KnownDevice {
    KnownDevice {
        vid,
        pid,
        vendor,
        product,
        transport,
        device_type,
        implementation,
    }
}

use Implementation::{HidLed, Lcd};
use TransportKind::{Scsi, UsbHid};

pub const KNOWN_DEVICES: [KnownDevice; 9] = [
    known(SCSI_VID_87CD, SCSI_PID_70DB, "Thermalright", "LCD Display (USBLCD)", Scsi, 1, Lcd),
    known(SCSI_VID_0416, SCSI_PID_5406, "Winbond", "LCD Display (USBLCD)", Scsi, 1, Lcd),
    known(SCSI_VID_0402, SCSI_PID_3922, "ALi Corp", "FROZEN WARFRAME", Scsi, 1, Lcd),
    known(HID_TYPE2_VID, HID_TYPE2_PID_5302, "Winbond", "USBDISPLAY (HID)", UsbHid, 2, Lcd),
    known(HID_TYPE2_VID, HID_TYPE2_PID_530A, "Winbond", "LCD Display (HID H)", UsbHid, 2, Lcd),
    known(HID_TYPE3_ALT_VID, HID_TYPE3_ALT_PID, "Winbond", "LCD Display (HID ALi)", UsbHid, 3, Lcd),
    known(HID_TYPE3_VID, HID_TYPE3_PID_5303, "ALi Corp", "LCD Display (HID)", UsbHid, 3, Lcd),
    known(HID_TYPE3_VID, HID_TYPE3_PID_5304, "ALi Corp", "LCD Display (HID)", UsbHid, 3, Lcd),
    known(LED_VID, LED_PID, "Winbond", "ARGB LED Controller", UsbHid, 1, HidLed),
];

pub fn find_known(vid: u16, pid: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES.iter().find(|d| d.vid == vid && d.pid == pid)
}

/// A discovered device, as handed to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vid: u16,
    pub pid: u16,
    pub transport: TransportKind,
    /// SCSI node or platform HID path; may be empty for USB devices.
    pub path: String,
    pub device_type: u8,
    pub implementation: Implementation,
    /// Resolution known from discovery, used when the device does not report one.
    pub resolution: Option<(u32, u32)>,
}

impl DeviceDescriptor {
    pub fn new(vid: u16, pid: u16, transport: TransportKind, path: impl Into<String>) -> Self {
        Self {
            vid,
            pid,
            transport,
            path: path.into(),
            device_type: 1,
            implementation: Implementation::Lcd,
            resolution: None,
        }
    }

    /// Descriptor for a device in the known table.
    pub fn from_known(vid: u16, pid: u16, path: impl Into<String>) -> Option<Self> {
        find_known(vid, pid).map(|k| Self {
            device_type: k.device_type,
            implementation: k.implementation,
            ..Self::new(vid, pid, k.transport, path)
        })
    }

    pub fn with_device_type(mut self, device_type: u8) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn with_resolution(mut self, resolution: (u32, u32)) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn is_led(&self) -> bool {
        matches!(self.implementation, Implementation::HidLed | Implementation::KvmLed)
    }

    /// Cache key: `vid_pid_path`.
    pub fn cache_key(&self) -> String {
        format!("{:04x}_{:04x}_{}", self.vid, self.pid, self.path)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x} ({:?}", self.vid, self.pid, self.transport)?;
        if !self.path.is_empty() {
            write!(f, " {}", self.path)?;
        }
        write!(f, ")")
    }
}

// =============================================================================
// Transport Provider
// =============================================================================

/// Builds transport openers for a descriptor. Openers run lazily.
pub trait TransportProvider: Send + Sync {
    fn scsi(&self, desc: &DeviceDescriptor) -> Opener<dyn ScsiPassthrough>;

    fn usb(&self, desc: &DeviceDescriptor) -> Opener<dyn Transport>;

    fn hid(&self, desc: &DeviceDescriptor, report_size: usize) -> Opener<dyn Transport>;

    fn sleeper(&self) -> Box<dyn Sleeper>;
}

/// Real hardware: `sg_raw`, nusb and hidapi.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTransportProvider;

impl TransportProvider for SystemTransportProvider {
    fn scsi(&self, desc: &DeviceDescriptor) -> Opener<dyn ScsiPassthrough> {
        let path = desc.path.clone();
        Box::new(move || Ok(Box::new(SgRawPassthrough::new(path.clone())) as Box<dyn ScsiPassthrough>))
    }

    fn usb(&self, desc: &DeviceDescriptor) -> Opener<dyn Transport> {
        let (vid, pid) = (desc.vid, desc.pid);
        Box::new(move || Ok(Box::new(UsbEndpointTransport::open(vid, pid)?) as Box<dyn Transport>))
    }

    fn hid(&self, desc: &DeviceDescriptor, report_size: usize) -> Opener<dyn Transport> {
        let (vid, pid, path) = (desc.vid, desc.pid, desc.path.clone());
        Box::new(move || {
            let transport = if path.is_empty() {
                HidReportTransport::open(vid, pid, report_size)?
            } else {
                let c_path = CString::new(path.as_str()).map_err(|_| {
                    TrccError::InvalidInput(format!("HID path contains NUL: {:?}", path))
                })?;
                HidReportTransport::open_path(&c_path, report_size)?
            };
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
    }

    fn sleeper(&self) -> Box<dyn Sleeper> {
        Box::new(ThreadSleeper)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Driver shared between callers of the same device.
pub type SharedDriver = Arc<Mutex<ProtocolDriver>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct DeviceRegistry {
    provider: Arc<dyn TransportProvider>,
    config: DriverConfig,
    colors: ColorCache,
    drivers: Mutex<HashMap<String, SharedDriver>>,
}

impl DeviceRegistry {
    pub fn new(provider: Arc<dyn TransportProvider>, config: DriverConfig) -> Self {
        Self {
            provider,
            config,
            colors: ColorCache::new(),
            drivers: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over real hardware with config from the default location.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTransportProvider), DriverConfig::load_or_default())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn color_cache(&self) -> &ColorCache {
        &self.colors
    }

    /// Build an uncached driver for `desc`. Performs no I/O.
    pub fn create_protocol(&self, desc: &DeviceDescriptor) -> Result<ProtocolDriver> {
        let config = self.config.clone();
        let p = &self.provider;

        let driver = match (desc.transport, desc.implementation) {
            (TransportKind::Scsi, Implementation::Lcd) => {
                if desc.path.is_empty() {
                    return Err(TrccError::DeviceNotFound(format!(
                        "SCSI device {} has no device path",
                        desc
                    )));
                }
                let fallback = desc.resolution.or(Some((320, 320)));
                ProtocolDriver::Scsi(
                    ScsiDriver::new(desc.path.clone(), p.scsi(desc), p.sleeper(), config)
                        .with_fallback_resolution(fallback),
                )
            }
            (TransportKind::UsbBulk, Implementation::Lcd) => {
                ProtocolDriver::Bulk(BulkDriver::new(p.usb(desc), config))
            }
            (TransportKind::UsbHid, Implementation::HidLed) => ProtocolDriver::Led(LedDriver::new(
                p.hid(desc, LED_REPORT_SIZE),
                p.sleeper(),
                config,
                self.colors.clone(),
            )),
            (TransportKind::UsbHid, Implementation::KvmLed) => ProtocolDriver::KvmLed(
                KvmLedDriver::new(p.hid(desc, LED_REPORT_SIZE), p.sleeper(), config),
            ),
            (TransportKind::UsbHid, Implementation::Lcd) => {
                let variant = HidVariant::from_device_type(desc.device_type).ok_or_else(|| {
                    TrccError::DeviceNotFound(format!(
                        "unsupported HID device type {} for {}",
                        desc.device_type, desc
                    ))
                })?;
                ProtocolDriver::HidLcd(HidLcdDriver::new(variant, p.usb(desc), p.sleeper(), config))
            }
            (transport, implementation) => {
                return Err(TrccError::DeviceNotFound(format!(
                    "no protocol for {:?} over {:?} ({})",
                    implementation, transport, desc
                )));
            }
        };

        tracing::debug!("Created {} driver for {}", driver.protocol(), desc);
        Ok(driver)
    }

    /// Cached driver for `desc`, created on first request.
    pub fn get_protocol(&self, desc: &DeviceDescriptor) -> Result<SharedDriver> {
        let key = desc.cache_key();
        let mut drivers = lock(&self.drivers);
        if let Some(driver) = drivers.get(&key) {
            return Ok(Arc::clone(driver));
        }
        let driver = Arc::new(Mutex::new(self.create_protocol(desc)?));
        drivers.insert(key, Arc::clone(&driver));
        Ok(driver)
    }

    /// Close and forget the cached driver. Returns whether one existed.
    pub fn remove_protocol(&self, desc: &DeviceDescriptor) -> bool {
        let removed = lock(&self.drivers).remove(&desc.cache_key());
        match removed {
            Some(driver) => {
                lock(&driver).close();
                tracing::info!("Closed and evicted driver for {}", desc);
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let drivers: Vec<SharedDriver> = lock(&self.drivers).drain().map(|(_, d)| d).collect();
        for driver in &drivers {
            lock(driver).close();
        }
        if !drivers.is_empty() {
            tracing::info!("Closed {} cached driver(s)", drivers.len());
        }
    }

    pub fn cached_count(&self) -> usize {
        lock(&self.drivers).len()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockTransportProvider;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(MockTransportProvider::new()), DriverConfig::default())
    }

    #[test]
    fn test_known_table_lookup() {
        let desc = DeviceDescriptor::from_known(0x0418, 0x5304, "").unwrap();
        assert_eq!(desc.transport, TransportKind::UsbHid);
        assert_eq!(desc.device_type, 3);

        let led = DeviceDescriptor::from_known(LED_VID, LED_PID, "1-2:1.0").unwrap();
        assert!(led.is_led());
        assert!(DeviceDescriptor::from_known(0x1234, 0x5678, "").is_none());
    }

    #[test]
    fn test_routing() {
        let reg = registry();
        let cases = [
            (DeviceDescriptor::from_known(0x87CD, 0x70DB, "/dev/sg1").unwrap(), ProtocolKind::Scsi),
            (DeviceDescriptor::from_known(0x0416, 0x5302, "").unwrap(), ProtocolKind::HidType2),
            (DeviceDescriptor::from_known(0x0416, 0x53E6, "").unwrap(), ProtocolKind::HidType3),
            (DeviceDescriptor::from_known(LED_VID, LED_PID, "").unwrap(), ProtocolKind::Led),
            (
                DeviceDescriptor::new(0x87AD, 0x70DB, TransportKind::UsbBulk, ""),
                ProtocolKind::Bulk,
            ),
            (
                DeviceDescriptor::new(0x0416, 0x8001, TransportKind::UsbHid, "")
                    .with_implementation(Implementation::KvmLed),
                ProtocolKind::KvmLed,
            ),
        ];
        for (desc, expected) in cases {
            let driver = reg.create_protocol(&desc).unwrap();
            assert_eq!(driver.protocol(), expected, "{}", desc);
            assert_eq!(driver.state(), DriverState::Closed);
        }
    }

    #[test]
    fn test_unroutable_descriptors() {
        let reg = registry();
        let bad_type = DeviceDescriptor::new(0x0416, 0x5302, TransportKind::UsbHid, "").with_device_type(7);
        assert!(matches!(reg.create_protocol(&bad_type), Err(TrccError::DeviceNotFound(_))));

        let no_path = DeviceDescriptor::new(0x87CD, 0x70DB, TransportKind::Scsi, "");
        assert!(reg.create_protocol(&no_path).is_err());

        let led_over_scsi = DeviceDescriptor::new(0x87CD, 0x70DB, TransportKind::Scsi, "/dev/sg0")
            .with_implementation(Implementation::HidLed);
        assert!(reg.create_protocol(&led_over_scsi).is_err());
    }

    #[test]
    fn test_cache_per_path() {
        let reg = registry();
        let a = DeviceDescriptor::from_known(0x87CD, 0x70DB, "/dev/sg1").unwrap();
        let b = DeviceDescriptor::from_known(0x87CD, 0x70DB, "/dev/sg2").unwrap();

        let first = reg.get_protocol(&a).unwrap();
        let again = reg.get_protocol(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        reg.get_protocol(&b).unwrap();
        assert_eq!(reg.cached_count(), 2);

        assert!(reg.remove_protocol(&a));
        assert!(!reg.remove_protocol(&a));
        assert_eq!(reg.cached_count(), 1);

        reg.close_all();
        assert_eq!(reg.cached_count(), 0);
    }

    #[test]
    fn test_cache_key_format() {
        let desc = DeviceDescriptor::from_known(0x0416, 0x5406, "/dev/sg3").unwrap();
        assert_eq!(desc.cache_key(), "0416_5406_/dev/sg3");
    }
}
