//! Driver timing configuration.
//!
//! Every delay, timeout and retry count used by the protocol drivers lives
//! here so it can be tuned from a JSON file without recompiling.
//! Cross-platform: uses the appropriate config directory for each OS.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TrccError};

// =============================================================================
// Config Path
// =============================================================================

const APP_NAME: &str = "trcc-rust";
const CONFIG_FILE: &str = "drivers.json";

// =============================================================================
// Driver Configuration
// =============================================================================

/// Protocol timings shared by all drivers.
///
/// Defaults reproduce the timings observed from the vendor Windows driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Wait between SCSI polls while the boot signature is reported.
    pub scsi_boot_wait_ms: u64,
    /// Maximum number of SCSI polls before init is forced.
    pub scsi_boot_max_retries: u32,
    /// Settle delay after SCSI init, before the first frame.
    pub scsi_post_init_ms: u64,
    /// Timeout for one sg_raw invocation.
    pub scsi_command_timeout_ms: u64,

    /// Delay before the HID init packet is written.
    pub hid_pre_init_ms: u64,
    /// Delay between the HID init write and the response read.
    pub hid_post_init_ms: u64,
    /// Timeout for handshake writes and reads.
    pub hid_handshake_timeout_ms: u64,
    /// Handshake attempts before giving up.
    pub hid_handshake_retries: u32,
    /// Delay between failed handshake attempts.
    pub hid_retry_delay_ms: u64,
    /// Timeout for frame writes and ACK reads.
    pub hid_frame_timeout_ms: u64,
    /// Delay after each Type 2 frame.
    pub hid_type2_frame_delay_ms: u64,

    /// Timeout for bulk handshake I/O.
    pub bulk_handshake_timeout_ms: u64,
    /// Timeout for bulk frame writes.
    pub bulk_write_timeout_ms: u64,

    /// Cooldown after a complete LED packet.
    pub led_send_cooldown_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scsi_boot_wait_ms: 3000,
            scsi_boot_max_retries: 5,
            scsi_post_init_ms: 100,
            scsi_command_timeout_ms: 10_000,
            hid_pre_init_ms: 50,
            hid_post_init_ms: 200,
            hid_handshake_timeout_ms: 5000,
            hid_handshake_retries: 3,
            hid_retry_delay_ms: 500,
            hid_frame_timeout_ms: 100,
            hid_type2_frame_delay_ms: 1,
            bulk_handshake_timeout_ms: 1000,
            bulk_write_timeout_ms: 1000,
            led_send_cooldown_ms: 30,
        }
    }
}

impl DriverConfig {
    /// Get the default config file path.
    /// - Linux: ~/.config/trcc-rust/drivers.json
    /// - Windows: %APPDATA%\trcc-rust\drivers.json
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME).join(CONFIG_FILE))
            .ok_or_else(|| TrccError::InvalidInput("Could not find config directory".into()))
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a configuration from JSON text. Missing fields take defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| TrccError::InvalidInput(format!("Invalid driver config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path, falling back to defaults if the file is absent.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Ok(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring driver config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Write this configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrccError::InvalidInput(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.hid_handshake_retries == 0 {
            return Err(TrccError::InvalidInput(
                "hid_handshake_retries must be at least 1".into(),
            ));
        }
        if self.scsi_boot_max_retries == 0 {
            return Err(TrccError::InvalidInput(
                "scsi_boot_max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn scsi_boot_wait(&self) -> Duration {
        Duration::from_millis(self.scsi_boot_wait_ms)
    }

    pub fn scsi_post_init(&self) -> Duration {
        Duration::from_millis(self.scsi_post_init_ms)
    }

    pub fn scsi_command_timeout(&self) -> Duration {
        Duration::from_millis(self.scsi_command_timeout_ms)
    }

    pub fn hid_pre_init(&self) -> Duration {
        Duration::from_millis(self.hid_pre_init_ms)
    }

    pub fn hid_post_init(&self) -> Duration {
        Duration::from_millis(self.hid_post_init_ms)
    }

    pub fn hid_handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.hid_handshake_timeout_ms)
    }

    pub fn hid_retry_delay(&self) -> Duration {
        Duration::from_millis(self.hid_retry_delay_ms)
    }

    pub fn hid_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.hid_frame_timeout_ms)
    }

    pub fn hid_type2_frame_delay(&self) -> Duration {
        Duration::from_millis(self.hid_type2_frame_delay_ms)
    }

    pub fn bulk_handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_handshake_timeout_ms)
    }

    pub fn bulk_write_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_write_timeout_ms)
    }

    pub fn led_send_cooldown(&self) -> Duration {
        Duration::from_millis(self.led_send_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware_timings() {
        let config = DriverConfig::default();
        assert_eq!(config.scsi_boot_wait(), Duration::from_secs(3));
        assert!(config.scsi_boot_max_retries >= 3);
        assert!(config.scsi_post_init() < Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = DriverConfig::from_json(r#"{ "scsi_boot_wait_ms": 1500 }"#).unwrap();
        assert_eq!(config.scsi_boot_wait_ms, 1500);
        assert_eq!(config.hid_handshake_retries, 3);
    }

    #[test]
    fn test_zero_retries_rejected() {
        assert!(DriverConfig::from_json(r#"{ "hid_handshake_retries": 0 }"#).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("trcc-config-test-{}", std::process::id()));
        let path = dir.join("drivers.json");
        let mut config = DriverConfig::default();
        config.led_send_cooldown_ms = 45;
        config.save(&path).unwrap();

        let loaded = DriverConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
