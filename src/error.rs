//! Custom error types for Thermalright LCD/LED devices.
//!
//! This module provides fine-grained error handling for device communication,
//! protocol parsing, and container decoding.

use thiserror::Error;

/// Main error type for device and container operations.
#[derive(Error, Debug)]
pub enum TrccError {
    /// I/O failure talking to the physical device.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Timeout waiting for the device.
    #[error("Timeout waiting for device response")]
    Timeout,

    /// HID communication error.
    #[error("HID communication error: {0}")]
    HidError(#[from] hidapi::HidError),

    /// OS-level I/O error (nusb, sg_raw subprocess, container files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device answered the handshake with an unrecognized payload.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// No driver can be created for the descriptor.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Container bytes do not start with a recognized magic.
    #[error("Corrupt container: expected magic {expected}, found {found}")]
    BadMagic { expected: String, found: String },

    /// Container is truncated or internally inconsistent.
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// Read past the end of a buffer.
    #[error("Out of data: needed {needed} bytes, {remaining} remaining")]
    OutOfData { needed: usize, remaining: usize },

    /// Image decode/encode failure.
    #[error("Image error: {0}")]
    Image(String),

    /// Operation not available for this driver variant.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic invalid input error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TrccError {
    /// Shorthand for a transport failure with a formatted message.
    pub fn transport(message: impl Into<String>) -> Self {
        TrccError::Transport {
            message: message.into(),
        }
    }

    /// Whether re-running the handshake may clear this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrccError::Transport { .. }
                | TrccError::Timeout
                | TrccError::HidError(_)
                | TrccError::Io(_)
        )
    }

    /// Whether this error came from decoding a container file.
    pub fn is_corrupt_container(&self) -> bool {
        matches!(
            self,
            TrccError::BadMagic { .. } | TrccError::CorruptContainer(_) | TrccError::OutOfData { .. }
        )
    }
}

impl From<image::ImageError> for TrccError {
    fn from(err: image::ImageError) -> Self {
        TrccError::Image(err.to_string())
    }
}

/// Result type alias for device and container operations.
pub type Result<T> = std::result::Result<T, TrccError>;
