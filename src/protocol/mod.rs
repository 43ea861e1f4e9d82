//! Wire protocols for Thermalright LCD and LED controllers.
//!
//! This module contains the command constants, packet builders, device
//! tables, and handshake response parsing. No I/O happens here.

pub mod commands;
pub mod kvm;
pub mod led;
pub mod status;

pub use commands::*;
pub use status::*;
