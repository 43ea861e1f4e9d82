//! HID-class LCD driver (Type 2 and Type 3).
//!
//! Despite enumerating as HID, these panels are driven through raw
//! endpoints 0x02/0x81. Type 2 frames are fire-and-forget with a short
//! inter-frame delay; Type 3 frames are fixed-size and acknowledged.

use crate::config::DriverConfig;
use crate::device::driver::{Connection, DeviceDriver, Opener};
use crate::device::transport::{Sleeper, Transport};
use crate::error::{Result, TrccError};
use crate::protocol::{
    DriverState, HandshakeResult, ProtocolKind, TYPE2_RESPONSE_SIZE, TYPE3_ACK_SIZE,
    TYPE3_RESPONSE_SIZE, build_type2_frame, build_type2_init, build_type3_frame,
    build_type3_init, parse_type2_response, parse_type3_response,
};

/// Which HID LCD protocol a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HidVariant {
    Type2,
    Type3,
}

impl HidVariant {
    /// From the descriptor's device-type tag (2 or 3).
    pub fn from_device_type(device_type: u8) -> Option<Self> {
        match device_type {
            2 => Some(HidVariant::Type2),
            3 => Some(HidVariant::Type3),
            _ => None,
        }
    }

    pub fn protocol(self) -> ProtocolKind {
        match self {
            HidVariant::Type2 => ProtocolKind::HidType2,
            HidVariant::Type3 => ProtocolKind::HidType3,
        }
    }
}

/// One handshake exchange plus how to read its answer.
pub(crate) struct HandshakeExchange<'a> {
    pub protocol: ProtocolKind,
    pub init: &'a [u8],
    pub response_size: usize,
    pub parse: &'a dyn Fn(&[u8]) -> HandshakeResult,
}

/// Init/response handshake with the configured retry policy.
///
/// Invalid payloads and transport failures are both retried. After the
/// last attempt a transport failure is returned as `Err`; an invalid
/// payload comes back as `Ok` with `error` set.
pub(crate) fn handshake_with_retries(
    conn: &mut Connection<dyn Transport>,
    sleeper: &dyn Sleeper,
    config: &DriverConfig,
    exchange: &HandshakeExchange<'_>,
) -> Result<HandshakeResult> {
    let attempts = config.hid_handshake_retries.max(1);
    let timeout = config.hid_handshake_timeout();
    let mut last_error: Option<TrccError> = None;
    let mut last_result: Option<HandshakeResult> = None;

    for attempt in 1..=attempts {
        let outcome = (|| -> Result<HandshakeResult> {
            let transport = conn.get()?;
            sleeper.sleep(config.hid_pre_init());
            transport.write(exchange.init, timeout)?;
            sleeper.sleep(config.hid_post_init());
            let resp = transport.read(exchange.response_size, timeout)?;
            Ok((exchange.parse)(&resp))
        })();

        match outcome {
            Ok(result) if result.is_ok() => {
                if attempt > 1 {
                    tracing::info!(
                        "{} handshake succeeded on attempt {}",
                        exchange.protocol,
                        attempt
                    );
                }
                return Ok(result);
            }
            Ok(result) => {
                tracing::warn!(
                    "{} handshake attempt {}/{}: {} (raw: {})",
                    exchange.protocol,
                    attempt,
                    attempts,
                    result.error.as_deref().unwrap_or("invalid response"),
                    result.raw_prefix_hex(16)
                );
                last_error = None;
                last_result = Some(result);
            }
            Err(e) => {
                tracing::warn!(
                    "{} handshake attempt {}/{} failed: {}",
                    exchange.protocol,
                    attempt,
                    attempts,
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            sleeper.sleep(config.hid_retry_delay());
        }
    }

    match (last_error, last_result) {
        (Some(e), _) => Err(e),
        (None, Some(result)) => Ok(result),
        (None, None) => Err(TrccError::HandshakeFailed(format!(
            "{} handshake made no attempts",
            exchange.protocol
        ))),
    }
}

/// Driver for a Type 2 or Type 3 HID LCD.
pub struct HidLcdDriver {
    variant: HidVariant,
    conn: Connection<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    config: DriverConfig,
    state: DriverState,
    info: Option<HandshakeResult>,
}

impl HidLcdDriver {
    pub fn new(
        variant: HidVariant,
        opener: Opener<dyn Transport>,
        sleeper: Box<dyn Sleeper>,
        config: DriverConfig,
    ) -> Self {
        Self {
            variant,
            conn: Connection::new(opener),
            sleeper,
            config,
            state: DriverState::Closed,
            info: None,
        }
    }

    pub fn variant(&self) -> HidVariant {
        self.variant
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let timeout = self.config.hid_frame_timeout();
        let transport = self.conn.get()?;
        match self.variant {
            HidVariant::Type2 => {
                let packet = build_type2_frame(pixels);
                let written = transport.write(&packet, timeout)?;
                if written == 0 {
                    return Err(TrccError::transport("Type 2 frame write accepted 0 bytes"));
                }
                self.sleeper.sleep(self.config.hid_type2_frame_delay());
            }
            HidVariant::Type3 => {
                let packet = build_type3_frame(pixels);
                let written = transport.write(&packet, timeout)?;
                if written == 0 {
                    return Err(TrccError::transport("Type 3 frame write accepted 0 bytes"));
                }
                let ack = transport.read(TYPE3_ACK_SIZE, timeout)?;
                if ack.is_empty() {
                    return Err(TrccError::transport("Type 3 frame not acknowledged"));
                }
            }
        }
        Ok(())
    }
}

impl DeviceDriver for HidLcdDriver {
    fn protocol(&self) -> ProtocolKind {
        self.variant.protocol()
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        let init = match self.variant {
            HidVariant::Type2 => build_type2_init(),
            HidVariant::Type3 => build_type3_init(),
        };
        let exchange = match self.variant {
            HidVariant::Type2 => HandshakeExchange {
                protocol: ProtocolKind::HidType2,
                init: &init,
                response_size: TYPE2_RESPONSE_SIZE,
                parse: &parse_type2_response,
            },
            HidVariant::Type3 => HandshakeExchange {
                protocol: ProtocolKind::HidType3,
                init: &init,
                response_size: TYPE3_RESPONSE_SIZE,
                parse: &parse_type3_response,
            },
        };

        let result = handshake_with_retries(&mut self.conn, &*self.sleeper, &self.config, &exchange);
        self.state = DriverState::Open;
        let result = result?;

        if result.is_ok() {
            tracing::info!(
                "{} handshake OK: resolution={} pm={} sub={}",
                self.variant.protocol(),
                result.geometry,
                result.model_id,
                result.sub_type
            );
            self.state = DriverState::Handshaken;
            self.info = Some(result.clone());
        }
        Ok(result)
    }

    fn send_frame(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        if matches!(self.state, DriverState::Closed | DriverState::Open) {
            let result = self.handshake()?;
            if let Some(reason) = result.error {
                return Err(TrccError::HandshakeFailed(reason));
            }
        }

        self.state = DriverState::Sending;
        match self.write_frame(pixels) {
            Ok(()) => {
                self.state = DriverState::Handshaken;
                Ok(())
            }
            Err(e) => {
                tracing::error!("{} send failed: {}", self.variant.protocol(), e);
                self.state = DriverState::Open;
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.conn.close_with(|t| t.close());
        self.state = DriverState::Closed;
        self.info = None;
    }

    fn handshake_info(&self) -> Option<&HandshakeResult> {
        self.info.as_ref()
    }
}
