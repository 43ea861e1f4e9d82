//! 10-channel KVM LED controller.
//!
//! Shares the LED init exchange; afterwards every command is a short
//! `DC DD` packet sent as one zero-padded 64-byte report.

use crate::config::DriverConfig;
use crate::device::driver::{Connection, DeviceDriver, Opener};
use crate::device::hid_lcd::{HandshakeExchange, handshake_with_retries};
use crate::device::transport::{Sleeper, Transport};
use crate::error::{Result, TrccError};
use crate::protocol::kvm::{
    KvmChannelState, KvmLedState, build_led, build_onoff, build_scene_save, build_state_query,
};
use crate::protocol::{
    DriverState, HandshakeResult, KVM_CHANNELS, LED_REPORT_SIZE, ProtocolKind, build_led_init,
    parse_led_response,
};

pub struct KvmLedDriver {
    conn: Connection<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    config: DriverConfig,
    led_state: KvmLedState,
    state: DriverState,
    info: Option<HandshakeResult>,
}

impl KvmLedDriver {
    pub fn new(opener: Opener<dyn Transport>, sleeper: Box<dyn Sleeper>, config: DriverConfig) -> Self {
        Self {
            conn: Connection::new(opener),
            sleeper,
            config,
            led_state: KvmLedState::default(),
            state: DriverState::Closed,
            info: None,
        }
    }

    pub fn led_state(&self) -> &KvmLedState {
        &self.led_state
    }

    pub fn set_channel(&mut self, channel: usize, state: KvmChannelState) -> Result<()> {
        let slot = self.led_state.channels.get_mut(channel).ok_or_else(|| {
            TrccError::InvalidInput(format!(
                "KVM channel {} out of range (0..{})",
                channel, KVM_CHANNELS
            ))
        })?;
        *slot = state;
        Ok(())
    }

    fn ensure_handshaken(&mut self) -> Result<()> {
        if matches!(self.state, DriverState::Closed | DriverState::Open) {
            let result = self.handshake()?;
            if let Some(reason) = result.error {
                return Err(TrccError::HandshakeFailed(reason));
            }
        }
        Ok(())
    }

    /// Send packets, each padded to one report.
    fn send_packets(&mut self, packets: &[Vec<u8>]) -> Result<()> {
        self.ensure_handshaken()?;
        self.state = DriverState::Sending;

        let timeout = self.config.hid_handshake_timeout();
        let outcome = (|| -> Result<()> {
            let transport = self.conn.get()?;
            for packet in packets {
                let mut report = packet.clone();
                report.resize(LED_REPORT_SIZE, 0);
                transport.write(&report, timeout)?;
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                self.sleeper.sleep(self.config.led_send_cooldown());
                self.state = DriverState::Handshaken;
                Ok(())
            }
            Err(e) => {
                tracing::error!("KVM LED send failed: {}", e);
                self.state = DriverState::Open;
                Err(e)
            }
        }
    }

    /// Push every channel's color and brightness.
    pub fn send_channels(&mut self) -> Result<()> {
        let packets: Vec<Vec<u8>> = (0..KVM_CHANNELS)
            .map(|ch| build_led(&self.led_state, ch as u8, self.led_state.channels[ch].mode))
            .collect();
        self.send_packets(&packets)
    }

    /// Push the on/off flags of all channels.
    pub fn send_onoff(&mut self, mode: u8) -> Result<()> {
        let packet = build_onoff(&self.led_state, mode);
        self.send_packets(&[packet])
    }

    /// Store the current state in a controller scene slot.
    pub fn save_scene(&mut self, scene: u8) -> Result<()> {
        let packet = build_scene_save(&self.led_state, scene);
        tracing::info!("Saving KVM LED scene {}", scene);
        self.send_packets(&[packet])
    }

    /// Ask the controller for its state and return the raw report.
    pub fn query_state(&mut self) -> Result<Vec<u8>> {
        self.send_packets(&[build_state_query()])?;
        let timeout = self.config.hid_handshake_timeout();
        self.conn.get()?.read(LED_REPORT_SIZE, timeout)
    }
}

impl DeviceDriver for KvmLedDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::KvmLed
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        let init = build_led_init();
        let parse = |resp: &[u8]| parse_led_response(ProtocolKind::KvmLed, resp);
        let exchange = HandshakeExchange {
            protocol: ProtocolKind::KvmLed,
            init: &init,
            response_size: LED_REPORT_SIZE,
            parse: &parse,
        };

        let result = handshake_with_retries(&mut self.conn, &*self.sleeper, &self.config, &exchange);
        self.state = DriverState::Open;
        let result = result?;

        if result.is_ok() {
            tracing::info!("KVM LED handshake OK (pm={})", result.model_id);
            self.state = DriverState::Handshaken;
            self.info = Some(result.clone());
        }
        Ok(result)
    }

    /// `pixels` is packed RGB, one triple per channel; extra triples are ignored.
    fn send_frame(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        for (channel, rgb) in self
            .led_state
            .channels
            .iter_mut()
            .zip(pixels.chunks_exact(3))
        {
            channel.color = [rgb[0], rgb[1], rgb[2]];
        }
        self.send_channels()
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
