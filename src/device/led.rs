//! ARGB LED controller driver (HID, 64-byte reports).
//!
//! The handshake PM byte picks the device style. Colors are given in
//! logical LED order; the driver remaps them to wire order, scales by
//! brightness and splits the packet into reports.

use crate::config::DriverConfig;
use crate::device::driver::{Connection, DeviceDriver, Opener};
use crate::device::hid_lcd::{HandshakeExchange, handshake_with_retries};
use crate::device::transport::{Sleeper, Transport};
use crate::error::{Result, TrccError};
use crate::protocol::led::{LedDeviceStyle, LedOutput, StyleLookup, build_led_packet, remap_led_colors};
use crate::protocol::{
    DriverState, HandshakeResult, LED_REPORT_SIZE, ProtocolKind, build_led_init,
    parse_led_response, split_reports,
};
use crate::utils::color::{ColorCache, TEMP_GRADIENT, color_for_value};

pub struct LedDriver {
    conn: Connection<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    config: DriverConfig,
    colors: ColorCache,
    output: LedOutput,
    state: DriverState,
    info: Option<HandshakeResult>,
}

impl LedDriver {
    pub fn new(
        opener: Opener<dyn Transport>,
        sleeper: Box<dyn Sleeper>,
        config: DriverConfig,
        colors: ColorCache,
    ) -> Self {
        Self {
            conn: Connection::new(opener),
            sleeper,
            config,
            colors,
            output: LedOutput::default(),
            state: DriverState::Closed,
            info: None,
        }
    }

    /// Style from the last handshake.
    pub fn style(&self) -> Option<&StyleLookup> {
        self.info.as_ref().and_then(|i| i.led_style.as_ref())
    }

    /// Layout used on the wire; unknown or not-yet-handshaken devices use the fallback.
    pub fn effective_style(&self) -> &'static LedDeviceStyle {
        self.style()
            .copied()
            .unwrap_or(StyleLookup::Unknown { pm: 0, sub: 0 })
            .effective_style()
    }

    pub fn led_count(&self) -> usize {
        self.effective_style().led_count
    }

    pub fn output(&self) -> &LedOutput {
        &self.output
    }

    pub fn set_output(&mut self, output: LedOutput) {
        self.output = output;
    }

    /// Brightness in percent, clamped to 100.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.output.brightness = brightness.min(100);
    }

    pub fn set_global_on(&mut self, on: bool) {
        self.output.global_on = on;
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

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        let timeout = self.config.hid_handshake_timeout();
        let transport = self.conn.get()?;
        for report in split_reports(packet, LED_REPORT_SIZE) {
            transport.write(&report, timeout)?;
        }
        self.sleeper.sleep(self.config.led_send_cooldown());
        Ok(())
    }

    /// Send one color per logical LED. Missing LEDs are black.
    pub fn send_colors(&mut self, colors: &[[u8; 3]]) -> Result<()> {
        self.ensure_handshaken()?;

        let style = self.effective_style();
        let mut logical = colors.to_vec();
        logical.resize(style.led_count, [0, 0, 0]);
        let wire = remap_led_colors(&logical, style.style_id);
        let packet = build_led_packet(&wire, &self.output);

        self.state = DriverState::Sending;
        match self.write_packet(&packet) {
            Ok(()) => {
                self.state = DriverState::Handshaken;
                Ok(())
            }
            Err(e) => {
                tracing::error!("LED send failed: {}", e);
                self.state = DriverState::Open;
                Err(e)
            }
        }
    }

    /// Fill every LED with one color.
    pub fn send_solid(&mut self, color: [u8; 3]) -> Result<()> {
        self.ensure_handshaken()?;
        let colors = vec![color; self.led_count()];
        self.send_colors(&colors)
    }

    /// One step of a rainbow animation, spread across the LEDs.
    pub fn send_rainbow(&mut self, phase: usize) -> Result<()> {
        self.ensure_handshaken()?;
        let count = self.led_count().max(1);
        let table = self.colors.rainbow_table();
        let step = table.len() / count;
        let colors: Vec<[u8; 3]> = (0..count)
            .map(|i| table[(phase + i * step) % table.len()])
            .collect();
        self.send_colors(&colors)
    }

    /// Color all LEDs from a sensor reading on the temperature gradient.
    pub fn send_temperature(&mut self, value: f32) -> Result<()> {
        self.send_solid(color_for_value(value, &TEMP_GRADIENT))
    }
}

impl DeviceDriver for LedDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Led
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        let init = build_led_init();
        let parse = |resp: &[u8]| parse_led_response(ProtocolKind::Led, resp);
        let exchange = HandshakeExchange {
            protocol: ProtocolKind::Led,
            init: &init,
            response_size: LED_REPORT_SIZE,
            parse: &parse,
        };

        let result = handshake_with_retries(&mut self.conn, &*self.sleeper, &self.config, &exchange);
        self.state = DriverState::Open;
        let result = result?;

        if let Some(style) = result.led_style.as_ref().filter(|_| result.is_ok()) {
            match style {
                StyleLookup::Known { .. } => tracing::info!("LED handshake OK: {}", style),
                StyleLookup::Unknown { .. } => tracing::warn!(
                    "LED handshake: {}, driving as style {}",
                    style,
                    style.effective_style().style_id
                ),
            }
            self.state = DriverState::Handshaken;
            self.info = Some(result.clone());
        }
        Ok(result)
    }

    /// `pixels` is packed RGB, one triple per logical LED.
    fn send_frame(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        let colors: Vec<[u8; 3]> = pixels
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        self.send_colors(&colors)
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
