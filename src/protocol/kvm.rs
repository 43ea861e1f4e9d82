//! KVM LED controller packets (10 channels, `DC DD` header).

use crate::protocol::commands::{
    KVM_CHANNELS, KVM_CMD_LED, KVM_CMD_ONOFF, KVM_CMD_SCENE_SAVE, KVM_CMD_STATE_QUERY,
    KVM_DEFAULT_ENABLES, KVM_HEADER,
};

/// Per-channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvmChannelState {
    pub on: bool,
    pub mode: u8,
    pub brightness: u8,
    pub color: [u8; 3],
}

impl Default for KvmChannelState {
    fn default() -> Self {
        Self {
            on: true,
            mode: 1,
            brightness: 100,
            color: [255, 0, 0],
        }
    }
}

/// Complete controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvmLedState {
    pub channels: [KvmChannelState; KVM_CHANNELS],
    pub channel_enables: [u8; KVM_CHANNELS],
}

impl Default for KvmLedState {
    fn default() -> Self {
        Self {
            channels: [KvmChannelState::default(); KVM_CHANNELS],
            channel_enables: KVM_DEFAULT_ENABLES,
        }
    }
}

fn header(cmd: u8, channel: u8, mode: u8, len: usize) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(len);
    pkt.extend_from_slice(&KVM_HEADER);
    pkt.extend_from_slice(&[cmd, channel, mode]);
    pkt
}

/// On/off for all channels: `[DC DD 00 00 mode onoff x10]`, 15 bytes.
pub fn build_onoff(state: &KvmLedState, mode: u8) -> Vec<u8> {
    let mut pkt = header(KVM_CMD_ONOFF, 0, mode, 15);
    pkt.extend(state.channels.iter().map(|ch| ch.on as u8));
    pkt
}

/// One channel's color: `[DC DD 10 ch mode bright speed R G B 0 0 0 enables x10]`, 23 bytes.
///
/// Out-of-range channels send the default channel state.
pub fn build_led(state: &KvmLedState, channel: u8, mode: u8) -> Vec<u8> {
    let ch = state
        .channels
        .get(channel as usize)
        .copied()
        .unwrap_or_default();
    let mut pkt = header(KVM_CMD_LED, channel, mode, 23);
    pkt.push(ch.brightness);
    pkt.push(1); // speed
    pkt.extend_from_slice(&ch.color);
    pkt.extend_from_slice(&[0, 0, 0]);
    pkt.extend_from_slice(&state.channel_enables);
    pkt
}

/// Persist all channels into a scene slot, 65 bytes.
pub fn build_scene_save(state: &KvmLedState, scene: u8) -> Vec<u8> {
    let mut pkt = header(KVM_CMD_SCENE_SAVE, scene, state.channels[0].mode, 65);
    pkt.extend(state.channels.iter().map(|ch| ch.on as u8));
    pkt.extend(state.channels.iter().map(|ch| ch.mode));
    pkt.extend(state.channels.iter().map(|ch| ch.brightness));
    for ch in &state.channels {
        pkt.extend_from_slice(&ch.color);
    }
    pkt
}

/// `[DC DD 01 00 00]`.
pub fn build_state_query() -> Vec<u8> {
    header(KVM_CMD_STATE_QUERY, 0, 0, 5)
}
