// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! An in-memory [`HardwareChannel`] used by tests in place of a real
//! device node.

use crate::error::Result;
use crate::hw::{
    BufferPolicy, ChannelParams, ConfDescriptor, DialOp, EchoCancelRequest, HardwareChannel,
    HookOp, HwEvent, Law, SpanStatus,
};
use std::collections::VecDeque;

pub struct FakeDevice {
    pub params: ChannelParams,
    pub law: Law,
    pub linear: bool,
    pub conf: ConfDescriptor,
    pub events: VecDeque<HwEvent>,
    pub hook_log: Vec<HookOp>,
    pub dial_log: Vec<(DialOp, String)>,
    pub written: Vec<u8>,
    pub to_read: VecDeque<u8>,
    pub loopback: bool,
    pub echo_enabled: bool,
    pub audio_mode: bool,
    pub rx_gain_table: [u8; 256],
    pub tx_gain_table: [u8; 256],
    pub ioctl_count: u32,
}

impl FakeDevice {
    pub fn new() -> Self {
        FakeDevice {
            params: ChannelParams::default(),
            law: Law::Mu,
            linear: false,
            conf: ConfDescriptor::default(),
            events: VecDeque::new(),
            hook_log: Vec::new(),
            dial_log: Vec::new(),
            written: Vec::new(),
            to_read: VecDeque::new(),
            loopback: false,
            echo_enabled: false,
            audio_mode: false,
            rx_gain_table: Law::Mu.identity_table(),
            tx_gain_table: Law::Mu.identity_table(),
            ioctl_count: 0,
        }
    }

    pub fn push_event(&mut self, ev: HwEvent) {
        self.events.push_back(ev);
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareChannel for FakeDevice {
    fn specify(&mut self, channel: u32) -> Result<()> {
        self.params.channel_position = channel;
        Ok(())
    }

    fn get_params(&self) -> Result<ChannelParams> {
        Ok(self.params)
    }

    fn set_params(&mut self, params: ChannelParams) -> Result<()> {
        self.params = params;
        Ok(())
    }

    fn set_blocksize(&mut self, _bytes: usize) -> Result<()> {
        Ok(())
    }

    fn set_buffer_policy(&mut self, _tx: BufferPolicy, _rx: BufferPolicy, _nbufs: u32) -> Result<()> {
        Ok(())
    }

    fn set_linear(&mut self, on: bool) -> Result<()> {
        self.linear = on;
        Ok(())
    }

    fn set_law(&mut self, law: Law) -> Result<()> {
        self.law = law;
        Ok(())
    }

    fn set_gains(&mut self, rx: [u8; 256], tx: [u8; 256]) -> Result<()> {
        self.ioctl_count += 1;
        self.rx_gain_table = rx;
        self.tx_gain_table = tx;
        Ok(())
    }

    fn hook(&mut self, op: HookOp) -> Result<()> {
        self.hook_log.push(op);
        Ok(())
    }

    fn dial(&mut self, op: DialOp, digits: &str) -> Result<()> {
        self.dial_log.push((op, digits.to_string()));
        Ok(())
    }

    fn tone(&mut self, _index: Option<u32>) -> Result<()> {
        Ok(())
    }

    fn tone_detect(&mut self, _on: bool, _mute: bool) -> Result<()> {
        Ok(())
    }

    fn ring_cadence(&mut self, _pattern: &[u32]) -> Result<()> {
        Ok(())
    }

    fn audio_mode(&mut self, on: bool) -> Result<()> {
        self.audio_mode = on;
        Ok(())
    }

    fn echo_cancel(&mut self, req: EchoCancelRequest) -> Result<()> {
        self.echo_enabled = matches!(req, EchoCancelRequest::Enable { .. });
        Ok(())
    }

    fn echo_train(&mut self, _ms: u32) -> Result<()> {
        Ok(())
    }

    fn conf_mute(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }

    fn conf_get(&self) -> Result<ConfDescriptor> {
        Ok(self.conf)
    }

    fn conf_set(&mut self, desc: ConfDescriptor) -> Result<()> {
        self.ioctl_count += 1;
        self.conf = desc;
        Ok(())
    }

    fn get_event(&mut self) -> Result<HwEvent> {
        Ok(self.events.pop_front().unwrap_or(HwEvent::None))
    }

    fn span_stat(&self, _span: u32) -> Result<SpanStatus> {
        Ok(SpanStatus { alarms: 0, channels: 1, line_config: 0 })
    }

    fn loopback(&mut self, on: bool) -> Result<()> {
        self.loopback = on;
        Ok(())
    }

    fn on_hook_transfer(&mut self, _ms: u32) -> Result<()> {
        Ok(())
    }

    fn vmwi(&mut self, _count: u32) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.to_read.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn raw_fd(&self) -> i32 {
        -1
    }
}
