// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hardware FD abstraction (spec §4.1, §6.1).
//!
//! One file descriptor per B-channel plus one per D-channel; wraps the
//! ioctl verbs the underlying TDM driver exposes. Modeled as a trait so the
//! engine above it (`Port`, controllers, monitor) never issues a raw ioctl
//! itself and can run against [`testkit::FakeDevice`](crate::testkit::FakeDevice)
//! in tests.

pub mod law;
pub mod raw;

pub use law::Law;
pub use raw::RawChannel;

use crate::error::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOp {
    On,
    Off,
    Wink,
    Flash,
    Start,
    Ring,
    RingOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialOp {
    Replace,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    Immediate,
}

/// The timing/hook/law fields read and written by `GET_PARAMS`/`SET_PARAMS`
/// (spec §6.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelParams {
    pub prewink_ms: u32,
    pub preflash_ms: u32,
    pub wink_ms: u32,
    pub flash_ms: u32,
    pub start_ms: u32,
    pub rxwink_ms: u32,
    pub rxflash_ms: u32,
    pub debounce_ms: u32,
    pub channel_position: u32,
    pub span: u32,
}

/// One entry of the device's conference descriptor (spec §3 "Conference
/// descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfMode {
    #[default]
    None,
    RealPseudoMixer,
    Conference {
        talker: bool,
        listener: bool,
    },
    DigitalMonitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfDescriptor {
    pub mode: ConfMode,
    pub confno: u32,
    pub device_channel: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SpanStatus {
    pub alarms: u32,
    pub channels: u32,
    pub line_config: u32,
}

/// Hardware events returned by `GETEVENT` (spec §4.6's event table draws its
/// left column from this set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwEvent {
    RingOffhook,
    OnHook,
    WinkFlash,
    PolarityReversal,
    DialComplete,
    Alarm,
    NoAlarm,
    DtmfDown(char),
    DtmfUp(char),
    PulseDigit(char),
    RingBegin,
    RingerOn,
    RingerOff,
    None,
}

pub enum EchoCancelRequest {
    Enable { taps: u32, params: Vec<(String, i64)> },
    Disable,
}

/// The public contract a per-channel hardware handle exposes (spec §4.1).
///
/// Every method may block; failure semantics follow spec §4.1: an
/// `EINPROGRESS`-equivalent is surfaced as `Error::HardwareTransient` (the
/// caller should treat it as success for hook paths), a bad-parameter
/// outcome as an error the caller logs and skips, and a gone-device outcome
/// as `Error::HardwareFatal`.
pub trait HardwareChannel: Send {
    fn specify(&mut self, channel: u32) -> Result<()>;
    fn get_params(&self) -> Result<ChannelParams>;
    fn set_params(&mut self, params: ChannelParams) -> Result<()>;
    fn set_blocksize(&mut self, bytes: usize) -> Result<()>;
    fn set_buffer_policy(&mut self, tx: BufferPolicy, rx: BufferPolicy, nbufs: u32) -> Result<()>;
    fn set_linear(&mut self, on: bool) -> Result<()>;
    fn set_law(&mut self, law: Law) -> Result<()>;
    fn set_gains(&mut self, rx: [u8; 256], tx: [u8; 256]) -> Result<()>;
    fn hook(&mut self, op: HookOp) -> Result<()>;
    fn dial(&mut self, op: DialOp, digits: &str) -> Result<()>;
    fn tone(&mut self, index: Option<u32>) -> Result<()>;
    fn tone_detect(&mut self, on: bool, mute: bool) -> Result<()>;
    fn ring_cadence(&mut self, pattern: &[u32]) -> Result<()>;
    fn audio_mode(&mut self, on: bool) -> Result<()>;
    fn echo_cancel(&mut self, req: EchoCancelRequest) -> Result<()>;
    fn echo_train(&mut self, ms: u32) -> Result<()>;
    fn conf_mute(&mut self, on: bool) -> Result<()>;
    fn conf_get(&self) -> Result<ConfDescriptor>;
    fn conf_set(&mut self, desc: ConfDescriptor) -> Result<()>;
    fn get_event(&mut self) -> Result<HwEvent>;
    fn span_stat(&self, span: u32) -> Result<SpanStatus>;
    fn loopback(&mut self, on: bool) -> Result<()>;
    fn on_hook_transfer(&mut self, ms: u32) -> Result<()>;
    fn vmwi(&mut self, count: u32) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn raw_fd(&self) -> i32;
}

/// Result of an `iomux_wait` poll (spec §4.1 `IOMUX`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PollReady {
    pub read: bool,
    pub sig_event: bool,
}

/// Wait for read/sigevent readiness across a set of hardware FDs, bounded by
/// `timeout`. Backed by `mio` the way `hdds`'s TCP `io_thread` multiplexes
/// connections with a `mio::Poll`, rather than hand-rolled `libc::poll`.
pub fn iomux_wait(fds: &[i32], timeout: Duration) -> Result<Vec<PollReady>> {
    use mio::unix::SourceFd;
    use mio::{Events, Interest, Poll, Token};

    let mut poll = Poll::new()
        .map_err(|e| Error::HardwareFatal { channel: 0, reason: e.to_string() })?;
    for (i, fd) in fds.iter().enumerate() {
        let mut source = SourceFd(fd);
        poll.registry()
            .register(&mut source, Token(i), Interest::READABLE | Interest::PRIORITY)
            .map_err(|e| Error::HardwareFatal { channel: *fd as u32, reason: e.to_string() })?;
    }
    let mut events = Events::with_capacity(fds.len().max(1));
    poll.poll(&mut events, Some(timeout))
        .map_err(|e| Error::HardwareFatal { channel: 0, reason: e.to_string() })?;

    let mut ready = vec![PollReady::default(); fds.len()];
    for ev in events.iter() {
        let idx = ev.token().0;
        if idx < ready.len() {
            ready[idx].read = ev.is_readable();
            ready[idx].sig_event = ev.is_priority();
        }
    }
    Ok(ready)
}
