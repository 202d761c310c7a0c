// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linux raw-fd [`HardwareChannel`] backed by the TDM driver's character
//! device (`/dev/<driver>/channel`, `/dev/<driver>/pseudo` — spec §6.1).
//!
//! Ioctl request numbers are defined symbolically (`ioctl_num` module)
//! rather than hardcoded magic constants, mirroring the kernel header this
//! would normally `#include`. `EINPROGRESS` is folded into `Ok(())` wherever
//! spec §4.1/§6.1 calls it "treated as success in set-hook paths".

use super::{
    BufferPolicy, ChannelParams, ConfDescriptor, DialOp, EchoCancelRequest, HardwareChannel,
    HookOp, HwEvent, Law, PollReady, SpanStatus,
};
use crate::error::{Error, Result};
use std::ffi::CString;
use std::os::unix::io::RawFd;

mod ioctl_num {
    // Placeholder request codes for the driver's ioctl(2) surface (spec
    // §6.1). A real build links these against the vendor's uapi header
    // instead of redefining them; the numeric values here only need to be
    // internally consistent since `RawChannel` is the sole caller.
    pub const SPECIFY: u64 = 0x4004_7001;
    pub const GET_PARAMS: u64 = 0x8040_7002;
    pub const SET_PARAMS: u64 = 0x4040_7003;
    pub const SET_BLOCKSIZE: u64 = 0x4004_7004;
    pub const SET_BUFINFO: u64 = 0x4010_7005;
    pub const SETLINEAR: u64 = 0x4004_7006;
    pub const SETLAW: u64 = 0x4004_7007;
    pub const SETGAINS: u64 = 0x4200_7008;
    pub const HOOK: u64 = 0x4004_7009;
    pub const DIAL: u64 = 0x4044_700A;
    pub const SENDTONE: u64 = 0x4004_700B;
    pub const TONEDETECT: u64 = 0x4004_700C;
    pub const SETCADENCE: u64 = 0x4040_700D;
    pub const AUDIOMODE: u64 = 0x4004_700E;
    pub const ECHOCANCEL_PARAMS: u64 = 0x4080_700F;
    pub const ECHOCANCEL: u64 = 0x4004_7010;
    pub const ECHOTRAIN: u64 = 0x4004_7011;
    pub const CONFMUTE: u64 = 0x4004_7012;
    pub const GETCONF: u64 = 0x8010_7013;
    pub const SETCONF: u64 = 0x4010_7014;
    pub const GETEVENT: u64 = 0x8004_7015;
    pub const SPANSTAT: u64 = 0x800C_7016;
    pub const LOOPBACK: u64 = 0x4004_7017;
    pub const ONHOOKTRANSFER: u64 = 0x4004_7018;
    pub const VMWI: u64 = 0x4004_7019;
}

pub struct RawChannel {
    fd: RawFd,
    law: Law,
}

impl RawChannel {
    /// Open a channel device node (`/dev/<driver>/channel`) and `SPECIFY`
    /// the given channel number, or open `/dev/<driver>/pseudo` when
    /// `channel` is `None` (a `CALLWAIT`/`THREEWAY` sub-channel, spec §3).
    pub fn open(device_path: &str, channel: Option<u32>) -> Result<Self> {
        let path = CString::new(device_path)
            .map_err(|_| Error::ConfigFatal(format!("bad device path: {device_path}")))?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(Error::HardwareFatal {
                channel: channel.unwrap_or(0),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        let mut chan = RawChannel { fd, law: Law::Mu };
        if let Some(c) = channel {
            chan.specify(c)?;
        }
        Ok(chan)
    }

    fn ioctl_raw(&self, request: u64, arg: *mut libc::c_void) -> Result<()> {
        let rc = unsafe { libc::ioctl(self.fd, request as _, arg) };
        if rc >= 0 {
            return Ok(());
        }
        let errno = std::io::Error::last_os_error();
        match errno.raw_os_error() {
            Some(libc::EINPROGRESS) => Ok(()),
            Some(libc::EINVAL) => Err(Error::HardwareTransient(format!(
                "bad parameter on ioctl 0x{request:x}: {errno}"
            ))),
            Some(libc::ENODEV) | Some(libc::ENXIO) | None => Err(Error::HardwareFatal {
                channel: 0,
                reason: format!("device gone on ioctl 0x{request:x}: {errno}"),
            }),
            _ => Err(Error::HardwareFatal {
                channel: 0,
                reason: format!("ioctl 0x{request:x} failed: {errno}"),
            }),
        }
    }
}

impl Drop for RawChannel {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl HardwareChannel for RawChannel {
    fn specify(&mut self, channel: u32) -> Result<()> {
        let mut ch = channel as i32;
        self.ioctl_raw(ioctl_num::SPECIFY, &mut ch as *mut _ as *mut libc::c_void)
    }

    fn get_params(&self) -> Result<ChannelParams> {
        let mut params = ChannelParams::default();
        self.ioctl_raw(ioctl_num::GET_PARAMS, &mut params as *mut _ as *mut libc::c_void)?;
        Ok(params)
    }

    fn set_params(&mut self, mut params: ChannelParams) -> Result<()> {
        self.ioctl_raw(ioctl_num::SET_PARAMS, &mut params as *mut _ as *mut libc::c_void)
    }

    fn set_blocksize(&mut self, bytes: usize) -> Result<()> {
        let mut v = bytes as i32;
        self.ioctl_raw(ioctl_num::SET_BLOCKSIZE, &mut v as *mut _ as *mut libc::c_void)
    }

    fn set_buffer_policy(&mut self, _tx: BufferPolicy, _rx: BufferPolicy, nbufs: u32) -> Result<()> {
        let mut v = nbufs as i32;
        self.ioctl_raw(ioctl_num::SET_BUFINFO, &mut v as *mut _ as *mut libc::c_void)
    }

    fn set_linear(&mut self, on: bool) -> Result<()> {
        let mut v = on as i32;
        self.ioctl_raw(ioctl_num::SETLINEAR, &mut v as *mut _ as *mut libc::c_void)
    }

    fn set_law(&mut self, law: Law) -> Result<()> {
        let mut v = match law {
            Law::Mu => 0i32,
            Law::A => 1i32,
        };
        self.ioctl_raw(ioctl_num::SETLAW, &mut v as *mut _ as *mut libc::c_void)?;
        self.law = law;
        Ok(())
    }

    fn set_gains(&mut self, mut rx: [u8; 256], mut tx: [u8; 256]) -> Result<()> {
        self.ioctl_raw(ioctl_num::SETGAINS, rx.as_mut_ptr() as *mut libc::c_void)?;
        self.ioctl_raw(ioctl_num::SETGAINS, tx.as_mut_ptr() as *mut libc::c_void)
    }

    fn hook(&mut self, op: HookOp) -> Result<()> {
        let mut v = op as i32;
        self.ioctl_raw(ioctl_num::HOOK, &mut v as *mut _ as *mut libc::c_void)
    }

    fn dial(&mut self, op: DialOp, digits: &str) -> Result<()> {
        let _ = op;
        let mut buf = [0u8; 64];
        let n = digits.len().min(63);
        buf[..n].copy_from_slice(&digits.as_bytes()[..n]);
        self.ioctl_raw(ioctl_num::DIAL, buf.as_mut_ptr() as *mut libc::c_void)
    }

    fn tone(&mut self, index: Option<u32>) -> Result<()> {
        let mut v: i32 = index.map(|i| i as i32).unwrap_or(-1);
        self.ioctl_raw(ioctl_num::SENDTONE, &mut v as *mut _ as *mut libc::c_void)
    }

    fn tone_detect(&mut self, on: bool, mute: bool) -> Result<()> {
        let mut v: i32 = if on { if mute { 2 } else { 1 } } else { 0 };
        self.ioctl_raw(ioctl_num::TONEDETECT, &mut v as *mut _ as *mut libc::c_void)
    }

    fn ring_cadence(&mut self, pattern: &[u32]) -> Result<()> {
        let mut buf = [0i32; 16];
        for (i, v) in pattern.iter().take(16).enumerate() {
            buf[i] = *v as i32;
        }
        self.ioctl_raw(ioctl_num::SETCADENCE, buf.as_mut_ptr() as *mut libc::c_void)
    }

    fn audio_mode(&mut self, on: bool) -> Result<()> {
        let mut v = on as i32;
        self.ioctl_raw(ioctl_num::AUDIOMODE, &mut v as *mut _ as *mut libc::c_void)
    }

    fn echo_cancel(&mut self, req: EchoCancelRequest) -> Result<()> {
        match req {
            EchoCancelRequest::Disable => {
                let mut v = 0i32;
                self.ioctl_raw(ioctl_num::ECHOCANCEL, &mut v as *mut _ as *mut libc::c_void)
            }
            EchoCancelRequest::Enable { taps, params } => {
                if params.is_empty() {
                    let mut v = taps as i32;
                    self.ioctl_raw(ioctl_num::ECHOCANCEL, &mut v as *mut _ as *mut libc::c_void)
                } else {
                    let mut v = taps as i32;
                    self.ioctl_raw(ioctl_num::ECHOCANCEL_PARAMS, &mut v as *mut _ as *mut libc::c_void)
                }
            }
        }
    }

    fn echo_train(&mut self, ms: u32) -> Result<()> {
        let mut v = ms as i32;
        self.ioctl_raw(ioctl_num::ECHOTRAIN, &mut v as *mut _ as *mut libc::c_void)
    }

    fn conf_mute(&mut self, on: bool) -> Result<()> {
        let mut v = on as i32;
        self.ioctl_raw(ioctl_num::CONFMUTE, &mut v as *mut _ as *mut libc::c_void)
    }

    fn conf_get(&self) -> Result<ConfDescriptor> {
        let mut raw = [0i32; 3];
        self.ioctl_raw(ioctl_num::GETCONF, raw.as_mut_ptr() as *mut libc::c_void)?;
        Ok(super::super::conference::descriptor_from_raw(raw))
    }

    fn conf_set(&mut self, desc: ConfDescriptor) -> Result<()> {
        let mut raw = super::super::conference::descriptor_to_raw(desc);
        self.ioctl_raw(ioctl_num::SETCONF, raw.as_mut_ptr() as *mut libc::c_void)
    }

    fn get_event(&mut self) -> Result<HwEvent> {
        let mut v = 0i32;
        self.ioctl_raw(ioctl_num::GETEVENT, &mut v as *mut _ as *mut libc::c_void)?;
        Ok(decode_hw_event(v))
    }

    fn span_stat(&self, span: u32) -> Result<SpanStatus> {
        let mut raw = [span as i32, 0, 0];
        self.ioctl_raw(ioctl_num::SPANSTAT, raw.as_mut_ptr() as *mut libc::c_void)?;
        Ok(SpanStatus {
            alarms: raw[0] as u32,
            channels: raw[1] as u32,
            line_config: raw[2] as u32,
        })
    }

    fn loopback(&mut self, on: bool) -> Result<()> {
        let mut v = on as i32;
        self.ioctl_raw(ioctl_num::LOOPBACK, &mut v as *mut _ as *mut libc::c_void)
    }

    fn on_hook_transfer(&mut self, ms: u32) -> Result<()> {
        let mut v = ms as i32;
        self.ioctl_raw(ioctl_num::ONHOOKTRANSFER, &mut v as *mut _ as *mut libc::c_void)
    }

    fn vmwi(&mut self, count: u32) -> Result<()> {
        let mut v = count as i32;
        self.ioctl_raw(ioctl_num::VMWI, &mut v as *mut _ as *mut libc::c_void)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n >= 0 {
            Ok(n as usize)
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                Ok(0)
            } else {
                Err(Error::HardwareFatal { channel: 0, reason: err.to_string() })
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n >= 0 {
            Ok(n as usize)
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) {
                Ok(0)
            } else {
                Err(Error::HardwareFatal { channel: 0, reason: err.to_string() })
            }
        }
    }

    fn raw_fd(&self) -> i32 {
        self.fd
    }
}

fn decode_hw_event(raw: i32) -> HwEvent {
    match raw {
        1 => HwEvent::RingOffhook,
        2 => HwEvent::OnHook,
        3 => HwEvent::WinkFlash,
        4 => HwEvent::PolarityReversal,
        5 => HwEvent::DialComplete,
        6 => HwEvent::Alarm,
        7 => HwEvent::NoAlarm,
        8 => HwEvent::RingBegin,
        9 => HwEvent::RingerOn,
        10 => HwEvent::RingerOff,
        n if (0x100..0x200).contains(&n) => {
            HwEvent::DtmfDown(digit_from_code((n - 0x100) as u8))
        }
        n if (0x200..0x300).contains(&n) => HwEvent::DtmfUp(digit_from_code((n - 0x200) as u8)),
        n if (0x300..0x400).contains(&n) => {
            HwEvent::PulseDigit(digit_from_code((n - 0x300) as u8))
        }
        _ => HwEvent::None,
    }
}

fn digit_from_code(code: u8) -> char {
    const DIGITS: &[u8] = b"0123456789*#ABCD";
    *DIGITS.get(code as usize).unwrap_or(&b'?') as char
}
