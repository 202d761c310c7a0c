// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error kinds the core must distinguish (spec §7).
//!
//! Hand-rolled rather than `thiserror`-derived: these sit on the hot path of
//! `Port::read`/`Port::write` and the PRI/SS7 poll loops, where an
//! allocation-light, match-friendly type matters more than derive ergonomics.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Contradictory signaling or a missing trunk group at load time.
    ConfigFatal(String),

    /// An ioctl returned `EINPROGRESS`; callers in hook/dial paths should
    /// treat this as success rather than propagate it.
    HardwareTransient(String),

    /// An ioctl returned a device error on a Port with an owner.
    HardwareFatal { channel: u32, reason: String },

    /// A Q.931 HANGUP mapped to busy/congestion while the call was not yet up.
    ProtocolSoft { cause: u8 },

    /// A Q.931 RESTART / SS7 RSC arrived against an active call.
    ProtocolFatal { channel: u32, reason: String },

    /// No free sub-channel, or no empty B-channel, to satisfy a request.
    ResourceExhausted(ResourceKind),

    /// A `trylock` against the PRI/SS7 mutex failed; caller should back off
    /// and retry rather than treat this as a hard error.
    LockInversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Busy,
    Congestion,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigFatal(msg) => write!(f, "config-fatal: {msg}"),
            Error::HardwareTransient(msg) => write!(f, "hardware-transient (treated as ok): {msg}"),
            Error::HardwareFatal { channel, reason } => {
                write!(f, "hardware-fatal on channel {channel}: {reason}")
            }
            Error::ProtocolSoft { cause } => write!(f, "protocol-soft, cause={cause}"),
            Error::ProtocolFatal { channel, reason } => {
                write!(f, "protocol-fatal on channel {channel}: {reason}")
            }
            Error::ResourceExhausted(kind) => write!(f, "resource exhausted: {kind:?}"),
            Error::LockInversion => write!(f, "lock inversion detected, retry"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// True for ioctl outcomes that hook/dial paths must treat as success.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::HardwareTransient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::HardwareFatal { .. } | Error::ConfigFatal(_))
    }
}
