// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel, signaling, and media engine bridging a PBX core to TDM
//! telephony hardware: per-line analog signaling (FXS/FXO/E&M/feature
//! group), PRI/SS7 D-channel call control, and per-call media plumbing
//! (conferencing, echo cancellation, DTMF/Caller-ID).
//!
//! This crate has no PBX core, Q.931/ISUP library, or DSP library linked
//! in; each external collaborator is a trait in [`collab`], so the engine
//! is standalone and unit-testable against the stand-ins in [`testkit`].

pub mod collab;
pub mod conference;
pub mod config;
pub mod digits;
pub mod error;
pub mod hw;
pub mod list;
pub mod monitor;
pub mod net;
pub mod port;
pub mod pri;
pub mod signaling;
pub mod ss7;
pub mod testkit;

pub use error::{Error, Result};
pub use list::{PortHandle, PortTable};
pub use port::Port;
