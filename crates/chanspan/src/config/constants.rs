// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Static protocol/timer constants (spec §6.3, §4.8).
//!
//! Level 1 of the two-level config model described in SPEC_FULL.md §10.4:
//! compile-time defaults that the dynamic `RuntimeConfig` (config/runtime.rs)
//! may override per-section. **Never hardcode these elsewhere.**

use std::time::Duration;

/// First-digit collection timeout (spec §4.8 FXO-style).
pub const FIRST_DIGIT_TIMEOUT: Duration = Duration::from_secs(16);

/// Inter-digit ("general") collection timeout.
pub const GEN_DIGIT_TIMEOUT: Duration = Duration::from_secs(8);

/// Disambiguation timeout once a prefix match exists but is not unique.
pub const MATCH_DIGIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default delay required between a polarity reversal and answer/hangup
/// honoring it (spec §6.3 `polarityonanswerdelay`).
pub const POLARITY_ON_ANSWER_DELAY: Duration = Duration::from_millis(600);

/// CAS-CW mute-expiry window superseding conference restore after a
/// call-waiting spill (spec §4.3).
pub const CW_SPILL_MUTE_EXPIRY: Duration = Duration::from_millis(500);

/// Guard window: a hangup within this long of the last flash is folded into
/// a full hangup of both legs (spec §4.6 On-hook row).
pub const FLASH_HANGUP_GUARD: Duration = Duration::from_secs(2);

/// Minimum PRI D-channel poll timeout floor (spec §4.9 step 1).
pub const PRI_POLL_TIMEOUT_MAX: Duration = Duration::from_secs(60);

/// PRI poll timeout while a reset or idle-call cycle is in flight.
pub const PRI_POLL_TIMEOUT_RESETTING: Duration = Duration::from_secs(1);

/// Idle-call creation throttle (spec §5 cancellation & timeouts, §8).
pub const IDLE_CALL_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Monitor thread tick (spec §4.11).
pub const MONITOR_TICK: Duration = Duration::from_secs(1);

/// MWI carrier mailbox poll stride: one mailbox visited per monitor pass.
pub const MWI_ONHOOK_SETTLE: Duration = Duration::from_secs(3);

/// Duration on-hook-transfer is armed for after an MWI change is detected.
pub const MWI_ONHOOK_TRANSFER: Duration = Duration::from_secs(4);

/// Maximum duration the Caller-ID FSK decoder waits for a complete frame.
pub const CID_FSK_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional wait for a first ring before starting FXS-style Caller-ID
/// collection (spec §4.8 FXS-style).
pub const CID_FIRST_RING_WAIT: Duration = Duration::from_secs(3);

/// CAS-CW SAS+CAS spill length when `callwaitingcallerid=yes` and this is
/// the first call-waiting ring (spec §9 open question).
pub const CWCID_SAS_CAS_BYTES: usize = 3080;

/// CAS-CW SAS-only spill length otherwise.
pub const CWCID_SAS_ONLY_BYTES: usize = 2400;

/// Echo canceller tap-length bounds (power of two, spec §6.3 `echocancel`).
pub const ECHOCANCEL_MIN_TAPS: u32 = 32;
pub const ECHOCANCEL_MAX_TAPS: u32 = 1024;

/// Echo training duration bounds in ms (spec §6.3 `echotraining`).
pub const ECHOTRAINING_MIN_MS: u32 = 10;
pub const ECHOTRAINING_MAX_MS: u32 = 4000;

/// Bounded echo-cancel optional parameter list length (spec §9
/// "Echo-cancel parameter list").
pub const MAX_ECHOCANPARAMS: usize = 8;

/// Maximum simultaneous PRI trunk groups / SS7 linksets (spec §5).
pub const MAX_SPANS: usize = 32;

/// Maximum D-channels (resp. signaling links) per controller (spec §3).
pub const MAX_DCHANS: usize = 4;

/// CRV/slave fan-out bound (spec §3 "up to four slave Ports").
pub const MAX_SLAVES: usize = 4;

/// Default polarity-on-answer delay key default (spec §6.3).
pub const DEFAULT_POLARITY_ON_ANSWER_DELAY_MS: u32 = 600;

/// Default call-parking extension (spec §4.8 "a parking extension") absent
/// a configured one, matching the historical Asterisk `features.conf`
/// `parkext` default.
pub const DEFAULT_PARK_EXTENSION: &str = "700";

/// Q.931 cause codes the PRI controller sends back on a rejected SETUP
/// (spec §4.9 RING row).
pub const CAUSE_UNALLOCATED: u8 = 1;
pub const CAUSE_REQUESTED_CHAN_UNAVAIL: u8 = 44;
