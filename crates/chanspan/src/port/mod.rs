// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The Port: the central entity of the engine (spec §3, §4.2).

pub mod flags;
pub mod hangup;
pub mod ops;
pub mod signaling_variant;
pub mod subchannel;

pub use flags::{PortFlags, PriSs7Flags};
pub use signaling_variant::SignalingVariant;
pub use subchannel::{OwnerId, SubChannel, SubIndex};

use crate::hw::{HardwareChannel, Law};
use std::collections::VecDeque;
use std::time::Instant;

/// Line state a Port moves through (spec §4.6, §4.8, §8 scenarios).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Down,
    PreRing,
    Ringing,
    Dialing,
    DialingOffhook,
    Up,
    Busy,
    Congestion,
    Reserved,
    Resetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarityState {
    Idle,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TonPresentation {
    National,
    International,
    Unknown,
    Subscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerIdPresentation {
    Allowed,
    Restricted,
    Unavailable,
}

/// Caller-ID fields (spec §3 Strings).
#[derive(Debug, Clone, Default)]
pub struct CallerIdInfo {
    pub number: String,
    pub name: String,
    pub ani: String,
    pub ton: Option<TonPresentation>,
    pub presentation: Option<CallerIdPresentation>,
}

#[derive(Debug, Clone, Default)]
pub struct PortStrings {
    pub context: String,
    pub default_context: String,
    pub exten: String,
    pub language: String,
    pub mohinterpret: String,
    pub mohsuggest: String,
    pub callerid: CallerIdInfo,
    pub last_callerid: CallerIdInfo,
    pub callwait_callerid: CallerIdInfo,
    pub redirecting_number: String,
    pub dialed_number: String,
    pub mailbox: Option<String>,
    pub call_forward: Option<String>,
    pub account_code: String,
    pub dial_dest_buffer: String,
    pub final_dial_string: String,
    pub echorest: String,
    pub dial_op_buffer: String,
}

#[derive(Debug, Clone, Default)]
pub struct PortNumeric {
    pub stripmsd: u32,
    pub callwait_rings: u32,
    pub echo_cancel_taps: u32,
    pub echo_cancel_params: Vec<(String, i64)>,
    pub echo_training_ms: u32,
    pub busy_detect_count: u32,
    pub busy_tone_ms: u32,
    pub busy_quiet_ms: u32,
    pub call_progress_mask: u32,
    pub last_flash: Option<Instant>,
    pub on_hook_since: Option<Instant>,
    pub distinctive_ring_choice: Option<usize>,
    pub callerid_after_rings: u32,
    pub dtmf_relax: bool,
    pub polarity_on_answer_delay_ms: u32,
    pub polarity_since: Option<Instant>,
    pub polarity_state: PolarityState,
    pub answered_at: Option<Instant>,
}

/// PRI linkage (spec §3 "PRI-linkage"). `trunk_group` identifies the
/// controller owning this Port; `call_handle` is the opaque token the
/// `Q931Link` hands back on SETUP (spec §9 "PRI/SS7 handles").
#[derive(Debug, Clone, Default)]
pub struct PriLinkage {
    pub trunk_group: Option<u32>,
    pub bearer_channel: Option<u32>,
    pub crv_channel: Option<u32>,
    pub call_handle: Option<u64>,
    pub offset: u32,
    pub logical_span: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Ss7Linkage {
    pub linkset: Option<String>,
    pub call_handle: Option<u64>,
    pub cic: u32,
    pub dpc: u32,
    pub charge_number: Option<String>,
    pub generic_address: Option<String>,
    pub generic_digits: Option<String>,
    pub jip: Option<String>,
    pub call_ref_ident: u32,
    pub call_ref_pc: u32,
    pub transfer_capability: u32,
    pub looped_back: bool,
}

/// Saved conference state captured across a Caller-ID spill (spec §4.3
/// `save_conference`/`restore_conference`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedConference {
    pub saved: Option<crate::hw::ConfDescriptor>,
    pub cw_mute_expiry: Option<Instant>,
}

pub struct Port {
    pub channel: u32,
    pub span: u32,
    pub law: Law,
    pub signalling: SignalingVariant,
    pub outsignalling: Option<SignalingVariant>,
    pub radio: bool,
    pub operator_services_peer: Option<u32>,

    pub real: SubChannel,
    pub callwait: SubChannel,
    pub threeway: SubChannel,

    pub saved_conference: SavedConference,
    pub master: Option<u32>,
    pub slaves: Vec<u32>,
    pub confno: Option<u32>,
    pub propagated_confno: Option<u32>,
    pub in_conference: bool,

    pub flags: PortFlags,
    pub pri_ss7_flags: PriSs7Flags,

    pub strings: PortStrings,
    pub numeric: PortNumeric,

    pub pri: PriLinkage,
    pub ss7: Ss7Linkage,

    pub state: LineState,
    pub device: Box<dyn HardwareChannel>,

    /// Deferred dial digits queued while a CID spill or dial-tail replay is
    /// in progress (spec §4.6 "replay deferred dialstring").
    pub deferred_dial_queue: VecDeque<String>,
}

impl Port {
    pub fn new(channel: u32, span: u32, law: Law, signalling: SignalingVariant, device: Box<dyn HardwareChannel>) -> Self {
        Port {
            channel,
            span,
            law,
            signalling,
            outsignalling: None,
            radio: false,
            operator_services_peer: None,
            real: SubChannel::new(SubIndex::Real, law),
            callwait: SubChannel::new(SubIndex::CallWait, law),
            threeway: SubChannel::new(SubIndex::ThreeWay, law),
            saved_conference: SavedConference::default(),
            master: None,
            slaves: Vec::new(),
            confno: None,
            propagated_confno: None,
            in_conference: false,
            flags: PortFlags::default(),
            pri_ss7_flags: PriSs7Flags::default(),
            strings: PortStrings::default(),
            numeric: PortNumeric::default(),
            pri: PriLinkage::default(),
            ss7: Ss7Linkage::default(),
            state: LineState::Down,
            device,
            deferred_dial_queue: VecDeque::new(),
        }
    }

    pub fn sub(&self, index: SubIndex) -> &SubChannel {
        match index {
            SubIndex::Real => &self.real,
            SubIndex::CallWait => &self.callwait,
            SubIndex::ThreeWay => &self.threeway,
        }
    }

    pub fn sub_mut(&mut self, index: SubIndex) -> &mut SubChannel {
        match index {
            SubIndex::Real => &mut self.real,
            SubIndex::CallWait => &mut self.callwait,
            SubIndex::ThreeWay => &mut self.threeway,
        }
    }

    /// Invariant (spec §8 property 1): at most one sub-channel's owner is
    /// the Port's primary owner at any time. We additionally require the
    /// primary owner, if any, to equal `REAL`'s owner once a call exists,
    /// since `REAL` is always the "current" leg from the PBX's perspective.
    pub fn primary_owner(&self) -> Option<OwnerId> {
        self.real.owner
    }

    pub fn owner_count(&self) -> usize {
        SubIndex::ALL
            .iter()
            .filter(|i| self.sub(**i).owner.is_some())
            .count()
    }

    /// Whether a CRV's bearer binding is currently assigned (spec §3
    /// invariant: "a CRV Port's bearer FD equals the bearer Port's REAL FD
    /// whenever a call is assigned").
    pub fn is_bearer_bound(&self) -> bool {
        self.pri.bearer_channel.is_some() && self.real.fd.is_some()
    }

    pub fn is_crv(&self) -> bool {
        self.pri.crv_channel.is_none() && self.pri.bearer_channel.is_some()
    }

    pub fn reset_after_succession(&mut self) {
        self.numeric.last_flash = None;
        self.numeric.distinctive_ring_choice = None;
        self.flags.confirm_answer = false;
        self.numeric.callerid_after_rings = 0;
        self.flags.outgoing = false;
        self.flags.digital = self.signalling.is_digital();
        self.flags.fax_handled = false;
        self.flags.pulse_dial = false;
    }
}
