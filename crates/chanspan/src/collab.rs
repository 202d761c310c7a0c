// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator traits (SPEC_FULL.md §12).
//!
//! This engine is a standalone crate with no PBX core, Q.931/ISUP library,
//! or DSP library to link against (spec §1 "out of scope"). Each external
//! collaborator is modeled as a trait at the seam the engine actually calls
//! it, so the engine compiles and is unit-testable on its own; stub
//! implementations live in [`crate::testkit`].

use crate::port::{OwnerId, SubIndex, TonPresentation};

/// Control frame kinds the engine queues to a call's owner (spec §4.2
/// `indicate`, §4.6 event table, §4.9/§4.10 event tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Ring,
    Busy,
    Congestion,
    Answer,
    Progress,
    Proceeding,
    Alerting,
    Hold,
    Unhold,
    Flash,
    RadioKey,
    RadioUnkey,
    SoftHangup,
}

/// The non-owning reference to a PBX call half that a sub-channel's
/// `owner` field names (spec §3 "Calls are owned externally").
pub trait PbxOwner: Send {
    fn id(&self) -> OwnerId;

    /// Queue a control frame (spec §4.2 `read`'s "deferred need X control
    /// frame" and §5 "frames queued to an owner arrive in the order the
    /// Port produced them").
    fn queue_frame(&self, frame: ControlFrame, mohsuggest: Option<&str>);

    /// Queue a raw DTMF begin/end frame (spec §4.6 "DTMF down / up").
    fn queue_dtmf(&self, digit: char, begin: bool);

    /// The `fixup` operation's ownership transfer notification (spec §4.2
    /// `fixup`).
    fn fixup_notify(&self, new_sub: SubIndex);
}

/// Event surface of the Q.931/PRI library (spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Q931Event {
    DchanUp,
    DchanDown,
    RestartChannel(u32),
    RestartSpan,
    /// A SETUP (spec §4.9's RING row). Carries enough of the SETUP IE set to
    /// run dialplan matching and apply TON/NPI prefixes: the called number as
    /// received, the calling number and its type-of-number/presentation, and
    /// whether SETUP asked for an exclusive (non-glare-eligible) channel.
    Ring {
        channel: u32,
        exclusive: bool,
        called_number: String,
        calling_number: String,
        calling_ton: TonPresentation,
    },
    Proceeding,
    Progress,
    Ringing,
    Answer,
    HangupReq { cause: u8 },
    Hangup { cause: u8 },
    HangupAck,
    SetupAck,
    NotifyHold,
    NotifyRetrieval,
    KeypadDigit(char),
    InfoReceived(char),
    RestartAck,
}

pub trait Q931Link: Send {
    /// Timeout to pass into the controller's poll (spec §4.9 step 1).
    fn schedule_next(&self) -> std::time::Duration;
    fn check_event(&mut self) -> Option<Q931Event>;
    fn find_dchan(&mut self) -> Option<usize>;
    fn reset(&mut self, channel: u32);
    fn information(&mut self, channel: u32, digits: &str);
    fn enslave(&mut self, secondary: usize);

    /// Reject a SETUP with a cause code (spec §4.9 RING row: UNALLOCATED if
    /// the extension is missing, REQUESTED_CHAN_UNAVAIL if glare finds no
    /// free B-channel).
    fn reject(&mut self, channel: u32, cause: u8);
}

/// Event surface of the ISUP/SS7 library (spec §4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsupEvent {
    Rsc { cic: u32 },
    Grs { base_cic: u32, range: u32 },
    Cqm { base_cic: u32, range: u32 },
    Cgb { base_cic: u32, range: u32 },
    Cgu { base_cic: u32, range: u32 },
    Blo { cic: u32 },
    Bla { cic: u32 },
    Ubl { cic: u32 },
    Uba { cic: u32 },
    /// IAM (spec §4.10's IAM row). Carries the called/calling numbers and
    /// the calling-party NAI plus the charge/generic-address/generic-digits/
    /// JIP fields the driver stashes on the Port for dialplan retrieval.
    Iam {
        cic: u32,
        called_number: String,
        calling_number: String,
        calling_nai: TonPresentation,
        charge_number: Option<String>,
        generic_address: Option<String>,
        generic_digits: Option<String>,
        jip: Option<String>,
    },
    Cot { cic: u32 },
    Ccr { cic: u32 },
    Acm { cic: u32 },
    Cpg { cic: u32 },
    Con { cic: u32 },
    Anm { cic: u32 },
    Rel { cic: u32, cause: u8 },
    Rlc { cic: u32 },
}

pub trait IsupLink: Send {
    fn check_event(&mut self) -> Option<IsupEvent>;
    fn send_rlc(&mut self, cic: u32);
    fn send_gra(&mut self, base_cic: u32, range: u32);
    fn send_cqr(&mut self, base_cic: u32, range: u32, status: &[u8]);
    fn send_cgba(&mut self, base_cic: u32, range: u32);
    fn send_cgua(&mut self, base_cic: u32, range: u32);
    fn send_bla(&mut self, cic: u32);
    fn send_uba(&mut self, cic: u32);
    fn send_lpa(&mut self, cic: u32);
    fn send_rel(&mut self, cic: u32, cause: u8);
    fn send_rsc(&mut self, cic: u32);
}

/// Bell-202/V.23 Caller-ID FSK + TDD codec contract (spec §4.2 `send_text`,
/// §4.8 FXS Caller-ID collection).
pub trait CidFskCodec: Send {
    fn encode_bell202(&self, number: &str, name: &str) -> Vec<u8>;
    fn decode_bell202(&mut self, samples: &[i16]) -> Option<(String, String)>;
}

pub trait DtmfCodec: Send {
    fn generate(&self, digit: char, duration_ms: u32) -> Vec<i16>;
    fn detect(&mut self, samples: &[i16]) -> Option<char>;
}

pub trait TddCodec: Send {
    fn encode(&self, text: &str) -> Vec<u8>;
    fn decode(&mut self, samples: &[i16]) -> Option<String>;
}

/// The generic PBX dialplan lookup (spec §4.8, §4.9 "Match extension").
pub trait Dialplan: Send {
    fn exists(&self, context: &str, exten: &str) -> bool;
    fn can_match_more(&self, context: &str, exten: &str) -> bool;
    fn run(&self, context: &str, exten: &str, owner: OwnerId);
}
