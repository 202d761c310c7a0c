// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed configuration surface (spec §6.3).

use crate::port::{SignalingVariant, TonPresentation};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidSignaling {
    Bell,
    V23,
    V23Jp,
    Dtmf,
    Smdi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidStart {
    Ring,
    Polarity,
    PolarityIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxDetect {
    Incoming,
    Outgoing,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapDial {
    No,
    Incoming,
    Outgoing,
    Both,
}

impl OverlapDial {
    pub fn incoming(self) -> bool {
        matches!(self, OverlapDial::Incoming | OverlapDial::Both)
    }
}

/// `prilocaldialplan` / `pridialplan` values (spec §6.3). `-1` dynamic-detect
/// and `-2` redundant-strip are modeled as their own variants rather than
/// sentinel integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialPlan {
    National,
    Unknown,
    Private,
    International,
    Local,
    Dynamic,
    RedundantStrip,
}

/// The five `*prefix` keys of spec §6.3, bundled so the PRI/SS7 controllers
/// can apply them in one call rather than threading five strings through.
#[derive(Debug, Clone, Default)]
pub struct DialplanPrefixes {
    pub international: String,
    pub national: String,
    pub local: String,
    pub private: String,
    pub unknown: String,
}

impl DialplanPrefixes {
    /// Apply the configured TON/NPI prefix to `number` (spec §4.9 RING row,
    /// §4.10 IAM row: "Apply dialplan (TON/NPI) prefixes ... per configured
    /// `dialplan`/`localdialplan`"). `plan`'s `-1`/`-2` sentinel values are
    /// handled first: `RedundantStrip` strips a leading national-prefix
    /// match instead of adding one, `Dynamic` leaves the number as received.
    pub fn apply(&self, number: &str, ton: TonPresentation, plan: DialPlan) -> String {
        match plan {
            DialPlan::RedundantStrip => {
                number.strip_prefix(self.national.as_str()).unwrap_or(number).to_string()
            }
            DialPlan::Dynamic => number.to_string(),
            _ => {
                let prefix = match ton {
                    TonPresentation::International => &self.international,
                    TonPresentation::National => &self.national,
                    TonPresentation::Subscriber => &self.local,
                    TonPresentation::Unknown => &self.unknown,
                };
                format!("{prefix}{number}")
            }
        }
    }
}

/// One `(on_ms, off_ms)` ring-cadence pair, or a Caller-ID position marker
/// (spec §6.3 `cadence`: negative first → inverted first cadence, negative
/// odd index → CID-position marker).
#[derive(Debug, Clone, Copy)]
pub struct CadencePair {
    pub on_ms: i32,
    pub off_ms: i32,
    pub is_cid_marker: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RingCadence {
    pub pairs: Vec<CadencePair>,
    pub inverted_first: bool,
}

/// One configured distinctive-ring template (spec §6.3 `dring{1..3}` /
/// `dring{1..3}context` / `dring{1..3}range`). `-1` in any slot is a
/// wildcard.
#[derive(Debug, Clone)]
pub struct DistinctiveRing {
    pub slots_ms: [i32; 3],
    pub range_ms: [i32; 3],
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct EchoCancelConfig {
    pub taps: u32,
    pub params: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct BusyDetectConfig {
    pub enabled: bool,
    pub count: u32,
    pub pattern: Option<(u32, u32)>,
}

/// Per-`[channel]`/`[crv]` section configuration (spec §6.3).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub signalling: SignalingVariant,
    pub outsignalling: Option<SignalingVariant>,
    pub context: String,
    pub default_context: String,
    pub callerid_name: String,
    pub callerid_number: String,
    pub callerid_as_received: bool,
    pub use_callerid: bool,
    pub cid_signalling: CidSignaling,
    pub cid_start: CidStart,
    pub threewaycalling: bool,
    pub callwaiting: bool,
    pub callwaitingcallerid: bool,
    pub transfer: bool,
    pub canpark: bool,
    pub cancallforward: bool,
    pub echocancel: Option<EchoCancelConfig>,
    pub echotraining_ms: Option<u32>,
    pub busydetect: BusyDetectConfig,
    pub callprogress: bool,
    pub faxdetect: FaxDetect,
    pub relaxdtmf: bool,
    pub mailbox: Option<String>,
    pub usesmdi: bool,
    pub smdiport: Option<String>,
    pub distinctive_rings: Vec<DistinctiveRing>,
    pub use_distinctive_ring: bool,
    pub group: u32,
    pub callgroup: u64,
    pub pickupgroup: u64,
    pub mohinterpret: String,
    pub mohsuggest: String,
    pub rxgain_db: f32,
    pub txgain_db: f32,
    pub cid_rxgain_db: f32,
    pub stripmsd: u32,
    pub tonezone: Option<String>,
    pub amaflags: u32,
    pub polarityonanswerdelay_ms: u32,
    pub answeronpolarityswitch: bool,
    pub hanguponpolarityswitch: bool,
    pub sendcalleridafter: u32,
    /// `pritimer` T309 value in ms (spec §6.3 `pritimer`). `None` means T309
    /// is disabled/negative: a D-channel-down release is immediate (spec §7
    /// "Protocol-soft"/§4.9 DCHAN_DOWN row's "if T309<0"). `Some(ms)` would
    /// preserve calls across a D-channel outage for `ms`; no countdown timer
    /// is implemented yet, so only the disabled/enabled distinction is used.
    pub pritimer_t309_ms: Option<u32>,
    pub pridialplan: DialPlan,
    pub prilocaldialplan: DialPlan,
    pub overlapdial: OverlapDial,
    pub priindication_inband: bool,
    pub priexclusive: bool,
    pub internationalprefix: String,
    pub nationalprefix: String,
    pub localprefix: String,
    pub privateprefix: String,
    pub unknownprefix: String,
    pub adsi: bool,
    pub immediate: bool,
    pub mwimonitor: bool,
    pub mwimonitornotify: Option<String>,
    pub mwilevel: u32,
    pub trunkgroup: Option<u32>,
    pub ringtimeout_ms: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            signalling: SignalingVariant::FxsLs,
            outsignalling: None,
            context: "default".into(),
            default_context: "default".into(),
            callerid_name: String::new(),
            callerid_number: String::new(),
            callerid_as_received: false,
            use_callerid: true,
            cid_signalling: CidSignaling::Bell,
            cid_start: CidStart::Ring,
            threewaycalling: false,
            callwaiting: false,
            callwaitingcallerid: false,
            transfer: false,
            canpark: false,
            cancallforward: false,
            echocancel: Some(EchoCancelConfig {
                taps: 128,
                params: Vec::new(),
            }),
            echotraining_ms: None,
            busydetect: BusyDetectConfig {
                enabled: false,
                count: 3,
                pattern: None,
            },
            callprogress: false,
            faxdetect: FaxDetect::None,
            relaxdtmf: false,
            mailbox: None,
            usesmdi: false,
            smdiport: None,
            distinctive_rings: Vec::new(),
            use_distinctive_ring: false,
            group: 0,
            callgroup: 0,
            pickupgroup: 0,
            mohinterpret: "default".into(),
            mohsuggest: String::new(),
            rxgain_db: 0.0,
            txgain_db: 0.0,
            cid_rxgain_db: 0.0,
            stripmsd: 0,
            tonezone: None,
            amaflags: 0,
            polarityonanswerdelay_ms: crate::config::constants::DEFAULT_POLARITY_ON_ANSWER_DELAY_MS,
            answeronpolarityswitch: false,
            hanguponpolarityswitch: false,
            sendcalleridafter: 0,
            pritimer_t309_ms: None,
            pridialplan: DialPlan::National,
            prilocaldialplan: DialPlan::National,
            overlapdial: OverlapDial::No,
            priindication_inband: false,
            priexclusive: false,
            internationalprefix: String::new(),
            nationalprefix: String::new(),
            localprefix: String::new(),
            privateprefix: String::new(),
            unknownprefix: String::new(),
            adsi: false,
            immediate: false,
            mwimonitor: false,
            mwimonitornotify: None,
            mwilevel: 0,
            trunkgroup: None,
            ringtimeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrunkGroupConfig {
    pub trunk_group: u32,
    pub dchans: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct SpanMapEntry {
    pub span: u32,
    pub trunk_group: u32,
    pub logical_span: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ss7Type {
    Itu,
    Ansi,
}

#[derive(Debug, Clone)]
pub struct LinksetConfig {
    pub name: String,
    pub ss7_type: Ss7Type,
    pub pointcode: u32,
    pub adjpointcode: u32,
    pub defaultdpc: u32,
    pub cicbeginswith: u32,
    pub networkindicator: u32,
    pub channels: Vec<u32>,
}

/// Top-level parsed configuration (pre-freeze). Built by `config::parser`.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    pub trunk_groups: HashMap<u32, TrunkGroupConfig>,
    pub span_maps: Vec<SpanMapEntry>,
    pub linksets: HashMap<String, LinksetConfig>,
    /// channel number -> its resolved config
    pub channels: HashMap<u32, ChannelConfig>,
    pub resetinterval_secs: Option<u32>,
    pub idleext: Option<String>,
    pub idledial: Option<String>,
    pub minunused: u32,
    pub minidle: u32,
    pub switchtype: String,
    pub nsf: Option<String>,
}
