// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Port flags (spec §3 "Flags"), split into the general set and the
//! PRI/SS7-only set so a glance at a match arm shows which protocol family
//! it belongs to.

#[derive(Debug, Clone, Copy, Default)]
pub struct PortFlags {
    pub adsi: bool,
    pub answer_on_polarity_switch: bool,
    pub busy_detect: bool,
    pub call_return: bool,
    pub call_waiting: bool,
    pub call_waiting_permanent: bool,
    pub call_waiting_callerid: bool,
    pub can_call_forward: bool,
    pub can_park: bool,
    pub confirm_answer: bool,
    pub destroy_pending: bool,
    pub dialing: bool,
    pub digital: bool,
    pub dnd: bool,
    pub echo_cancel_on: bool,
    pub echo_cancel_bridged: bool,
    pub fax_handled: bool,
    pub hangup_on_polarity_switch: bool,
    pub hardware_dtmf: bool,
    pub hide_callerid: bool,
    pub hide_callerid_permanent: bool,
    pub ignore_dtmf: bool,
    pub immediate_answer: bool,
    pub in_alarm: bool,
    pub outgoing: bool,
    pub pulse_dial: bool,
    pub transfer_allowed: bool,
    pub transfer_to_busy: bool,
    pub three_way_calling: bool,
    pub use_callerid: bool,
    pub use_calling_presentation: bool,
    pub use_distinctive_ring: bool,
    pub zap_transfer_callerid: bool,
    pub mwi_monitor: bool,
    pub mwi_monitor_active: bool,
    pub in_service: bool,
    pub locally_blocked: bool,
    pub remotely_blocked: bool,
    /// Mirrors `overlapdial=incoming|both` for this Port's trunk group
    /// (spec §6.3 `overlapdial`); cached on the Port so the PRI controller
    /// doesn't need a config lookup on every digit.
    pub overlap_dial_incoming: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriSs7Flags {
    pub rlt: bool,
    pub alerting: bool,
    pub already_hungup: bool,
    pub is_idle_call: bool,
    pub proceeding: bool,
    pub progress: bool,
    pub resetting: bool,
    pub setup_ack: bool,
}
