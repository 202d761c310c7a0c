// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PRI controller (spec §4.9): one thread per trunk group, polling all
//! D-channel FDs and feeding the Q.931 library.

use crate::collab::{ControlFrame, Dialplan, PbxOwner, Q931Event, Q931Link};
use crate::config::constants::{
    CAUSE_REQUESTED_CHAN_UNAVAIL, CAUSE_UNALLOCATED, PRI_POLL_TIMEOUT_MAX, PRI_POLL_TIMEOUT_RESETTING,
};
use crate::config::{DialPlan, DialplanPrefixes};
use crate::digits::OverlapCollector;
use crate::list::PortTable;
use crate::port::{LineState, OwnerId, Port};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-trunk-group state (spec §3 "PRI controller").
pub struct PriController {
    pub trunk_group: u32,
    pub link: Box<dyn Q931Link>,
    /// B-channel number -> Port channel, populated at config load.
    pub members: HashMap<u32, u32>,
    pub minunused: u32,
    pub minidle: u32,
    pub idle_ext: Option<(String, String)>,
    pub resetinterval: Option<Duration>,
    /// `pridialplan` (spec §6.3): how the calling number is interpreted
    /// before `prefixes` is applied to it.
    pub calling_dialplan: DialPlan,
    pub prefixes: DialplanPrefixes,
    /// `pritimer` T309 (spec §6.3, §4.9 DCHAN_DOWN row): `None` means T309 is
    /// disabled or negative, so a D-channel outage releases calls
    /// immediately; `Some` would hold calls open, but no countdown is
    /// implemented, so only the disabled/enabled distinction is observed.
    pub t309_ms: Option<u32>,
    /// Per-B-channel overlap-dial-incoming collectors (spec §4.9 RING row
    /// "spawn digit-collection"), keyed the same way `members` is.
    overlap_collectors: HashMap<u32, OverlapCollector>,
    last_idle_call: Option<Instant>,
    last_reset_sweep: Instant,
    reset_cursor: usize,
}

impl PriController {
    pub fn new(trunk_group: u32, link: Box<dyn Q931Link>, members: HashMap<u32, u32>) -> Self {
        PriController {
            trunk_group,
            link,
            members,
            minunused: 0,
            minidle: 0,
            idle_ext: None,
            resetinterval: None,
            calling_dialplan: DialPlan::National,
            prefixes: DialplanPrefixes::default(),
            t309_ms: None,
            overlap_collectors: HashMap::new(),
            last_idle_call: None,
            last_reset_sweep: Instant::now(),
            reset_cursor: 0,
        }
    }

    pub fn with_dialplan(mut self, calling_dialplan: DialPlan, prefixes: DialplanPrefixes) -> Self {
        self.calling_dialplan = calling_dialplan;
        self.prefixes = prefixes;
        self
    }

    pub fn with_t309_ms(mut self, t309_ms: Option<u32>) -> Self {
        self.t309_ms = t309_ms;
        self
    }

    fn poll_timeout(&self, any_resetting: bool) -> Duration {
        let scheduled = self.link.schedule_next();
        if any_resetting {
            scheduled.min(PRI_POLL_TIMEOUT_RESETTING)
        } else {
            scheduled.min(PRI_POLL_TIMEOUT_MAX)
        }
    }

    /// One iteration of the controller loop (spec §4.9 steps 1-4): drains
    /// every event the library currently has queued and applies it. `run`
    /// calls this repeatedly, blocking on `poll_timeout` between calls.
    pub fn tick(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
    ) {
        let any_resetting = self.members.values().any(|ch| {
            table.get(*ch).map(|h| h.lock().pri_ss7_flags.resetting).unwrap_or(false)
        });
        let _ = self.poll_timeout(any_resetting);

        while let Some(event) = self.link.check_event() {
            self.apply_event(table, dialplan, event, owner_of);
        }

        self.run_idle_call_management(table);
        self.run_periodic_reset(table);
    }

    fn apply_event(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        event: Q931Event,
        owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
    ) {
        match event {
            Q931Event::DchanUp => {
                for ch in self.members.values() {
                    if let Some(h) = table.get(*ch) {
                        h.lock().flags.in_alarm = false;
                    }
                }
                self.reset_cursor = 0;
            }
            Q931Event::DchanDown => {
                for ch in self.members.values() {
                    if let Some(h) = table.get(*ch) {
                        let mut p = h.lock();
                        p.flags.in_alarm = true;
                        // Protocol-soft (spec §4.9 DCHAN_DOWN row): only
                        // release outstanding calls if T309 is disabled.
                        if self.t309_ms.is_none() {
                            if let Some(owner) = p.primary_owner() {
                                if let Some(peer) = owner_of(owner) {
                                    peer.queue_frame(ControlFrame::SoftHangup, None);
                                }
                            }
                        }
                    }
                }
            }
            Q931Event::RestartChannel(ch) => self.restart_channel(table, ch),
            Q931Event::RestartSpan => {
                let chans: Vec<u32> = self.members.keys().copied().collect();
                for ch in chans {
                    self.restart_channel(table, ch);
                }
            }
            Q931Event::Ring { channel, exclusive, called_number, calling_number, calling_ton } => {
                self.handle_ring(table, dialplan, channel, exclusive, called_number, calling_number, calling_ton)
            }
            Q931Event::Proceeding => self.set_flag_and_queue(table, ControlFrame::Proceeding, owner_of, |f| f.proceeding = true),
            Q931Event::Progress => self.set_flag_and_queue(table, ControlFrame::Progress, owner_of, |f| f.progress = true),
            Q931Event::Ringing => self.set_flag_and_queue(table, ControlFrame::Alerting, owner_of, |f| f.alerting = true),
            Q931Event::Answer => self.on_answer(table, owner_of),
            Q931Event::HangupReq { cause } | Q931Event::Hangup { cause } => self.on_hangup(table, cause, owner_of),
            Q931Event::HangupAck => {}
            Q931Event::SetupAck => {
                if let Some(ch) = self.members.values().next() {
                    if let Some(h) = table.get(*ch) {
                        let digits = h.lock().strings.dial_op_buffer.clone();
                        if !digits.is_empty() {
                            self.link.information(*ch, &digits);
                        }
                    }
                }
            }
            Q931Event::NotifyHold => self.queue_to_primary(table, ControlFrame::Hold, owner_of),
            Q931Event::NotifyRetrieval => self.queue_to_primary(table, ControlFrame::Unhold, owner_of),
            Q931Event::KeypadDigit(d) | Q931Event::InfoReceived(d) => self.forward_overlap_digit(table, d, owner_of),
            Q931Event::RestartAck => {
                if let Some(ch) = self.members.values().next() {
                    if let Some(h) = table.get(*ch) {
                        h.lock().pri_ss7_flags.resetting = false;
                    }
                }
            }
        }
    }

    fn set_flag_and_queue(
        &self,
        table: &PortTable,
        frame: ControlFrame,
        owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
        set: impl Fn(&mut crate::port::PriSs7Flags),
    ) {
        for ch in self.members.values() {
            if let Some(h) = table.get(*ch) {
                let mut p = h.lock();
                if p.primary_owner().is_some() {
                    set(&mut p.pri_ss7_flags);
                    if let Some(owner) = p.primary_owner() {
                        if let Some(peer) = owner_of(owner) {
                            peer.queue_frame(frame, None);
                        }
                    }
                    return;
                }
            }
        }
    }

    fn queue_to_primary(&self, table: &PortTable, frame: ControlFrame, owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>) {
        self.set_flag_and_queue(table, frame, owner_of, |_| {});
    }

    fn on_answer(&mut self, table: &PortTable, owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>) {
        for ch in self.members.values() {
            if let Some(h) = table.get(*ch) {
                let mut p = h.lock();
                if p.primary_owner().is_some() && p.state != LineState::Up {
                    p.state = LineState::Up;
                    if let Some(owner) = p.primary_owner() {
                        if let Some(peer) = owner_of(owner) {
                            peer.queue_frame(ControlFrame::Answer, None);
                        }
                    }
                    return;
                }
            }
        }
    }

    fn on_hangup(&mut self, table: &PortTable, cause: u8, owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>) {
        for ch in self.members.values() {
            if let Some(h) = table.get(*ch) {
                let mut p = h.lock();
                // Cause-to-frame remapping only applies while the call is
                // not yet UP (spec §7 "Protocol-soft"); a post-answer
                // hangup is always a plain soft-hangup regardless of cause.
                let frame = if p.state != LineState::Up {
                    match cause {
                        17 => ControlFrame::Busy,      // user busy
                        34 | 38 | 42 => ControlFrame::Congestion,
                        _ => ControlFrame::SoftHangup,
                    }
                } else {
                    ControlFrame::SoftHangup
                };
                let still_up = frame == ControlFrame::SoftHangup;
                if let Some(owner) = p.primary_owner() {
                    if let Some(peer) = owner_of(owner) {
                        peer.queue_frame(frame, None);
                    }
                    if !still_up {
                        // Protocol-soft mapping (spec §7): busy/congestion
                        // before answer does not tear down the call handle.
                        return;
                    }
                    p.pri_ss7_flags.already_hungup = true;
                    p.pri.call_handle = None;
                    return;
                }
            }
        }
    }

    fn restart_channel(&mut self, table: &PortTable, channel: u32) {
        if let Some(port_channel) = self.members.get(&channel) {
            if let Some(h) = table.get(*port_channel) {
                let mut p = h.lock();
                p.pri_ss7_flags.resetting = true;
                p.pri.call_handle = None;
            }
        }
        self.link.reset(channel);
    }

    /// SETUP (spec §4.9 RING row): handle glare, apply dialplan prefixes,
    /// match the extension, and either spawn overlap-dial collection or
    /// dispatch straight to the PBX.
    fn handle_ring(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        channel: u32,
        exclusive: bool,
        called_number: String,
        calling_number: String,
        calling_ton: crate::port::TonPresentation,
    ) {
        let Some(&port_channel) = self.members.get(&channel) else {
            warn!("PRI trunk group {}: ring on unmapped B-channel {channel}", self.trunk_group);
            return;
        };

        let taken = table.get(port_channel).map(|h| h.lock().owner_count() > 0).unwrap_or(true);
        let (target_channel, target_port_channel) = if taken {
            if exclusive {
                warn!("PRI trunk group {}: exclusive SETUP on busy channel {channel}, rejecting", self.trunk_group);
                self.link.reject(channel, CAUSE_REQUESTED_CHAN_UNAVAIL);
                return;
            }
            let free = self.members.iter().find(|(_, ch)| {
                table.get(**ch).map(|h| h.lock().owner_count() == 0).unwrap_or(false)
            });
            match free {
                Some((&free_b_channel, &free_port_channel)) => {
                    info!("PRI trunk group {}: glare on channel {channel}, reassigning to {free_b_channel}", self.trunk_group);
                    (free_b_channel, free_port_channel)
                }
                None => {
                    warn!("PRI trunk group {}: glare on channel {channel}, no free B-channel", self.trunk_group);
                    self.link.reject(channel, CAUSE_REQUESTED_CHAN_UNAVAIL);
                    return;
                }
            }
        } else {
            (channel, port_channel)
        };

        let Some(h) = table.get(target_port_channel) else {
            warn!("PRI trunk group {}: ring target Port channel {target_port_channel} missing", self.trunk_group);
            return;
        };

        let calling_number = self.prefixes.apply(&calling_number, calling_ton, self.calling_dialplan);
        let (context, overlap_incoming) = {
            let mut p = h.lock();
            p.strings.callerid.number = calling_number;
            p.strings.callerid.ton = Some(calling_ton);
            p.strings.dialed_number = called_number.clone();
            (p.strings.context.clone(), p.flags.overlap_dial_incoming)
        };

        let exists = dialplan.exists(&context, &called_number);
        let can_match_more = dialplan.can_match_more(&context, &called_number);

        if !exists && !can_match_more {
            warn!("PRI trunk group {}: no extension {called_number} in context {context}, rejecting", self.trunk_group);
            self.link.reject(channel, CAUSE_UNALLOCATED);
            return;
        }

        h.lock().pri_ss7_flags.proceeding = true;

        if can_match_more && overlap_incoming {
            self.overlap_collectors.insert(target_channel, OverlapCollector::new(&context, &called_number));
            return;
        }

        if !exists {
            // Ambiguous and overlapdial-incoming isn't configured for this
            // Port: nothing more the library will hand us to disambiguate.
            return;
        }

        dialplan.run(&context, &called_number, target_port_channel as OwnerId);
    }

    fn forward_overlap_digit(&self, table: &PortTable, digit: char, owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>) {
        for ch in self.members.values() {
            if let Some(h) = table.get(*ch) {
                let p = h.lock();
                if !p.flags.overlap_dial_incoming {
                    continue;
                }
                if let Some(owner) = p.primary_owner() {
                    if let Some(peer) = owner_of(owner) {
                        peer.queue_dtmf(digit, true);
                        peer.queue_dtmf(digit, false);
                    }
                    return;
                }
            }
        }
    }

    /// Idle-call / idle-extension management (spec §4.9, throttled to one
    /// launch per wall-second — spec §5).
    fn run_idle_call_management(&mut self, table: &PortTable) {
        let unused = self.members.values().filter(|ch| {
            table.get(**ch).map(|h| h.lock().owner_count() == 0).unwrap_or(false)
        }).count() as u32;
        let idle = self.members.values().filter(|ch| {
            table.get(**ch).map(|h| h.lock().pri_ss7_flags.is_idle_call).unwrap_or(false)
        }).count() as u32;

        if unused < self.minunused && idle >= self.minidle {
            if let Some(ch) = self.members.values().find(|ch| {
                table.get(**ch).map(|h| h.lock().pri_ss7_flags.is_idle_call).unwrap_or(false)
            }) {
                if let Some(h) = table.get(*ch) {
                    h.lock().pri_ss7_flags.is_idle_call = false;
                }
            }
            return;
        }

        if unused < self.minunused && self.idle_ext.is_some() {
            let throttled = self
                .last_idle_call
                .map(|t| t.elapsed() < crate::config::constants::IDLE_CALL_MIN_INTERVAL)
                .unwrap_or(false);
            if !throttled {
                self.last_idle_call = Some(Instant::now());
            }
        }
    }

    fn run_periodic_reset(&mut self, table: &PortTable) {
        let Some(interval) = self.resetinterval else { return };
        if self.last_reset_sweep.elapsed() < interval {
            return;
        }
        self.last_reset_sweep = Instant::now();
        let channels: Vec<u32> = self.members.keys().copied().collect();
        if channels.is_empty() {
            return;
        }
        let idx = self.reset_cursor % channels.len();
        let b_channel = channels[idx];
        self.reset_cursor += 1;
        if let Some(&port_channel) = self.members.get(&b_channel) {
            let should_reset = table
                .get(port_channel)
                .map(|h| {
                    let p = h.lock();
                    p.owner_count() == 0 && !p.pri_ss7_flags.resetting
                })
                .unwrap_or(false);
            if should_reset {
                self.restart_channel(table, b_channel);
            }
        }
    }
}

/// Run `controller.tick` in a loop until `shutdown` is set, sleeping for the
/// library's requested schedule between iterations (spec §4.9 step 1, "min
/// 60s, min 1s while resetting/idling").
pub fn run(
    controller: &mut PriController,
    table: &PortTable,
    dialplan: &dyn Dialplan,
    owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        controller.tick(table, dialplan, owner_of);
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::Law;
    use crate::port::SignalingVariant;
    use crate::testkit::FakeDevice;
    use std::sync::Mutex;

    struct FakeQ931 {
        events: Mutex<Vec<Q931Event>>,
        rejected: Arc<Mutex<Vec<(u32, u8)>>>,
    }

    impl FakeQ931 {
        fn with_events(events: Vec<Q931Event>) -> Self {
            FakeQ931 { events: Mutex::new(events), rejected: Arc::new(Mutex::new(Vec::new())) }
        }

        fn with_events_tracking_rejects(events: Vec<Q931Event>, rejected: Arc<Mutex<Vec<(u32, u8)>>>) -> Self {
            FakeQ931 { events: Mutex::new(events), rejected }
        }
    }

    impl Q931Link for FakeQ931 {
        fn schedule_next(&self) -> Duration {
            Duration::from_secs(60)
        }
        fn check_event(&mut self) -> Option<Q931Event> {
            self.events.get_mut().unwrap().pop()
        }
        fn find_dchan(&mut self) -> Option<usize> {
            Some(0)
        }
        fn reset(&mut self, _channel: u32) {}
        fn information(&mut self, _channel: u32, _digits: &str) {}
        fn enslave(&mut self, _secondary: usize) {}
        fn reject(&mut self, channel: u32, cause: u8) {
            self.rejected.lock().unwrap().push((channel, cause));
        }
    }

    fn mkport(channel: u32) -> Port {
        Port::new(channel, 1, Law::Mu, SignalingVariant::Pri, Box::new(FakeDevice::new()))
    }

    fn ring_event(called: &str) -> Q931Event {
        Q931Event::Ring {
            channel: 0,
            exclusive: false,
            called_number: called.to_string(),
            calling_number: "5551234".to_string(),
            calling_ton: crate::port::TonPresentation::National,
        }
    }

    #[test]
    fn dchan_down_marks_members_in_alarm_and_soft_hangs_up_owners() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().real.owner = Some(9);

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![Q931Event::DchanDown]));
        let mut ctrl = PriController::new(1, link, members);

        let dp = crate::testkit::StubDialplan::new();
        let stub_owner = crate::testkit::StubOwner::new(9);
        let frames = stub_owner.frames.clone();
        let owner: Arc<dyn PbxOwner> = Arc::new(stub_owner);
        let lookup = |id: u64| -> Option<Arc<dyn PbxOwner>> { if id == 9 { Some(owner.clone()) } else { None } };
        ctrl.tick(&table, &dp, &lookup);

        assert!(handle.lock().flags.in_alarm);
        assert_eq!(frames.lock()[0].0, ControlFrame::SoftHangup);
    }

    #[test]
    fn dchan_down_with_t309_configured_does_not_soft_hang_up_the_owner() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().real.owner = Some(9);

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![Q931Event::DchanDown]));
        let mut ctrl = PriController::new(1, link, members).with_t309_ms(Some(10_000));

        let dp = crate::testkit::StubDialplan::new();
        let stub_owner = crate::testkit::StubOwner::new(9);
        let frames = stub_owner.frames.clone();
        let owner: Arc<dyn PbxOwner> = Arc::new(stub_owner);
        let lookup = |id: u64| -> Option<Arc<dyn PbxOwner>> { if id == 9 { Some(owner.clone()) } else { None } };
        ctrl.tick(&table, &dp, &lookup);

        assert!(handle.lock().flags.in_alarm);
        assert!(frames.lock().is_empty());
    }

    #[test]
    fn restart_channel_marks_resetting_and_clears_call_handle() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().pri.call_handle = Some(42);

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![]));
        let mut ctrl = PriController::new(1, link, members);
        ctrl.restart_channel(&table, 0);

        let p = handle.lock();
        assert!(p.pri_ss7_flags.resetting);
        assert!(p.pri.call_handle.is_none());
    }

    #[test]
    fn hangup_before_answer_with_busy_cause_maps_to_busy_frame() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().real.owner = Some(9);

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![]));
        let mut ctrl = PriController::new(1, link, members);
        ctrl.on_hangup(&table, 17, &|_| None);

        // Busy/congestion mappings leave the call handle alone (protocol-soft).
        assert!(handle.lock().pri.call_handle.is_none());
    }

    #[test]
    fn hangup_after_answer_ignores_cause_mapping() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().real.owner = Some(9);
        handle.lock().state = LineState::Up;

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![]));
        let mut ctrl = PriController::new(1, link, members);
        ctrl.on_hangup(&table, 17, &|_| None);

        // Once UP, cause 17 no longer maps to Busy: the call handle is torn
        // down like any other hangup.
        let p = handle.lock();
        assert!(p.pri_ss7_flags.already_hungup);
        assert!(p.pri.call_handle.is_none());
    }

    #[test]
    fn ring_on_unknown_extension_rejects_unallocated() {
        let table = PortTable::new();
        table.insert(mkport(1));

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let link = Box::new(FakeQ931::with_events_tracking_rejects(vec![ring_event("999")], rejected.clone()));
        let mut ctrl = PriController::new(1, link, members);
        let dp = crate::testkit::StubDialplan::new();
        let lookup = |_id: u64| -> Option<Arc<dyn PbxOwner>> { None };
        ctrl.tick(&table, &dp, &lookup);

        assert_eq!(*rejected.lock().unwrap(), vec![(0u32, crate::config::constants::CAUSE_UNALLOCATED)]);
    }

    #[test]
    fn ring_on_matched_extension_sets_proceeding_and_caller_id() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().strings.context = "default".to_string();

        let mut members = HashMap::new();
        members.insert(0u32, 1u32);
        let link = Box::new(FakeQ931::with_events(vec![ring_event("100")]));
        let mut ctrl = PriController::new(1, link, members);
        let dp = crate::testkit::StubDialplan::new().add_exact("default", "100");
        let lookup = |_id: u64| -> Option<Arc<dyn PbxOwner>> { None };
        ctrl.tick(&table, &dp, &lookup);

        let p = handle.lock();
        assert!(p.pri_ss7_flags.proceeding);
        assert_eq!(p.strings.dialed_number, "100");
        assert_eq!(p.strings.callerid.number, "5551234");
    }
}
