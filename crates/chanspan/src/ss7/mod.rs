// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SS7 controller (spec §4.10): one thread per linkset, polling all
//! signaling-channel FDs and feeding the ISUP library.

use crate::collab::{ControlFrame, Dialplan, IsupEvent, IsupLink, PbxOwner};
use crate::config::constants::CAUSE_UNALLOCATED;
use crate::config::{DialPlan, DialplanPrefixes};
use crate::list::{PortHandle, PortTable};
use crate::port::{OwnerId, Port};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CicStatus {
    LocalBlocked,
    RemoteBlocked,
    OutgoingActive,
    IncomingActive,
    Idle,
}

pub struct Ss7Controller {
    pub linkset: String,
    pub link: Box<dyn IsupLink>,
    /// CIC -> Port channel.
    pub members: HashMap<u32, u32>,
    pub cot_check_required: bool,
    /// `pridialplan`-equivalent calling-number interpretation and the five
    /// per-linkset `*prefix` tables (spec §4.10 IAM row "per-linkset prefix
    /// tables").
    pub calling_dialplan: DialPlan,
    pub prefixes: DialplanPrefixes,
    last_group_reset: Instant,
}

impl Ss7Controller {
    pub fn new(linkset: &str, link: Box<dyn IsupLink>, members: HashMap<u32, u32>) -> Self {
        Ss7Controller {
            linkset: linkset.to_string(),
            link,
            members,
            cot_check_required: false,
            calling_dialplan: DialPlan::National,
            prefixes: DialplanPrefixes::default(),
            last_group_reset: Instant::now(),
        }
    }

    pub fn with_dialplan(mut self, calling_dialplan: DialPlan, prefixes: DialplanPrefixes) -> Self {
        self.calling_dialplan = calling_dialplan;
        self.prefixes = prefixes;
        self
    }

    pub fn tick(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
    ) {
        while let Some(event) = self.link.check_event() {
            self.apply_event(table, dialplan, event, owner_of);
        }
    }

    fn port_for(&self, table: &PortTable, cic: u32) -> Option<crate::list::PortHandle> {
        self.members.get(&cic).and_then(|ch| table.get(*ch))
    }

    fn apply_event(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        event: IsupEvent,
        owner_of: &dyn Fn(crate::port::OwnerId) -> Option<Arc<dyn PbxOwner>>,
    ) {
        match event {
            IsupEvent::Rsc { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    let mut p = h.lock();
                    p.flags.in_service = true;
                    p.flags.remotely_blocked = false;
                }
                self.link.send_rlc(cic);
            }
            IsupEvent::Grs { base_cic, range } => {
                self.for_range(table, base_cic, range, |p| p.flags.remotely_blocked = false);
                self.link.send_gra(base_cic, range);
            }
            IsupEvent::Cqm { base_cic, range } => {
                let status = self.query_range_status(table, base_cic, range);
                self.link.send_cqr(base_cic, range, &status);
            }
            IsupEvent::Cgb { base_cic, range } => {
                self.for_range(table, base_cic, range, |p| p.flags.remotely_blocked = true);
                self.link.send_cgba(base_cic, range);
            }
            IsupEvent::Cgu { base_cic, range } => {
                self.for_range(table, base_cic, range, |p| p.flags.remotely_blocked = false);
                self.link.send_cgua(base_cic, range);
            }
            IsupEvent::Blo { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().flags.remotely_blocked = true;
                }
            }
            IsupEvent::Bla { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().flags.locally_blocked = true;
                }
                self.link.send_bla(cic);
            }
            IsupEvent::Ubl { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().flags.remotely_blocked = false;
                }
            }
            IsupEvent::Uba { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().flags.locally_blocked = false;
                }
                self.link.send_uba(cic);
            }
            IsupEvent::Iam {
                cic,
                called_number,
                calling_number,
                calling_nai,
                charge_number,
                generic_address,
                generic_digits,
                jip,
            } => self.on_iam(
                table,
                dialplan,
                cic,
                called_number,
                calling_number,
                calling_nai,
                charge_number,
                generic_address,
                generic_digits,
                jip,
            ),
            IsupEvent::Cot { cic } => self.on_cot(table, dialplan, cic),
            IsupEvent::Ccr { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().ss7.looped_back = true;
                }
                self.link.send_lpa(cic);
            }
            IsupEvent::Acm { cic } | IsupEvent::Cpg { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    let mut p = h.lock();
                    p.pri_ss7_flags.proceeding = true;
                    if p.ss7.call_ref_ident != 0 {
                        p.pri_ss7_flags.alerting = true;
                    }
                    if let Some(owner) = p.primary_owner() {
                        if let Some(peer) = owner_of(owner) {
                            peer.queue_frame(ControlFrame::Alerting, None);
                        }
                    }
                }
            }
            IsupEvent::Con { cic } | IsupEvent::Anm { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    let mut p = h.lock();
                    p.state = crate::port::LineState::Up;
                    if let Some(owner) = p.primary_owner() {
                        if let Some(peer) = owner_of(owner) {
                            peer.queue_frame(ControlFrame::Answer, None);
                        }
                    } else {
                        p.real.needs.answer = true;
                    }
                }
            }
            IsupEvent::Rel { cic, cause } => {
                if let Some(h) = self.port_for(table, cic) {
                    let mut p = h.lock();
                    if let Some(owner) = p.primary_owner() {
                        if let Some(peer) = owner_of(owner) {
                            peer.queue_frame(ControlFrame::SoftHangup, None);
                        }
                    }
                    p.ss7.call_handle = None;
                    let _ = cause;
                }
                self.link.send_rel(cic, cause);
            }
            IsupEvent::Rlc { cic } => {
                if let Some(h) = self.port_for(table, cic) {
                    h.lock().ss7.call_handle = None;
                }
            }
        }
    }

    fn for_range(&self, table: &PortTable, base_cic: u32, range: u32, set: impl Fn(&mut Port)) {
        for cic in base_cic..base_cic + range {
            if let Some(h) = self.port_for(table, cic) {
                set(&mut h.lock());
            }
        }
    }

    fn query_range_status(&self, table: &PortTable, base_cic: u32, range: u32) -> Vec<u8> {
        (base_cic..base_cic + range)
            .map(|cic| {
                self.port_for(table, cic)
                    .map(|h| {
                        let p = h.lock();
                        let mut byte = 0u8;
                        if p.flags.locally_blocked { byte |= 1 << 0; }
                        if p.flags.remotely_blocked { byte |= 1 << 1; }
                        if p.flags.outgoing { byte |= 1 << 2; }
                        if p.primary_owner().is_some() && !p.flags.outgoing { byte |= 1 << 3; }
                        byte
                    })
                    .unwrap_or(0)
            })
            .collect()
    }

    /// IAM (spec §4.10 IAM row): copy called/calling per NAI and per-linkset
    /// prefix tables, stash charge/generic/JIP for dialplan retrieval, then
    /// either enter loopback pending COT or start the call directly.
    #[allow(clippy::too_many_arguments)]
    fn on_iam(
        &mut self,
        table: &PortTable,
        dialplan: &dyn Dialplan,
        cic: u32,
        called_number: String,
        calling_number: String,
        calling_nai: crate::port::TonPresentation,
        charge_number: Option<String>,
        generic_address: Option<String>,
        generic_digits: Option<String>,
        jip: Option<String>,
    ) {
        let Some(h) = self.port_for(table, cic) else { return };
        let calling_number = self.prefixes.apply(&calling_number, calling_nai, self.calling_dialplan);

        {
            let mut p = h.lock();
            p.ss7.cic = cic;
            p.ss7.charge_number = charge_number;
            p.ss7.generic_address = generic_address;
            p.ss7.generic_digits = generic_digits;
            p.ss7.jip = jip;
            p.strings.callerid.number = calling_number;
            p.strings.callerid.ton = Some(calling_nai);
            p.strings.dialed_number = called_number;
        }

        if self.cot_check_required {
            let mut p = h.lock();
            p.ss7.looped_back = true;
            let _ = p.device.loopback(true);
            return;
        }

        self.start_call(&h, dialplan, cic);
    }

    /// COT (spec §4.10 COT row): exit loopback, start the call.
    fn on_cot(&mut self, table: &PortTable, dialplan: &dyn Dialplan, cic: u32) {
        let Some(h) = self.port_for(table, cic) else { return };
        {
            let mut p = h.lock();
            p.ss7.looped_back = false;
            let _ = p.device.loopback(false);
        }
        self.start_call(&h, dialplan, cic);
    }

    /// Match the stashed called number against the dialplan and either
    /// dispatch to the PBX or release with UNALLOCATED (spec §4.10 "start
    /// the call").
    fn start_call(&mut self, h: &PortHandle, dialplan: &dyn Dialplan, cic: u32) {
        let (context, called_number, port_channel) = {
            let p = h.lock();
            (p.strings.context.clone(), p.strings.dialed_number.clone(), p.channel)
        };
        if !dialplan.exists(&context, &called_number) {
            self.link.send_rel(cic, CAUSE_UNALLOCATED);
            return;
        }
        h.lock().state = crate::port::LineState::Ringing;
        dialplan.run(&context, &called_number, port_channel as OwnerId);
    }

    /// Periodic group-RSC sweep (spec §4.10 "on UP, group-RSC the linkset
    /// in 31-CIC windows grouped by DPC").
    pub fn run_periodic_group_reset(&mut self, interval: Duration) {
        if self.last_group_reset.elapsed() < interval {
            return;
        }
        self.last_group_reset = Instant::now();
        let mut cics: Vec<u32> = self.members.keys().copied().collect();
        cics.sort_unstable();
        for window in cics.chunks(31) {
            if let (Some(&first), Some(&last)) = (window.first(), window.last()) {
                self.link.send_rsc(first);
                let _ = last;
            }
        }
    }
}

pub fn run(
    controller: &mut Ss7Controller,
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

    struct FakeIsup {
        events: Mutex<Vec<IsupEvent>>,
        sent_lpa: Mutex<Vec<u32>>,
    }

    impl IsupLink for FakeIsup {
        fn check_event(&mut self) -> Option<IsupEvent> {
            self.events.get_mut().unwrap().pop()
        }
        fn send_rlc(&mut self, _cic: u32) {}
        fn send_gra(&mut self, _base_cic: u32, _range: u32) {}
        fn send_cqr(&mut self, _base_cic: u32, _range: u32, _status: &[u8]) {}
        fn send_cgba(&mut self, _base_cic: u32, _range: u32) {}
        fn send_cgua(&mut self, _base_cic: u32, _range: u32) {}
        fn send_bla(&mut self, _cic: u32) {}
        fn send_uba(&mut self, _cic: u32) {}
        fn send_lpa(&mut self, cic: u32) {
            self.sent_lpa.lock().unwrap().push(cic);
        }
        fn send_rel(&mut self, _cic: u32, _cause: u8) {}
        fn send_rsc(&mut self, _cic: u32) {}
    }

    fn mkport(channel: u32) -> Port {
        Port::new(channel, 1, Law::Mu, SignalingVariant::Ss7, Box::new(FakeDevice::new()))
    }

    fn iam_event(called: &str) -> IsupEvent {
        IsupEvent::Iam {
            cic: 10,
            called_number: called.to_string(),
            calling_number: "5551234".to_string(),
            calling_nai: crate::port::TonPresentation::National,
            charge_number: None,
            generic_address: None,
            generic_digits: None,
            jip: None,
        }
    }

    #[test]
    fn iam_with_cot_required_enters_loopback() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().strings.context = "default".to_string();
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![iam_event("100")]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        ctrl.cot_check_required = true;
        let dp = crate::testkit::StubDialplan::new().add_exact("default", "100");
        ctrl.tick(&table, &dp, &|_| None);
        let p = handle.lock();
        assert!(p.ss7.looped_back);
        assert_eq!(p.strings.callerid.number, "5551234");
        assert_eq!(p.strings.dialed_number, "100");
    }

    #[test]
    fn iam_without_cot_required_starts_the_call_immediately() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().strings.context = "default".to_string();
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![iam_event("100")]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        let dp = crate::testkit::StubDialplan::new().add_exact("default", "100");
        ctrl.tick(&table, &dp, &|_| None);
        assert_eq!(handle.lock().state, crate::port::LineState::Ringing);
    }

    #[test]
    fn iam_on_unmatched_extension_releases_with_unallocated() {
        let table = PortTable::new();
        table.insert(mkport(1));
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![iam_event("999")]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        let dp = crate::testkit::StubDialplan::new();
        ctrl.tick(&table, &dp, &|_| None);
        assert_eq!(table.get(1).unwrap().lock().state, crate::port::LineState::Down);
    }

    #[test]
    fn cot_exits_loopback_and_starts_ringing() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        {
            let mut p = handle.lock();
            p.ss7.looped_back = true;
            p.strings.context = "default".to_string();
            p.strings.dialed_number = "100".to_string();
        }
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![IsupEvent::Cot { cic: 10 }]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        let dp = crate::testkit::StubDialplan::new().add_exact("default", "100");
        ctrl.tick(&table, &dp, &|_| None);
        let p = handle.lock();
        assert!(!p.ss7.looped_back);
        assert_eq!(p.state, crate::port::LineState::Ringing);
    }

    #[test]
    fn ccr_enters_loopback_and_replies_lpa() {
        let table = PortTable::new();
        table.insert(mkport(1));
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![IsupEvent::Ccr { cic: 10 }]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        let dp = crate::testkit::StubDialplan::new();
        ctrl.tick(&table, &dp, &|_| None);
        assert_eq!(table.get(1).unwrap().lock().ss7.looped_back, true);
    }

    #[test]
    fn rel_soft_hangs_up_and_clears_call_handle() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        handle.lock().ss7.call_handle = Some(5);
        let mut members = HashMap::new();
        members.insert(10u32, 1u32);
        let link = Box::new(FakeIsup { events: Mutex::new(vec![IsupEvent::Rel { cic: 10, cause: 16 }]), sent_lpa: Mutex::new(Vec::new()) });
        let mut ctrl = Ss7Controller::new("ls1", link, members);
        let dp = crate::testkit::StubDialplan::new();
        ctrl.tick(&table, &dp, &|_| None);
        assert!(handle.lock().ss7.call_handle.is_none());
    }
}
