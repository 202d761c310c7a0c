// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monitor thread (spec §4.11): the per-second idle-Port poll loop that
//! feeds hardware events into the analog signaling engine, spills MWI
//! notifications, and drives the simple-switch digit collectors.
//!
//! Mirrors `hdds`'s `io_thread` shape (one `iomux_wait` call per tick
//! followed by per-connection dispatch) but over hardware FDs instead of
//! TCP sockets, since analog Ports have no event-driven library underneath
//! them to push events at us.

use crate::collab::PbxOwner;
use crate::config::constants::MONITOR_TICK;
use crate::config::runtime::RuntimeConfig;
use crate::digits::{DigitCollector, Outcome};
use crate::hw::iomux_wait;
use crate::list::PortTable;
use crate::port::{LineState, OwnerId, Port, SignalingVariant};
use crate::signaling;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Per-channel simple-switch worker state the monitor owns outside the
/// `Port` itself, since a collector only exists while a call is being
/// dialed (spec §4.8 "a per-Port worker").
#[derive(Default)]
pub struct SwitchWorkers {
    collectors: HashMap<u32, DigitCollector>,
}

impl SwitchWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    fn collector_for<'a>(&'a mut self, channel: u32, context: &str) -> &'a mut DigitCollector {
        self.collectors
            .entry(channel)
            .or_insert_with(|| DigitCollector::new(context))
    }

    fn drop_collector(&mut self, channel: u32) {
        self.collectors.remove(&channel);
    }
}

/// MWI mailbox poll cursor: one mailbox is sampled per monitor tick (spec
/// §4.11 "MWI mailbox polling/spill generation") rather than polling every
/// mailbox every second.
pub struct MwiCursor {
    order: Vec<u32>,
    next: usize,
    last_state: HashMap<u32, bool>,
}

impl MwiCursor {
    pub fn new() -> Self {
        MwiCursor { order: Vec::new(), next: 0, last_state: HashMap::new() }
    }

    fn refresh_membership(&mut self, channels: &[u32]) {
        if self.order != channels {
            self.order = channels.to_vec();
            self.next %= self.order.len().max(1);
        }
    }

    /// Returns the next channel due for a mailbox check, advancing the
    /// cursor round-robin.
    fn next_channel(&mut self) -> Option<u32> {
        if self.order.is_empty() {
            return None;
        }
        let ch = self.order[self.next];
        self.next = (self.next + 1) % self.order.len();
        Some(ch)
    }
}

/// Mailbox-state query the daemon's message-store integration implements
/// (spec §4.11 "MWI mailbox polling"). Kept minimal and separate from
/// [`crate::collab::PbxOwner`] since it is queried by mailbox name, not by
/// an active call's owner.
pub trait MailboxStore: Send + Sync {
    fn has_new_messages(&self, mailbox: &str) -> bool;
}

pub struct Monitor {
    pub config: Arc<RuntimeConfig>,
    pub workers: SwitchWorkers,
    pub mwi: MwiCursor,
}

impl Monitor {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Monitor { config, workers: SwitchWorkers::new(), mwi: MwiCursor::new() }
    }

    /// One monitor pass: poll all idle FDs, dispatch hardware events into
    /// the signaling engine, feed digit collectors, and sample one mailbox
    /// (spec §4.11 steps 1-4).
    pub fn tick(
        &mut self,
        table: &PortTable,
        owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
        dialplan: &dyn crate::collab::Dialplan,
        mailbox_store: Option<&dyn MailboxStore>,
    ) {
        let idle: Vec<_> = table
            .all()
            .into_iter()
            .filter(|h| {
                let p = h.lock();
                !p.signalling.is_digital() && !p.radio
            })
            .collect();

        let fds: Vec<i32> = idle.iter().map(|h| h.lock().device.raw_fd()).collect();
        let ready = match iomux_wait(&fds, MONITOR_TICK) {
            Ok(r) => r,
            Err(e) => {
                warn!("monitor iomux_wait failed: {e}");
                return;
            }
        };

        for (handle, poll_ready) in idle.iter().zip(ready.iter()) {
            if !poll_ready.read && !poll_ready.sig_event {
                continue;
            }
            let event = {
                let mut p = handle.lock();
                match p.device.get_event() {
                    Ok(ev) => ev,
                    Err(e) => {
                        debug!("get_event on channel {} failed: {e}", p.channel);
                        continue;
                    }
                }
            };
            {
                let mut p = handle.lock();
                signaling::handle_event(&mut p, table, event, owner_of);
            }
            self.drive_digit_collection(handle, dialplan);
        }

        self.poll_one_mailbox(table, mailbox_store, owner_of);
    }

    fn drive_digit_collection(&mut self, handle: &crate::list::PortHandle, dialplan: &dyn crate::collab::Dialplan) {
        let mut p = handle.lock();
        if p.state != LineState::Dialing && p.state != LineState::DialingOffhook {
            self.workers.drop_collector(p.channel);
            return;
        }
        if p.strings.dial_dest_buffer.is_empty() {
            return;
        }
        let digit = p.strings.dial_dest_buffer.remove(0);
        let context = p.strings.context.clone();
        let channel = p.channel;
        drop(p);

        let collector = self.workers.collector_for(channel, &context);
        match collector.on_digit(digit, dialplan) {
            Outcome::Dispatch | Outcome::NoMatch => self.workers.drop_collector(channel),
            Outcome::FeatureHandled | Outcome::Collecting | Outcome::TimedOut => {}
        }
    }

    fn poll_one_mailbox(
        &mut self,
        table: &PortTable,
        mailbox_store: Option<&dyn MailboxStore>,
        owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
    ) {
        let Some(store) = mailbox_store else { return };
        let channels = table.channels();
        self.mwi.refresh_membership(&channels);
        let Some(channel) = self.mwi.next_channel() else { return };
        let Some(handle) = table.get(channel) else { return };

        let mailbox = {
            let p = handle.lock();
            p.strings.mailbox.clone()
        };
        let Some(mailbox) = mailbox else { return };
        let has_new = store.has_new_messages(&mailbox);
        let changed = self.mwi.last_state.get(&channel).copied() != Some(has_new);
        self.mwi.last_state.insert(channel, has_new);
        if !changed {
            return;
        }

        let mut p = handle.lock();
        let count = if has_new { 1 } else { 0 };
        if let Err(e) = p.device.vmwi(count) {
            warn!("vmwi on channel {channel} failed: {e}");
        }
        if p.flags.mwi_monitor_active {
            let _ = p.device.on_hook_transfer(crate::config::constants::MWI_ONHOOK_TRANSFER.as_millis() as u32);
        }
        if let Some(owner) = p.primary_owner().and_then(&owner_of) {
            owner.queue_frame(crate::collab::ControlFrame::Unhold, None);
        }
    }
}

pub fn run(
    monitor: &mut Monitor,
    table: &PortTable,
    owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
    dialplan: &dyn crate::collab::Dialplan,
    mailbox_store: Option<&dyn MailboxStore>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let start = Instant::now();
        monitor.tick(table, owner_of, dialplan, mailbox_store);
        let elapsed = start.elapsed();
        if elapsed < MONITOR_TICK {
            std::thread::sleep(MONITOR_TICK - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigDocument;
    use crate::hw::Law;
    use crate::testkit::{FakeDevice, StubDialplan};

    struct FakeMailbox(bool);
    impl MailboxStore for FakeMailbox {
        fn has_new_messages(&self, _mailbox: &str) -> bool {
            self.0
        }
    }

    fn mkport(channel: u32) -> Port {
        let mut p = Port::new(channel, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()));
        p.flags.in_service = true;
        p
    }

    #[test]
    fn mwi_cursor_round_robins_across_channels() {
        let mut cursor = MwiCursor::new();
        cursor.refresh_membership(&[1, 2, 3]);
        let seen = [cursor.next_channel(), cursor.next_channel(), cursor.next_channel(), cursor.next_channel()];
        assert_eq!(seen, [Some(1), Some(2), Some(3), Some(1)]);
    }

    #[test]
    fn mailbox_change_spills_vmwi_and_updates_cached_state() {
        let table = PortTable::new();
        let mut p = mkport(1);
        p.strings.mailbox = Some("1234@default".into());
        table.insert(p);

        let rc = Arc::new(RuntimeConfig::from_document(ConfigDocument::default()));
        let mut mon = Monitor::new(rc);
        let store = FakeMailbox(true);
        mon.poll_one_mailbox(&table, Some(&store), &|_| None);
        assert_eq!(mon.mwi.last_state.get(&1), Some(&true));
    }

    #[test]
    fn digit_collection_drops_collector_once_state_leaves_dialing() {
        let table = PortTable::new();
        let mut p = mkport(1);
        p.state = LineState::Up;
        let handle = table.insert(p);

        let rc = Arc::new(RuntimeConfig::from_document(ConfigDocument::default()));
        let mut mon = Monitor::new(rc);
        mon.workers.collector_for(1, "default");
        let dp = StubDialplan::new();
        mon.drive_digit_collection(&handle, &dp);
        assert!(mon.workers.collectors.get(&1).is_none());
    }
}
