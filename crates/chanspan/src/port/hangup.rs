// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hangup and sub-channel succession (spec §4.5).
//!
//! When the owner of a sub-channel hangs up, another sub-channel on the same
//! Port may need to be promoted into its place (call-waiting answer,
//! three-way collapse). This module implements that succession and the
//! cleanup that follows it.

use crate::collab::{ControlFrame, PbxOwner};
use crate::conference;
use crate::hw::Law;
use crate::list::PortTable;
use crate::port::{Port, SubIndex};

/// Hang up `sub` on `port`, promoting a waiting sub-channel into its place
/// per spec §4.5's succession table, then resetting per-call state and
/// re-running the conference manager.
///
/// `peer_of` resolves a sub-channel's current owner, if any, to the
/// [`PbxOwner`] to notify of hold/unhold — the engine has no registry of
/// owners itself (spec §3 "Calls are owned externally"), so the caller
/// supplies the lookup.
pub fn hangup(
    port: &mut Port,
    table: &PortTable,
    sub: SubIndex,
    peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>,
) {
    match sub {
        SubIndex::Real => hangup_real(port, peer_of),
        SubIndex::CallWait => hangup_callwait(port, peer_of),
        SubIndex::ThreeWay => hangup_threeway(port, peer_of),
    }

    reset_and_settle(port, table);
}

fn hangup_real(port: &mut Port, peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>) {
    let callwait_allocated = port.callwait.is_allocated();
    let threeway_allocated = port.threeway.is_allocated();

    if callwait_allocated && threeway_allocated {
        if port.callwait.in_three_way {
            swap_subs(port, SubIndex::CallWait, SubIndex::Real);
        } else {
            // Three-way already collapsed back to two parties; THREEWAY now
            // holds the surviving leg.
            swap_subs(port, SubIndex::ThreeWay, SubIndex::Real);
        }
        notify_fixup(port, SubIndex::Real, peer_of);
        return;
    }

    if callwait_allocated {
        swap_subs(port, SubIndex::CallWait, SubIndex::Real);
        if port.state != crate::port::LineState::Up {
            port.real.needs.answer = true;
        }
        notify_fixup(port, SubIndex::Real, peer_of);
        send_unhold_to_bridged_peer(port, peer_of);
        return;
    }

    if threeway_allocated {
        swap_subs(port, SubIndex::ThreeWay, SubIndex::Real);
        notify_fixup(port, SubIndex::Real, peer_of);
        return;
    }

    port.real.release();
}

fn hangup_callwait(port: &mut Port, peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>) {
    if port.callwait.in_three_way {
        if let Some(owner) = port.real.owner {
            if let Some(peer) = peer_of(owner) {
                peer.queue_frame(ControlFrame::Hold, None);
            }
        }
        // The third party relocates from THREEWAY down into CALLWAIT's slot
        // so REAL keeps talking to whichever leg it was already bridged to.
        relocate(port, SubIndex::ThreeWay, SubIndex::CallWait);
        return;
    }
    port.callwait.release();
}

fn hangup_threeway(port: &mut Port, peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>) {
    if port.threeway.in_three_way {
        if let Some(owner) = port.callwait.owner {
            if let Some(peer) = peer_of(owner) {
                peer.queue_frame(ControlFrame::Hold, None);
            }
        }
        relocate(port, SubIndex::CallWait, SubIndex::ThreeWay);
        return;
    }
    port.threeway.release();
}

/// Move `from`'s full state into `to`, then clear `from` (spec §4.5 "swap").
fn swap_subs(port: &mut Port, from: SubIndex, to: SubIndex) {
    let moved = port.sub(from).clone();
    let index = port.sub(to).index;
    *port.sub_mut(to) = moved;
    port.sub_mut(to).index = index;
    port.sub_mut(from).release();
}

/// Like [`swap_subs`] but for the call-waiting<->three-way relocation path,
/// where the destination keeps receiving frames under its own identity.
fn relocate(port: &mut Port, from: SubIndex, to: SubIndex) {
    swap_subs(port, from, to);
}

fn notify_fixup(port: &mut Port, new_sub: SubIndex, peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>) {
    if let Some(owner) = port.sub(new_sub).owner {
        if let Some(peer) = peer_of(owner) {
            peer.fixup_notify(new_sub);
        }
    }
}

fn send_unhold_to_bridged_peer(port: &mut Port, peer_of: &dyn Fn(crate::port::OwnerId) -> Option<std::sync::Arc<dyn PbxOwner>>) {
    if let Some(owner) = port.real.owner {
        if let Some(peer) = peer_of(owner) {
            peer.queue_frame(ControlFrame::Unhold, None);
        }
    }
}

/// The common tail of every hangup path (spec §4.5 "After any succession,
/// reset... then run `update`").
fn reset_and_settle(port: &mut Port, table: &PortTable) {
    port.reset_after_succession();
    let _ = port.device.set_law(default_law_for(port));
    let _ = port.device.tone_detect(false, false);
    conference::update(port, table);
}

fn default_law_for(port: &Port) -> Law {
    port.law
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SignalingVariant;
    use crate::testkit::{FakeDevice, StubOwner};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn mkport() -> Port {
        Port::new(1, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()))
    }

    fn owners(pairs: Vec<(u64, Arc<StubOwner>)>) -> HashMap<u64, Arc<StubOwner>> {
        pairs.into_iter().collect()
    }

    #[test]
    fn hanging_up_real_with_callwait_promotes_it_and_requests_answer() {
        let table = PortTable::new();
        let mut port = mkport();
        port.callwait.fd = Some(5);
        port.callwait.owner = Some(2);
        port.state = crate::port::LineState::Ringing;
        port.real.owner = Some(1);

        let registry = owners(vec![(2, Arc::new(StubOwner::new(2)))]);
        let lookup = |id: u64| -> Option<Arc<dyn PbxOwner>> {
            registry.get(&id).cloned().map(|o| o as Arc<dyn PbxOwner>)
        };

        hangup(&mut port, &table, SubIndex::Real, &lookup);

        assert_eq!(port.real.owner, Some(2));
        assert!(port.real.needs.answer);
        assert!(!port.callwait.is_allocated());
    }

    #[test]
    fn hanging_up_real_with_three_way_collapses_to_surviving_leg() {
        let table = PortTable::new();
        let mut port = mkport();
        port.threeway.fd = Some(7);
        port.threeway.owner = Some(3);
        port.real.owner = Some(1);

        let lookup = |_id: u64| -> Option<Arc<dyn PbxOwner>> { None };
        hangup(&mut port, &table, SubIndex::Real, &lookup);

        assert_eq!(port.real.owner, Some(3));
        assert!(!port.threeway.is_allocated());
    }

    #[test]
    fn hanging_up_real_alone_releases_it() {
        let table = PortTable::new();
        let mut port = mkport();
        port.real.owner = Some(1);
        port.real.fd = Some(1);

        let lookup = |_id: u64| -> Option<Arc<dyn PbxOwner>> { None };
        hangup(&mut port, &table, SubIndex::Real, &lookup);

        assert!(!port.real.is_allocated());
        assert!(port.real.owner.is_none());
    }

    #[test]
    fn hanging_up_callwait_in_three_way_relocates_third_party_and_holds_peer() {
        let table = PortTable::new();
        let mut port = mkport();
        port.callwait.fd = Some(5);
        port.callwait.in_three_way = true;
        port.threeway.fd = Some(7);
        port.threeway.owner = Some(9);
        port.real.owner = Some(1);

        let owner = Arc::new(StubOwner::new(1));
        let registry = owners(vec![(1, owner.clone())]);
        let lookup = |id: u64| -> Option<Arc<dyn PbxOwner>> {
            registry.get(&id).cloned().map(|o| o as Arc<dyn PbxOwner>)
        };

        hangup(&mut port, &table, SubIndex::CallWait, &lookup);

        assert_eq!(port.callwait.owner, Some(9));
        assert!(!port.threeway.is_allocated());
        assert_eq!(owner.frames_snapshot(), vec![(ControlFrame::Hold, None)]);
    }

    #[test]
    fn succession_resets_per_call_flags_and_runs_conference_update() {
        let table = PortTable::new();
        let mut port = mkport();
        port.real.owner = Some(1);
        port.flags.confirm_answer = true;
        port.numeric.distinctive_ring_choice = Some(2);
        port.confno = Some(4);

        let lookup = |_id: u64| -> Option<Arc<dyn PbxOwner>> { None };
        hangup(&mut port, &table, SubIndex::Real, &lookup);

        assert!(!port.flags.confirm_answer);
        assert!(port.numeric.distinctive_ring_choice.is_none());
        // With no remaining sub-channels allocated, update() should have
        // released the conference number.
        assert!(port.confno.is_none());
    }
}
