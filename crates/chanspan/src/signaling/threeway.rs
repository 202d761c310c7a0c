// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Three-way calling and blind transfer (spec §4.7).

use crate::collab::{ControlFrame, PbxOwner};
use crate::conference;
use crate::hw::EchoCancelRequest;
use crate::list::PortTable;
use crate::port::{Port, SubIndex};
use std::time::Instant;

/// Handle a wink/flash on `REAL` (spec §4.7 steps 1-3).
pub fn on_wink_flash(port: &mut Port, table: &PortTable, owner: Option<&dyn PbxOwner>) {
    port.numeric.last_flash = Some(Instant::now());

    if port.callwait.is_allocated() {
        swap_real_callwait(port, owner);
        conference::update(port, table);
        return;
    }

    if !port.threeway.is_allocated() {
        if port.flags.three_way_calling && !port.in_conference {
            start_three_way(port);
        }
        conference::update(port, table);
        return;
    }

    // Three-way already building or built.
    if port.threeway.in_three_way {
        // Collapse: drop the most recently added leg, return to 1:1.
        port.threeway.release();
        port.real.in_three_way = false;
        conference::update(port, table);
        return;
    }

    if port.state == crate::port::LineState::Up {
        build_conference(port, owner);
    } else {
        port.threeway.release();
    }
    conference::update(port, table);
}

fn swap_real_callwait(port: &mut Port, owner: Option<&dyn PbxOwner>) {
    let real = port.real.clone();
    let real_index = port.real.index;
    port.real = { let mut cw = port.callwait.clone(); cw.index = real_index; cw };
    port.callwait = { let mut r = real; r.index = SubIndex::CallWait; r };

    if let Some(owner) = owner {
        owner.queue_frame(ControlFrame::Hold, Some(&port.strings.mohsuggest));
        owner.queue_frame(ControlFrame::Unhold, None);
    }
}

fn start_three_way(port: &mut Port) {
    port.threeway = crate::port::SubChannel::new(SubIndex::ThreeWay, port.law);
    port.threeway.fd = port.real.fd;
    let real_owner = port.real.owner;
    port.threeway.owner = real_owner;
    // REAL becomes the new secondary leg awaiting the transferee's number;
    // the caller spawns digit-collection on THREEWAY separately.
    port.flags.echo_cancel_on = false;
    let _ = port.device.echo_cancel(EchoCancelRequest::Disable);
    if port.flags.zap_transfer_callerid {
        port.strings.callwait_callerid = port.strings.callerid.clone();
    }
}

fn build_conference(port: &mut Port, owner: Option<&dyn PbxOwner>) {
    port.real.in_three_way = true;
    port.threeway.in_three_way = true;
    if let Some(owner) = owner {
        owner.queue_frame(ControlFrame::Unhold, None);
    }
}

/// Blind transfer (spec §4.7 `attempt_transfer`). Requires at least one of
/// `REAL`/`THREEWAY` to be bridged externally (modeled here simply as
/// having an owner); on success, releases `THREEWAY`. Returns `false` if
/// neither leg is bridged, in which case the caller should flag both for
/// hangup.
pub fn attempt_transfer(port: &mut Port) -> bool {
    let bridged = port.real.owner.is_some() || port.threeway.owner.is_some();
    if !bridged {
        return false;
    }
    port.threeway.release();
    port.real.in_three_way = false;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::Law;
    use crate::port::SignalingVariant;
    use crate::testkit::{FakeDevice, StubOwner};

    fn mkport() -> Port {
        let mut p = Port::new(1, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()));
        p.real.fd = Some(1);
        p.real.owner = Some(1);
        p.flags.three_way_calling = true;
        p
    }

    #[test]
    fn first_flash_with_no_callwait_allocates_three_way() {
        let table = PortTable::new();
        let mut port = mkport();
        on_wink_flash(&mut port, &table, None);
        assert!(port.threeway.is_allocated());
        assert!(!port.flags.echo_cancel_on);
    }

    #[test]
    fn second_flash_builds_conference_when_up() {
        let table = PortTable::new();
        let mut port = mkport();
        on_wink_flash(&mut port, &table, None);
        port.threeway.owner = Some(2);
        port.state = crate::port::LineState::Up;
        let owner = StubOwner::new(1);
        on_wink_flash(&mut port, &table, Some(&owner));
        assert!(port.real.in_three_way);
        assert!(port.threeway.in_three_way);
    }

    #[test]
    fn third_flash_collapses_three_way() {
        let table = PortTable::new();
        let mut port = mkport();
        on_wink_flash(&mut port, &table, None);
        port.state = crate::port::LineState::Up;
        on_wink_flash(&mut port, &table, None);
        on_wink_flash(&mut port, &table, None);
        assert!(!port.threeway.is_allocated());
        assert!(!port.real.in_three_way);
    }

    #[test]
    fn flash_with_callwait_swaps_and_signals_hold_unhold() {
        let table = PortTable::new();
        let mut port = mkport();
        port.callwait.fd = Some(9);
        port.callwait.owner = Some(3);
        let owner = StubOwner::new(1);
        on_wink_flash(&mut port, &table, Some(&owner));
        assert_eq!(port.real.owner, Some(3));
        assert_eq!(port.callwait.owner, Some(1));
        let frames = owner.frames_snapshot();
        assert_eq!(frames[0].0, ControlFrame::Hold);
        assert_eq!(frames[1].0, ControlFrame::Unhold);
    }

    #[test]
    fn attempt_transfer_fails_when_neither_leg_bridged() {
        let mut port = mkport();
        port.real.owner = None;
        assert!(!attempt_transfer(&mut port));
    }
}
