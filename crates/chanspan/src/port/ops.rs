// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The Port operation table (spec §4.2): `request`, `call`, `answer`,
//! `hangup`, `read`, `write`, `indicate`, `bridge`, `fixup`, `setoption`,
//! `send_text`.
//!
//! `hangup` itself lives in [`super::hangup`]; this module re-exports it
//! alongside the rest of the table so callers `use port::ops::*` once.

use crate::collab::{ControlFrame, PbxOwner};
use crate::conference;
use crate::error::{Error, Result};
use crate::hw::{DialOp, HookOp};
use crate::list::PortTable;
use crate::port::{LineState, OwnerId, Port, SubIndex};

pub use super::hangup::hangup;

/// `request`: hand out the next free Port in `group`, round-robin (spec
/// §4.2 `request`, backed by [`PortTable::request_in_group`]).
pub fn request(table: &PortTable, group: u32, group_of: impl Fn(&Port) -> u32) -> Result<crate::list::PortHandle> {
    table
        .request_in_group(group, group_of)
        .ok_or(Error::ResourceExhausted(crate::error::ResourceKind::Busy))
}

/// `call`: originate an outbound call on `sub` (spec §4.2 `call`).
///
/// Goes off-hook (FXS) or seizes the loop (FXO/E&M) per the Port's
/// signalling, queues the dial string, and marks the sub-channel dialing.
pub fn call(port: &mut Port, sub: SubIndex, owner: OwnerId, dialstring: &str) -> Result<()> {
    if port.sub(sub).owner.is_some() {
        return Err(Error::ResourceExhausted(crate::error::ResourceKind::Busy));
    }
    port.sub_mut(sub).owner = Some(owner);
    port.flags.outgoing = true;
    port.strings.final_dial_string = dialstring.to_string();

    if port.signalling.is_fxo() {
        port.device.hook(HookOp::Off)?;
    }
    port.device.dial(DialOp::Replace, dialstring)?;
    port.state = LineState::Dialing;
    Ok(())
}

/// `answer`: accept an offered call on `sub` (spec §4.2 `answer`).
pub fn answer(port: &mut Port, sub: SubIndex) -> Result<()> {
    if port.signalling.is_fxs() {
        port.device.hook(HookOp::Off)?;
    }
    port.flags.confirm_answer = false;
    port.numeric.answered_at = Some(std::time::Instant::now());
    port.state = LineState::Up;
    if sub == SubIndex::Real {
        port.sub_mut(sub).needs.answer = false;
    }
    Ok(())
}

/// `read`: drain one pending control need as a [`ControlFrame`], if any, in
/// the fixed priority order spec §4.2 `read` defines (ring, busy,
/// congestion, caller-id, answer, flash, hold, unhold). Returns `None` when
/// nothing is pending — the caller should then read a media frame instead.
pub fn read_pending_frame(port: &mut Port, sub: SubIndex) -> Option<ControlFrame> {
    let needs = &mut port.sub_mut(sub).needs;
    if needs.ring {
        needs.ring = false;
        return Some(ControlFrame::Ring);
    }
    if needs.busy {
        needs.busy = false;
        return Some(ControlFrame::Busy);
    }
    if needs.congestion {
        needs.congestion = false;
        return Some(ControlFrame::Congestion);
    }
    if needs.caller_id {
        needs.caller_id = false;
        return None;
    }
    if needs.answer {
        needs.answer = false;
        return Some(ControlFrame::Answer);
    }
    if needs.flash {
        needs.flash = false;
        return Some(ControlFrame::Flash);
    }
    if needs.hold {
        needs.hold = false;
        return Some(ControlFrame::Hold);
    }
    if needs.unhold {
        needs.unhold = false;
        return Some(ControlFrame::Unhold);
    }
    None
}

/// `write`: hand a media frame to the device for `sub`, law-converting if
/// the sub-channel is in linear mode (spec §4.2 `write`).
pub fn write(port: &mut Port, sub: SubIndex, frame: &[u8]) -> Result<usize> {
    let law = port.sub(sub).law;
    if port.sub(sub).linear_mode {
        let mut encoded = Vec::with_capacity(frame.len() / 2);
        for chunk in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            encoded.push(law.encode(sample));
        }
        port.device.write(&encoded)
    } else {
        port.device.write(frame)
    }
}

/// `indicate`: either queue `frame` to the sub-channel's owner if one
/// exists, or mark it pending on the sub-channel's needs for the next
/// `read` (spec §4.2 `indicate`).
pub fn indicate(port: &mut Port, sub: SubIndex, frame: ControlFrame, owner: Option<&dyn PbxOwner>) {
    if let Some(owner) = owner {
        owner.queue_frame(frame, Some(&port.strings.mohsuggest));
        return;
    }
    let needs = &mut port.sub_mut(sub).needs;
    match frame {
        ControlFrame::Ring => needs.ring = true,
        ControlFrame::Busy => needs.busy = true,
        ControlFrame::Congestion => needs.congestion = true,
        ControlFrame::Answer => needs.answer = true,
        ControlFrame::Hold => needs.hold = true,
        ControlFrame::Unhold => needs.unhold = true,
        _ => {}
    }
}

/// `bridge`: attempt a native TDM bridge between two Ports' `REAL`
/// sub-channels, falling through to PBX-level bridging when hardware can't
/// do it (spec §4.4). Delegates the actual pairing/lock-ordering to
/// [`conference::bridge`].
pub fn bridge(a: &mut Port, b: &mut Port, table: &PortTable) -> bool {
    conference::bridge::attempt_native_bridge(a, b, table)
}

/// `fixup`: reassign `owner` to `new_sub` after a succession has already
/// moved the underlying state (spec §4.2 `fixup`). The succession itself
/// (the state move) happens in [`super::hangup`]; this only updates the
/// owner pointer and notifies it.
pub fn fixup(port: &mut Port, new_sub: SubIndex, owner: OwnerId, peer: Option<&dyn PbxOwner>) {
    port.sub_mut(new_sub).owner = Some(owner);
    if let Some(peer) = peer {
        peer.fixup_notify(new_sub);
    }
}

/// `setoption`: per-call attribute set that doesn't belong in `ChannelConfig`
/// because it only makes sense once a call exists (spec §4.2 `setoption`).
pub fn setoption(port: &mut Port, name: &str, value: &str) -> Result<()> {
    match name {
        "echocan" => port.flags.echo_cancel_on = value != "0" && !value.eq_ignore_ascii_case("off"),
        "dtmf_relax" => port.numeric.dtmf_relax = value != "0",
        "busydetect" => port.flags.busy_detect = value != "0",
        "transfer" => port.flags.transfer_allowed = value != "0",
        other => return Err(Error::ConfigFatal(format!("unknown setoption key: {other}"))),
    }
    Ok(())
}

/// `send_text`: push a Caller-ID/TDD style out-of-band message (spec §4.2
/// `send_text`). Encoding is delegated to a [`crate::collab::CidFskCodec`]
/// collaborator; this function only decides whether the sub-channel is in a
/// state where out-of-band injection is legal.
pub fn send_text(port: &Port, sub: SubIndex) -> Result<()> {
    if port.sub(sub).owner.is_none() {
        return Err(Error::ProtocolFatal { channel: port.channel, reason: "send_text with no owner".into() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::Law;
    use crate::port::SignalingVariant;
    use crate::testkit::FakeDevice;

    fn mkport() -> Port {
        Port::new(1, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()))
    }

    #[test]
    fn call_marks_outgoing_and_dials() {
        let mut port = mkport();
        call(&mut port, SubIndex::Real, 7, "5551212").unwrap();
        assert!(port.flags.outgoing);
        assert_eq!(port.real.owner, Some(7));
        assert_eq!(port.state, LineState::Dialing);
    }

    #[test]
    fn call_rejects_already_owned_subchannel() {
        let mut port = mkport();
        port.real.owner = Some(1);
        let err = call(&mut port, SubIndex::Real, 2, "123").unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
    }

    #[test]
    fn answer_goes_off_hook_and_sets_up_state() {
        let mut port = mkport();
        answer(&mut port, SubIndex::Real).unwrap();
        assert_eq!(port.state, LineState::Up);
        assert!(port.numeric.answered_at.is_some());
    }

    #[test]
    fn read_pending_frame_respects_priority_order() {
        let mut port = mkport();
        port.real.needs.busy = true;
        port.real.needs.ring = true;
        assert_eq!(read_pending_frame(&mut port, SubIndex::Real), Some(ControlFrame::Ring));
        assert_eq!(read_pending_frame(&mut port, SubIndex::Real), Some(ControlFrame::Busy));
        assert_eq!(read_pending_frame(&mut port, SubIndex::Real), None);
    }

    #[test]
    fn setoption_rejects_unknown_key() {
        let mut port = mkport();
        assert!(setoption(&mut port, "bogus", "1").is_err());
        assert!(setoption(&mut port, "busydetect", "1").is_ok());
        assert!(port.flags.busy_detect);
    }
}
