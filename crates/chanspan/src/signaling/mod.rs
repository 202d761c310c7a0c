// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Analog signaling engine (spec §4.6): translates raw hardware events into
//! Port-level transitions. PRI/SS7 B-channels never reach this engine —
//! their D-channel controller drives the Port directly.

pub mod threeway;

use crate::collab::{ControlFrame, PbxOwner};
use crate::conference;
use crate::hw::{EchoCancelRequest, HwEvent};
use crate::list::PortTable;
use crate::port::{LineState, OwnerId, PolarityState, Port, SubIndex};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BOUNCE_GUARD: Duration = Duration::from_secs(2);

/// Dispatch one hardware event for `port`'s `REAL` sub-channel (spec §4.6's
/// event table, FXS/FXO columns; digital lines never call this). `owner_of`
/// resolves any sub-channel's current owner, so this can drive the full
/// hangup/succession path (spec §4.5) for events that end a call outright.
pub fn handle_event(
    port: &mut Port,
    table: &PortTable,
    event: HwEvent,
    owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
) {
    let owner = port.primary_owner().and_then(owner_of);
    match event {
        HwEvent::RingOffhook => on_ring_offhook(port, table, owner.as_deref()),
        HwEvent::OnHook => on_hook(port, table, owner_of),
        HwEvent::WinkFlash => threeway::on_wink_flash(port, table, owner.as_deref()),
        HwEvent::PolarityReversal => on_polarity_reversal(port, owner.as_deref()),
        HwEvent::DialComplete => on_dial_complete(port),
        HwEvent::Alarm => port.flags.in_alarm = true,
        HwEvent::NoAlarm => port.flags.in_alarm = false,
        HwEvent::DtmfDown(d) => on_dtmf_down(port, d, owner.as_deref()),
        HwEvent::DtmfUp(d) => on_dtmf_up(port, d, owner.as_deref()),
        HwEvent::PulseDigit(d) => on_pulse_digit(port, d, owner.as_deref()),
        HwEvent::RingBegin | HwEvent::RingerOn | HwEvent::RingerOff | HwEvent::None => {}
    }
}

fn on_ring_offhook(port: &mut Port, table: &PortTable, owner: Option<&dyn PbxOwner>) {
    if port.signalling.is_fxo() {
        match port.state {
            LineState::Ringing => {
                let _ = port.device.echo_cancel(EchoCancelRequest::Enable {
                    taps: port.numeric.echo_cancel_taps,
                    params: port.numeric.echo_cancel_params.clone(),
                });
                let _ = port.device.echo_train(port.numeric.echo_training_ms);
                while let Some(dial) = port.deferred_dial_queue.pop_front() {
                    let _ = port.device.dial(crate::hw::DialOp::Append, &dial);
                }
                port.state = LineState::Up;
                if let Some(owner) = owner {
                    owner.queue_frame(ControlFrame::Answer, None);
                } else {
                    port.real.needs.answer = true;
                }
            }
            LineState::Down => port.state = LineState::PreRing,
            LineState::Up => {
                if let Some(owner) = owner {
                    owner.queue_frame(ControlFrame::Unhold, None);
                }
            }
            _ => {}
        }
        return;
    }

    // FXS: pick up a waiting call-wait leg, answer, and on an already-UP
    // line run the call-waiting dance (handled by wink/flash, not here).
    if port.callwait.is_allocated() && !port.callwait.in_three_way {
        let owner_id = port.callwait.owner;
        port.sub_mut(SubIndex::Real).owner = owner_id;
    }
    port.state = LineState::Up;
    conference::update(port, table);
}

fn on_hook(
    port: &mut Port,
    table: &PortTable,
    owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
) {
    if port.signalling.is_fxs() {
        let _ = port.device.echo_cancel(EchoCancelRequest::Disable);
        port.numeric.on_hook_since = Some(Instant::now());
        if port.pri.bearer_channel.is_some() {
            port.pri.bearer_channel = None;
        }
        conference::update(port, table);
        return;
    }

    // FXO: a rapid CW/three-way bounce (on-hook within 2s of the last flash)
    // means the user meant to hang up both legs, not just REAL.
    if let Some(last_flash) = port.numeric.last_flash {
        if last_flash.elapsed() < BOUNCE_GUARD {
            port.real.release();
            port.callwait.release();
            port.threeway.release();
            port.state = LineState::Down;
            conference::update(port, table);
            return;
        }
    }

    // Normal on-hook: run the full succession path (spec §4.5) so a waiting
    // call-wait or three-way leg gets promoted into REAL.
    crate::port::ops::hangup(port, table, SubIndex::Real, owner_of);
    port.state = LineState::Down;
}

fn on_polarity_reversal(port: &mut Port, owner: Option<&dyn PbxOwner>) {
    let now = Instant::now();
    let since_answer = port.numeric.answered_at.map(|t| now.duration_since(t));
    let delay = Duration::from_millis(port.numeric.polarity_on_answer_delay_ms as u64);

    if port.flags.answer_on_polarity_switch
        && matches!(port.state, LineState::Dialing | LineState::Ringing)
    {
        port.state = LineState::Up;
        if let Some(owner) = owner {
            owner.queue_frame(ControlFrame::Answer, None);
        }
    } else if port.flags.hangup_on_polarity_switch
        && matches!(port.state, LineState::Up | LineState::Ringing)
        && since_answer.map(|d| d >= delay).unwrap_or(true)
    {
        if let Some(owner) = owner {
            owner.queue_frame(ControlFrame::SoftHangup, None);
        }
        port.numeric.polarity_state = PolarityState::Reverse;
        return;
    }

    port.numeric.polarity_state = match port.numeric.polarity_state {
        PolarityState::Idle => PolarityState::Reverse,
        PolarityState::Reverse => PolarityState::Idle,
    };
    port.numeric.polarity_since = Some(now);
}

fn on_dial_complete(port: &mut Port) {
    let _ = port.device.echo_cancel(EchoCancelRequest::Enable {
        taps: port.numeric.echo_cancel_taps,
        params: port.numeric.echo_cancel_params.clone(),
    });
    port.state = if port.flags.outgoing { LineState::Up } else { LineState::DialingOffhook };
}

fn on_dtmf_down(port: &mut Port, digit: char, owner: Option<&dyn PbxOwner>) {
    let _ = port.device.conf_mute(true);
    if let Some(owner) = owner {
        owner.queue_dtmf(digit, true);
    }
}

fn on_dtmf_up(port: &mut Port, digit: char, owner: Option<&dyn PbxOwner>) {
    let _ = port.device.conf_mute(false);
    match digit {
        'A' | 'D' if port.flags.call_waiting_callerid => {
            // CAS/CW handshake acknowledgement, not PBX-visible DTMF.
        }
        'm' => { let _ = port.device.conf_mute(true); }
        'u' => { let _ = port.device.conf_mute(false); }
        _ => {
            if let Some(owner) = owner {
                if port.flags.confirm_answer {
                    owner.queue_frame(ControlFrame::Answer, None);
                    port.flags.confirm_answer = false;
                } else {
                    owner.queue_dtmf(digit, false);
                }
            }
        }
    }
}

fn on_pulse_digit(port: &mut Port, digit: char, owner: Option<&dyn PbxOwner>) {
    if port.signalling.is_pri() && port.flags.digital {
        // Overlap-dial-incoming PRI carries digits out-of-band; pulse
        // events on the bearer are absorbed silently (spec §4.6).
        return;
    }
    if let Some(owner) = owner {
        owner.queue_dtmf(digit, true);
        owner.queue_dtmf(digit, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::Law;
    use crate::port::SignalingVariant;
    use crate::testkit::{FakeDevice, StubOwner};

    fn mkport(variant: SignalingVariant) -> Port {
        Port::new(1, 1, Law::Mu, variant, Box::new(FakeDevice::new()))
    }

    fn owner_of_fn(owner: Arc<StubOwner>) -> impl Fn(OwnerId) -> Option<Arc<dyn PbxOwner>> {
        move |id| if id == owner.id { Some(owner.clone() as Arc<dyn PbxOwner>) } else { None }
    }

    fn no_owner(_: OwnerId) -> Option<Arc<dyn PbxOwner>> {
        None
    }

    #[test]
    fn fxo_ring_offhook_answers_and_engages_echo_cancel() {
        let table = PortTable::new();
        let mut port = mkport(SignalingVariant::FxoLs);
        port.state = LineState::Ringing;
        port.real.owner = Some(1);
        let owner = Arc::new(StubOwner::new(1));
        let owner_of = owner_of_fn(owner.clone());
        handle_event(&mut port, &table, HwEvent::RingOffhook, &owner_of);
        assert_eq!(port.state, LineState::Up);
        assert_eq!(owner.frames_snapshot(), vec![(ControlFrame::Answer, None)]);
    }

    #[test]
    fn polarity_reversal_answers_when_configured_and_dialing() {
        let table = PortTable::new();
        let mut port = mkport(SignalingVariant::FxsLs);
        let _ = table;
        port.flags.answer_on_polarity_switch = true;
        port.state = LineState::Dialing;
        port.real.owner = Some(1);
        let owner = Arc::new(StubOwner::new(1));
        let owner_of = owner_of_fn(owner.clone());
        handle_event(&mut port, &PortTable::new(), HwEvent::PolarityReversal, &owner_of);
        assert_eq!(port.state, LineState::Up);
    }

    #[test]
    fn polarity_reversal_hangs_up_after_delay_elapsed() {
        let mut port = mkport(SignalingVariant::FxsLs);
        port.flags.hangup_on_polarity_switch = true;
        port.state = LineState::Up;
        port.numeric.answered_at = Some(Instant::now() - Duration::from_millis(700));
        port.numeric.polarity_on_answer_delay_ms = 600;
        port.real.owner = Some(1);
        let owner = Arc::new(StubOwner::new(1));
        let owner_of = owner_of_fn(owner.clone());
        handle_event(&mut port, &PortTable::new(), HwEvent::PolarityReversal, &owner_of);
        assert_eq!(owner.frames_snapshot(), vec![(ControlFrame::SoftHangup, None)]);
    }

    #[test]
    fn fxo_onhook_within_bounce_guard_releases_all_subs() {
        let table = PortTable::new();
        let mut port = mkport(SignalingVariant::FxoLs);
        port.callwait.fd = Some(5);
        port.threeway.fd = Some(7);
        port.numeric.last_flash = Some(Instant::now());
        handle_event(&mut port, &table, HwEvent::OnHook, &no_owner);
        assert!(!port.callwait.is_allocated());
        assert!(!port.threeway.is_allocated());
    }

    #[test]
    fn fxo_onhook_outside_bounce_guard_runs_succession() {
        let table = PortTable::new();
        let mut port = mkport(SignalingVariant::FxoLs);
        port.real.fd = Some(1);
        port.real.owner = Some(1);
        port.callwait.fd = Some(2);
        port.callwait.owner = Some(2);
        handle_event(&mut port, &table, HwEvent::OnHook, &no_owner);
        assert_eq!(port.state, LineState::Down);
        assert_eq!(port.real.owner, Some(2));
        assert!(!port.callwait.is_allocated());
    }

    #[test]
    fn pulse_digit_absorbed_on_overlap_dial_pri_bearer() {
        let table = PortTable::new();
        let mut port = mkport(SignalingVariant::Pri);
        port.flags.digital = true;
        port.real.owner = Some(1);
        let owner = Arc::new(StubOwner::new(1));
        let owner_of = owner_of_fn(owner.clone());
        handle_event(&mut port, &table, HwEvent::PulseDigit('5'), &owner_of);
        assert!(owner.frames_snapshot().is_empty());
    }
}
