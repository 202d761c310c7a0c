// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native TDM bridge (spec §4.4): pair two Ports' `REAL` sub-channels
//! directly in hardware instead of looping audio through the PBX core.

use super::conf_add;
use crate::hw::ConfMode;
use crate::list::PortTable;
use crate::port::{Port, SubIndex};

/// Preconditions for a native pairing (spec §4.4 "Eligibility"): both
/// sides must be plain two-party calls on matching law, with no three-way
/// leg and no slave/master relationship already engaged.
fn eligible(a: &Port, b: &Port) -> bool {
    a.law == b.law
        && !a.real.in_three_way
        && !b.real.in_three_way
        && !a.callwait.is_allocated()
        && !b.callwait.is_allocated()
        && !a.threeway.is_allocated()
        && !b.threeway.is_allocated()
        && a.master.is_none()
        && b.master.is_none()
        && a.slaves.is_empty()
        && b.slaves.is_empty()
}

/// Attempt to pair `a` and `b` natively. Returns `false` (and leaves both
/// Ports untouched) when the pairing isn't eligible, in which case the
/// caller falls back to PBX-core audio bridging (spec §4.4).
///
/// Echo cancellation is turned off on both legs while natively paired —
/// the device no longer sees a round trip through software that would
/// need cancelling (spec §4.4 "native bridge disables echo cancel").
pub fn attempt_native_bridge(a: &mut Port, b: &mut Port, table: &PortTable) -> bool {
    if !eligible(a, b) {
        return false;
    }

    conf_add(
        a,
        SubIndex::Real,
        crate::hw::ConfDescriptor { mode: ConfMode::RealPseudoMixer, confno: 0, device_channel: b.channel },
    );
    conf_add(
        b,
        SubIndex::Real,
        crate::hw::ConfDescriptor { mode: ConfMode::RealPseudoMixer, confno: 0, device_channel: a.channel },
    );
    a.flags.echo_cancel_bridged = true;
    b.flags.echo_cancel_bridged = true;
    let _ = a.device.echo_cancel(crate::hw::EchoCancelRequest::Disable);
    let _ = b.device.echo_cancel(crate::hw::EchoCancelRequest::Disable);

    // Neither side holds a conference number in pairwise mode; release any
    // stale allocation left from a prior multi-party call.
    let _ = table;
    a.confno = None;
    b.confno = None;
    true
}

/// Tear down a native pairing, restoring echo cancellation per each Port's
/// own configuration (spec §4.4 "unbridge").
pub fn release_native_bridge(a: &mut Port, b: &mut Port, a_wants_echo_cancel: bool, b_wants_echo_cancel: bool) {
    conf_add(a, SubIndex::Real, crate::hw::ConfDescriptor::default());
    conf_add(b, SubIndex::Real, crate::hw::ConfDescriptor::default());
    a.flags.echo_cancel_bridged = false;
    b.flags.echo_cancel_bridged = false;
    if a_wants_echo_cancel {
        let _ = a.device.echo_cancel(crate::hw::EchoCancelRequest::Enable {
            taps: a.numeric.echo_cancel_taps,
            params: a.numeric.echo_cancel_params.clone(),
        });
    }
    if b_wants_echo_cancel {
        let _ = b.device.echo_cancel(crate::hw::EchoCancelRequest::Enable {
            taps: b.numeric.echo_cancel_taps,
            params: b.numeric.echo_cancel_params.clone(),
        });
    }
}
