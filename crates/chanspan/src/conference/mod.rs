// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conference manager (spec §4.3).
//!
//! Decides, for every Port and every change, which sub-channels participate
//! in which hardware conference. Supports a zero-copy "slave native" mode
//! when exactly one slave exists and laws match.

pub mod bridge;

use crate::hw::{ConfDescriptor, ConfMode};
use crate::list::PortTable;
use crate::port::{Port, SubIndex};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONFNO: AtomicU32 = AtomicU32::new(1);

fn allocate_confno() -> u32 {
    // The real driver lets the device assign a conference number on first
    // SETCONF with confno=0 (spec §5 "Shared hardware"); we model that
    // allocation locally since there is no device to ask.
    NEXT_CONFNO.fetch_add(1, Ordering::Relaxed)
}

/// Marshal a [`ConfDescriptor`] to the three-`i32` raw form the `SETCONF`
/// ioctl expects (spec §6.1). `mode` is packed as a small tag so the raw
/// form round-trips through `descriptor_from_raw`.
pub fn descriptor_to_raw(desc: ConfDescriptor) -> [i32; 3] {
    let tag = match desc.mode {
        ConfMode::None => 0,
        ConfMode::RealPseudoMixer => 1,
        ConfMode::Conference { talker, listener } => {
            2 | ((talker as i32) << 8) | ((listener as i32) << 9)
        }
        ConfMode::DigitalMonitor => 3,
    };
    [tag, desc.confno as i32, desc.device_channel as i32]
}

pub fn descriptor_from_raw(raw: [i32; 3]) -> ConfDescriptor {
    let tag = raw[0];
    let mode = match tag & 0xFF {
        0 => ConfMode::None,
        1 => ConfMode::RealPseudoMixer,
        2 => ConfMode::Conference {
            talker: (tag & (1 << 8)) != 0,
            listener: (tag & (1 << 9)) != 0,
        },
        3 => ConfMode::DigitalMonitor,
        _ => ConfMode::None,
    };
    ConfDescriptor { mode, confno: raw[1] as u32, device_channel: raw[2] as u32 }
}

fn talker_listener() -> ConfMode {
    ConfMode::Conference { talker: true, listener: true }
}

/// `conf_add`: idempotent — skips the ioctl when the requested descriptor
/// already matches the cached one (spec §4.3, §8 "no ioctl if the desired
/// descriptor equals the cached one").
fn conf_add(port: &mut Port, sub: SubIndex, desc: ConfDescriptor) {
    if port.sub(sub).curconf == desc {
        return;
    }
    let _ = port.device.conf_set(desc);
    port.sub_mut(sub).curconf = desc;
}

/// `conf_del`: refuses to detach from a conference that is not ours,
/// identified either by matching confno + talker bit, or by being the
/// digital-monitor target of our own channel (spec §4.3).
fn conf_del(port: &mut Port, sub: SubIndex) {
    let current = port.sub(sub).curconf;
    let ours = match current.mode {
        ConfMode::None => return,
        ConfMode::Conference { talker, .. } => {
            talker && Some(current.confno) == port.confno
        }
        ConfMode::DigitalMonitor => current.device_channel == port.channel,
        ConfMode::RealPseudoMixer => true,
    };
    if !ours {
        return;
    }
    conf_add(port, sub, ConfDescriptor::default());
}

fn ensure_confno(port: &mut Port) -> u32 {
    if let Some(n) = port.confno {
        return n;
    }
    let n = allocate_confno();
    port.confno = Some(n);
    n
}

fn needs_conf_count(port: &Port) -> usize {
    SubIndex::ALL
        .iter()
        .filter(|i| matches!(port.sub(**i).curconf.mode, ConfMode::Conference { .. }))
        .count()
}

/// The `update` algorithm (spec §4.3 steps 1-6).
///
/// `port_channel` is looked up fresh from `table` on every call so this can
/// run while other threads mutate sibling Ports; the caller must already
/// hold `port`'s own lock (spec §5 lock ordering).
pub fn update(port: &mut Port, table: &PortTable) {
    // Step 1: slave-native eligibility.
    let slave_native = port.slaves.len() == 1
        && SubIndex::ALL.iter().all(|i| !port.sub(*i).in_three_way)
        && {
            let slave_law = table
                .get(port.slaves[0])
                .map(|h| h.lock().law)
                .unwrap_or(port.law);
            slave_law == port.law
        };

    // Step 2: three-way attach/detach.
    let mut any_external_participant = false;
    for idx in SubIndex::ALL {
        if port.sub(idx).in_three_way {
            let confno = ensure_confno(port);
            conf_add(
                port,
                idx,
                ConfDescriptor { mode: talker_listener(), confno, device_channel: port.channel },
            );
        } else {
            conf_del(port, idx);
        }
    }

    // Step 3: slaves.
    let slaves = port.slaves.clone();
    for slave_channel in &slaves {
        let Some(slave_handle) = table.get(*slave_channel) else { continue };
        let mut slave = slave_handle.lock();
        if slave_native {
            conf_add(
                &mut slave,
                SubIndex::Real,
                ConfDescriptor {
                    mode: ConfMode::DigitalMonitor,
                    confno: 0,
                    device_channel: port.channel,
                },
            );
        } else {
            let confno = ensure_confno(port);
            conf_add(
                &mut slave,
                SubIndex::Real,
                ConfDescriptor { mode: talker_listener(), confno, device_channel: slave.channel },
            );
            any_external_participant = true;
        }
    }

    // Step 4: if this Port is itself marked "in conference" and REAL is not
    // in three-way, attach REAL too.
    if port.in_conference && !port.real.in_three_way {
        if slave_native {
            let slave_channel = port.slaves[0];
            conf_add(
                port,
                SubIndex::Real,
                ConfDescriptor { mode: ConfMode::DigitalMonitor, confno: 0, device_channel: slave_channel },
            );
        } else {
            let confno = ensure_confno(port);
            conf_add(
                port,
                SubIndex::Real,
                ConfDescriptor { mode: talker_listener(), confno, device_channel: port.channel },
            );
        }
    }

    // Step 5: attach to master's conference, if any.
    if let Some(master_channel) = port.master {
        if let Some(master_handle) = table.get(master_channel) {
            let master = master_handle.lock();
            let master_slave_native_with_us =
                master.slaves.len() == 1 && master.slaves[0] == port.channel && master.law == port.law;
            if master_slave_native_with_us {
                conf_add(
                    port,
                    SubIndex::Real,
                    ConfDescriptor { mode: ConfMode::DigitalMonitor, confno: 0, device_channel: master_channel },
                );
            } else if let Some(confno) = master.confno {
                conf_add(
                    port,
                    SubIndex::Real,
                    ConfDescriptor { mode: talker_listener(), confno, device_channel: port.channel },
                );
            }
        }
    }

    // Step 6: release the conference number once nothing references it.
    if needs_conf_count(port) == 0 && !any_external_participant && port.master.is_none() {
        port.confno = None;
    }
}

/// `save_conference` (spec §4.3): capture `REAL`'s descriptor ahead of a
/// Caller-ID spill that requires plain-conference mode.
pub fn save_conference(port: &mut Port) {
    port.saved_conference.saved = Some(port.real.curconf);
}

/// `restore_conference`: restore after the spill, unless it was CAS-CW (in
/// which case a mute-expiry timer supersedes — spec §4.3).
pub fn restore_conference(port: &mut Port, table: &PortTable, is_cas_cw: bool) {
    if is_cas_cw {
        port.saved_conference.cw_mute_expiry =
            Some(std::time::Instant::now() + crate::config::constants::CW_SPILL_MUTE_EXPIRY);
        return;
    }
    if let Some(desc) = port.saved_conference.saved.take() {
        conf_add(port, SubIndex::Real, desc);
    }
    update(port, table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::Law;
    use crate::port::SignalingVariant;
    use crate::testkit::FakeDevice;

    fn mkport(channel: u32) -> Port {
        Port::new(channel, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()))
    }

    #[test]
    fn three_way_allocates_conference_and_attaches_both_subs() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        {
            let mut p = handle.lock();
            p.real.in_three_way = true;
            p.threeway.fd = Some(10);
            p.threeway.in_three_way = true;
            update(&mut p, &table);
        }
        let p = handle.lock();
        assert!(p.confno.is_some());
        assert!(matches!(p.real.curconf.mode, ConfMode::Conference { talker: true, listener: true }));
        assert!(matches!(p.threeway.curconf.mode, ConfMode::Conference { .. }));
    }

    #[test]
    fn conf_add_is_idempotent_no_ioctl_when_unchanged() {
        let mut p = mkport(1);
        let desc = ConfDescriptor { mode: talker_listener(), confno: 5, device_channel: 1 };
        conf_add(&mut p, SubIndex::Real, desc);
        assert_eq!(p.real.curconf, desc);
        // Second call with the same descriptor must be a no-op; nothing to
        // observe from outside but that it doesn't panic and leaves curconf
        // untouched.
        conf_add(&mut p, SubIndex::Real, desc);
        assert_eq!(p.real.curconf, desc);
    }

    #[test]
    fn slave_native_mode_engages_with_single_matching_slave() {
        let table = PortTable::new();
        let master_handle = table.insert(mkport(1));
        let slave_handle = table.insert(mkport(2));
        master_handle.lock().slaves.push(2);
        slave_handle.lock().real.fd = Some(20);

        {
            let mut m = master_handle.lock();
            m.in_conference = true;
            update(&mut m, &table);
        }
        let slave = slave_handle.lock();
        assert!(matches!(slave.real.curconf.mode, ConfMode::DigitalMonitor));
        assert_eq!(slave.real.curconf.device_channel, 1);
    }

    #[test]
    fn confno_released_when_no_participants_remain() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        {
            let mut p = handle.lock();
            p.confno = Some(9);
            update(&mut p, &table);
        }
        assert!(handle.lock().confno.is_none());
    }
}
