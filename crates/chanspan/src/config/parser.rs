// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hand-written two-pass line parser for the engine's config surface.
//!
//! No `serde` here on purpose: the original driver's config format is an
//! INI-like file with section-scoped "sticky" key/value defaults and
//! channel-range headers (`channel => 1-4,7`), not a self-describing schema.
//! `hdds`'s own `qos-loaders` feature hand-walks XML nodes before building
//! typed QoS structs for the same reason; this mirrors that approach applied
//! to a flat line format instead.
//!
//! Spec §6.3 requires the `[trunkgroups]` section to be fully processed
//! before `[channels]` may reference a trunk group via `crv`; this parser
//! enforces that with an explicit two-pass structure rather than a single
//! streaming pass.

use super::model::*;
use crate::error::{Error, Result};
use crate::port::SignalingVariant;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct RawSection {
    name: String,
    lines: Vec<(String, String)>,
}

fn split_sections(text: &str) -> Vec<RawSection> {
    let mut sections = Vec::new();
    let mut current: Option<RawSection> = None;
    for raw_line in text.lines() {
        let line = raw_line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(sec) = current.take() {
                sections.push(sec);
            }
            current = Some(RawSection {
                name: name.trim().to_string(),
                lines: Vec::new(),
            });
            continue;
        }
        let Some((key, val)) = line.split_once("=>").or_else(|| line.split_once('=')) else {
            continue;
        };
        if let Some(sec) = current.as_mut() {
            sec.lines.push((key.trim().to_lowercase(), val.trim().to_string()));
        }
    }
    if let Some(sec) = current.take() {
        sections.push(sec);
    }
    sections
}

/// Expand `1-4,7,9-10` into the channel numbers it denotes.
fn expand_channel_range(spec: &str) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo
                .trim()
                .parse()
                .map_err(|_| Error::ConfigFatal(format!("bad channel range: {spec}")))?;
            let hi: u32 = hi
                .trim()
                .parse()
                .map_err(|_| Error::ConfigFatal(format!("bad channel range: {spec}")))?;
            if hi < lo {
                return Err(Error::ConfigFatal(format!("inverted channel range: {spec}")));
            }
            out.extend(lo..=hi);
        } else {
            out.push(
                part.parse()
                    .map_err(|_| Error::ConfigFatal(format!("bad channel number: {part}")))?,
            );
        }
    }
    Ok(out)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "yes" | "true" | "on" | "1")
}

fn parse_signalling(s: &str) -> Result<SignalingVariant> {
    SignalingVariant::from_config_key(s)
        .ok_or_else(|| Error::ConfigFatal(format!("unknown signalling type: {s}")))
}

fn parse_cadence(s: &str) -> RingCadence {
    let mut pairs = Vec::new();
    let mut inverted_first = false;
    for (i, tok) in s.split(',').enumerate() {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        let v: i32 = tok.parse().unwrap_or(0);
        if i == 0 && v < 0 {
            inverted_first = true;
        }
        let is_cid_marker = i % 2 == 1 && v < 0;
        pairs.push(CadencePair {
            on_ms: v.unsigned_abs() as i32,
            off_ms: 0,
            is_cid_marker,
        });
    }
    // Fold flat on/off list into (on,off) pairs.
    let mut folded = Vec::new();
    let mut it = pairs.into_iter();
    while let Some(on) = it.next() {
        let off = it.next().unwrap_or(CadencePair {
            on_ms: 0,
            off_ms: 0,
            is_cid_marker: false,
        });
        folded.push(CadencePair {
            on_ms: on.on_ms,
            off_ms: off.on_ms,
            is_cid_marker: on.is_cid_marker || off.is_cid_marker,
        });
    }
    RingCadence {
        pairs: folded,
        inverted_first,
    }
}

fn parse_dialplan(s: &str) -> DialPlan {
    match s.to_lowercase().as_str() {
        "national" => DialPlan::National,
        "private" => DialPlan::Private,
        "international" => DialPlan::International,
        "local" => DialPlan::Local,
        "dynamic" => DialPlan::Dynamic,
        "redundant" => DialPlan::RedundantStrip,
        _ => DialPlan::Unknown,
    }
}

/// Apply one `key = value` pair onto a channel template, spec §6.3.
fn apply_channel_key(cfg: &mut ChannelConfig, key: &str, val: &str) -> Result<()> {
    match key {
        "signalling" => cfg.signalling = parse_signalling(val)?,
        "outsignalling" => cfg.outsignalling = Some(parse_signalling(val)?),
        "context" => cfg.context = val.to_string(),
        "callerid" => {
            if val.eq_ignore_ascii_case("asreceived") {
                cfg.callerid_as_received = true;
            } else if let Some((name, num)) = val.split_once('<') {
                cfg.callerid_name = name.trim().trim_matches('"').to_string();
                cfg.callerid_number = num.trim_end_matches('>').to_string();
            } else {
                cfg.callerid_number = val.to_string();
            }
        }
        "usecallerid" => cfg.use_callerid = parse_bool(val),
        "cidsignalling" => {
            cfg.cid_signalling = match val.to_lowercase().as_str() {
                "v23" => CidSignaling::V23,
                "v23_jp" => CidSignaling::V23Jp,
                "dtmf" => CidSignaling::Dtmf,
                "smdi" => CidSignaling::Smdi,
                _ => CidSignaling::Bell,
            }
        }
        "cidstart" => {
            cfg.cid_start = match val.to_lowercase().as_str() {
                "polarity" => CidStart::Polarity,
                "polarity_in" => CidStart::PolarityIn,
                _ => CidStart::Ring,
            }
        }
        "threewaycalling" => cfg.threewaycalling = parse_bool(val),
        "callwaiting" => cfg.callwaiting = parse_bool(val),
        "callwaitingcallerid" => cfg.callwaitingcallerid = parse_bool(val),
        "transfer" => cfg.transfer = parse_bool(val),
        "canpark" => cfg.canpark = parse_bool(val),
        "cancallforward" => cfg.cancallforward = parse_bool(val),
        "echocancel" => {
            if parse_bool(val) {
                // plain boolean: keep the default tap length
            } else if val.eq_ignore_ascii_case("no") || val == "0" {
                cfg.echocancel = None;
            } else if let Ok(taps) = val.split(',').next().unwrap_or("").trim().parse::<u32>() {
                cfg.echocancel = Some(EchoCancelConfig {
                    taps,
                    params: Vec::new(),
                });
            }
        }
        "echotraining" => cfg.echotraining_ms = val.parse().ok(),
        "busydetect" => cfg.busydetect.enabled = parse_bool(val),
        "busycount" => cfg.busydetect.count = val.parse().unwrap_or(3),
        "busypattern" => {
            if let Some((a, b)) = val.split_once(',') {
                cfg.busydetect.pattern = Some((
                    a.trim().parse().unwrap_or(0),
                    b.trim().parse().unwrap_or(0),
                ));
            }
        }
        "callprogress" => cfg.callprogress = parse_bool(val),
        "faxdetect" => {
            cfg.faxdetect = match val.to_lowercase().as_str() {
                "incoming" => FaxDetect::Incoming,
                "outgoing" => FaxDetect::Outgoing,
                "both" | "yes" => FaxDetect::Both,
                _ => FaxDetect::None,
            }
        }
        "relaxdtmf" => cfg.relaxdtmf = parse_bool(val),
        "mailbox" => cfg.mailbox = Some(val.to_string()),
        "usesmdi" => cfg.usesmdi = parse_bool(val),
        "smdiport" => cfg.smdiport = Some(val.to_string()),
        "group" => cfg.group = val.parse().unwrap_or(0),
        "callgroup" => cfg.callgroup = parse_group_mask(val),
        "pickupgroup" => cfg.pickupgroup = parse_group_mask(val),
        "mohinterpret" => cfg.mohinterpret = val.to_string(),
        "mohsuggest" => cfg.mohsuggest = val.to_string(),
        "rxgain" => cfg.rxgain_db = val.parse().unwrap_or(0.0),
        "txgain" => cfg.txgain_db = val.parse().unwrap_or(0.0),
        "cid_rxgain" => cfg.cid_rxgain_db = val.parse().unwrap_or(0.0),
        "stripmsd" => cfg.stripmsd = val.parse().unwrap_or(0),
        "tonezone" => cfg.tonezone = Some(val.to_string()),
        "amaflags" => cfg.amaflags = val.parse().unwrap_or(0),
        "polarityonanswerdelay" => {
            cfg.polarityonanswerdelay_ms = val
                .parse()
                .unwrap_or(crate::config::constants::DEFAULT_POLARITY_ON_ANSWER_DELAY_MS)
        }
        "answeronpolarityswitch" => cfg.answeronpolarityswitch = parse_bool(val),
        "hanguponpolarityswitch" => cfg.hanguponpolarityswitch = parse_bool(val),
        "sendcalleridafter" => cfg.sendcalleridafter = val.parse().unwrap_or(0),
        "pritimer" => {
            // `pritimer=t309,<ms>`; any other sub-timer name is accepted and
            // ignored (only T309's disabled/enabled distinction is modeled).
            if let Some((name, ms)) = val.split_once(',') {
                if name.trim().eq_ignore_ascii_case("t309") {
                    cfg.pritimer_t309_ms = ms.trim().parse::<i64>().ok().and_then(|ms| {
                        if ms < 0 {
                            None
                        } else {
                            Some(ms as u32)
                        }
                    });
                }
            }
        }
        "pridialplan" => cfg.pridialplan = parse_dialplan(val),
        "prilocaldialplan" => cfg.prilocaldialplan = parse_dialplan(val),
        "overlapdial" => {
            cfg.overlapdial = match val.to_lowercase().as_str() {
                "incoming" => OverlapDial::Incoming,
                "outgoing" => OverlapDial::Outgoing,
                "both" | "yes" => OverlapDial::Both,
                _ => OverlapDial::No,
            }
        }
        "priindication" => cfg.priindication_inband = val.eq_ignore_ascii_case("inband"),
        "priexclusive" => cfg.priexclusive = parse_bool(val),
        "internationalprefix" => cfg.internationalprefix = val.to_string(),
        "nationalprefix" => cfg.nationalprefix = val.to_string(),
        "localprefix" => cfg.localprefix = val.to_string(),
        "privateprefix" => cfg.privateprefix = val.to_string(),
        "unknownprefix" => cfg.unknownprefix = val.to_string(),
        "adsi" => cfg.adsi = parse_bool(val),
        "immediate" => cfg.immediate = parse_bool(val),
        "mwimonitor" => cfg.mwimonitor = parse_bool(val),
        "mwimonitornotify" => cfg.mwimonitornotify = Some(val.to_string()),
        "mwilevel" => cfg.mwilevel = val.parse().unwrap_or(0),
        "trunkgroup" => cfg.trunkgroup = val.parse().ok(),
        "ringtimeout" => cfg.ringtimeout_ms = val.parse().unwrap_or(0),
        "usedistinctiveringdetection" => cfg.use_distinctive_ring = parse_bool(val),
        _ if key.starts_with("dring") && key.ends_with("context") => {
            let idx = dring_index(key)?;
            ensure_dring(cfg, idx).context = val.to_string();
        }
        _ if key.starts_with("dring") && key.ends_with("range") => {
            let idx = dring_index_suffix(key, "range")?;
            let vals: Vec<i32> = val
                .split(',')
                .map(|v| v.trim().parse().unwrap_or(-1))
                .collect();
            let d = ensure_dring(cfg, idx);
            for (i, v) in vals.into_iter().take(3).enumerate() {
                d.range_ms[i] = v;
            }
        }
        _ if key.starts_with("dring") => {
            let idx = dring_index_suffix(key, "")?;
            let vals: Vec<i32> = val
                .split(',')
                .map(|v| v.trim().parse().unwrap_or(-1))
                .collect();
            let d = ensure_dring(cfg, idx);
            for (i, v) in vals.into_iter().take(3).enumerate() {
                d.slots_ms[i] = v;
            }
        }
        // unknown keys are ignored rather than fatal: this engine only
        // implements the subset of the original surface named in spec §6.3
        _ => {}
    }
    Ok(())
}

fn dring_index(key: &str) -> Result<usize> {
    dring_index_suffix(key, "context")
}

fn dring_index_suffix(key: &str, suffix: &str) -> Result<usize> {
    let mid = key
        .strip_prefix("dring")
        .and_then(|s| s.strip_suffix(suffix))
        .ok_or_else(|| Error::ConfigFatal(format!("bad dring key: {key}")))?;
    let n: usize = mid
        .parse()
        .map_err(|_| Error::ConfigFatal(format!("bad dring key: {key}")))?;
    if n == 0 || n > 3 {
        return Err(Error::ConfigFatal(format!("dring index out of range: {key}")));
    }
    Ok(n - 1)
}

fn ensure_dring(cfg: &mut ChannelConfig, idx: usize) -> &mut DistinctiveRing {
    while cfg.distinctive_rings.len() <= idx {
        cfg.distinctive_rings.push(DistinctiveRing {
            slots_ms: [-1, -1, -1],
            range_ms: [-1, -1, -1],
            context: String::new(),
        });
    }
    &mut cfg.distinctive_rings[idx]
}

fn parse_group_mask(val: &str) -> u64 {
    let mut mask = 0u64;
    for part in val.split(',') {
        let part = part.trim();
        if let Some((lo, hi)) = part.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                for b in lo..=hi.min(63) {
                    mask |= 1 << b;
                }
            }
        } else if let Ok(b) = part.parse::<u32>() {
            if b < 64 {
                mask |= 1 << b;
            }
        }
    }
    mask
}

/// Parse a full configuration file's text into a [`ConfigDocument`].
///
/// Enforces spec §6.3: `[trunkgroups]` is fully resolved in pass 1 before
/// `[channels]` sections (pass 2) may reference a trunk group via `crv`.
pub fn parse(text: &str) -> Result<ConfigDocument> {
    let sections = split_sections(text);
    let mut doc = ConfigDocument::default();

    // Pass 1: trunkgroups, spanmap, linksets, and global scalars.
    for sec in &sections {
        match sec.name.as_str() {
            "trunkgroups" => {
                for (key, val) in &sec.lines {
                    if key == "trunkgroup" {
                        // N,dchan1,dchan2,...
                        let mut parts = val.split(',');
                        let n: u32 = parts
                            .next()
                            .and_then(|s| s.trim().parse().ok())
                            .ok_or_else(|| Error::ConfigFatal("bad trunkgroup line".into()))?;
                        let dchans: Vec<u32> =
                            parts.filter_map(|s| s.trim().parse().ok()).collect();
                        doc.trunk_groups.insert(n, TrunkGroupConfig { trunk_group: n, dchans });
                    } else if key == "spanmap" {
                        let parts: Vec<&str> = val.split(',').map(|s| s.trim()).collect();
                        if parts.len() == 3 {
                            if let (Ok(span), Ok(tg), Ok(lspan)) =
                                (parts[0].parse(), parts[1].parse(), parts[2].parse())
                            {
                                doc.span_maps.push(SpanMapEntry {
                                    span,
                                    trunk_group: tg,
                                    logical_span: lspan,
                                });
                            }
                        }
                    }
                }
            }
            "general" => {
                for (key, val) in &sec.lines {
                    match key.as_str() {
                        "resetinterval" => {
                            doc.resetinterval_secs = if val.eq_ignore_ascii_case("never") {
                                None
                            } else {
                                val.parse().ok()
                            }
                        }
                        "idleext" => doc.idleext = Some(val.clone()),
                        "idledial" => doc.idledial = Some(val.clone()),
                        "minunused" => doc.minunused = val.parse().unwrap_or(0),
                        "minidle" => doc.minidle = val.parse().unwrap_or(0),
                        "switchtype" => doc.switchtype = val.clone(),
                        "nsf" => doc.nsf = Some(val.clone()),
                        _ => {}
                    }
                }
            }
            name if name.starts_with("linkset") || sec.lines.iter().any(|(k, _)| k == "linkset") => {
                let mut lk = LinksetConfig {
                    name: sec.name.clone(),
                    ss7_type: Ss7Type::Itu,
                    pointcode: 0,
                    adjpointcode: 0,
                    defaultdpc: 0,
                    cicbeginswith: 0,
                    networkindicator: 0,
                    channels: Vec::new(),
                };
                for (key, val) in &sec.lines {
                    match key.as_str() {
                        "ss7type" => {
                            lk.ss7_type = if val.eq_ignore_ascii_case("ansi") {
                                Ss7Type::Ansi
                            } else {
                                Ss7Type::Itu
                            }
                        }
                        "pointcode" => lk.pointcode = val.parse().unwrap_or(0),
                        "adjpointcode" => lk.adjpointcode = val.parse().unwrap_or(0),
                        "defaultdpc" => lk.defaultdpc = val.parse().unwrap_or(0),
                        "cicbeginswith" => lk.cicbeginswith = val.parse().unwrap_or(0),
                        "networkindicator" => lk.networkindicator = val.parse().unwrap_or(0),
                        "channel" | "zapchan" => {
                            lk.channels.extend(expand_channel_range(val)?);
                        }
                        _ => {}
                    }
                }
                doc.linksets.insert(lk.name.clone(), lk);
            }
            _ => {}
        }
    }

    // Pass 2: channels, in file order, "sticky" defaults accumulate across
    // key/value lines the way the original flat format lets later keys
    // override earlier ones within the same section run.
    for sec in &sections {
        if sec.name != "channels" && sec.name != "channel" {
            continue;
        }
        let mut template = ChannelConfig::default();
        let mut pending_channels: Vec<u32> = Vec::new();
        for (key, val) in &sec.lines {
            if key == "channel" || key == "zapchan" {
                if !pending_channels.is_empty() {
                    for ch in pending_channels.drain(..) {
                        doc.channels.insert(ch, template.clone());
                    }
                }
                if val.trim().eq_ignore_ascii_case("pseudo") {
                    continue;
                }
                pending_channels = expand_channel_range(val)?;
                continue;
            }
            if key == "crv" {
                let tg: u32 = template
                    .trunkgroup
                    .ok_or_else(|| Error::ConfigFatal("crv without trunkgroup".into()))?;
                if !doc.trunk_groups.contains_key(&tg) {
                    return Err(Error::ConfigFatal(format!(
                        "channels section references trunkgroup {tg} before it was defined in [trunkgroups]"
                    )));
                }
                continue;
            }
            apply_channel_key(&mut template, key, val)?;
        }
        for ch in pending_channels {
            doc.channels.insert(ch, template.clone());
        }
    }

    Ok(doc)
}
