// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Level 2 of the config model: the frozen, swappable runtime snapshot.
//!
//! Mirrors `hdds::config::RuntimeConfig`'s `ArcSwap<PortMapping>` pattern:
//! every controller thread and the monitor hold a cheap `Arc` clone of the
//! current [`ConfigDocument`] and never block a writer. A reload parses a
//! fresh document and swaps it in one atomic store; in-flight readers keep
//! using their already-cloned `Arc` until they next ask for a snapshot.

use super::model::{ChannelConfig, ConfigDocument};
use crate::error::Result;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

/// Per-channel operator overrides that do not belong in the config file:
/// DND toggled via the management socket, a call-forward target armed by a
/// feature code, etc. (spec §4.8 feature codes, §6.4 `DNDon`/`DNDoff`).
#[derive(Debug, Default, Clone)]
pub struct ChannelOverride {
    pub dnd: bool,
    pub call_forward: Option<String>,
    pub callwaiting_enabled: Option<bool>,
    pub hide_callerid: Option<bool>,
}

pub struct RuntimeConfig {
    doc: ArcSwap<ConfigDocument>,
    overrides: DashMap<u32, ChannelOverride>,
}

impl RuntimeConfig {
    pub fn from_document(doc: ConfigDocument) -> Self {
        RuntimeConfig {
            doc: ArcSwap::from_pointee(doc),
            overrides: DashMap::new(),
        }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error::Error::ConfigFatal(format!("cannot read {}: {e}", path.display()))
        })?;
        let doc = super::parser::parse(&text)?;
        Ok(Self::from_document(doc))
    }

    /// Lock-free snapshot of the current document.
    pub fn snapshot(&self) -> Arc<ConfigDocument> {
        self.doc.load_full()
    }

    /// Replace the whole document atomically. Callers must have already run
    /// the monitor-quiesce protocol (spec §9 "Global mutable state").
    pub fn reload(&self, doc: ConfigDocument) {
        self.doc.store(Arc::new(doc));
    }

    pub fn channel_config(&self, channel: u32) -> Option<ChannelConfig> {
        self.doc.load().channels.get(&channel).cloned()
    }

    pub fn channel_override(&self, channel: u32) -> ChannelOverride {
        self.overrides.get(&channel).map(|r| r.clone()).unwrap_or_default()
    }

    pub fn set_dnd(&self, channel: u32, on: bool) {
        self.overrides.entry(channel).or_default().dnd = on;
    }

    pub fn set_call_forward(&self, channel: u32, target: Option<String>) {
        self.overrides.entry(channel).or_default().call_forward = target;
    }

    pub fn set_callwaiting(&self, channel: u32, on: Option<bool>) {
        self.overrides.entry(channel).or_default().callwaiting_enabled = on;
    }

    pub fn set_hide_callerid(&self, channel: u32, hide: Option<bool>) {
        self.overrides.entry(channel).or_default().hide_callerid = hide;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_defaults_are_inert() {
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let ov = rc.channel_override(5);
        assert!(!ov.dnd);
        assert!(ov.call_forward.is_none());
    }

    #[test]
    fn dnd_toggle_round_trips() {
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        rc.set_dnd(3, true);
        assert!(rc.channel_override(3).dnd);
        rc.set_dnd(3, false);
        assert!(!rc.channel_override(3).dnd);
    }

    #[test]
    fn reload_swaps_atomically() {
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let mut doc2 = ConfigDocument::default();
        doc2.minunused = 7;
        rc.reload(doc2);
        assert_eq!(rc.snapshot().minunused, 7);
    }
}
