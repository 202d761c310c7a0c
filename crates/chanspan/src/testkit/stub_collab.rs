// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::collab::{ControlFrame, Dialplan, PbxOwner};
use crate::port::{OwnerId, SubIndex};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A [`PbxOwner`] stub that records every frame it was sent, for assertions
/// in unit tests.
pub struct StubOwner {
    pub id: OwnerId,
    pub frames: Arc<Mutex<Vec<(ControlFrame, Option<String>)>>>,
    pub dtmf: Arc<Mutex<Vec<(char, bool)>>>,
}

impl StubOwner {
    pub fn new(id: OwnerId) -> Self {
        StubOwner {
            id,
            frames: Arc::new(Mutex::new(Vec::new())),
            dtmf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn frames_snapshot(&self) -> Vec<(ControlFrame, Option<String>)> {
        self.frames.lock().clone()
    }
}

impl PbxOwner for StubOwner {
    fn id(&self) -> OwnerId {
        self.id
    }

    fn queue_frame(&self, frame: ControlFrame, mohsuggest: Option<&str>) {
        self.frames.lock().push((frame, mohsuggest.map(String::from)));
    }

    fn queue_dtmf(&self, digit: char, begin: bool) {
        self.dtmf.lock().push((digit, begin));
    }

    fn fixup_notify(&self, _new_sub: SubIndex) {}
}

/// A [`Dialplan`] stub backed by an explicit set of `(context, exten)`
/// pairs that "exist".
pub struct StubDialplan {
    exact: HashSet<(String, String)>,
    prefixes: HashSet<(String, String)>,
}

impl StubDialplan {
    pub fn new() -> Self {
        StubDialplan { exact: HashSet::new(), prefixes: HashSet::new() }
    }

    pub fn add_exact(mut self, context: &str, exten: &str) -> Self {
        self.exact.insert((context.to_string(), exten.to_string()));
        self
    }

    pub fn add_prefix(mut self, context: &str, prefix: &str) -> Self {
        self.prefixes.insert((context.to_string(), prefix.to_string()));
        self
    }
}

impl Default for StubDialplan {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialplan for StubDialplan {
    fn exists(&self, context: &str, exten: &str) -> bool {
        self.exact.contains(&(context.to_string(), exten.to_string()))
    }

    fn can_match_more(&self, context: &str, exten: &str) -> bool {
        self.prefixes
            .iter()
            .any(|(c, p)| c == context && p.starts_with(exten) && p != exten)
    }

    fn run(&self, _context: &str, _exten: &str, _owner: OwnerId) {}
}
