// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sub-channel model (spec §3 "Sub-channel").

use crate::hw::{ConfDescriptor, Law};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubIndex {
    Real,
    CallWait,
    ThreeWay,
}

impl SubIndex {
    pub const ALL: [SubIndex; 3] = [SubIndex::Real, SubIndex::CallWait, SubIndex::ThreeWay];
}

/// One pending deferred control notification a sub-channel owes its owner
/// (spec §3: "eight single-bit 'need X' pending notifications").
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingNeeds {
    pub ring: bool,
    pub busy: bool,
    pub congestion: bool,
    pub caller_id: bool,
    pub answer: bool,
    pub flash: bool,
    pub hold: bool,
    pub unhold: bool,
}

impl PendingNeeds {
    pub fn any(&self) -> bool {
        self.ring
            || self.busy
            || self.congestion
            || self.caller_id
            || self.answer
            || self.flash
            || self.hold
            || self.unhold
        }

    pub fn clear(&mut self) {
        *self = PendingNeeds::default();
    }
}

/// A non-owning handle to whoever the PBX considers the owner of this
/// sub-channel (spec §3 "Calls are owned externally"; §9 models this as a
/// non-owning back-reference).
pub type OwnerId = u64;

#[derive(Debug, Clone, Default)]
pub struct PcmBuffer {
    pub samples: Vec<u8>,
    pub offset: usize,
}

impl PcmBuffer {
    pub fn clear(&mut self) {
        self.samples.clear();
        self.offset = 0;
    }
}

#[derive(Debug, Clone)]
pub struct SubChannel {
    pub index: SubIndex,
    /// `None` until a real or pseudo FD is attached; `REAL` is allocated
    /// with the Port, `CALLWAIT`/`THREEWAY` on demand (spec §3 Lifecycle).
    pub fd: Option<i32>,
    pub owner: Option<OwnerId>,
    pub buffer: PcmBuffer,
    pub outbound_frame: Vec<u8>,
    pub needs: PendingNeeds,
    pub linear_mode: bool,
    pub in_three_way: bool,
    pub curconf: ConfDescriptor,
    pub law: Law,
}

impl SubChannel {
    pub fn new(index: SubIndex, law: Law) -> Self {
        SubChannel {
            index,
            fd: None,
            owner: None,
            buffer: PcmBuffer::default(),
            outbound_frame: Vec::new(),
            needs: PendingNeeds::default(),
            linear_mode: false,
            in_three_way: false,
            curconf: ConfDescriptor::default(),
            law,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.fd.is_some()
    }

    pub fn release(&mut self) {
        self.fd = None;
        self.owner = None;
        self.buffer.clear();
        self.outbound_frame.clear();
        self.needs.clear();
        self.linear_mode = false;
        self.in_three_way = false;
        self.curconf = ConfDescriptor::default();
    }
}
