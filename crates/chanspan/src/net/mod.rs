// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operator management protocol (spec §6.4): `DialOffhook`, `Hangup`,
//! `Transfer`, `DNDon`, `DNDoff`, `ShowChannels`, `Restart`.
//!
//! Wire format mirrors the teacher's admin API: a 5-byte header (1-byte
//! command, 4-byte little-endian payload length) followed by the payload.
//! This module only defines the command/status codes and the pure
//! `dispatch` function a socket loop calls per request; the socket itself
//! (`TcpListener`/accept loop) lives in the daemon binary, same split as
//! the teacher's `admin::api::server` vs `admin::api::protocol`.

use crate::collab::PbxOwner;
use crate::config::runtime::RuntimeConfig;
use crate::list::PortTable;
use crate::port::{OwnerId, SubIndex};
use std::sync::Arc;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DialOffhook = 0x01,
    Hangup = 0x02,
    Transfer = 0x03,
    DndOn = 0x04,
    DndOff = 0x05,
    ShowChannels = 0x06,
    Restart = 0x07,
}

impl Command {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x01 => Some(Command::DialOffhook),
            0x02 => Some(Command::Hangup),
            0x03 => Some(Command::Transfer),
            0x04 => Some(Command::DndOn),
            0x05 => Some(Command::DndOff),
            0x06 => Some(Command::ShowChannels),
            0x07 => Some(Command::Restart),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0x00,
    InvalidCommand = 0x01,
    InternalError = 0x02,
    ChannelNotFound = 0x03,
}

impl Status {
    pub const fn to_byte(self) -> u8 {
        match self {
            Status::Ok => 0x00,
            Status::InvalidCommand => 0x01,
            Status::InternalError => 0x02,
            Status::ChannelNotFound => 0x03,
        }
    }
}

/// One decoded request. The channel-less `ShowChannels` variant is the only
/// command that doesn't target a single Port.
#[derive(Debug, Clone)]
pub enum Request {
    DialOffhook { channel: u32, dialstring: String },
    Hangup { channel: u32 },
    Transfer { channel: u32 },
    DndOn { channel: u32 },
    DndOff { channel: u32 },
    ShowChannels,
    Restart { channel: u32 },
}

pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    fn ok(body: String) -> Self {
        Response { status: Status::Ok, body }
    }

    fn err(status: Status, msg: &str) -> Self {
        Response { status, body: format!(r#"{{"error":"{msg}"}}"#) }
    }
}

/// Handle one decoded request against live engine state (spec §6.4). Pure
/// of any socket I/O so it is directly unit-testable.
pub fn dispatch(
    req: Request,
    table: &PortTable,
    config: &RuntimeConfig,
    owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>>,
) -> Response {
    match req {
        Request::DialOffhook { channel, dialstring } => {
            let Some(handle) = table.get(channel) else {
                return Response::err(Status::ChannelNotFound, "no such channel");
            };
            let mut p = handle.lock();
            p.strings.final_dial_string = dialstring;
            p.flags.outgoing = true;
            p.state = crate::port::LineState::Dialing;
            Response::ok(format!(r#"{{"channel":{channel},"state":"dialing"}}"#))
        }
        Request::Hangup { channel } => {
            let Some(handle) = table.get(channel) else {
                return Response::err(Status::ChannelNotFound, "no such channel");
            };
            let mut p = handle.lock();
            crate::port::ops::hangup(&mut p, table, SubIndex::Real, owner_of);
            Response::ok(format!(r#"{{"channel":{channel},"result":"hangup_queued"}}"#))
        }
        Request::Transfer { channel } => {
            let Some(handle) = table.get(channel) else {
                return Response::err(Status::ChannelNotFound, "no such channel");
            };
            let mut p = handle.lock();
            let ok = crate::signaling::threeway::attempt_transfer(&mut p);
            Response::ok(format!(r#"{{"channel":{channel},"transferred":{ok}}}"#))
        }
        Request::DndOn { channel } => {
            config.set_dnd(channel, true);
            Response::ok(format!(r#"{{"channel":{channel},"dnd":true}}"#))
        }
        Request::DndOff { channel } => {
            config.set_dnd(channel, false);
            Response::ok(format!(r#"{{"channel":{channel},"dnd":false}}"#))
        }
        Request::ShowChannels => {
            let rows: Vec<String> = table
                .all()
                .into_iter()
                .map(|h| {
                    let p = h.lock();
                    format!(
                        r#"{{"channel":{},"state":"{:?}","owner_count":{}}}"#,
                        p.channel,
                        p.state,
                        p.owner_count()
                    )
                })
                .collect();
            Response::ok(format!("[{}]", rows.join(",")))
        }
        Request::Restart { channel } => {
            let Some(handle) = table.get(channel) else {
                return Response::err(Status::ChannelNotFound, "no such channel");
            };
            let mut p = handle.lock();
            p.state = crate::port::LineState::Resetting;
            p.flags.in_service = false;
            Response::ok(format!(r#"{{"channel":{channel},"state":"resetting"}}"#))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigDocument;
    use crate::hw::Law;
    use crate::port::{LineState, Port, SignalingVariant};
    use crate::testkit::{FakeDevice, StubOwner};
    use std::sync::Arc;

    fn mkport(channel: u32) -> Port {
        let mut p = Port::new(channel, 1, Law::Mu, SignalingVariant::FxsLs, Box::new(FakeDevice::new()));
        p.flags.in_service = true;
        p
    }

    #[test]
    fn dial_offhook_sets_dialing_state() {
        let table = PortTable::new();
        table.insert(mkport(1));
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let resp = dispatch(
            Request::DialOffhook { channel: 1, dialstring: "5551212".into() },
            &table,
            &rc,
            &|_| None,
        );
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(table.get(1).unwrap().lock().state, LineState::Dialing);
    }

    #[test]
    fn hangup_on_missing_channel_reports_not_found() {
        let table = PortTable::new();
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let resp = dispatch(Request::Hangup { channel: 99 }, &table, &rc, &|_| None);
        assert_eq!(resp.status, Status::ChannelNotFound);
    }

    #[test]
    fn hangup_promotes_waiting_callwait_leg_via_succession() {
        let table = PortTable::new();
        let handle = table.insert(mkport(1));
        {
            let mut p = handle.lock();
            p.real.fd = Some(1);
            p.real.owner = Some(1);
            p.callwait.fd = Some(2);
            p.callwait.owner = Some(2);
        }
        let peer_b = Arc::new(StubOwner::new(2));
        let peer_b_for_closure = peer_b.clone();
        let owner_of = move |id: OwnerId| -> Option<Arc<dyn PbxOwner>> {
            if id == 2 { Some(peer_b_for_closure.clone() as Arc<dyn PbxOwner>) } else { None }
        };
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let resp = dispatch(Request::Hangup { channel: 1 }, &table, &rc, &owner_of);
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(handle.lock().real.owner, Some(2));
        assert!(!handle.lock().callwait.is_allocated());
    }

    #[test]
    fn dnd_toggle_round_trips_through_runtime_config() {
        let table = PortTable::new();
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        dispatch(Request::DndOn { channel: 3 }, &table, &rc, &|_| None);
        assert!(rc.channel_override(3).dnd);
        dispatch(Request::DndOff { channel: 3 }, &table, &rc, &|_| None);
        assert!(!rc.channel_override(3).dnd);
    }

    #[test]
    fn show_channels_lists_every_member() {
        let table = PortTable::new();
        table.insert(mkport(1));
        table.insert(mkport(2));
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        let resp = dispatch(Request::ShowChannels, &table, &rc, &|_| None);
        assert!(resp.body.contains("\"channel\":1"));
        assert!(resp.body.contains("\"channel\":2"));
    }

    #[test]
    fn restart_marks_port_out_of_service() {
        let table = PortTable::new();
        let handle = table.insert(mkport(5));
        let rc = RuntimeConfig::from_document(ConfigDocument::default());
        dispatch(Request::Restart { channel: 5 }, &table, &rc, &|_| None);
        assert!(!handle.lock().flags.in_service);
    }
}
