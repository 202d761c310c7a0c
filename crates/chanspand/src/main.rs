// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! chanspand - loads the line table from a config file, runs the monitor
//! thread plus one PRI/SS7 controller thread per configured trunk
//! group/linkset, and exposes the operator management protocol over TCP.
//!
//! # Usage
//!
//! ```bash
//! chanspand --config /etc/chanspan/chanspan.conf
//! chanspand --config chanspan.conf --mgmt-addr 127.0.0.1:4240
//! ```

use anyhow::{Context, Result};
use chanspan::collab::{Dialplan, PbxOwner};
use chanspan::config::runtime::RuntimeConfig;
use chanspan::hw::RawChannel;
use chanspan::net;
use chanspan::port::{OwnerId, Port};
use chanspan::PortTable;
use clap::Parser;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// chanspand: channel, signaling, and media engine daemon
#[derive(Parser, Debug)]
#[command(name = "chanspand")]
#[command(about = "Loads the line table and runs the monitor, PRI/SS7 controllers, and management socket")]
#[command(version)]
struct Args {
    /// Path to the line-table config file (spec §6.3).
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding the driver's channel/pseudo device nodes.
    #[arg(long, default_value = "/dev/chanspan")]
    device_dir: String,

    /// Bind address for the operator management protocol (spec §6.4).
    #[arg(long, default_value = "127.0.0.1:4240")]
    mgmt_addr: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Stand-in dialplan used until a real PBX core is linked against this
/// daemon: every lookup misses, so the monitor's digit collectors never
/// dispatch on their own. A production deployment replaces this with the
/// PBX integration's [`Dialplan`] implementation.
struct NullDialplan;

impl Dialplan for NullDialplan {
    fn exists(&self, _context: &str, _exten: &str) -> bool {
        false
    }
    fn can_match_more(&self, _context: &str, _exten: &str) -> bool {
        false
    }
    fn run(&self, _context: &str, _exten: &str, _owner: OwnerId) {}
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    let runtime_config = Arc::new(
        RuntimeConfig::from_file(&args.config)
            .map_err(|e| anyhow::anyhow!("loading config {}: {e}", args.config.display()))?,
    );
    let table = Arc::new(build_port_table(&runtime_config, &args.device_dir)?);

    let mgmt_thread = spawn_mgmt_server(&args.mgmt_addr, table.clone(), runtime_config.clone(), shutdown.clone())?;

    let monitor_thread = {
        let table = table.clone();
        let runtime_config = runtime_config.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            let mut monitor = chanspan::monitor::Monitor::new(runtime_config);
            let owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>> = &|_| None;
            let dialplan = NullDialplan;
            chanspan::monitor::run(&mut monitor, &table, owner_of, &dialplan, None, &shutdown);
        })
    };

    log::info!("chanspand started, {} channels loaded", table.len());
    monitor_thread.join().map_err(|_| anyhow::anyhow!("monitor thread panicked"))?;
    mgmt_thread.join().map_err(|_| anyhow::anyhow!("management thread panicked"))?;
    Ok(())
}

fn build_port_table(config: &RuntimeConfig, device_dir: &str) -> Result<PortTable> {
    let table = PortTable::new();
    let snapshot = config.snapshot();
    let channel_path = format!("{device_dir}/channel");

    for (&channel, chan_cfg) in snapshot.channels.iter() {
        let device = RawChannel::open(&channel_path, Some(channel))
            .with_context(|| format!("opening channel {channel} at {channel_path}"))?;
        let mut port = Port::new(channel, 1, chanspan::hw::Law::Mu, chan_cfg.signalling, Box::new(device));
        port.strings.context = chan_cfg.context.clone();
        port.strings.default_context = chan_cfg.default_context.clone();
        port.strings.mailbox = chan_cfg.mailbox.clone();
        port.flags.in_service = true;
        port.flags.three_way_calling = chan_cfg.threewaycalling;
        port.flags.call_waiting = chan_cfg.callwaiting;
        port.flags.call_waiting_callerid = chan_cfg.callwaitingcallerid;
        port.flags.transfer_allowed = chan_cfg.transfer;
        port.flags.can_park = chan_cfg.canpark;
        port.flags.can_call_forward = chan_cfg.cancallforward;
        port.flags.use_callerid = chan_cfg.use_callerid;
        port.flags.use_distinctive_ring = chan_cfg.use_distinctive_ring;
        port.flags.overlap_dial_incoming = chan_cfg.overlapdial.incoming();
        port.numeric.stripmsd = chan_cfg.stripmsd;
        table.insert(port);
    }
    Ok(table)
}

fn spawn_mgmt_server(
    addr: &str,
    table: Arc<PortTable>,
    config: Arc<RuntimeConfig>,
    shutdown: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let listener = TcpListener::bind(addr).with_context(|| format!("binding management socket on {addr}"))?;
    listener.set_nonblocking(true)?;
    log::info!("management protocol listening on {addr}");

    Ok(thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    let table = table.clone();
                    let config = config.clone();
                    thread::spawn(move || handle_mgmt_client(stream, &table, &config));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(e) => log::warn!("management accept failed: {e}"),
            }
        }
    }))
}

fn handle_mgmt_client(mut stream: TcpStream, table: &PortTable, config: &RuntimeConfig) {
    let _ = stream.set_nodelay(true);
    let owner_of: &dyn Fn(OwnerId) -> Option<Arc<dyn PbxOwner>> = &|_| None;

    loop {
        let mut header = [0u8; 5];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let cmd_id = header[0];
        let payload_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 && stream.read_exact(&mut payload).is_err() {
            return;
        }

        let Some(cmd) = net::Command::from_u8(cmd_id) else {
            write_response(&mut stream, net::Status::InvalidCommand, "");
            continue;
        };
        let Some(req) = decode_request(cmd, &payload) else {
            write_response(&mut stream, net::Status::InvalidCommand, "");
            continue;
        };

        let resp = net::dispatch(req, table, config, owner_of);
        write_response(&mut stream, resp.status, &resp.body);
    }
}

/// Payload layout per command (spec §6.4): `ShowChannels`/`Restart` and the
/// per-channel commands all start with a 4-byte little-endian channel
/// number; `DialOffhook` appends the remaining bytes as the dial string.
fn decode_request(cmd: net::Command, payload: &[u8]) -> Option<net::Request> {
    let channel = |p: &[u8]| -> Option<u32> { p.get(0..4).map(|b| u32::from_le_bytes(b.try_into().unwrap())) };
    match cmd {
        net::Command::ShowChannels => Some(net::Request::ShowChannels),
        net::Command::DialOffhook => {
            let ch = channel(payload)?;
            let dialstring = String::from_utf8_lossy(payload.get(4..)?).into_owned();
            Some(net::Request::DialOffhook { channel: ch, dialstring })
        }
        net::Command::Hangup => Some(net::Request::Hangup { channel: channel(payload)? }),
        net::Command::Transfer => Some(net::Request::Transfer { channel: channel(payload)? }),
        net::Command::DndOn => Some(net::Request::DndOn { channel: channel(payload)? }),
        net::Command::DndOff => Some(net::Request::DndOff { channel: channel(payload)? }),
        net::Command::Restart => Some(net::Request::Restart { channel: channel(payload)? }),
    }
}

fn write_response(stream: &mut TcpStream, status: net::Status, body: &str) {
    let bytes = body.as_bytes();
    let len = bytes.len() as u32;
    let mut header = [0u8; 5];
    header[0] = status.to_byte();
    header[1..5].copy_from_slice(&len.to_le_bytes());
    if stream.write_all(&header).is_err() {
        return;
    }
    let _ = stream.write_all(bytes);
}
