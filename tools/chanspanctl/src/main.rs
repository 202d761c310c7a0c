// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! chanspanctl - operator CLI for the chanspand management protocol
//! (spec §6.4): `DialOffhook`, `Hangup`, `Transfer`, `DNDon`, `DNDoff`,
//! `ShowChannels`, `Restart`.
//!
//! # Usage
//!
//! ```bash
//! chanspanctl --addr 127.0.0.1:4240 show-channels
//! chanspanctl hangup 12
//! chanspanctl dial-offhook 12 5551212
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "chanspanctl")]
#[command(about = "Operator CLI for chanspand's management protocol")]
#[command(version)]
struct Args {
    /// chanspand management socket address
    #[arg(short, long, default_value = "127.0.0.1:4240")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seize a channel and dial a number (operator-originated call)
    DialOffhook { channel: u32, dialstring: String },
    /// Queue a soft hangup to the channel's owner
    Hangup { channel: u32 },
    /// Attempt a blind transfer on a channel with an active three-way leg
    Transfer { channel: u32 },
    /// Enable do-not-disturb on a channel
    DndOn { channel: u32 },
    /// Disable do-not-disturb on a channel
    DndOff { channel: u32 },
    /// List every channel's current state
    ShowChannels,
    /// Take a channel out of service and reset it
    Restart { channel: u32 },
}

/// Management-protocol command codes (spec §6.4), mirrored from
/// `chanspan::net::Command` so this tool does not need to link the engine
/// crate just to speak its wire protocol.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Command {
    DialOffhook = 0x01,
    Hangup = 0x02,
    Transfer = 0x03,
    DndOn = 0x04,
    DndOff = 0x05,
    ShowChannels = 0x06,
    Restart = 0x07,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let body = run(&args)?;
    println!("{body}");
    Ok(())
}

fn run(args: &Args) -> Result<String> {
    let (cmd, payload) = encode_request(&args.command);
    send_request(&args.addr, cmd, &payload)
}

fn encode_request(command: &Commands) -> (Command, Vec<u8>) {
    match command {
        Commands::DialOffhook { channel, dialstring } => {
            let mut payload = channel.to_le_bytes().to_vec();
            payload.extend_from_slice(dialstring.as_bytes());
            (Command::DialOffhook, payload)
        }
        Commands::Hangup { channel } => (Command::Hangup, channel.to_le_bytes().to_vec()),
        Commands::Transfer { channel } => (Command::Transfer, channel.to_le_bytes().to_vec()),
        Commands::DndOn { channel } => (Command::DndOn, channel.to_le_bytes().to_vec()),
        Commands::DndOff { channel } => (Command::DndOff, channel.to_le_bytes().to_vec()),
        Commands::ShowChannels => (Command::ShowChannels, Vec::new()),
        Commands::Restart { channel } => (Command::Restart, channel.to_le_bytes().to_vec()),
    }
}

fn send_request(addr: &str, cmd: Command, payload: &[u8]) -> Result<String> {
    let mut stream = TcpStream::connect_timeout(
        &addr.parse().context("invalid --addr")?,
        Duration::from_secs(5),
    )
    .with_context(|| format!("connecting to chanspand at {addr}"))?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let mut frame = vec![0u8; 5];
    frame[0] = cmd as u8;
    frame[1..5].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame)?;
    stream.flush()?;

    let mut header = [0u8; 5];
    stream.read_exact(&mut header)?;
    let status = header[0];
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    let body = String::from_utf8_lossy(&body).into_owned();

    if status != 0x00 {
        bail!("chanspand returned status=0x{status:02x}: {body}");
    }
    Ok(body)
}
