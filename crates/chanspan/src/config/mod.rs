// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration surface (spec §6.3; ambient stack in SPEC_FULL.md §10.4).

pub mod constants;
pub mod model;
pub mod parser;
pub mod runtime;

pub use model::*;
pub use runtime::{ChannelOverride, RuntimeConfig};
