// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Digit-collection / simple-switch (spec §4.8): a per-Port worker that
//! collects dialed digits under first/inter-digit timeouts with
//! pattern-match lookahead, handles analog feature codes, and arms
//! distinctive-ring detection ahead of running the PBX.
//!
//! Modeled as a synchronous state machine driven by explicit timestamps
//! (spec §9 "Coroutine-style control flow" design note) rather than as a
//! blocking OS thread, so the monitor can step many collectors from one
//! poll loop without a thread per ring.

pub mod cadence;
pub mod callprogress;

use crate::collab::Dialplan;
use crate::config::constants::{
    DEFAULT_PARK_EXTENSION, FIRST_DIGIT_TIMEOUT, GEN_DIGIT_TIMEOUT, MATCH_DIGIT_TIMEOUT,
};
use std::time::{Duration, Instant};

/// Recognized analog feature-code prefixes (spec §4.8 FXO-style list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureCode {
    BlockCallerId,      // *67
    CallReturn,         // *69
    CallForwardArm,     // *72
    CallForwardCancel,  // *73
    BlacklistAdd,       // *60
    AttendantReroute,   // *0
    DndToggle,          // *78 / *79
    ToggleCallWaiting,  // *70
    Pickup,             // *8
    TransferToBlind,    // *87
    Park,
}

impl FeatureCode {
    pub fn from_prefix(digits: &str) -> Option<Self> {
        match digits {
            "*67" => Some(Self::BlockCallerId),
            "*69" => Some(Self::CallReturn),
            "*70" => Some(Self::ToggleCallWaiting),
            "*72" => Some(Self::CallForwardArm),
            "*73" => Some(Self::CallForwardCancel),
            "*78" | "*79" => Some(Self::DndToggle),
            "*60" => Some(Self::BlacklistAdd),
            "*0" => Some(Self::AttendantReroute),
            "*82" => Some(Self::ToggleCallWaiting),
            "*87" => Some(Self::TransferToBlind),
            "*8" => Some(Self::Pickup),
            _ => None,
        }
    }
}

/// All recognized feature-code strings, used to decide whether a partial
/// buffer could still grow into one (spec §4.8 "a dial prefix ... matches").
/// `*8` is listed before `*87`/`*82` so a buffer of just `*8` is treated as
/// an ambiguous prefix of `*87` rather than an immediate `Pickup` dispatch.
const FEATURE_CODE_STRINGS: &[&str] =
    &["*67", "*69", "*70", "*72", "*73", "*78", "*79", "*60", "*0", "*82", "*87", "*8"];

fn is_feature_code_prefix(buffer: &str) -> bool {
    FEATURE_CODE_STRINGS.iter().any(|code| code.starts_with(buffer) && *code != buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Unambiguous match: run the PBX on the collected digits.
    Dispatch,
    /// A feature code fired; collection resets and continues.
    FeatureHandled,
    /// No match and no possibility of future match: play congestion and
    /// hang up.
    NoMatch,
    /// Still waiting on more digits.
    Collecting,
    /// Neither first- nor inter-digit timeout was met before a timeout hit.
    TimedOut,
}

/// FXO/FXS-style dialed-digit collector (spec §4.8 "FXO-style
/// loopstart/ground/kewl" numbered steps).
pub struct DigitCollector {
    pub buffer: String,
    pub context: String,
    /// Configured `parkext` equivalent (spec §4.8 "a parking extension"); an
    /// exact buffer match fires `FeatureCode::Park` the same way a `*xx`
    /// prefix fires its code. Empty disables park matching entirely.
    pub park_extension: String,
    started_at: Instant,
    last_digit_at: Instant,
    first_digit_seen: bool,
    ambiguous: bool,
}

impl DigitCollector {
    pub fn new(context: &str) -> Self {
        let now = Instant::now();
        DigitCollector {
            buffer: String::new(),
            context: context.to_string(),
            park_extension: DEFAULT_PARK_EXTENSION.to_string(),
            started_at: now,
            last_digit_at: now,
            first_digit_seen: false,
            ambiguous: false,
        }
    }

    pub fn with_park_extension(mut self, park_extension: &str) -> Self {
        self.park_extension = park_extension.to_string();
        self
    }

    fn active_timeout(&self) -> Duration {
        if !self.first_digit_seen {
            FIRST_DIGIT_TIMEOUT
        } else if self.ambiguous {
            MATCH_DIGIT_TIMEOUT
        } else {
            GEN_DIGIT_TIMEOUT
        }
    }

    pub fn timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_digit_at) >= self.active_timeout()
    }

    /// Feed one collected digit; consults `dialplan` for exact/prefix
    /// matches and `FeatureCode` prefixes (spec §4.8 step 2).
    pub fn on_digit(&mut self, digit: char, dialplan: &dyn Dialplan) -> Outcome {
        self.first_digit_seen = true;
        self.last_digit_at = Instant::now();
        self.buffer.push(digit);

        let is_park_prefix = !self.park_extension.is_empty()
            && self.park_extension.starts_with(&self.buffer)
            && self.park_extension != self.buffer;
        let is_park_match = !self.park_extension.is_empty() && self.buffer == self.park_extension;

        // Check ambiguity before an exact code match: `*8` must keep
        // collecting rather than fire `Pickup` immediately, since `*82` and
        // `*87` both extend it; same idea for a buffer that's still a
        // prefix of the configured parking extension.
        if is_feature_code_prefix(&self.buffer) || is_park_prefix {
            return Outcome::Collecting;
        }
        let feature = if is_park_match { Some(FeatureCode::Park) } else { FeatureCode::from_prefix(&self.buffer) };
        if feature.is_some() {
            self.buffer.clear();
            self.ambiguous = false;
            return Outcome::FeatureHandled;
        }

        let exact = dialplan.exists(&self.context, &self.buffer);
        let can_match_more = dialplan.can_match_more(&self.context, &self.buffer);

        if exact && !can_match_more {
            return Outcome::Dispatch;
        }
        if !exact && !can_match_more {
            return Outcome::NoMatch;
        }
        self.ambiguous = exact && can_match_more;
        Outcome::Collecting
    }

    /// Call once per tick when no fresh digit arrived; returns `TimedOut`
    /// once the active phase's budget elapses.
    pub fn poll(&self, now: Instant) -> Outcome {
        if self.timed_out(now) {
            Outcome::TimedOut
        } else {
            Outcome::Collecting
        }
    }
}

/// PRI overlap-dial inbound collector (spec §4.8 "PRI / BRI"): digits
/// arrive one at a time via `KEYPAD_DIGIT`/`INFO_RECEIVED` rather than a
/// hardware DTMF event, and there is no feature-code layer.
pub struct OverlapCollector {
    pub buffer: String,
    pub context: String,
}

impl OverlapCollector {
    pub fn new(context: &str, initial_digits: &str) -> Self {
        OverlapCollector { buffer: initial_digits.to_string(), context: context.to_string() }
    }

    pub fn on_digit(&mut self, digit: char, dialplan: &dyn Dialplan) -> Outcome {
        self.buffer.push(digit);
        self.evaluate(dialplan)
    }

    pub fn evaluate(&self, dialplan: &dyn Dialplan) -> Outcome {
        let exact = dialplan.exists(&self.context, &self.buffer);
        let can_match_more = dialplan.can_match_more(&self.context, &self.buffer);
        match (exact, can_match_more) {
            (true, false) => Outcome::Dispatch,
            (false, false) => Outcome::NoMatch,
            _ => Outcome::Collecting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::StubDialplan;

    #[test]
    fn exact_unambiguous_match_dispatches_immediately() {
        let dp = StubDialplan::new().add_exact("default", "100").add_prefix("default", "100");
        let mut c = DigitCollector::new("default");
        assert_eq!(c.on_digit('1', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('0', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('0', &dp), Outcome::Dispatch);
    }

    #[test]
    fn no_match_and_no_canmatch_reports_no_match() {
        let dp = StubDialplan::new().add_exact("default", "100");
        let mut c = DigitCollector::new("default");
        assert_eq!(c.on_digit('9', &dp), Outcome::NoMatch);
    }

    #[test]
    fn feature_code_resets_buffer_when_unambiguous() {
        let dp = StubDialplan::new();
        let mut c = DigitCollector::new("default");
        c.on_digit('*', &dp);
        c.on_digit('6', &dp);
        let outcome = c.on_digit('7', &dp);
        assert_eq!(outcome, Outcome::FeatureHandled);
        assert!(c.buffer.is_empty());
    }

    #[test]
    fn pickup_waits_out_ambiguity_with_longer_transfer_to_blind_code() {
        let dp = StubDialplan::new();
        let mut c = DigitCollector::new("default");
        // "*8" alone must not fire Pickup immediately since "*87" extends it.
        assert_eq!(c.on_digit('*', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('8', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('7', &dp), Outcome::FeatureHandled);
        assert_eq!(FeatureCode::from_prefix("*87"), Some(FeatureCode::TransferToBlind));
        assert_eq!(FeatureCode::from_prefix("*8"), Some(FeatureCode::Pickup));
    }

    #[test]
    fn park_extension_match_fires_feature_handled() {
        let dp = StubDialplan::new();
        let mut c = DigitCollector::new("default").with_park_extension("700");
        assert_eq!(c.on_digit('7', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('0', &dp), Outcome::Collecting);
        let outcome = c.on_digit('0', &dp);
        assert_eq!(outcome, Outcome::FeatureHandled);
        assert!(c.buffer.is_empty());
    }

    #[test]
    fn timeout_uses_first_digit_budget_before_any_digit() {
        let c = DigitCollector::new("default");
        assert!(!c.timed_out(Instant::now()));
        assert_eq!(c.active_timeout(), FIRST_DIGIT_TIMEOUT);
    }

    #[test]
    fn overlap_collector_dispatches_on_unique_match() {
        let dp = StubDialplan::new().add_exact("default", "100").add_prefix("default", "100");
        let mut c = OverlapCollector::new("default", "");
        assert_eq!(c.on_digit('1', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('0', &dp), Outcome::Collecting);
        assert_eq!(c.on_digit('0', &dp), Outcome::Dispatch);
    }
}
