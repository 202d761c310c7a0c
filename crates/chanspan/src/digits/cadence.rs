// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distinctive-ring cadence matcher (spec §4.8 "arm distinctive-ring
//! detection").

use crate::config::DistinctiveRing;

/// Accumulates observed ring-on/ring-off durations and matches them against
/// configured [`DistinctiveRing`] templates once three slots are filled.
/// `-1` in a template slot is a wildcard.
#[derive(Debug, Default)]
pub struct CadenceMatcher {
    observed_ms: Vec<i32>,
}

impl CadenceMatcher {
    pub fn new() -> Self {
        CadenceMatcher { observed_ms: Vec::with_capacity(3) }
    }

    /// Record one observed interval. Returns `true` once three slots have
    /// been collected and `match_against` may be called.
    pub fn record(&mut self, ms: i32) -> bool {
        if self.observed_ms.len() < 3 {
            self.observed_ms.push(ms);
        }
        self.observed_ms.len() == 3
    }

    pub fn reset(&mut self) {
        self.observed_ms.clear();
    }

    /// Returns the context of the first template all three slots match, if
    /// any.
    pub fn match_against<'a>(&self, templates: &'a [DistinctiveRing]) -> Option<&'a str> {
        if self.observed_ms.len() != 3 {
            return None;
        }
        templates
            .iter()
            .find(|t| (0..3).all(|i| slot_matches(t.slots_ms[i], t.range_ms[i], self.observed_ms[i])))
            .map(|t| t.context.as_str())
    }
}

fn slot_matches(expected_ms: i32, range_ms: i32, observed_ms: i32) -> bool {
    if expected_ms == -1 {
        return true;
    }
    (observed_ms - expected_ms).abs() <= range_ms.max(0)
}
