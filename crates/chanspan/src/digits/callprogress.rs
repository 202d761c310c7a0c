// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Busy-detect cadence matcher (SPEC_FULL.md §11 supplement): a real
//! tone-on/tone-off state machine instead of a single-shot timer, so a
//! call-progress tone with the wrong cadence doesn't false-positive as busy.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitTone,
    Tone,
    Silence,
}

/// Matches alternating tone/silence runs against a configured
/// `(tone_ms, silence_ms)` cadence, counting consecutive matching cycles.
#[derive(Debug)]
pub struct BusyDetector {
    pattern: (u32, u32),
    tolerance_ms: u32,
    required_cycles: u32,
    phase: Phase,
    run_ms: u32,
    matched_cycles: u32,
}

impl BusyDetector {
    pub fn new(pattern: (u32, u32), required_cycles: u32) -> Self {
        BusyDetector {
            pattern,
            tolerance_ms: pattern.0.max(pattern.1) / 4,
            required_cycles,
            phase: Phase::WaitTone,
            run_ms: 0,
            matched_cycles: 0,
        }
    }

    fn within_tolerance(&self, observed: u32, expected: u32) -> bool {
        observed.abs_diff(expected) <= self.tolerance_ms
    }

    /// Feed one tone-energy sample window; `present` is whether tone energy
    /// was detected in this window, `window_ms` its duration. Returns `true`
    /// once `required_cycles` consecutive on/off runs matched the pattern.
    pub fn feed(&mut self, present: bool, window_ms: u32) -> bool {
        match self.phase {
            Phase::WaitTone => {
                if present {
                    self.phase = Phase::Tone;
                    self.run_ms = window_ms;
                }
            }
            Phase::Tone => {
                if present {
                    self.run_ms += window_ms;
                } else {
                    let tone_ok = self.within_tolerance(self.run_ms, self.pattern.0);
                    self.phase = Phase::Silence;
                    self.run_ms = window_ms;
                    if !tone_ok {
                        self.matched_cycles = 0;
                    }
                }
            }
            Phase::Silence => {
                if !present {
                    self.run_ms += window_ms;
                } else {
                    let silence_ok = self.within_tolerance(self.run_ms, self.pattern.1);
                    if silence_ok {
                        self.matched_cycles += 1;
                    } else {
                        self.matched_cycles = 0;
                    }
                    self.phase = Phase::Tone;
                    self.run_ms = window_ms;
                }
            }
        }
        self.matched_cycles >= self.required_cycles
    }

    pub fn reset(&mut self) {
        self.phase = Phase::WaitTone;
        self.run_ms = 0;
        self.matched_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_cadence_over_required_cycles_detects_busy() {
        let mut d = BusyDetector::new((500, 500), 2);
        let mut detected = false;
        for _ in 0..2 {
            detected |= d.feed(true, 500);
            detected |= d.feed(false, 500);
        }
        assert!(detected);
    }

    #[test]
    fn irregular_cadence_never_accumulates_cycles() {
        let mut d = BusyDetector::new((500, 500), 2);
        let mut detected = false;
        detected |= d.feed(true, 200);
        detected |= d.feed(false, 900);
        detected |= d.feed(true, 500);
        detected |= d.feed(false, 500);
        assert!(!detected);
    }

    #[test]
    fn reset_clears_accumulated_progress() {
        let mut d = BusyDetector::new((500, 500), 3);
        d.feed(true, 500);
        d.feed(false, 500);
        d.reset();
        assert!(!d.feed(true, 500));
    }
}
