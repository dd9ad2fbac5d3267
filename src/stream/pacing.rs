// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// One rung of the pacing table: backlogs larger than `backlog_above`
/// characters wait `delay` between emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingStep {
    pub backlog_above: usize,
    pub delay: Duration,
}

impl PacingStep {
    pub const fn new(backlog_above: usize, delay_ms: u64) -> Self {
        Self {
            backlog_above,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

pub const DEFAULT_STEPS: [PacingStep; 3] = [
    PacingStep::new(30, 5),
    PacingStep::new(20, 10),
    PacingStep::new(10, 20),
];
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(5);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(40);

/// Backlog-dependent per-character delay.
///
/// A longer backlog never waits longer than a shorter one, as long as the
/// step table itself is monotonic (see [`PacingSchedule::is_monotonic`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingSchedule {
    /// Sorted by descending `backlog_above`.
    steps: Vec<PacingStep>,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for PacingSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS.to_vec(), DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl PacingSchedule {
    pub fn new(mut steps: Vec<PacingStep>, min_delay: Duration, max_delay: Duration) -> Self {
        steps.sort_by(|a, b| b.backlog_above.cmp(&a.backlog_above));
        Self {
            steps,
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    /// No artificial delay at all.
    pub fn immediate() -> Self {
        Self::new(Vec::new(), Duration::ZERO, Duration::ZERO)
    }

    pub fn delay_for(&self, backlog: usize) -> Duration {
        let delay = self
            .steps
            .iter()
            .find(|step| backlog > step.backlog_above)
            .map(|step| step.delay)
            .unwrap_or(self.max_delay);
        delay.clamp(self.min_delay, self.max_delay)
    }

    /// Delays never grow as the backlog threshold grows.
    pub fn is_monotonic(&self) -> bool {
        self.steps.windows(2).all(|w| w[0].delay <= w[1].delay)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}
