//! Wall-clock pacing for the step loop.
//!
//! A [`Pacer`] measures how long one cycle took and sleeps off whatever
//! remains of the tick budget. A cycle that overruns its budget is
//! reported, and the next cycle starts immediately without trying to
//! catch up on lost time.

use std::time::{Duration, Instant};

/// What the pacer did at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// The cycle finished early; the pacer slept for the remainder.
    Slept(Duration),
    /// The cycle used its whole budget or more; no sleep happened.
    Overrun {
        /// Time the cycle actually took.
        elapsed: Duration,
        /// The tick budget it was held to.
        budget: Duration,
    },
}

/// Measures cycle time against a tick budget.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    started: Instant,
}

impl Pacer {
    /// Start timing a cycle now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Start timing from an earlier instant, such as when playback was
    /// requested.
    pub const fn starting_at(started: Instant) -> Self {
        Self { started }
    }

    /// Time elapsed since the cycle started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Decide how to finish a cycle that took `elapsed` against `budget`.
    ///
    /// A cycle exactly on budget counts as an overrun.
    pub fn plan(elapsed: Duration, budget: Duration) -> PaceOutcome {
        budget.checked_sub(elapsed).filter(|r| !r.is_zero()).map_or(
            PaceOutcome::Overrun { elapsed, budget },
            PaceOutcome::Slept,
        )
    }

    /// Finish the cycle: sleep off the remaining budget, if any.
    pub fn pace(&self, budget: Duration) -> PaceOutcome {
        let outcome = Self::plan(self.elapsed(), budget);
        if let PaceOutcome::Slept(remaining) = outcome {
            std::thread::sleep(remaining);
        }
        outcome
    }
}
