//! The logtap emission cadence
//!
//! This library paces the logtap runner. A [`Cadence`] fires immediately the
//! first time it is waited on and thereafter no sooner than one interval after
//! the previous fire. The next deadline is computed from the tick the previous
//! fire actually happened at, not from a fixed origin, so drift accumulates
//! but work done after a fire never pushes the following deadline out.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

use async_trait::async_trait;
use tokio::time::{self, Duration, Instant};

/// Waits shorter than this many ticks are below tokio's timer resolution and
/// are served by yielding rather than sleeping.
pub const TIMER_RESOLUTION_TICKS: u64 = 1_000;

#[async_trait]
/// The `Clock` used by every [`Cadence`]. One tick is one microsecond.
pub trait Clock {
    /// The number of ticks elapsed since the clock was created.
    fn ticks_elapsed(&self) -> u64;
    /// Wait for `ticks` amount of time.
    async fn wait(&self, ticks: u64);
}

#[derive(Debug, Clone, Copy)]
/// A [`Clock`] backed by tokio's timer.
pub struct RealClock {
    start: Instant,
}

impl Default for RealClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for RealClock {
    /// Microseconds since this clock was created, saturating at `u64::MAX`.
    fn ticks_elapsed(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    async fn wait(&self, ticks: u64) {
        if ticks < TIMER_RESOLUTION_TICKS {
            tokio::task::yield_now().await;
        } else {
            time::sleep(Duration::from_micros(ticks)).await;
        }
    }
}

#[derive(Debug)]
/// Paces a loop to one fire per interval.
pub struct Cadence<C = RealClock> {
    metronome: Metronome,
    clock: C,
}

impl Cadence<RealClock> {
    /// Create a new `Cadence` driven by the real clock.
    ///
    /// Intervals longer than `u64::MAX` microseconds saturate.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, RealClock::default())
    }
}

impl<C> Cadence<C>
where
    C: Clock + Send + Sync,
{
    /// Create a new `Cadence` driven by `clock`.
    #[must_use]
    pub fn with_clock(interval: Duration, clock: C) -> Self {
        let ticks = u64::try_from(interval.as_micros()).unwrap_or(u64::MAX);
        Self {
            metronome: Metronome::new(ticks),
            clock,
        }
    }

    /// The configured interval, in ticks.
    #[must_use]
    pub fn interval_ticks(&self) -> u64 {
        self.metronome.interval
    }

    /// Wait until the next fire is due. The first call returns immediately.
    ///
    /// Cancelling this future before it resolves leaves the cadence as it
    /// was: only a completed wait counts as a fire.
    pub async fn wait(&mut self) {
        loop {
            let slop = self.metronome.request(self.clock.ticks_elapsed());
            if slop == 0 {
                break;
            }
            self.clock.wait(slop).await;
        }
    }
}

/// The non-async interior of [`Cadence`].
#[derive(Debug, Clone, Copy)]
struct Metronome {
    /// Ticks between fires.
    interval: u64,
    /// The tick at which the next fire is due. `None` until the first fire.
    due: Option<u64>,
}

impl Metronome {
    fn new(interval: u64) -> Self {
        Self {
            interval,
            due: None,
        }
    }

    /// Given the absolute `ticks_elapsed` return how many ticks the caller
    /// must wait before the next fire. A return of zero is a fire and re-arms
    /// the metronome from `ticks_elapsed`.
    fn request(&mut self, ticks_elapsed: u64) -> u64 {
        match self.due {
            Some(due) if ticks_elapsed < due => due - ticks_elapsed,
            _ => {
                self.due = Some(ticks_elapsed.saturating_add(self.interval));
                0
            }
        }
    }
}
