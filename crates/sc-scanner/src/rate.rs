//! Smoothed event-rate estimation.
//!
//! [`RateWatcher`] turns a stream of ticks (one per filesystem entry) into a
//! rate in ticks per second, averaged over the last few samples so progress
//! output stays steady without reporting on every entry.

use std::collections::VecDeque;
use std::time::Instant;

/// Default number of instantaneous samples averaged together.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Estimates a smoothed tick rate.
///
/// Each [`tick()`](Self::tick) computes an instantaneous rate from the ticks
/// accumulated since the previous sample and the wall time elapsed, pushes it
/// into a fixed-size window, and returns the window mean. Ticks landing on
/// the same clock reading as the previous sample are accumulated and the last
/// rate is returned unchanged.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use sc_scanner::RateWatcher;
///
/// let start = Instant::now();
/// let mut watcher = RateWatcher::starting_at(start, 4);
///
/// for i in 1..=4 {
///     watcher.tick_at(start + Duration::from_millis(250 * i));
/// }
/// assert!((watcher.rate().unwrap() - 4.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct RateWatcher {
    /// Total ticks observed.
    ticks: u64,
    /// Tick count at the previous sample.
    last_ticks: u64,
    /// Clock reading at the previous sample.
    last_instant: Instant,
    /// Mean of `window` as of the previous sample.
    current: f64,
    /// Most recent instantaneous rates, oldest first.
    window: VecDeque<f64>,
    /// Maximum length of `window`.
    capacity: usize,
}

impl RateWatcher {
    /// Creates a watcher averaging over `window` samples, starting now.
    ///
    /// A window of zero is treated as one.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self::starting_at(Instant::now(), window)
    }

    /// Creates a watcher whose first sample is measured from `start`.
    #[must_use]
    pub fn starting_at(start: Instant, window: usize) -> Self {
        let capacity = window.max(1);
        Self {
            ticks: 0,
            last_ticks: 0,
            last_instant: start,
            current: 0.0,
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records one tick at the current time and returns the smoothed rate.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Records one tick observed at `now` and returns the smoothed rate.
    ///
    /// A `now` that is not after the previous sample counts as zero elapsed
    /// time: the tick is accumulated and the previous rate is returned.
    #[allow(clippy::cast_precision_loss)] // Tick counts are display-only
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        self.ticks += 1;

        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed.is_zero() {
            return self.current;
        }

        let ticks_since_last = self.ticks - self.last_ticks;
        let sample = ticks_since_last as f64 / elapsed.as_secs_f64();

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.current = self.window.iter().sum::<f64>() / self.window.len() as f64;

        self.last_instant = now;
        self.last_ticks = self.ticks;

        self.current
    }

    /// Returns the smoothed rate, or `None` before the first sample.
    #[inline]
    #[must_use]
    pub fn rate(&self) -> Option<f64> {
        (!self.window.is_empty()).then_some(self.current)
    }

    /// Returns the total number of ticks recorded.
    #[inline]
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.ticks
    }

    /// Returns the configured window size.
    #[inline]
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.capacity
    }
}

impl Default for RateWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}
