//! Monotonic time and delays
//!
//! [`Monotonic`] derives milliseconds and microseconds from a free-running
//! [`TickSource`] and provides blocking delays. The `*_yielding` variants
//! hand control to a caller-supplied background task on every poll, and
//! always call it at least once.

use crate::rtc::TickSource;
use embedded_hal::delay::DelayNs;
use embedded_time::{clock, fraction::Fraction, Clock, Instant};

/// Monotonic clock service over a tick source
pub struct Monotonic<S> {
    source: S,
}

impl<S: TickSource> Monotonic<S> {
    // evaluated at monomorphisation: a zero-rate source fails to build
    const NONZERO_RATE: () = assert!(S::TICK_HZ != 0, "tick source rate must not be zero");

    pub fn new(source: S) -> Self {
        let () = Self::NONZERO_RATE;
        Monotonic { source }
    }

    /// Release the tick source
    pub fn free(self) -> S {
        self.source
    }

    /// Raw counter value
    #[inline]
    pub fn now_ticks(&self) -> u32 {
        self.source.now_ticks()
    }

    /// Milliseconds since the counter started; wraps with the counter
    pub fn millis(&self) -> u32 {
        Self::ticks_to(self.now_ticks(), 1_000)
    }

    /// Microseconds since the counter started; wraps with the counter
    pub fn micros(&self) -> u32 {
        Self::ticks_to(self.now_ticks(), 1_000_000)
    }

    pub fn millis_to_ticks(ms: u32) -> u32 {
        Self::to_ticks(ms as u64, 1_000)
    }

    pub fn micros_to_ticks(us: u32) -> u32 {
        Self::to_ticks(us as u64, 1_000_000)
    }

    fn ticks_to(ticks: u32, per_second: u64) -> u32 {
        let () = Self::NONZERO_RATE;
        (ticks as u64 * per_second / S::TICK_HZ as u64) as u32
    }

    // rounds up so a delay never ends early
    fn to_ticks(amount: u64, per_second: u64) -> u32 {
        let () = Self::NONZERO_RATE;
        let ticks = (amount * S::TICK_HZ as u64 + per_second - 1) / per_second;
        ticks.min(u32::MAX as u64) as u32
    }

    /// Busy-wait for `ms` milliseconds
    pub fn delay_ms(&self, ms: u32) {
        self.wait_ticks(Self::millis_to_ticks(ms), || {});
    }

    /// Busy-wait for `us` microseconds
    pub fn delay_us(&self, us: u32) {
        self.wait_ticks(Self::micros_to_ticks(us), || {});
    }

    /// Wait for `ms` milliseconds, running `background` while waiting
    pub fn delay_ms_yielding<F: FnMut()>(&self, ms: u32, background: F) {
        self.wait_ticks(Self::millis_to_ticks(ms), background);
    }

    /// Wait for `us` microseconds, running `background` while waiting
    pub fn delay_us_yielding<F: FnMut()>(&self, us: u32, background: F) {
        self.wait_ticks(Self::micros_to_ticks(us), background);
    }

    fn wait_ticks<F: FnMut()>(&self, ticks: u32, mut background: F) {
        let start = self.now_ticks();
        loop {
            background();
            if self.now_ticks().wrapping_sub(start) >= ticks {
                break;
            }
        }
    }
}

impl<S: TickSource> Clock for Monotonic<S> {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, S::TICK_HZ);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        Ok(Instant::new(self.now_ticks()))
    }
}

impl<S: TickSource> DelayNs for Monotonic<S> {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = Self::to_ticks(ns as u64, 1_000_000_000);
        self.wait_ticks(ticks, || {});
    }

    fn delay_us(&mut self, us: u32) {
        self.wait_ticks(Self::micros_to_ticks(us), || {});
    }

    fn delay_ms(&mut self, ms: u32) {
        self.wait_ticks(Self::millis_to_ticks(ms), || {});
    }
}

impl<S: TickSource> embedded_hal_zero::blocking::delay::DelayMs<u32> for Monotonic<S> {
    fn delay_ms(&mut self, ms: u32) {
        self.wait_ticks(Self::millis_to_ticks(ms), || {});
    }
}

impl<S: TickSource> embedded_hal_zero::blocking::delay::DelayUs<u32> for Monotonic<S> {
    fn delay_us(&mut self, us: u32) {
        self.wait_ticks(Self::micros_to_ticks(us), || {});
    }
}
