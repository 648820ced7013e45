//! Wait-until policies
//!
//! Every hardware wait in this crate (synchronisation, data register empty,
//! receive complete, I2C bus flags) is expressed as "poll until a condition
//! holds". The policy decides how long to keep polling. [`Unbounded`] is the
//! default and matches bare-metal expectations: a working peripheral always
//! finishes. [`Bounded`] and [`Deadline`] give up, which the caller sees as a
//! timeout.
//!
//! ```ignore
//! let mut sercom = Sercom::<_, DefaultBaud>::new(regs, &clocks)
//!     .with_wait_policy(Bounded::new(10_000));
//! ```

use crate::delay::Monotonic;
use crate::rtc::TickSource;

/// How long to keep polling a hardware condition
pub trait WaitPolicy {
    /// Poll `done` until it returns `true`
    ///
    /// Returns `false` if the policy gave up first.
    fn wait_until<F: FnMut() -> bool>(&mut self, done: F) -> bool;
}

impl<W: WaitPolicy + ?Sized> WaitPolicy for &mut W {
    #[inline]
    fn wait_until<F: FnMut() -> bool>(&mut self, done: F) -> bool {
        (**self).wait_until(done)
    }
}

/// Poll forever
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl WaitPolicy for Unbounded {
    #[inline]
    fn wait_until<F: FnMut() -> bool>(&mut self, mut done: F) -> bool {
        while !done() {
            core::hint::spin_loop();
        }
        true
    }
}

/// Poll at most a fixed number of times
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bounded {
    max_polls: u32,
    last_polls: u32,
}

impl Bounded {
    pub const fn new(max_polls: u32) -> Self {
        Bounded {
            max_polls,
            last_polls: 0,
        }
    }

    /// Number of polls the most recent wait used
    pub fn last_polls(&self) -> u32 {
        self.last_polls
    }
}

impl WaitPolicy for Bounded {
    fn wait_until<F: FnMut() -> bool>(&mut self, mut done: F) -> bool {
        self.last_polls = 0;
        while self.last_polls < self.max_polls {
            self.last_polls += 1;
            if done() {
                return true;
            }
        }
        false
    }
}

/// Poll until a number of clock ticks has elapsed
pub struct Deadline<'a, S> {
    clock: &'a Monotonic<S>,
    ticks: u32,
}

impl<'a, S: TickSource> Deadline<'a, S> {
    /// Give up after `ticks` ticks of `clock`
    pub fn new(clock: &'a Monotonic<S>, ticks: u32) -> Self {
        Deadline { clock, ticks }
    }

    /// Give up after `us` microseconds
    pub fn micros(clock: &'a Monotonic<S>, us: u32) -> Self {
        Deadline::new(clock, Monotonic::<S>::micros_to_ticks(us))
    }
}

impl<'a, S: TickSource> WaitPolicy for Deadline<'a, S> {
    fn wait_until<F: FnMut() -> bool>(&mut self, mut done: F) -> bool {
        let start = self.clock.now_ticks();
        loop {
            if done() {
                return true;
            }
            if self.clock.now_ticks().wrapping_sub(start) >= self.ticks {
                // one last look, the condition may have landed while we read the clock
                return done();
            }
        }
    }
}
