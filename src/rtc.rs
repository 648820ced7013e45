/*!
  # Real Time Clock
  The RTC in 32-bit counter mode is the free-running tick source behind the
  monotonic clock service in [`delay`](crate::delay).

  ## Initialisation example
  ```ignore
    // RTC clocked from the 32.768 kHz oscillator, already running in mode 0
    let rtc = Rtc::<32_768>::new(dp.RTC);
    let clock = Monotonic::new(rtc);
  ```
*/

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
use crate::pac::RTC;

/// A free-running counter
pub trait TickSource {
    /// Counter frequency
    const TICK_HZ: u32;

    /// Current counter value; wraps at `u32::MAX`
    fn now_ticks(&self) -> u32;
}

/// `READREQ.ADDR` of the mode 0 `COUNT` register
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
const COUNT_ADDR: u8 = 0x10;

/// RTC in mode 0 (32-bit counter), clocked at `HZ`
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
pub struct Rtc<const HZ: u32> {
    rtc: RTC,
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
impl<const HZ: u32> Rtc<HZ> {
    /// Take the RTC, already configured for mode 0 and running at `HZ`, and
    /// request continuous count synchronisation
    pub fn new(rtc: RTC) -> Self {
        // ADDR has no field writer in the PAC, so assemble the word:
        // RREQ (bit 15) | RCONT (bit 14) | ADDR
        rtc.mode0()
            .readreq
            .write(|w| unsafe { w.bits((1 << 15) | (1 << 14) | COUNT_ADDR as u16) });
        Rtc { rtc }
    }

    /// Release the RTC
    pub fn free(self) -> RTC {
        self.rtc
    }
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
impl<const HZ: u32> TickSource for Rtc<HZ> {
    const TICK_HZ: u32 = HZ;

    fn now_ticks(&self) -> u32 {
        self.rtc.mode0().count.read().bits()
    }
}

impl<T: TickSource> TickSource for &T {
    const TICK_HZ: u32 = T::TICK_HZ;

    fn now_ticks(&self) -> u32 {
        (**self).now_ticks()
    }
}
