//! Clock configuration
//
// Every SERCOM constructor takes `&Clocks`, and `Clocks` can only be obtained
// from `ClockConfig::freeze`, which programs the clock generators first. That
// makes "clocks before peripherals" a property of the types instead of a
// property of static initialisation order.

use core::num::NonZeroU32;
use embedded_time::rate::Hertz;

/// Highest core and SERCOM clock the SAMD20/21 parts are rated for
pub const MAX_FREQUENCY: u32 = 48_000_000;

const DEFAULT_SYS_CLK: u32 = 48_000_000;

/// Clock configuration error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A frequency of zero was requested
    ZeroFrequency,
    /// A frequency above [`MAX_FREQUENCY`] was requested
    AboveMaximum,
}

/// Programs the chip's clock generators
///
/// Implemented by the board support code; `freeze` calls it exactly once
/// before handing out [`Clocks`].
pub trait ClockGenerator {
    /// Route `sys_clk` to the CPU and `sercom_clk` to the SERCOM core clock
    fn configure(&mut self, sys_clk: Hertz, sercom_clk: Hertz);
}

impl<G: ClockGenerator + ?Sized> ClockGenerator for &mut G {
    fn configure(&mut self, sys_clk: Hertz, sercom_clk: Hertz) {
        (**self).configure(sys_clk, sercom_clk)
    }
}

/// Frozen clock frequencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clocks {
    sys_clk: u32,
    sercom_clk: u32,
}

impl Clocks {
    /// CPU clock, used by the UART and I2C baud arithmetic
    pub const fn sys_clk(&self) -> Hertz {
        Hertz(self.sys_clk)
    }

    /// SERCOM reference clock, used by the SPI baud arithmetic
    pub const fn sercom_clk(&self) -> Hertz {
        Hertz(self.sercom_clk)
    }
}

/// Clock configurator
///
/// Unset frequencies default to 48 MHz for the CPU and to the CPU clock for
/// the SERCOM reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockConfig {
    sys_clk: Option<u32>,
    sercom_clk: Option<u32>,
}

impl ClockConfig {
    pub fn new() -> Self {
        ClockConfig::default()
    }

    /// Sets the desired CPU clock frequency
    pub fn sys_clk(mut self, freq: impl Into<Hertz>) -> Self {
        self.sys_clk = Some(freq.into().0);
        self
    }

    /// Sets the desired SERCOM reference clock frequency
    pub fn sercom_clk(mut self, freq: impl Into<Hertz>) -> Self {
        self.sercom_clk = Some(freq.into().0);
        self
    }

    /// Validate the configuration, program it through `generator` and freeze it
    pub fn freeze<G: ClockGenerator>(self, mut generator: G) -> Result<Clocks, Error> {
        let sys_clk = check(self.sys_clk.unwrap_or(DEFAULT_SYS_CLK))?;
        let sercom_clk = check(self.sercom_clk.unwrap_or(sys_clk.get()))?;

        generator.configure(Hertz(sys_clk.get()), Hertz(sercom_clk.get()));
        log::debug!(
            "clocks frozen: sys {} Hz, sercom {} Hz",
            sys_clk.get(),
            sercom_clk.get()
        );

        Ok(Clocks {
            sys_clk: sys_clk.get(),
            sercom_clk: sercom_clk.get(),
        })
    }
}

fn check(freq: u32) -> Result<NonZeroU32, Error> {
    let freq = NonZeroU32::new(freq).ok_or(Error::ZeroFrequency)?;
    if freq.get() > MAX_FREQUENCY {
        return Err(Error::AboveMaximum);
    }
    Ok(freq)
}
