//! SERCOM peripheral core
//!
//! One SERCOM instance runs exactly one personality at a time: UART, SPI
//! master, I2C master or I2C slave. [`Sercom`] owns the instance and keeps
//! the register protocol in one place:
//!
//! * every `init_*` call disables the block (if needed) and software-resets
//!   it before writing any configuration, so configuration only ever lands in
//!   the post-reset state;
//! * follow-up configuration (`init_frame`, `init_pads`, `init_spi_clock`) is
//!   only accepted while the block is configured for the matching
//!   personality and not yet enabled;
//! * enable-protected fields (bit order, baud, clock mode) are changed by
//!   disabling, writing and re-enabling, never by writing while enabled;
//! * every synchronisation wait goes through the instance's [`WaitPolicy`].
//!
//! The personality specific operations live in [`uart`], [`spi`] and
//! [`wire`]; they are all methods on [`Sercom`].
//!
//! ```ignore
//! let clocks = ClockConfig::new().freeze(&mut gclk)?;
//! let regs = Mmio::new(dp.SERCOM0);
//! let mut sercom = Sercom::<_, DefaultBaud>::new(regs, &clocks);
//! sercom.init_spi(SpiTxPad::Pad2Sck3, RxPad::Pad0, SpiCharSize::Eight, DataOrder::MsbFirst)?;
//! sercom.init_spi_clock(SpiClockMode::Mode0, 4_000_000)?;
//! sercom.enable_spi()?;
//! ```

use core::marker::PhantomData;
use embedded_time::rate::Hertz;

use crate::clock::Clocks;
use crate::wait::{Unbounded, WaitPolicy};

use self::baud::{BaudStrategy, DefaultBaud};
use self::regs::{ctrla, extract, syncbusy, Reg, Registers};

// Generates `is_<flag>_<personality>` queries for single register bits.
macro_rules! flag_queries {
    ($suffix:ident: $($(#[$doc:meta])* $name:ident => $reg:ident & $mask:expr;)*) => {
        paste::paste! {
            impl<R, B, W> $crate::sercom::Sercom<R, B, W>
            where
                R: $crate::sercom::regs::Registers,
                B: $crate::sercom::baud::BaudStrategy,
                W: $crate::wait::WaitPolicy,
            {
                $(
                    $(#[$doc])*
                    #[inline]
                    pub fn [<is_ $name _ $suffix>](&self) -> bool {
                        self.regs.read($crate::sercom::regs::Reg::$reg) & $mask != 0
                    }
                )*
            }
        }
    };
}

pub mod baud;
pub mod regs;
pub mod spi;
pub mod uart;
pub mod wire;

#[cfg(test)]
pub(crate) mod sim;

/// Peripheral core error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The wait policy gave up before the hardware finished
    Timeout,
    /// Configuration was attempted outside the post-reset state
    NotConfigurable { state: CoreState },
    /// The block is configured for another personality
    WrongPersonality {
        expected: Personality,
        found: Personality,
    },
}

/// Lifecycle of a SERCOM instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreState {
    /// Never configured since construction
    Disabled,
    /// Software reset done, no personality selected
    Reset,
    /// Personality selected, not enabled
    Configured,
    Enabled,
}

/// What the SERCOM block is currently configured as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Personality {
    None,
    Uart,
    Spi,
    I2cMaster,
    I2cSlave,
}

/// Bit order on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataOrder {
    MsbFirst = 0,
    LsbFirst = 1,
}

/// Pad used for received data (UART RX, SPI MISO)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxPad {
    Pad0 = 0,
    Pad1 = 1,
    Pad2 = 2,
    Pad3 = 3,
}

/// A SERCOM instance
///
/// `B` selects the UART baud arithmetic of the target, `W` how long the
/// core keeps polling the hardware.
pub struct Sercom<R, B = DefaultBaud, W = Unbounded> {
    regs: R,
    wait: W,
    state: CoreState,
    sys_clk: u32,
    ref_clk: u32,
    _baud: PhantomData<B>,
}

impl<R: Registers, B: BaudStrategy> Sercom<R, B, Unbounded> {
    /// Take ownership of a SERCOM instance
    ///
    /// Requiring `Clocks` ensures the clock tree is configured before the
    /// instance can be used.
    pub fn new(regs: R, clocks: &Clocks) -> Self {
        Sercom {
            regs,
            wait: Unbounded,
            state: CoreState::Disabled,
            sys_clk: clocks.sys_clk().0,
            ref_clk: clocks.sercom_clk().0,
            _baud: PhantomData,
        }
    }
}

impl<R: Registers, B: BaudStrategy, W: WaitPolicy> Sercom<R, B, W> {
    /// Replace the wait policy
    pub fn with_wait_policy<W2: WaitPolicy>(self, wait: W2) -> Sercom<R, B, W2> {
        Sercom {
            regs: self.regs,
            wait,
            state: self.state,
            sys_clk: self.sys_clk,
            ref_clk: self.ref_clk,
            _baud: PhantomData,
        }
    }

    pub fn wait_policy_mut(&mut self) -> &mut W {
        &mut self.wait
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    /// Personality as selected by the hardware `MODE` field
    ///
    /// `None` until a personality has been configured.
    pub fn personality(&self) -> Personality {
        match self.state {
            CoreState::Disabled | CoreState::Reset => Personality::None,
            CoreState::Configured | CoreState::Enabled => {
                match extract(self.regs.read(Reg::CtrlA), ctrla::MODE_POS, 3) {
                    ctrla::MODE_USART_EXT_CLK | ctrla::MODE_USART_INT_CLK => Personality::Uart,
                    ctrla::MODE_SPI_MASTER => Personality::Spi,
                    ctrla::MODE_I2C_MASTER => Personality::I2cMaster,
                    ctrla::MODE_I2C_SLAVE => Personality::I2cSlave,
                    _ => Personality::None,
                }
            }
        }
    }

    /// Whether `CTRLA.ENABLE` is set
    pub fn is_enabled(&self) -> bool {
        self.regs.read(Reg::CtrlA) & ctrla::ENABLE != 0
    }

    /// CPU clock the UART and I2C baud values are derived from
    pub fn sys_clk(&self) -> Hertz {
        Hertz(self.sys_clk)
    }

    /// Reference clock the SPI baud value is derived from
    pub fn ref_clk(&self) -> Hertz {
        Hertz(self.ref_clk)
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    /// Poll `done` under the wait policy
    fn poll<F: FnMut(&R) -> bool>(&mut self, what: &'static str, mut done: F) -> Result<(), Error> {
        let regs = &self.regs;
        if self.wait.wait_until(|| done(regs)) {
            Ok(())
        } else {
            log::warn!("sercom: gave up waiting for {}", what);
            Err(Error::Timeout)
        }
    }

    /// Boolean flavour of [`poll`](Self::poll) for data-path waits
    fn poll_flag<F: FnMut(&R) -> bool>(&mut self, what: &'static str, done: F) -> bool {
        self.poll(what, done).is_ok()
    }

    fn software_reset(&mut self) -> Result<(), Error> {
        self.regs.write(Reg::CtrlA, ctrla::SWRST);
        self.state = CoreState::Reset;
        self.poll("software reset", |r| {
            r.read(Reg::CtrlA) & ctrla::SWRST == 0 && !r.sync_busy(syncbusy::SWRST)
        })
    }

    fn write_enable(&mut self, on: bool) -> Result<(), Error> {
        self.poll("enable sync", |r| !r.sync_busy(syncbusy::ENABLE))?;
        self.regs.modify(Reg::CtrlA, |v| {
            if on {
                v | ctrla::ENABLE
            } else {
                v & !ctrla::ENABLE
            }
        });
        self.poll("enable sync", |r| !r.sync_busy(syncbusy::ENABLE))?;

        log::trace!("sercom: {}", if on { "enabled" } else { "disabled" });
        self.state = match (on, self.state) {
            (true, _) => CoreState::Enabled,
            (false, CoreState::Enabled) => CoreState::Configured,
            (false, state) => state,
        };
        Ok(())
    }

    /// Bring the block into the post-reset state, ready for configuration
    fn begin_configure(&mut self) -> Result<(), Error> {
        if self.is_enabled() {
            self.write_enable(false)?;
        }
        self.software_reset()
    }

    fn finish_configure(&mut self, personality: Personality) {
        self.state = CoreState::Configured;
        log::debug!("sercom: configured as {:?}", personality);
    }

    fn check_personality(&self, expected: Personality) -> Result<(), Error> {
        let found = self.personality();
        if found == expected {
            Ok(())
        } else if found == Personality::None {
            Err(Error::NotConfigurable { state: self.state })
        } else {
            Err(Error::WrongPersonality { expected, found })
        }
    }

    /// Configuration writes are only valid between `init_*` and `enable_*`
    fn require_configurable(&self, expected: Personality) -> Result<(), Error> {
        if self.state != CoreState::Configured {
            return Err(Error::NotConfigurable { state: self.state });
        }
        self.check_personality(expected)
    }

    fn enable_personality(&mut self, expected: Personality) -> Result<(), Error> {
        self.check_personality(expected)?;
        if self.state == CoreState::Enabled {
            return Ok(());
        }
        self.write_enable(true)
    }

    fn disable_personality(&mut self) -> Result<(), Error> {
        self.write_enable(false)
    }

    /// Change enable-protected fields: disable, `update`, enable
    fn protected_update<F: FnOnce(&mut R)>(
        &mut self,
        expected: Personality,
        update: F,
    ) -> Result<(), Error> {
        self.check_personality(expected)?;
        self.write_enable(false)?;
        update(&mut self.regs);
        self.write_enable(true)
    }
}
