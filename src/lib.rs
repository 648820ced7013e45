//! # HAL for the SERCOM peripherals of SAMD microcontrollers
//!
//! This is an implementation of the [`embedded-hal`] traits for the SERCOM
//! serial communication blocks of SAMD21 and SAMD20 class parts, plus the
//! millisecond / microsecond time base the drivers wait on.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//!
//! # Usage
//!
//! A [`sercom::Sercom`] is the shared peripheral core. It is handed to one
//! front-end ([`serial::Serial`], [`spi::Spi`] or [`wire::Wire`]) which owns
//! it for as long as that personality is in use.
//!
//! ## Commonly used setup
//!
//! ```ignore
//! // Freeze the clock tree; every SERCOM constructor needs the result
//! let clocks = ClockConfig::new()
//!     .sys_clk(48.MHz())
//!     .freeze(&mut gclk)?;
//!
//! let sercom = Sercom::new(Mmio::new(dp.SERCOM0), &clocks);
//! let mut serial = Serial::new(sercom, port, pins, pads);
//! serial.begin(UartConfig::default())?;
//! ```
//!
//! The `samd21g` (default) and `samd21j` features select the device PAC the
//! memory-mapped backends are built on. Building with `samd20` and no PAC
//! feature selects the SAMD20 baud generator; the board then supplies its
//! own [`sercom::Registers`] implementation.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "samd21g")]
pub use atsamd21g as pac;

#[cfg(all(feature = "samd21j", not(feature = "samd21g")))]
pub use atsamd21j as pac;

pub mod clock;
pub mod delay;
pub mod gpio;
pub mod interrupts;
pub mod rtc;
pub mod sercom;
pub mod serial;
pub mod spi;
pub mod wait;
pub mod wire;

/// HAL crate prelude
pub mod prelude {
    pub use crate::rtc::TickSource as _samd_sercom_hal_rtc_TickSource;
    pub use embedded_time::rate::Extensions;
}
