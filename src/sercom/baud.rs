//! Baud rate generation
//!
//! Asynchronous (UART) baud generation differs between SAMD generations.
//! SAMD21-class parts have a fractional generator, SAMD20-class parts only
//! the arithmetic one. Both are modelled as a [`BaudStrategy`] chosen when the
//! [`Sercom`](super::Sercom) type is named, never detected at runtime.
//!
//! | strategy       | register value                                  |
//! |----------------|-------------------------------------------------|
//! | [`Fractional`] | `BAUD.FP + 8 * BAUD.BAUD = 8 * f_ref / (S * f)` |
//! | [`Arithmetic`] | `BAUD = 65536 * (1 - S * f / f_ref)`            |
//!
//! where `S` is the oversampling rate (16 or 8).

use super::uart::SampleRate;

/// UART baud rate generator arithmetic
pub trait BaudStrategy {
    /// Value of the `CTRLA.SAMPR` field selecting this strategy at `rate`
    fn sample_rate_field(rate: SampleRate) -> u32;

    /// `BAUD` register value for `baud` bits per second from a `ref_hz` clock
    fn uart_baud(ref_hz: u32, rate: SampleRate, baud: u32) -> u16;

    /// The baud rate the hardware actually produces for a register value
    fn effective_baud(ref_hz: u32, rate: SampleRate, register: u16) -> u32;
}

/// Fractional baud generator (SAMD21 class)
#[derive(Debug, Clone, Copy, Default)]
pub struct Fractional;

/// Arithmetic baud generator (SAMD20 class)
#[derive(Debug, Clone, Copy, Default)]
pub struct Arithmetic;

/// Strategy selected for the target by cargo features
#[cfg(not(feature = "samd20"))]
pub type DefaultBaud = Fractional;

/// Strategy selected for the target by cargo features
#[cfg(feature = "samd20")]
pub type DefaultBaud = Arithmetic;

const FRAC_BAUD_MAX: u64 = 0x1FFF;
const FRAC_FP_POS: u32 = 13;

impl BaudStrategy for Fractional {
    fn sample_rate_field(rate: SampleRate) -> u32 {
        match rate {
            SampleRate::X16 => 1,
            SampleRate::X8 => 3,
        }
    }

    fn uart_baud(ref_hz: u32, rate: SampleRate, baud: u32) -> u16 {
        let times8 = (ref_hz as u64 * 8) / (rate.factor() as u64 * baud.max(1) as u64);
        let integer = (times8 / 8).min(FRAC_BAUD_MAX);
        let fraction = times8 % 8;
        (integer | fraction << FRAC_FP_POS) as u16
    }

    fn effective_baud(ref_hz: u32, rate: SampleRate, register: u16) -> u32 {
        let integer = (register as u64) & FRAC_BAUD_MAX;
        let fraction = (register as u64) >> FRAC_FP_POS;
        let eighths = 8 * integer + fraction;
        if eighths == 0 {
            return 0;
        }
        ((ref_hz as u64 * 8) / (rate.factor() as u64 * eighths)) as u32
    }
}

impl Arithmetic {
    /// Oversampling the receiver actually runs at
    ///
    /// `CTRLA.SAMPR` is reserved on SAMD20-class parts, which always sample
    /// 16 times per bit.
    pub fn oversampling(rate: SampleRate) -> SampleRate {
        if cfg!(feature = "samd20") {
            SampleRate::X16
        } else {
            rate
        }
    }
}

impl BaudStrategy for Arithmetic {
    fn sample_rate_field(rate: SampleRate) -> u32 {
        match Self::oversampling(rate) {
            SampleRate::X16 => 0,
            SampleRate::X8 => 2,
        }
    }

    fn uart_baud(ref_hz: u32, rate: SampleRate, baud: u32) -> u16 {
        if ref_hz == 0 {
            return 0;
        }
        let rate = Self::oversampling(rate);
        let ref_hz = ref_hz as u64;
        // 65536 * S * f / f_ref, rounded to nearest
        let step = (65536 * rate.factor() as u64 * baud as u64 + ref_hz / 2) / ref_hz;
        65536u64.saturating_sub(step).min(u16::MAX as u64) as u16
    }

    fn effective_baud(ref_hz: u32, rate: SampleRate, register: u16) -> u32 {
        let rate = Self::oversampling(rate);
        let step = 65536 - register as u64;
        ((ref_hz as u64 * step) / (rate.factor() as u64 * 65536)) as u32
    }
}

/// Synchronous (SPI) baud register value: `f_ref / (2 * f) - 1`
///
/// Requests faster than half the reference clock give the fastest setting,
/// requests slower than the register can express give the slowest.
pub fn synchronous(ref_hz: u32, baud: u32) -> u8 {
    let divisor = 2 * baud.max(1) as u64;
    let value = (ref_hz as u64 / divisor).saturating_sub(1);
    value.min(u8::MAX as u64) as u8
}

/// I2C master baud register value
///
/// `f_sys / (2 * f) - 5 - (f_sys[MHz] * t_rise[ns]) / 2000`, with the rise
/// time accounting for the bus pull-ups.
pub fn wire_master(sys_hz: u32, baud: u32, rise_time_ns: u32) -> u8 {
    let base = sys_hz as u64 / (2 * baud.max(1) as u64);
    let rise = ((sys_hz as u64 / 1_000_000) * rise_time_ns as u64) / 2000;
    base.saturating_sub(5)
        .saturating_sub(rise)
        .min(u8::MAX as u64) as u8
}
