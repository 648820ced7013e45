//! SPI master personality

use super::baud::{self, BaudStrategy};
use super::regs::{ctrla, spi, Reg, Registers};
use super::{DataOrder, Error, Personality, RxPad, Sercom};
use crate::wait::WaitPolicy;

/// Pads carrying MOSI and SCK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiTxPad {
    /// MOSI on pad 0, SCK on pad 1
    Pad0Sck1 = 0,
    /// MOSI on pad 2, SCK on pad 3
    Pad2Sck3 = 1,
    /// MOSI on pad 3, SCK on pad 1
    Pad3Sck1 = 2,
    /// MOSI on pad 0, SCK on pad 3
    Pad0Sck3 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiCharSize {
    Eight = 0,
    Nine = 1,
}

/// Clock polarity and phase; bit 0 is CPHA, bit 1 is CPOL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiClockMode {
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

impl SpiClockMode {
    fn ctrla_bits(self) -> u32 {
        let mode = self as u32;
        let mut bits = 0;
        if mode & 0b01 != 0 {
            bits |= spi::CPHA;
        }
        if mode & 0b10 != 0 {
            bits |= spi::CPOL;
        }
        bits
    }
}

impl From<embedded_hal::spi::Mode> for SpiClockMode {
    fn from(mode: embedded_hal::spi::Mode) -> Self {
        use embedded_hal::spi::{Phase, Polarity};
        match (mode.polarity, mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiClockMode::Mode0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiClockMode::Mode1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiClockMode::Mode2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiClockMode::Mode3,
        }
    }
}

impl<R: Registers, B: BaudStrategy, W: WaitPolicy> Sercom<R, B, W> {
    /// Reset the block and configure it as an SPI master
    pub fn init_spi(
        &mut self,
        mosi: SpiTxPad,
        miso: RxPad,
        char_size: SpiCharSize,
        order: DataOrder,
    ) -> Result<(), Error> {
        self.begin_configure()?;

        let dord = if order == DataOrder::LsbFirst { ctrla::DORD } else { 0 };
        self.regs.write(
            Reg::CtrlA,
            ctrla::mode(ctrla::MODE_SPI_MASTER)
                | spi::dopo(mosi as u32)
                | spi::dipo(miso as u32)
                | dord,
        );
        self.regs
            .write(Reg::CtrlB, spi::chsize(char_size as u32) | spi::RXEN);

        self.finish_configure(Personality::Spi);
        Ok(())
    }

    /// Clock polarity, phase and rate, from the SERCOM reference clock
    pub fn init_spi_clock(&mut self, mode: SpiClockMode, baudrate: u32) -> Result<(), Error> {
        self.require_configurable(Personality::Spi)?;
        self.regs.modify(Reg::CtrlA, |v| v | mode.ctrla_bits());
        let baud = baud::synchronous(self.ref_clk, baudrate);
        self.regs.write(Reg::Baud, baud as u32);
        Ok(())
    }

    pub fn reset_spi(&mut self) -> Result<(), Error> {
        self.software_reset()
    }

    pub fn enable_spi(&mut self) -> Result<(), Error> {
        self.enable_personality(Personality::Spi)
    }

    pub fn disable_spi(&mut self) -> Result<(), Error> {
        self.disable_personality()
    }

    pub fn set_data_order_spi(&mut self, order: DataOrder) -> Result<(), Error> {
        self.protected_update(Personality::Spi, |regs| {
            regs.modify(Reg::CtrlA, |v| match order {
                DataOrder::LsbFirst => v | ctrla::DORD,
                DataOrder::MsbFirst => v & !ctrla::DORD,
            })
        })
    }

    pub fn get_data_order_spi(&self) -> DataOrder {
        if self.regs.read(Reg::CtrlA) & ctrla::DORD != 0 {
            DataOrder::LsbFirst
        } else {
            DataOrder::MsbFirst
        }
    }

    /// Run the bus at the reference clock divided by `divider`
    ///
    /// A zero divider is ignored and the current rate kept.
    pub fn set_baudrate_spi(&mut self, divider: u8) -> Result<(), Error> {
        if divider == 0 {
            return Ok(());
        }
        let baud = baud::synchronous(self.ref_clk, self.ref_clk / divider as u32);
        self.protected_update(Personality::Spi, |regs| {
            regs.write(Reg::Baud, baud as u32)
        })
    }

    pub fn set_clock_mode_spi(&mut self, mode: SpiClockMode) -> Result<(), Error> {
        self.protected_update(Personality::Spi, |regs| {
            regs.modify(Reg::CtrlA, |v| (v & !(spi::CPHA | spi::CPOL)) | mode.ctrla_bits())
        })
    }

    /// Exchange one byte
    ///
    /// Returns `None` if the wait policy gave up before the byte came back.
    pub fn transfer_data_spi(&mut self, data: u8) -> Option<u8> {
        self.write_data_spi(data);
        if !self.poll_flag("spi receive complete", |r| {
            r.read(Reg::IntFlag) & spi::RXC != 0
        }) {
            return None;
        }
        Some(self.read_data_spi())
    }

    /// Start shifting `data` out without waiting
    pub fn write_data_spi(&mut self, data: u8) {
        self.regs.write(Reg::Data, data as u32);
    }

    /// Last received byte
    pub fn read_data_spi(&mut self) -> u8 {
        self.regs.read(Reg::Data) as u8
    }

    /// Clear a raised buffer overflow
    pub fn acknowledge_overflow_spi(&mut self) {
        self.regs.write(Reg::Status, spi::BUFOVF);
    }
}

flag_queries! {
    spi:
    /// Set when a byte arrived before the previous one was read
    buffer_overflow_error => Status & spi::BUFOVF;
    data_register_empty => IntFlag & spi::DRE;
    transmit_complete => IntFlag & spi::TXC;
    receive_complete => IntFlag & spi::RXC;
}
