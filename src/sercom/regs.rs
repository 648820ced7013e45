//! SERCOM register access
//!
//! The peripheral core never touches memory directly. It goes through the
//! [`Registers`] trait, which names the handful of registers shared by every
//! SERCOM personality. [`Mmio`] is the PAC-backed backend used on SAMD21.
//!
//! Bit positions follow the SAMD21 data sheet. There is no PAC for
//! SAMD20-class parts, so a SAMD20 board implements [`Registers`] itself and
//! reports synchronisation through `STATUS.SYNCBUSY` (see
//! [`syncbusy::STATUS_SYNCBUSY`]).

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
use crate::pac::sercom0;
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
use core::ops::Deref;

/// SERCOM registers, as seen by every personality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    CtrlA = 0,
    CtrlB = 1,
    Baud = 2,
    IntEnClr = 3,
    IntEnSet = 4,
    IntFlag = 5,
    Status = 6,
    SyncBusy = 7,
    Addr = 8,
    Data = 9,
}

impl Reg {
    /// Number of registers in the block
    pub const COUNT: usize = 10;
}

/// Raw access to one SERCOM instance
///
/// `INTFLAG` and the error bits of `STATUS` are write-one-to-clear, so never
/// use [`Registers::modify`] on them.
pub trait Registers {
    /// Read a register
    fn read(&self, reg: Reg) -> u32;

    /// Write a register
    fn write(&mut self, reg: Reg, value: u32);

    /// Read-modify-write a register
    #[inline]
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    /// Whether any of the `mask` synchronisation bits is still busy
    #[inline]
    fn sync_busy(&self, mask: u32) -> bool {
        self.read(Reg::SyncBusy) & mask != 0
    }
}

impl<T: Registers + ?Sized> Registers for &mut T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }

    fn sync_busy(&self, mask: u32) -> bool {
        (**self).sync_busy(mask)
    }
}

#[inline]
pub(crate) const fn field(value: u32, pos: u32, width: u32) -> u32 {
    (value & ((1 << width) - 1)) << pos
}

#[inline]
pub(crate) const fn extract(reg: u32, pos: u32, width: u32) -> u32 {
    (reg >> pos) & ((1 << width) - 1)
}

/// `CTRLA` bits common to every personality
pub mod ctrla {
    use super::field;

    pub const SWRST: u32 = 1 << 0;
    pub const ENABLE: u32 = 1 << 1;
    pub const MODE_POS: u32 = 2;
    pub const MODE_MASK: u32 = 0b111 << MODE_POS;
    pub const DORD: u32 = 1 << 30;

    pub const MODE_USART_EXT_CLK: u32 = 0;
    pub const MODE_USART_INT_CLK: u32 = 1;
    pub const MODE_SPI_SLAVE: u32 = 2;
    pub const MODE_SPI_MASTER: u32 = 3;
    pub const MODE_I2C_SLAVE: u32 = 4;
    pub const MODE_I2C_MASTER: u32 = 5;

    #[inline]
    pub const fn mode(mode: u32) -> u32 {
        field(mode, MODE_POS, 3)
    }
}

/// `SYNCBUSY` bits
pub mod syncbusy {
    pub const SWRST: u32 = 1 << 0;
    pub const ENABLE: u32 = 1 << 1;
    /// `CTRLB` on USART/SPI, `SYSOP` on I2C
    pub const SYSOP: u32 = 1 << 2;
    /// `STATUS.SYNCBUSY` on SAMD20-class parts, which have no `SYNCBUSY`
    /// register
    pub const STATUS_SYNCBUSY: u32 = 1 << 15;
}

/// USART personality bits
pub mod usart {
    use super::field;

    // CTRLA
    pub const fn sampr(value: u32) -> u32 {
        field(value, 13, 3)
    }
    pub const fn txpo(value: u32) -> u32 {
        field(value, 16, 2)
    }
    pub const fn rxpo(value: u32) -> u32 {
        field(value, 20, 2)
    }
    pub const fn form(value: u32) -> u32 {
        field(value, 24, 4)
    }
    pub const FORM_MASK: u32 = 0b1111 << 24;

    // CTRLB
    pub const fn chsize(value: u32) -> u32 {
        field(value, 0, 3)
    }
    pub const CHSIZE_MASK: u32 = 0b111;
    pub const SBMODE: u32 = 1 << 6;
    pub const PMODE: u32 = 1 << 13;
    pub const TXEN: u32 = 1 << 16;
    pub const RXEN: u32 = 1 << 17;

    // INTFLAG / INTENSET / INTENCLR
    pub const DRE: u32 = 1 << 0;
    pub const TXC: u32 = 1 << 1;
    pub const RXC: u32 = 1 << 2;
    pub const ERROR: u32 = 1 << 7;

    // STATUS
    pub const PERR: u32 = 1 << 0;
    pub const FERR: u32 = 1 << 1;
    pub const BUFOVF: u32 = 1 << 2;
    pub const STATUS_ERRORS: u32 = PERR | FERR | BUFOVF;
    pub const STATUS_RESET_VALUE: u32 = 0;
}

/// SPI personality bits
pub mod spi {
    use super::field;

    // CTRLA
    pub const fn dopo(value: u32) -> u32 {
        field(value, 16, 2)
    }
    pub const fn dipo(value: u32) -> u32 {
        field(value, 20, 2)
    }
    pub const CPHA: u32 = 1 << 28;
    pub const CPOL: u32 = 1 << 29;

    // CTRLB
    pub const fn chsize(value: u32) -> u32 {
        field(value, 0, 3)
    }
    pub const RXEN: u32 = 1 << 17;

    // INTFLAG
    pub const DRE: u32 = 1 << 0;
    pub const TXC: u32 = 1 << 1;
    pub const RXC: u32 = 1 << 2;

    // STATUS
    pub const BUFOVF: u32 = 1 << 2;
}

/// I2C master personality bits
pub mod i2cm {
    use super::field;

    // CTRLB
    pub const CMD_POS: u32 = 16;
    pub const CMD_MASK: u32 = 0b11 << CMD_POS;
    pub const ACKACT: u32 = 1 << 18;

    // BAUD
    pub const fn baud(value: u32) -> u32 {
        field(value, 0, 8)
    }

    // INTFLAG
    pub const MB: u32 = 1 << 0;
    pub const SB: u32 = 1 << 1;
    pub const ERROR: u32 = 1 << 7;

    // STATUS
    pub const BUSERR: u32 = 1 << 0;
    pub const ARBLOST: u32 = 1 << 1;
    pub const RXNACK: u32 = 1 << 2;
    pub const BUSSTATE_POS: u32 = 4;
    pub const BUSSTATE_MASK: u32 = 0b11 << BUSSTATE_POS;

    // ADDR
    pub const fn addr(value: u32) -> u32 {
        field(value, 0, 11)
    }
}

/// I2C slave personality bits
pub mod i2cs {
    use super::field;

    // CTRLB
    pub const CMD_POS: u32 = 16;
    pub const CMD_MASK: u32 = 0b11 << CMD_POS;
    pub const ACKACT: u32 = 1 << 18;

    // INTFLAG / INTENSET
    pub const PREC: u32 = 1 << 0;
    pub const AMATCH: u32 = 1 << 1;
    pub const DRDY: u32 = 1 << 2;

    // STATUS
    pub const RXNACK: u32 = 1 << 2;
    pub const DIR: u32 = 1 << 3;
    pub const SR: u32 = 1 << 4;

    // ADDR
    pub const GENCEN: u32 = 1 << 0;
    pub const fn addr(value: u32) -> u32 {
        field(value, 1, 10)
    }
    pub const fn addrmask(value: u32) -> u32 {
        field(value, 17, 10)
    }
}

/// Memory-mapped SERCOM instance, backed by the device PAC
///
/// Every `SERCOMn` of the PAC dereferences to the same register block, so one
/// backend covers all instances. Registers whose layout differs between
/// personalities are accessed through the view matching the current `MODE`.
#[cfg(any(feature = "samd21g", feature = "samd21j"))]
pub struct Mmio<S> {
    sercom: S,
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
impl<S> Mmio<S>
where
    S: Deref<Target = sercom0::RegisterBlock>,
{
    /// Take ownership of a PAC SERCOM instance
    pub fn new(sercom: S) -> Self {
        Mmio { sercom }
    }

    /// Release the PAC instance
    pub fn free(self) -> S {
        self.sercom
    }

    fn mode(&self) -> u32 {
        extract(self.sercom.usart().ctrla.read().bits(), ctrla::MODE_POS, 3)
    }
}

#[cfg(any(feature = "samd21g", feature = "samd21j"))]
#[allow(unused_unsafe)]
impl<S> Registers for Mmio<S>
where
    S: Deref<Target = sercom0::RegisterBlock>,
{
    fn read(&self, reg: Reg) -> u32 {
        let usart = self.sercom.usart();
        match reg {
            Reg::CtrlA => usart.ctrla.read().bits(),
            Reg::CtrlB => usart.ctrlb.read().bits(),
            // the I2C master view is the only one with a 32-bit BAUD
            Reg::Baud => self.sercom.i2cm().baud.read().bits(),
            Reg::IntEnClr => usart.intenclr.read().bits() as u32,
            Reg::IntEnSet => usart.intenset.read().bits() as u32,
            Reg::IntFlag => usart.intflag.read().bits() as u32,
            Reg::Status => usart.status.read().bits() as u32,
            Reg::SyncBusy => usart.syncbusy.read().bits(),
            Reg::Addr => self.sercom.i2cm().addr.read().bits(),
            Reg::Data => match self.mode() {
                ctrla::MODE_I2C_MASTER => self.sercom.i2cm().data.read().bits() as u32,
                ctrla::MODE_I2C_SLAVE => self.sercom.i2cs().data.read().bits() as u32,
                ctrla::MODE_SPI_MASTER | ctrla::MODE_SPI_SLAVE => {
                    self.sercom.spi().data.read().bits()
                }
                _ => usart.data.read().bits() as u32,
            },
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        let usart = self.sercom.usart();
        // SAFETY: the core only writes values assembled from the field
        // helpers of this module
        unsafe {
            match reg {
                Reg::CtrlA => usart.ctrla.write(|w| w.bits(value)),
                Reg::CtrlB => usart.ctrlb.write(|w| w.bits(value)),
                Reg::Baud => self.sercom.i2cm().baud.write(|w| w.bits(value)),
                Reg::IntEnClr => usart.intenclr.write(|w| w.bits(value as u8)),
                Reg::IntEnSet => usart.intenset.write(|w| w.bits(value as u8)),
                Reg::IntFlag => usart.intflag.write(|w| w.bits(value as u8)),
                Reg::Status => usart.status.write(|w| w.bits(value as u16)),
                Reg::SyncBusy => {}
                Reg::Addr => self.sercom.i2cm().addr.write(|w| w.bits(value)),
                Reg::Data => match self.mode() {
                    ctrla::MODE_I2C_MASTER => {
                        self.sercom.i2cm().data.write(|w| w.bits(value as u8))
                    }
                    ctrla::MODE_I2C_SLAVE => {
                        self.sercom.i2cs().data.write(|w| w.bits(value as u8))
                    }
                    ctrla::MODE_SPI_MASTER | ctrla::MODE_SPI_SLAVE => {
                        self.sercom.spi().data.write(|w| w.bits(value))
                    }
                    _ => usart.data.write(|w| w.bits(value as u16)),
                },
            }
        }
    }
}
