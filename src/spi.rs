/*!
  # Serial Peripheral Interface
  SPI master front-end over a [`Sercom`]. Settings are applied with
  [`Spi::begin`] or per transaction with [`Spi::begin_transaction`], which
  also masks the interrupt sources registered through
  [`Spi::using_interrupt`] until [`Spi::end_transaction`].

  ## Example
  ```ignore
    let mut spi = Spi::new(sercom, port, irq, pins, pads);
    spi.begin()?;
    spi.using_interrupt(InterruptSource::External(4));

    spi.begin_transaction(SpiSettings::new(1.MHz(), DataOrder::MsbFirst, SpiClockMode::Mode0))?;
    let id = spi.transfer16(0x9F00)?;
    spi.end_transaction();
  ```
*/

use embedded_hal::spi::{ErrorKind, ErrorType, SpiBus};
use embedded_time::rate::Hertz;

use crate::gpio::{PinControl, SercomPin};
use crate::interrupts::{InterruptControl, InterruptSource, EXTERNAL_NUM_INTERRUPTS};
use crate::sercom::baud::{BaudStrategy, DefaultBaud};
use crate::sercom::regs::Registers;
use crate::sercom::spi::{SpiCharSize, SpiClockMode, SpiTxPad};
use crate::sercom::{self, DataOrder, RxPad, Sercom};
use crate::wait::{Unbounded, WaitPolicy};

/// SPI error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Overrun occurred
    Overrun,
    /// The wait policy gave up on a transfer
    Timeout,
    /// The peripheral rejected a configuration step
    Config(sercom::Error),
}

impl From<sercom::Error> for Error {
    fn from(e: sercom::Error) -> Self {
        match e {
            sercom::Error::Timeout => Error::Timeout,
            e => Error::Config(e),
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Overrun => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// Transfer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub clock: Hertz,
    pub bit_order: DataOrder,
    pub mode: SpiClockMode,
}

impl SpiSettings {
    pub fn new(clock: impl Into<Hertz>, bit_order: DataOrder, mode: SpiClockMode) -> Self {
        SpiSettings {
            clock: clock.into(),
            bit_order,
            mode,
        }
    }
}

impl Default for SpiSettings {
    /// 4 MHz, MSB first, mode 0
    fn default() -> Self {
        SpiSettings::new(Hertz(4_000_000), DataOrder::MsbFirst, SpiClockMode::Mode0)
    }
}

/// The three signal pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiPins {
    pub miso: SercomPin,
    pub sck: SercomPin,
    pub mosi: SercomPin,
}

/// SERCOM pads the pins are wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiPads {
    pub tx: SpiTxPad,
    pub rx: RxPad,
}

/// Which interrupts a transaction masks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptMode {
    None,
    /// The registered EIC lines
    External,
    /// Everything; cannot be narrowed again
    Global,
}

pub struct Spi<R, P, I, B = DefaultBaud, W = Unbounded> {
    sercom: Sercom<R, B, W>,
    pins: P,
    irq: I,
    pin_map: SpiPins,
    pads: SpiPads,
    pending: SpiSettings,
    initialized: bool,
    interrupt_mode: InterruptMode,
    interrupt_mask: u32,
    interrupt_save: bool,
}

impl<R, P, I, B, W> Spi<R, P, I, B, W>
where
    R: Registers,
    P: PinControl,
    I: InterruptControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    pub fn new(sercom: Sercom<R, B, W>, pins: P, irq: I, pin_map: SpiPins, pads: SpiPads) -> Self {
        Spi {
            sercom,
            pins,
            irq,
            pin_map,
            pads,
            pending: SpiSettings::default(),
            initialized: false,
            interrupt_mode: InterruptMode::None,
            interrupt_mask: 0,
            interrupt_save: false,
        }
    }

    /// Initialise once, then apply the current settings
    ///
    /// The settings are the defaults unless changed with
    /// [`set_bit_order`](Self::set_bit_order),
    /// [`set_data_mode`](Self::set_data_mode) or
    /// [`set_clock_divider`](Self::set_clock_divider).
    pub fn begin(&mut self) -> Result<(), Error> {
        self.init();
        self.config(self.pending)
    }

    fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.interrupt_mode = InterruptMode::None;
        self.interrupt_save = false;
        self.interrupt_mask = 0;
        self.initialized = true;
    }

    /// Route the pins and program `settings` into the peripheral
    pub fn config(&mut self, settings: SpiSettings) -> Result<(), Error> {
        self.pins.into_peripheral(self.pin_map.miso);
        self.pins.into_peripheral(self.pin_map.sck);
        self.pins.into_peripheral(self.pin_map.mosi);

        self.sercom
            .init_spi(self.pads.tx, self.pads.rx, SpiCharSize::Eight, settings.bit_order)?;
        self.sercom.init_spi_clock(settings.mode, settings.clock.0)?;
        self.sercom.enable_spi()?;
        Ok(())
    }

    /// Reset the peripheral and park the pins high
    ///
    /// Safe to call more than once.
    pub fn end(&mut self) -> Result<(), Error> {
        let reset = if self.initialized {
            self.initialized = false;
            self.sercom.reset_spi()
        } else {
            Ok(())
        };
        self.pins.into_output_high(self.pin_map.miso.pin);
        self.pins.into_output_high(self.pin_map.sck.pin);
        self.pins.into_output_high(self.pin_map.mosi.pin);
        reset.map_err(Error::from)
    }

    /// Mask `source` for the duration of every transaction
    pub fn using_interrupt(&mut self, source: InterruptSource) {
        let line = match source {
            InterruptSource::NotAnInterrupt | InterruptSource::Nmi => return,
            InterruptSource::External(n) if n < EXTERNAL_NUM_INTERRUPTS => Some(n),
            InterruptSource::External(_) | InterruptSource::Peripheral(_) => None,
        };

        self.with_interrupts_masked(|spi| match line {
            _ if spi.interrupt_mode == InterruptMode::Global => {}
            Some(n) => {
                spi.interrupt_mode = InterruptMode::External;
                spi.interrupt_mask |= 1 << n;
            }
            None => spi.interrupt_mode = InterruptMode::Global,
        });
    }

    /// Stop masking `source`
    ///
    /// Global masking stays global. External lines share a single mask, so
    /// this removes the line no matter how often it was registered.
    pub fn not_using_interrupt(&mut self, source: InterruptSource) {
        let line = match source {
            InterruptSource::NotAnInterrupt | InterruptSource::Nmi => return,
            InterruptSource::External(n) if n < EXTERNAL_NUM_INTERRUPTS => n,
            _ => return,
        };
        if self.interrupt_mode == InterruptMode::Global {
            return;
        }

        self.with_interrupts_masked(|spi| {
            spi.interrupt_mask &= !(1 << line);
            if spi.interrupt_mask == 0 {
                spi.interrupt_mode = InterruptMode::None;
            }
        });
    }

    fn with_interrupts_masked<F: FnOnce(&mut Self)>(&mut self, f: F) {
        let restore = self.irq.interrupts_enabled();
        self.irq.disable_interrupts();
        f(self);
        if restore {
            self.irq.enable_interrupts();
        }
    }

    pub fn interrupt_mode(&self) -> InterruptMode {
        self.interrupt_mode
    }

    /// Mask the registered interrupts and apply `settings`
    pub fn begin_transaction(&mut self, settings: SpiSettings) -> Result<(), Error> {
        match self.interrupt_mode {
            InterruptMode::None => {}
            InterruptMode::Global => {
                self.interrupt_save = self.irq.interrupts_enabled();
                self.irq.disable_interrupts();
            }
            InterruptMode::External => self.irq.disable_external(self.interrupt_mask),
        }
        self.config(settings)
    }

    /// Undo the masking done by [`begin_transaction`](Self::begin_transaction)
    pub fn end_transaction(&mut self) {
        match self.interrupt_mode {
            InterruptMode::None => {}
            InterruptMode::Global => {
                if self.interrupt_save {
                    self.irq.enable_interrupts();
                }
            }
            InterruptMode::External => self.irq.enable_external(self.interrupt_mask),
        }
    }

    /// Bit order for the next [`begin`](Self::begin)
    pub fn set_bit_order(&mut self, order: DataOrder) {
        self.pending.bit_order = order;
    }

    /// Clock mode for the next [`begin`](Self::begin)
    pub fn set_data_mode(&mut self, mode: SpiClockMode) {
        self.pending.mode = mode;
    }

    /// Clock for the next [`begin`](Self::begin), as a divider of the CPU
    /// clock; zero is ignored
    pub fn set_clock_divider(&mut self, divider: u8) {
        if divider == 0 {
            return;
        }
        self.pending.clock = Hertz(self.sercom.sys_clk().0 / divider as u32);
    }

    /// Exchange one byte
    pub fn transfer(&mut self, data: u8) -> Result<u8, Error> {
        let received = self.sercom.transfer_data_spi(data).ok_or(Error::Timeout)?;
        if self.sercom.is_buffer_overflow_error_spi() {
            self.sercom.acknowledge_overflow_spi();
            return Err(Error::Overrun);
        }
        Ok(received)
    }

    /// Exchange two bytes, in the order given by the configured bit order
    pub fn transfer16(&mut self, data: u16) -> Result<u16, Error> {
        let [msb, lsb] = data.to_be_bytes();
        let (msb, lsb) = match self.sercom.get_data_order_spi() {
            DataOrder::LsbFirst => {
                let lsb = self.transfer(lsb)?;
                (self.transfer(msb)?, lsb)
            }
            DataOrder::MsbFirst => {
                let msb = self.transfer(msb)?;
                (msb, self.transfer(lsb)?)
            }
        };
        Ok(u16::from_be_bytes([msb, lsb]))
    }

    /// Exchange `buf` in place
    pub fn transfer_buffer(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for byte in buf.iter_mut() {
            *byte = self.transfer(*byte)?;
        }
        Ok(())
    }

    pub fn sercom(&self) -> &Sercom<R, B, W> {
        &self.sercom
    }

    pub fn interrupts(&self) -> &I {
        &self.irq
    }

    /// Release the peripheral, pin service and interrupt controller
    pub fn release(self) -> (Sercom<R, B, W>, P, I) {
        (self.sercom, self.pins, self.irq)
    }
}

impl<R, P, I, B, W> ErrorType for Spi<R, P, I, B, W> {
    type Error = Error;
}

impl<R, P, I, B, W> SpiBus<u8> for Spi<R, P, I, B, W>
where
    R: Registers,
    P: PinControl,
    I: InterruptControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = Spi::transfer(self, 0x00)?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for word in words {
            Spi::transfer(self, *word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for i in 0..read.len().max(write.len()) {
            let received = Spi::transfer(self, write.get(i).copied().unwrap_or(0x00))?;
            if let Some(slot) = read.get_mut(i) {
                *slot = received;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_buffer(words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // every exchange already waited for its byte to come back
        Ok(())
    }
}

impl<R, P, I, B, W> embedded_hal_nb::spi::FullDuplex<u8> for Spi<R, P, I, B, W>
where
    R: Registers,
    P: PinControl,
    I: InterruptControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn read(&mut self) -> nb::Result<u8, Error> {
        if self.sercom.is_buffer_overflow_error_spi() {
            self.sercom.acknowledge_overflow_spi();
            return Err(nb::Error::Other(Error::Overrun));
        }
        if !self.sercom.is_receive_complete_spi() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.sercom.read_data_spi())
    }

    fn write(&mut self, word: u8) -> nb::Result<(), Error> {
        if !self.sercom.is_data_register_empty_spi() {
            return Err(nb::Error::WouldBlock);
        }
        self.sercom.write_data_spi(word);
        Ok(())
    }
}

impl<R, P, I, B, W> embedded_hal_zero::blocking::spi::Transfer<u8> for Spi<R, P, I, B, W>
where
    R: Registers,
    P: PinControl,
    I: InterruptControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        self.transfer_buffer(words)?;
        Ok(words)
    }
}

impl<R, P, I, B, W> embedded_hal_zero::blocking::spi::Write<u8> for Spi<R, P, I, B, W>
where
    R: Registers,
    P: PinControl,
    I: InterruptControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for word in words {
            Spi::transfer(self, *word)?;
        }
        Ok(())
    }
}
