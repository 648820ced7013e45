//! Serial communication
//!
//! UART front-end over a [`Sercom`]. Writes block until the data register is
//! free; reads are non-blocking. Received bytes can also be collected from
//! the SERCOM interrupt with [`Serial::handle_interrupt`] and consumed later
//! with [`Serial::read_buffered`].
//!
//! ```ignore
//! let mut serial = Serial::new(sercom, port, pins, pads);
//! serial.begin(UartConfig { baudrate: 115_200.Bd(), ..UartConfig::default() })?;
//! writeln!(serial, "hello")?;
//! ```

use embedded_hal_nb::serial::{ErrorKind, ErrorType};
use embedded_time::rate::Baud;
use heapless::Deque;

use crate::gpio::{PinControl, SercomPin};
use crate::sercom::baud::{BaudStrategy, DefaultBaud};
use crate::sercom::regs::Registers;
use crate::sercom::uart::{CharSize, Parity, SampleRate, StopBits, UartMode, UartTxPad};
use crate::sercom::{self, DataOrder, RxPad, Sercom};
use crate::wait::{Unbounded, WaitPolicy};

/// Capacity of the interrupt receive buffer
pub const RX_BUFFER_SIZE: usize = 64;

/// Serial error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A byte arrived before the previous one was read
    Overrun,
    /// Missing stop bit
    FrameFormat,
    Parity,
    /// `INTFLAG.ERROR` was raised without a receive error in `STATUS`
    Unknown,
    /// The wait policy gave up on the transmitter
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

impl embedded_hal_nb::serial::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Overrun => ErrorKind::Overrun,
            Error::FrameFormat => ErrorKind::FrameFormat,
            Error::Parity => ErrorKind::Parity,
            _ => ErrorKind::Other,
        }
    }
}

/// Character format and rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub baudrate: Baud,
    pub char_size: CharSize,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_order: DataOrder,
    pub sample_rate: SampleRate,
}

impl Default for UartConfig {
    /// 9600 baud, 8N1, LSB first, 16x oversampling
    fn default() -> Self {
        UartConfig {
            baudrate: Baud(9600),
            char_size: CharSize::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_order: DataOrder::LsbFirst,
            sample_rate: SampleRate::X16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartPins {
    pub rx: SercomPin,
    pub tx: SercomPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartPads {
    pub tx: UartTxPad,
    pub rx: RxPad,
}

/// Serial abstraction
pub struct Serial<R, P, B = DefaultBaud, W = Unbounded> {
    sercom: Sercom<R, B, W>,
    pins: P,
    pin_map: UartPins,
    pads: UartPads,
    rx_buffer: Deque<u8, RX_BUFFER_SIZE>,
}

impl<R, P, B, W> Serial<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    pub fn new(sercom: Sercom<R, B, W>, pins: P, pin_map: UartPins, pads: UartPads) -> Self {
        Serial {
            sercom,
            pins,
            pin_map,
            pads,
            rx_buffer: Deque::new(),
        }
    }

    /// Route the pins, configure the UART and enable it
    pub fn begin(&mut self, config: UartConfig) -> Result<(), Error> {
        self.pins.into_peripheral(self.pin_map.rx);
        self.pins.into_peripheral(self.pin_map.tx);

        self.sercom
            .init_uart(UartMode::InternalClock, config.sample_rate, config.baudrate.0)?;
        self.sercom.init_frame(
            config.char_size,
            config.data_order,
            config.parity,
            config.stop_bits,
        )?;
        self.sercom.init_pads(self.pads.tx, self.pads.rx)?;
        self.sercom.enable_uart()?;
        self.rx_buffer.clear();
        Ok(())
    }

    /// Wait for pending output, then reset the UART
    pub fn end(&mut self) -> Result<(), Error> {
        if self.sercom.is_enabled() {
            self.sercom.flush_uart()?;
        }
        self.sercom.reset_uart()?;
        self.rx_buffer.clear();
        Ok(())
    }

    /// Blocking write of one byte
    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        if self.sercom.write_data_uart(byte) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        for byte in bytes {
            self.write(*byte)?;
        }
        Ok(())
    }

    /// Wait until the last byte has been sent
    pub fn flush(&mut self) -> Result<(), Error> {
        self.sercom.flush_uart().map_err(Error::from)
    }

    /// Non-blocking read of one byte
    ///
    /// A pending receive error is reported (and acknowledged) before data.
    pub fn read(&mut self) -> nb::Result<u8, Error> {
        if self.sercom.is_uart_error() {
            let error = if self.sercom.is_buffer_overflow_error_uart() {
                Error::Overrun
            } else if self.sercom.is_frame_error_uart() {
                Error::FrameFormat
            } else if self.sercom.is_parity_error_uart() {
                Error::Parity
            } else {
                Error::Unknown
            };
            self.sercom.acknowledge_uart_error();
            return Err(nb::Error::Other(error));
        }
        if !self.sercom.available_data_uart() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.sercom.read_data_uart())
    }

    /// Move received bytes into the receive buffer; call from the SERCOM
    /// interrupt handler
    pub fn handle_interrupt(&mut self) {
        while self.sercom.available_data_uart() {
            let byte = self.sercom.read_data_uart();
            if self.rx_buffer.push_back(byte).is_err() {
                log::warn!("serial: receive buffer full, dropped {:#04x}", byte);
            }
        }
        if self.sercom.is_uart_error() {
            log::debug!("serial: receive error acknowledged");
            self.sercom.acknowledge_uart_error();
        }
    }

    /// Oldest byte collected by [`handle_interrupt`](Self::handle_interrupt)
    pub fn read_buffered(&mut self) -> Option<u8> {
        self.rx_buffer.pop_front()
    }

    /// Number of buffered bytes
    pub fn available(&self) -> usize {
        self.rx_buffer.len()
    }

    pub fn sercom(&self) -> &Sercom<R, B, W> {
        &self.sercom
    }

    /// Release the peripheral and the pin service
    pub fn release(self) -> (Sercom<R, B, W>, P) {
        (self.sercom, self.pins)
    }
}

impl<R, P, B, W> core::fmt::Write for Serial<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_all(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

impl<R, P, B, W> ErrorType for Serial<R, P, B, W> {
    type Error = Error;
}

impl<R, P, B, W> embedded_hal_nb::serial::Read<u8> for Serial<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn read(&mut self) -> nb::Result<u8, Error> {
        Serial::read(self)
    }
}

impl<R, P, B, W> embedded_hal_nb::serial::Write<u8> for Serial<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn write(&mut self, word: u8) -> nb::Result<(), Error> {
        if !self.sercom.is_data_register_empty_uart() {
            return Err(nb::Error::WouldBlock);
        }
        Serial::write(self, word).map_err(nb::Error::Other)
    }

    fn flush(&mut self) -> nb::Result<(), Error> {
        Serial::flush(self).map_err(nb::Error::Other)
    }
}

impl<R, P, B, W> embedded_hal_zero::blocking::serial::Write<u8> for Serial<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn bwrite_all(&mut self, buffer: &[u8]) -> Result<(), Self::Error> {
        self.write_all(buffer)
    }

    fn bflush(&mut self) -> Result<(), Self::Error> {
        Serial::flush(self)
    }
}
