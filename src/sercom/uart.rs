//! UART personality

use super::baud::BaudStrategy;
use super::regs::{ctrla, usart, Reg, Registers};
use super::{DataOrder, Error, Personality, RxPad, Sercom};
use crate::wait::WaitPolicy;

/// Clock source of the USART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartMode {
    ExternalClock,
    InternalClock,
}

/// Oversampling rate of the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleRate {
    X16,
    X8,
}

impl SampleRate {
    /// Samples per bit
    pub const fn factor(self) -> u32 {
        match self {
            SampleRate::X16 => 16,
            SampleRate::X8 => 8,
        }
    }
}

/// Data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CharSize {
    Five,
    Six,
    Seven,
    Eight,
    Nine,
}

impl CharSize {
    fn field(self) -> u32 {
        match self {
            CharSize::Eight => 0,
            CharSize::Nine => 1,
            CharSize::Five => 5,
            CharSize::Six => 6,
            CharSize::Seven => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// Pad carrying TX (and RTS/CTS when selected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartTxPad {
    Pad0 = 0,
    Pad2 = 1,
    /// TX on pad 0, RTS on pad 2, CTS on pad 3
    Pad0RtsCts = 2,
}

impl<R: Registers, B: BaudStrategy, W: WaitPolicy> Sercom<R, B, W> {
    /// Reset the block and configure it as a UART
    ///
    /// With [`UartMode::InternalClock`] the baud register is derived from the
    /// system clock using the `B` strategy.
    pub fn init_uart(&mut self, mode: UartMode, rate: SampleRate, baudrate: u32) -> Result<(), Error> {
        self.begin_configure()?;

        let mode_bits = match mode {
            UartMode::ExternalClock => ctrla::MODE_USART_EXT_CLK,
            UartMode::InternalClock => ctrla::MODE_USART_INT_CLK,
        };
        self.regs.write(
            Reg::CtrlA,
            ctrla::mode(mode_bits) | usart::sampr(B::sample_rate_field(rate)),
        );
        self.regs.write(Reg::IntEnSet, usart::RXC | usart::ERROR);

        if mode == UartMode::InternalClock {
            let baud = B::uart_baud(self.sys_clk, rate, baudrate);
            self.regs.write(Reg::Baud, baud as u32);
        }

        self.finish_configure(Personality::Uart);
        Ok(())
    }

    /// Character format
    pub fn init_frame(
        &mut self,
        char_size: CharSize,
        order: DataOrder,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<(), Error> {
        self.require_configurable(Personality::Uart)?;

        let form = if parity == Parity::None { 0 } else { 1 };
        self.regs.modify(Reg::CtrlA, |v| {
            v | usart::form(form) | if order == DataOrder::LsbFirst { ctrla::DORD } else { 0 }
        });

        let mut ctrlb = usart::chsize(char_size.field());
        if stop_bits == StopBits::Two {
            ctrlb |= usart::SBMODE;
        }
        if parity == Parity::Odd {
            ctrlb |= usart::PMODE;
        }
        self.regs.modify(Reg::CtrlB, |v| v | ctrlb);
        Ok(())
    }

    /// Pad routing; also enables the transmitter and receiver
    pub fn init_pads(&mut self, tx: UartTxPad, rx: RxPad) -> Result<(), Error> {
        self.require_configurable(Personality::Uart)?;
        self.regs
            .modify(Reg::CtrlA, |v| v | usart::txpo(tx as u32) | usart::rxpo(rx as u32));
        self.regs
            .modify(Reg::CtrlB, |v| v | usart::TXEN | usart::RXEN);
        Ok(())
    }

    pub fn reset_uart(&mut self) -> Result<(), Error> {
        self.software_reset()
    }

    pub fn enable_uart(&mut self) -> Result<(), Error> {
        self.enable_personality(Personality::Uart)
    }

    pub fn disable_uart(&mut self) -> Result<(), Error> {
        self.disable_personality()
    }

    /// Wait until the last character has left the shift register
    pub fn flush_uart(&mut self) -> Result<(), Error> {
        if self.is_data_register_empty_uart() {
            return Ok(());
        }
        self.poll("uart transmit complete", |r| {
            r.read(Reg::IntFlag) & usart::TXC != 0
        })
    }

    pub fn clear_status_uart(&mut self) {
        self.regs.write(Reg::Status, usart::STATUS_RESET_VALUE);
    }

    /// Whether a received character is waiting
    pub fn available_data_uart(&self) -> bool {
        self.regs.read(Reg::IntFlag) & usart::RXC != 0
    }

    /// Whether any receive error is pending
    pub fn is_uart_error(&self) -> bool {
        self.regs.read(Reg::IntFlag) & usart::ERROR != 0
            || self.regs.read(Reg::Status) & usart::STATUS_ERRORS != 0
    }

    /// Clear the error flags that are currently raised, and only those
    pub fn acknowledge_uart_error(&mut self) {
        let raised = self.regs.read(Reg::Status) & usart::STATUS_ERRORS;
        if raised != 0 {
            self.regs.write(Reg::Status, raised);
        }
        if self.regs.read(Reg::IntFlag) & usart::ERROR != 0 {
            self.regs.write(Reg::IntFlag, usart::ERROR);
        }
    }

    /// Received character; only meaningful when
    /// [`available_data_uart`](Self::available_data_uart) is set
    pub fn read_data_uart(&mut self) -> u8 {
        self.regs.read(Reg::Data) as u8
    }

    /// Wait for the data register to empty, then write `data`
    ///
    /// Returns `false` if the wait policy gave up.
    pub fn write_data_uart(&mut self, data: u8) -> bool {
        if !self.poll_flag("uart data register empty", |r| {
            r.read(Reg::IntFlag) & usart::DRE != 0
        }) {
            return false;
        }
        self.regs.write(Reg::Data, data as u32);
        true
    }

    pub fn enable_data_register_empty_interrupt_uart(&mut self) {
        self.regs.write(Reg::IntEnSet, usart::DRE);
    }

    pub fn disable_data_register_empty_interrupt_uart(&mut self) {
        self.regs.write(Reg::IntEnClr, usart::DRE);
    }
}

flag_queries! {
    uart:
    buffer_overflow_error => Status & usart::BUFOVF;
    frame_error => Status & usart::FERR;
    parity_error => Status & usart::PERR;
    /// Whether a new character can be written
    data_register_empty => IntFlag & usart::DRE;
}
