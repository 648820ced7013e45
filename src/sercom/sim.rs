//! Simulated SERCOM register block for unit tests
//!
//! Models the parts of the hardware the core relies on: software reset and
//! enable with a few reads of sync-busy latency, enable protection (writes
//! to protected fields while enabled are dropped and counted), SPI loopback
//! or scripted MISO, UART framing onto a recorded wire, and a scripted I2C
//! peer for both master and slave personalities.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

use super::regs::{ctrla, extract, i2cm, i2cs, spi, syncbusy, usart, Reg, Registers};

const DEFAULT_SYNC_LATENCY: u32 = 2;

pub(crate) struct Sim {
    s: RefCell<State>,
}

struct State {
    regs: [u32; Reg::COUNT],
    sync_latency: u32,
    swrst_pending: u32,
    enable_pending: u32,
    hold_sync: bool,
    resets: u32,
    writes: Vec<(Reg, u32)>,
    protected_violations: u32,

    // spi
    miso: VecDeque<u8>,
    mosi: Vec<u8>,
    rx_latency: u32,
    rx_pending: Option<(u32, u8)>,

    // uart
    frames: Vec<Vec<bool>>,
    uart_rx: VecDeque<u8>,
    dre_delay: u32,

    // i2c master side: the peer is a slave
    address_ack: bool,
    data_ack: bool,
    peer_bytes: VecDeque<u8>,
    peer_received: Vec<u8>,
    addresses: Vec<u8>,
    commands: Vec<(u32, bool)>,
    bus_error_on_send: bool,

    // i2c slave side: the peer is a master
    slave_sent: Vec<u8>,
    master_acks: bool,
}

impl Sim {
    pub(crate) fn new() -> Self {
        Sim {
            s: RefCell::new(State {
                regs: [0; Reg::COUNT],
                sync_latency: DEFAULT_SYNC_LATENCY,
                swrst_pending: 0,
                enable_pending: 0,
                hold_sync: false,
                resets: 0,
                writes: Vec::new(),
                protected_violations: 0,
                miso: VecDeque::new(),
                mosi: Vec::new(),
                rx_latency: 0,
                rx_pending: None,
                frames: Vec::new(),
                uart_rx: VecDeque::new(),
                dre_delay: 0,
                address_ack: true,
                data_ack: true,
                peer_bytes: VecDeque::new(),
                peer_received: Vec::new(),
                addresses: Vec::new(),
                commands: Vec::new(),
                bus_error_on_send: false,
                slave_sent: Vec::new(),
                master_acks: true,
            }),
        }
    }

    /// Keep every sync-busy bit asserted
    pub(crate) fn hold_sync(&self, hold: bool) {
        self.s.borrow_mut().hold_sync = hold;
    }

    /// Raw register content, without read side effects
    pub(crate) fn reg(&self, reg: Reg) -> u32 {
        self.s.borrow().regs[reg as usize]
    }

    pub(crate) fn resets(&self) -> u32 {
        self.s.borrow().resets
    }

    pub(crate) fn write_count(&self) -> usize {
        self.s.borrow().writes.len()
    }

    pub(crate) fn writes(&self) -> Vec<(Reg, u32)> {
        self.s.borrow().writes.clone()
    }

    pub(crate) fn protected_violations(&self) -> u32 {
        self.s.borrow().protected_violations
    }

    /// Bytes the simulated SPI slave shifts out; loopback once exhausted
    pub(crate) fn script_miso(&self, bytes: &[u8]) {
        self.s.borrow_mut().miso.extend(bytes.iter().copied());
    }

    pub(crate) fn mosi(&self) -> Vec<u8> {
        self.s.borrow().mosi.clone()
    }

    /// Reads between an SPI data write and receive-complete
    pub(crate) fn set_rx_latency(&self, reads: u32) {
        self.s.borrow_mut().rx_latency = reads;
    }

    /// UART frames as line levels, start bit first
    pub(crate) fn frames(&self) -> Vec<Vec<bool>> {
        self.s.borrow().frames.clone()
    }

    /// Raise interrupt flags without any accompanying data or status
    pub(crate) fn raise_flags(&self, flags: u32) {
        self.s.borrow_mut().regs[Reg::IntFlag as usize] |= flags;
    }

    /// Queue a received UART byte, raising `status` error bits with it
    pub(crate) fn inject_rx(&self, byte: u8, status: u32) {
        let mut s = self.s.borrow_mut();
        s.uart_rx.push_back(byte);
        if status != 0 {
            s.regs[Reg::Status as usize] |= status;
            s.regs[Reg::IntFlag as usize] |= usart::ERROR;
        }
    }

    /// Keep the data register full for the next `reads` reads
    pub(crate) fn delay_dre(&self, reads: u32) {
        self.s.borrow_mut().dre_delay = reads;
    }

    pub(crate) fn nack_address(&self) {
        self.s.borrow_mut().address_ack = false;
    }

    pub(crate) fn nack_data(&self) {
        self.s.borrow_mut().data_ack = false;
    }

    /// Raise a bus error instead of completing the next master data write
    pub(crate) fn bus_error_on_send(&self) {
        self.s.borrow_mut().bus_error_on_send = true;
    }

    /// Bytes the simulated I2C slave returns to master reads
    pub(crate) fn peer_bytes(&self, bytes: &[u8]) {
        self.s.borrow_mut().peer_bytes.extend(bytes.iter().copied());
    }

    pub(crate) fn peer_received(&self) -> Vec<u8> {
        self.s.borrow().peer_received.clone()
    }

    /// Address bytes (address << 1 | direction) sent by the master
    pub(crate) fn addresses(&self) -> Vec<u8> {
        self.s.borrow().addresses.clone()
    }

    /// Commands written to `CTRLB.CMD`, with the `ACKACT` bit at the time
    pub(crate) fn commands(&self) -> Vec<(u32, bool)> {
        self.s.borrow().commands.clone()
    }

    /// A remote master addresses this slave
    pub(crate) fn slave_address_match(&self, read: bool) {
        let mut s = self.s.borrow_mut();
        s.regs[Reg::IntFlag as usize] |= i2cs::AMATCH;
        if read {
            s.regs[Reg::Status as usize] |= i2cs::DIR;
        } else {
            s.regs[Reg::Status as usize] &= !i2cs::DIR;
        }
    }

    /// A remote master writes `byte` to this slave
    pub(crate) fn slave_receive(&self, byte: u8) {
        let mut s = self.s.borrow_mut();
        s.regs[Reg::Data as usize] = byte as u32;
        s.regs[Reg::IntFlag as usize] |= i2cs::DRDY;
    }

    /// A remote master requests a byte from this slave
    pub(crate) fn slave_request(&self) {
        self.s.borrow_mut().regs[Reg::IntFlag as usize] |= i2cs::DRDY;
    }

    /// A remote master issues a stop condition
    pub(crate) fn slave_stop(&self) {
        self.s.borrow_mut().regs[Reg::IntFlag as usize] |= i2cs::PREC;
    }

    /// The remote master NACKs bytes sent by this slave
    pub(crate) fn master_nacks(&self) {
        self.s.borrow_mut().master_acks = false;
    }

    pub(crate) fn slave_sent(&self) -> Vec<u8> {
        self.s.borrow().slave_sent.clone()
    }
}

impl State {
    fn mode(&self) -> u32 {
        extract(self.regs[Reg::CtrlA as usize], ctrla::MODE_POS, 3)
    }

    fn enabled(&self) -> bool {
        self.regs[Reg::CtrlA as usize] & ctrla::ENABLE != 0
    }

    fn is_i2c(&self) -> bool {
        matches!(self.mode(), ctrla::MODE_I2C_MASTER | ctrla::MODE_I2C_SLAVE)
    }

    fn is_usart(&self) -> bool {
        matches!(self.mode(), ctrla::MODE_USART_EXT_CLK | ctrla::MODE_USART_INT_CLK)
    }

    fn set_bus_state(&mut self, state: u32) {
        let status = &mut self.regs[Reg::Status as usize];
        *status = (*status & !i2cm::BUSSTATE_MASK) | (state << i2cm::BUSSTATE_POS);
    }

    fn complete_reset(&mut self) {
        self.regs = [0; Reg::COUNT];
        self.enable_pending = 0;
        self.rx_pending = None;
        self.uart_rx.clear();
        self.resets += 1;
    }

    // advances the simulated hardware by one register access
    fn tick(&mut self) {
        if !self.hold_sync {
            if self.swrst_pending > 0 {
                self.swrst_pending -= 1;
                if self.swrst_pending == 0 {
                    self.complete_reset();
                }
            }
            if self.enable_pending > 0 {
                self.enable_pending -= 1;
            }
        }
        if self.dre_delay > 0 {
            self.dre_delay -= 1;
        }
        match self.rx_pending {
            Some((0, byte)) => self.deliver_spi(byte),
            Some((n, byte)) => self.rx_pending = Some((n - 1, byte)),
            None => {}
        }
    }

    fn deliver_spi(&mut self, byte: u8) {
        if self.regs[Reg::IntFlag as usize] & spi::RXC != 0 {
            self.regs[Reg::Status as usize] |= spi::BUFOVF;
        }
        self.regs[Reg::Data as usize] = byte as u32;
        self.regs[Reg::IntFlag as usize] |= spi::RXC;
        self.rx_pending = None;
    }

    fn read(&mut self, reg: Reg) -> u32 {
        self.tick();
        match reg {
            Reg::SyncBusy => {
                if self.hold_sync {
                    return syncbusy::SWRST | syncbusy::ENABLE | syncbusy::SYSOP;
                }
                let mut busy = 0;
                if self.swrst_pending > 0 {
                    busy |= syncbusy::SWRST;
                }
                if self.enable_pending > 0 {
                    busy |= syncbusy::ENABLE;
                }
                busy
            }
            Reg::IntFlag => {
                let mut flags = self.regs[Reg::IntFlag as usize];
                if self.enabled() && self.is_usart() {
                    if self.dre_delay == 0 {
                        flags |= usart::DRE;
                    }
                    if !self.uart_rx.is_empty() {
                        flags |= usart::RXC;
                    }
                }
                if self.enabled() && self.mode() == ctrla::MODE_SPI_MASTER {
                    flags |= spi::DRE;
                }
                flags
            }
            Reg::IntEnClr => self.regs[Reg::IntEnSet as usize],
            Reg::Data if self.is_usart() => self.uart_rx.pop_front().unwrap_or(0) as u32,
            Reg::Data if self.mode() == ctrla::MODE_SPI_MASTER => {
                self.regs[Reg::IntFlag as usize] &= !spi::RXC;
                self.regs[Reg::Data as usize]
            }
            reg => self.regs[reg as usize],
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.writes.push((reg, value));
        let idx = reg as usize;
        match reg {
            Reg::CtrlA => self.write_ctrla(value),
            Reg::CtrlB if self.is_i2c() => self.write_i2c_ctrlb(value),
            Reg::CtrlB | Reg::Baud => {
                if self.enabled() && self.regs[idx] != value {
                    self.protected_violations += 1;
                } else {
                    self.regs[idx] = value;
                }
            }
            Reg::IntEnSet => self.regs[Reg::IntEnSet as usize] |= value,
            Reg::IntEnClr => self.regs[Reg::IntEnSet as usize] &= !value,
            Reg::IntFlag => self.regs[idx] &= !value,
            Reg::Status if self.mode() == ctrla::MODE_I2C_MASTER => {
                self.regs[idx] &= !(value & (i2cm::BUSERR | i2cm::ARBLOST));
                if value & i2cm::BUSSTATE_MASK != 0 {
                    self.set_bus_state(extract(value, i2cm::BUSSTATE_POS, 2));
                }
            }
            Reg::Status => self.regs[idx] &= !(value & usart::STATUS_ERRORS),
            Reg::SyncBusy => {}
            Reg::Addr if self.mode() == ctrla::MODE_I2C_MASTER && self.enabled() => {
                self.regs[idx] = value;
                self.master_address(value);
            }
            Reg::Addr => self.regs[idx] = value,
            Reg::Data => self.write_data(value),
        }
    }

    fn write_ctrla(&mut self, value: u32) {
        let idx = Reg::CtrlA as usize;
        if value & ctrla::SWRST != 0 {
            self.regs[idx] |= ctrla::SWRST;
            self.swrst_pending = self.sync_latency;
            if self.sync_latency == 0 && !self.hold_sync {
                self.complete_reset();
            }
            return;
        }
        let old = self.regs[idx];
        let mut new = value;
        if old & ctrla::ENABLE != 0 && (old ^ value) & !ctrla::ENABLE != 0 {
            self.protected_violations += 1;
            new = (old & !ctrla::ENABLE) | (value & ctrla::ENABLE);
        }
        if (old ^ new) & ctrla::ENABLE != 0 {
            self.enable_pending = self.sync_latency;
        }
        self.regs[idx] = new;
    }

    fn write_i2c_ctrlb(&mut self, value: u32) {
        let cmd = extract(value, i2cm::CMD_POS, 2);
        let ackact = value & i2cm::ACKACT != 0;
        self.regs[Reg::CtrlB as usize] = value & !i2cm::CMD_MASK;
        if cmd == 0 {
            return;
        }
        self.commands.push((cmd, ackact));

        let slave = self.mode() == ctrla::MODE_I2C_SLAVE;
        let flags = &mut self.regs[Reg::IntFlag as usize];
        if slave {
            *flags &= !(i2cs::AMATCH | i2cs::DRDY | i2cs::PREC);
            return;
        }
        *flags &= !(i2cm::MB | i2cm::SB);
        match cmd {
            2 => {
                let byte = self.peer_bytes.pop_front().unwrap_or(0xFF);
                self.regs[Reg::Data as usize] = byte as u32;
                self.regs[Reg::IntFlag as usize] |= i2cm::SB;
            }
            3 => self.set_bus_state(1),
            _ => {}
        }
    }

    fn master_address(&mut self, value: u32) {
        let read = value & 1 != 0;
        self.addresses.push(value as u8);
        self.regs[Reg::IntFlag as usize] &= !(i2cm::MB | i2cm::SB);
        self.set_bus_state(2);

        if !self.address_ack {
            self.regs[Reg::Status as usize] |= i2cm::RXNACK;
            self.regs[Reg::IntFlag as usize] |= i2cm::MB;
            return;
        }
        self.regs[Reg::Status as usize] &= !i2cm::RXNACK;
        if read {
            let byte = self.peer_bytes.pop_front().unwrap_or(0xFF);
            self.regs[Reg::Data as usize] = byte as u32;
            self.regs[Reg::IntFlag as usize] |= i2cm::SB;
        } else {
            self.regs[Reg::IntFlag as usize] |= i2cm::MB;
        }
    }

    fn write_data(&mut self, value: u32) {
        match self.mode() {
            ctrla::MODE_USART_EXT_CLK | ctrla::MODE_USART_INT_CLK => {
                let frame = uart_frame(
                    self.regs[Reg::CtrlA as usize],
                    self.regs[Reg::CtrlB as usize],
                    value,
                );
                self.frames.push(frame);
                self.regs[Reg::IntFlag as usize] |= usart::TXC;
            }
            ctrla::MODE_SPI_MASTER => {
                let byte = value as u8;
                self.mosi.push(byte);
                let reply = self.miso.pop_front().unwrap_or(byte);
                if self.rx_latency == 0 {
                    self.deliver_spi(reply);
                } else {
                    self.rx_pending = Some((self.rx_latency, reply));
                }
            }
            ctrla::MODE_I2C_MASTER => {
                self.regs[Reg::IntFlag as usize] &= !i2cm::MB;
                if self.bus_error_on_send {
                    self.regs[Reg::Status as usize] |= i2cm::BUSERR;
                    return;
                }
                self.peer_received.push(value as u8);
                if self.data_ack {
                    self.regs[Reg::Status as usize] &= !i2cm::RXNACK;
                } else {
                    self.regs[Reg::Status as usize] |= i2cm::RXNACK;
                }
                self.regs[Reg::IntFlag as usize] |= i2cm::MB;
            }
            ctrla::MODE_I2C_SLAVE => {
                self.slave_sent.push(value as u8);
                if self.master_acks {
                    self.regs[Reg::Status as usize] &= !i2cs::RXNACK;
                    self.regs[Reg::IntFlag as usize] |= i2cs::DRDY;
                } else {
                    self.regs[Reg::Status as usize] |= i2cs::RXNACK;
                    self.regs[Reg::IntFlag as usize] &= !i2cs::DRDY;
                }
            }
            _ => {}
        }
    }
}

/// Line levels of one UART character: start, data, parity, stop
fn uart_frame(ctrla_reg: u32, ctrlb: u32, data: u32) -> Vec<bool> {
    let bits = match ctrlb & usart::CHSIZE_MASK {
        0 => 8,
        1 => 9,
        n => n,
    };
    let lsb_first = ctrla_reg & ctrla::DORD != 0;
    let data_bits: Vec<bool> = (0..bits)
        .map(|i| {
            let idx = if lsb_first { i } else { bits - 1 - i };
            (data >> idx) & 1 != 0
        })
        .collect();

    let mut frame = vec![false];
    frame.extend(&data_bits);
    if ctrla_reg & usart::FORM_MASK != 0 {
        let ones = data_bits.iter().filter(|b| **b).count();
        let odd = ctrlb & usart::PMODE != 0;
        frame.push((ones % 2 == 1) != odd);
    }
    frame.push(true);
    if ctrlb & usart::SBMODE != 0 {
        frame.push(true);
    }
    frame
}

impl Registers for Sim {
    fn read(&self, reg: Reg) -> u32 {
        self.s.borrow_mut().read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.s.borrow_mut().write(reg, value)
    }
}

impl Registers for &Sim {
    fn read(&self, reg: Reg) -> u32 {
        self.s.borrow_mut().read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.s.borrow_mut().write(reg, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_takes_a_few_reads() {
        let mut sim = Sim::new();
        sim.write(Reg::Baud, 0x1234);
        sim.write(Reg::CtrlA, ctrla::SWRST);
        assert!(sim.read(Reg::SyncBusy) & syncbusy::SWRST != 0);
        assert!(sim.read(Reg::SyncBusy) & syncbusy::SWRST == 0);
        assert_eq!(sim.read(Reg::CtrlA), 0);
        assert_eq!(sim.reg(Reg::Baud), 0);
        assert_eq!(sim.resets(), 1);
    }

    #[test]
    fn protected_writes_are_dropped_while_enabled() {
        let mut sim = Sim::new();
        sim.write(Reg::CtrlA, ctrla::mode(ctrla::MODE_SPI_MASTER) | ctrla::ENABLE);
        sim.write(Reg::Baud, 7);
        sim.write(Reg::CtrlA, ctrla::mode(ctrla::MODE_SPI_MASTER) | ctrla::ENABLE | ctrla::DORD);
        assert_eq!(sim.reg(Reg::Baud), 0);
        assert_eq!(sim.reg(Reg::CtrlA) & ctrla::DORD, 0);
        assert_eq!(sim.protected_violations(), 2);
    }

    #[test]
    fn uart_frame_even_parity_two_stop_bits() {
        let ctrla_reg = ctrla::DORD | usart::form(1);
        let ctrlb = usart::SBMODE;
        // 0b0000_0011 lsb first, two ones -> even parity bit 0
        let frame = uart_frame(ctrla_reg, ctrlb, 0x03);
        assert_eq!(
            frame,
            vec![false, true, true, false, false, false, false, false, false, false, true, true]
        );
    }
}
