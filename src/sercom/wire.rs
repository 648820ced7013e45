//! I2C personality
//!
//! Master and slave share the same registers with different meanings. The
//! role is read from `CTRLA.MODE` at call time, so the role-dispatched
//! operations (`prepare_*_wire`, `read_data_wire`) always address the
//! personality the hardware is actually running.
//!
//! Operations are refused on a block not configured for I2C, and master or
//! slave-only operations on the other role: `Result` operations return the
//! personality error, the data-path ones log a warning and report failure
//! without touching a register.

use super::baud::{self, BaudStrategy};
use super::regs::{ctrla, extract, i2cm, i2cs, syncbusy, Reg, Registers};
use super::{CoreState, Error, Personality, Sercom};
use crate::wait::WaitPolicy;

/// Transfer direction, the R/W bit of the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireDirection {
    Write = 0,
    Read = 1,
}

/// Bus state as tracked by the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    Unknown = 0,
    Idle = 1,
    Owner = 2,
    Busy = 3,
}

/// `CTRLB.CMD` values
///
/// On a slave both commands first execute the acknowledge action. `Stop`
/// then continues with the next byte and `Read` waits for the next start
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    None = 0,
    RepeatedStart = 1,
    Read = 2,
    Stop = 3,
}

impl<R: Registers, B: BaudStrategy, W: WaitPolicy> Sercom<R, B, W> {
    /// Reset the block and configure it as an I2C master
    ///
    /// `rise_time_ns` is the SCL rise time imposed by the bus pull-ups.
    pub fn init_master_wire(&mut self, baudrate: u32, rise_time_ns: u32) -> Result<(), Error> {
        self.begin_configure()?;
        self.regs
            .write(Reg::CtrlA, ctrla::mode(ctrla::MODE_I2C_MASTER));
        let baud = baud::wire_master(self.sys_clk, baudrate, rise_time_ns);
        self.regs.write(Reg::Baud, i2cm::baud(baud as u32));
        self.finish_configure(Personality::I2cMaster);
        Ok(())
    }

    /// Reset the block and configure it as an I2C slave at `address`
    pub fn init_slave_wire(&mut self, address: u8, general_call: bool) -> Result<(), Error> {
        self.begin_configure()?;
        self.regs
            .write(Reg::CtrlA, ctrla::mode(ctrla::MODE_I2C_SLAVE));

        let mut addr = i2cs::addr(address as u32 & 0x7F) | i2cs::addrmask(0);
        if general_call {
            addr |= i2cs::GENCEN;
        }
        self.regs.write(Reg::Addr, addr);
        self.regs
            .write(Reg::IntEnSet, i2cs::PREC | i2cs::AMATCH | i2cs::DRDY);
        self.wait_sysop()?;

        self.finish_configure(Personality::I2cSlave);
        Ok(())
    }

    fn wait_sysop(&mut self) -> Result<(), Error> {
        self.poll("i2c sysop sync", |r| !r.sync_busy(syncbusy::SYSOP))
    }

    /// The I2C role the block is configured for
    fn i2c_role(&self) -> Result<Personality, Error> {
        match self.personality() {
            role @ (Personality::I2cMaster | Personality::I2cSlave) => Ok(role),
            Personality::None => Err(Error::NotConfigurable { state: self.state }),
            found => Err(Error::WrongPersonality {
                expected: Personality::I2cMaster,
                found,
            }),
        }
    }

    /// Whether the block runs `role`; logs the refused operation if not
    fn in_role(&self, role: Personality, what: &'static str) -> bool {
        match self.check_personality(role) {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "i2c: {} needs {:?}, block is {:?}",
                    what,
                    role,
                    self.personality()
                );
                false
            }
        }
    }

    fn wire_personality(&self) -> Personality {
        if self.is_master_wire() {
            Personality::I2cMaster
        } else {
            Personality::I2cSlave
        }
    }

    pub fn reset_wire(&mut self) -> Result<(), Error> {
        self.software_reset()
    }

    /// Enable either role; a master also forces the bus state to idle
    pub fn enable_wire(&mut self) -> Result<(), Error> {
        let personality = self.wire_personality();
        let was_enabled = self.state == CoreState::Enabled;
        self.enable_personality(personality)?;
        if personality == Personality::I2cMaster && !was_enabled {
            self.regs.write(
                Reg::Status,
                (BusState::Idle as u32) << i2cm::BUSSTATE_POS,
            );
            self.wait_sysop()?;
        }
        Ok(())
    }

    pub fn disable_wire(&mut self) -> Result<(), Error> {
        self.disable_personality()
    }

    pub fn is_master_wire(&self) -> bool {
        extract(self.regs.read(Reg::CtrlA), ctrla::MODE_POS, 3) == ctrla::MODE_I2C_MASTER
    }

    pub fn is_slave_wire(&self) -> bool {
        extract(self.regs.read(Reg::CtrlA), ctrla::MODE_POS, 3) == ctrla::MODE_I2C_SLAVE
    }

    pub fn bus_state(&self) -> BusState {
        match extract(self.regs.read(Reg::Status), i2cm::BUSSTATE_POS, 2) {
            1 => BusState::Idle,
            2 => BusState::Owner,
            3 => BusState::Busy,
            _ => BusState::Unknown,
        }
    }

    pub fn is_bus_idle_wire(&self) -> bool {
        self.bus_state() == BusState::Idle
    }

    pub fn is_bus_owner_wire(&self) -> bool {
        self.bus_state() == BusState::Owner
    }

    fn ackact(&self) -> Result<u32, Error> {
        Ok(match self.i2c_role()? {
            Personality::I2cMaster => i2cm::ACKACT,
            _ => i2cs::ACKACT,
        })
    }

    /// ACK the next byte
    pub fn prepare_ack_bit_wire(&mut self) -> Result<(), Error> {
        let ackact = self.ackact()?;
        self.regs.modify(Reg::CtrlB, |v| v & !ackact);
        Ok(())
    }

    /// NACK the next byte
    pub fn prepare_nack_bit_wire(&mut self) -> Result<(), Error> {
        let ackact = self.ackact()?;
        self.regs.modify(Reg::CtrlB, |v| v | ackact);
        Ok(())
    }

    /// Issue `cmd`; a master waits for the command to synchronise
    pub fn prepare_command_bits_wire(&mut self, cmd: Command) -> Result<(), Error> {
        let master = self.i2c_role()? == Personality::I2cMaster;
        let (pos, mask) = if master {
            (i2cm::CMD_POS, i2cm::CMD_MASK)
        } else {
            (i2cs::CMD_POS, i2cs::CMD_MASK)
        };
        self.regs
            .modify(Reg::CtrlB, |v| (v & !mask) | ((cmd as u32) << pos));
        if master {
            self.wait_sysop()?;
        }
        Ok(())
    }

    /// Send a start condition and the address byte
    ///
    /// Returns `true` when the addressed slave ACKed. A slave that NACKs a
    /// read address shows up as "master on bus" instead of "slave on bus";
    /// in that case a stop is issued and `false` returned without waiting
    /// for a byte that will never come.
    pub fn start_transmission_wire(&mut self, address: u8, direction: WireDirection) -> bool {
        if !self.in_role(Personality::I2cMaster, "start") {
            return false;
        }
        if !self.poll_flag("i2c bus idle or owned", |r| {
            let state = extract(r.read(Reg::Status), i2cm::BUSSTATE_POS, 2);
            state == BusState::Idle as u32 || state == BusState::Owner as u32
        }) {
            return false;
        }

        let addr = ((address as u32) << 1) | direction as u32;
        self.regs.write(Reg::Addr, i2cm::addr(addr));

        match direction {
            WireDirection::Write => {
                if !self.poll_flag("i2c address sent", |r| {
                    r.read(Reg::IntFlag) & i2cm::MB != 0
                }) {
                    return false;
                }
            }
            WireDirection::Read => {
                let mut nacked = false;
                let arrived = self.poll_flag("i2c slave on bus", |r| {
                    let flags = r.read(Reg::IntFlag);
                    nacked = flags & i2cm::SB == 0 && flags & i2cm::MB != 0;
                    flags & (i2cm::SB | i2cm::MB) != 0
                });
                if !arrived {
                    return false;
                }
                if nacked {
                    log::warn!("i2c: address {:#04x} not acknowledged for read", address);
                    if let Err(e) = self.prepare_command_bits_wire(Command::Stop) {
                        log::warn!("i2c: stop after address nack failed: {:?}", e);
                    }
                    self.regs.write(Reg::IntFlag, i2cm::MB);
                    return false;
                }
            }
        }

        !self.is_rx_nack_received_wire()
    }

    /// Send one byte as master; `true` when the slave ACKed it
    ///
    /// A bus error ends the wait with `false` instead of waiting for a
    /// transfer that cannot complete.
    pub fn send_data_master_wire(&mut self, data: u8) -> bool {
        if !self.in_role(Personality::I2cMaster, "master send") {
            return false;
        }
        self.regs.write(Reg::Data, data as u32);

        let mut bus_error = false;
        let done = self.poll_flag("i2c byte sent", |r| {
            bus_error = r.read(Reg::Status) & i2cm::BUSERR != 0;
            bus_error || r.read(Reg::IntFlag) & i2cm::MB != 0
        });
        if bus_error {
            log::warn!("i2c: bus error while sending");
            return false;
        }
        done && !self.is_rx_nack_received_wire()
    }

    /// Send one byte as slave; `true` while the master keeps ACKing
    pub fn send_data_slave_wire(&mut self, data: u8) -> bool {
        if !self.in_role(Personality::I2cSlave, "slave send") {
            return false;
        }
        self.regs.write(Reg::Data, data as u32);
        self.regs.read(Reg::IntFlag) & i2cs::DRDY != 0 && !self.is_rx_nack_received_wire()
    }

    /// Whether a received byte is ready, for either role
    pub fn available_wire(&self) -> bool {
        let flags = self.regs.read(Reg::IntFlag);
        match self.i2c_role() {
            Ok(Personality::I2cMaster) => flags & i2cm::SB != 0,
            Ok(_) => flags & i2cs::DRDY != 0,
            Err(_) => false,
        }
    }

    /// Read a byte; a master first waits for it to arrive
    pub fn read_data_wire(&mut self) -> Option<u8> {
        let role = self.i2c_role().ok()?;
        if role == Personality::I2cMaster
            && !self.poll_flag("i2c byte received", |r| {
                r.read(Reg::IntFlag) & i2cm::SB != 0
            })
        {
            return None;
        }
        Some(self.regs.read(Reg::Data) as u8)
    }

    /// Clear the slave's stop flag
    pub fn acknowledge_stop_wire(&mut self) {
        if !self.in_role(Personality::I2cSlave, "stop acknowledge") {
            return;
        }
        self.regs.write(Reg::IntFlag, i2cs::PREC);
    }

    /// Clear a master bus error so the next transfer can start
    pub fn acknowledge_bus_error_wire(&mut self) {
        if !self.in_role(Personality::I2cMaster, "bus error acknowledge") {
            return;
        }
        self.regs
            .write(Reg::Status, i2cm::BUSERR | i2cm::ARBLOST);
    }
}

flag_queries! {
    wire:
    /// Slave: a byte was received or is requested
    data_ready => IntFlag & i2cs::DRDY;
    /// Slave: a stop condition was seen
    stop_detected => IntFlag & i2cs::PREC;
    /// Slave: the last start was a repeated start
    restart_detected => Status & i2cs::SR;
    /// Slave: the master addressed us
    address_match => IntFlag & i2cs::AMATCH;
    /// Slave: the current transfer is a master read
    master_read_operation => Status & i2cs::DIR;
    rx_nack_received => Status & i2cm::RXNACK;
    /// Master: bus error
    bus_error => Status & i2cm::BUSERR;
}
