/*!
  # Inter-Integrated Circuit (I2C) bus
  I2C front-end over a [`Sercom`], running either as bus master or as an
  addressed slave. The role is chosen by [`Wire::begin_master`] or
  [`Wire::begin_slave`]; calling an operation of the other role fails with
  [`Error::WrongRole`].

  ## Master example
  ```ignore
    let mut wire = Wire::new(sercom, port, pins);
    wire.begin_master(WireConfig { frequency: 400.kHz().into(), ..WireConfig::default() })?;

    let mut id = [0u8; 2];
    wire.master_write_read(0x48, &[0x0F], &mut id)?;
  ```

  ## Slave example
  ```ignore
    wire.begin_slave(0x30, false)?;
    loop {
        match wire.poll_slave()? {
            Some(SlaveEvent::AddressMatch { .. }) => wire.slave_ack()?,
            Some(SlaveEvent::DataReceived(byte)) => { store(byte); wire.slave_ack()? }
            Some(SlaveEvent::DataRequested) => { wire.slave_respond(next())?; }
            Some(SlaveEvent::Stop) | None => {}
        }
    }
  ```
*/

use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation, SevenBitAddress};
use embedded_time::rate::Hertz;

use crate::gpio::{PinControl, SercomPin};
use crate::sercom::baud::{BaudStrategy, DefaultBaud};
use crate::sercom::regs::Registers;
use crate::sercom::wire::{Command, WireDirection};
use crate::sercom::{self, Sercom};
use crate::wait::{Unbounded, WaitPolicy};

/// I2C error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No slave acknowledged the address
    AddressNack,
    /// The slave refused a data byte
    DataNack,
    /// Misplaced start or stop condition on the bus
    BusError,
    /// The operation belongs to the other role, or no role was started
    WrongRole {
        expected: Role,
        found: Option<Role>,
    },
    /// The wait policy gave up
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

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::AddressNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Error::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Error::BusError => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

/// Master bus settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireConfig {
    pub frequency: Hertz,
    /// SCL rise time imposed by the pull-ups
    pub rise_time_ns: u32,
}

impl Default for WireConfig {
    /// Standard mode, 100 kHz
    fn default() -> Self {
        WireConfig {
            frequency: Hertz(100_000),
            rise_time_ns: 125,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WirePins {
    pub sda: SercomPin,
    pub scl: SercomPin,
}

/// What a remote master did, as seen by the slave
///
/// `AddressMatch` and `DataReceived` hold the bus until answered with
/// [`Wire::slave_ack`] or [`Wire::slave_nack`]. `DataRequested` is answered
/// with [`Wire::slave_respond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveEvent {
    AddressMatch { read: bool },
    DataReceived(u8),
    DataRequested,
    Stop,
}

pub struct Wire<R, P, B = DefaultBaud, W = Unbounded> {
    sercom: Sercom<R, B, W>,
    pins: P,
    pin_map: WirePins,
    role: Option<Role>,
}

impl<R, P, B, W> Wire<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    pub fn new(sercom: Sercom<R, B, W>, pins: P, pin_map: WirePins) -> Self {
        Wire {
            sercom,
            pins,
            pin_map,
            role: None,
        }
    }

    fn route_pins(&mut self) {
        self.pins.into_peripheral(self.pin_map.sda);
        self.pins.into_peripheral(self.pin_map.scl);
    }

    /// Start as bus master
    pub fn begin_master(&mut self, config: WireConfig) -> Result<(), Error> {
        self.role = None;
        self.route_pins();
        self.sercom
            .init_master_wire(config.frequency.0, config.rise_time_ns)?;
        self.sercom.enable_wire()?;
        self.role = Some(Role::Master);
        Ok(())
    }

    /// Start as a slave answering to the 7-bit `address`, and to the general
    /// call address when `general_call` is set
    pub fn begin_slave(&mut self, address: u8, general_call: bool) -> Result<(), Error> {
        self.role = None;
        self.route_pins();
        self.sercom.init_slave_wire(address, general_call)?;
        self.sercom.enable_wire()?;
        self.role = Some(Role::Slave);
        Ok(())
    }

    /// Release the bus and reset the peripheral
    pub fn end(&mut self) -> Result<(), Error> {
        if self.role == Some(Role::Master) && self.sercom.is_bus_owner_wire() {
            self.sercom.prepare_command_bits_wire(Command::Stop)?;
        }
        self.role = None;
        self.sercom.reset_wire()?;
        Ok(())
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    fn check_role(&self, expected: Role) -> Result<(), Error> {
        if self.role == Some(expected) {
            Ok(())
        } else {
            Err(Error::WrongRole {
                expected,
                found: self.role,
            })
        }
    }

    fn stop(&mut self) -> Result<(), Error> {
        self.sercom
            .prepare_command_bits_wire(Command::Stop)
            .map_err(Error::from)
    }

    /// Start or repeated start, addressing `address`
    fn start(&mut self, address: u8, direction: WireDirection) -> Result<(), Error> {
        if self.sercom.start_transmission_wire(address, direction) {
            return Ok(());
        }
        if !self.sercom.is_rx_nack_received_wire() {
            return Err(Error::Timeout);
        }
        // a NACKed read address is already followed by a stop
        if direction == WireDirection::Write {
            log::warn!("i2c: address {:#04x} not acknowledged for write", address);
            self.stop()?;
        }
        Err(Error::AddressNack)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        for byte in bytes {
            if self.sercom.send_data_master_wire(*byte) {
                continue;
            }
            let error = if self.sercom.is_bus_error_wire() {
                self.sercom.acknowledge_bus_error_wire();
                Error::BusError
            } else if self.sercom.is_rx_nack_received_wire() {
                Error::DataNack
            } else {
                return Err(Error::Timeout);
            };
            self.stop()?;
            return Err(error);
        }
        Ok(())
    }

    /// Receive into `buffer`; the first byte is already on its way
    ///
    /// With `more` set the last byte is ACKed and the next one requested, so
    /// the read continues into a following buffer.
    fn read_bytes(&mut self, buffer: &mut [u8], more: bool) -> Result<(), Error> {
        let last = buffer.len().saturating_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.sercom.read_data_wire().ok_or(Error::Timeout)?;
            if i < last || more {
                self.sercom.prepare_ack_bit_wire()?;
                self.sercom.prepare_command_bits_wire(Command::Read)?;
            } else {
                self.sercom.prepare_nack_bit_wire()?;
            }
        }
        Ok(())
    }

    /// Write `bytes` to `address`, then stop
    pub fn master_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        self.transaction_inner(address, &mut [Operation::Write(bytes)])
    }

    /// Read `buffer.len()` bytes from `address`, then stop
    pub fn master_read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.transaction_inner(address, &mut [Operation::Read(buffer)])
    }

    /// Write `bytes`, then read into `buffer` after a repeated start
    pub fn master_write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        self.transaction_inner(
            address,
            &mut [Operation::Write(bytes), Operation::Read(buffer)],
        )
    }

    /// Adjacent operations of the same kind share one start; a change of
    /// kind issues a repeated start. A single stop ends the transaction.
    fn transaction_inner(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Error> {
        self.check_role(Role::Master)?;

        let mut previous = None;
        for i in 0..operations.len() {
            let direction = match direction_of(&operations[i]) {
                Some(direction) => direction,
                None => continue,
            };
            let more = operations[i + 1..].iter().find_map(direction_of) == Some(direction);

            if previous != Some(direction) {
                self.start(address, direction)?;
            }
            match &mut operations[i] {
                Operation::Write(bytes) => self.write_bytes(bytes)?,
                Operation::Read(buffer) => self.read_bytes(buffer, more)?,
            }
            previous = Some(direction);
        }

        if previous.is_some() {
            self.stop()?;
        }
        Ok(())
    }

    /// Next slave-side event, if any
    ///
    /// A stop condition is acknowledged here. Received bytes are read out
    /// of the data register but stay pending until ACKed or NACKed.
    pub fn poll_slave(&mut self) -> Result<Option<SlaveEvent>, Error> {
        self.check_role(Role::Slave)?;

        if self.sercom.is_stop_detected_wire() {
            self.sercom.acknowledge_stop_wire();
            return Ok(Some(SlaveEvent::Stop));
        }
        if self.sercom.is_address_match_wire() {
            return Ok(Some(SlaveEvent::AddressMatch {
                read: self.sercom.is_master_read_operation_wire(),
            }));
        }
        if self.sercom.is_data_ready_wire() {
            if self.sercom.is_master_read_operation_wire() {
                return Ok(Some(SlaveEvent::DataRequested));
            }
            return Ok(self.sercom.read_data_wire().map(SlaveEvent::DataReceived));
        }
        Ok(None)
    }

    /// Accept the address or byte and continue
    pub fn slave_ack(&mut self) -> Result<(), Error> {
        self.check_role(Role::Slave)?;
        self.sercom.prepare_ack_bit_wire()?;
        self.sercom.prepare_command_bits_wire(Command::Stop)?;
        Ok(())
    }

    /// Refuse the address or byte
    pub fn slave_nack(&mut self) -> Result<(), Error> {
        self.check_role(Role::Slave)?;
        self.sercom.prepare_nack_bit_wire()?;
        self.sercom.prepare_command_bits_wire(Command::Stop)?;
        Ok(())
    }

    /// Raw slave command, for protocols the ACK/NACK helpers don't cover
    pub fn slave_command(&mut self, command: Command) -> Result<(), Error> {
        self.check_role(Role::Slave)?;
        self.sercom.prepare_command_bits_wire(command)?;
        Ok(())
    }

    /// Whether the last transfer started with a repeated start
    pub fn slave_restarted(&self) -> Result<bool, Error> {
        self.check_role(Role::Slave)?;
        Ok(self.sercom.is_restart_detected_wire())
    }

    /// Send `byte` to the remote master
    ///
    /// Returns `false` once the master NACKs, which ends the read.
    pub fn slave_respond(&mut self, byte: u8) -> Result<bool, Error> {
        self.check_role(Role::Slave)?;
        Ok(self.sercom.send_data_slave_wire(byte))
    }

    pub fn sercom(&self) -> &Sercom<R, B, W> {
        &self.sercom
    }

    /// Release the peripheral and the pin service
    pub fn release(self) -> (Sercom<R, B, W>, P) {
        (self.sercom, self.pins)
    }
}

fn direction_of(operation: &Operation<'_>) -> Option<WireDirection> {
    match operation {
        Operation::Write(_) => Some(WireDirection::Write),
        // nothing to clock in
        Operation::Read(buffer) if buffer.is_empty() => None,
        Operation::Read(_) => Some(WireDirection::Read),
    }
}

impl<R, P, B, W> ErrorType for Wire<R, P, B, W> {
    type Error = Error;
}

impl<R, P, B, W> embedded_hal::i2c::I2c<SevenBitAddress> for Wire<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transaction_inner(address, operations)
    }
}

impl<R, P, B, W> embedded_hal_zero::blocking::i2c::Read for Wire<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.master_read(address, buffer)
    }
}

impl<R, P, B, W> embedded_hal_zero::blocking::i2c::Write for Wire<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.master_write(address, bytes)
    }
}

impl<R, P, B, W> embedded_hal_zero::blocking::i2c::WriteRead for Wire<R, P, B, W>
where
    R: Registers,
    P: PinControl,
    B: BaudStrategy,
    W: WaitPolicy,
{
    type Error = Error;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.master_write_read(address, bytes, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::clocks_48mhz;
    use crate::gpio::tests::{FakePins, PinEvent};
    use crate::gpio::PinFunction;
    use crate::sercom::baud::Fractional;
    use crate::sercom::regs::{i2cm, Reg};
    use crate::sercom::sim::Sim;
    use embedded_hal::i2c::{Error as _, I2c};

    const PINS: WirePins = WirePins {
        sda: SercomPin::new(8, PinFunction::Sercom),
        scl: SercomPin::new(9, PinFunction::Sercom),
    };

    const READ: u32 = Command::Read as u32;
    const STOP: u32 = Command::Stop as u32;

    fn wire(sim: &Sim) -> Wire<&Sim, FakePins, Fractional> {
        let sercom = Sercom::new(sim, &clocks_48mhz());
        Wire::new(sercom, FakePins::default(), PINS)
    }

    fn master(sim: &Sim) -> Wire<&Sim, FakePins, Fractional> {
        let mut wire = wire(sim);
        wire.begin_master(WireConfig::default()).unwrap();
        wire
    }

    fn slave(sim: &Sim) -> Wire<&Sim, FakePins, Fractional> {
        let mut wire = wire(sim);
        wire.begin_slave(0x30, false).unwrap();
        wire
    }

    #[test]
    fn begin_master_routes_pins_and_idles_the_bus() {
        let sim = Sim::new();
        let wire = master(&sim);
        assert_eq!(wire.role(), Some(Role::Master));
        assert!(wire.sercom().is_bus_idle_wire());
        let (_, pins) = wire.release();
        assert_eq!(
            pins.events,
            vec![PinEvent::Peripheral(PINS.sda), PinEvent::Peripheral(PINS.scl)]
        );
    }

    #[test]
    fn write_then_stop() {
        let sim = Sim::new();
        let mut wire = master(&sim);
        wire.master_write(0x42, &[1, 2, 3]).unwrap();
        assert_eq!(sim.addresses(), vec![0x84]);
        assert_eq!(sim.peer_received(), vec![1, 2, 3]);
        assert_eq!(sim.commands(), vec![(STOP, false)]);
        assert!(wire.sercom().is_bus_idle_wire());
    }

    #[test]
    fn read_acks_all_but_the_last_byte() {
        let sim = Sim::new();
        sim.peer_bytes(&[9, 8, 7]);
        let mut wire = master(&sim);
        let mut buf = [0u8; 3];
        wire.master_read(0x42, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
        assert_eq!(sim.addresses(), vec![0x85]);
        assert_eq!(
            sim.commands(),
            vec![(READ, false), (READ, false), (STOP, true)]
        );
    }

    #[test]
    fn write_address_nack_stops_the_bus() {
        let sim = Sim::new();
        sim.nack_address();
        let mut wire = master(&sim);
        let err = wire.master_write(0x42, &[1]).unwrap_err();
        assert_eq!(err, Error::AddressNack);
        assert_eq!(
            err.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        );
        assert!(sim.peer_received().is_empty());
        assert_eq!(sim.commands(), vec![(STOP, false)]);
    }

    #[test]
    fn read_address_nack_stops_once() {
        let sim = Sim::new();
        sim.nack_address();
        let mut wire = master(&sim);
        let mut buf = [0u8; 2];
        assert_eq!(wire.master_read(0x42, &mut buf), Err(Error::AddressNack));
        assert_eq!(sim.commands(), vec![(STOP, false)]);
    }

    #[test]
    fn data_nack() {
        let sim = Sim::new();
        sim.nack_data();
        let mut wire = master(&sim);
        let err = wire.master_write(0x42, &[1, 2]).unwrap_err();
        assert_eq!(err, Error::DataNack);
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        assert_eq!(sim.peer_received(), vec![1]);
        assert_eq!(sim.commands(), vec![(STOP, false)]);
    }

    #[test]
    fn bus_error_is_reported_and_cleared() {
        let sim = Sim::new();
        sim.bus_error_on_send();
        let mut wire = master(&sim);
        let err = wire.master_write(0x42, &[1]).unwrap_err();
        assert_eq!(err, Error::BusError);
        assert_eq!(err.kind(), ErrorKind::Bus);
        assert_eq!(sim.reg(Reg::Status) & i2cm::BUSERR, 0);
    }

    #[test]
    fn write_read_uses_a_repeated_start() {
        let sim = Sim::new();
        sim.peer_bytes(&[0xAA]);
        let mut wire = master(&sim);
        let mut buf = [0u8; 1];
        I2c::write_read(&mut wire, 0x10, &[0x01], &mut buf).unwrap();
        assert_eq!(buf, [0xAA]);
        assert_eq!(sim.addresses(), vec![0x20, 0x21]);
        assert_eq!(sim.peer_received(), vec![0x01]);
        assert_eq!(sim.commands(), vec![(STOP, true)]);
    }

    #[test]
    fn adjacent_reads_share_one_start() {
        let sim = Sim::new();
        sim.peer_bytes(&[1, 2, 3]);
        let mut wire = master(&sim);
        let mut a = [0u8; 1];
        let mut b = [0u8; 2];
        wire.transaction(0x10, &mut [Operation::Read(&mut a), Operation::Read(&mut b)])
            .unwrap();
        assert_eq!((a, b), ([1], [2, 3]));
        assert_eq!(sim.addresses(), vec![0x21]);
        assert_eq!(
            sim.commands(),
            vec![(READ, false), (READ, false), (STOP, true)]
        );
    }

    #[test]
    fn zero_length_write_addresses_the_device() {
        let sim = Sim::new();
        let mut wire = master(&sim);
        embedded_hal_zero::blocking::i2c::Write::write(&mut wire, 0x33, &[]).unwrap();
        assert_eq!(sim.addresses(), vec![0x66]);
        assert_eq!(sim.commands(), vec![(STOP, false)]);
    }

    #[test]
    fn role_is_checked() {
        let sim = Sim::new();
        let mut wire = wire(&sim);
        assert_eq!(
            wire.master_write(0x10, &[1]),
            Err(Error::WrongRole {
                expected: Role::Master,
                found: None
            })
        );

        wire.begin_slave(0x30, false).unwrap();
        assert_eq!(
            wire.master_write(0x10, &[1]),
            Err(Error::WrongRole {
                expected: Role::Master,
                found: Some(Role::Slave)
            })
        );
        assert!(sim.addresses().is_empty());

        let mut wire = master(&sim);
        assert!(matches!(
            wire.poll_slave(),
            Err(Error::WrongRole {
                expected: Role::Slave,
                ..
            })
        ));
    }

    #[test]
    fn slave_receives_a_write() {
        let sim = Sim::new();
        let mut wire = slave(&sim);
        assert_eq!(wire.poll_slave(), Ok(None));

        sim.slave_address_match(false);
        assert_eq!(
            wire.poll_slave(),
            Ok(Some(SlaveEvent::AddressMatch { read: false }))
        );
        wire.slave_ack().unwrap();

        sim.slave_receive(0x5A);
        assert_eq!(wire.poll_slave(), Ok(Some(SlaveEvent::DataReceived(0x5A))));
        wire.slave_ack().unwrap();
        assert_eq!(wire.poll_slave(), Ok(None));

        sim.slave_stop();
        assert_eq!(wire.poll_slave(), Ok(Some(SlaveEvent::Stop)));
        assert_eq!(wire.poll_slave(), Ok(None));
        assert_eq!(sim.commands(), vec![(STOP, false), (STOP, false)]);
    }

    #[test]
    fn slave_answers_a_read() {
        let sim = Sim::new();
        let mut wire = slave(&sim);
        sim.slave_address_match(true);
        assert_eq!(
            wire.poll_slave(),
            Ok(Some(SlaveEvent::AddressMatch { read: true }))
        );
        wire.slave_ack().unwrap();

        sim.slave_request();
        assert_eq!(wire.poll_slave(), Ok(Some(SlaveEvent::DataRequested)));
        assert_eq!(wire.slave_respond(0x11), Ok(true));
        sim.master_nacks();
        assert_eq!(wire.slave_respond(0x22), Ok(false));
        assert_eq!(sim.slave_sent(), vec![0x11, 0x22]);
    }

    #[test]
    fn slave_nack_sets_the_acknowledge_action() {
        let sim = Sim::new();
        let mut wire = slave(&sim);
        sim.slave_address_match(false);
        wire.slave_nack().unwrap();
        assert_eq!(sim.commands(), vec![(STOP, true)]);
    }

    #[test]
    fn end_releases_an_owned_bus() {
        let sim = Sim::new();
        let mut wire = master(&sim);
        assert!(wire.sercom.start_transmission_wire(0x10, WireDirection::Write));
        assert!(wire.sercom().is_bus_owner_wire());
        wire.end().unwrap();
        assert_eq!(wire.role(), None);
        assert_eq!(sim.commands(), vec![(STOP, false)]);
        assert!(!wire.sercom().is_enabled());
    }
}
