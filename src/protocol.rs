use crate::bus::{BitBangBus, BusError};
use crate::hal::{BusPins, Delay};

const WRITE_BIT: u8 = 0;
const READ_BIT: u8 = 1;

/// 16-bit register transfers framed over the bit-bang engine for a single
/// follower at a fixed 7-bit address.
///
/// A failed acknowledge anywhere in a transaction aborts it immediately; the
/// engine's `wait_ack` has already stopped the bus by then, so every exit
/// path of every operation leaves the bus idle.
#[derive(Debug)]
pub struct RegisterBus<P, D> {
    bus: BitBangBus<P, D>,
    address: u8,
}

impl<P: BusPins, D: Delay> RegisterBus<P, D> {
    pub fn new(bus: BitBangBus<P, D>, address: u8) -> Self {
        debug_assert!(address <= 0x7F, "follower address {address:#04x} is not 7-bit");
        Self { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Write a 16-bit value: address, register, high byte, low byte, each
    /// acknowledged by the follower.
    pub fn write_register(&mut self, register: u8, value: u16) -> Result<(), BusError> {
        self.bus.start();
        self.bus.send_byte((self.address << 1) | WRITE_BIT);
        self.bus.wait_ack()?;

        self.bus.send_byte(register);
        self.bus.wait_ack()?;

        self.bus.send_byte((value >> 8) as u8);
        self.bus.wait_ack()?;

        self.bus.send_byte((value & 0xFF) as u8);
        self.bus.wait_ack()?;

        self.bus.stop();
        Ok(())
    }

    /// Read a 16-bit value: set the follower's register pointer in write
    /// mode, then switch direction with a repeated start (no intervening
    /// stop) and clock in the high byte (acknowledged) and the low byte
    /// (not acknowledged, the standard read-termination signal).
    pub fn read_register(&mut self, register: u8) -> Result<u16, BusError> {
        self.bus.start();
        self.bus.send_byte((self.address << 1) | WRITE_BIT);
        self.bus.wait_ack()?;

        self.bus.send_byte(register);
        self.bus.wait_ack()?;

        // Repeated start to switch transfer direction without releasing the bus.
        self.bus.start();
        self.bus.send_byte((self.address << 1) | READ_BIT);
        self.bus.wait_ack()?;

        let high = self.bus.receive_byte(true);
        let low = self.bus.receive_byte(false);
        self.bus.stop();

        Ok(u16::from(high) << 8 | u16::from(low))
    }

    /// Address-only probe: true when a follower acknowledges the address.
    /// Used by bus scanning outside the sampling core.
    pub fn probe(&mut self) -> bool {
        self.bus.start();
        self.bus.send_byte((self.address << 1) | WRITE_BIT);
        let acked = self.bus.wait_ack().is_ok();
        if acked {
            self.bus.stop();
        }
        acked
    }

    pub fn bus_mut(&mut self) -> &mut BitBangBus<P, D> {
        &mut self.bus
    }

    pub fn into_bus(self) -> BitBangBus<P, D> {
        self.bus
    }
}
