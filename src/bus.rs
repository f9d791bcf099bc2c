use crate::hal::{BusPins, Delay, LineDirection};
use thiserror::Error;
use tracing::debug;

/// Fixed iteration bound for the acknowledge poll. This is a count, not a
/// wall-clock budget: real-world duration depends on the per-iteration delay.
pub const ACK_POLL_LIMIT: u16 = 250;

// Hand-calibrated for the single supported bus speed class. The bus is not
// speed-adaptive; these are not negotiated at runtime.
const BIT_DELAY_US: u32 = 1;
const START_STOP_DELAY_US: u32 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("no acknowledge from follower within {0} poll iterations")]
    AckTimeout(u16),
}

/// Software-emulated two-wire bus leader.
///
/// Every primitive obeys the bus family's defining timing rule: the data line
/// changes only while the clock is low, and the follower samples only while
/// the clock is high. `wait_ack` is the only fallible primitive; all others
/// execute a fixed, data-independent number of steps.
#[derive(Debug)]
pub struct BitBangBus<P, D> {
    pins: P,
    delay: D,
}

impl<P: BusPins, D: Delay> BitBangBus<P, D> {
    pub fn new(pins: P, delay: D) -> Self {
        Self { pins, delay }
    }

    /// Configure both lines as bus lines and release them (idle = both high).
    pub fn init_lines(&mut self) {
        self.pins.set_sda_direction(LineDirection::Output);
        self.pins.set_scl(true);
        self.pins.set_sda(true);
    }

    /// Start condition: data falls while the clock is high. Also serves as a
    /// repeated start when issued without an intervening `stop`.
    pub fn start(&mut self) {
        self.pins.set_sda_direction(LineDirection::Output);
        self.pins.set_sda(true);
        self.pins.set_scl(true);
        self.delay.delay_us(START_STOP_DELAY_US);
        self.pins.set_sda(false);
        self.delay.delay_us(START_STOP_DELAY_US);
        self.pins.set_scl(false);
    }

    /// Stop condition: data rises while the clock is high, leaving the bus idle.
    pub fn stop(&mut self) {
        self.pins.set_sda_direction(LineDirection::Output);
        self.pins.set_sda(false);
        self.pins.set_scl(true);
        self.delay.delay_us(START_STOP_DELAY_US);
        self.pins.set_sda(true);
        self.delay.delay_us(START_STOP_DELAY_US);
    }

    /// Clock out one byte, most-significant bit first.
    pub fn send_byte(&mut self, value: u8) {
        self.pins.set_sda_direction(LineDirection::Output);
        self.pins.set_scl(false);
        for bit in (0..8).rev() {
            self.pins.set_sda(value & (1 << bit) != 0);
            self.delay.delay_us(BIT_DELAY_US);
            self.pins.set_scl(true);
            self.delay.delay_us(BIT_DELAY_US);
            self.pins.set_scl(false);
        }
        self.delay.delay_us(BIT_DELAY_US);
    }

    /// Release the data line and poll for the follower's acknowledge.
    ///
    /// On timeout the bus is stopped before returning, so the line is idle on
    /// every exit path.
    pub fn wait_ack(&mut self) -> Result<(), BusError> {
        self.pins.set_sda_direction(LineDirection::Input);
        self.delay.delay_us(BIT_DELAY_US);
        self.pins.set_scl(true);
        self.delay.delay_us(BIT_DELAY_US);

        let mut polls: u16 = 0;
        while self.pins.sda_is_high() {
            polls += 1;
            if polls > ACK_POLL_LIMIT {
                debug!(polls, "acknowledge poll bound exceeded");
                self.stop();
                return Err(BusError::AckTimeout(ACK_POLL_LIMIT));
            }
            self.delay.delay_us(BIT_DELAY_US);
        }

        self.pins.set_scl(false);
        self.pins.set_sda_direction(LineDirection::Output);
        Ok(())
    }

    /// Drive the acknowledge bit: data low acknowledges, data high does not.
    pub fn send_ack(&mut self, ack: bool) {
        self.pins.set_scl(false);
        self.pins.set_sda_direction(LineDirection::Output);
        self.pins.set_sda(!ack);
        self.delay.delay_us(BIT_DELAY_US);
        self.pins.set_scl(true);
        self.delay.delay_us(BIT_DELAY_US);
        self.pins.set_scl(false);
        self.pins.set_sda(true);
    }

    /// Clock in one byte, most-significant bit first, then send the
    /// acknowledge bit (`ack = false` signals end-of-read to the follower).
    pub fn receive_byte(&mut self, ack: bool) -> u8 {
        let mut byte: u8 = 0;
        self.pins.set_sda_direction(LineDirection::Input);
        for _ in 0..8 {
            self.pins.set_scl(false);
            self.delay.delay_us(BIT_DELAY_US);
            self.pins.set_scl(true);
            byte <<= 1;
            if self.pins.sda_is_high() {
                byte |= 0x01;
            }
            self.delay.delay_us(BIT_DELAY_US);
        }
        self.send_ack(ack);
        byte
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn into_parts(self) -> (P, D) {
        (self.pins, self.delay)
    }
}
