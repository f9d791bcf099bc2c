//! Pin-level simulated sensor: a two-wire bus follower driven purely by
//! observed line transitions, plus a virtual clock and a deterministic
//! glitch generator. Stands in for the hardware collaborators in tests and
//! in the `luxmon` demo binary.

use crate::hal::{BusPins, Delay, LineDirection};
use crate::sensor::{
    CONFIG_REG, DEVICE_ID, DEVICE_ID_REG, HIGH_LIMIT_REG, LOW_LIMIT_REG, MANUFACTURER_ID,
    MANUFACTURER_ID_REG, RESULT_REG,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub const DEFAULT_GLITCH_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// Register file of the simulated device. Writes over the bus land only in
/// the writable registers; the test harness can force any register through
/// [`SimulatedSensor::set_register`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegisterFile {
    result: u16,
    config: u16,
    low_limit: u16,
    high_limit: u16,
    manufacturer_id: u16,
    device_id: u16,
}

impl RegisterFile {
    fn new() -> Self {
        Self {
            result: 0,
            config: 0,
            low_limit: 0,
            high_limit: 0,
            manufacturer_id: MANUFACTURER_ID,
            device_id: DEVICE_ID,
        }
    }

    fn read(&self, register: u8) -> u16 {
        match register {
            RESULT_REG => self.result,
            CONFIG_REG => self.config,
            LOW_LIMIT_REG => self.low_limit,
            HIGH_LIMIT_REG => self.high_limit,
            MANUFACTURER_ID_REG => self.manufacturer_id,
            DEVICE_ID_REG => self.device_id,
            _ => 0,
        }
    }

    fn bus_write(&mut self, register: u8, value: u16) {
        // Result and identification registers are read-only on the wire.
        match register {
            CONFIG_REG => self.config = value,
            LOW_LIMIT_REG => self.low_limit = value,
            HIGH_LIMIT_REG => self.high_limit = value,
            _ => {}
        }
    }

    fn force(&mut self, register: u8, value: u16) {
        match register {
            RESULT_REG => self.result = value,
            CONFIG_REG => self.config = value,
            LOW_LIMIT_REG => self.low_limit = value,
            HIGH_LIMIT_REG => self.high_limit = value,
            MANUFACTURER_ID_REG => self.manufacturer_id = value,
            DEVICE_ID_REG => self.device_id = value,
            _ => {}
        }
    }
}

/// Counters observed by tests; all start at zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SimStats {
    pub starts: u32,
    pub stops: u32,
    pub transactions: u32,
    pub address_nacks: u32,
    pub register_writes: u32,
    pub result_reads: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteKind {
    Address,
    RegisterPointer,
    DataHigh,
    DataLow,
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterAck {
    ReceivePointer,
    ReceiveDataHigh,
    ReceiveDataLow,
    ReceiveOverflow,
    SendResultHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Shifting a byte in; the follower samples on rising clock edges.
    Receiving { kind: ByteKind, byte: u8, bits: u8 },
    /// Driving (or withholding) the acknowledge bit for one clock.
    AckHold { next: AfterAck },
    /// Shifting a byte out; the drive changes on falling clock edges.
    /// `remaining` bits are still to be presented after the current one.
    Sending { byte: u8, remaining: u8, low_next: bool },
    /// Sampling the leader's acknowledge after a transmitted byte.
    AwaitLeaderAck { low_next: bool, acked: Option<bool> },
    /// Transaction refused or finished; ignore traffic until start/stop.
    AwaitStop,
}

/// A simulated ambient-light sensor as seen from the bus pins.
///
/// The follower decodes the wire protocol from edges alone: start is a data
/// fall while the clock is high, stop a data rise while the clock is high;
/// bits are sampled on rising clock edges and the follower's own drive
/// changes only on falling edges. The data line is the wired-AND of the
/// leader's and the follower's contributions.
#[derive(Debug)]
pub struct SimulatedSensor {
    address: u8,
    registers: RegisterFile,
    pointer: u8,

    scl: bool,
    sda_leader: bool,
    sda_leader_dir: LineDirection,
    sda_follower_low: bool,

    phase: Phase,
    write_high: u8,
    read_latch: u16,

    nack_budget: u32,
    next_read_override: Option<u16>,

    stats: SimStats,
}

impl SimulatedSensor {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: RegisterFile::new(),
            pointer: 0,
            scl: true,
            sda_leader: true,
            sda_leader_dir: LineDirection::Output,
            sda_follower_low: false,
            phase: Phase::Idle,
            write_high: 0,
            read_latch: 0,
            nack_budget: 0,
            next_read_override: None,
            stats: SimStats::default(),
        }
    }

    /// Refuse the address acknowledge for the next `count` transaction
    /// attempts. Each refused attempt aborts the transaction, so one unit
    /// here maps to one failed read or write attempt.
    pub fn fail_next_transactions(&mut self, count: u32) {
        self.nack_budget = self.nack_budget.saturating_add(count);
    }

    /// Substitute `raw` for the next register read transfer, once. Used to
    /// model a corrupted result or a failed configuration readback.
    pub fn override_next_read(&mut self, raw: u16) {
        self.next_read_override = Some(raw);
    }

    pub fn set_register(&mut self, register: u8, value: u16) {
        self.registers.force(register, value);
    }

    pub fn register(&self, register: u8) -> u16 {
        self.registers.read(register)
    }

    pub fn set_result_raw(&mut self, raw: u16) {
        self.registers.result = raw;
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// True when the follower state machine is idle and both lines read
    /// high, i.e. the leader has left the bus in the stopped state.
    pub fn bus_is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle) && self.scl && self.bus_sda()
    }

    fn bus_sda(&self) -> bool {
        let leader = match self.sda_leader_dir {
            LineDirection::Output => self.sda_leader,
            LineDirection::Input => true,
        };
        leader && !self.sda_follower_low
    }

    fn on_start(&mut self) {
        self.stats.starts += 1;
        self.sda_follower_low = false;
        self.phase = Phase::Receiving {
            kind: ByteKind::Address,
            byte: 0,
            bits: 0,
        };
    }

    fn on_stop(&mut self) {
        self.stats.stops += 1;
        self.sda_follower_low = false;
        self.phase = Phase::Idle;
    }

    fn on_scl_rising(&mut self) {
        match self.phase {
            Phase::Receiving { kind, byte, bits } => {
                let bit = u8::from(self.bus_sda());
                self.phase = Phase::Receiving {
                    kind,
                    byte: (byte << 1) | bit,
                    bits: bits + 1,
                };
            }
            Phase::AwaitLeaderAck { low_next, .. } => {
                self.phase = Phase::AwaitLeaderAck {
                    low_next,
                    acked: Some(!self.bus_sda()),
                };
            }
            _ => {}
        }
    }

    fn on_scl_falling(&mut self) {
        match self.phase {
            Phase::Receiving { kind, byte, bits } if bits == 8 => {
                self.process_byte(kind, byte);
            }
            Phase::AckHold { next } => {
                self.sda_follower_low = false;
                match next {
                    AfterAck::ReceivePointer => self.receive_next(ByteKind::RegisterPointer),
                    AfterAck::ReceiveDataHigh => self.receive_next(ByteKind::DataHigh),
                    AfterAck::ReceiveDataLow => self.receive_next(ByteKind::DataLow),
                    AfterAck::ReceiveOverflow => self.receive_next(ByteKind::Overflow),
                    AfterAck::SendResultHigh => {
                        self.begin_send((self.read_latch >> 8) as u8, true);
                    }
                }
            }
            Phase::Sending {
                byte,
                remaining,
                low_next,
            } => {
                if remaining > 0 {
                    self.present_bit(byte << 1, remaining - 1, low_next);
                } else {
                    self.sda_follower_low = false;
                    self.phase = Phase::AwaitLeaderAck {
                        low_next,
                        acked: None,
                    };
                }
            }
            Phase::AwaitLeaderAck { low_next, acked } => {
                if acked == Some(true) && low_next {
                    self.begin_send((self.read_latch & 0xFF) as u8, false);
                } else {
                    self.sda_follower_low = false;
                    self.phase = Phase::AwaitStop;
                }
            }
            _ => {}
        }
    }

    fn receive_next(&mut self, kind: ByteKind) {
        self.phase = Phase::Receiving { kind, byte: 0, bits: 0 };
    }

    fn begin_send(&mut self, byte: u8, low_next: bool) {
        self.present_bit(byte, 7, low_next);
    }

    fn present_bit(&mut self, byte: u8, remaining: u8, low_next: bool) {
        self.sda_follower_low = byte & 0x80 == 0;
        self.phase = Phase::Sending {
            byte,
            remaining,
            low_next,
        };
    }

    fn ack(&mut self, next: AfterAck) {
        self.sda_follower_low = true;
        self.phase = Phase::AckHold { next };
    }

    fn process_byte(&mut self, kind: ByteKind, byte: u8) {
        match kind {
            ByteKind::Address => {
                if self.nack_budget > 0 {
                    self.nack_budget -= 1;
                    self.stats.address_nacks += 1;
                    self.phase = Phase::AwaitStop;
                    return;
                }
                if byte >> 1 != self.address {
                    self.phase = Phase::AwaitStop;
                    return;
                }
                self.stats.transactions += 1;
                if byte & 0x01 != 0 {
                    self.read_latch = self.latch_for_transfer();
                    trace!(
                        pointer = self.pointer,
                        value = self.read_latch,
                        "follower latched register for read"
                    );
                    self.ack(AfterAck::SendResultHigh);
                } else {
                    self.ack(AfterAck::ReceivePointer);
                }
            }
            ByteKind::RegisterPointer => {
                self.pointer = byte;
                self.ack(AfterAck::ReceiveDataHigh);
            }
            ByteKind::DataHigh => {
                self.write_high = byte;
                self.ack(AfterAck::ReceiveDataLow);
            }
            ByteKind::DataLow => {
                let value = u16::from(self.write_high) << 8 | u16::from(byte);
                self.registers.bus_write(self.pointer, value);
                self.stats.register_writes += 1;
                trace!(
                    register = self.pointer,
                    value,
                    "follower committed register write"
                );
                self.ack(AfterAck::ReceiveOverflow);
            }
            // Nothing meaningful follows a committed write; refuse extras.
            ByteKind::Overflow => self.phase = Phase::AwaitStop,
        }
    }

    fn latch_for_transfer(&mut self) -> u16 {
        if self.pointer == RESULT_REG {
            self.stats.result_reads += 1;
        }
        if let Some(raw) = self.next_read_override.take() {
            return raw;
        }
        self.registers.read(self.pointer)
    }
}

impl BusPins for SimulatedSensor {
    fn set_scl(&mut self, high: bool) {
        if self.scl == high {
            return;
        }
        self.scl = high;
        if high {
            self.on_scl_rising();
        } else {
            self.on_scl_falling();
        }
    }

    fn set_sda(&mut self, high: bool) {
        let before = self.bus_sda();
        self.sda_leader = high;
        self.sda_edge(before);
    }

    fn sda_is_high(&mut self) -> bool {
        self.bus_sda()
    }

    fn set_sda_direction(&mut self, direction: LineDirection) {
        let before = self.bus_sda();
        self.sda_leader_dir = direction;
        self.sda_edge(before);
    }
}

impl SimulatedSensor {
    fn sda_edge(&mut self, before: bool) {
        let after = self.bus_sda();
        if before == after || !self.scl {
            return;
        }
        if after {
            self.on_stop();
        } else {
            self.on_start();
        }
    }
}

/// Virtual clock: accumulates requested delay instead of busy-waiting, so
/// tests can assert on elapsed time and run instantly.
#[derive(Debug, Default)]
pub struct SimClock {
    elapsed_us: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_us / 1000
    }
}

impl Delay for SimClock {
    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += u64::from(us);
    }
}

/// Configuration for the probabilistic glitch generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlitchConfig {
    pub enabled: bool,
    /// Chance per cycle of refusing a burst of transactions.
    pub comm_fault_rate_percent: f32,
    /// Transactions refused per burst; 3 exhausts one full retry round.
    pub comm_fault_burst: u32,
    /// Chance per cycle of substituting a wild raw result.
    pub spike_rate_percent: f32,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            comm_fault_rate_percent: 5.0,
            comm_fault_burst: 3,
            spike_rate_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct GlitchStats {
    pub cycles: u32,
    pub comm_bursts_injected: u32,
    pub spikes_injected: u32,
}

/// Deterministic pseudo-random fault scheduler for the simulated sensor.
#[derive(Debug)]
pub struct GlitchGenerator {
    config: GlitchConfig,
    stats: GlitchStats,

    // Linear Congruential Generator for deterministic runs.
    rng_state: u64,
}

impl GlitchGenerator {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_GLITCH_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            config: GlitchConfig::default(),
            stats: GlitchStats::default(),
            rng_state: seed,
        }
    }

    pub fn with_config(config: GlitchConfig, seed: u64) -> Self {
        Self {
            config,
            stats: GlitchStats::default(),
            rng_state: seed,
        }
    }

    /// Roll once per sampling cycle and arm the corresponding fault hook.
    pub fn update(&mut self, sensor: &mut SimulatedSensor) {
        if !self.config.enabled {
            return;
        }
        self.stats.cycles += 1;

        if self.random_float() < self.config.comm_fault_rate_percent / 100.0 {
            sensor.fail_next_transactions(self.config.comm_fault_burst);
            self.stats.comm_bursts_injected += 1;
        } else if self.random_float() < self.config.spike_rate_percent / 100.0 {
            sensor.override_next_read(self.random_u16());
            self.stats.spikes_injected += 1;
        }
    }

    pub fn stats(&self) -> &GlitchStats {
        &self.stats
    }

    pub fn config(&self) -> &GlitchConfig {
        &self.config
    }

    fn next_random(&mut self) -> u64 {
        // Parameters from Numerical Recipes.
        self.rng_state = self.rng_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.rng_state
    }

    fn random_u16(&mut self) -> u16 {
        (self.next_random() >> 16) as u16
    }

    fn random_float(&mut self) -> f32 {
        (self.next_random() as f32) / (u64::MAX as f32)
    }
}

impl Default for GlitchGenerator {
    fn default() -> Self {
        Self::new()
    }
}
