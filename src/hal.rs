use serde::{Deserialize, Serialize};

/// Direction of the data line. The clock line is always an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineDirection {
    Input,
    Output,
}

/// Two-wire bus port: one clock line and one bidirectional data line.
///
/// Implementations emulate open-drain behavior: the engine switches the data
/// line to `Input` before every read, and a line the engine treats as input
/// must never be actively driven high. On real hardware this maps to a pair
/// of GPIO pins; in tests it is backed by [`crate::sim::SimulatedSensor`].
pub trait BusPins {
    fn set_scl(&mut self, high: bool);
    fn set_sda(&mut self, high: bool);

    /// Level of the data line as seen on the wire (wired-AND of all drivers).
    fn sda_is_high(&mut self) -> bool;

    /// Direction switching applies to the data line only.
    fn set_sda_direction(&mut self, direction: LineDirection);
}

/// Blocking delay provider, calibrated so one unit is one physical
/// microsecond/millisecond. All delays are busy-waits; the calling thread is
/// fully occupied for the duration.
pub trait Delay {
    fn delay_us(&mut self, us: u32);

    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}
