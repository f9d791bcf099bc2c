use crate::bus::{BitBangBus, BusError};
use crate::hal::{BusPins, Delay};
use crate::protocol::RegisterBus;
use thiserror::Error;
use tracing::info;

// Register file of the OPT3001-class ambient-light sensor.
pub const RESULT_REG: u8 = 0x00;
pub const CONFIG_REG: u8 = 0x01;
pub const LOW_LIMIT_REG: u8 = 0x02;
pub const HIGH_LIMIT_REG: u8 = 0x03;
pub const MANUFACTURER_ID_REG: u8 = 0x7E;
pub const DEVICE_ID_REG: u8 = 0x7F;

/// Follower address with the ADDR pin tied to GND; 0x45-0x47 select the
/// alternate strappings.
pub const DEFAULT_ADDRESS: u8 = 0x44;

pub const MANUFACTURER_ID: u16 = 0x5449;
pub const DEVICE_ID: u16 = 0x3001;

/// Configuration word selecting continuous-conversion mode and the stock
/// conversion-time field.
pub const CONFIG_CONTINUOUS: u16 = 0xCE00;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("configuration readback mismatch: wrote {wrote:#06x}, read {read:#06x}")]
    ConfigVerify { wrote: u16, read: u16 },
    #[error("identity mismatch in register {register:#04x}: expected {expected:#06x}, found {found:#06x}")]
    IdentityMismatch {
        register: u8,
        expected: u16,
        found: u16,
    },
}

/// Convert the sensor's register encoding to lux.
///
/// The top 4 bits are a binary exponent, the low 12 bits a mantissa:
/// `lux = mantissa * 2^exponent * 0.01`. Pure and total; callers filter
/// failed reads before decoding.
pub fn decode_lux(raw: u16) -> f32 {
    let exponent = (raw >> 12) & 0x0F;
    let mantissa = raw & 0x0FFF;
    f32::from(mantissa) * (1u32 << exponent) as f32 * 0.01
}

/// Inverse of [`decode_lux`]: smallest encoding whose decoded value is
/// closest to `lux`, clamped to the representable span. The limit-threshold
/// registers use the same format as the result register.
pub fn encode_lux(lux: f32) -> u16 {
    if lux <= 0.0 {
        return 0;
    }
    let mut counts = (lux / 0.01).round() as u32;
    let mut exponent: u16 = 0;
    while counts > 0x0FFF && exponent < 11 {
        counts >>= 1;
        exponent += 1;
    }
    (exponent << 12) | (counts.min(0x0FFF) as u16)
}

/// Ambient-light sensor behind the register protocol: configuration,
/// identity checks, and raw/decoded result reads. Retry policy lives one
/// layer up, in the sampling pipeline.
#[derive(Debug)]
pub struct Opt3001<P, D> {
    regs: RegisterBus<P, D>,
}

impl<P: BusPins, D: Delay> Opt3001<P, D> {
    pub fn new(pins: P, delay: D) -> Self {
        Self::with_address(pins, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(pins: P, delay: D, address: u8) -> Self {
        Self {
            regs: RegisterBus::new(BitBangBus::new(pins, delay), address),
        }
    }

    /// Bring up the bus lines, select continuous conversion, and verify the
    /// configuration word reads back bit-exact. Not retried here; retry or
    /// halt on failure is the caller's policy.
    pub fn initialize(&mut self) -> Result<(), SensorError> {
        self.regs.bus_mut().init_lines();

        self.regs.write_register(CONFIG_REG, CONFIG_CONTINUOUS)?;
        let read = self.regs.read_register(CONFIG_REG)?;
        if read != CONFIG_CONTINUOUS {
            return Err(SensorError::ConfigVerify {
                wrote: CONFIG_CONTINUOUS,
                read,
            });
        }

        info!(
            address = self.regs.address(),
            config = CONFIG_CONTINUOUS,
            "sensor configured for continuous conversion"
        );
        Ok(())
    }

    /// Check the read-only identification registers against the expected
    /// manufacturer and device IDs.
    pub fn verify_id(&mut self) -> Result<(), SensorError> {
        let manufacturer = self.regs.read_register(MANUFACTURER_ID_REG)?;
        if manufacturer != MANUFACTURER_ID {
            return Err(SensorError::IdentityMismatch {
                register: MANUFACTURER_ID_REG,
                expected: MANUFACTURER_ID,
                found: manufacturer,
            });
        }

        let device = self.regs.read_register(DEVICE_ID_REG)?;
        if device != DEVICE_ID {
            return Err(SensorError::IdentityMismatch {
                register: DEVICE_ID_REG,
                expected: DEVICE_ID,
                found: device,
            });
        }

        Ok(())
    }

    pub fn read_raw(&mut self) -> Result<u16, BusError> {
        self.regs.read_register(RESULT_REG)
    }

    pub fn read_lux(&mut self) -> Result<f32, SensorError> {
        Ok(decode_lux(self.read_raw()?))
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.regs.bus_mut().delay_mut().delay_ms(ms);
    }

    pub fn regs_mut(&mut self) -> &mut RegisterBus<P, D> {
        &mut self.regs
    }

    pub fn pins_mut(&mut self) -> &mut P {
        self.regs.bus_mut().pins_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= b.abs() * 1e-5 + 1e-6
    }

    #[test]
    fn test_decode_zero() {
        assert_eq!(decode_lux(0x0000), 0.0);
    }

    #[test]
    fn test_decode_known_vectors() {
        // Smallest nonzero encoding.
        assert!(close(decode_lux(0x0001), 0.01));
        // Exponent 5, mantissa 3125: 3125 * 32 * 0.01 = 1000 lux.
        assert!(close(decode_lux(0x5C35), 1000.0));
        // Largest encodable value: exponent 11, mantissa 4095.
        assert!(close(decode_lux(0xBFFF), 83_865.6));
    }

    #[test]
    fn test_decode_monotonic_in_mantissa() {
        for exponent in 0..=11u16 {
            let base = exponent << 12;
            let mut previous = decode_lux(base);
            for mantissa in 1..=0x0FFFu16 {
                let current = decode_lux(base | mantissa);
                assert!(
                    current > previous,
                    "not monotonic at exponent {exponent}, mantissa {mantissa}"
                );
                previous = current;
            }
        }
    }

    #[test]
    fn test_encode_matches_decode() {
        assert_eq!(encode_lux(0.0), 0x0000);
        assert_eq!(encode_lux(0.01), 0x0001);
        assert_eq!(encode_lux(1000.0), 0x5C35);
        assert!(close(decode_lux(encode_lux(512.0)), 512.0));
    }

    #[test]
    fn test_decode_deterministic() {
        for raw in [0x0000u16, 0x0123, 0x5C35, 0xBFFF, 0xFFFF] {
            assert_eq!(decode_lux(raw).to_bits(), decode_lux(raw).to_bits());
        }
    }
}
