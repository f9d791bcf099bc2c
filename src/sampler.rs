use crate::fault::{FaultEvent, FaultLog, SampleStatus, SamplerStats};
use crate::hal::{BusPins, Delay};
use crate::sensor::{Opt3001, SensorError};
use static_assertions::const_assert;
use tracing::{debug, warn};

pub const MAX_READ_RETRIES: u8 = 3;
pub const RETRY_DELAY_MS: u32 = 10;

/// Documented valid span of the sensor.
pub const MIN_LUX: f32 = 0.01;
pub const MAX_LUX: f32 = 83_886.08;

/// Largest change between consecutive accepted samples that is physically
/// plausible for this deployment.
pub const JUMP_THRESHOLD_LUX: f32 = 500.0;

pub const FILTER_WINDOW_LEN: usize = 3;

// The median of an even-length window is ambiguous.
const_assert!(FILTER_WINDOW_LEN % 2 == 1);

fn in_range(lux: f32) -> bool {
    (MIN_LUX..=MAX_LUX).contains(&lux)
}

fn window_median(window: &[f32; FILTER_WINDOW_LEN]) -> f32 {
    let mut sorted = *window;
    sorted.sort_by(f32::total_cmp);
    sorted[FILTER_WINDOW_LEN / 2]
}

/// Fault-tolerant sampling pipeline over one ambient-light sensor.
///
/// `sample()` always returns a usable lux value: a freshly accepted median,
/// or the last trusted value when the current attempt is rejected. The
/// classification of the most recent attempt is observable through
/// [`status`](Self::status). Single-owner: all state is mutated only through
/// `&mut self`, and one polling loop is expected to own the sampler.
#[derive(Debug)]
pub struct LightSampler<P, D> {
    sensor: Opt3001<P, D>,
    window: [f32; FILTER_WINDOW_LEN],
    window_index: usize,
    last_valid: f32,
    status: SampleStatus,
    stats: SamplerStats,
    fault_log: FaultLog,
}

impl<P: BusPins, D: Delay> LightSampler<P, D> {
    pub fn new(pins: P, delay: D) -> Self {
        Self::from_sensor(Opt3001::new(pins, delay))
    }

    pub fn with_address(pins: P, delay: D, address: u8) -> Self {
        Self::from_sensor(Opt3001::with_address(pins, delay, address))
    }

    pub fn from_sensor(sensor: Opt3001<P, D>) -> Self {
        Self {
            sensor,
            window: [0.0; FILTER_WINDOW_LEN],
            window_index: 0,
            last_valid: 0.0,
            status: SampleStatus::Normal,
            stats: SamplerStats::default(),
            fault_log: FaultLog::new(),
        }
    }

    /// Configure the sensor; see [`Opt3001::initialize`]. Retry-forever or
    /// halt on failure is the caller's policy, not the pipeline's.
    pub fn initialize(&mut self) -> Result<(), SensorError> {
        self.sensor.initialize()
    }

    /// Acquire one measurement: bounded-retry read, range validation, jump
    /// rejection, then median filtering. Rejected attempts leave the window
    /// and last-valid value untouched and return the last trusted value.
    pub fn sample(&mut self) -> f32 {
        self.stats.total_samples += 1;
        let seq = self.stats.total_samples;

        // Retry stage: transient acknowledge timeouts are absorbed here and
        // only surface as CommunicationError once the bound is exhausted.
        let mut reading = None;
        for attempt in 0..MAX_READ_RETRIES {
            if attempt > 0 {
                self.sensor.delay_ms(RETRY_DELAY_MS);
                self.stats.retries_performed += 1;
            }
            match self.sensor.read_lux() {
                Ok(lux) => {
                    reading = Some(lux);
                    break;
                }
                Err(error) => debug!(attempt = attempt + 1, %error, "result read failed"),
            }
        }
        let Some(lux) = reading else {
            warn!(retries = MAX_READ_RETRIES, "all read attempts failed");
            return self.reject(seq, SampleStatus::CommunicationError);
        };

        // Range stage: structural fault of the current sample, not retried.
        if !in_range(lux) {
            warn!(lux, "decoded value outside sensor span");
            return self.reject(seq, SampleStatus::RangeError);
        }

        // Jump stage. A last-valid value of exactly 0.0 doubles as the
        // "no prior sample" sentinel, so a true-darkness accept re-arms
        // this skip.
        if self.last_valid != 0.0 && (lux - self.last_valid).abs() > JUMP_THRESHOLD_LUX {
            warn!(
                lux,
                last_valid = self.last_valid,
                "implausible jump rejected"
            );
            return self.reject(seq, SampleStatus::JumpError);
        }

        // Accept stage: overwrite the oldest window slot and report the
        // median of the window copy.
        self.window[self.window_index] = lux;
        self.window_index = (self.window_index + 1) % FILTER_WINDOW_LEN;
        let median = window_median(&self.window);

        self.status = SampleStatus::Normal;
        self.stats.accepted += 1;
        self.last_valid = median;
        median
    }

    fn reject(&mut self, seq: u32, status: SampleStatus) -> f32 {
        match status {
            SampleStatus::CommunicationError => self.stats.comm_errors += 1,
            SampleStatus::RangeError => self.stats.range_errors += 1,
            SampleStatus::JumpError => self.stats.jump_errors += 1,
            SampleStatus::Normal => debug_assert!(false, "normal status is not a rejection"),
        }
        self.status = status;
        self.fault_log.record(seq, status);
        self.last_valid
    }

    /// Classification of the most recent sampling attempt. Read-only; does
    /// not trigger sampling.
    pub fn status(&self) -> SampleStatus {
        self.status
    }

    pub fn last_valid(&self) -> f32 {
        self.last_valid
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    pub fn fault_log(&self) -> &[FaultEvent] {
        self.fault_log.events()
    }

    pub fn sensor_mut(&mut self) -> &mut Opt3001<P, D> {
        &mut self.sensor
    }

    pub fn pins_mut(&mut self) -> &mut P {
        self.sensor.pins_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_boundaries() {
        assert!(in_range(MIN_LUX));
        assert!(in_range(MAX_LUX));
        assert!(in_range(1000.0));

        // One encoding unit (0.01 lux) outside either boundary.
        assert!(!in_range(MIN_LUX - 0.01));
        assert!(!in_range(MAX_LUX + 0.01));
        assert!(!in_range(0.0));
    }

    #[test]
    fn test_window_median() {
        assert_eq!(window_median(&[10.0, 50.0, 30.0]), 30.0);
        assert_eq!(window_median(&[5.0, 50.0, 30.0]), 30.0);
        assert_eq!(window_median(&[10.0, 0.0, 0.0]), 0.0);
        assert_eq!(window_median(&[0.0, 0.0, 0.0]), 0.0);
    }
}
