use luxbus::fault::SampleStatus;
use luxbus::sampler::LightSampler;
use luxbus::sensor::{encode_lux, DEFAULT_ADDRESS};
use luxbus::sim::{SimClock, SimulatedSensor};

fn sampler() -> LightSampler<SimulatedSensor, SimClock> {
    LightSampler::new(SimulatedSensor::new(DEFAULT_ADDRESS), SimClock::new())
}

/// Set the simulated scene and take one sample.
fn feed(sampler: &mut LightSampler<SimulatedSensor, SimClock>, lux: f32) -> f32 {
    sampler.pins_mut().set_result_raw(encode_lux(lux));
    sampler.sample()
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= b.abs() * 1e-4 + 1e-4
}

#[test]
fn test_window_median_over_first_accepts() {
    let mut sampler = sampler();

    // The window starts zero-filled, so early medians are dominated by the
    // zero slots until the window is warm.
    assert!(close(feed(&mut sampler, 10.0), 0.0));
    assert!(close(feed(&mut sampler, 50.0), 10.0));
    assert!(close(feed(&mut sampler, 30.0), 30.0));
    assert_eq!(sampler.status(), SampleStatus::Normal);

    // A fourth accept evicts the oldest slot (10): window {5, 50, 30}.
    assert!(close(feed(&mut sampler, 5.0), 30.0));
    assert_eq!(sampler.stats().accepted, 4);
}

#[test]
fn test_communication_error_returns_last_valid_unchanged() {
    let mut sampler = sampler();
    feed(&mut sampler, 10.0);
    feed(&mut sampler, 50.0);
    let last = feed(&mut sampler, 30.0);
    assert!(close(last, 30.0));

    // Refuse one full retry round (3 attempts).
    sampler.pins_mut().fail_next_transactions(3);
    let degraded = sampler.sample();

    assert_eq!(degraded, last);
    assert_eq!(sampler.status(), SampleStatus::CommunicationError);
    assert_eq!(sampler.stats().comm_errors, 1);
    assert_eq!(sampler.stats().retries_performed, 2);

    // The window was not touched by the failed attempt: the next accept
    // only evicts the oldest slot, yielding the median of {40, 50, 30}.
    assert!(close(feed(&mut sampler, 40.0), 40.0));
    assert_eq!(sampler.status(), SampleStatus::Normal);
}

#[test]
fn test_retry_recovers_within_bound() {
    let mut sampler = sampler();
    sampler.pins_mut().set_result_raw(encode_lux(120.0));
    sampler.pins_mut().fail_next_transactions(2);

    let lux = sampler.sample();

    // Third attempt succeeded; no fault surfaced.
    assert_eq!(sampler.status(), SampleStatus::Normal);
    assert!(close(lux, 0.0)); // first accept: median of {120, 0, 0}
    assert_eq!(sampler.stats().retries_performed, 2);
    assert_eq!(sampler.pins_mut().stats().address_nacks, 2);
    assert_eq!(sampler.stats().comm_errors, 0);
}

#[test]
fn test_retry_delay_advances_the_clock() {
    let mut sampler = sampler();
    sampler.pins_mut().fail_next_transactions(3);
    sampler.sample();

    // Two inter-attempt delays of 10 ms each, plus bus traffic.
    let elapsed = sampler
        .sensor_mut()
        .regs_mut()
        .bus_mut()
        .delay_mut()
        .elapsed_ms();
    assert!(elapsed >= 20, "elapsed only {elapsed} ms");
}

#[test]
fn test_range_rejection_on_corrupt_exponent() {
    let mut sampler = sampler();
    feed(&mut sampler, 100.0);
    let last = feed(&mut sampler, 100.0);
    assert!(close(last, 100.0));

    // Exponent 12 is outside the device's documented encoding span.
    sampler.pins_mut().override_next_read(0xCFFF);
    let degraded = sampler.sample();

    assert_eq!(degraded, last);
    assert_eq!(sampler.status(), SampleStatus::RangeError);
    assert_eq!(sampler.stats().range_errors, 1);
}

#[test]
fn test_zero_raw_reading_is_below_range() {
    let mut sampler = sampler();
    feed(&mut sampler, 100.0);
    feed(&mut sampler, 100.0);

    sampler.pins_mut().override_next_read(0x0000);
    sampler.sample();
    assert_eq!(sampler.status(), SampleStatus::RangeError);
}

#[test]
fn test_jump_rejection_at_threshold() {
    let mut sampler = sampler();
    // Warm the window until the median settles at 1000.
    feed(&mut sampler, 1000.0);
    feed(&mut sampler, 1000.0);
    let last = feed(&mut sampler, 1000.0);
    assert!(close(last, 1000.0));

    // 600 lux above the last trusted value exceeds the 500 lux threshold.
    let degraded = feed(&mut sampler, 1600.0);
    assert_eq!(degraded, last);
    assert_eq!(sampler.status(), SampleStatus::JumpError);
    assert_eq!(sampler.stats().jump_errors, 1);

    // A plausible follow-up is accepted again.
    feed(&mut sampler, 1100.0);
    assert_eq!(sampler.status(), SampleStatus::Normal);
}

#[test]
fn test_jump_stage_skipped_before_first_accept() {
    let mut sampler = sampler();

    // Last-valid is still the zero sentinel: even a huge first reading is
    // not treated as a jump.
    feed(&mut sampler, 2000.0);
    assert_eq!(sampler.status(), SampleStatus::Normal);
    assert_eq!(sampler.stats().jump_errors, 0);
}

#[test]
fn test_status_accessor_has_no_side_effects() {
    let mut sampler = sampler();
    feed(&mut sampler, 25.0);

    let before = *sampler.stats();
    let first = sampler.status();
    let second = sampler.status();

    assert_eq!(first, second);
    assert_eq!(before.total_samples, sampler.stats().total_samples);
    assert_eq!(sampler.pins_mut().stats().result_reads, 1);
}

#[test]
fn test_fault_log_records_rejections_in_order() {
    let mut sampler = sampler();
    feed(&mut sampler, 800.0);
    feed(&mut sampler, 800.0);

    sampler.pins_mut().fail_next_transactions(3);
    sampler.sample(); // CommunicationError
    feed(&mut sampler, 1600.0); // JumpError

    let log = sampler.fault_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].status, SampleStatus::CommunicationError);
    assert_eq!(log[1].status, SampleStatus::JumpError);
    assert!(log[0].sample_seq < log[1].sample_seq);
}

#[test]
fn test_sampler_with_absent_sensor_degrades_to_zero() {
    // Leader points at an address nothing is strapped to.
    let mut sampler = LightSampler::with_address(
        SimulatedSensor::new(DEFAULT_ADDRESS),
        SimClock::new(),
        0x47,
    );

    let lux = sampler.sample();
    assert_eq!(lux, 0.0);
    assert_eq!(sampler.status(), SampleStatus::CommunicationError);
}
