use clap::{App, Arg};
use colored::{ColoredString, Colorize};
use luxbus::bus::BitBangBus;
use luxbus::fault::SampleStatus;
use luxbus::hal::Delay;
use luxbus::protocol::RegisterBus;
use luxbus::sampler::LightSampler;
use luxbus::sensor::{encode_lux, Opt3001};
use luxbus::sim::{GlitchConfig, GlitchGenerator, SimClock, SimulatedSensor, DEFAULT_GLITCH_SEED};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const SCAN_ADDRESSES: [u8; 4] = [0x44, 0x45, 0x46, 0x47];
const POWER_ON_SETTLE_MS: u32 = 100;
const SCAN_RETRY_DELAY_MS: u32 = 5;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = App::new("luxmon")
        .version("0.1.0")
        .author("Embedded Sensing Team")
        .about("🔆 Ambient-light monitor - fault-tolerant sampling against a simulated sensor")
        .arg(
            Arg::with_name("cycles")
                .short("n")
                .long("cycles")
                .value_name("N")
                .help("Number of sampling cycles (0 = run forever)")
                .takes_value(true)
                .default_value("30")
                .validator(numeric),
        )
        .arg(
            Arg::with_name("interval")
                .short("i")
                .long("interval-ms")
                .value_name("MS")
                .help("Pause between sampling cycles in milliseconds")
                .takes_value(true)
                .default_value("250")
                .validator(numeric),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["table", "json", "compact"])
                .default_value("table"),
        )
        .arg(
            Arg::with_name("lux")
                .long("lux")
                .value_name("LUX")
                .help("Baseline scene illuminance fed to the simulated sensor")
                .takes_value(true)
                .default_value("480"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Glitch generator seed (runs are deterministic per seed)")
                .takes_value(true)
                .validator(numeric),
        )
        .arg(
            Arg::with_name("comm-rate")
                .long("comm-rate")
                .value_name("PERCENT")
                .help("Chance per cycle of a communication-fault burst")
                .takes_value(true)
                .default_value("8"),
        )
        .arg(
            Arg::with_name("spike-rate")
                .long("spike-rate")
                .value_name("PERCENT")
                .help("Chance per cycle of a corrupted result register")
                .takes_value(true)
                .default_value("8"),
        )
        .get_matches();

    let cycles: u32 = matches.value_of("cycles").unwrap().parse().unwrap();
    let interval_ms: u64 = matches.value_of("interval").unwrap().parse().unwrap();
    let format = matches.value_of("format").unwrap().to_string();
    let base_lux: f32 = matches
        .value_of("lux")
        .unwrap()
        .parse()
        .expect("lux must be a number");
    let seed: u64 = matches
        .value_of("seed")
        .map_or(DEFAULT_GLITCH_SEED, |s| s.parse().unwrap());

    let glitch_config = GlitchConfig {
        enabled: true,
        comm_fault_rate_percent: matches
            .value_of("comm-rate")
            .unwrap()
            .parse()
            .expect("comm-rate must be a number"),
        comm_fault_burst: 3,
        spike_rate_percent: matches
            .value_of("spike-rate")
            .unwrap()
            .parse()
            .expect("spike-rate must be a number"),
    };

    println!("🔆 Ambient-Light Monitor");
    println!("========================");

    // Simulated hardware: the sensor behind the pins, and a virtual clock
    // standing in for the calibrated delay primitive.
    let mut pins = SimulatedSensor::new(0x44);
    pins.set_result_raw(encode_lux(base_lux));

    let mut bus = BitBangBus::new(pins, SimClock::new());
    bus.init_lines();

    // Give the part time to come out of power-on before addressing it.
    bus.delay_mut().delay_ms(POWER_ON_SETTLE_MS);

    let (address, bus) = match scan_bus(bus) {
        (Some(address), bus) => {
            println!("   Device found at {address:#04x} {}", "✓".green());
            (address, bus)
        }
        (None, _) => {
            eprintln!("{}", "❌ No device acknowledged the bus scan".red());
            std::process::exit(1);
        }
    };

    let (pins, clock) = bus.into_parts();
    let mut sampler = LightSampler::from_sensor(Opt3001::with_address(pins, clock, address));

    match sampler.initialize() {
        Ok(()) => println!("   Configuration: {}", "✓ verified".green()),
        Err(error) => {
            warn!(%error, "initialization failed");
            println!("   Configuration: {} ({error})", "✗ failed".red());
        }
    }

    match sampler.sensor_mut().verify_id() {
        Ok(()) => println!("   Identity:      {}", "✓ OPT3001".green()),
        Err(error) => println!("   Identity:      {} ({error})", "✗ mismatch".red()),
    }
    println!();

    let mut glitches = GlitchGenerator::with_config(glitch_config, seed);
    info!(seed, "glitch generator armed");

    let mut cycle: u32 = 0;
    loop {
        cycle += 1;

        // Scene illuminance drifts slowly around the baseline.
        let scene = base_lux * (1.0 + 0.25 * (cycle as f32 * 0.35).sin());
        sampler.pins_mut().set_result_raw(encode_lux(scene));
        glitches.update(sampler.pins_mut());

        let lux = sampler.sample();
        let status = sampler.status();

        match format.as_str() {
            "json" => {
                let line = serde_json::json!({
                    "cycle": cycle,
                    "lux": lux,
                    "status": status,
                    "scene": scene,
                });
                println!("{line}");
            }
            "compact" => println!("cycle={cycle} lux={lux:.2} status={status:?}"),
            _ => println!(
                "  {:>4}  {:>10.2} lux  {}",
                cycle,
                lux,
                status_label(status)
            ),
        }

        if cycles != 0 && cycle >= cycles {
            break;
        }
        thread::sleep(Duration::from_millis(interval_ms));
    }

    let stats = *sampler.stats();
    println!("\n📊 Sampling summary");
    println!("   Samples:        {}", stats.total_samples);
    println!("   Accepted:       {}", stats.accepted);
    println!("   Comm errors:    {}", stats.comm_errors);
    println!("   Range errors:   {}", stats.range_errors);
    println!("   Jump errors:    {}", stats.jump_errors);
    println!("   Retries:        {}", stats.retries_performed);
    println!(
        "   Injected:       {} bursts, {} spikes",
        glitches.stats().comm_bursts_injected,
        glitches.stats().spikes_injected
    );
}

/// Probe the candidate follower addresses in order, as a deployment with an
/// unknown ADDR strapping would.
fn scan_bus(
    mut bus: BitBangBus<SimulatedSensor, SimClock>,
) -> (Option<u8>, BitBangBus<SimulatedSensor, SimClock>) {
    for address in SCAN_ADDRESSES {
        let mut regs = RegisterBus::new(bus, address);
        let found = regs.probe();
        bus = regs.into_bus();
        if found {
            return (Some(address), bus);
        }
        bus.delay_mut().delay_ms(SCAN_RETRY_DELAY_MS);
    }
    (None, bus)
}

fn status_label(status: SampleStatus) -> ColoredString {
    match status {
        SampleStatus::Normal => "NORMAL".green(),
        SampleStatus::CommunicationError => "COMM-ERR".red(),
        SampleStatus::RangeError => "RANGE-ERR".yellow(),
        SampleStatus::JumpError => "JUMP-ERR".magenta(),
    }
}

fn numeric(value: String) -> Result<(), String> {
    value
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| "must be a non-negative number".to_string())
}
