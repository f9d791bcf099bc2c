use luxbus::bus::{BitBangBus, BusError, ACK_POLL_LIMIT};
use luxbus::protocol::RegisterBus;
use luxbus::sensor::{
    CONFIG_REG, DEFAULT_ADDRESS, HIGH_LIMIT_REG, LOW_LIMIT_REG, RESULT_REG,
};
use luxbus::sim::{SimClock, SimulatedSensor};

fn register_bus(address: u8) -> RegisterBus<SimulatedSensor, SimClock> {
    let mut bus = BitBangBus::new(SimulatedSensor::new(DEFAULT_ADDRESS), SimClock::new());
    bus.init_lines();
    RegisterBus::new(bus, address)
}

#[test]
fn test_register_write_reaches_follower() {
    let mut regs = register_bus(DEFAULT_ADDRESS);

    let result = regs.write_register(CONFIG_REG, 0xCE00);
    assert!(result.is_ok());

    let pins = regs.bus_mut().pins_mut();
    assert_eq!(pins.register(CONFIG_REG), 0xCE00);
    assert_eq!(pins.stats().register_writes, 1);
    assert!(pins.bus_is_idle());
}

#[test]
fn test_register_read_returns_follower_bytes_high_then_low() {
    let mut regs = register_bus(DEFAULT_ADDRESS);
    regs.bus_mut().pins_mut().set_result_raw(0xAB12);

    let value = regs.read_register(RESULT_REG).unwrap();
    assert_eq!(value, 0xAB12);

    let pins = regs.bus_mut().pins_mut();
    assert_eq!(pins.stats().result_reads, 1);
    assert!(pins.bus_is_idle());
}

#[test]
fn test_limit_registers_round_trip_over_the_wire() {
    let mut regs = register_bus(DEFAULT_ADDRESS);

    regs.write_register(LOW_LIMIT_REG, 0x0123).unwrap();
    regs.write_register(HIGH_LIMIT_REG, 0xBFFF).unwrap();

    assert_eq!(regs.read_register(LOW_LIMIT_REG).unwrap(), 0x0123);
    assert_eq!(regs.read_register(HIGH_LIMIT_REG).unwrap(), 0xBFFF);
}

#[test]
fn test_address_mismatch_aborts_with_timeout() {
    // Follower is strapped to 0x44; the leader addresses 0x45.
    let mut regs = register_bus(0x45);

    let write = regs.write_register(CONFIG_REG, 0xCE00);
    assert_eq!(write, Err(BusError::AckTimeout(ACK_POLL_LIMIT)));

    let read = regs.read_register(RESULT_REG);
    assert_eq!(read, Err(BusError::AckTimeout(ACK_POLL_LIMIT)));

    let pins = regs.bus_mut().pins_mut();
    assert_eq!(pins.stats().register_writes, 0);
    assert!(pins.bus_is_idle());
}

#[test]
fn test_ack_timeout_leaves_bus_idle_and_recovers() {
    let mut regs = register_bus(DEFAULT_ADDRESS);
    regs.bus_mut().pins_mut().set_result_raw(0x1234);
    regs.bus_mut().pins_mut().fail_next_transactions(1);

    assert!(regs.read_register(RESULT_REG).is_err());
    assert!(regs.bus_mut().pins_mut().bus_is_idle());

    // The refusal budget is spent; the next transaction goes through.
    assert_eq!(regs.read_register(RESULT_REG).unwrap(), 0x1234);
}

#[test]
fn test_probe_finds_only_the_strapped_address() {
    let mut regs = register_bus(DEFAULT_ADDRESS);
    assert!(regs.probe());
    assert!(regs.bus_mut().pins_mut().bus_is_idle());

    let mut regs = register_bus(0x46);
    assert!(!regs.probe());
    assert!(regs.bus_mut().pins_mut().bus_is_idle());
}

#[test]
fn test_writes_to_read_only_registers_are_ignored() {
    let mut regs = register_bus(DEFAULT_ADDRESS);
    regs.bus_mut().pins_mut().set_result_raw(0x0456);

    // The transaction completes (the follower acknowledges) but the value
    // must not land.
    regs.write_register(RESULT_REG, 0xDEAD).unwrap();
    assert_eq!(regs.read_register(RESULT_REG).unwrap(), 0x0456);
}
