//! # Ambient-Light Sampling Driver
//!
//! A fault-tolerant sampling driver for an OPT3001-class ambient-light
//! sensor reachable only through a software-emulated (bit-banged) two-wire
//! serial bus.
//!
//! ## Features
//!
//! - **Bit-level bus engine**: start/stop conditions, MSB-first byte
//!   transfers, acknowledge handling with a bounded poll, and repeated
//!   starts, all from timed GPIO toggling over injected pin/delay traits
//! - **Register protocol**: 16-bit register reads/writes with abort-safe
//!   acknowledge checking that always leaves the bus idle
//! - **Fault-tolerant pipeline**: bounded retry, range validation, jump
//!   rejection, and sliding-window median filtering with an observable
//!   per-sample status
//! - **Pin-level simulation**: a simulated follower decodes the wire
//!   protocol edge-by-edge, with deterministic fault injection for tests
//!   and demos
//!
//! ## Quick Start
//!
//! ```rust
//! use luxbus::sampler::LightSampler;
//! use luxbus::sensor::{encode_lux, DEFAULT_ADDRESS};
//! use luxbus::sim::{SimClock, SimulatedSensor};
//!
//! let mut pins = SimulatedSensor::new(DEFAULT_ADDRESS);
//! pins.set_result_raw(encode_lux(320.0));
//!
//! let mut sampler = LightSampler::new(pins, SimClock::new());
//! sampler.initialize().expect("configuration verified");
//!
//! let lux = sampler.sample();
//! println!("{lux:.2} lux, status {:?}", sampler.status());
//! ```
//!
//! ## Architecture
//!
//! - [`hal`] - Pin and delay traits consumed by the engine
//! - [`bus`] - Bit-bang two-wire bus engine
//! - [`protocol`] - 16-bit register transfers over the engine
//! - [`sensor`] - Device layer: decode, configuration, identity
//! - [`sampler`] - Fault-tolerant sampling pipeline
//! - [`fault`] - Status taxonomy and fault diagnostics
//! - [`sim`] - Simulated sensor, virtual clock, glitch generator

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod bus;
pub mod fault;
pub mod hal;
pub mod protocol;
pub mod sampler;
pub mod sensor;
pub mod sim;

// Re-export main public types for convenience
pub use fault::SampleStatus;
pub use sampler::LightSampler;
pub use sensor::Opt3001;
pub use sim::{SimClock, SimulatedSensor};
