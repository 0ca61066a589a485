//! Vehicle Control Unit Core Library
//!
//! The real-time control core of an electric vehicle controller: raw pedal
//! signals are turned into a validated propulsion demand, arbitrated against
//! the vehicle operating state and encoded into inverter command frames.
//! Inverter status frames are decoded back into a common telemetry model.
//!
//! # Architecture
//!
//! Per tick, data flows through these stages:
//! - Signal source (potentiometer, polled remote ECU, synthetic ramp)
//! - Validator, normalizer and demand mapper (see [`pedal`])
//! - Command arbiter owning gear, enable state and power mode (see [`arbiter`])
//! - Backend encoder/decoder for the selected inverter (see [`backend`])
//!
//! Liveness monitors on polled pedals and on the inverter can force the
//! arbiter into NEUTRAL. Faults are reported into a shared [`FaultTable`].
//!
//! The library does NOT:
//! - Talk to hardware (buses, I/O and preferences are traits)
//! - Own a real-time clock (the [`TickScheduler`] advances simulated time)
//! - Provide a configuration UI
//!
//! # Example Usage
//!
//! ```
//! use vcu_core::{Gear, OperationState, SimBus, SimulatedIo, TelemetryReader, Vehicle, VehicleConfig};
//!
//! // Potentiometer accelerator and a simulated inverter
//! let mut vehicle = Vehicle::new(VehicleConfig::default(), vec![SimBus::new()]).unwrap();
//!
//! let arbiter = vehicle.motor_mut().arbiter_mut();
//! arbiter.command_state(OperationState::Enable);
//! arbiter.command_gear(Gear::Drive);
//!
//! // Half travel on the default 20..3150 range
//! let mut io = SimulatedIo::new();
//! io.set_analog(0, 1585);
//! vehicle.advance(100_000, &io);
//!
//! assert_eq!(vehicle.throttle(), 500);
//! ```

// Public modules
pub mod arbiter;
pub mod backend;
pub mod bus;
pub mod config;
pub mod faults;
pub mod io;
pub mod liveness;
pub mod motor;
pub mod pedal;
pub mod prefs;
pub mod scheduler;
pub mod telemetry;
pub mod types;
pub mod vehicle;

// Re-export main types for convenience
pub use arbiter::{CommandArbiter, Gear, MotorCommand, OperatingState, OperationState, PowerMode};
pub use backend::{InverterBackend, MotorBackend};
pub use bus::{BusFilter, CanBus, SimBus};
pub use config::{EcuProfile, MotorConfig, PedalConfig, PotTracking, VehicleConfig};
pub use faults::{FaultKind, FaultRecord, FaultTable};
pub use io::{AnalogInput, DigitalInput, SimulatedIo};
pub use motor::MotorController;
pub use pedal::{Pedal, PedalRole, RawSignal, ValidationStatus};
pub use prefs::{MemoryPreferenceStore, PreferenceStore};
pub use scheduler::TickScheduler;
pub use telemetry::{TelemetryReader, TelemetrySnapshot, TelemetryUpdate};
pub use types::{CanFrame, DeviceId, DeviceKind, Result, Timestamp, VcuError};
pub use vehicle::Vehicle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
