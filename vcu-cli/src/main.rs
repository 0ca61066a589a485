//! VCU Simulator CLI Application
//!
//! Runs the vehicle control core against simulated buses and inputs:
//! - Pedal readings come from the command line (raw ADC counts or ECU values)
//! - A responder plays the remote pedal ECU and the inverter
//! - Each motor command and the resulting telemetry is printed per step

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use vcu_core::io::INPUT_NONE;
use vcu_core::pedal::normalize::{normalize_and_constrain, POSITION_MAX};
use vcu_core::{
    Gear, MotorCommand, OperationState, PedalConfig, PotTracking, SimBus, SimulatedIo, TelemetryReader, TelemetrySnapshot,
    Vehicle,
};

mod config;
mod responder;

use config::AppConfig;
use responder::Responder;

/// VCU Simulator - Drive the vehicle control core without hardware
#[derive(Parser, Debug)]
#[command(name = "vcu-cli")]
#[command(about = "Simulate the EV control core on in-memory buses", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (vcu.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of simulation steps (overrides the config file)
    #[arg(short, long, value_name = "COUNT")]
    ticks: Option<u32>,

    /// Raw accelerator reading
    #[arg(long, value_name = "RAW", default_value_t = 0)]
    throttle: i32,

    /// Raw brake reading
    #[arg(long, value_name = "RAW", default_value_t = 0)]
    brake: i32,

    /// Gear to select once the drive is enabled
    #[arg(short, long, value_enum, default_value_t = GearArg::Drive)]
    gear: GearArg,

    /// Print one JSON object per motor command instead of text
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GearArg {
    Neutral,
    Drive,
    Reverse,
}

impl From<GearArg> for Gear {
    fn from(gear: GearArg) -> Self {
        match gear {
            GearArg::Neutral => Gear::Neutral,
            GearArg::Drive => Gear::Drive,
            GearArg::Reverse => Gear::Reverse,
        }
    }
}

/// One line of JSON output
#[derive(Serialize)]
struct StepReport<'a> {
    time_us: u64,
    command: &'a MotorCommand,
    telemetry: &'a TelemetrySnapshot,
    active_faults: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("VCU Simulator v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using vcu-core v{}", vcu_core::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let buses = (0..app_config.bus_count()).map(|_| SimBus::new()).collect();
    let mut vehicle = Vehicle::new(app_config.vehicle_config(), buses)?;
    let io = simulated_inputs(&app_config, &args);

    let mut responder = Responder::new(app_config.motor.device);
    responder.set_pedals(args.throttle, args.brake);

    let wanted_gear = Gear::from(args.gear);
    vehicle
        .motor_mut()
        .arbiter_mut()
        .command_state(OperationState::Enable);

    let sim = &app_config.simulation;
    let ticks = args.ticks.unwrap_or(sim.ticks);
    log::info!(
        "Running {} steps of {} us with {:?}",
        ticks,
        sim.step_us,
        app_config.motor.device
    );

    let mut time_us = 0;
    for _ in 0..ticks {
        // Keep asking for the gear, the arbiter drops to NEUTRAL on link loss
        if vehicle.motor().arbiter().state().gear != wanted_gear {
            vehicle.motor_mut().arbiter_mut().command_gear(wanted_gear);
        }

        let commands = vehicle.advance(sim.step_us, &io);
        time_us += sim.step_us;

        for bus in vehicle.buses_mut() {
            let sent = bus.take_sent();
            if !sim.respond {
                continue;
            }
            for reply in responder.answer(&sent) {
                bus.inject(reply);
            }
        }

        for command in &commands {
            let telemetry = vehicle.motor().arbiter().telemetry();
            if args.json {
                let report = StepReport {
                    time_us,
                    command,
                    telemetry,
                    active_faults: vehicle.faults().active_faults().len(),
                };
                println!("{}", serde_json::to_string(&report)?);
            } else if !args.quiet {
                println!(
                    "{:>8} us  {:?}/{:?}  throttle {:>5}  torque {:>7.1} Nm  speed {:>5} rpm  actual {:>7.1} Nm {:>5} rpm",
                    time_us,
                    command.state.op_state,
                    command.state.gear,
                    command.throttle,
                    command.torque,
                    command.speed,
                    telemetry.torque_actual,
                    telemetry.speed_actual
                );
            }
        }
    }

    let faults = vehicle.faults().active_faults();
    if faults.is_empty() {
        log::info!(
            "Finished: throttle {}, {} Nm at {} rpm",
            vehicle.throttle(),
            vehicle.torque_actual(),
            vehicle.speed_actual()
        );
    } else {
        for (device, kind) in faults {
            log::warn!("Active fault: {:?} {:?}", device, kind);
        }
    }

    Ok(())
}

/// Latch the command line readings onto the pedal channels and selectors
fn simulated_inputs(config: &AppConfig, args: &Args) -> SimulatedIo {
    let mut io = SimulatedIo::new();
    if let Some(accelerator) = &config.accelerator {
        io.set_analog(accelerator.adc_channel, args.throttle);
        if accelerator.is_dual_pot() {
            io.set_analog(
                accelerator.adc_channel2,
                second_pot_reading(accelerator, args.throttle),
            );
        }
    }
    if let Some(brake) = &config.brake {
        io.set_analog(brake.adc_channel, args.brake);
    }

    let motor = &config.motor;
    if motor.enable_input != INPUT_NONE {
        io.set_digital(motor.enable_input, true);
    }
    if motor.forward_input != INPUT_NONE {
        io.set_digital(motor.forward_input, args.gear == GearArg::Drive);
    }
    if motor.reverse_input != INPUT_NONE {
        io.set_digital(motor.reverse_input, args.gear == GearArg::Reverse);
    }
    io
}

/// Reading of the second pot that agrees with `throttle` on the first
fn second_pot_reading(config: &PedalConfig, throttle: i32) -> i32 {
    let mut position = normalize_and_constrain(
        throttle,
        config.minimum_level as i32,
        config.maximum_level as i32,
    ) as i32;
    if config.tracking == PotTracking::Inverse {
        position = POSITION_MAX - position;
    }
    let min2 = config.minimum_level2 as i32;
    let max2 = config.maximum_level2 as i32;
    min2 + (max2 - min2) * position / POSITION_MAX
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
