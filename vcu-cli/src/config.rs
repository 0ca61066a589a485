//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vcu_core::{MotorConfig, PedalConfig, VehicleConfig};

/// Simulator configuration (loaded from vcu.toml)
///
/// A missing `[accelerator]` or `[brake]` table means the vehicle has no such
/// pedal. Without a config file the default vehicle is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub accelerator: Option<PedalConfig>,
    #[serde(default)]
    pub brake: Option<PedalConfig>,
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Simulated time per step in microseconds
    #[serde(default = "default_step_us")]
    pub step_us: u64,

    /// Number of steps to run
    #[serde(default = "default_ticks")]
    pub ticks: u32,

    /// Number of simulated buses
    #[serde(default = "default_buses")]
    pub buses: u8,

    /// Answer pedal polls and inverter commands like real devices would
    #[serde(default = "default_respond")]
    pub respond: bool,
}

fn default_step_us() -> u64 {
    10_000
}

fn default_ticks() -> u32 {
    100
}

fn default_buses() -> u8 {
    2
}

fn default_respond() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_us: default_step_us(),
            ticks: default_ticks(),
            buses: default_buses(),
            respond: default_respond(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let vehicle = VehicleConfig::default();
        Self {
            accelerator: vehicle.accelerator,
            brake: vehicle.brake,
            motor: vehicle.motor,
            simulation: SimulationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn vehicle_config(&self) -> VehicleConfig {
        VehicleConfig {
            accelerator: self.accelerator.clone(),
            brake: self.brake.clone(),
            motor: self.motor.clone(),
        }
    }

    /// Buses needed so every configured device finds its bus
    pub fn bus_count(&self) -> usize {
        let highest = [
            self.accelerator.as_ref().map(|p| p.bus_index),
            self.brake.as_ref().map(|p| p.bus_index),
            Some(self.motor.bus_index),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);
        (self.simulation.buses as usize).max(highest as usize + 1)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .vehicle_config()
        .validate()
        .with_context(|| format!("Invalid vehicle configuration in {:?}", path))?;

    Ok(config)
}
