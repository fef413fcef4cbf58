use bevy::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Resource, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    /// Canvas pixels per grid cell, only used for geometry
    pub cell_size: i32,
    /// Progress per tick on a straight track
    pub base_speed: f64,
    pub straight_speed: f64,
    pub curved_speed: f64,
    /// Progress occupied by a single car
    pub car_length: f64,
    /// Canvas radius of a car, two cars closer than this have collided
    pub car_radius: f64,
    pub checkpoint_tolerance: f64,
    pub checkpoint_offset_divisor: i32,
    pub station_count: usize,
    pub spawn_probability: f64,
    pub spawn_decay: f64,
    pub spawn_ramp_initial: usize,
    pub spawn_ramp_step: usize,
    pub min_cars: usize,
    pub max_cars: usize,
    pub auto_spawn: bool,
    pub seed: Option<u64>,
    pub tick_hz: f64,
    pub run_ticks: Option<u64>,
    pub scenario_path: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            grid_width: 10,
            grid_height: 6,
            cell_size: 100,
            base_speed: 0.01,
            straight_speed: 1.0,
            curved_speed: 0.7,
            car_length: 0.3,
            car_radius: 8.0,
            checkpoint_tolerance: 0.2,
            checkpoint_offset_divisor: 8,
            station_count: 6,
            spawn_probability: 0.02,
            spawn_decay: 0.5,
            spawn_ramp_initial: 2,
            spawn_ramp_step: 3,
            min_cars: 2,
            max_cars: 5,
            auto_spawn: true,
            seed: None,
            tick_hz: 60.0,
            run_ticks: None,
            scenario_path: None,
        }
    }
}

impl SimulationConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<SimulationConfig, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<SimulationConfig, ConfigError> {
        Ok(toml::from_str::<SimulationConfig>(contents)?)
    }

    /// Falls back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<SimulationConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(SimulationConfig::default());
        }
        let config = Self::load_from_file(path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn checkpoint_offset(&self) -> i32 {
        self.cell_size / self.checkpoint_offset_divisor.max(1)
    }

    /// Distance within which a car claims a checkpoint. Checkpoints lie half a
    /// cell apart along a track, so two cars less than `car_radius` apart always
    /// share one. Two extra pixels cover truncation of both positions.
    pub fn checkpoint_reach(&self) -> f64 {
        (self.cell_size as f64 / 2.0 + self.car_radius + 2.0) / 2.0 + self.checkpoint_tolerance
    }
}
