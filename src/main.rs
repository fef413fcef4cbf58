mod common;
mod config;
mod display;
mod event;
mod scenario;
mod simulation;

use crate::config::SimulationConfig;
use crate::simulation::SimulationPlugin;
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "resources/simulation.toml";

fn main() -> AppExit {
    let mut app = App::new();
    app.add_plugins(LogPlugin::default());

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match SimulationConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("Cannot load {}: {}", config_path, err);
            return AppExit::error();
        }
    };
    let frame = Duration::from_secs_f64(1.0 / config.tick_hz.max(1.0));

    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame)))
        .insert_resource(config)
        .add_plugins(SimulationPlugin)
        .run()
}
