pub mod checkpoint;
pub mod engine;
pub mod geometry;
pub mod graph;
pub mod spawner;
pub mod train;

use crate::config::SimulationConfig;
use crate::display::{Snapshot, command_at};
use crate::event::{CanvasClick, SimulationCommand, SimulationUpdate};
use crate::scenario::{load_scenario_or_default, save_scenario};
use crate::simulation::engine::Simulation;
use bevy::prelude::*;

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<SimulationCommand>()
            .add_message::<SimulationUpdate>()
            .add_message::<CanvasClick>()
            .init_resource::<SimulationConfig>()
            .init_resource::<Snapshot>()
            .add_systems(Startup, setup)
            .add_systems(
                Update,
                ((translate_clicks, apply_commands).chain(), log_updates, stop_after_run_ticks),
            )
            .add_systems(FixedUpdate, (run_tick, refresh_snapshot).chain())
            .add_systems(Last, save_on_exit);
    }
}

fn setup(mut commands: Commands, config: Res<SimulationConfig>, fixed_time: Option<ResMut<Time<Fixed>>>) {
    if let Some(mut fixed_time) = fixed_time {
        fixed_time.set_timestep_hz(config.tick_hz.max(1.0));
    }

    let config = config.clone();
    let simulation = match config.scenario_path.clone() {
        Some(path) if path.exists() => load_scenario_or_default(path, config),
        _ => Simulation::with_stations(config),
    };
    commands.insert_resource(simulation);
}

fn translate_clicks(
    simulation: Res<Simulation>,
    mut clicks: MessageReader<CanvasClick>,
    mut simulation_commands: MessageWriter<SimulationCommand>,
) {
    for click in clicks.read() {
        match command_at(&simulation, click.point, click.secondary) {
            Some(command) => {
                simulation_commands.write(command);
            }
            None => debug!("Nothing under {:?}", click.point),
        }
    }
}

fn apply_commands(
    mut simulation: ResMut<Simulation>,
    mut snapshot: ResMut<Snapshot>,
    mut simulation_commands: MessageReader<SimulationCommand>,
) {
    let mut changed = false;
    for command in simulation_commands.read() {
        if *command == SimulationCommand::SaveScenario {
            save_to_configured_path(&simulation);
            continue;
        }
        if simulation.apply(command) {
            changed = true;
        } else {
            debug!("Ignored {:?}", command);
        }
    }
    if changed {
        *snapshot = Snapshot::capture(&simulation, None);
    }
}

fn save_to_configured_path(simulation: &Simulation) {
    match &simulation.config().scenario_path {
        Some(path) => {
            if let Err(err) = save_scenario(simulation, path) {
                error!("Cannot save scenario to {}: {}", path.display(), err);
            }
        }
        None => warn!("No scenario path configured, nothing saved"),
    }
}

fn run_tick(mut simulation: ResMut<Simulation>, mut simulation_updates: MessageWriter<SimulationUpdate>) {
    simulation_updates.write_batch(simulation.tick());
}

fn refresh_snapshot(simulation: Res<Simulation>, mut snapshot: ResMut<Snapshot>) {
    *snapshot = Snapshot::capture(&simulation, None);
}

fn log_updates(mut simulation_updates: MessageReader<SimulationUpdate>) {
    for update in simulation_updates.read() {
        debug!("{:?}", update);
    }
}

fn stop_after_run_ticks(simulation: Res<Simulation>, mut app_exit: MessageWriter<AppExit>) {
    let Some(limit) = simulation.config().run_ticks else {
        return;
    };
    if simulation.tick_count() >= limit {
        info!(
            "Stopping after {} ticks with {} trains on the network",
            simulation.tick_count(),
            simulation.trains().len()
        );
        app_exit.write(AppExit::Success);
    }
}

fn save_on_exit(simulation: Option<Res<Simulation>>, mut app_exit: MessageReader<AppExit>) {
    if app_exit.read().last().is_none() {
        return;
    }
    if let Some(simulation) = simulation {
        if simulation.config().scenario_path.is_some() {
            save_to_configured_path(&simulation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TrainKind;
    use crate::simulation::geometry::Point;
    use crate::simulation::graph::TrackKind;
    use bevy::ecs::message::Messages;

    fn config() -> SimulationConfig {
        SimulationConfig {
            grid_width: 5,
            grid_height: 4,
            station_count: 2,
            auto_spawn: false,
            seed: Some(11),
            ..Default::default()
        }
    }

    fn app(config: SimulationConfig) -> App {
        let mut app = App::new();
        app.insert_resource(config).add_plugins(SimulationPlugin);
        app.update();
        app
    }

    fn drain_updates(app: &mut App) -> Vec<SimulationUpdate> {
        app.world_mut().resource_mut::<Messages<SimulationUpdate>>().drain().collect()
    }

    #[test]
    fn test_startup_builds_stations() {
        let app = app(config());
        let simulation = app.world().resource::<Simulation>();
        assert_eq!(simulation.stations().len(), 2);
        assert!(simulation.construction_mode());
    }

    #[test]
    fn test_commands_reach_simulation() {
        let mut app = app(config());
        let station = app.world().resource::<Simulation>().stations()[0].clone();

        app.world_mut().write_message(SimulationCommand::SetConstructionMode(false));
        app.world_mut().write_message(SimulationCommand::SpawnTrain {
            node: station.node,
            color: station.color,
            car_count: 2,
        });
        app.update();
        assert!(!app.world().resource::<Snapshot>().construction_mode);

        app.world_mut().run_schedule(FixedUpdate);
        let updates = drain_updates(&mut app);
        assert!(updates.iter().any(|update| matches!(
            update,
            SimulationUpdate::TrainSpawned { node, kind: TrainKind::Regular, car_count: 2, .. } if *node == station.node
        )));
        assert_eq!(app.world().resource::<Simulation>().tick_count(), 1);
        assert_eq!(app.world().resource::<Snapshot>().cars.len(), 1);
    }

    #[test]
    fn test_click_toggles_track() {
        let mut app = app(config());
        let track = {
            let graph = app.world().resource::<Simulation>().graph();
            let (a, b) = (graph.node_id(1, 1).unwrap(), graph.node_id(2, 1).unwrap());
            graph.find_track(a, b, TrackKind::Straight).unwrap()
        };
        assert!(!app.world().resource::<Simulation>().graph().track(track).enabled);

        // (1,1) -> (2,1) runs along y = 150
        app.world_mut().write_message(CanvasClick {
            point: Point::new(200.0, 151.0),
            secondary: false,
        });
        app.update();
        assert!(app.world().resource::<Simulation>().graph().track(track).enabled);

        // secondary clicks spawn nothing while building
        app.world_mut().write_message(CanvasClick {
            point: Point::new(200.0, 151.0),
            secondary: true,
        });
        app.update();
        assert!(app.world().resource::<Simulation>().graph().track(track).enabled);
        assert!(app.world().resource::<Simulation>().trains().is_empty());
    }

    #[test]
    fn test_exit_after_run_ticks() {
        let mut app = app(SimulationConfig {
            run_ticks: Some(3),
            ..config()
        });
        assert!(app.should_exit().is_none());
        for _ in 0..3 {
            app.world_mut().run_schedule(FixedUpdate);
        }
        app.update();
        assert_eq!(app.should_exit(), Some(AppExit::Success));
    }

    #[test]
    fn test_save_command_writes_scenario() {
        let path = std::env::temp_dir().join("grid_rail_save_command.json");
        let _ = std::fs::remove_file(&path);
        let mut app = app(SimulationConfig {
            scenario_path: Some(path.clone()),
            ..config()
        });

        app.world_mut().write_message(SimulationCommand::SaveScenario);
        app.update();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"nodes\""));
        std::fs::remove_file(&path).unwrap();
    }
}
