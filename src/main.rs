mod clock;
mod effects;
mod error;
mod flight;
mod input;
mod level;
mod oscillator;
mod outcome;
mod ui;

use bevy::core_pipeline::bloom::BloomSettings;
use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use bevy::render::camera::ScalingMode;
use bevy::window::WindowResolution;
use bevy_rapier2d::prelude::*;
use clock::ClockPlugin;
use effects::EffectsPlugin;
use error::config_failure;
use flight::{FlightPlugin, PIXELS_PER_METER};
use input::InputPlugin;
use level::{LevelPlugin, ARENA_SIZE};
use oscillator::OscillatorPlugin;
use outcome::OutcomePlugin;
use ui::UiPlugin;

fn main() -> AppExit {
    let mut app = App::new();
    app.insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.04)))
        .insert_resource(Msaa::Sample4)
        .add_plugins(FrameTimeDiagnosticsPlugin)
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "rocket-lander".into(),
                resolution: WindowResolution::new(ARENA_SIZE.x, ARENA_SIZE.y),
                ..default()
            }),
            ..default()
        }));

    let levels = match LevelPlugin::new(0) {
        Ok(levels) => levels,
        Err(err) => return config_failure(err),
    };

    app.add_plugins(
        RapierPhysicsPlugin::<NoUserData>::pixels_per_meter(PIXELS_PER_METER).in_fixed_schedule(),
    )
    .add_plugins((
        ClockPlugin,
        InputPlugin,
        FlightPlugin,
        OutcomePlugin,
        levels,
        OscillatorPlugin,
        EffectsPlugin,
        UiPlugin,
    ))
    .add_systems(Startup, spawn_camera)
    .run()
}

/// HDR camera that always keeps the whole arena in view.
fn spawn_camera(mut commands: Commands) {
    let mut camera = Camera2dBundle {
        camera: Camera {
            hdr: true,
            ..default()
        },
        tonemapping: Tonemapping::TonyMcMapface,
        ..default()
    };
    camera.projection.scaling_mode = ScalingMode::AutoMin {
        min_width: ARENA_SIZE.x,
        min_height: ARENA_SIZE.y,
    };
    commands.spawn((camera, BloomSettings::NATURAL));
}
