use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};

use crate::clock::GameClock;
use crate::flight::{Craft, FlightController, FlightSettings};
use crate::input::Keybinds;
use crate::level::{LevelProgress, LEVELS};
use crate::outcome::{Outcome, OutcomeResolver, Phase};

#[derive(Resource)]
pub struct HudSettings {
    pub show_help: bool,
}

impl Default for HudSettings {
    fn default() -> Self {
        Self { show_help: true }
    }
}

pub struct UiPlugin;
impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin)
            .init_resource::<HudSettings>()
            .add_systems(Update, (help_toggle, hud_system, outcome_banner));
    }
}

fn help_toggle(
    mut hud: ResMut<HudSettings>,
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
) {
    if keys.just_pressed(keybinds.help) {
        hud.show_help = !hud.show_help;
    }
}

fn hud_system(
    mut contexts: EguiContexts,
    clock: Res<GameClock>,
    progress: Res<LevelProgress>,
    resolver: Res<OutcomeResolver>,
    mut flight: ResMut<FlightSettings>,
    craft_q: Query<&FlightController, With<Craft>>,
    diagnostics: Res<DiagnosticsStore>,
    hud: Res<HudSettings>,
    keybinds: Res<Keybinds>,
) {
    egui::Window::new("Flight").show(contexts.ctx_mut(), |ui| {
        let name = LEVELS.get(progress.current()).map_or("?", |l| l.name);
        ui.label(format!(
            "Level {} / {}: {}",
            progress.current() + 1,
            progress.total(),
            name
        ));
        if let Some(fps) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
            if let Some(value) = fps.smoothed() {
                ui.label(format!("FPS: {:.1}", value));
            }
        }
        ui.label(format!("Phase: {:?}", resolver.phase()));
        ui.label(format!("Timers pending: {}", clock.pending()));
        ui.label(format!(
            "Collisions: {}",
            if resolver.is_collidable() { "on" } else { "off" }
        ));
        if let Ok(controller) = craft_q.get_single() {
            ui.label(format!(
                "Controls: {}",
                if controller.is_enabled() { "live" } else { "locked" }
            ));
        }

        ui.separator();

        // Picked up by the next craft spawned.
        ui.add(egui::Slider::new(&mut flight.thrust_force, 200.0..=3000.0).text("Thrust"));
        ui.add(egui::Slider::new(&mut flight.rotation_force, 50.0..=600.0).text("Turn rate"));
    });

    if hud.show_help {
        egui::Window::new("Help").show(contexts.ctx_mut(), |ui| {
            ui.label(format!("{:?}/{:?}: Thrust", keybinds.thrust, keybinds.thrust_alt));
            ui.label(format!(
                "{:?}/{:?}: Rotate left",
                keybinds.rotate_left, keybinds.rotate_left_alt
            ));
            ui.label(format!(
                "{:?}/{:?}: Rotate right",
                keybinds.rotate_right, keybinds.rotate_right_alt
            ));
            ui.label(format!("{:?}: Skip level (debug)", keybinds.debug_advance));
            ui.label(format!("{:?}: Toggle collisions (debug)", keybinds.debug_collision));
            ui.label(format!("{:?}: Toggle help", keybinds.help));
            ui.label(format!("{:?}: Quit", keybinds.quit));
        });
    }
}

fn outcome_banner(
    mut contexts: EguiContexts,
    resolver: Res<OutcomeResolver>,
    clock: Res<GameClock>,
) {
    let text = match resolver.phase() {
        Phase::Resolving(Outcome::Success) => "Landed!",
        Phase::Resolving(Outcome::Crash) => "Crashed!",
        Phase::Flying | Phase::Transitioned => return,
    };
    egui::Area::new(egui::Id::new("outcome_banner"))
        .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 80.0))
        .show(contexts.ctx_mut(), |ui| {
            ui.heading(text);
            if let Some(left) = resolver
                .pending_transition()
                .and_then(|handle| clock.remaining(handle))
            {
                ui.label(format!("Next attempt in {:.1}s", left.as_secs_f32()));
            }
        });
}
