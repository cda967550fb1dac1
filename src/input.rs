use bevy::input::gamepad::{GamepadConnection, GamepadConnectionEvent, Gamepads};
use bevy::input::InputSystem;
use bevy::prelude::*;

/// Stick deflection below this is treated as centred.
const STICK_DEAD_ZONE: f32 = 0.15;

#[derive(Resource)]
pub struct Keybinds {
    pub thrust: KeyCode,
    pub thrust_alt: KeyCode,
    pub rotate_left: KeyCode,
    pub rotate_left_alt: KeyCode,
    pub rotate_right: KeyCode,
    pub rotate_right_alt: KeyCode,
    pub debug_advance: KeyCode,
    pub debug_collision: KeyCode,
    pub help: KeyCode,
    pub quit: KeyCode,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            thrust: KeyCode::Space,
            thrust_alt: KeyCode::KeyW,
            rotate_left: KeyCode::KeyA,
            rotate_left_alt: KeyCode::ArrowLeft,
            rotate_right: KeyCode::KeyD,
            rotate_right_alt: KeyCode::ArrowRight,
            debug_advance: KeyCode::KeyL,
            debug_collision: KeyCode::KeyC,
            help: KeyCode::KeyH,
            quit: KeyCode::Escape,
        }
    }
}

/// What the pilot is asking for this tick.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSnapshot {
    pub thrust_pressed: bool,
    /// In [-1, 1]; negative turns left.
    pub rotation_axis: f32,
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugCommand {
    AdvanceLevel,
    ToggleCollidable,
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct InputSet;

/// The pad whose stick and south button fly the craft.
#[derive(Resource)]
struct PilotPad(Gamepad);

pub struct InputPlugin;
impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Keybinds>()
            .init_resource::<InputSnapshot>()
            .add_event::<DebugCommand>()
            // Sampled before the fixed loop so the flight tick sees this frame's input.
            .add_systems(PreUpdate, sample_input.after(InputSystem))
            .add_systems(
                Update,
                (track_pilot_pad, debug_keys, quit_key).in_set(InputSet),
            );
    }
}

/// Folds the digital keys and an optional stick reading into one axis value.
pub fn rotation_axis(left: bool, right: bool, stick: Option<f32>) -> f32 {
    let mut axis = 0.0;
    if left {
        axis -= 1.0;
    }
    if right {
        axis += 1.0;
    }
    if let Some(x) = stick.filter(|x| x.is_finite() && x.abs() >= STICK_DEAD_ZONE) {
        axis += x;
    }
    axis.clamp(-1.0, 1.0)
}

fn sample_input(
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
    pilot: Option<Res<PilotPad>>,
    axes: Res<Axis<GamepadAxis>>,
    buttons: Res<ButtonInput<GamepadButton>>,
    mut snapshot: ResMut<InputSnapshot>,
) {
    let mut thrust = keys.pressed(keybinds.thrust) || keys.pressed(keybinds.thrust_alt);
    let left = keys.pressed(keybinds.rotate_left) || keys.pressed(keybinds.rotate_left_alt);
    let right = keys.pressed(keybinds.rotate_right) || keys.pressed(keybinds.rotate_right_alt);

    let mut stick = None;
    if let Some(PilotPad(gamepad)) = pilot.as_deref() {
        let axis_lx = GamepadAxis {
            gamepad: *gamepad,
            axis_type: GamepadAxisType::LeftStickX,
        };
        stick = axes.get(axis_lx);

        let thrust_button = GamepadButton {
            gamepad: *gamepad,
            button_type: GamepadButtonType::South,
        };
        thrust |= buttons.pressed(thrust_button);
    }

    *snapshot = InputSnapshot {
        thrust_pressed: thrust,
        rotation_axis: rotation_axis(left, right, stick),
    };
}

fn debug_keys(
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
    mut ev_debug: EventWriter<DebugCommand>,
) {
    if keys.just_pressed(keybinds.debug_advance) {
        ev_debug.send(DebugCommand::AdvanceLevel);
    }
    if keys.just_pressed(keybinds.debug_collision) {
        ev_debug.send(DebugCommand::ToggleCollidable);
    }
}

fn quit_key(keys: Res<ButtonInput<KeyCode>>, keybinds: Res<Keybinds>, mut exit: EventWriter<AppExit>) {
    if keys.just_pressed(keybinds.quit) {
        info!("quit requested");
        exit.send(AppExit::Success);
    }
}

/// Which pad flies the craft after `ev`. The first pad to connect takes
/// the controls; if it is unplugged another connected pad takes over.
fn pilot_pad_after(
    current: Option<Gamepad>,
    ev: &GamepadConnectionEvent,
    connected: impl IntoIterator<Item = Gamepad>,
) -> Option<Gamepad> {
    match (&ev.connection, current) {
        (GamepadConnection::Connected(_), None) => Some(ev.gamepad),
        (GamepadConnection::Disconnected, Some(pad)) if pad == ev.gamepad => {
            connected.into_iter().find(|g| *g != ev.gamepad)
        }
        _ => current,
    }
}

fn track_pilot_pad(
    mut commands: Commands,
    pilot: Option<Res<PilotPad>>,
    gamepads: Res<Gamepads>,
    mut connections: EventReader<GamepadConnectionEvent>,
) {
    let before = pilot.map(|p| p.0);
    let mut current = before;
    for ev in connections.read() {
        current = pilot_pad_after(current, ev, gamepads.iter());
    }
    if current == before {
        return;
    }
    match current {
        Some(pad) => {
            info!("pilot gamepad is now {pad:?}");
            commands.insert_resource(PilotPad(pad));
        }
        None => {
            info!("pilot gamepad unplugged, keyboard only");
            commands.remove_resource::<PilotPad>();
        }
    }
}
