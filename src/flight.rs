//! Turns the pilot's per-tick input into thrust, turning and booster feedback.
//!
//! [`FlightController`] only talks to its collaborators through the
//! [`CraftBody`], [`AudioFeedback`] and [`BoosterFeedback`] traits, so the
//! same logic drives the Rapier body in game and plain recorders in tests.

use bevy::prelude::*;
use bevy_rapier2d::prelude::*;

use crate::effects::{Emitter, SoundDeck};
use crate::error::{exit_on_config_error, ConfigError};
use crate::input::InputSnapshot;

/// Rapier works in pixels; flight tuning is in metres.
pub const PIXELS_PER_METER: f32 = 100.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Booster {
    Main,
    Left,
    Right,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Clip {
    Engine,
    Success,
    Crash,
}

/// The physics side of the craft.
pub trait CraftBody {
    /// Force in the craft's own frame, +Y is "up" out of the main nozzle.
    fn apply_local_force(&mut self, force: Vec2);
    /// Instantaneous orientation override about the screen axis. This
    /// ignores angular momentum entirely; positive is counter-clockwise.
    fn apply_orientation_delta(&mut self, degrees: f32);
    fn set_rotation_frozen(&mut self, frozen: bool);
}

pub trait AudioFeedback {
    fn play_one_shot(&mut self, clip: Clip);
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
}

pub trait BoosterFeedback {
    fn is_active(&self, booster: Booster) -> bool;
    fn play(&mut self, booster: Booster);
    fn stop(&mut self, booster: Booster);
}

#[derive(Resource, Clone, Debug, PartialEq)]
pub struct FlightSettings {
    /// Main engine force, applied per second of simulated time.
    pub thrust_force: f32,
    /// Turn rate in degrees per second.
    pub rotation_force: f32,
}

impl Default for FlightSettings {
    fn default() -> Self {
        Self {
            thrust_force: 1000.0,
            rotation_force: 250.0,
        }
    }
}

#[derive(Component, Clone, Debug)]
pub struct FlightController {
    settings: FlightSettings,
    enabled: bool,
}

impl FlightController {
    pub fn new(settings: FlightSettings) -> Self {
        Self {
            settings,
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// One fixed physics step. Does nothing while disabled.
    pub fn tick(
        &mut self,
        input: &InputSnapshot,
        dt: f32,
        body: &mut impl CraftBody,
        audio: &mut impl AudioFeedback,
        boosters: &mut impl BoosterFeedback,
    ) {
        if !self.enabled {
            return;
        }
        self.process_thrust(input.thrust_pressed, dt, body, audio, boosters);
        self.process_rotation(input.rotation_axis, dt, body, boosters);
    }

    fn process_thrust(
        &self,
        pressed: bool,
        dt: f32,
        body: &mut impl CraftBody,
        audio: &mut impl AudioFeedback,
        boosters: &mut impl BoosterFeedback,
    ) {
        if pressed {
            body.apply_local_force(Vec2::Y * self.settings.thrust_force * dt);
            if !audio.is_playing() {
                audio.play_one_shot(Clip::Engine);
            }
            ignite(boosters, Booster::Main);
        } else {
            audio.stop();
            boosters.stop(Booster::Main);
        }
    }

    // NaN fails both comparisons and lands in the idle branch.
    fn process_rotation(
        &self,
        axis: f32,
        dt: f32,
        body: &mut impl CraftBody,
        boosters: &mut impl BoosterFeedback,
    ) {
        if axis < 0.0 {
            self.apply_rotation(self.settings.rotation_force, dt, body);
            boosters.stop(Booster::Left);
            ignite(boosters, Booster::Right);
        } else if axis > 0.0 {
            self.apply_rotation(-self.settings.rotation_force, dt, body);
            boosters.stop(Booster::Right);
            ignite(boosters, Booster::Left);
        } else {
            boosters.stop(Booster::Left);
            boosters.stop(Booster::Right);
        }
    }

    fn apply_rotation(&self, force: f32, dt: f32, body: &mut impl CraftBody) {
        body.set_rotation_frozen(true);
        body.apply_orientation_delta(force * dt);
        body.set_rotation_frozen(false);
    }
}

fn ignite(boosters: &mut impl BoosterFeedback, booster: Booster) {
    if !boosters.is_active(booster) {
        boosters.play(booster);
    }
}

/// Marks the player's craft.
#[derive(Component)]
pub struct Craft;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct FlightSet;

/// The Rapier rigid body behind [`CraftBody`].
pub struct RapierCraft<'a> {
    pub transform: Mut<'a, Transform>,
    pub force: Mut<'a, ExternalForce>,
    pub velocity: Mut<'a, Velocity>,
    pub locked: Mut<'a, LockedAxes>,
}

impl CraftBody for RapierCraft<'_> {
    fn apply_local_force(&mut self, force: Vec2) {
        let world = (self.transform.rotation * force.extend(0.0)).truncate();
        self.force.force += world * PIXELS_PER_METER;
    }

    fn apply_orientation_delta(&mut self, degrees: f32) {
        self.transform.rotate_z(degrees.to_radians());
    }

    fn set_rotation_frozen(&mut self, frozen: bool) {
        if frozen {
            self.locked.insert(LockedAxes::ROTATION_LOCKED);
            self.velocity.angvel = 0.0;
        } else {
            self.locked.remove(LockedAxes::ROTATION_LOCKED);
        }
    }
}

/// Booster nozzles on the craft, addressed by [`Booster`].
pub struct Nozzles<'a, 'w, 's> {
    emitters: &'a mut Query<'w, 's, &'static mut Emitter>,
}

impl BoosterFeedback for Nozzles<'_, '_, '_> {
    fn is_active(&self, booster: Booster) -> bool {
        self.emitters
            .iter()
            .any(|e| e.booster == booster && e.active)
    }

    fn play(&mut self, booster: Booster) {
        for mut e in self.emitters.iter_mut().filter(|e| e.booster == booster) {
            e.active = true;
        }
    }

    fn stop(&mut self, booster: Booster) {
        for mut e in self.emitters.iter_mut().filter(|e| e.booster == booster) {
            if e.active {
                e.active = false;
            }
        }
    }
}

pub struct FlightPlugin;
impl Plugin for FlightPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FlightSettings>()
            .add_systems(
                FixedUpdate,
                fly_craft
                    .in_set(FlightSet)
                    .before(PhysicsSet::SyncBackend),
            )
            .add_systems(PostStartup, check_craft.pipe(exit_on_config_error));
    }
}

fn fly_craft(
    time: Res<Time>,
    input: Res<InputSnapshot>,
    mut crafts: Query<
        (
            &mut FlightController,
            &mut Transform,
            &mut ExternalForce,
            &mut Velocity,
            &mut LockedAxes,
        ),
        With<Craft>,
    >,
    mut emitters: Query<&'static mut Emitter>,
    mut deck: SoundDeck,
) {
    let dt = time.delta_seconds();
    for (mut controller, transform, mut force, velocity, locked) in &mut crafts {
        // Forces are per step; a disabled craft must coast.
        force.force = Vec2::ZERO;
        force.torque = 0.0;

        let mut body = RapierCraft {
            transform,
            force,
            velocity,
            locked,
        };
        let mut nozzles = Nozzles {
            emitters: &mut emitters,
        };
        controller.tick(&input, dt, &mut body, &mut deck, &mut nozzles);
    }
}

fn check_craft(
    crafts: Query<
        (
            Has<ExternalForce>,
            Has<Velocity>,
            Has<LockedAxes>,
            Option<&Children>,
        ),
        (With<Craft>, With<FlightController>),
    >,
    emitters: Query<&Emitter>,
) -> Result<(), ConfigError> {
    let Ok((has_force, has_velocity, has_locks, children)) = crafts.get_single() else {
        return Err(ConfigError::MissingCraft);
    };
    if !has_force {
        return Err(ConfigError::MissingCraftPart("external force"));
    }
    if !has_velocity {
        return Err(ConfigError::MissingCraftPart("velocity"));
    }
    if !has_locks {
        return Err(ConfigError::MissingCraftPart("axis locks"));
    }
    for booster in [Booster::Main, Booster::Left, Booster::Right] {
        let fitted = children.is_some_and(|children| {
            children
                .iter()
                .filter_map(|child| emitters.get(*child).ok())
                .any(|e| e.booster == booster)
        });
        if !fitted {
            return Err(ConfigError::MissingCraftPart(match booster {
                Booster::Main => "main booster",
                Booster::Left => "left booster",
                Booster::Right => "right booster",
            }));
        }
    }
    debug!("craft collaborators verified");
    Ok(())
}
