use bevy::audio::{Pitch, PitchBundle};
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use rand::Rng;
use std::time::Duration;

use crate::flight::{AudioFeedback, Booster, Clip};
use crate::outcome::Outcome;

#[derive(Resource)]
struct EmitterSpawnTimer(Timer);

/// A nozzle on the craft that sprays sparks while active.
#[derive(Component, Debug)]
pub struct Emitter {
    pub booster: Booster,
    pub active: bool,
    /// Local direction the sparks leave the nozzle.
    pub direction: Vec2,
}

impl Emitter {
    pub fn new(booster: Booster) -> Self {
        let direction = match booster {
            Booster::Main => Vec2::NEG_Y,
            Booster::Left => Vec2::new(-1.0, -0.3),
            Booster::Right => Vec2::new(1.0, -0.3),
        };
        Self {
            booster,
            active: false,
            direction: direction.normalize(),
        }
    }
}

#[derive(Component)]
pub struct Spark {
    pub vel: Vec2,
    pub lifespan: f32,
    pub max_lifespan: f32,
}

#[derive(Event, Clone, Copy, Debug)]
pub struct EffectBurst {
    pub center: Vec2,
    pub outcome: Outcome,
}

/// Tag for sounds started on behalf of the craft.
#[derive(Component)]
pub struct CraftSound;

#[derive(Resource, Default)]
pub struct SoundClips {
    engine: Handle<Pitch>,
    success: Handle<Pitch>,
    crash: Handle<Pitch>,
}

impl SoundClips {
    pub fn handle(&self, clip: Clip) -> Handle<Pitch> {
        match clip {
            Clip::Engine => self.engine.clone(),
            Clip::Success => self.success.clone(),
            Clip::Crash => self.crash.clone(),
        }
    }
}

/// Plays craft sounds. `is_playing` reports any craft sound still alive.
#[derive(SystemParam)]
pub struct SoundDeck<'w, 's> {
    commands: Commands<'w, 's>,
    clips: Res<'w, SoundClips>,
    playing: Query<'w, 's, Entity, With<CraftSound>>,
}

impl AudioFeedback for SoundDeck<'_, '_> {
    fn play_one_shot(&mut self, clip: Clip) {
        let source = self.clips.handle(clip);
        self.commands.spawn((
            PitchBundle {
                source,
                settings: PlaybackSettings::DESPAWN,
            },
            CraftSound,
        ));
    }

    fn stop(&mut self) {
        for e in &self.playing {
            self.commands.entity(e).despawn();
        }
    }

    fn is_playing(&self) -> bool {
        !self.playing.is_empty()
    }
}

pub struct EffectsPlugin;
impl Plugin for EffectsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(EmitterSpawnTimer(Timer::from_seconds(
            0.02,
            TimerMode::Repeating,
        )))
        .add_event::<EffectBurst>()
        .add_systems(Startup, load_sounds)
        .add_systems(Update, (spawn_booster_sparks, spawn_bursts, update_sparks));
    }
}

fn load_sounds(mut commands: Commands, mut pitches: ResMut<Assets<Pitch>>) {
    commands.insert_resource(SoundClips {
        engine: pitches.add(Pitch::new(82.0, Duration::from_millis(400))),
        success: pitches.add(Pitch::new(880.0, Duration::from_millis(900))),
        crash: pitches.add(Pitch::new(55.0, Duration::from_millis(1200))),
    });
}

/// Sprite alpha for a spark with `lifespan` of `max_lifespan` left.
pub fn spark_alpha(lifespan: f32, max_lifespan: f32) -> f32 {
    if max_lifespan <= 0.0 {
        return 0.0;
    }
    (lifespan / max_lifespan).clamp(0.0, 1.0)
}

fn spawn_booster_sparks(
    mut commands: Commands,
    time: Res<Time>,
    mut timer: ResMut<EmitterSpawnTimer>,
    emitters: Query<(&Emitter, &GlobalTransform)>,
) {
    timer.0.tick(time.delta());
    if !timer.0.just_finished() {
        return;
    }

    let mut rng = rand::thread_rng();
    for (emitter, global) in &emitters {
        if !emitter.active {
            continue;
        }
        let (_, rotation, translation) = global.to_scale_rotation_translation();
        let dir = (rotation * emitter.direction.extend(0.0)).truncate();
        let (speed, size, color) = match emitter.booster {
            Booster::Main => (260.0, 6.0, Color::srgb(2.0, 1.2, 0.3)),
            Booster::Left | Booster::Right => (160.0, 4.0, Color::srgb(1.2, 1.2, 2.0)),
        };
        for _ in 0..2 {
            let jitter = Vec2::new(rng.gen_range(-25.0..25.0), rng.gen_range(-25.0..25.0));
            let lifespan = rng.gen_range(0.15..0.35);
            commands.spawn((
                SpriteBundle {
                    sprite: Sprite {
                        color,
                        custom_size: Some(Vec2::splat(size)),
                        ..default()
                    },
                    transform: Transform::from_translation(translation.truncate().extend(0.5)),
                    ..default()
                },
                Spark {
                    vel: dir * speed + jitter,
                    lifespan,
                    max_lifespan: lifespan,
                },
            ));
        }
    }
}

fn spawn_bursts(mut ev: EventReader<EffectBurst>, mut commands: Commands) {
    let mut rng = rand::thread_rng();
    for burst in ev.read() {
        let (count, speed, color) = match burst.outcome {
            Outcome::Success => (80, 180.0, Color::srgb(0.4, 2.0, 0.6)),
            Outcome::Crash => (140, 320.0, Color::srgb(2.5, 0.7, 0.2)),
        };
        for _ in 0..count {
            let ang = rng.gen::<f32>() * std::f32::consts::TAU;
            let vel = Vec2::from_angle(ang) * speed * rng.gen_range(0.3..1.0);
            let lifespan = rng.gen_range(0.6..1.6);
            commands.spawn((
                SpriteBundle {
                    sprite: Sprite {
                        color,
                        custom_size: Some(Vec2::splat(rng.gen_range(3.0..8.0))),
                        ..default()
                    },
                    transform: Transform::from_translation(burst.center.extend(0.6)),
                    ..default()
                },
                Spark {
                    vel,
                    lifespan,
                    max_lifespan: lifespan,
                },
            ));
        }
    }
}

fn update_sparks(
    mut commands: Commands,
    time: Res<Time>,
    mut spark_q: Query<(Entity, &mut Spark, &mut Transform, &mut Sprite)>,
) {
    let dt = time.delta_seconds();
    for (e, mut spark, mut t, mut sprite) in &mut spark_q {
        spark.lifespan -= dt;
        if spark.lifespan <= 0.0 {
            commands.entity(e).despawn();
        } else {
            t.translation += (spark.vel * dt).extend(0.0);
            sprite
                .color
                .set_alpha(spark_alpha(spark.lifespan, spark.max_lifespan));
        }
    }
}
