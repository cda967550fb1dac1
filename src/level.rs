use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier2d::prelude::*;

use crate::clock::GameClock;
use crate::effects::Emitter;
use crate::error::ConfigError;
use crate::flight::{Booster, Craft, FlightController, FlightSettings};
use crate::oscillator::Oscillator;
use crate::outcome::{OutcomeResolver, OutcomeSettings, SceneLoader, Surface, SurfaceTag};

/// Playable area inside the frame, in pixels.
pub const ARENA_SIZE: Vec2 = Vec2::new(1320.0, 760.0);

const CRAFT_SIZE: Vec2 = Vec2::new(28.0, 56.0);

/// Level after `current` out of `total`. Advancing past the last level wraps
/// to the first; not advancing replays `current`. With a single level both
/// cases reload it.
pub fn next_index(current: usize, total: usize, advancing: bool) -> usize {
    debug_assert!(total >= 1, "level count must be at least 1");
    if !advancing {
        return current;
    }
    let next = current + 1;
    if next >= total {
        0
    } else {
        next
    }
}

#[derive(Resource, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelProgress {
    current: usize,
    total: usize,
}

impl LevelProgress {
    pub fn new(current: usize, total: usize) -> Result<Self, ConfigError> {
        if total < 1 {
            return Err(ConfigError::NoLevels);
        }
        let mut progress = Self { current: 0, total };
        progress.set_current(current)?;
        Ok(progress)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), ConfigError> {
        if index >= self.total {
            return Err(ConfigError::LevelOutOfRange {
                index,
                total: self.total,
            });
        }
        self.current = index;
        Ok(())
    }
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadLevel(pub usize);

/// Asks for level loads; the loader applies them later in the frame.
#[derive(SystemParam)]
pub struct LevelRequests<'w> {
    progress: Res<'w, LevelProgress>,
    requests: EventWriter<'w, LoadLevel>,
}

impl SceneLoader for LevelRequests<'_> {
    fn load_level(&mut self, index: usize) {
        self.requests.send(LoadLevel(index));
    }

    fn current_level_index(&self) -> usize {
        self.progress.current()
    }

    fn level_count(&self) -> usize {
        self.progress.total()
    }
}

/// Everything torn down when a level unloads.
#[derive(Component)]
pub struct LevelEntity;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct LevelSet;

#[derive(Clone, Copy, Debug)]
pub struct Block {
    pub center: Vec2,
    pub size: Vec2,
    /// Scene tag name, see [`SurfaceTag::from_name`].
    pub tag: &'static str,
    /// Reported but not solid.
    pub sensor: bool,
}

impl Block {
    const fn solid(x: f32, y: f32, w: f32, h: f32, tag: &'static str) -> Self {
        Self {
            center: Vec2::new(x, y),
            size: Vec2::new(w, h),
            tag,
            sensor: false,
        }
    }

    const fn pickup(x: f32, y: f32) -> Self {
        Self {
            center: Vec2::new(x, y),
            size: Vec2::splat(24.0),
            tag: "Fuel",
            sensor: true,
        }
    }

    pub fn surface(&self) -> SurfaceTag {
        SurfaceTag::from_name(self.tag)
    }
}

/// An obstacle that swings between `center` and `center + offset`.
#[derive(Clone, Copy, Debug)]
pub struct Mover {
    pub center: Vec2,
    pub size: Vec2,
    pub offset: Vec2,
    pub speed: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct LevelLayout {
    pub name: &'static str,
    pub spawn: Vec2,
    pub blocks: &'static [Block],
    pub movers: &'static [Mover],
}

/// Ground, walls and ceiling shared by every level.
const FRAME: &[Block] = &[
    Block::solid(0.0, -350.0, 1320.0, 40.0, "Untagged"),
    Block::solid(0.0, 370.0, 1320.0, 20.0, "Untagged"),
    Block::solid(-650.0, 0.0, 20.0, 760.0, "Untagged"),
    Block::solid(650.0, 0.0, 20.0, 760.0, "Untagged"),
];

pub const LEVELS: &[LevelLayout] = &[
    LevelLayout {
        name: "First Hop",
        spawn: Vec2::new(-450.0, -270.0),
        blocks: &[
            Block::solid(-450.0, -315.0, 160.0, 30.0, "Friendly"),
            Block::solid(450.0, -315.0, 160.0, 30.0, "Finish"),
            Block::pickup(0.0, -120.0),
        ],
        movers: &[],
    },
    LevelLayout {
        name: "Over the Ridge",
        spawn: Vec2::new(-450.0, -270.0),
        blocks: &[
            Block::solid(-450.0, -315.0, 160.0, 30.0, "Friendly"),
            Block::solid(450.0, -315.0, 160.0, 30.0, "Finish"),
            Block::solid(0.0, -180.0, 120.0, 300.0, "Untagged"),
            Block::pickup(0.0, 80.0),
        ],
        movers: &[],
    },
    LevelLayout {
        name: "The Gate",
        spawn: Vec2::new(-450.0, -270.0),
        blocks: &[
            Block::solid(-450.0, -315.0, 160.0, 30.0, "Friendly"),
            Block::solid(470.0, -315.0, 140.0, 30.0, "Finish"),
            Block::solid(0.0, 230.0, 100.0, 260.0, "Untagged"),
            Block::solid(0.0, -250.0, 100.0, 160.0, "Untagged"),
            Block::pickup(-220.0, 60.0),
        ],
        movers: &[Mover {
            center: Vec2::new(0.0, -60.0),
            size: Vec2::new(100.0, 24.0),
            offset: Vec2::new(0.0, 140.0),
            speed: 0.4,
        }],
    },
];

pub struct LevelPlugin {
    progress: LevelProgress,
}

impl LevelPlugin {
    pub fn new(start: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            progress: LevelProgress::new(start, LEVELS.len())?,
        })
    }
}

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.progress)
            .add_event::<LoadLevel>()
            .add_systems(Startup, spawn_first_level)
            .add_systems(Update, load_requested_level.in_set(LevelSet));
    }
}

fn surface_color(tag: SurfaceTag) -> Color {
    match tag {
        SurfaceTag::Benign => Color::srgb(0.45, 0.5, 0.65),
        SurfaceTag::Fuel => Color::srgb(1.6, 1.4, 0.2),
        SurfaceTag::Finish => Color::srgb(0.3, 1.4, 0.5),
        SurfaceTag::Obstacle => Color::srgb(0.55, 0.35, 0.25),
    }
}

fn spawn_level(commands: &mut Commands, layout: &LevelLayout, flight: &FlightSettings) {
    for block in FRAME.iter().chain(layout.blocks) {
        let tag = block.surface();
        let mut entity = commands.spawn((
            LevelEntity,
            Surface(tag),
            SpriteBundle {
                sprite: Sprite {
                    color: surface_color(tag),
                    custom_size: Some(block.size),
                    ..default()
                },
                transform: Transform::from_translation(block.center.extend(0.0)),
                ..default()
            },
            RigidBody::Fixed,
            Collider::cuboid(block.size.x / 2.0, block.size.y / 2.0),
        ));
        if block.sensor {
            entity.insert(Sensor);
        }
    }

    for mover in layout.movers {
        commands.spawn((
            LevelEntity,
            Surface(SurfaceTag::Obstacle),
            SpriteBundle {
                sprite: Sprite {
                    color: surface_color(SurfaceTag::Obstacle),
                    custom_size: Some(mover.size),
                    ..default()
                },
                transform: Transform::from_translation(mover.center.extend(0.0)),
                ..default()
            },
            RigidBody::KinematicPositionBased,
            Collider::cuboid(mover.size.x / 2.0, mover.size.y / 2.0),
            Oscillator::new(mover.center, mover.offset, mover.speed),
        ));
    }

    spawn_craft(commands, layout.spawn, flight);
}

fn spawn_craft(commands: &mut Commands, at: Vec2, flight: &FlightSettings) {
    commands
        .spawn((
            Craft,
            LevelEntity,
            FlightController::new(flight.clone()),
            SpriteBundle {
                sprite: Sprite {
                    color: Color::srgb(0.9, 0.9, 1.0),
                    custom_size: Some(CRAFT_SIZE),
                    ..default()
                },
                transform: Transform::from_translation(at.extend(1.0)),
                ..default()
            },
            RigidBody::Dynamic,
            Collider::cuboid(CRAFT_SIZE.x / 2.0, CRAFT_SIZE.y / 2.0),
            ColliderMassProperties::Mass(1.0),
            ExternalForce::default(),
            Velocity::zero(),
            LockedAxes::empty(),
            Damping {
                linear_damping: 0.2,
                angular_damping: 1.0,
            },
            ActiveEvents::COLLISION_EVENTS,
        ))
        .with_children(|parent| {
            let nozzles = [
                (Booster::Main, Vec2::new(0.0, -CRAFT_SIZE.y / 2.0)),
                (Booster::Left, Vec2::new(-CRAFT_SIZE.x / 2.0, CRAFT_SIZE.y / 4.0)),
                (Booster::Right, Vec2::new(CRAFT_SIZE.x / 2.0, CRAFT_SIZE.y / 4.0)),
            ];
            for (booster, offset) in nozzles {
                parent.spawn((
                    Emitter::new(booster),
                    SpatialBundle::from_transform(Transform::from_translation(offset.extend(-0.1))),
                ));
            }
        });
}

fn spawn_first_level(mut commands: Commands, progress: Res<LevelProgress>, flight: Res<FlightSettings>) {
    let layout = &LEVELS[progress.current()];
    spawn_level(&mut commands, layout, &flight);
    info!("level {} ({}) ready", progress.current(), layout.name);
}

fn load_requested_level(
    mut commands: Commands,
    mut requests: EventReader<LoadLevel>,
    mut progress: ResMut<LevelProgress>,
    level_q: Query<Entity, With<LevelEntity>>,
    mut resolver: ResMut<OutcomeResolver>,
    mut clock: ResMut<GameClock>,
    flight: Res<FlightSettings>,
    outcome: Res<OutcomeSettings>,
) {
    // Several requests in one frame (timer and debug key) collapse to the last.
    let Some(&LoadLevel(index)) = requests.read().last() else {
        return;
    };
    if let Err(err) = progress.set_current(index) {
        error!("refusing level load: {err}");
        return;
    }

    resolver.teardown(clock.as_mut());
    *resolver = OutcomeResolver::new(outcome.clone());

    for e in &level_q {
        commands.entity(e).despawn_recursive();
    }
    let layout = &LEVELS[index];
    spawn_level(&mut commands, layout, &flight);
    info!("level {index} ({}) loaded", layout.name);
}
