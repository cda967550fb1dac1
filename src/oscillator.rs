use bevy::prelude::*;
use bevy_rapier2d::prelude::PhysicsSet;

/// Slides a kinematic obstacle back and forth between `start` and
/// `start + offset`.
#[derive(Component, Debug)]
pub struct Oscillator {
    pub start: Vec2,
    pub offset: Vec2,
    /// Half-cycles per second.
    pub speed: f32,
    elapsed: f32,
}

impl Oscillator {
    pub fn new(start: Vec2, offset: Vec2, speed: f32) -> Self {
        Self {
            start,
            offset,
            speed,
            elapsed: 0.0,
        }
    }

    pub fn position(&self) -> Vec2 {
        let factor = ping_pong(self.elapsed * self.speed, 1.0);
        self.start.lerp(self.start + self.offset, factor)
    }
}

/// Bounces `t` between 0 and `length`.
pub fn ping_pong(t: f32, length: f32) -> f32 {
    if length <= 0.0 {
        return 0.0;
    }
    let t = t.rem_euclid(length * 2.0);
    length - (t - length).abs()
}

pub struct OscillatorPlugin;
impl Plugin for OscillatorPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, oscillate.before(PhysicsSet::SyncBackend));
    }
}

fn oscillate(time: Res<Time>, mut q: Query<(&mut Oscillator, &mut Transform)>) {
    let dt = time.delta_seconds();
    for (mut osc, mut t) in &mut q {
        osc.elapsed += dt;
        let z = t.translation.z;
        t.translation = osc.position().extend(z);
    }
}
