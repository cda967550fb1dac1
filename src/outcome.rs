//! Contact classification and the locked outcome state machine.
//!
//! A level attempt starts [`Phase::Flying`]. The first terminal contact moves
//! it to [`Phase::Resolving`], which locks out every later contact, silences
//! the craft and schedules the level change on the game clock. When that
//! timer fires the attempt is [`Phase::Transitioned`] and a level load is
//! requested. Loading a level installs a fresh resolver.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier2d::prelude::*;
use std::time::Duration;

use crate::clock::{ClockSet, GameClock, Scheduler, TimerFired, TimerHandle};
use crate::effects::{EffectBurst, SoundDeck};
use crate::flight::{AudioFeedback, Clip, Craft, FlightController};
use crate::input::{DebugCommand, InputSet};
use crate::level::{next_index, LevelRequests, LevelSet};

/// What a surface is, as far as the pilot is concerned.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SurfaceTag {
    Benign,
    Fuel,
    Finish,
    #[default]
    Obstacle,
}

impl SurfaceTag {
    /// Parses a scene tag name. Unknown names are obstacles.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Friendly" => SurfaceTag::Benign,
            "Fuel" => SurfaceTag::Fuel,
            "Finish" => SurfaceTag::Finish,
            _ => SurfaceTag::Obstacle,
        }
    }

    pub fn classify(self) -> Option<Outcome> {
        match self {
            SurfaceTag::Benign | SurfaceTag::Fuel => None,
            SurfaceTag::Finish => Some(Outcome::Success),
            SurfaceTag::Obstacle => Some(Outcome::Crash),
        }
    }
}

/// Scenery classification. Colliders without one count as obstacles.
#[derive(Component, Clone, Copy, Debug)]
pub struct Surface(pub SurfaceTag);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    Success,
    Crash,
}

impl Outcome {
    pub fn advances(self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn cue(self) -> Clip {
        match self {
            Outcome::Success => Clip::Success,
            Outcome::Crash => Clip::Crash,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Phase {
    #[default]
    Flying,
    Resolving(Outcome),
    Transitioned,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutcomeEvent {
    Contact(SurfaceTag),
    TransitionDue,
}

/// Side effects of a transition, in the order they must run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Directive {
    DisableFlight,
    StopAudio,
    PlayCue(Outcome),
    PlayEffect(Outcome),
    ScheduleTransition,
    LoadLevel { advancing: bool },
}

pub fn transition(phase: Phase, collidable: bool, event: OutcomeEvent) -> (Phase, Vec<Directive>) {
    match (phase, event) {
        (Phase::Flying, OutcomeEvent::Contact(tag)) if collidable => match tag.classify() {
            Some(outcome) => (
                Phase::Resolving(outcome),
                vec![
                    Directive::DisableFlight,
                    Directive::StopAudio,
                    Directive::PlayCue(outcome),
                    Directive::PlayEffect(outcome),
                    Directive::ScheduleTransition,
                ],
            ),
            None => (phase, Vec::new()),
        },
        (Phase::Resolving(outcome), OutcomeEvent::TransitionDue) => (
            Phase::Transitioned,
            vec![Directive::LoadLevel {
                advancing: outcome.advances(),
            }],
        ),
        _ => (phase, Vec::new()),
    }
}

/// Whether the debug advance key is honoured once an outcome is locked in.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DebugAdvance {
    #[default]
    IgnoreLock,
    RespectLock,
}

#[derive(Resource, Clone, Debug, PartialEq)]
pub struct OutcomeSettings {
    pub transition_delay: Duration,
    pub debug_advance: DebugAdvance,
}

impl Default for OutcomeSettings {
    fn default() -> Self {
        Self {
            transition_delay: Duration::from_secs(2),
            debug_advance: DebugAdvance::default(),
        }
    }
}

/// Everything an outcome does to the craft and the player's senses.
pub trait OutcomeHost {
    fn disable_flight(&mut self);
    fn stop_audio(&mut self);
    fn play_cue(&mut self, outcome: Outcome);
    fn play_effect(&mut self, outcome: Outcome);
}

pub trait SceneLoader {
    fn load_level(&mut self, index: usize);
    fn current_level_index(&self) -> usize;
    fn level_count(&self) -> usize;
}

#[derive(Resource, Debug)]
pub struct OutcomeResolver {
    phase: Phase,
    collidable: bool,
    settings: OutcomeSettings,
    pending: Option<TimerHandle>,
}

impl FromWorld for OutcomeResolver {
    fn from_world(world: &mut World) -> Self {
        let settings = world.get_resource::<OutcomeSettings>().cloned().unwrap_or_default();
        Self::new(settings)
    }
}

impl OutcomeResolver {
    pub fn new(settings: OutcomeSettings) -> Self {
        Self {
            phase: Phase::Flying,
            collidable: true,
            settings,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_controllable(&self) -> bool {
        self.phase == Phase::Flying
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    pub fn pending_transition(&self) -> Option<TimerHandle> {
        self.pending
    }

    pub fn toggle_collidable(&mut self) -> bool {
        self.collidable = !self.collidable;
        self.collidable
    }

    fn step(&mut self, event: OutcomeEvent) -> Vec<Directive> {
        let (next, directives) = transition(self.phase, self.collidable, event);
        self.phase = next;
        directives
    }

    /// Handles one contact. The phase is switched before any side effect
    /// runs, so a second contact in the same tick is already locked out.
    pub fn on_contact(
        &mut self,
        tag: SurfaceTag,
        host: &mut impl OutcomeHost,
        scheduler: &mut impl Scheduler,
    ) -> Option<Outcome> {
        let directives = self.step(OutcomeEvent::Contact(tag));
        let mut entered = None;
        for directive in directives {
            match directive {
                Directive::DisableFlight => host.disable_flight(),
                Directive::StopAudio => host.stop_audio(),
                Directive::PlayCue(outcome) => {
                    entered = Some(outcome);
                    host.play_cue(outcome);
                }
                Directive::PlayEffect(outcome) => host.play_effect(outcome),
                Directive::ScheduleTransition => {
                    self.pending = Some(scheduler.schedule(self.settings.transition_delay));
                }
                // only produced by TransitionDue
                Directive::LoadLevel { .. } => {}
            }
        }
        entered
    }

    /// Handles a fired timer and returns the level it asked for. Timers this
    /// resolver does not own are ignored.
    pub fn on_timer(&mut self, handle: TimerHandle, scene: &mut impl SceneLoader) -> Option<usize> {
        if self.pending != Some(handle) {
            return None;
        }
        self.pending = None;
        let mut target = None;
        for directive in self.step(OutcomeEvent::TransitionDue) {
            if let Directive::LoadLevel { advancing } = directive {
                let index = next_index(scene.current_level_index(), scene.level_count(), advancing);
                scene.load_level(index);
                target = Some(index);
            }
        }
        target
    }

    /// Skips straight to the next level without touching the craft.
    pub fn debug_advance(&mut self, scene: &mut impl SceneLoader) -> Option<usize> {
        if self.settings.debug_advance == DebugAdvance::RespectLock && !self.is_controllable() {
            return None;
        }
        let index = next_index(scene.current_level_index(), scene.level_count(), true);
        scene.load_level(index);
        Some(index)
    }

    /// Drops a pending transition when the level goes away under it.
    pub fn teardown(&mut self, scheduler: &mut impl Scheduler) {
        if let Some(handle) = self.pending.take() {
            if scheduler.cancel(handle) {
                debug!("cancelled pending transition {handle:?}");
            }
        }
    }
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct OutcomeSet;

/// The craft, its sounds and the effect layer, seen from the resolver.
#[derive(SystemParam)]
pub struct CraftFeedback<'w, 's> {
    crafts: Query<'w, 's, (&'static mut FlightController, &'static Transform), With<Craft>>,
    deck: SoundDeck<'w, 's>,
    bursts: EventWriter<'w, EffectBurst>,
}

impl OutcomeHost for CraftFeedback<'_, '_> {
    fn disable_flight(&mut self) {
        for (mut controller, _) in &mut self.crafts {
            controller.set_enabled(false);
        }
    }

    fn stop_audio(&mut self) {
        self.deck.stop();
    }

    fn play_cue(&mut self, outcome: Outcome) {
        self.deck.play_one_shot(outcome.cue());
    }

    fn play_effect(&mut self, outcome: Outcome) {
        for (_, transform) in &self.crafts {
            self.bursts.send(EffectBurst {
                center: transform.translation.truncate(),
                outcome,
            });
        }
    }
}

pub struct OutcomePlugin;
impl Plugin for OutcomePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OutcomeSettings>()
            .init_resource::<OutcomeResolver>()
            .add_systems(
                FixedUpdate,
                resolve_contacts
                    .in_set(OutcomeSet)
                    .after(PhysicsSet::Writeback),
            )
            .add_systems(
                Update,
                (fire_transitions, apply_debug_commands)
                    .chain()
                    .in_set(OutcomeSet)
                    .after(ClockSet)
                    .after(InputSet)
                    .before(LevelSet),
            );
    }
}

fn resolve_contacts(
    mut contacts: EventReader<CollisionEvent>,
    crafts: Query<(), With<Craft>>,
    surfaces: Query<&Surface>,
    mut resolver: ResMut<OutcomeResolver>,
    mut feedback: CraftFeedback,
    mut clock: ResMut<GameClock>,
) {
    for contact in contacts.read() {
        let &CollisionEvent::Started(a, b, _) = contact else {
            continue;
        };
        let other = if crafts.contains(a) {
            b
        } else if crafts.contains(b) {
            a
        } else {
            continue;
        };
        let tag = surfaces.get(other).map(|s| s.0).unwrap_or_default();

        if !resolver.is_controllable() || !resolver.is_collidable() {
            continue;
        }
        match resolver.on_contact(tag, &mut feedback, clock.as_mut()) {
            Some(outcome) => info!("{outcome:?} on {tag:?} contact"),
            None => debug!("touched {tag:?} surface"),
        }
    }
}

fn fire_transitions(
    mut fired: EventReader<TimerFired>,
    mut resolver: ResMut<OutcomeResolver>,
    mut levels: LevelRequests,
) {
    for TimerFired(handle) in fired.read() {
        if let Some(index) = resolver.on_timer(*handle, &mut levels) {
            info!("transition due, loading level {index}");
        }
    }
}

fn apply_debug_commands(
    mut commands: EventReader<DebugCommand>,
    mut resolver: ResMut<OutcomeResolver>,
    mut levels: LevelRequests,
) {
    for command in commands.read() {
        match command {
            DebugCommand::ToggleCollidable => {
                let collidable = resolver.toggle_collidable();
                info!("debug: collisions {}", if collidable { "on" } else { "off" });
            }
            DebugCommand::AdvanceLevel => match resolver.debug_advance(&mut levels) {
                Some(index) => info!("debug: skipping to level {index}"),
                None => debug!("debug: advance ignored while an outcome is resolving"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SoundClips;
    use bevy_rapier2d::rapier::geometry::CollisionEventFlags;

    #[derive(Debug, PartialEq)]
    enum Call {
        Disable,
        Stop,
        Cue(Outcome),
        Effect(Outcome),
    }

    #[derive(Default)]
    struct Host(Vec<Call>);

    impl OutcomeHost for Host {
        fn disable_flight(&mut self) {
            self.0.push(Call::Disable);
        }
        fn stop_audio(&mut self) {
            self.0.push(Call::Stop);
        }
        fn play_cue(&mut self, outcome: Outcome) {
            self.0.push(Call::Cue(outcome));
        }
        fn play_effect(&mut self, outcome: Outcome) {
            self.0.push(Call::Effect(outcome));
        }
    }

    struct Scene {
        current: usize,
        total: usize,
        loaded: Vec<usize>,
    }

    impl Scene {
        fn new(current: usize, total: usize) -> Self {
            Self {
                current,
                total,
                loaded: Vec::new(),
            }
        }
    }

    impl SceneLoader for Scene {
        fn load_level(&mut self, index: usize) {
            self.loaded.push(index);
        }
        fn current_level_index(&self) -> usize {
            self.current
        }
        fn level_count(&self) -> usize {
            self.total
        }
    }

    fn resolver() -> OutcomeResolver {
        OutcomeResolver::new(OutcomeSettings::default())
    }

    #[test]
    fn finish_contact_resolves_to_success_in_order() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();

        assert_eq!(r.on_contact(SurfaceTag::Finish, &mut host, &mut clock), Some(Outcome::Success));
        assert_eq!(
            host.0,
            vec![
                Call::Disable,
                Call::Stop,
                Call::Cue(Outcome::Success),
                Call::Effect(Outcome::Success),
            ]
        );
        assert_eq!(r.phase(), Phase::Resolving(Outcome::Success));
        assert!(!r.is_controllable());
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn only_the_first_terminal_contact_counts() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();

        r.on_contact(SurfaceTag::Finish, &mut host, &mut clock);
        assert_eq!(r.on_contact(SurfaceTag::Obstacle, &mut host, &mut clock), None);

        assert_eq!(r.phase(), Phase::Resolving(Outcome::Success));
        assert_eq!(host.0.len(), 4);
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn benign_and_fuel_contacts_are_informational() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();

        for tag in [SurfaceTag::Benign, SurfaceTag::Fuel] {
            assert_eq!(r.on_contact(tag, &mut host, &mut clock), None);
        }

        assert!(r.is_controllable());
        assert!(host.0.is_empty());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn nothing_happens_while_collisions_are_off() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();

        assert!(!r.toggle_collidable());
        for tag in [SurfaceTag::Benign, SurfaceTag::Fuel, SurfaceTag::Finish, SurfaceTag::Obstacle] {
            assert_eq!(r.on_contact(tag, &mut host, &mut clock), None);
        }

        assert_eq!(r.phase(), Phase::Flying);
        assert!(host.0.is_empty());
        assert!(r.toggle_collidable());
    }

    #[test]
    fn untagged_contact_crashes() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();

        assert_eq!(SurfaceTag::default(), SurfaceTag::Obstacle);
        assert_eq!(
            r.on_contact(SurfaceTag::default(), &mut host, &mut clock),
            Some(Outcome::Crash)
        );
        assert_eq!(host.0[2], Call::Cue(Outcome::Crash));
    }

    #[test]
    fn scene_tag_names_map_to_surfaces() {
        assert_eq!(SurfaceTag::from_name("Friendly"), SurfaceTag::Benign);
        assert_eq!(SurfaceTag::from_name("Fuel"), SurfaceTag::Fuel);
        assert_eq!(SurfaceTag::from_name("Finish"), SurfaceTag::Finish);
        assert_eq!(SurfaceTag::from_name(""), SurfaceTag::Obstacle);
        assert_eq!(SurfaceTag::from_name("Rock"), SurfaceTag::Obstacle);
        assert_eq!(SurfaceTag::from_name("finish"), SurfaceTag::Obstacle);
    }

    #[test]
    fn transition_fires_once_after_the_delay() {
        let mut r = resolver();
        let mut host = Host::default();
        let mut clock = GameClock::default();
        let mut scene = Scene::new(2, 5);

        r.on_contact(SurfaceTag::Finish, &mut host, &mut clock);
        assert!(clock.advance(Duration::from_millis(1999)).is_empty());
        let fired = clock.advance(Duration::from_millis(1));
        assert_eq!(fired.len(), 1);

        assert_eq!(r.on_timer(fired[0], &mut scene), Some(3));
        assert_eq!(r.on_timer(fired[0], &mut scene), None);
        assert_eq!(scene.loaded, vec![3]);
        assert_eq!(r.phase(), Phase::Transitioned);
    }

    #[test]
    fn crash_reloads_the_same_level() {
        let mut r = resolver();
        let mut clock = GameClock::default();
        let mut scene = Scene::new(4, 5);

        r.on_contact(SurfaceTag::Obstacle, &mut Host::default(), &mut clock);
        let fired = clock.advance(Duration::from_secs(2));

        assert_eq!(r.on_timer(fired[0], &mut scene), Some(4));
    }

    #[test]
    fn success_on_last_level_wraps_to_first() {
        let mut r = resolver();
        let mut clock = GameClock::default();
        let mut scene = Scene::new(4, 5);

        r.on_contact(SurfaceTag::Finish, &mut Host::default(), &mut clock);
        let fired = clock.advance(Duration::from_secs(2));

        assert_eq!(r.on_timer(fired[0], &mut scene), Some(0));
    }

    #[test]
    fn foreign_timers_are_ignored() {
        let mut r = resolver();
        let mut clock = GameClock::default();
        let mut scene = Scene::new(0, 3);
        let stray = clock.schedule(Duration::from_secs(1));

        r.on_contact(SurfaceTag::Obstacle, &mut Host::default(), &mut clock);

        assert_eq!(r.on_timer(stray, &mut scene), None);
        assert!(scene.loaded.is_empty());
    }

    #[test]
    fn debug_advance_ignores_the_lock_by_default() {
        let mut r = resolver();
        let mut clock = GameClock::default();
        let mut scene = Scene::new(2, 3);

        r.on_contact(SurfaceTag::Obstacle, &mut Host::default(), &mut clock);

        assert_eq!(r.debug_advance(&mut scene), Some(0));
        assert_eq!(r.phase(), Phase::Resolving(Outcome::Crash));
    }

    #[test]
    fn debug_advance_can_respect_the_lock() {
        let mut r = OutcomeResolver::new(OutcomeSettings {
            debug_advance: DebugAdvance::RespectLock,
            ..default()
        });
        let mut clock = GameClock::default();
        let mut scene = Scene::new(0, 3);

        assert_eq!(r.debug_advance(&mut scene), Some(1));
        r.on_contact(SurfaceTag::Finish, &mut Host::default(), &mut clock);
        assert_eq!(r.debug_advance(&mut scene), None);
        assert_eq!(scene.loaded, vec![1]);
    }

    #[test]
    fn teardown_cancels_the_pending_transition() {
        let mut r = resolver();
        let mut clock = GameClock::default();

        r.on_contact(SurfaceTag::Finish, &mut Host::default(), &mut clock);
        r.teardown(&mut clock);

        assert_eq!(r.pending_transition(), None);
        assert!(clock.advance(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn transition_is_pure() {
        assert_eq!(
            transition(Phase::Transitioned, true, OutcomeEvent::Contact(SurfaceTag::Obstacle)),
            (Phase::Transitioned, vec![])
        );
        assert_eq!(
            transition(Phase::Flying, true, OutcomeEvent::TransitionDue),
            (Phase::Flying, vec![])
        );
        assert_eq!(
            transition(Phase::Resolving(Outcome::Crash), true, OutcomeEvent::TransitionDue),
            (Phase::Transitioned, vec![Directive::LoadLevel { advancing: false }])
        );
    }

    fn contact_app() -> (App, Entity) {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_event::<CollisionEvent>()
            .add_event::<EffectBurst>()
            .init_resource::<GameClock>()
            .init_resource::<SoundClips>()
            .insert_resource(OutcomeResolver::new(OutcomeSettings::default()))
            .add_systems(Update, resolve_contacts);
        let craft = app
            .world_mut()
            .spawn((
                Craft,
                FlightController::new(Default::default()),
                Transform::default(),
            ))
            .id();
        (app, craft)
    }

    fn touch(app: &mut App, a: Entity, b: Entity) {
        app.world_mut()
            .send_event(CollisionEvent::Started(a, b, CollisionEventFlags::empty()));
    }

    #[test]
    fn contact_system_locks_in_the_first_outcome_of_a_step() {
        let (mut app, craft) = contact_app();
        let finish = app.world_mut().spawn(Surface(SurfaceTag::Finish)).id();
        let rock = app.world_mut().spawn(Surface(SurfaceTag::Obstacle)).id();

        // craft on either side of the pair
        touch(&mut app, craft, finish);
        touch(&mut app, rock, craft);
        app.update();

        let world = app.world();
        assert_eq!(world.resource::<OutcomeResolver>().phase(), Phase::Resolving(Outcome::Success));
        assert_eq!(world.resource::<GameClock>().pending(), 1);
        assert!(!world.get::<FlightController>(craft).unwrap().is_enabled());
        let bursts = world.resource::<Events<EffectBurst>>();
        assert_eq!(bursts.len(), 1);
    }

    #[test]
    fn contact_system_crashes_on_untagged_colliders() {
        let (mut app, craft) = contact_app();
        let bare = app.world_mut().spawn_empty().id();

        touch(&mut app, bare, craft);
        app.update();

        assert_eq!(
            app.world().resource::<OutcomeResolver>().phase(),
            Phase::Resolving(Outcome::Crash)
        );
    }

    #[test]
    fn contact_system_ignores_pairs_without_the_craft() {
        let (mut app, craft) = contact_app();
        let a = app.world_mut().spawn(Surface(SurfaceTag::Obstacle)).id();
        let b = app.world_mut().spawn_empty().id();
        let pad = app.world_mut().spawn(Surface(SurfaceTag::Benign)).id();

        touch(&mut app, a, b);
        touch(&mut app, craft, pad);
        app.update();

        let world = app.world();
        assert_eq!(world.resource::<OutcomeResolver>().phase(), Phase::Flying);
        assert_eq!(world.resource::<GameClock>().pending(), 0);
        assert!(world.get::<FlightController>(craft).unwrap().is_enabled());
    }
}
