//! Game-time one-shot timers.
//!
//! Timers are measured against virtual game time, not the physics tick, and
//! are identified by handles so their owner can cancel them on teardown.

use bevy::prelude::*;
use bevy::time::Stopwatch;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerHandle;
    /// Returns false if the handle already fired or was never issued.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFired(pub TimerHandle);

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub struct ClockSet;

#[derive(Resource, Default, Debug)]
pub struct GameClock {
    elapsed: Stopwatch,
    next_id: u64,
    pending: Vec<(TimerHandle, Timer)>,
}

impl GameClock {
    pub fn now(&self) -> Duration {
        self.elapsed.elapsed()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Time left before `handle` fires, if it is still pending.
    pub fn remaining(&self, handle: TimerHandle) -> Option<Duration> {
        self.pending
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, timer)| timer.remaining())
    }

    /// Ticks every pending timer by `dt` and returns the ones that finished,
    /// earliest deadline first. A fired timer is forgotten.
    pub fn advance(&mut self, dt: Duration) -> Vec<TimerHandle> {
        self.elapsed.tick(dt);
        let mut fired = Vec::new();
        for (handle, timer) in &mut self.pending {
            let left = timer.remaining();
            if timer.tick(dt).just_finished() {
                // how long ago the deadline passed within this step
                fired.push((dt.saturating_sub(left), *handle));
            }
        }
        self.pending.retain(|(_, timer)| !timer.finished());
        fired.sort_by(|(late_a, a), (late_b, b)| late_b.cmp(late_a).then(a.cmp(b)));
        fired.into_iter().map(|(_, handle)| handle).collect()
    }
}

impl Scheduler for GameClock {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push((handle, Timer::new(delay, TimerMode::Once)));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(h, _)| *h != handle);
        before != self.pending.len()
    }
}

pub struct ClockPlugin;
impl Plugin for ClockPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GameClock>()
            .add_event::<TimerFired>()
            .add_systems(Update, advance_clock.in_set(ClockSet));
    }
}

fn advance_clock(time: Res<Time>, mut clock: ResMut<GameClock>, mut fired: EventWriter<TimerFired>) {
    for handle in clock.advance(time.delta()) {
        debug!("timer {handle:?} fired at {:?}", clock.now());
        fired.send(TimerFired(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_once_at_deadline() {
        let mut clock = GameClock::default();
        let handle = clock.schedule(Duration::from_secs(2));

        assert!(clock.advance(Duration::from_millis(1999)).is_empty());
        assert_eq!(clock.advance(Duration::from_millis(1)), vec![handle]);
        assert!(clock.advance(Duration::from_secs(10)).is_empty());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn fired_timers_come_out_in_deadline_order() {
        let mut clock = GameClock::default();
        let late = clock.schedule(Duration::from_secs(3));
        let early = clock.schedule(Duration::from_secs(1));

        assert_eq!(clock.advance(Duration::from_secs(5)), vec![early, late]);
    }

    #[test]
    fn remaining_counts_down() {
        let mut clock = GameClock::default();
        let handle = clock.schedule(Duration::from_secs(2));

        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.remaining(handle), Some(Duration::from_millis(1500)));
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.remaining(handle), None);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut clock = GameClock::default();
        let handle = clock.schedule(Duration::from_secs(2));

        assert!(clock.cancel(handle));
        assert!(!clock.cancel(handle));
        assert!(clock.advance(Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn deadlines_are_relative_to_schedule_time() {
        let mut clock = GameClock::default();
        clock.advance(Duration::from_secs(5));
        let handle = clock.schedule(Duration::from_secs(2));

        assert!(clock.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(clock.advance(Duration::from_secs(1)), vec![handle]);
        assert_eq!(clock.now(), Duration::from_secs(7));
    }

    #[test]
    fn same_step_deadlines_keep_their_order() {
        let mut clock = GameClock::default();
        let first = clock.schedule(Duration::from_millis(500));
        let second = clock.schedule(Duration::from_millis(500));
        let third = clock.schedule(Duration::from_millis(200));

        assert_eq!(clock.advance(Duration::from_secs(1)), vec![third, first, second]);
    }

    #[test]
    fn zero_delay_fires_on_the_next_advance() {
        let mut clock = GameClock::default();
        let handle = clock.schedule(Duration::ZERO);

        assert_eq!(clock.remaining(handle), Some(Duration::ZERO));
        assert_eq!(clock.advance(Duration::ZERO), vec![handle]);
    }
}
