//! Animation groups and the process-wide running count

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// Interpolators taking part in a group
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Members: u8 {
        const POSITION = 1 << 0;
        const SCALE = 1 << 1;
        const OPACITY = 1 << 2;
        /// Position of the second window (the invoker of a chained window)
        const SECOND_POSITION = 1 << 3;
        /// Opacity of the window faded in by a crossfade
        const CROSSFADE = 1 << 4;
    }
}

/// Number of running groups, shared by every animator
#[derive(Debug, Clone, Default)]
pub struct ActiveAnimations(Rc<Cell<usize>>);

impl ActiveAnimations {
    pub fn count(&self) -> usize {
        self.0.get()
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }

    fn inc(&self) {
        self.0.set(self.0.get() + 1);
    }

    fn dec(&self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Shared clock for a set of interpolators.
///
/// Time is kept on the forward timeline: a forward run goes from zero to
/// the duration, a backward run from the duration to zero.
#[derive(Debug)]
pub struct AnimationGroup {
    members: Members,
    direction: Direction,
    state: GroupState,
    current: Duration,
    duration: Duration,
    active: ActiveAnimations,
}

impl AnimationGroup {
    pub fn new(active: ActiveAnimations) -> Self {
        Self {
            members: Members::POSITION | Members::SCALE | Members::OPACITY,
            direction: Direction::Forward,
            state: GroupState::Stopped,
            current: Duration::ZERO,
            duration: Duration::ZERO,
            active,
        }
    }

    fn set_state(&mut self, state: GroupState) {
        let was_running = self.state == GroupState::Running;
        let running = state == GroupState::Running;
        if running && !was_running {
            self.active.inc();
        } else if was_running && !running {
            self.active.dec();
        }
        self.state = state;
    }

    pub fn members(&self) -> Members {
        self.members
    }

    pub fn add(&mut self, members: Members) {
        self.members.insert(members);
    }

    pub fn remove(&mut self, members: Members) {
        self.members.remove(members);
    }

    pub fn set_members(&mut self, members: Members) {
        self.members = members;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
        self.current = self.current.min(duration);
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GroupState::Running
    }

    /// Start from the beginning of the current direction
    pub fn start(&mut self) {
        self.current = match self.direction {
            Direction::Forward => Duration::ZERO,
            Direction::Backward => self.duration,
        };
        self.set_state(GroupState::Running);
    }

    pub fn stop(&mut self) {
        self.set_state(GroupState::Stopped);
    }

    pub fn pause(&mut self) {
        if self.state == GroupState::Running {
            self.set_state(GroupState::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.state == GroupState::Paused {
            self.set_state(GroupState::Running);
        }
    }

    pub fn current_time(&self) -> Duration {
        self.current
    }

    pub fn set_current_time(&mut self, time: Duration) {
        self.current = time.min(self.duration);
    }

    /// Move the clock; returns true when this step finished the run
    pub fn advance(&mut self, dt: Duration) -> bool {
        if self.state != GroupState::Running {
            return false;
        }
        let finished = match self.direction {
            Direction::Forward => {
                self.current = (self.current + dt).min(self.duration);
                self.current >= self.duration
            }
            Direction::Backward => {
                self.current = self.current.saturating_sub(dt);
                self.current.is_zero()
            }
        };
        if finished {
            self.stop();
        }
        finished
    }
}

impl Drop for AnimationGroup {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_run() {
        let active = ActiveAnimations::default();
        let mut group = AnimationGroup::new(active.clone());
        group.set_duration(Duration::from_millis(100));
        group.start();
        assert_eq!(active.count(), 1);
        assert!(!group.advance(Duration::from_millis(60)));
        assert!(group.advance(Duration::from_millis(60)));
        assert_eq!(group.current_time(), Duration::from_millis(100));
        assert!(!group.is_running());
        assert_eq!(active.count(), 0);
    }

    #[test]
    fn test_backward_run() {
        let mut group = AnimationGroup::new(ActiveAnimations::default());
        group.set_duration(Duration::from_millis(100));
        group.set_direction(Direction::Backward);
        group.start();
        assert_eq!(group.current_time(), Duration::from_millis(100));
        assert!(group.advance(Duration::from_millis(100)));
        assert_eq!(group.current_time(), Duration::ZERO);
    }

    #[test]
    fn test_pause_is_not_counted() {
        let active = ActiveAnimations::default();
        let mut group = AnimationGroup::new(active.clone());
        group.set_duration(Duration::from_millis(100));
        group.start();
        group.pause();
        assert_eq!(active.count(), 0);
        assert!(!group.advance(Duration::from_millis(200)));
        group.resume();
        assert_eq!(active.count(), 1);
    }

    #[test]
    fn test_drop_releases_count() {
        let active = ActiveAnimations::default();
        {
            let mut group = AnimationGroup::new(active.clone());
            group.start();
            group.start();
            assert_eq!(active.count(), 1);
        }
        assert_eq!(active.count(), 0);
    }

    #[test]
    fn test_members() {
        let mut group = AnimationGroup::new(ActiveAnimations::default());
        group.remove(Members::SCALE | Members::OPACITY);
        assert_eq!(group.members(), Members::POSITION);
        group.add(Members::CROSSFADE);
        assert!(group.members().contains(Members::CROSSFADE));
    }
}
