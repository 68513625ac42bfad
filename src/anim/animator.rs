//! Per-window animation state machine

use std::time::Duration;

use tracing::{debug, trace};

use super::group::{ActiveAnimations, AnimationGroup, Direction, GroupState, Members};
use super::variant::{Durations, Plan, TransitionContext, Variant};
use super::{AnimationTarget, AnimationType, FinalState};

pub struct WindowAnimator {
    window: u32,
    variant: Variant,
    durations: Durations,
    pending: AnimationType,
    current: AnimationType,
    group: AnimationGroup,
    plan: Option<Plan>,
    /// Members taken out of the group by `set_enabled(false)`
    removed: Members,
    manually_updated: bool,
}

impl WindowAnimator {
    pub fn new(window: u32, variant: Variant, durations: Durations, active: ActiveAnimations) -> Self {
        Self {
            window,
            variant,
            durations,
            pending: AnimationType::None,
            current: AnimationType::None,
            group: AnimationGroup::new(active),
            plan: None,
            removed: Members::empty(),
            manually_updated: false,
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn pending(&self) -> AnimationType {
        self.pending
    }

    /// Transition currently animating, if any
    pub fn current(&self) -> AnimationType {
        self.current
    }

    pub fn direction(&self) -> Direction {
        self.group.direction()
    }

    pub fn is_running(&self) -> bool {
        self.group.is_running()
    }

    pub fn is_enabled(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn is_manually_updated(&self) -> bool {
        self.manually_updated
    }

    pub fn members(&self) -> Members {
        self.group.members()
    }

    pub fn second_window(&self) -> Option<u32> {
        self.plan.as_ref().and_then(|plan| plan.second.as_ref()).map(|second| second.window)
    }

    /// Queue `kind` for the next `start_transition`
    pub fn defer_animation(&mut self, kind: AnimationType) {
        self.pending = kind;
    }

    /// Run the pending transition. Returns false when there was nothing
    /// to run.
    pub fn start_transition(&mut self, ctx: &TransitionContext, target: &mut dyn AnimationTarget) -> bool {
        let kind = std::mem::replace(&mut self.pending, AnimationType::None);
        if kind == AnimationType::None {
            return false;
        }
        if !self.is_enabled() {
            trace!("Animator for 0x{:x} disabled, skipping {:?}", self.window, kind);
            return false;
        }
        match kind {
            AnimationType::CrossFade => self.crossfade(ctx, target),
            _ => self.run(kind, ctx, target),
        }
    }

    fn run(&mut self, kind: AnimationType, ctx: &TransitionContext, target: &mut dyn AnimationTarget) -> bool {
        let Some(plan) = self.variant.plan(kind, ctx, &self.durations) else {
            return false;
        };
        if self.group.is_running() {
            self.clear_effects(target);
        }
        if matches!(kind, AnimationType::Showing | AnimationType::Restore) {
            target.set_visible(self.window, true);
        }
        self.launch(kind, plan, target);
        true
    }

    fn crossfade(&mut self, ctx: &TransitionContext, target: &mut dyn AnimationTarget) -> bool {
        let Some(plan) = self.variant.plan(AnimationType::CrossFade, ctx, &self.durations) else {
            debug!("Crossfade of 0x{:x} without a second window", self.window);
            return false;
        };
        if self.group.is_running() {
            // jump the running transition to its end before fading
            let end = match self.group.direction() {
                Direction::Forward => self.group.duration(),
                Direction::Backward => Duration::ZERO,
            };
            self.group.set_current_time(end);
            self.apply(target);
            self.group.stop();
            self.clear_effects(target);
        }
        if let Some(second) = &plan.second {
            target.set_opacity(second.window, 0.0);
            target.set_visible(second.window, true);
        }
        self.launch(AnimationType::CrossFade, plan, target);
        true
    }

    fn launch(&mut self, kind: AnimationType, plan: Plan, target: &mut dyn AnimationTarget) {
        let top = target.stacking_len() as i32;
        target.set_z_override(self.window, Some(top + 1));
        if let Some(second) = &plan.second {
            target.set_z_override(second.window, Some(top + 2));
        }
        if let Some(crop) = plan.crop {
            target.set_crop(self.window, Some(crop));
            if let Some(second) = &plan.second {
                target.set_crop(second.window, Some(crop));
            }
        }
        self.group.set_members(plan.members);
        self.group.set_duration(plan.duration);
        self.group.set_direction(plan.direction);
        self.plan = Some(plan);
        self.current = kind;
        self.manually_updated = false;
        self.group.start();
        self.apply(target);
        debug!("Window 0x{:x}: {:?} {:?} started", self.window, kind, self.group.direction());
    }

    /// Push the current interpolated values to the windows
    fn apply(&self, target: &mut dyn AnimationTarget) {
        let Some(plan) = &self.plan else {
            return;
        };
        let at = self.group.current_time();
        let members = self.group.members();
        if members.contains(Members::POSITION) {
            target.set_position(self.window, plan.position.value_at(at));
        }
        if members.contains(Members::SCALE) {
            target.set_scale(self.window, plan.scale.value_at(at));
        }
        if members.contains(Members::OPACITY) {
            target.set_opacity(self.window, plan.opacity.value_at(at));
        }
        if let Some(second) = &plan.second {
            if let (true, Some(position)) = (members.contains(Members::SECOND_POSITION), &second.position) {
                target.set_position(second.window, position.value_at(at));
            }
            if let (true, Some(opacity)) = (members.contains(Members::CROSSFADE), &second.opacity) {
                target.set_opacity(second.window, opacity.value_at(at));
            }
        }
    }

    /// Advance by `dt`; returns the final state when the run completed
    pub fn tick(&mut self, dt: Duration, target: &mut dyn AnimationTarget) -> Option<FinalState> {
        if self.manually_updated || !self.group.is_running() {
            return None;
        }
        let finished = self.group.advance(dt);
        self.apply(target);
        finished.then(|| self.complete(target))
    }

    fn complete(&mut self, target: &mut dyn AnimationTarget) -> FinalState {
        self.clear_effects(target);
        let kind = std::mem::replace(&mut self.current, AnimationType::None);
        let state = target.finalize_state(self.window, kind);
        debug!("Window 0x{:x}: {:?} finished, {:?}", self.window, kind, state);
        state
    }

    fn clear_effects(&self, target: &mut dyn AnimationTarget) {
        target.set_z_override(self.window, None);
        let Some(plan) = &self.plan else {
            return;
        };
        if plan.crop.is_some() {
            target.set_crop(self.window, None);
        }
        if let Some(second) = &plan.second {
            target.set_z_override(second.window, None);
            if plan.crop.is_some() {
                target.set_crop(second.window, None);
            }
        }
    }

    /// Hold the animation; the caller drives it with `set_progress`
    pub fn pause(&mut self) {
        self.group.pause();
        self.manually_updated = true;
    }

    /// Move a paused animation to `progress` (0..=1 on the forward timeline)
    pub fn set_progress(&mut self, progress: f64, target: &mut dyn AnimationTarget) {
        let time = self.group.duration().mul_f64(progress.clamp(0.0, 1.0));
        self.group.set_current_time(time);
        self.apply(target);
    }

    /// Jump to the start and run backward, completing on the next tick
    pub fn finish(&mut self) {
        if self.group.state() == GroupState::Stopped {
            return;
        }
        self.group.set_direction(Direction::Backward);
        self.group.set_current_time(Duration::ZERO);
        self.manually_updated = false;
        self.group.resume();
    }

    /// Disabling stops the group and takes the interpolators out of it
    pub fn set_enabled(&mut self, enabled: bool, target: &mut dyn AnimationTarget) {
        if enabled {
            self.group.add(self.removed);
            self.removed = Members::empty();
        } else if self.is_enabled() {
            if self.group.is_running() {
                self.clear_effects(target);
            }
            self.group.stop();
            self.current = AnimationType::None;
            self.removed = self.group.members();
            self.group.set_members(Members::empty());
        }
    }

    /// Release everything this animator changed on its windows
    pub fn teardown(&mut self, target: &mut dyn AnimationTarget) {
        self.group.stop();
        self.set_enabled(true, target);
        self.clear_effects(target);
        if let Some(second) = self.plan.as_ref().and_then(|plan| plan.second.as_ref()) {
            if second.opacity.is_some() {
                target.set_opacity(second.window, 1.0);
            }
        }
        self.current = AnimationType::None;
        self.pending = AnimationType::None;
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::FakeScene;
    use super::*;
    use crate::shared::{PointF, RectF};

    const WIN: u32 = 0x100;

    fn animator(variant: Variant) -> (WindowAnimator, ActiveAnimations) {
        let active = ActiveAnimations::default();
        let animator = WindowAnimator::new(WIN, variant, Durations::default(), active.clone());
        (animator, active)
    }

    fn ctx() -> TransitionContext {
        TransitionContext {
            geometry: RectF::new(0.0, 40.0, 480.0, 400.0),
            icon_geometry: RectF::new(100.0, 100.0, 64.0, 64.0),
            screen: RectF::new(0.0, 0.0, 480.0, 800.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_pending_is_dispatched_and_cleared() {
        let (mut animator, active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN]);
        assert!(!animator.start_transition(&ctx(), &mut scene));

        animator.defer_animation(AnimationType::Showing);
        assert_eq!(animator.pending(), AnimationType::Showing);
        assert!(animator.start_transition(&ctx(), &mut scene));
        assert_eq!(animator.pending(), AnimationType::None);
        assert_eq!(animator.current(), AnimationType::Showing);
        assert!(animator.is_running());
        assert_eq!(active.count(), 1);
        assert!(scene.window(WIN).visible);
        assert_eq!(scene.window(WIN).scale, 0.2);
    }

    #[test]
    fn test_show_runs_to_completion() {
        let (mut animator, active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN]);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&ctx(), &mut scene);
        assert_eq!(scene.window(WIN).z_override, Some(2));

        assert_eq!(animator.tick(Duration::from_millis(150), &mut scene), None);
        assert_eq!(
            animator.tick(Duration::from_millis(150), &mut scene),
            Some(FinalState::Restored)
        );
        let state = scene.window(WIN);
        assert_eq!(state.position, PointF::new(0.0, 40.0));
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.opacity, 1.0);
        assert_eq!(state.z_override, None);
        assert_eq!(animator.current(), AnimationType::None);
        assert_eq!(active.count(), 0);
        assert_eq!(scene.finalized, vec![(WIN, AnimationType::Showing)]);
    }

    #[test]
    fn test_iconify_runs_backward_and_hides() {
        let (mut animator, _active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN]);
        animator.defer_animation(AnimationType::Iconify);
        animator.start_transition(&ctx(), &mut scene);
        assert_eq!(animator.direction(), Direction::Backward);
        assert_eq!(scene.window(WIN).scale, 1.0);

        let state = animator.tick(Duration::from_millis(300), &mut scene);
        assert_eq!(state, Some(FinalState::Iconified));
        assert_eq!(scene.window(WIN).position, PointF::new(100.0, 100.0));
        assert!(!scene.window(WIN).visible);
    }

    #[test]
    fn test_crossfade_stops_running_group_at_end() {
        let (mut animator, active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN, 0x200]);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&ctx(), &mut scene);
        animator.tick(Duration::from_millis(10), &mut scene);

        let mut fade = ctx();
        fade.crossfade_window = Some(0x200);
        animator.defer_animation(AnimationType::CrossFade);
        assert!(animator.start_transition(&fade, &mut scene));
        assert_eq!(scene.window(WIN).scale, 1.0);
        assert_eq!(scene.window(0x200).opacity, 0.0);
        assert!(scene.window(0x200).visible);
        assert_eq!(scene.window(0x200).z_override, Some(4));
        assert_eq!(active.count(), 1);

        animator.tick(Duration::from_millis(125), &mut scene);
        assert_eq!(scene.window(0x200).opacity, 0.5);
        animator.tick(Duration::from_millis(125), &mut scene);
        assert_eq!(scene.window(0x200).opacity, 1.0);
        assert_eq!(scene.window(0x200).z_override, None);
    }

    #[test]
    fn test_teardown_restores_crossfade_opacity() {
        let (mut animator, active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN, 0x200]);
        let mut fade = ctx();
        fade.crossfade_window = Some(0x200);
        animator.defer_animation(AnimationType::CrossFade);
        animator.start_transition(&fade, &mut scene);
        animator.tick(Duration::from_millis(50), &mut scene);

        animator.teardown(&mut scene);
        assert_eq!(scene.window(0x200).opacity, 1.0);
        assert_eq!(active.count(), 0);
    }

    #[test]
    fn test_chained_crops_both_windows_until_done() {
        let (mut animator, _active) = animator(Variant::Chained);
        let mut scene = FakeScene::with_windows(&[WIN, 0x300]);
        let mut chained = ctx();
        chained.invoker = Some(0x300);
        chained.status_bar = RectF::new(0.0, 0.0, 480.0, 36.0);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&chained, &mut scene);
        assert_eq!(animator.second_window(), Some(0x300));
        assert!(scene.window(WIN).crop.is_some());
        assert!(scene.window(0x300).crop.is_some());

        animator.tick(Duration::from_millis(500), &mut scene);
        assert_eq!(scene.window(WIN).crop, None);
        assert_eq!(scene.window(0x300).crop, None);
        assert_eq!(scene.window(0x300).position, PointF::new(-480.0, 0.0));
    }

    #[test]
    fn test_pause_and_manual_progress() {
        let (mut animator, active) = animator(Variant::Position);
        let mut scene = FakeScene::with_windows(&[WIN]);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&ctx(), &mut scene);
        animator.pause();
        assert!(animator.is_manually_updated());
        assert_eq!(active.count(), 0);
        assert_eq!(animator.tick(Duration::from_millis(300), &mut scene), None);

        animator.set_progress(1.0, &mut scene);
        assert_eq!(scene.window(WIN).position, PointF::new(0.0, 40.0));
        // position only
        assert_eq!(scene.window(WIN).scale, 1.0);
    }

    #[test]
    fn test_finish_completes_on_next_tick() {
        let (mut animator, _active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN]);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&ctx(), &mut scene);
        animator.finish();
        assert_eq!(animator.direction(), Direction::Backward);
        assert!(animator.tick(Duration::from_millis(1), &mut scene).is_some());
        assert!(!animator.is_running());
    }

    #[test]
    fn test_disabled_animator_skips_and_restores() {
        let (mut animator, active) = animator(Variant::Default);
        let mut scene = FakeScene::with_windows(&[WIN]);
        animator.defer_animation(AnimationType::Showing);
        animator.start_transition(&ctx(), &mut scene);
        animator.set_enabled(false, &mut scene);
        assert!(!animator.is_running());
        assert_eq!(active.count(), 0);
        assert!(animator.members().is_empty());

        animator.defer_animation(AnimationType::Closing);
        assert!(!animator.start_transition(&ctx(), &mut scene));

        animator.teardown(&mut scene);
        assert!(animator.is_enabled());
        assert_eq!(animator.members(), Members::POSITION | Members::SCALE | Members::OPACITY);
    }
}
