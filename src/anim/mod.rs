//! Window transition animations
//!
//! Every animated window gets at most one [`WindowAnimator`]. Animators
//! never own windows; they push values into an [`AnimationTarget`] (the
//! scene) by window id.

pub mod animator;
pub mod easing;
pub mod group;
pub mod interpolator;
pub mod variant;

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

pub use animator::WindowAnimator;
pub use group::{ActiveAnimations, Direction};
pub use variant::{Durations, TransitionContext, Variant};

use crate::config::AnimationConfig;
use crate::shared::{PointF, RectF};
use crate::wm::WindowType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationType {
    #[default]
    None,
    Showing,
    Closing,
    Iconify,
    Restore,
    CrossFade,
}

/// What a window became when its transition completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalState {
    Iconified,
    Restored,
    Closed,
}

/// The windows an animator moves around
pub trait AnimationTarget {
    /// Number of windows in the stacking order
    fn stacking_len(&self) -> usize;
    fn set_position(&mut self, window: u32, position: PointF);
    fn set_scale(&mut self, window: u32, scale: f64);
    fn set_opacity(&mut self, window: u32, opacity: f64);
    fn set_visible(&mut self, window: u32, visible: bool);
    /// Keep the window above the stacking order while it animates
    fn set_z_override(&mut self, window: u32, z: Option<i32>);
    /// Status bar crop effect
    fn set_crop(&mut self, window: u32, crop: Option<RectF>);
    fn finalize_state(&mut self, window: u32, kind: AnimationType) -> FinalState;
}

/// Animation facts the texture updater needs when damage arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationStatus {
    /// The window's own animator is running
    pub transitioning: bool,
    /// The window's animator is paused and driven by hand
    pub manually_updated: bool,
    /// Some animation is running anywhere
    pub animating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// The previous animator was torn down
    Replaced,
    /// The window already has an animator of this variant
    Kept,
    Rejected,
}

/// All live animators, by window
pub struct Animators {
    animators: HashMap<u32, WindowAnimator>,
    active: ActiveAnimations,
    durations: Durations,
}

impl Animators {
    pub fn new(config: &AnimationConfig) -> Self {
        Self {
            animators: HashMap::new(),
            active: ActiveAnimations::default(),
            durations: Durations::from_config(config),
        }
    }

    /// Give `window` an animator of `variant`.
    ///
    /// Sheets only take the sheet variant, and a position animator is
    /// never replaced.
    pub fn assign(
        &mut self,
        window: u32,
        variant: Variant,
        window_type: WindowType,
        target: &mut dyn AnimationTarget,
    ) -> AssignOutcome {
        if window_type == WindowType::Sheet && variant != Variant::Sheet {
            return AssignOutcome::Rejected;
        }
        let mut outcome = AssignOutcome::Assigned;
        if let Some(existing) = self.animators.get_mut(&window) {
            if existing.variant() == variant {
                return AssignOutcome::Kept;
            }
            if !existing.variant().replaceable() {
                return AssignOutcome::Rejected;
            }
            existing.teardown(target);
            outcome = AssignOutcome::Replaced;
        }
        debug!("Window 0x{:x} animated with {:?}", window, variant);
        let animator = WindowAnimator::new(window, variant, self.durations, self.active.clone());
        self.animators.insert(window, animator);
        outcome
    }

    /// The window's animator, creating the one its type calls for
    pub fn ensure(
        &mut self,
        window: u32,
        window_type: WindowType,
        target: &mut dyn AnimationTarget,
    ) -> Option<&mut WindowAnimator> {
        if !self.animators.contains_key(&window) {
            let variant = match window_type {
                WindowType::Sheet => Variant::Sheet,
                _ => Variant::Default,
            };
            self.assign(window, variant, window_type, target);
        }
        self.animators.get_mut(&window)
    }

    pub fn get(&self, window: u32) -> Option<&WindowAnimator> {
        self.animators.get(&window)
    }

    pub fn get_mut(&mut self, window: u32) -> Option<&mut WindowAnimator> {
        self.animators.get_mut(&window)
    }

    pub fn remove(&mut self, window: u32, target: &mut dyn AnimationTarget) {
        if let Some(mut animator) = self.animators.remove(&window) {
            animator.teardown(target);
        }
    }

    /// Defer `kind` on the window and start it right away
    pub fn animate(
        &mut self,
        window: u32,
        window_type: WindowType,
        kind: AnimationType,
        ctx: &TransitionContext,
        target: &mut dyn AnimationTarget,
    ) -> bool {
        let Some(animator) = self.ensure(window, window_type, target) else {
            return false;
        };
        animator.defer_animation(kind);
        animator.start_transition(ctx, target)
    }

    /// Advance every running animator by `dt`
    pub fn tick(&mut self, dt: Duration, target: &mut dyn AnimationTarget) -> Vec<(u32, FinalState)> {
        let mut finished = Vec::new();
        for (window, animator) in self.animators.iter_mut() {
            if let Some(state) = animator.tick(dt, target) {
                finished.push((*window, state));
            }
        }
        finished
    }

    pub fn is_transitioning(&self, window: u32) -> bool {
        self.animators.get(&window).is_some_and(|animator| animator.is_running())
    }

    pub fn status(&self, window: u32) -> AnimationStatus {
        let animator = self.animators.get(&window);
        AnimationStatus {
            transitioning: animator.is_some_and(|a| a.is_running()),
            manually_updated: animator.is_some_and(|a| a.is_manually_updated()),
            animating: self.active.any(),
        }
    }

    pub fn has_active_animation(&self) -> bool {
        self.active.any()
    }

    pub fn active(&self) -> &ActiveAnimations {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.animators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animators.is_empty()
    }
}

#[cfg(test)]
pub mod fake {
    //! Scene double recording what animators set.

    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct FakeWindow {
        pub position: PointF,
        pub scale: f64,
        pub opacity: f64,
        pub visible: bool,
        pub z_override: Option<i32>,
        pub crop: Option<RectF>,
    }

    impl Default for FakeWindow {
        fn default() -> Self {
            Self {
                position: PointF::default(),
                scale: 1.0,
                opacity: 1.0,
                visible: false,
                z_override: None,
                crop: None,
            }
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeScene {
        pub windows: HashMap<u32, FakeWindow>,
        pub finalized: Vec<(u32, AnimationType)>,
    }

    impl FakeScene {
        pub fn with_windows(windows: &[u32]) -> Self {
            Self {
                windows: windows.iter().map(|w| (*w, FakeWindow::default())).collect(),
                finalized: Vec::new(),
            }
        }

        pub fn window(&self, window: u32) -> &FakeWindow {
            &self.windows[&window]
        }

        fn entry(&mut self, window: u32) -> &mut FakeWindow {
            self.windows.entry(window).or_default()
        }
    }

    impl AnimationTarget for FakeScene {
        fn stacking_len(&self) -> usize {
            self.windows.len()
        }

        fn set_position(&mut self, window: u32, position: PointF) {
            self.entry(window).position = position;
        }

        fn set_scale(&mut self, window: u32, scale: f64) {
            self.entry(window).scale = scale;
        }

        fn set_opacity(&mut self, window: u32, opacity: f64) {
            self.entry(window).opacity = opacity;
        }

        fn set_visible(&mut self, window: u32, visible: bool) {
            self.entry(window).visible = visible;
        }

        fn set_z_override(&mut self, window: u32, z: Option<i32>) {
            self.entry(window).z_override = z;
        }

        fn set_crop(&mut self, window: u32, crop: Option<RectF>) {
            self.entry(window).crop = crop;
        }

        fn finalize_state(&mut self, window: u32, kind: AnimationType) -> FinalState {
            self.finalized.push((window, kind));
            match kind {
                AnimationType::Iconify => {
                    self.entry(window).visible = false;
                    FinalState::Iconified
                }
                AnimationType::Closing => {
                    self.entry(window).visible = false;
                    FinalState::Closed
                }
                _ => {
                    self.entry(window).visible = true;
                    FinalState::Restored
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeScene;
    use super::*;

    const WIN: u32 = 0x100;

    fn ctx() -> TransitionContext {
        TransitionContext {
            geometry: RectF::new(0.0, 0.0, 100.0, 100.0),
            screen: RectF::new(0.0, 0.0, 480.0, 800.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_reassignment_keeps_one_live_animator() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN]);
        assert!(animators.animate(WIN, WindowType::Normal, AnimationType::Showing, &ctx(), &mut scene));
        assert_eq!(animators.active().count(), 1);

        let outcome = animators.assign(WIN, Variant::Chained, WindowType::Normal, &mut scene);
        assert_eq!(outcome, AssignOutcome::Replaced);
        assert_eq!(animators.len(), 1);
        assert_eq!(animators.active().count(), 0);
        assert_eq!(scene.window(WIN).z_override, None);
        assert_eq!(animators.get(WIN).map(|a| a.variant()), Some(Variant::Chained));
    }

    #[test]
    fn test_sheet_windows_take_only_sheets() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN]);
        assert_eq!(
            animators.assign(WIN, Variant::Default, WindowType::Sheet, &mut scene),
            AssignOutcome::Rejected
        );
        assert_eq!(
            animators.ensure(WIN, WindowType::Sheet, &mut scene).map(|a| a.variant()),
            Some(Variant::Sheet)
        );
        assert_eq!(
            animators.assign(WIN, Variant::Sheet, WindowType::Sheet, &mut scene),
            AssignOutcome::Kept
        );
    }

    #[test]
    fn test_position_animator_is_not_replaced() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN]);
        animators.assign(WIN, Variant::Position, WindowType::Normal, &mut scene);
        assert_eq!(
            animators.assign(WIN, Variant::Default, WindowType::Normal, &mut scene),
            AssignOutcome::Rejected
        );
    }

    #[test]
    fn test_ensure_returns_existing_animator() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN]);
        animators.assign(WIN, Variant::Position, WindowType::Normal, &mut scene);
        assert_eq!(
            animators.ensure(WIN, WindowType::Normal, &mut scene).map(|a| a.variant()),
            Some(Variant::Position)
        );
        assert_eq!(animators.len(), 1);
    }

    #[test]
    fn test_status_reports_window_and_global_activity() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN, 0x200]);
        assert_eq!(animators.status(WIN), AnimationStatus::default());

        animators.animate(WIN, WindowType::Normal, AnimationType::Showing, &ctx(), &mut scene);
        let status = animators.status(WIN);
        assert!(status.transitioning && status.animating && !status.manually_updated);
        let other = animators.status(0x200);
        assert!(!other.transitioning && other.animating);
    }

    #[test]
    fn test_tick_reports_finished_windows() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN, 0x200]);
        animators.animate(WIN, WindowType::Normal, AnimationType::Showing, &ctx(), &mut scene);
        animators.animate(0x200, WindowType::Normal, AnimationType::Closing, &ctx(), &mut scene);
        assert!(animators.is_transitioning(WIN));
        assert!(animators.has_active_animation());

        let mut finished = animators.tick(Duration::from_millis(300), &mut scene);
        finished.sort_by_key(|(window, _)| *window);
        assert_eq!(finished, vec![(WIN, FinalState::Restored), (0x200, FinalState::Closed)]);
        assert!(!animators.has_active_animation());
        assert!(!animators.is_transitioning(WIN));
    }

    #[test]
    fn test_remove_tears_down() {
        let mut animators = Animators::new(&AnimationConfig::default());
        let mut scene = FakeScene::with_windows(&[WIN]);
        animators.animate(WIN, WindowType::Normal, AnimationType::Showing, &ctx(), &mut scene);
        animators.remove(WIN, &mut scene);
        assert!(animators.is_empty());
        assert!(!animators.has_active_animation());
    }
}
