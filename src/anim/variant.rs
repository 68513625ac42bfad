//! Animation variants
//!
//! A variant turns a transition request into a [`Plan`]: which members of
//! the group animate, their endpoints and easing, and which way the group
//! runs. Closing and iconifying replay the showing endpoints backwards.

use std::time::Duration;

use super::easing::Easing;
use super::group::{Direction, Members};
use super::interpolator::Interpolator;
use super::AnimationType;
use crate::config::AnimationConfig;
use crate::shared::{PointF, RectF};

/// Where the window and its surroundings are when a transition starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionContext {
    /// Real geometry of the animated window
    pub geometry: RectF,
    pub icon_geometry: RectF,
    pub screen: RectF,
    pub orientation_angle: i32,
    pub status_bar: RectF,
    /// Window that invoked the animated one, for chained transitions
    pub invoker: Option<u32>,
    /// Window faded in by a crossfade
    pub crossfade_window: Option<u32>,
}

impl TransitionContext {
    pub fn is_portrait(&self) -> bool {
        self.orientation_angle % 180 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Durations {
    pub default: Duration,
    pub crossfade: Duration,
    pub sheet: Duration,
    pub chained: Duration,
}

impl Durations {
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self {
            default: config.default_duration(),
            crossfade: Duration::from_millis(config.crossfade_duration_ms),
            sheet: Duration::from_millis(config.sheet_duration_ms),
            chained: Duration::from_millis(config.chained_duration_ms),
        }
    }
}

impl Default for Durations {
    fn default() -> Self {
        Self::from_config(&AnimationConfig::default())
    }
}

/// Interpolators driving a window other than the animated one
#[derive(Debug, Clone, PartialEq)]
pub struct SecondTarget {
    pub window: u32,
    pub position: Option<Interpolator<PointF>>,
    pub opacity: Option<Interpolator<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub direction: Direction,
    pub duration: Duration,
    pub members: Members,
    pub position: Interpolator<PointF>,
    pub scale: Interpolator<f64>,
    pub opacity: Interpolator<f64>,
    pub second: Option<SecondTarget>,
    /// Status bar area cropped out of the window and its second target
    pub crop: Option<RectF>,
}

impl Plan {
    fn still(ctx: &TransitionContext, duration: Duration, members: Members) -> Self {
        let at = ctx.geometry.top_left();
        Self {
            direction: Direction::Forward,
            duration,
            members,
            position: Interpolator::new(at, at, duration, Easing::Linear),
            scale: Interpolator::new(1.0, 1.0, duration, Easing::Linear),
            opacity: Interpolator::new(1.0, 1.0, duration, Easing::Linear),
            second: None,
            crop: None,
        }
    }

    fn ease(mut self, easing: Easing, direction: Direction) -> Self {
        self.direction = direction;
        self.position.easing = easing;
        self.scale.easing = easing;
        self.opacity.easing = easing;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Zoom from the icon with a fade
    #[default]
    Default,
    /// Like `Default` but only the position moves
    Position,
    /// Slide in from the screen edge
    Sheet,
    /// Slide in while pushing the invoking window out
    Chained,
}

impl Variant {
    /// Whether another animator may take over the window
    pub fn replaceable(&self) -> bool {
        !matches!(self, Variant::Position)
    }

    /// `None` when the transition cannot run, e.g. a crossfade without a
    /// second window
    pub fn plan(&self, kind: AnimationType, ctx: &TransitionContext, durations: &Durations) -> Option<Plan> {
        if kind == AnimationType::CrossFade {
            return crossfade(ctx, durations);
        }
        let (easing, direction) = match kind {
            AnimationType::Showing | AnimationType::Restore => (Easing::OutQuad, Direction::Forward),
            AnimationType::Closing | AnimationType::Iconify => (Easing::InQuad, Direction::Backward),
            AnimationType::None | AnimationType::CrossFade => return None,
        };
        match self {
            Variant::Default => Some(zoom(ctx, durations.default).ease(easing, direction)),
            Variant::Position => {
                let mut plan = zoom(ctx, durations.default).ease(easing, direction);
                plan.members = Members::POSITION;
                Some(plan)
            }
            Variant::Sheet => Some(sheet(ctx, durations.sheet, direction)),
            Variant::Chained => Some(chained(ctx, durations.chained, direction)),
        }
    }
}

fn zoom(ctx: &TransitionContext, duration: Duration) -> Plan {
    let from = if ctx.icon_geometry.is_empty() {
        ctx.screen.center() * 0.8
    } else {
        ctx.icon_geometry.top_left()
    };
    let mut plan = Plan::still(ctx, duration, Members::POSITION | Members::SCALE | Members::OPACITY);
    plan.position.from = from;
    plan.scale.from = 0.2;
    plan.opacity.from = 0.1;
    plan
}

fn sheet(ctx: &TransitionContext, duration: Duration, direction: Direction) -> Plan {
    let from = if ctx.is_portrait() {
        ctx.screen.top_right()
    } else {
        ctx.screen.bottom_left()
    };
    let easing = match direction {
        Direction::Forward => Easing::OutExpo,
        Direction::Backward => Easing::InOutExpo,
    };
    let mut plan = Plan::still(ctx, duration, Members::POSITION);
    plan.position = Interpolator::new(from, PointF::default(), duration, easing);
    plan.direction = direction;
    plan
}

fn chained(ctx: &TransitionContext, duration: Duration, direction: Direction) -> Plan {
    let screen = ctx.screen;
    let (from, invoker_to) = if ctx.is_portrait() {
        (PointF::new(0.0, -screen.height), screen.bottom_left())
    } else {
        (screen.top_right(), PointF::new(-screen.width, 0.0))
    };
    let mut plan = Plan::still(ctx, duration, Members::POSITION);
    plan.position = Interpolator::new(from, PointF::default(), duration, Easing::InOutExpo);
    plan.direction = direction;
    if let Some(invoker) = ctx.invoker {
        plan.members |= Members::SECOND_POSITION;
        plan.second = Some(SecondTarget {
            window: invoker,
            position: Some(Interpolator::new(PointF::default(), invoker_to, duration, Easing::InOutExpo)),
            opacity: None,
        });
    }
    if !ctx.status_bar.is_empty() {
        plan.crop = Some(ctx.status_bar);
    }
    plan
}

fn crossfade(ctx: &TransitionContext, durations: &Durations) -> Option<Plan> {
    let window = ctx.crossfade_window?;
    let mut plan = Plan::still(ctx, durations.crossfade, Members::CROSSFADE);
    plan.second = Some(SecondTarget {
        window,
        position: None,
        opacity: Some(Interpolator::new(0.0, 1.0, durations.crossfade, Easing::Linear)),
    });
    Some(plan)
}
