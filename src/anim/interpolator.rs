//! Property interpolators

use std::time::Duration;

use super::easing::Easing;
use crate::shared::PointF;

pub trait Lerp: Copy + PartialEq + std::fmt::Debug {
    fn lerp(from: Self, to: Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(from: f64, to: f64, t: f64) -> f64 {
        from + (to - from) * t
    }
}

impl Lerp for PointF {
    fn lerp(from: PointF, to: PointF, t: f64) -> PointF {
        PointF::new(f64::lerp(from.x, to.x, t), f64::lerp(from.y, to.y, t))
    }
}

/// One animated value between two endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolator<T> {
    pub from: T,
    pub to: T,
    pub easing: Easing,
    pub duration: Duration,
}

impl<T: Lerp> Interpolator<T> {
    pub fn new(from: T, to: T, duration: Duration, easing: Easing) -> Self {
        Self { from, to, easing, duration }
    }

    /// Value at `elapsed` on the forward timeline
    pub fn value_at(&self, elapsed: Duration) -> T {
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        T::lerp(self.from, self.to, self.easing.apply(t))
    }

    pub fn start_value(&self) -> T {
        self.from
    }

    pub fn end_value(&self) -> T {
        self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_at() {
        let interp = Interpolator::new(0.0, 10.0, Duration::from_millis(100), Easing::Linear);
        assert_eq!(interp.value_at(Duration::ZERO), 0.0);
        assert_eq!(interp.value_at(Duration::from_millis(50)), 5.0);
        assert_eq!(interp.value_at(Duration::from_millis(500)), 10.0);
    }

    #[test]
    fn test_points() {
        let interp = Interpolator::new(
            PointF::new(0.0, 100.0),
            PointF::new(100.0, 0.0),
            Duration::from_millis(100),
            Easing::Linear,
        );
        assert_eq!(interp.value_at(Duration::from_millis(25)), PointF::new(25.0, 75.0));
    }

    #[test]
    fn test_zero_duration_jumps_to_end() {
        let interp = Interpolator::new(0.2, 1.0, Duration::ZERO, Easing::OutQuad);
        assert_eq!(interp.value_at(Duration::ZERO), 1.0);
    }
}
