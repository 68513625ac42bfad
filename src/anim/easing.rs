//! Easing curves

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    OutExpo,
    InOutExpo,
}

impl Easing {
    /// Map `t` in [0, 1] onto the curve
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::InQuad => t * t,
            Easing::OutQuad => -t * (t - 2.0),
            Easing::OutExpo => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Easing::InOutExpo => {
                if t <= 0.0 || t >= 1.0 {
                    t
                } else if t < 0.5 {
                    2f64.powf(20.0 * t - 10.0) / 2.0
                } else {
                    (2.0 - 2f64.powf(-20.0 * t + 10.0)) / 2.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 5] = [
        Easing::Linear,
        Easing::InQuad,
        Easing::OutQuad,
        Easing::OutExpo,
        Easing::InOutExpo,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-3, "{:?}", easing);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9, "{:?}", easing);
        }
    }

    #[test]
    fn test_monotonic() {
        for easing in ALL {
            let mut last = easing.apply(0.0);
            for i in 1..=100 {
                let value = easing.apply(i as f64 / 100.0);
                assert!(value >= last, "{:?} drops at {}", easing, i);
                last = value;
            }
        }
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Easing::InQuad.apply(0.5), 0.25);
        assert_eq!(Easing::OutQuad.apply(0.5), 0.75);
        assert!((Easing::InOutExpo.apply(0.5) - 0.5).abs() < 1e-9);
        assert!(Easing::OutExpo.apply(0.5) > 0.9);
        assert_eq!(Easing::Linear.apply(2.0), 1.0);
    }
}
