//! Window geometry
//!
//! Integer rectangles come straight off the wire (GetGeometry, shape
//! rectangles, cardinal tuples). Float points and rectangles are what the
//! animation code interpolates.

/// Window geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a rectangle from four cardinals in `x, y, width, height` order
    pub fn from_cardinals(values: &[u32]) -> Option<Self> {
        match values {
            [x, y, w, h, ..] => Some(Self::new(*x as i32, *y as i32, *w, *h)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same size, moved to (0, 0)
    pub fn at_origin(&self) -> Self {
        Self::new(0, 0, self.width, self.height)
    }

    pub fn to_rectf(self) -> RectF {
        RectF::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// A point in scene coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Mul<f64> for PointF {
    type Output = PointF;

    fn mul(self, rhs: f64) -> PointF {
        PointF::new(self.x * rhs, self.y * rhs)
    }
}

/// A float rectangle, used for icon geometry and screen bounds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn top_left(&self) -> PointF {
        PointF::new(self.x, self.y)
    }

    pub fn top_right(&self) -> PointF {
        PointF::new(self.x + self.width, self.y)
    }

    pub fn bottom_left(&self) -> PointF {
        PointF::new(self.x, self.y + self.height)
    }

    pub fn center(&self) -> PointF {
        PointF::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A set of rectangles, as returned by a shape query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    rects: Vec<Geometry>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Geometry) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self { rects: vec![rect] }
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Geometry>) -> Self {
        Self {
            rects: rects.into_iter().filter(|r| !r.is_empty()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Geometry] {
        &self.rects
    }

    /// Smallest rectangle containing every member
    pub fn bounding_rect(&self) -> Geometry {
        let mut iter = self.rects.iter();
        let Some(first) = iter.next() else {
            return Geometry::default();
        };
        let (mut x1, mut y1) = (first.x, first.y);
        let (mut x2, mut y2) = (first.x + first.width as i32, first.y + first.height as i32);
        for r in iter {
            x1 = x1.min(r.x);
            y1 = y1.min(r.y);
            x2 = x2.max(r.x + r.width as i32);
            y2 = y2.max(r.y + r.height as i32);
        }
        Geometry::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinals_need_four_values() {
        assert_eq!(Geometry::from_cardinals(&[1, 2, 3]), None);
        assert_eq!(
            Geometry::from_cardinals(&[1, 2, 3, 4, 5]),
            Some(Geometry::new(1, 2, 3, 4))
        );
    }

    #[test]
    fn test_region_drops_empty_rects() {
        let region = Region::from_rects([Geometry::new(0, 0, 0, 10), Geometry::new(0, 0, 5, 5)]);
        assert_eq!(region.rects().len(), 1);
        assert!(Region::from_rect(Geometry::new(3, 3, 0, 0)).is_empty());
    }

    #[test]
    fn test_bounding_rect() {
        let region = Region::from_rects([Geometry::new(0, 0, 10, 10), Geometry::new(20, 5, 10, 20)]);
        assert_eq!(region.bounding_rect(), Geometry::new(0, 0, 30, 25));
        assert_eq!(Region::new().bounding_rect(), Geometry::default());
    }
}
