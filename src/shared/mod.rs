//! Geometry types shared by the property cache, the texture pipeline and
//! the animation code.

pub mod geometry;

pub use geometry::{Geometry, PointF, RectF, Region};
