//! Window manager vocabulary
//!
//! Atoms, window type classification and ICCCM hints shared by the
//! property cache and the animation code.

pub mod atoms;
pub mod hints;
pub mod window_type;

pub use atoms::Atoms;
pub use window_type::WindowType;
