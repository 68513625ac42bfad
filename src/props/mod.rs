//! Asynchronous X property caching.
//!
//! Requests go out as soon as a window is seen; replies are collected when
//! someone reads the value or when the batch deadline of the window passes.

pub mod cache;
pub mod collector;
pub mod pict;
pub mod registry;
pub mod wire;
pub mod x11_wire;

pub use cache::{CacheHandles, CacheSeed, CacheSignal, DecoratorButtons, WindowPropertyCache};
pub use collector::CollectorKey;
pub use pict::PictFormats;
pub use registry::PropertyCaches;
pub use wire::{PropertyWire, SharedWire, WindowAttributes};
pub use x11_wire::X11Wire;
