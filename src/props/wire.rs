//! The request/reply seam between the property cache and the X server.
//!
//! Requests are fire-and-forget: each returns a [`Cookie`] that can later
//! be fetched or discarded. The cache never holds an x11rb cookie itself,
//! which keeps it testable against an in-memory wire.

use std::collections::HashMap;
use std::sync::Arc;

use x11rb::protocol::xproto::{Atom, Visualid, Window};

use crate::shared::Geometry;

/// What kind of reply a cookie will produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Property,
    Geometry,
    Rectangles,
    PictFormats,
}

/// Correlation token for one outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie {
    pub sequence: u64,
    pub kind: ReplyKind,
}

/// A GetProperty reply, reduced to what the cache reads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyReply {
    pub type_: Atom,
    pub format: u8,
    pub value: Vec<u8>,
}

impl PropertyReply {
    pub fn from_u32(type_: Atom, values: &[u32]) -> Self {
        Self {
            type_,
            format: 32,
            value: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    pub fn from_u8(type_: Atom, values: &[u8]) -> Self {
        Self {
            type_,
            format: 8,
            value: values.to_vec(),
        }
    }

    /// Value as 32-bit items; empty unless the property has format 32
    pub fn value32(&self) -> Vec<u32> {
        if self.format != 32 {
            return Vec::new();
        }
        self.value
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Length of the value in bytes, like `xcb_get_property_value_length`
    pub fn byte_len(&self) -> usize {
        self.value.len()
    }
}

/// Visual to pict-format mapping from RENDER QueryPictFormats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictDirectory {
    /// visual id -> pict format id
    pub visual_formats: HashMap<Visualid, u32>,
    /// pict format id -> direct alpha mask
    pub alpha_masks: HashMap<u32, u16>,
}

impl PictDirectory {
    /// Whether the visual's format carries an alpha channel
    pub fn visual_has_alpha(&self, visual: Visualid) -> bool {
        self.visual_formats
            .get(&visual)
            .and_then(|format| self.alpha_masks.get(format))
            .is_some_and(|mask| *mask != 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Property(PropertyReply),
    Geometry(Geometry),
    Rectangles(Vec<Geometry>),
    PictFormats(PictDirectory),
}

/// Snapshot of GetWindowAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowAttributes {
    pub visual: Visualid,
    pub input_only: bool,
    pub override_redirect: bool,
    pub viewable: bool,
}

/// Asynchronous X11 requests used by the property cache
pub trait PropertyWire: Send + Sync {
    /// Blocking attribute query, used once when a cache is created
    fn window_attributes(&self, window: Window) -> Option<WindowAttributes>;

    fn request_property(&self, window: Window, property: Atom, type_: Atom, long_length: u32) -> Option<Cookie>;
    fn request_geometry(&self, window: Window) -> Option<Cookie>;
    fn request_shape(&self, window: Window) -> Option<Cookie>;
    fn request_pict_formats(&self) -> Option<Cookie>;

    /// Collect the reply. `None` means the request failed or the reply
    /// could not be parsed.
    fn fetch(&self, cookie: Cookie) -> Option<Reply>;

    /// Drop a reply nobody will read
    fn discard(&self, cookie: Cookie);

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]);
    fn delete_property(&self, window: Window, property: Atom);

    /// Ask for PropertyNotify and ShapeNotify on a window we have not mapped yet
    fn select_property_input(&self, window: Window);
}

pub type SharedWire = Arc<dyn PropertyWire>;
