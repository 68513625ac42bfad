//! Process-wide RENDER pict-format directory.
//!
//! Queried once, lazily collected the first time a window asks whether its
//! visual has alpha.

use std::sync::Mutex;

use tracing::warn;
use x11rb::protocol::xproto::Visualid;

use super::wire::{Cookie, PictDirectory, PropertyWire, Reply};

#[derive(Debug, Default)]
enum State {
    #[default]
    Unrequested,
    Pending(Cookie),
    Ready(PictDirectory),
    Failed,
}

#[derive(Debug, Default)]
pub struct PictFormats {
    state: Mutex<State>,
}

impl PictFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the query if nobody has yet
    pub fn request(&self, wire: &dyn PropertyWire) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if matches!(*state, State::Unrequested) {
            if let Some(cookie) = wire.request_pict_formats() {
                *state = State::Pending(cookie);
            }
        }
    }

    /// Whether `visual` maps to a format with a non-zero alpha mask
    pub fn visual_has_alpha(&self, wire: &dyn PropertyWire, visual: Visualid) -> bool {
        self.request(wire);
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if let State::Pending(cookie) = *state {
            *state = match wire.fetch(cookie) {
                Some(Reply::PictFormats(dir)) => State::Ready(dir),
                _ => {
                    warn!("Querying pict formats has failed");
                    State::Failed
                }
            };
        }
        match &*state {
            State::Ready(dir) => dir.visual_has_alpha(visual),
            _ => false,
        }
    }
}
