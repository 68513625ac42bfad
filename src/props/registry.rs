//! All property caches of the compositor, keyed by window.
//!
//! Lookups of unknown windows get a shared invalid placeholder instead of
//! an error, so callers can ask for properties of windows that have already
//! been destroyed. Signals raised by a cache are routed here: transient
//! links are applied to the parent cache and everything is queued for the
//! event loop.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;
use x11rb::protocol::xproto::{Atom, Window};

use super::cache::{CacheHandles, CacheSeed, CacheSignal, WindowPropertyCache};

pub struct PropertyCaches {
    handles: CacheHandles,
    caches: HashMap<Window, WindowPropertyCache>,
    placeholder: WindowPropertyCache,
    events: Vec<CacheSignal>,
}

impl PropertyCaches {
    pub fn new(handles: CacheHandles) -> Self {
        let placeholder = WindowPropertyCache::invalid(handles.clone());
        Self {
            handles,
            caches: HashMap::new(),
            placeholder,
            events: Vec::new(),
        }
    }

    /// Start tracking `window`. Returns whether its cache is valid.
    pub fn insert(&mut self, window: Window, seed: CacheSeed) -> bool {
        if let Some(existing) = self.caches.get(&window) {
            return existing.is_valid();
        }
        let mut cache = WindowPropertyCache::new(window, self.handles.clone(), seed);
        for (child, other) in &self.caches {
            if other.resolved_transient_for() == Some(window) {
                cache.add_transient(*child);
            }
        }
        let valid = cache.is_valid();
        debug!("Tracking properties of window {} (valid: {})", window, valid);
        self.caches.insert(window, cache);
        valid
    }

    /// Stop tracking `window`; any reply still in flight is discarded
    pub fn remove(&mut self, window: Window) {
        let Some(mut cache) = self.caches.remove(&window) else {
            return;
        };
        cache.cancel_all();
        if let Some(parent) = cache.resolved_transient_for() {
            if let Some(parent_cache) = self.caches.get_mut(&parent) {
                parent_cache.remove_transient(window);
            }
        }
        debug!("Dropped property cache of window {}", window);
    }

    pub fn contains(&self, window: Window) -> bool {
        self.caches.contains_key(&window)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.caches.keys().copied()
    }

    /// Run `f` on the cache of `window`, or on the invalid placeholder
    pub fn with_cache<R>(&mut self, window: Window, f: impl FnOnce(&mut WindowPropertyCache) -> R) -> R {
        let result = match self.caches.get_mut(&window) {
            Some(cache) => f(cache),
            None => f(&mut self.placeholder),
        };
        self.route_signals(window);
        result
    }

    /// Forward a PropertyNotify. Returns whether stacking must be redone.
    pub fn property_event(&mut self, window: Window, atom: Atom, new_value: bool) -> bool {
        self.with_cache(window, |cache| cache.property_event(atom, new_value))
    }

    /// Earliest batch deadline over all windows
    pub fn next_deadline(&self) -> Option<Instant> {
        self.caches.values().filter_map(|c| c.collect_deadline()).min()
    }

    /// Resolve the pending replies of every window whose deadline passed
    pub fn collect_due(&mut self, now: Instant) {
        let due: Vec<Window> = self
            .caches
            .iter()
            .filter(|(_, c)| c.collect_deadline().is_some_and(|d| d <= now))
            .map(|(w, _)| *w)
            .collect();
        for window in due {
            self.with_cache(window, |cache| cache.collect_pending());
        }
    }

    pub fn drain_events(&mut self) -> Vec<CacheSignal> {
        std::mem::take(&mut self.events)
    }

    fn route_signals(&mut self, window: Window) {
        let Some(cache) = self.caches.get_mut(&window) else {
            return;
        };
        for signal in cache.take_signals() {
            match signal {
                CacheSignal::TransientResolved { child, parent } => {
                    if let Some(parent_cache) = self.caches.get_mut(&parent) {
                        parent_cache.add_transient(child);
                    }
                }
                CacheSignal::TransientUnlinked { child, parent } => {
                    if let Some(parent_cache) = self.caches.get_mut(&parent) {
                        parent_cache.remove_transient(child);
                    }
                }
                _ => {}
            }
            self.events.push(signal);
        }
    }
}
