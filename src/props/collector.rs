//! Request bookkeeping for one window.
//!
//! Every cached property has a slot. A slot is never requested, waiting for
//! a reply, or up to date. At most one request per slot is in flight: adding
//! a new one hands back the previous cookie so the caller can discard it.
//! All slots of a window share one batch deadline which restarts whenever a
//! request is added.

use std::time::{Duration, Instant};

use super::wire::Cookie;

/// Logical property keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKey {
    RealGeometry,
    IsDecorator,
    TransientFor,
    InvokedBy,
    StackingLayer,
    LowPowerMode,
    OpaqueWindow,
    Prestarted,
    WindowTypeAtom,
    OrientationAngle,
    StatusBarGeometry,
    SupportedProtocols,
    WindowState,
    WmHints,
    IconGeometry,
    GlobalAlpha,
    VideoGlobalAlpha,
    ShapeRegion,
    NetWmState,
    AlwaysMapped,
    CannotMinimize,
    DesktopView,
    CustomRegion,
    WmName,
    Pid,
    NoAnimations,
    VideoOverlay,
    SkipTaskbarMarker,
    DecoratorButtons,
}

impl CollectorKey {
    pub const COUNT: usize = 29;

    pub const ALL: [CollectorKey; Self::COUNT] = [
        CollectorKey::RealGeometry,
        CollectorKey::IsDecorator,
        CollectorKey::TransientFor,
        CollectorKey::InvokedBy,
        CollectorKey::StackingLayer,
        CollectorKey::LowPowerMode,
        CollectorKey::OpaqueWindow,
        CollectorKey::Prestarted,
        CollectorKey::WindowTypeAtom,
        CollectorKey::OrientationAngle,
        CollectorKey::StatusBarGeometry,
        CollectorKey::SupportedProtocols,
        CollectorKey::WindowState,
        CollectorKey::WmHints,
        CollectorKey::IconGeometry,
        CollectorKey::GlobalAlpha,
        CollectorKey::VideoGlobalAlpha,
        CollectorKey::ShapeRegion,
        CollectorKey::NetWmState,
        CollectorKey::AlwaysMapped,
        CollectorKey::CannotMinimize,
        CollectorKey::DesktopView,
        CollectorKey::CustomRegion,
        CollectorKey::WmName,
        CollectorKey::Pid,
        CollectorKey::NoAnimations,
        CollectorKey::VideoOverlay,
        CollectorKey::SkipTaskbarMarker,
        CollectorKey::DecoratorButtons,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Slot {
    #[default]
    NotRequested,
    Pending(Cookie),
    UpToDate,
}

#[derive(Debug)]
pub struct Collector {
    slots: [Slot; CollectorKey::COUNT],
    interval: Duration,
    deadline: Option<Instant>,
}

impl Collector {
    pub fn new(interval: Duration) -> Self {
        Self {
            slots: [Slot::NotRequested; CollectorKey::COUNT],
            interval,
            deadline: None,
        }
    }

    /// Requested and replied
    pub fn is_up_to_date(&self, key: CollectorKey) -> bool {
        self.slots[key.index()] == Slot::UpToDate
    }

    pub fn is_requested(&self, key: CollectorKey) -> bool {
        self.slots[key.index()] != Slot::NotRequested
    }

    pub fn is_pending(&self, key: CollectorKey) -> bool {
        matches!(self.slots[key.index()], Slot::Pending(_))
    }

    /// Record a new in-flight request. Returns the cookie it replaces, which
    /// the caller must discard.
    pub fn add(&mut self, key: CollectorKey, cookie: Cookie, now: Instant) -> Option<Cookie> {
        let previous = self.pending_cookie(key);
        self.slots[key.index()] = Slot::Pending(cookie);
        self.deadline = Some(now + self.interval);
        previous
    }

    /// The reply for `key` is being collected: hand out its cookie and mark
    /// the slot up to date.
    pub fn take(&mut self, key: CollectorKey) -> Option<Cookie> {
        let cookie = self.pending_cookie(key)?;
        self.slots[key.index()] = Slot::UpToDate;
        Some(cookie)
    }

    /// Stop waiting for `key`. A pending slot becomes up to date and its
    /// cookie is returned for discarding; other slots are left alone.
    pub fn cancel(&mut self, key: CollectorKey) -> Option<Cookie> {
        self.take(key)
    }

    /// Treat `key` as known without asking the server
    pub fn mark_up_to_date(&mut self, key: CollectorKey) {
        self.slots[key.index()] = Slot::UpToDate;
    }

    /// Forget `key` so that the next lazy access asks again
    pub fn reset(&mut self, key: CollectorKey) {
        self.slots[key.index()] = Slot::NotRequested;
    }

    pub fn pending_keys(&self) -> Vec<CollectorKey> {
        CollectorKey::ALL
            .into_iter()
            .filter(|k| self.is_pending(*k))
            .collect()
    }

    /// When the batch timer should fire, if anything is pending
    pub fn deadline(&self) -> Option<Instant> {
        if self.slots.iter().any(|s| matches!(s, Slot::Pending(_))) {
            self.deadline
        } else {
            None
        }
    }

    pub fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    fn pending_cookie(&self, key: CollectorKey) -> Option<Cookie> {
        match self.slots[key.index()] {
            Slot::Pending(cookie) => Some(cookie),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::wire::ReplyKind;

    fn cookie(sequence: u64) -> Cookie {
        Cookie { sequence, kind: ReplyKind::Property }
    }

    #[test]
    fn test_key_table_matches_enum_order() {
        for (i, key) in CollectorKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_add_returns_replaced_cookie() {
        let now = Instant::now();
        let mut c = Collector::new(Duration::from_millis(5000));
        assert_eq!(c.add(CollectorKey::WmName, cookie(1), now), None);
        assert_eq!(c.add(CollectorKey::WmName, cookie(2), now), Some(cookie(1)));
        assert_eq!(c.take(CollectorKey::WmName), Some(cookie(2)));
        assert!(c.is_up_to_date(CollectorKey::WmName));
        assert_eq!(c.take(CollectorKey::WmName), None);
    }

    #[test]
    fn test_cancel_leaves_unrequested_slot_alone() {
        let mut c = Collector::new(Duration::from_millis(5000));
        assert_eq!(c.cancel(CollectorKey::ShapeRegion), None);
        assert!(!c.is_requested(CollectorKey::ShapeRegion));
    }

    #[test]
    fn test_deadline_restarts_on_each_add() {
        let start = Instant::now();
        let mut c = Collector::new(Duration::from_millis(5000));
        assert_eq!(c.deadline(), None);
        c.add(CollectorKey::Pid, cookie(1), start);
        let later = start + Duration::from_millis(1200);
        c.add(CollectorKey::WmName, cookie(2), later);
        assert_eq!(c.deadline(), Some(later + Duration::from_millis(5000)));

        c.take(CollectorKey::Pid);
        c.take(CollectorKey::WmName);
        assert_eq!(c.deadline(), None);
    }

    #[test]
    fn test_pending_keys() {
        let now = Instant::now();
        let mut c = Collector::new(Duration::from_millis(5000));
        c.add(CollectorKey::Pid, cookie(1), now);
        c.add(CollectorKey::WmHints, cookie(2), now);
        c.mark_up_to_date(CollectorKey::RealGeometry);
        assert_eq!(c.pending_keys(), vec![CollectorKey::WmHints, CollectorKey::Pid]);
    }
}
