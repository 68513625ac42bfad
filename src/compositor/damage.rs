//! Damage throttling while a window is transitioning

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::DamageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageDecision {
    UpdateNow,
    /// Too many updates inside the window; try again after this long
    Defer(Duration),
}

/// Timestamps of the texture updates made during the current transition
#[derive(Debug)]
pub struct DamageHistory {
    stamps: VecDeque<Instant>,
    expiry: Duration,
    limit: usize,
}

impl DamageHistory {
    pub fn new(expiry: Duration, limit: usize) -> Self {
        Self {
            stamps: VecDeque::with_capacity(limit),
            expiry,
            limit: limit.max(1),
        }
    }

    pub fn from_config(config: &DamageConfig) -> Self {
        Self::new(Duration::from_millis(config.expiry_ms), config.limit)
    }

    /// Decide about one damage at `now`; an `UpdateNow` is recorded.
    ///
    /// An update expires once it is strictly older than the expiry, so a
    /// deferral lands one millisecond past the oldest update's expiry.
    pub fn record(&mut self, now: Instant) -> DamageDecision {
        while let Some(&first) = self.stamps.front() {
            if first + self.expiry < now {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        if self.stamps.len() >= self.limit {
            if let Some(&first) = self.stamps.front() {
                let wait = (first + self.expiry).saturating_duration_since(now);
                return DamageDecision::Defer(wait + Duration::from_millis(1));
            }
        }
        self.stamps.push_back(now);
        DamageDecision::UpdateNow
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_updates() {
        let mut history = DamageHistory::new(Duration::from_millis(1000), 3);
        let t0 = Instant::now();
        for i in 0..3 {
            assert_eq!(history.record(t0 + Duration::from_millis(i)), DamageDecision::UpdateNow);
        }
        assert_eq!(
            history.record(t0 + Duration::from_millis(10)),
            DamageDecision::Defer(Duration::from_millis(991))
        );
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let mut history = DamageHistory::new(Duration::from_millis(1000), 2);
        let t0 = Instant::now();
        history.record(t0);
        history.record(t0 + Duration::from_millis(500));
        // exactly one expiry old still counts
        assert_eq!(
            history.record(t0 + Duration::from_millis(1000)),
            DamageDecision::Defer(Duration::from_millis(1))
        );
        assert_eq!(history.record(t0 + Duration::from_millis(1001)), DamageDecision::UpdateNow);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_sustained_damage_stays_bounded() {
        // 100 damages per second for two seconds
        let expiry = Duration::from_millis(1000);
        let mut history = DamageHistory::new(expiry, 30);
        let t0 = Instant::now();
        let mut updates: Vec<Instant> = Vec::new();
        let mut retry: Option<Instant> = None;
        let mut retries_fired = 0;

        for tick in 0..200u64 {
            let now = t0 + Duration::from_millis(tick * 10);
            if let Some(at) = retry {
                if at <= now {
                    retry = None;
                    retries_fired += 1;
                    if history.record(at) == DamageDecision::UpdateNow {
                        updates.push(at);
                    }
                }
            }
            match history.record(now) {
                DamageDecision::UpdateNow => updates.push(now),
                DamageDecision::Defer(wait) => {
                    retry.get_or_insert(now + wait);
                }
            }
        }

        assert!(retries_fired >= 1);
        for (i, start) in updates.iter().enumerate() {
            let in_window = updates[i..].iter().take_while(|t| **t < *start + expiry).count();
            assert!(in_window <= 30, "{} updates within one second", in_window);
        }
        assert!(updates.len() >= 55);
    }

    #[test]
    fn test_clear_resets() {
        let mut history = DamageHistory::new(Duration::from_millis(1000), 1);
        let t0 = Instant::now();
        history.record(t0);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.record(t0), DamageDecision::UpdateNow);
    }
}
