//! Per-window texture kept current from damage events

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::composite::{ConnectionExt as _, Redirect};
use x11rb::protocol::damage::{ConnectionExt as _, ReportLevel};
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;
use x11rb::NONE;

use super::damage::{DamageDecision, DamageHistory};
use super::tfp::{TextureFromPixmap, TfpService};
use crate::anim::AnimationStatus;
use crate::config::DamageConfig;

/// Composite and Damage requests made on behalf of a window
pub trait CompositeWire {
    fn name_window_pixmap(&self, window: u32) -> Result<u32>;
    fn free_pixmap(&self, pixmap: u32);
    fn create_damage(&self, window: u32) -> Result<u32>;
    fn subtract_damage(&self, damage: u32);
    fn destroy_damage(&self, damage: u32);
    fn set_redirected(&self, window: u32, redirected: bool);
}

pub struct X11Composite {
    conn: Arc<RustConnection>,
}

impl X11Composite {
    pub fn new(conn: Arc<RustConnection>) -> Self {
        Self { conn }
    }
}

impl CompositeWire for X11Composite {
    fn name_window_pixmap(&self, window: u32) -> Result<u32> {
        let pixmap = self.conn.generate_id()?;
        self.conn
            .composite_name_window_pixmap(window, pixmap)?
            .check()
            .with_context(|| format!("NameWindowPixmap failed for 0x{:x}", window))?;
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: u32) {
        if let Err(err) = self.conn.free_pixmap(pixmap) {
            warn!("FreePixmap 0x{:x} failed: {}", pixmap, err);
        }
    }

    fn create_damage(&self, window: u32) -> Result<u32> {
        let damage = self.conn.generate_id()?;
        self.conn
            .damage_create(damage, window, ReportLevel::NON_EMPTY)?
            .check()
            .with_context(|| format!("damage_create failed for 0x{:x}", window))?;
        Ok(damage)
    }

    fn subtract_damage(&self, damage: u32) {
        if let Err(err) = self.conn.damage_subtract(damage, NONE, NONE) {
            warn!("damage_subtract 0x{:x} failed: {}", damage, err);
        }
    }

    fn destroy_damage(&self, damage: u32) {
        if let Err(err) = self.conn.damage_destroy(damage) {
            warn!("damage_destroy 0x{:x} failed: {}", damage, err);
        }
    }

    fn set_redirected(&self, window: u32, redirected: bool) {
        let result = if redirected {
            self.conn.composite_redirect_window(window, Redirect::MANUAL).map(drop)
        } else {
            self.conn.composite_unredirect_window(window, Redirect::MANUAL).map(drop)
        };
        if let Err(err) = result {
            warn!("Changing redirection of 0x{:x} failed: {}", window, err);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Updated,
    /// Update postponed until the retry deadline
    Throttled(Instant),
    /// Nothing to texture: direct rendering or no pixmap
    Skipped,
}

pub struct TexturePixmapItem {
    window: u32,
    wire: Rc<dyn CompositeWire>,
    pixmap: u32,
    damage: u32,
    tfp: TextureFromPixmap,
    history: DamageHistory,
    retry_at: Option<Instant>,
    busy_retry: Duration,
    defer_while_animating: bool,
    direct: bool,
}

impl TexturePixmapItem {
    pub fn new(
        window: u32,
        has_alpha: bool,
        wire: Rc<dyn CompositeWire>,
        service: Rc<TfpService>,
        config: &DamageConfig,
    ) -> Self {
        let damage = wire.create_damage(window).unwrap_or_else(|err| {
            warn!("{:#}", err);
            0
        });
        let mut item = Self {
            window,
            wire,
            pixmap: 0,
            damage,
            tfp: TextureFromPixmap::new(service, has_alpha),
            history: DamageHistory::from_config(config),
            retry_at: None,
            busy_retry: Duration::from_millis(config.busy_retry_ms),
            defer_while_animating: config.defer_while_animating,
            direct: false,
        };
        item.rebind();
        item
    }

    /// Name a fresh window pixmap and bind it in place of the old one
    pub fn rebind(&mut self) {
        if self.direct {
            return;
        }
        let pixmap = match self.wire.name_window_pixmap(self.window) {
            Ok(pixmap) => pixmap,
            Err(err) => {
                debug!("{:#}", err);
                return;
            }
        };
        if let Err(err) = self.tfp.bind(pixmap) {
            debug!("Window 0x{:x} left untextured: {}", self.window, err);
        }
        let old = std::mem::replace(&mut self.pixmap, pixmap);
        if old != 0 {
            self.wire.free_pixmap(old);
        }
    }

    /// The window pixmap is reallocated on resize
    pub fn resize(&mut self) {
        trace!("Window 0x{:x} resized, rebinding", self.window);
        self.rebind();
    }

    /// Stop compositing the window and let it draw straight to the screen
    pub fn enable_direct_rendering(&mut self) {
        if self.direct {
            return;
        }
        self.direct = true;
        self.tfp.unbind();
        if self.pixmap != 0 {
            self.wire.free_pixmap(self.pixmap);
            self.pixmap = 0;
        }
        self.retry_at = None;
        self.history.clear();
        self.wire.set_redirected(self.window, false);
        debug!("Direct rendering enabled for 0x{:x}", self.window);
    }

    pub fn disable_direct_rendering(&mut self) {
        if !self.direct {
            return;
        }
        self.direct = false;
        self.wire.set_redirected(self.window, true);
        self.rebind();
        debug!("Direct rendering disabled for 0x{:x}", self.window);
    }

    /// React to a damage notification.
    ///
    /// Outside a transition the texture is always updated. Inside one,
    /// updates are held back while any animation runs (unless the window's
    /// animator is driven by hand) and otherwise throttled.
    pub fn damage_received(&mut self, now: Instant, status: AnimationStatus) -> DamageOutcome {
        let outcome = self.decide(now, status);
        if self.damage != 0 {
            self.wire.subtract_damage(self.damage);
        }
        outcome
    }

    fn decide(&mut self, now: Instant, status: AnimationStatus) -> DamageOutcome {
        if self.direct {
            return DamageOutcome::Skipped;
        }
        if !self.tfp.is_valid() {
            self.rebind();
            if !self.tfp.is_valid() {
                return DamageOutcome::Skipped;
            }
        }
        if !status.transitioning {
            self.history.clear();
            self.retry_at = None;
            self.update();
            return DamageOutcome::Updated;
        }
        if self.defer_while_animating && status.animating && !status.manually_updated {
            let at = *self.retry_at.get_or_insert(now + self.busy_retry);
            trace!("Window 0x{:x} busy until {:?}", self.window, at);
            return DamageOutcome::Throttled(at);
        }
        match self.history.record(now) {
            DamageDecision::UpdateNow => {
                self.update();
                DamageOutcome::Updated
            }
            DamageDecision::Defer(wait) => {
                let at = *self.retry_at.get_or_insert(now + wait);
                trace!("Window 0x{:x} throttled until {:?}", self.window, at);
                DamageOutcome::Throttled(at)
            }
        }
    }

    fn update(&mut self) {
        if let Err(err) = self.tfp.update() {
            debug!("Texture update for 0x{:x} failed: {}", self.window, err);
        }
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Run a due retry; `None` if none was due
    pub fn retry(&mut self, now: Instant, status: AnimationStatus) -> Option<DamageOutcome> {
        match self.retry_at {
            Some(at) if at <= now => {
                self.retry_at = None;
                Some(self.decide(now, status))
            }
            _ => None,
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn pixmap(&self) -> u32 {
        self.pixmap
    }

    pub fn texture(&self) -> u32 {
        self.tfp.texture()
    }

    pub fn is_valid(&self) -> bool {
        self.tfp.is_valid()
    }

    pub fn inverted_texture(&self) -> bool {
        self.tfp.inverted_texture()
    }

    pub fn is_direct_rendered(&self) -> bool {
        self.direct
    }
}

impl Drop for TexturePixmapItem {
    fn drop(&mut self) {
        self.tfp.unbind();
        if self.pixmap != 0 {
            self.wire.free_pixmap(self.pixmap);
        }
        if self.damage != 0 {
            self.wire.destroy_damage(self.damage);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::compositor::texture_pool::fake::FakeTextures;
    use crate::compositor::texture_pool::TexturePool;
    use crate::compositor::tfp::fake::{FakeBinder, FakeReader};
    use crate::compositor::tfp::PixmapBinder;

    const WIN: u32 = 0x200;
    const IDLE: AnimationStatus = AnimationStatus {
        transitioning: false,
        manually_updated: false,
        animating: false,
    };
    const TRANSITIONING: AnimationStatus = AnimationStatus { transitioning: true, ..IDLE };
    const BUSY: AnimationStatus = AnimationStatus { transitioning: true, animating: true, ..IDLE };

    #[derive(Default)]
    struct FakeComposite {
        next: RefCell<u32>,
        freed: RefCell<Vec<u32>>,
        subtracted: RefCell<usize>,
        destroyed: RefCell<Vec<u32>>,
        redirected: RefCell<Vec<bool>>,
    }

    impl CompositeWire for FakeComposite {
        fn name_window_pixmap(&self, _window: u32) -> Result<u32> {
            let mut next = self.next.borrow_mut();
            *next += 1;
            Ok(0x1000 + *next)
        }

        fn free_pixmap(&self, pixmap: u32) {
            self.freed.borrow_mut().push(pixmap);
        }

        fn create_damage(&self, _window: u32) -> Result<u32> {
            Ok(0x900)
        }

        fn subtract_damage(&self, _damage: u32) {
            *self.subtracted.borrow_mut() += 1;
        }

        fn destroy_damage(&self, damage: u32) {
            self.destroyed.borrow_mut().push(damage);
        }

        fn set_redirected(&self, _window: u32, redirected: bool) {
            self.redirected.borrow_mut().push(redirected);
        }
    }

    struct Setup {
        wire: Rc<FakeComposite>,
        binder: Rc<FakeBinder>,
        service: Rc<TfpService>,
    }

    fn setup() -> Setup {
        let textures = Rc::new(FakeTextures::default());
        let binder = Rc::new(FakeBinder::default());
        let pool = TexturePool::new(textures, 4, 4).shared();
        let boxed: Box<dyn PixmapBinder> = Box::new(binder.clone());
        let service = TfpService::new(Some(boxed), Box::new(Rc::new(FakeReader::default())), pool);
        Setup { wire: Rc::new(FakeComposite::default()), binder, service }
    }

    fn item(s: &Setup, config: &DamageConfig) -> TexturePixmapItem {
        TexturePixmapItem::new(WIN, false, s.wire.clone(), s.service.clone(), config)
    }

    #[test]
    fn test_new_binds_window_pixmap() {
        let s = setup();
        let item = item(&s, &DamageConfig::default());
        assert!(item.is_valid());
        assert_eq!(item.pixmap(), 0x1001);
        assert_eq!(s.binder.attached.borrow().get(&item.texture()), Some(&0x1001));
    }

    #[test]
    fn test_resize_frees_previous_pixmap() {
        let s = setup();
        let mut item = item(&s, &DamageConfig::default());
        item.resize();
        assert_eq!(item.pixmap(), 0x1002);
        assert_eq!(*s.wire.freed.borrow(), vec![0x1001]);
    }

    #[test]
    fn test_damage_outside_transition_updates() {
        let s = setup();
        let mut item = item(&s, &DamageConfig::default());
        let now = Instant::now();
        assert_eq!(item.damage_received(now, IDLE), DamageOutcome::Updated);
        assert_eq!(*s.binder.refreshes.borrow(), 1);
        assert_eq!(*s.wire.subtracted.borrow(), 1);
        assert_eq!(item.retry_deadline(), None);
    }

    #[test]
    fn test_transition_throttles_and_retries() {
        let s = setup();
        let config = DamageConfig { limit: 2, ..Default::default() };
        let mut item = item(&s, &config);
        let t0 = Instant::now();
        assert_eq!(item.damage_received(t0, TRANSITIONING), DamageOutcome::Updated);
        assert_eq!(item.damage_received(t0, TRANSITIONING), DamageOutcome::Updated);
        let deadline = t0 + Duration::from_millis(1001);
        assert_eq!(item.damage_received(t0, TRANSITIONING), DamageOutcome::Throttled(deadline));
        // a second throttled damage keeps the armed deadline
        let later = t0 + Duration::from_millis(100);
        assert_eq!(item.damage_received(later, TRANSITIONING), DamageOutcome::Throttled(deadline));
        assert_eq!(*s.wire.subtracted.borrow(), 4);

        assert_eq!(item.retry(later, TRANSITIONING), None);
        assert_eq!(item.retry(deadline, TRANSITIONING), Some(DamageOutcome::Updated));
        assert_eq!(item.retry_deadline(), None);
        assert_eq!(*s.binder.refreshes.borrow(), 3);
    }

    #[test]
    fn test_transition_end_clears_throttle() {
        let s = setup();
        let config = DamageConfig { limit: 1, ..Default::default() };
        let mut item = item(&s, &config);
        let t0 = Instant::now();
        item.damage_received(t0, TRANSITIONING);
        assert!(matches!(item.damage_received(t0, TRANSITIONING), DamageOutcome::Throttled(_)));
        assert_eq!(item.damage_received(t0, IDLE), DamageOutcome::Updated);
        assert_eq!(item.retry_deadline(), None);
        assert_eq!(item.damage_received(t0, TRANSITIONING), DamageOutcome::Updated);
    }

    #[test]
    fn test_busy_defer_while_animating() {
        let s = setup();
        let config = DamageConfig::default();
        assert!(config.defer_while_animating);
        let mut item = item(&s, &config);
        let t0 = Instant::now();
        let at = t0 + Duration::from_millis(config.busy_retry_ms);
        assert_eq!(item.damage_received(t0, BUSY), DamageOutcome::Throttled(at));
        assert_eq!(item.retry(at, TRANSITIONING), Some(DamageOutcome::Updated));
    }

    #[test]
    fn test_animation_elsewhere_does_not_hold_back_idle_window() {
        let s = setup();
        let mut item = item(&s, &DamageConfig::default());
        let status = AnimationStatus { animating: true, ..IDLE };
        assert_eq!(item.damage_received(Instant::now(), status), DamageOutcome::Updated);
        assert_eq!(item.retry_deadline(), None);
    }

    #[test]
    fn test_manually_updated_animator_is_not_deferred() {
        let s = setup();
        let mut item = item(&s, &DamageConfig::default());
        let status = AnimationStatus { manually_updated: true, ..BUSY };
        assert_eq!(item.damage_received(Instant::now(), status), DamageOutcome::Updated);

        let config = DamageConfig { defer_while_animating: false, ..Default::default() };
        let mut item = self::item(&s, &config);
        assert_eq!(item.damage_received(Instant::now(), BUSY), DamageOutcome::Updated);
    }

    #[test]
    fn test_failed_bind_retried_on_damage() {
        let s = setup();
        s.binder.failing.borrow_mut().insert(0x1001);
        let mut item = item(&s, &DamageConfig::default());
        assert!(!item.is_valid());
        assert_eq!(item.damage_received(Instant::now(), IDLE), DamageOutcome::Updated);
        assert!(item.is_valid());
        assert_eq!(item.pixmap(), 0x1002);
        assert_eq!(*s.wire.freed.borrow(), vec![0x1001]);
    }

    #[test]
    fn test_direct_rendering_round_trip() {
        let s = setup();
        let mut item = item(&s, &DamageConfig::default());
        item.enable_direct_rendering();
        assert!(item.is_direct_rendered());
        assert!(!item.is_valid());
        assert_eq!(item.damage_received(Instant::now(), IDLE), DamageOutcome::Skipped);

        item.disable_direct_rendering();
        assert!(item.is_valid());
        assert_eq!(*s.wire.redirected.borrow(), vec![false, true]);
        assert_eq!(*s.wire.freed.borrow(), vec![0x1001]);
    }

    #[test]
    fn test_drop_releases_everything() {
        let s = setup();
        let available = s.service.pool().borrow().available();
        {
            let _item = item(&s, &DamageConfig::default());
        }
        assert_eq!(*s.wire.freed.borrow(), vec![0x1001]);
        assert_eq!(*s.wire.destroyed.borrow(), vec![0x900]);
        assert!(s.binder.attached.borrow().is_empty());
        assert_eq!(s.service.pool().borrow().available(), available);
    }
}
