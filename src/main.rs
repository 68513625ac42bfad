//! mcomp - compositing core for an X11 window manager
//!
//! Tracks window properties asynchronously, textures redirected windows
//! from their pixmaps and animates map, unmap, iconify and restore.

mod anim;
mod compositor;
mod config;
mod props;
mod shared;
mod wm;
mod x11_async;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConnectionExt as _, EventMask, MapState, Property, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use anim::{AnimationType, Animators, FinalState, TransitionContext, Variant};
use compositor::Compositor;
use config::Config;
use props::{CacheHandles, CacheSeed, CacheSignal, PictFormats, PropertyCaches, WindowAttributes, X11Wire};
use shared::Geometry;
use wm::{Atoms, WindowType};

struct McompApp {
    conn: Arc<RustConnection>,
    root: Window,
    caches: PropertyCaches,
    compositor: Compositor,
    animators: Animators,
    x11_stream: x11_async::X11EventStream,
    config: Config,
    last_frame: Instant,
    needs_render: bool,
}

impl McompApp {
    fn new() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .context("Invalid screen number")?;
        let root = screen.root;
        info!(
            "Connected to X server, screen {}, root window 0x{:x}, {}x{}",
            screen_num, root, screen.width_in_pixels, screen.height_in_pixels
        );

        let config = Config::load().context("Failed to load configuration")?;
        let atoms = Arc::new(Atoms::new(&*conn).context("Failed to intern atoms")?);

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::SUBSTRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE),
        )?
        .check()
        .context("Failed to select root window events")?;

        let handles = CacheHandles {
            wire: Arc::new(X11Wire::new(Arc::clone(&conn))),
            atoms,
            pict: Arc::new(PictFormats::new()),
            collect_interval: config.properties.collect_interval(),
            max_type_atoms: config.properties.max_type_atoms,
        };
        let caches = PropertyCaches::new(handles);
        let compositor = Compositor::new(&conn, screen_num, &config)?;
        let animators = Animators::new(&config.animation);
        let x11_stream = x11_async::X11EventStream::new(Arc::clone(&conn))?;

        let mut app = Self {
            conn,
            root,
            caches,
            compositor,
            animators,
            x11_stream,
            config,
            last_frame: Instant::now(),
            needs_render: true,
        };
        app.scan_existing()?;
        Ok(app)
    }

    /// Pick up windows that existed before we started
    fn scan_existing(&mut self) -> Result<()> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        for window in tree.children {
            if window == self.compositor.overlay_window {
                continue;
            }
            let Ok(attrs) = self.conn.get_window_attributes(window)?.reply() else {
                continue;
            };
            let seed = CacheSeed {
                attributes: Some(WindowAttributes {
                    visual: attrs.visual,
                    input_only: attrs.class == WindowClass::INPUT_ONLY,
                    override_redirect: attrs.override_redirect,
                    viewable: attrs.map_state == MapState::VIEWABLE,
                }),
                geometry: None,
            };
            self.caches.insert(window, seed);
            if attrs.map_state == MapState::VIEWABLE && attrs.class != WindowClass::INPUT_ONLY {
                self.show_window(window, false);
            }
        }
        info!("Tracking {} existing windows", self.caches.len());
        Ok(())
    }

    fn transition_context(&mut self, window: Window) -> TransitionContext {
        let screen = self.compositor.screen_rect();
        self.caches.with_cache(window, |cache| TransitionContext {
            geometry: cache.real_geometry().to_rectf(),
            icon_geometry: cache.icon_geometry(),
            screen,
            orientation_angle: cache.orientation_angle() as i32,
            status_bar: cache.status_bar_geometry().to_rectf(),
            invoker: cache.invoked_by(),
            crossfade_window: None,
        })
    }

    /// Texture a mapped window and animate it in
    fn show_window(&mut self, window: Window, animate: bool) {
        let (geometry, has_alpha, window_type, no_animations, input_only) =
            self.caches.with_cache(window, |cache| {
                cache.set_is_mapped(true);
                (
                    cache.real_geometry(),
                    cache.has_alpha(),
                    cache.window_type(),
                    cache.no_animations() > 0,
                    cache.is_input_only(),
                )
            });
        if input_only {
            return;
        }
        self.compositor.add_window(window, geometry, has_alpha);
        self.compositor.scene.raise(window);

        if !animate || no_animations {
            if let Some(cw) = self.compositor.scene.get_mut(window) {
                cw.visible = true;
            }
            self.needs_render = true;
            return;
        }

        let ctx = self.transition_context(window);
        if ctx.invoker.is_some() && window_type != WindowType::Sheet {
            self.animators
                .assign(window, Variant::Chained, window_type, &mut self.compositor.scene);
        }
        if !self.animators.animate(
            window,
            window_type,
            AnimationType::Showing,
            &ctx,
            &mut self.compositor.scene,
        ) {
            if let Some(cw) = self.compositor.scene.get_mut(window) {
                cw.visible = true;
            }
        }
        self.needs_render = true;
    }

    fn hide_window(&mut self, window: Window) {
        let window_type = self.caches.with_cache(window, |cache| {
            cache.set_is_mapped(false);
            cache.window_type()
        });
        if !self.compositor.scene.contains(window) {
            return;
        }
        let ctx = self.transition_context(window);
        if !self.animators.animate(
            window,
            window_type,
            AnimationType::Closing,
            &ctx,
            &mut self.compositor.scene,
        ) {
            self.finish_window(window, FinalState::Closed);
        }
        self.needs_render = true;
    }

    fn finish_window(&mut self, window: Window, state: FinalState) {
        match state {
            FinalState::Closed => {
                if let Some(cw) = self.compositor.scene.get_mut(window) {
                    cw.visible = false;
                }
                self.compositor.release_window(window);
            }
            FinalState::Iconified => {
                self.caches.with_cache(window, |cache| cache.set_window_state(props::cache::ICONIC_STATE));
            }
            FinalState::Restored => {}
        }
        debug!("Window 0x{:x} {:?}", window, state);
    }

    fn forget_window(&mut self, window: Window) {
        self.animators.remove(window, &mut self.compositor.scene);
        self.compositor.remove_window(window);
        self.caches.remove(window);
        self.needs_render = true;
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::CreateNotify(e) => {
                if e.window == self.compositor.overlay_window {
                    return;
                }
                let seed = CacheSeed {
                    attributes: None,
                    geometry: Some(Geometry::new(e.x as i32, e.y as i32, e.width as u32, e.height as u32)),
                };
                self.caches.insert(e.window, seed);
            }
            Event::MapNotify(e) => {
                if e.window == self.compositor.overlay_window {
                    return;
                }
                if !self.caches.contains(e.window) {
                    self.caches.insert(e.window, CacheSeed::default());
                }
                self.show_window(e.window, true);
            }
            Event::UnmapNotify(e) => self.hide_window(e.window),
            Event::DestroyNotify(e) => self.forget_window(e.window),
            Event::ConfigureNotify(e) => {
                let geometry = Geometry::new(e.x as i32, e.y as i32, e.width as u32, e.height as u32);
                self.caches.with_cache(e.window, |cache| cache.set_real_geometry(geometry));
                let animating = self.animators.is_transitioning(e.window);
                self.compositor.configure_window(e.window, geometry, animating);
                self.needs_render = true;
            }
            Event::PropertyNotify(e) => {
                let restack = self
                    .caches
                    .property_event(e.window, e.atom, e.state == Property::NEW_VALUE);
                if restack {
                    trace!("Window 0x{:x} needs restacking", e.window);
                    if let Err(err) = self.sync_stacking() {
                        warn!("Failed to read stacking order: {:#}", err);
                    }
                }
            }
            Event::DamageNotify(e) => {
                let window = e.drawable;
                let status = self.animators.status(window);
                let outcome = self.compositor.damage(window, Instant::now(), status);
                if outcome.is_some() {
                    self.needs_render = true;
                }
            }
            Event::Error(e) => debug!("X11 error: {:?}", e),
            _ => {}
        }
    }

    /// Take the server's bottom-to-top child order
    fn sync_stacking(&mut self) -> Result<()> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        self.compositor.scene.restack(&tree.children);
        self.needs_render = true;
        Ok(())
    }

    fn drain_signals(&mut self) {
        let signals = self.caches.drain_events();
        for signal in &signals {
            debug!("Property signal: {:?}", signal);
        }
        if signals.iter().any(CacheSignal::affects_stacking) {
            if let Err(err) = self.sync_stacking() {
                warn!("Failed to read stacking order: {:#}", err);
            }
        }
    }

    fn tick_animations(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame);
        self.last_frame = now;
        for (window, state) in self.animators.tick(dt, &mut self.compositor.scene) {
            self.finish_window(window, state);
        }
        self.needs_render = true;
    }

    fn retry_damage(&mut self) {
        let animators = &self.animators;
        self.compositor
            .run_retries(Instant::now(), |window| animators.status(window));
        self.needs_render = true;
    }

    async fn run(&mut self) -> Result<()> {
        info!("Starting main event loop");
        let frame_interval = self.config.animation.frame_interval();
        let mut frame_timer = tokio::time::interval(frame_interval);
        frame_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut events = Vec::with_capacity(64);

        loop {
            if let Err(e) = self.x11_stream.flush() {
                error!("Failed to flush X11 requests: {}", e);
                return Err(e);
            }

            let collect_at = self.caches.next_deadline();
            let retry_at = self.compositor.next_retry();
            let animating = self.animators.has_active_animation();
            let render = self.needs_render;

            tokio::select! {
                () = self.x11_stream.wait_readable() => {}
                _ = sleep_until(collect_at), if collect_at.is_some() => {
                    self.caches.collect_due(Instant::now());
                }
                _ = sleep_until(retry_at), if retry_at.is_some() => {
                    self.retry_damage();
                }
                _ = frame_timer.tick(), if animating || render => {
                    if animating {
                        self.tick_animations();
                    } else {
                        self.last_frame = Instant::now();
                    }
                    if self.needs_render {
                        if let Err(e) = self.compositor.render() {
                            warn!("Render failed: {:#}", e);
                        }
                        self.needs_render = false;
                    }
                }
            }

            if let Err(e) = self.x11_stream.drain_into(&mut events) {
                error!("X11 connection lost: {:#}", e);
                return Err(e);
            }
            for event in events.drain(..) {
                self.handle_event(event);
            }
            self.drain_signals();
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcomp=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mcomp compositor");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    let mut app = McompApp::new()?;

    tokio::select! {
        result = app.run() => {
            if let Err(e) = result {
                error!("Application error: {:#}", e);
                return Err(e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, cleaning up...");
        }
    }

    // give the overlay back before the connection closes
    drop(app);
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
