//! Compositor Module
//!
//! Redirects windows off-screen, keeps a texture per window current from
//! damage, and draws the scene onto the composite overlay window.

pub mod damage;
pub mod egl;
pub mod gl_context;
pub mod pixmap_item;
pub mod renderer;
pub mod scene;
pub mod texture_pool;
pub mod tfp;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as CompositeExt};
use x11rb::protocol::damage::{self as xdamage, ConnectionExt as DamageExt};
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, SK, SO};
use x11rb::protocol::xproto::ClipOrdering;
use x11rb::rust_connection::RustConnection;

use crate::anim::AnimationStatus;
use crate::config::{Config, DamageConfig, TextureBackend};
use crate::shared::{Geometry, RectF};
use egl::EglContext;
use gl_context::GlContext;
use pixmap_item::{CompositeWire, DamageOutcome, TexturePixmapItem, X11Composite};
use renderer::Renderer;
use scene::Scene;
use texture_pool::{GlTextures, TexturePool};
use tfp::egl::EglBinder;
use tfp::glx::GlxBinder;
use tfp::software::X11PixmapReader;
use tfp::{PixmapBinder, TfpService};

/// The GL context the scene is drawn with
pub enum GraphicsContext {
    Egl(Rc<EglContext>),
    Glx(Rc<GlContext>),
}

impl GraphicsContext {
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsContext::Egl(_) => "EGL",
            GraphicsContext::Glx(_) => "GLX",
        }
    }

    pub fn make_current(&self) -> Result<()> {
        match self {
            GraphicsContext::Egl(ctx) => ctx.make_current(),
            GraphicsContext::Glx(ctx) => ctx.make_current(),
        }
    }

    pub fn swap_buffers(&self) -> Result<()> {
        match self {
            GraphicsContext::Egl(ctx) => ctx.swap_buffers(),
            GraphicsContext::Glx(ctx) => ctx.swap_buffers(),
        }
    }
}

fn glx_context(screen_num: usize, overlay: u32) -> Result<(GraphicsContext, Option<Box<dyn PixmapBinder>>)> {
    let ctx = Rc::new(GlContext::new(screen_num, overlay)?);
    let binder = GlxBinder::new(Rc::clone(&ctx)).map(|b| Box::new(b) as Box<dyn PixmapBinder>);
    Ok((GraphicsContext::Glx(ctx), binder))
}

fn egl_context(overlay: u32) -> Result<(GraphicsContext, Option<Box<dyn PixmapBinder>>)> {
    let ctx = Rc::new(EglContext::new(overlay)?);
    let binder = EglBinder::new(Rc::clone(&ctx)).map(|b| Box::new(b) as Box<dyn PixmapBinder>);
    Ok((GraphicsContext::Egl(ctx), binder))
}

/// Create the context for `backend` and probe zero-copy support once
fn create_context(
    backend: TextureBackend,
    screen_num: usize,
    overlay: u32,
) -> Result<(GraphicsContext, Option<Box<dyn PixmapBinder>>)> {
    match backend {
        TextureBackend::Egl => egl_context(overlay),
        TextureBackend::Glx => glx_context(screen_num, overlay),
        TextureBackend::Software => {
            let (ctx, _) = glx_context(screen_num, overlay).or_else(|err| {
                warn!("GLX unavailable ({:#}), trying EGL", err);
                egl_context(overlay)
            })?;
            Ok((ctx, None))
        }
        TextureBackend::Auto => {
            let egl_err = match egl_context(overlay) {
                Ok((ctx, Some(binder))) => return Ok((ctx, Some(binder))),
                Ok((ctx, None)) => {
                    debug!("EGL has no pixmap images, trying GLX");
                    drop(ctx);
                    None
                }
                Err(err) => Some(err),
            };
            match glx_context(screen_num, overlay) {
                Ok(found) => Ok(found),
                Err(glx_err) => {
                    if let Some(egl_err) = egl_err {
                        warn!("EGL failed: {:#}", egl_err);
                        return Err(glx_err);
                    }
                    warn!("GLX failed ({:#}), using EGL with readback", glx_err);
                    let (ctx, _) = egl_context(overlay)?;
                    Ok((ctx, None))
                }
            }
        }
    }
}

// fields drop in order: textures and GL objects go before the context
pub struct Compositor {
    pub overlay_window: u32,
    pub scene: Scene,
    renderer: Renderer,
    tfp: Rc<TfpService>,
    wire: Rc<dyn CompositeWire>,
    damage_config: DamageConfig,
    screen: RectF,
    context: GraphicsContext,
}

impl Compositor {
    pub fn new(conn: &Arc<RustConnection>, screen_num: usize, config: &Config) -> Result<Self> {
        info!("Initializing compositor");
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .context("Invalid screen number")?;
        let root = screen.root;
        let screen_rect = RectF::new(0.0, 0.0, screen.width_in_pixels as f64, screen.height_in_pixels as f64);

        conn.extension_information(composite::X11_EXTENSION_NAME)?
            .context("Composite extension not available")?;
        let composite_version = conn
            .composite_query_version(0, 4)?
            .reply()
            .context("Failed to query composite version")?;
        info!(
            "Composite extension {}.{}",
            composite_version.major_version, composite_version.minor_version
        );

        conn.extension_information(xdamage::X11_EXTENSION_NAME)?
            .context("Damage extension not available")?;
        // the version must be negotiated before any damage request
        let damage_version = conn
            .damage_query_version(1, 1)?
            .reply()
            .context("Failed to query damage version")?;
        info!(
            "Damage extension {}.{}",
            damage_version.major_version, damage_version.minor_version
        );

        conn.composite_redirect_subwindows(root, composite::Redirect::MANUAL)?;
        let overlay_window = conn
            .composite_get_overlay_window(root)?
            .reply()
            .context("Failed to get the composite overlay window")?
            .overlay_win;
        info!("Using Composite Overlay Window: 0x{:x}", overlay_window);

        // let input fall through to the windows below
        conn.shape_rectangles(SO::SET, SK::INPUT, ClipOrdering::UNSORTED, overlay_window, 0, 0, &[])?;
        conn.flush()?;

        let (context, binder) = create_context(config.textures.backend, screen_num, overlay_window)?;
        info!("{} context ready, zero-copy textures: {}", context.name(), binder.is_some());

        let renderer = Renderer::new()?;
        let pool = TexturePool::new(
            Rc::new(GlTextures),
            config.textures.initial_pool,
            config.textures.pool_growth,
        )
        .shared();
        let reader = Box::new(X11PixmapReader::new(Arc::clone(conn)));
        let tfp = TfpService::new(binder, reader, pool);

        Ok(Self {
            overlay_window,
            scene: Scene::new(),
            renderer,
            tfp,
            wire: Rc::new(X11Composite::new(Arc::clone(conn))),
            damage_config: config.damage.clone(),
            screen: screen_rect,
            context,
        })
    }

    pub fn screen_rect(&self) -> RectF {
        self.screen
    }

    pub fn zero_copy(&self) -> bool {
        self.tfp.zero_copy()
    }

    /// Start compositing a mapped window
    pub fn add_window(&mut self, window: u32, geometry: Geometry, has_alpha: bool) {
        let cw = self.scene.add(window, geometry);
        cw.geometry = geometry;
        if cw.item.is_none() {
            cw.item = Some(TexturePixmapItem::new(
                window,
                has_alpha,
                Rc::clone(&self.wire),
                Rc::clone(&self.tfp),
                &self.damage_config,
            ));
            debug!("Compositor: added window 0x{:x}", window);
        }
    }

    /// Drop the window's texture; the scene entry stays for animations
    pub fn release_window(&mut self, window: u32) {
        if let Some(cw) = self.scene.get_mut(window) {
            cw.item = None;
        }
    }

    pub fn remove_window(&mut self, window: u32) {
        if self.scene.remove(window).is_some() {
            debug!("Compositor: removed window 0x{:x}", window);
        }
    }

    pub fn configure_window(&mut self, window: u32, geometry: Geometry, animating: bool) {
        let Some(cw) = self.scene.get_mut(window) else {
            return;
        };
        let resized = cw.geometry.width != geometry.width || cw.geometry.height != geometry.height;
        cw.geometry = geometry;
        if !animating {
            cw.position.x = geometry.x as f64;
            cw.position.y = geometry.y as f64;
        }
        if resized {
            if let Some(item) = cw.item.as_mut() {
                item.resize();
            }
        }
    }

    pub fn damage(&mut self, window: u32, now: Instant, status: AnimationStatus) -> Option<DamageOutcome> {
        let item = self.scene.get_mut(window)?.item.as_mut()?;
        Some(item.damage_received(now, status))
    }

    /// Earliest armed damage retry
    pub fn next_retry(&self) -> Option<Instant> {
        self.scene
            .stacking()
            .iter()
            .filter_map(|w| self.scene.get(*w)?.item.as_ref()?.retry_deadline())
            .min()
    }

    pub fn run_retries(&mut self, now: Instant, status: impl Fn(u32) -> AnimationStatus) {
        for cw in self.scene.windows_mut() {
            let window = cw.window;
            if let Some(item) = cw.item.as_mut() {
                item.retry(now, status(window));
            }
        }
    }

    pub fn render(&mut self) -> Result<()> {
        self.context.make_current()?;
        let items = self.scene.draw_list();
        self.renderer.render(&items, self.screen.width as f32, self.screen.height as f32);
        self.context.swap_buffers()
    }
}
