//! OpenGL context creation using GLX directly (like Compiz)
//!
//! The context renders to the composite overlay window. When the server
//! offers GLX_EXT_texture_from_pixmap, one FBConfig per pixmap format (with
//! and without alpha) is picked up front for binding window pixmaps.

use anyhow::{Context, Result};
use std::ffi::CString;
use std::os::raw::c_ulong;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, error, info, warn};
use x11_dl::glx::{self, Glx};
use x11_dl::xlib::{self, Xlib};

use super::tfp::TfpError;

// GLX_EXT_texture_from_pixmap
const GLX_BIND_TO_TEXTURE_RGB_EXT: i32 = 0x20D0;
const GLX_BIND_TO_TEXTURE_RGBA_EXT: i32 = 0x20D1;
const GLX_BIND_TO_TEXTURE_TARGETS_EXT: i32 = 0x20D3;
const GLX_Y_INVERTED_EXT: i32 = 0x20D4;
const GLX_TEXTURE_FORMAT_EXT: i32 = 0x20D5;
const GLX_TEXTURE_TARGET_EXT: i32 = 0x20D6;
const GLX_MIPMAP_TEXTURE_EXT: i32 = 0x20D7;
const GLX_TEXTURE_FORMAT_RGB_EXT: i32 = 0x20D9;
const GLX_TEXTURE_FORMAT_RGBA_EXT: i32 = 0x20DA;
const GLX_TEXTURE_2D_EXT: i32 = 0x20DC;
const GLX_FRONT_LEFT_EXT: i32 = 0x20DE;
const GLX_TEXTURE_2D_BIT_EXT: i32 = 0x0002;

static X_ERROR_OCCURRED: AtomicBool = AtomicBool::new(false);
static X_ERROR_CODE: AtomicI32 = AtomicI32::new(0);

// Returning 0 keeps Xlib's default handler (which exits) out of the way
unsafe extern "C" fn x_error_handler(
    _display: *mut xlib::Display,
    event: *mut xlib::XErrorEvent,
) -> i32 {
    if !event.is_null() {
        let (error_code, request_code, minor_code) = unsafe {
            ((*event).error_code, (*event).request_code, (*event).minor_code)
        };
        X_ERROR_CODE.store(error_code as i32, Ordering::Relaxed);
        X_ERROR_OCCURRED.store(true, Ordering::Relaxed);
        debug!("X error: code={}, request={}, minor={}", error_code, request_code, minor_code);
    }
    0
}

type TexImageFn = unsafe extern "C" fn(*mut xlib::Display, c_ulong, i32, *const i32);

/// FBConfig used to bind pixmaps of one format
#[derive(Clone, Copy)]
pub struct PixmapConfig {
    pub fb_config: glx::GLXFBConfig,
    pub texture_format: i32,
    pub y_inverted: bool,
}

struct TfpFns {
    bind: TexImageFn,
    release: TexImageFn,
}

/// OpenGL context wrapper using GLX
pub struct GlContext {
    glx: Glx,
    xlib: Xlib,
    display: *mut xlib::Display,
    context: glx::GLXContext,
    drawable: c_ulong,
    rgb_config: Option<PixmapConfig>,
    rgba_config: Option<PixmapConfig>,
    tfp: Option<TfpFns>,
}

fn proc_address(glx: &Glx, name: &str) -> Option<unsafe extern "C" fn()> {
    let name = CString::new(name).ok()?;
    unsafe { (glx.glXGetProcAddress)(name.as_ptr() as *const _) }
}

impl GlContext {
    /// Create a context current on `overlay`
    pub fn new(screen_num: usize, overlay: u32) -> Result<Self> {
        let xlib = Xlib::open().context("Failed to load libX11")?;
        let glx = Glx::open().context("Failed to load libGLX")?;

        let display_name = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into());
        let display_cstr = CString::new(display_name)?;
        let display = unsafe { (xlib.XOpenDisplay)(display_cstr.as_ptr()) };
        if display.is_null() {
            return Err(anyhow::anyhow!("Failed to open X11 display"));
        }
        unsafe {
            (xlib.XSetErrorHandler)(Some(x_error_handler));
        }
        let screen = screen_num as i32;

        let mut overlay_visual_id = 0u64;
        unsafe {
            let mut attrs = std::mem::zeroed::<xlib::XWindowAttributes>();
            if (xlib.XGetWindowAttributes)(display, overlay as c_ulong, &mut attrs) != 0
                && !attrs.visual.is_null()
            {
                overlay_visual_id = (*(attrs.visual)).visualid;
            }
        }

        let (mut major, mut minor) = (0, 0);
        unsafe {
            (glx.glXQueryVersion)(display, &mut major, &mut minor);
        }
        info!("GLX version {}.{}, overlay visual 0x{:x}", major, minor, overlay_visual_id);

        let has_tfp_extension = unsafe {
            let s = (glx.glXQueryExtensionsString)(display, screen);
            !s.is_null()
                && std::ffi::CStr::from_ptr(s)
                    .to_str()
                    .unwrap_or("")
                    .contains("GLX_EXT_texture_from_pixmap")
        };

        let window_attribs = [
            glx::GLX_DRAWABLE_TYPE as i32, glx::GLX_WINDOW_BIT as i32,
            glx::GLX_RENDER_TYPE as i32, glx::GLX_RGBA_BIT as i32,
            glx::GLX_DOUBLEBUFFER as i32, 1,
            glx::GLX_RED_SIZE as i32, 8,
            glx::GLX_GREEN_SIZE as i32, 8,
            glx::GLX_BLUE_SIZE as i32, 8,
            0,
        ];
        let mut num_configs = 0;
        let configs_ptr = unsafe {
            (glx.glXChooseFBConfig)(display, screen, window_attribs.as_ptr(), &mut num_configs)
        };
        if configs_ptr.is_null() || num_configs == 0 {
            unsafe { (xlib.XCloseDisplay)(display) };
            return Err(anyhow::anyhow!("No suitable GLX FBConfig found"));
        }
        let configs = unsafe { std::slice::from_raw_parts(configs_ptr, num_configs as usize) };

        // the overlay's own visual first, like xfwm4
        let config = configs
            .iter()
            .copied()
            .find(|c| {
                let vinfo = unsafe { (glx.glXGetVisualFromFBConfig)(display, *c) };
                if vinfo.is_null() {
                    return false;
                }
                let visual_id = unsafe { (*vinfo).visualid };
                unsafe { (xlib.XFree)(vinfo as *mut _) };
                visual_id == overlay_visual_id
            })
            .unwrap_or(configs[0]);
        unsafe { (xlib.XFree)(configs_ptr as *mut _) };

        let context = unsafe {
            (glx.glXCreateNewContext)(display, config, glx::GLX_RGBA_TYPE as i32, ptr::null_mut(), 1)
        };
        if context.is_null() {
            unsafe { (xlib.XCloseDisplay)(display) };
            return Err(anyhow::anyhow!("glXCreateNewContext failed"));
        }

        let drawable = match Self::make_current_on(&glx, &xlib, display, context, config, overlay, (major, minor)) {
            Some(drawable) => drawable,
            None => {
                error!("All glXMakeCurrent attempts failed for overlay {}", overlay);
                unsafe {
                    (glx.glXDestroyContext)(display, context);
                    (xlib.XCloseDisplay)(display);
                }
                return Err(anyhow::anyhow!("glXMakeCurrent failed"));
            }
        };

        gl::load_with(|symbol| match proc_address(&glx, symbol) {
            Some(f) => f as *const _,
            None => ptr::null(),
        });

        if let Some(swap_interval) = proc_address(&glx, "glXSwapIntervalEXT") {
            let swap_interval: unsafe extern "C" fn(*mut xlib::Display, c_ulong, i32) =
                unsafe { std::mem::transmute(swap_interval) };
            unsafe { swap_interval(display, overlay as c_ulong, 1) };
        }

        let tfp = if has_tfp_extension {
            match (
                proc_address(&glx, "glXBindTexImageEXT"),
                proc_address(&glx, "glXReleaseTexImageEXT"),
            ) {
                (Some(bind), Some(release)) => Some(TfpFns {
                    bind: unsafe { std::mem::transmute::<unsafe extern "C" fn(), TexImageFn>(bind) },
                    release: unsafe { std::mem::transmute::<unsafe extern "C" fn(), TexImageFn>(release) },
                }),
                _ => {
                    warn!("GLX_EXT_texture_from_pixmap advertised but its functions are missing");
                    None
                }
            }
        } else {
            info!("GLX_EXT_texture_from_pixmap not supported");
            None
        };

        let mut ctx = Self {
            glx,
            xlib,
            display,
            context,
            drawable,
            rgb_config: None,
            rgba_config: None,
            tfp,
        };
        if ctx.tfp.is_some() {
            ctx.rgb_config = ctx.choose_pixmap_config(screen, false);
            ctx.rgba_config = ctx.choose_pixmap_config(screen, true);
            if ctx.rgb_config.is_none() && ctx.rgba_config.is_none() {
                warn!("No FBConfig can bind pixmaps, texture from pixmap disabled");
                ctx.tfp = None;
            }
        }
        info!("GLX context created (texture from pixmap: {})", ctx.tfp.is_some());
        Ok(ctx)
    }

    /// Overlay window first, a GLX window on top of it second
    fn make_current_on(
        glx: &Glx,
        xlib: &Xlib,
        display: *mut xlib::Display,
        context: glx::GLXContext,
        config: glx::GLXFBConfig,
        overlay: u32,
        (major, minor): (i32, i32),
    ) -> Option<c_ulong> {
        let made_current = unsafe { (glx.glXMakeCurrent)(display, overlay as c_ulong, context) };
        unsafe { (xlib.XSync)(display, 0) };
        if made_current != 0 {
            return Some(overlay as c_ulong);
        }
        if major < 1 || (major == 1 && minor < 3) {
            return None;
        }
        warn!("Overlay window cannot be made current, creating a GLX window");
        let attribs = [0i32];
        let glx_window = unsafe { (glx.glXCreateWindow)(display, config, overlay as c_ulong, attribs.as_ptr()) };
        unsafe { (xlib.XSync)(display, 0) };
        if glx_window == 0 {
            return None;
        }
        if unsafe { (glx.glXMakeCurrent)(display, glx_window, context) } != 0 {
            return Some(glx_window);
        }
        unsafe { (glx.glXDestroyWindow)(display, glx_window) };
        None
    }

    fn fb_attrib(&self, config: glx::GLXFBConfig, attrib: i32) -> i32 {
        let mut value = 0;
        unsafe {
            (self.glx.glXGetFBConfigAttrib)(self.display, config, attrib, &mut value);
        }
        value
    }

    /// Best config for binding 24-bit (`alpha == false`) or 32-bit pixmaps.
    /// Fewer extra buffers win, like compiz.
    fn choose_pixmap_config(&self, screen: i32, alpha: bool) -> Option<PixmapConfig> {
        let depth = if alpha { 32 } else { 24 };
        let bind_attrib = if alpha { GLX_BIND_TO_TEXTURE_RGBA_EXT } else { GLX_BIND_TO_TEXTURE_RGB_EXT };
        let attribs = [
            glx::GLX_DRAWABLE_TYPE as i32, glx::GLX_PIXMAP_BIT as i32,
            glx::GLX_RENDER_TYPE as i32, glx::GLX_RGBA_BIT as i32,
            bind_attrib, 1,
            0,
        ];
        let mut num_configs = 0;
        let configs_ptr = unsafe {
            (self.glx.glXChooseFBConfig)(self.display, screen, attribs.as_ptr(), &mut num_configs)
        };
        if configs_ptr.is_null() || num_configs == 0 {
            debug!("No pixmap FBConfig for depth {}", depth);
            return None;
        }
        let configs = unsafe { std::slice::from_raw_parts(configs_ptr, num_configs as usize) };

        let best = configs
            .iter()
            .copied()
            .filter(|c| {
                let vinfo = unsafe { (self.glx.glXGetVisualFromFBConfig)(self.display, *c) };
                if vinfo.is_null() {
                    return false;
                }
                let visual_depth = unsafe { (*vinfo).depth };
                unsafe { (self.xlib.XFree)(vinfo as *mut _) };
                visual_depth == depth
            })
            .filter(|c| self.fb_attrib(*c, GLX_BIND_TO_TEXTURE_TARGETS_EXT) & GLX_TEXTURE_2D_BIT_EXT != 0)
            .min_by_key(|c| {
                (
                    self.fb_attrib(*c, glx::GLX_DOUBLEBUFFER as i32),
                    self.fb_attrib(*c, glx::GLX_STENCIL_SIZE as i32),
                    self.fb_attrib(*c, glx::GLX_DEPTH_SIZE as i32),
                )
            })
            .map(|c| PixmapConfig {
                fb_config: c,
                texture_format: if alpha { GLX_TEXTURE_FORMAT_RGBA_EXT } else { GLX_TEXTURE_FORMAT_RGB_EXT },
                y_inverted: self.fb_attrib(c, GLX_Y_INVERTED_EXT) != 0,
            });
        unsafe { (self.xlib.XFree)(configs_ptr as *mut _) };

        if let Some(config) = &best {
            info!("Pixmap FBConfig for depth {}: y_inverted={}", depth, config.y_inverted);
        }
        best
    }

    pub fn supports_tfp(&self) -> bool {
        self.tfp.is_some()
    }

    pub fn swap_buffers(&self) -> Result<()> {
        unsafe {
            (self.glx.glXSwapBuffers)(self.display, self.drawable);
        }
        Ok(())
    }

    pub fn make_current(&self) -> Result<()> {
        let result = unsafe { (self.glx.glXMakeCurrent)(self.display, self.drawable, self.context) };
        if result == 0 {
            return Err(anyhow::anyhow!("glXMakeCurrent failed"));
        }
        Ok(())
    }

    /// Run `f` between two XSyncs and report the first X error it caused
    fn trap_errors<T>(&self, f: impl FnOnce() -> T) -> (T, Option<i32>) {
        unsafe { (self.xlib.XSync)(self.display, 0) };
        X_ERROR_OCCURRED.store(false, Ordering::Relaxed);
        X_ERROR_CODE.store(0, Ordering::Relaxed);
        let value = f();
        unsafe { (self.xlib.XSync)(self.display, 0) };
        let error = X_ERROR_OCCURRED
            .swap(false, Ordering::Relaxed)
            .then(|| X_ERROR_CODE.swap(0, Ordering::Relaxed));
        (value, error)
    }

    /// GLX pixmap for `pixmap`, and whether textures bound from it are
    /// Y-inverted
    pub fn create_glx_pixmap(&self, pixmap: u32, has_alpha: bool) -> Result<(c_ulong, bool), TfpError> {
        let config = if has_alpha { self.rgba_config } else { self.rgb_config }
            .or(self.rgb_config)
            .ok_or(TfpError::Unsupported)?;
        let attribs = [
            GLX_TEXTURE_FORMAT_EXT, config.texture_format,
            GLX_TEXTURE_TARGET_EXT, GLX_TEXTURE_2D_EXT,
            GLX_MIPMAP_TEXTURE_EXT, 0,
            0,
        ];
        let (glx_pixmap, error) = self.trap_errors(|| unsafe {
            (self.glx.glXCreatePixmap)(self.display, config.fb_config, pixmap as c_ulong, attribs.as_ptr())
        });
        if let Some(code) = error {
            if glx_pixmap != 0 {
                self.destroy_glx_pixmap(glx_pixmap);
            }
            return Err(TfpError::XError { drawable: pixmap, code });
        }
        if glx_pixmap == 0 {
            return Err(TfpError::NoImage(pixmap));
        }
        Ok((glx_pixmap, config.y_inverted))
    }

    pub fn destroy_glx_pixmap(&self, glx_pixmap: c_ulong) {
        unsafe {
            (self.glx.glXDestroyPixmap)(self.display, glx_pixmap);
        }
    }

    /// Bind to the texture currently bound to GL_TEXTURE_2D
    pub fn bind_tex_image(&self, glx_pixmap: c_ulong) -> Result<(), TfpError> {
        let tfp = self.tfp.as_ref().ok_or(TfpError::Unsupported)?;
        let ((), error) = self.trap_errors(|| unsafe {
            (self.glx.glXWaitX)();
            (tfp.bind)(self.display, glx_pixmap, GLX_FRONT_LEFT_EXT, ptr::null());
        });
        match error {
            Some(code) => Err(TfpError::XError { drawable: glx_pixmap as u32, code }),
            None => Ok(()),
        }
    }

    pub fn release_tex_image(&self, glx_pixmap: c_ulong) {
        if let Some(tfp) = &self.tfp {
            unsafe {
                (tfp.release)(self.display, glx_pixmap, GLX_FRONT_LEFT_EXT, ptr::null());
            }
        }
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        unsafe {
            (self.glx.glXMakeCurrent)(self.display, 0, ptr::null_mut());
            (self.glx.glXDestroyContext)(self.display, self.context);
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}
