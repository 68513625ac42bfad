//! EGL context on the composite overlay window.
//!
//! libEGL is opened at runtime so the compositor still starts (on GLX or the
//! software path) on systems without it. Window pixmaps are imported as
//! EGLImages through EGL_KHR_image_pixmap.

use std::ffi::{c_char, c_void, CStr, CString};
use std::os::raw::c_ulong;
use std::ptr;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11_dl::xlib::{self, Xlib};

use super::tfp::TfpError;

pub type EGLDisplay = *mut c_void;
pub type EGLConfig = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLContext = *mut c_void;
pub type EGLImageKHR = *mut c_void;

const EGL_NONE: i32 = 0x3038;
const EGL_ALPHA_SIZE: i32 = 0x3021;
const EGL_BLUE_SIZE: i32 = 0x3022;
const EGL_GREEN_SIZE: i32 = 0x3023;
const EGL_RED_SIZE: i32 = 0x3024;
const EGL_SURFACE_TYPE: i32 = 0x3033;
const EGL_RENDERABLE_TYPE: i32 = 0x3040;
const EGL_EXTENSIONS: i32 = 0x3055;
const EGL_WINDOW_BIT: i32 = 0x0004;
const EGL_OPENGL_BIT: i32 = 0x0008;
const EGL_OPENGL_API: u32 = 0x30A2;
const EGL_NATIVE_PIXMAP_KHR: u32 = 0x30B0;
const EGL_IMAGE_PRESERVED_KHR: i32 = 0x30D2;
const EGL_TRUE: i32 = 1;

/// Declares a struct of function pointers resolved from a shared library
macro_rules! dynamic_library(
    ($structname: ident, $($name: ident: $proto: ty),+) => (
        pub struct $structname {
            handle: *mut c_void,
            $(pub $name: $proto),+
        }

        impl $structname {
            pub fn open(name: &str) -> Option<$structname> {
                let cname = CString::new(name).ok()?;
                unsafe {
                    let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW);
                    if handle.is_null() {
                        debug!("dlopen of {} failed", name);
                        return None;
                    }
                    libc::dlerror();
                    let lib = $structname {
                        handle,
                        $($name: {
                            let symbol_name = concat!(stringify!($name), "\0");
                            let symbol = libc::dlsym(handle, symbol_name.as_ptr() as *const c_char);
                            if symbol.is_null() || !libc::dlerror().is_null() {
                                warn!("Symbol {} missing from {}", stringify!($name), name);
                                libc::dlclose(handle);
                                return None;
                            }
                            std::mem::transmute::<*mut c_void, $proto>(symbol)
                        }),+
                    };
                    Some(lib)
                }
            }
        }

        impl Drop for $structname {
            fn drop(&mut self) {
                unsafe {
                    libc::dlclose(self.handle);
                }
            }
        }
    )
);

dynamic_library!(EglLibrary,
    eglGetDisplay: unsafe extern "C" fn(*mut c_void) -> EGLDisplay,
    eglInitialize: unsafe extern "C" fn(EGLDisplay, *mut i32, *mut i32) -> u32,
    eglTerminate: unsafe extern "C" fn(EGLDisplay) -> u32,
    eglQueryString: unsafe extern "C" fn(EGLDisplay, i32) -> *const c_char,
    eglChooseConfig: unsafe extern "C" fn(EGLDisplay, *const i32, *mut EGLConfig, i32, *mut i32) -> u32,
    eglCreateWindowSurface: unsafe extern "C" fn(EGLDisplay, EGLConfig, c_ulong, *const i32) -> EGLSurface,
    eglDestroySurface: unsafe extern "C" fn(EGLDisplay, EGLSurface) -> u32,
    eglBindAPI: unsafe extern "C" fn(u32) -> u32,
    eglCreateContext: unsafe extern "C" fn(EGLDisplay, EGLConfig, EGLContext, *const i32) -> EGLContext,
    eglDestroyContext: unsafe extern "C" fn(EGLDisplay, EGLContext) -> u32,
    eglMakeCurrent: unsafe extern "C" fn(EGLDisplay, EGLSurface, EGLSurface, EGLContext) -> u32,
    eglSwapBuffers: unsafe extern "C" fn(EGLDisplay, EGLSurface) -> u32,
    eglGetError: unsafe extern "C" fn() -> i32,
    eglGetProcAddress: unsafe extern "C" fn(*const c_char) -> *mut c_void
);

type CreateImageFn =
    unsafe extern "C" fn(EGLDisplay, EGLContext, u32, *mut c_void, *const i32) -> EGLImageKHR;
type DestroyImageFn = unsafe extern "C" fn(EGLDisplay, EGLImageKHR) -> u32;
type ImageTargetTextureFn = unsafe extern "C" fn(u32, EGLImageKHR);

struct ImageFns {
    create: CreateImageFn,
    destroy: DestroyImageFn,
    target_texture: ImageTargetTextureFn,
}

pub struct EglContext {
    lib: EglLibrary,
    xlib: Xlib,
    x_display: *mut xlib::Display,
    display: EGLDisplay,
    surface: EGLSurface,
    context: EGLContext,
    image: Option<ImageFns>,
}

impl EglContext {
    pub fn new(overlay: u32) -> Result<Self> {
        let lib = EglLibrary::open("libEGL.so.1").context("Failed to load libEGL")?;
        let xlib = Xlib::open().context("Failed to load libX11")?;

        let display_name = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into());
        let display_cstr = CString::new(display_name)?;
        let x_display = unsafe { (xlib.XOpenDisplay)(display_cstr.as_ptr()) };
        if x_display.is_null() {
            return Err(anyhow::anyhow!("Failed to open X11 display"));
        }

        // from here on Drop cleans up whatever has been created
        let mut ctx = Self {
            lib,
            xlib,
            x_display,
            display: ptr::null_mut(),
            surface: ptr::null_mut(),
            context: ptr::null_mut(),
            image: None,
        };
        ctx.init(overlay)?;
        Ok(ctx)
    }

    fn init(&mut self, overlay: u32) -> Result<()> {
        let lib = &self.lib;
        unsafe {
            self.display = (lib.eglGetDisplay)(self.x_display as *mut c_void);
            if self.display.is_null() {
                return Err(anyhow::anyhow!("eglGetDisplay failed"));
            }
            let (mut major, mut minor) = (0, 0);
            if (lib.eglInitialize)(self.display, &mut major, &mut minor) == 0 {
                self.display = ptr::null_mut();
                return Err(anyhow::anyhow!("eglInitialize failed: 0x{:x}", (lib.eglGetError)()));
            }
            info!("EGL version {}.{}", major, minor);

            let attribs = [
                EGL_SURFACE_TYPE, EGL_WINDOW_BIT,
                EGL_RENDERABLE_TYPE, EGL_OPENGL_BIT,
                EGL_RED_SIZE, 8,
                EGL_GREEN_SIZE, 8,
                EGL_BLUE_SIZE, 8,
                EGL_ALPHA_SIZE, 0,
                EGL_NONE,
            ];
            let mut config: EGLConfig = ptr::null_mut();
            let mut num_configs = 0;
            if (lib.eglChooseConfig)(self.display, attribs.as_ptr(), &mut config, 1, &mut num_configs) == 0
                || num_configs == 0
            {
                return Err(anyhow::anyhow!("No suitable EGL config"));
            }

            if (lib.eglBindAPI)(EGL_OPENGL_API) == 0 {
                return Err(anyhow::anyhow!("eglBindAPI(OpenGL) failed"));
            }
            let none = [EGL_NONE];
            self.surface = (lib.eglCreateWindowSurface)(self.display, config, overlay as c_ulong, none.as_ptr());
            if self.surface.is_null() {
                return Err(anyhow::anyhow!("eglCreateWindowSurface failed: 0x{:x}", (lib.eglGetError)()));
            }
            self.context = (lib.eglCreateContext)(self.display, config, ptr::null_mut(), none.as_ptr());
            if self.context.is_null() {
                return Err(anyhow::anyhow!("eglCreateContext failed: 0x{:x}", (lib.eglGetError)()));
            }
        }
        self.make_current()?;

        gl::load_with(|symbol| self.proc_address(symbol) as *const _);
        self.image = self.load_image_fns();
        info!("EGL context created (pixmap images: {})", self.image.is_some());
        Ok(())
    }

    fn proc_address(&self, name: &str) -> *mut c_void {
        match CString::new(name) {
            Ok(name) => unsafe { (self.lib.eglGetProcAddress)(name.as_ptr()) },
            Err(_) => ptr::null_mut(),
        }
    }

    fn extensions(&self) -> String {
        unsafe {
            let s = (self.lib.eglQueryString)(self.display, EGL_EXTENSIONS);
            if s.is_null() {
                return String::new();
            }
            CStr::from_ptr(s).to_string_lossy().into_owned()
        }
    }

    fn load_image_fns(&self) -> Option<ImageFns> {
        if !self.extensions().contains("EGL_KHR_image_pixmap") {
            info!("EGL_KHR_image_pixmap not supported");
            return None;
        }
        let create = self.proc_address("eglCreateImageKHR");
        let destroy = self.proc_address("eglDestroyImageKHR");
        let target = self.proc_address("glEGLImageTargetTexture2DOES");
        if create.is_null() || destroy.is_null() || target.is_null() {
            warn!("EGL image entry points missing");
            return None;
        }
        unsafe {
            Some(ImageFns {
                create: std::mem::transmute::<*mut c_void, CreateImageFn>(create),
                destroy: std::mem::transmute::<*mut c_void, DestroyImageFn>(destroy),
                target_texture: std::mem::transmute::<*mut c_void, ImageTargetTextureFn>(target),
            })
        }
    }

    pub fn supports_pixmap_images(&self) -> bool {
        self.image.is_some()
    }

    pub fn make_current(&self) -> Result<()> {
        let ok = unsafe { (self.lib.eglMakeCurrent)(self.display, self.surface, self.surface, self.context) };
        if ok == 0 {
            return Err(anyhow::anyhow!("eglMakeCurrent failed"));
        }
        Ok(())
    }

    pub fn swap_buffers(&self) -> Result<()> {
        let ok = unsafe { (self.lib.eglSwapBuffers)(self.display, self.surface) };
        if ok == 0 {
            return Err(anyhow::anyhow!("eglSwapBuffers failed"));
        }
        Ok(())
    }

    /// Import `pixmap` as an image whose contents follow the pixmap
    pub fn create_image(&self, pixmap: u32) -> Result<EGLImageKHR, TfpError> {
        let fns = self.image.as_ref().ok_or(TfpError::Unsupported)?;
        let attribs = [EGL_IMAGE_PRESERVED_KHR, EGL_TRUE, EGL_NONE];
        let image = unsafe {
            (fns.create)(
                self.display,
                ptr::null_mut(),
                EGL_NATIVE_PIXMAP_KHR,
                pixmap as usize as *mut c_void,
                attribs.as_ptr(),
            )
        };
        if image.is_null() {
            let code = unsafe { (self.lib.eglGetError)() };
            debug!("eglCreateImageKHR failed for pixmap 0x{:x}: 0x{:x}", pixmap, code);
            return Err(TfpError::NoImage(pixmap));
        }
        Ok(image)
    }

    /// Back the texture bound to GL_TEXTURE_2D with `image`
    pub fn target_texture(&self, image: EGLImageKHR) {
        if let Some(fns) = &self.image {
            unsafe { (fns.target_texture)(gl::TEXTURE_2D, image) };
        }
    }

    pub fn destroy_image(&self, image: EGLImageKHR) {
        if let Some(fns) = &self.image {
            unsafe { (fns.destroy)(self.display, image) };
        }
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        unsafe {
            if !self.display.is_null() {
                (self.lib.eglMakeCurrent)(self.display, ptr::null_mut(), ptr::null_mut(), ptr::null_mut());
                if !self.context.is_null() {
                    (self.lib.eglDestroyContext)(self.display, self.context);
                }
                if !self.surface.is_null() {
                    (self.lib.eglDestroySurface)(self.display, self.surface);
                }
                (self.lib.eglTerminate)(self.display);
            }
            (self.xlib.XCloseDisplay)(self.x_display);
        }
    }
}
