//! GLX_EXT_texture_from_pixmap binder

use std::os::raw::c_ulong;
use std::rc::Rc;

use tracing::trace;

use super::{Binding, PixmapBinder, TfpError};
use crate::compositor::gl_context::GlContext;

pub struct GlxBinder {
    ctx: Rc<GlContext>,
}

impl GlxBinder {
    /// `None` when the context lacks texture-from-pixmap
    pub fn new(ctx: Rc<GlContext>) -> Option<Self> {
        ctx.supports_tfp().then_some(Self { ctx })
    }

    fn bind_texture(&self, texture: u32, glx_pixmap: c_ulong) -> Result<(), TfpError> {
        unsafe { gl::BindTexture(gl::TEXTURE_2D, texture) };
        let result = self.ctx.bind_tex_image(glx_pixmap);
        unsafe { gl::BindTexture(gl::TEXTURE_2D, 0) };
        result
    }
}

impl PixmapBinder for GlxBinder {
    fn name(&self) -> &'static str {
        "GLX"
    }

    fn attach(&self, texture: u32, drawable: u32, has_alpha: bool) -> Result<Binding, TfpError> {
        let (glx_pixmap, inverted) = self.ctx.create_glx_pixmap(drawable, has_alpha)?;
        if let Err(err) = self.bind_texture(texture, glx_pixmap) {
            self.ctx.destroy_glx_pixmap(glx_pixmap);
            return Err(err);
        }
        trace!("GLX pixmap 0x{:x} bound to texture {}", glx_pixmap, texture);
        Ok(Binding { handle: glx_pixmap as u64, inverted })
    }

    // no refresh: a bound GLX pixmap tracks the drawable until it is re-bound
    fn detach(&self, texture: u32, binding: Binding) {
        let glx_pixmap = binding.handle as c_ulong;
        unsafe { gl::BindTexture(gl::TEXTURE_2D, texture) };
        self.ctx.release_tex_image(glx_pixmap);
        unsafe { gl::BindTexture(gl::TEXTURE_2D, 0) };
        self.ctx.destroy_glx_pixmap(glx_pixmap);
    }
}
