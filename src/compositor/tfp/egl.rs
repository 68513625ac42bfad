//! EGL_KHR_image_pixmap binder
//!
//! The image keeps following the pixmap, so there is nothing to refresh.

use std::ffi::c_void;
use std::rc::Rc;

use tracing::trace;

use super::{Binding, PixmapBinder, TfpError};
use crate::compositor::egl::EglContext;

pub struct EglBinder {
    ctx: Rc<EglContext>,
}

impl EglBinder {
    pub fn new(ctx: Rc<EglContext>) -> Option<Self> {
        ctx.supports_pixmap_images().then_some(Self { ctx })
    }
}

impl PixmapBinder for EglBinder {
    fn name(&self) -> &'static str {
        "EGL"
    }

    fn attach(&self, texture: u32, drawable: u32, _has_alpha: bool) -> Result<Binding, TfpError> {
        let image = self.ctx.create_image(drawable)?;
        unsafe { gl::BindTexture(gl::TEXTURE_2D, texture) };
        self.ctx.target_texture(image);
        unsafe { gl::BindTexture(gl::TEXTURE_2D, 0) };
        trace!("EGL image for 0x{:x} attached to texture {}", drawable, texture);
        // pixmap images come out with the origin at the top
        Ok(Binding { handle: image as usize as u64, inverted: true })
    }

    fn detach(&self, _texture: u32, binding: Binding) {
        self.ctx.destroy_image(binding.handle as usize as *mut c_void);
    }
}
