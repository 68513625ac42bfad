//! Texture-from-pixmap
//!
//! A [`TextureFromPixmap`] keeps one pool texture showing the contents of
//! one X drawable. Two strategies sit behind [`TfpService`]:
//!
//! * zero-copy: a [`PixmapBinder`] attaches the pixmap to the texture on the
//!   GPU (EGL image or GLX pixmap); `update()` has little or nothing to do.
//! * software: a [`PixmapReader`] reads the pixmap back over the wire and
//!   every `update()` uploads it again.
//!
//! Which strategy is available is decided once, when the service is built.

pub mod egl;
pub mod glx;
pub mod software;

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use super::texture_pool::SharedPool;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TfpError {
    #[error("no drawable to bind")]
    NoDrawable,
    #[error("could not create an image for drawable 0x{0:x}")]
    NoImage(u32),
    #[error("X error {code} while binding drawable 0x{drawable:x}")]
    XError { drawable: u32, code: i32 },
    #[error("could not read back drawable 0x{0:x}")]
    ReadBack(u32),
    #[error("texture-from-pixmap is not supported")]
    Unsupported,
}

/// GPU-side attachment produced by a [`PixmapBinder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// EGLImage pointer or GLX pixmap id
    pub handle: u64,
    pub inverted: bool,
}

pub trait PixmapBinder {
    fn name(&self) -> &'static str;

    /// Make `texture` show `drawable`
    fn attach(&self, texture: u32, drawable: u32, has_alpha: bool) -> Result<Binding, TfpError>;

    fn detach(&self, texture: u32, binding: Binding);

    /// Pick up new drawable contents for an attached texture
    fn refresh(&self, _texture: u32, _binding: &Binding) -> Result<(), TfpError> {
        Ok(())
    }
}

/// Pixels read back from a drawable, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait PixmapReader {
    fn read(&self, drawable: u32) -> Result<RgbaImage, TfpError>;
}

/// Process-wide texture-from-pixmap state
pub struct TfpService {
    binder: Option<Box<dyn PixmapBinder>>,
    reader: Box<dyn PixmapReader>,
    pool: SharedPool,
}

impl TfpService {
    pub fn new(
        binder: Option<Box<dyn PixmapBinder>>,
        reader: Box<dyn PixmapReader>,
        pool: SharedPool,
    ) -> Rc<Self> {
        match &binder {
            Some(binder) => debug!("Texture-from-pixmap: zero-copy via {}", binder.name()),
            None => debug!("Texture-from-pixmap: software readback"),
        }
        Rc::new(Self { binder, reader, pool })
    }

    pub fn zero_copy(&self) -> bool {
        self.binder.is_some()
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }
}

pub struct TextureFromPixmap {
    service: Rc<TfpService>,
    texture: u32,
    drawable: u32,
    has_alpha: bool,
    valid: bool,
    inverted: bool,
    binding: Option<Binding>,
}

impl TextureFromPixmap {
    pub fn new(service: Rc<TfpService>, has_alpha: bool) -> Self {
        let texture = service.pool.borrow_mut().acquire();
        Self {
            service,
            texture,
            drawable: 0,
            has_alpha,
            valid: false,
            inverted: false,
            binding: None,
        }
    }

    /// Attach `drawable`, replacing whatever was bound before.
    ///
    /// A failed zero-copy attach leaves the texture unbound; the caller
    /// retries on the next damage.
    pub fn bind(&mut self, drawable: u32) -> Result<(), TfpError> {
        if drawable == 0 {
            self.unbind();
            return Err(TfpError::NoDrawable);
        }
        if drawable == self.drawable && self.valid {
            return Ok(());
        }
        self.unbind();
        self.drawable = drawable;

        let service = Rc::clone(&self.service);
        match &service.binder {
            Some(binder) => match binder.attach(self.texture, drawable, self.has_alpha) {
                Ok(binding) => {
                    self.inverted = binding.inverted;
                    self.binding = Some(binding);
                    self.valid = true;
                }
                Err(err) => {
                    warn!("{} bind of 0x{:x} failed: {}", binder.name(), drawable, err);
                    self.drawable = 0;
                    return Err(err);
                }
            },
            None => {
                // readback images are flipped to top-down before upload
                self.inverted = false;
                self.valid = true;
                self.upload()?;
            }
        }
        Ok(())
    }

    pub fn unbind(&mut self) {
        if let (Some(binding), Some(binder)) = (self.binding.take(), &self.service.binder) {
            binder.detach(self.texture, binding);
        }
        if self.drawable != 0 {
            self.service.pool.borrow().api().clear(self.texture);
        }
        self.drawable = 0;
        self.valid = false;
        self.inverted = false;
    }

    /// Bring the texture up to date with the drawable
    pub fn update(&mut self) -> Result<(), TfpError> {
        if !self.valid {
            return Err(TfpError::NoDrawable);
        }
        let service = Rc::clone(&self.service);
        match (&service.binder, self.binding) {
            (Some(binder), Some(binding)) => binder.refresh(self.texture, &binding),
            _ => self.upload(),
        }
    }

    fn upload(&mut self) -> Result<(), TfpError> {
        match self.service.reader.read(self.drawable) {
            Ok(image) => {
                self.service.pool.borrow().api().upload_rgba(
                    self.texture,
                    image.width,
                    image.height,
                    &image.pixels,
                );
                Ok(())
            }
            Err(err) => {
                debug!("Readback of 0x{:x} failed: {}", self.drawable, err);
                self.valid = false;
                Err(err)
            }
        }
    }

    pub fn texture(&self) -> u32 {
        self.texture
    }

    pub fn drawable(&self) -> u32 {
        self.drawable
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn inverted_texture(&self) -> bool {
        self.inverted
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }
}

impl Drop for TextureFromPixmap {
    fn drop(&mut self) {
        self.unbind();
        if self.texture != 0 {
            self.service.pool.borrow_mut().release(self.texture);
        }
    }
}

#[cfg(test)]
pub mod fake {
    //! Binder and reader doubles for the texture tests.

    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    use super::*;

    #[derive(Default)]
    pub struct FakeBinder {
        pub attached: RefCell<HashMap<u32, u32>>,
        pub refreshes: RefCell<usize>,
        pub failing: RefCell<HashSet<u32>>,
        pub inverted: bool,
    }

    impl PixmapBinder for Rc<FakeBinder> {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn attach(&self, texture: u32, drawable: u32, _has_alpha: bool) -> Result<Binding, TfpError> {
            if self.failing.borrow().contains(&drawable) {
                return Err(TfpError::NoImage(drawable));
            }
            self.attached.borrow_mut().insert(texture, drawable);
            Ok(Binding { handle: drawable as u64, inverted: self.inverted })
        }

        fn detach(&self, texture: u32, _binding: Binding) {
            self.attached.borrow_mut().remove(&texture);
        }

        fn refresh(&self, _texture: u32, _binding: &Binding) -> Result<(), TfpError> {
            *self.refreshes.borrow_mut() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeReader {
        pub reads: RefCell<Vec<u32>>,
        pub missing: RefCell<HashSet<u32>>,
    }

    impl PixmapReader for Rc<FakeReader> {
        fn read(&self, drawable: u32) -> Result<RgbaImage, TfpError> {
            self.reads.borrow_mut().push(drawable);
            if self.missing.borrow().contains(&drawable) {
                return Err(TfpError::ReadBack(drawable));
            }
            Ok(RgbaImage { width: 2, height: 2, pixels: vec![0xff; 16] })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::fake::{FakeBinder, FakeReader};
    use super::*;
    use crate::compositor::texture_pool::fake::FakeTextures;
    use crate::compositor::texture_pool::TexturePool;

    struct Setup {
        textures: Rc<FakeTextures>,
        binder: Rc<FakeBinder>,
        reader: Rc<FakeReader>,
        service: Rc<TfpService>,
    }

    fn setup(zero_copy: bool) -> Setup {
        let textures = Rc::new(FakeTextures::default());
        let binder = Rc::new(FakeBinder { inverted: true, ..Default::default() });
        let reader = Rc::new(FakeReader::default());
        let pool = TexturePool::new(textures.clone(), 4, 4).shared();
        let boxed_binder: Option<Box<dyn PixmapBinder>> = if zero_copy {
            Some(Box::new(binder.clone()))
        } else {
            None
        };
        let service = TfpService::new(boxed_binder, Box::new(reader.clone()), pool);
        Setup { textures, binder, reader, service }
    }

    #[test]
    fn test_zero_copy_bind_and_update() {
        let s = setup(true);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        tfp.bind(0x400).unwrap();
        assert!(tfp.is_valid());
        assert!(tfp.inverted_texture());
        assert_eq!(s.binder.attached.borrow().get(&tfp.texture()), Some(&0x400));

        tfp.update().unwrap();
        assert_eq!(*s.binder.refreshes.borrow(), 1);
        assert!(s.reader.reads.borrow().is_empty());
    }

    /// Attaches once and keeps the default `refresh`, like the GLX and EGL binders
    #[derive(Default)]
    struct AttachOnly {
        attaches: RefCell<usize>,
    }

    impl PixmapBinder for Rc<AttachOnly> {
        fn name(&self) -> &'static str {
            "attach-only"
        }

        fn attach(&self, _texture: u32, drawable: u32, _has_alpha: bool) -> Result<Binding, TfpError> {
            *self.attaches.borrow_mut() += 1;
            Ok(Binding { handle: drawable as u64, inverted: true })
        }

        fn detach(&self, _texture: u32, _binding: Binding) {}
    }

    #[test]
    fn test_hardware_update_keeps_binding() {
        let binder = Rc::new(AttachOnly::default());
        let pool = TexturePool::new(Rc::new(FakeTextures::default()), 4, 4).shared();
        let boxed: Box<dyn PixmapBinder> = Box::new(binder.clone());
        let reader = Rc::new(FakeReader::default());
        let service = TfpService::new(Some(boxed), Box::new(reader.clone()), pool);

        let mut tfp = TextureFromPixmap::new(service, false);
        tfp.bind(0x400).unwrap();
        for _ in 0..3 {
            tfp.update().unwrap();
        }
        assert_eq!(*binder.attaches.borrow(), 1);
        assert!(reader.reads.borrow().is_empty());
        assert!(tfp.is_valid());
    }

    #[test]
    fn test_rebind_releases_previous_drawable() {
        let s = setup(true);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        tfp.bind(0x400).unwrap();
        tfp.bind(0x500).unwrap();
        let attached = s.binder.attached.borrow();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached.get(&tfp.texture()), Some(&0x500));
    }

    #[test]
    fn test_bind_same_drawable_is_noop() {
        let s = setup(true);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        tfp.bind(0x400).unwrap();
        tfp.bind(0x400).unwrap();
        assert!(s.textures.cleared.borrow().is_empty());
    }

    #[test]
    fn test_failed_bind_leaves_unbound() {
        let s = setup(true);
        s.binder.failing.borrow_mut().insert(0x400);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), true);
        assert_eq!(tfp.bind(0x400), Err(TfpError::NoImage(0x400)));
        assert!(!tfp.is_valid());
        assert_eq!(tfp.drawable(), 0);
        // no software fallback inside the same call
        assert!(s.reader.reads.borrow().is_empty());

        s.binder.failing.borrow_mut().clear();
        tfp.bind(0x400).unwrap();
        assert!(tfp.is_valid());
    }

    #[test]
    fn test_software_update_reads_every_time() {
        let s = setup(false);
        assert!(!s.service.zero_copy());
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        tfp.bind(0x400).unwrap();
        tfp.update().unwrap();
        tfp.update().unwrap();
        assert_eq!(s.reader.reads.borrow().len(), 3);
        assert_eq!(s.textures.uploads.borrow().len(), 3);
        assert!(!tfp.inverted_texture());
    }

    #[test]
    fn test_software_readback_failure_invalidates() {
        let s = setup(false);
        s.reader.missing.borrow_mut().insert(0x400);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        assert_eq!(tfp.bind(0x400), Err(TfpError::ReadBack(0x400)));
        assert!(!tfp.is_valid());
        assert_eq!(tfp.update(), Err(TfpError::NoDrawable));
    }

    #[test]
    fn test_unbind_then_invalid() {
        let s = setup(true);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        tfp.unbind();
        assert!(!tfp.is_valid());

        tfp.bind(0x400).unwrap();
        tfp.unbind();
        assert!(!tfp.is_valid());
        assert_eq!(tfp.drawable(), 0);
        assert!(s.binder.attached.borrow().is_empty());
        assert_eq!(*s.textures.cleared.borrow(), vec![tfp.texture()]);
    }

    #[test]
    fn test_zero_drawable_is_rejected() {
        let s = setup(true);
        let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
        assert_eq!(tfp.bind(0), Err(TfpError::NoDrawable));
    }

    #[test]
    fn test_drop_returns_texture() {
        let s = setup(true);
        let available = s.service.pool().borrow().available();
        {
            let mut tfp = TextureFromPixmap::new(s.service.clone(), false);
            tfp.bind(0x400).unwrap();
            assert_eq!(s.service.pool().borrow().available(), available - 1);
        }
        assert_eq!(s.service.pool().borrow().available(), available);
        assert!(s.binder.attached.borrow().is_empty());
    }
}
