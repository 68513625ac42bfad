//! Shared pool of GL texture names
//!
//! Names are generated in batches and recycled. A released texture is
//! cleared to an empty image before it goes back on the free list, so a
//! recycled name never shows stale window content.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

/// The GL calls the texture code needs
pub trait TextureApi {
    fn generate(&self, count: usize) -> Vec<u32>;
    fn delete(&self, textures: &[u32]);
    /// Linear filtering, clamped edges
    fn configure(&self, texture: u32);
    /// Replace the contents with a 0x0 image
    fn clear(&self, texture: u32);
    fn upload_rgba(&self, texture: u32, width: u32, height: u32, pixels: &[u8]);
}

/// [`TextureApi`] on the current GL context
pub struct GlTextures;

impl TextureApi for GlTextures {
    fn generate(&self, count: usize) -> Vec<u32> {
        let mut names = vec![0u32; count];
        unsafe {
            gl::GenTextures(count as i32, names.as_mut_ptr());
        }
        names
    }

    fn delete(&self, textures: &[u32]) {
        if textures.is_empty() {
            return;
        }
        unsafe {
            gl::DeleteTextures(textures.len() as i32, textures.as_ptr());
        }
    }

    fn configure(&self, texture: u32) {
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn clear(&self, texture: u32) {
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                0,
                0,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn upload_rgba(&self, texture: u32, width: u32, height: u32, pixels: &[u8]) {
        if pixels.len() < (width as usize) * (height as usize) * 4 {
            warn!("Short pixel buffer for texture {} ({}x{})", texture, width, height);
            return;
        }
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 4);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                width as i32,
                height as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const _,
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }
}

pub struct TexturePool {
    api: Rc<dyn TextureApi>,
    free: Vec<u32>,
    in_use: HashSet<u32>,
    growth: usize,
}

pub type SharedPool = Rc<RefCell<TexturePool>>;

impl TexturePool {
    pub fn new(api: Rc<dyn TextureApi>, initial: usize, growth: usize) -> Self {
        let mut pool = Self {
            api,
            free: Vec::new(),
            in_use: HashSet::new(),
            growth: growth.max(1),
        };
        pool.grow(initial);
        pool
    }

    pub fn shared(self) -> SharedPool {
        Rc::new(RefCell::new(self))
    }

    fn grow(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let names = self.api.generate(count);
        for texture in &names {
            self.api.configure(*texture);
        }
        debug!("Texture pool grew by {}", names.len());
        // popped from the back, so keep generation order
        self.free.extend(names.into_iter().rev());
    }

    /// Hand out a texture name, growing the pool when it is empty
    pub fn acquire(&mut self) -> u32 {
        if self.free.is_empty() {
            self.grow(self.growth);
        }
        let Some(texture) = self.free.pop() else {
            warn!("Texture pool is empty after growing");
            return 0;
        };
        self.in_use.insert(texture);
        texture
    }

    pub fn release(&mut self, texture: u32) {
        if !self.in_use.remove(&texture) {
            warn!("Texture {} released twice or never acquired", texture);
            return;
        }
        self.api.clear(texture);
        self.free.push(texture);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    pub fn api(&self) -> Rc<dyn TextureApi> {
        Rc::clone(&self.api)
    }
}

impl Drop for TexturePool {
    fn drop(&mut self) {
        let mut all: Vec<u32> = self.free.drain(..).collect();
        all.extend(self.in_use.drain());
        self.api.delete(&all);
    }
}

#[cfg(test)]
pub mod fake {
    //! Texture API that records calls instead of talking to GL.

    use std::cell::RefCell;

    use super::TextureApi;

    #[derive(Default)]
    pub struct FakeTextures {
        next: RefCell<u32>,
        pub generated: RefCell<usize>,
        pub deleted: RefCell<Vec<u32>>,
        pub cleared: RefCell<Vec<u32>>,
        pub uploads: RefCell<Vec<(u32, u32, u32)>>,
    }

    impl TextureApi for FakeTextures {
        fn generate(&self, count: usize) -> Vec<u32> {
            let mut next = self.next.borrow_mut();
            *self.generated.borrow_mut() += count;
            (0..count)
                .map(|_| {
                    *next += 1;
                    *next
                })
                .collect()
        }

        fn delete(&self, textures: &[u32]) {
            self.deleted.borrow_mut().extend_from_slice(textures);
        }

        fn configure(&self, _texture: u32) {}

        fn clear(&self, texture: u32) {
            self.cleared.borrow_mut().push(texture);
        }

        fn upload_rgba(&self, texture: u32, width: u32, height: u32, _pixels: &[u8]) {
            self.uploads.borrow_mut().push((texture, width, height));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTextures;
    use super::*;

    #[test]
    fn test_pool_grows_in_batches() {
        let api = Rc::new(FakeTextures::default());
        let mut pool = TexturePool::new(api.clone(), 20, 10);
        assert_eq!(pool.available(), 20);

        let taken: Vec<u32> = (0..21).map(|_| pool.acquire()).collect();
        assert_eq!(taken[0], 1);
        assert_eq!(*api.generated.borrow(), 30);
        assert_eq!(pool.available(), 9);
        assert_eq!(pool.in_use(), 21);
    }

    #[test]
    fn test_release_clears_and_recycles() {
        let api = Rc::new(FakeTextures::default());
        let mut pool = TexturePool::new(api.clone(), 2, 10);
        let texture = pool.acquire();
        pool.release(texture);
        assert_eq!(*api.cleared.borrow(), vec![texture]);
        assert_eq!(pool.acquire(), texture);
    }

    #[test]
    fn test_double_release_is_ignored() {
        let api = Rc::new(FakeTextures::default());
        let mut pool = TexturePool::new(api.clone(), 2, 10);
        let texture = pool.acquire();
        pool.release(texture);
        pool.release(texture);
        assert_eq!(api.cleared.borrow().len(), 1);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_drop_deletes_everything() {
        let api = Rc::new(FakeTextures::default());
        {
            let mut pool = TexturePool::new(api.clone(), 3, 10);
            pool.acquire();
        }
        let mut deleted = api.deleted.borrow().clone();
        deleted.sort();
        assert_eq!(deleted, vec![1, 2, 3]);
    }
}
