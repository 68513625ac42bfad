//! Readback fallback: GetImage the whole pixmap and convert it for upload

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat};
use x11rb::rust_connection::RustConnection;

use super::{PixmapReader, RgbaImage, TfpError};

pub struct X11PixmapReader {
    conn: Arc<RustConnection>,
}

impl X11PixmapReader {
    pub fn new(conn: Arc<RustConnection>) -> Self {
        Self { conn }
    }

    fn fetch(&self, drawable: u32) -> Result<RgbaImage> {
        let geometry = self.conn.get_geometry(drawable)?.reply()?;
        let (width, height) = (geometry.width as u32, geometry.height as u32);
        let image = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, drawable, 0, 0, geometry.width, geometry.height, !0)?
            .reply()?;
        let pixels = bgra_to_rgba_flipped(&image.data, width, height, image.depth)
            .with_context(|| format!("unexpected {} bit image layout", image.depth))?;
        Ok(RgbaImage { width, height, pixels })
    }
}

impl PixmapReader for X11PixmapReader {
    fn read(&self, drawable: u32) -> std::result::Result<RgbaImage, TfpError> {
        self.fetch(drawable).map_err(|err| {
            debug!("GetImage on 0x{:x}: {:#}", drawable, err);
            TfpError::ReadBack(drawable)
        })
    }
}

/// Convert a 32 bpp ZPixmap (BGRA in memory) into bottom-up RGBA rows.
///
/// Depth 24 images carry garbage in the pad byte, so alpha is forced opaque.
pub fn bgra_to_rgba_flipped(data: &[u8], width: u32, height: u32, depth: u8) -> Option<Vec<u8>> {
    if depth != 24 && depth != 32 {
        return None;
    }
    let texels: &[[u8; 4]] = bytemuck::try_cast_slice(data).ok()?;
    let (width, height) = (width as usize, height as usize);
    if texels.len() < width * height {
        return None;
    }
    let mut out = Vec::with_capacity(width * height * 4);
    for row in texels[..width * height].chunks_exact(width.max(1)).rev() {
        for &[b, g, r, a] in row {
            let a = if depth == 32 { a } else { 0xff };
            out.extend_from_slice(&[r, g, b, a]);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swizzle_and_flip() {
        // 1x2: top pixel blue, bottom pixel red
        let data = [0xff, 0, 0, 0x80, 0, 0, 0xff, 0x40];
        let out = bgra_to_rgba_flipped(&data, 1, 2, 32).unwrap();
        assert_eq!(out, vec![0xff, 0, 0, 0x40, 0, 0, 0xff, 0x80]);
    }

    #[test]
    fn test_depth_24_is_opaque() {
        let data = [1, 2, 3, 0];
        let out = bgra_to_rgba_flipped(&data, 1, 1, 24).unwrap();
        assert_eq!(out, vec![3, 2, 1, 0xff]);
    }

    #[test]
    fn test_rejects_short_or_odd_buffers() {
        assert!(bgra_to_rgba_flipped(&[0; 4], 2, 1, 32).is_none());
        assert!(bgra_to_rgba_flipped(&[0; 5], 1, 1, 32).is_none());
        assert!(bgra_to_rgba_flipped(&[0; 4], 1, 1, 16).is_none());
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(bgra_to_rgba_flipped(&[], 0, 0, 32), Some(Vec::new()));
    }
}
