//! Composited windows and their stacking order

use std::collections::HashMap;

use tracing::debug;

use super::pixmap_item::TexturePixmapItem;
use super::renderer::DrawItem;
use crate::anim::{AnimationTarget, AnimationType, FinalState};
use crate::shared::{Geometry, PointF, RectF};

/// Scene state of one managed window
pub struct CompositeWindow {
    pub window: u32,
    pub geometry: Geometry,
    pub position: PointF,
    pub scale: f64,
    pub opacity: f64,
    pub visible: bool,
    pub iconified: bool,
    pub z_override: Option<i32>,
    pub crop: Option<RectF>,
    pub item: Option<TexturePixmapItem>,
}

impl CompositeWindow {
    pub fn new(window: u32, geometry: Geometry) -> Self {
        Self {
            window,
            geometry,
            position: PointF::new(geometry.x as f64, geometry.y as f64),
            scale: 1.0,
            opacity: 1.0,
            visible: false,
            iconified: false,
            z_override: None,
            crop: None,
            item: None,
        }
    }

    /// Screen rectangle after position and scale
    pub fn scene_rect(&self) -> RectF {
        RectF::new(
            self.position.x,
            self.position.y,
            self.geometry.width as f64 * self.scale,
            self.geometry.height as f64 * self.scale,
        )
    }

    fn crop_top(&self) -> f64 {
        match self.crop {
            Some(crop) if crop.y <= 0.0 => ((crop.y + crop.height) * self.scale).max(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Default)]
pub struct Scene {
    windows: HashMap<u32, CompositeWindow>,
    /// Bottom to top
    stacking: Vec<u32>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `window` on top of the stack; no-op if known
    pub fn add(&mut self, window: u32, geometry: Geometry) -> &mut CompositeWindow {
        if !self.windows.contains_key(&window) {
            self.stacking.push(window);
        }
        self.windows
            .entry(window)
            .or_insert_with(|| CompositeWindow::new(window, geometry))
    }

    pub fn remove(&mut self, window: u32) -> Option<CompositeWindow> {
        self.stacking.retain(|w| *w != window);
        self.windows.remove(&window)
    }

    pub fn get(&self, window: u32) -> Option<&CompositeWindow> {
        self.windows.get(&window)
    }

    pub fn get_mut(&mut self, window: u32) -> Option<&mut CompositeWindow> {
        self.windows.get_mut(&window)
    }

    pub fn contains(&self, window: u32) -> bool {
        self.windows.contains_key(&window)
    }

    pub fn windows_mut(&mut self) -> impl Iterator<Item = &mut CompositeWindow> {
        self.windows.values_mut()
    }

    /// Move `window` to the top of the stacking order
    pub fn raise(&mut self, window: u32) {
        if let Some(index) = self.stacking.iter().position(|w| *w == window) {
            let window = self.stacking.remove(index);
            self.stacking.push(window);
        }
    }

    /// Replace the stacking order; unknown ids are dropped and missing
    /// windows keep their relative order at the bottom
    pub fn restack(&mut self, order: &[u32]) {
        let mut stacking: Vec<u32> = self
            .stacking
            .iter()
            .copied()
            .filter(|w| !order.contains(w))
            .collect();
        stacking.extend(order.iter().copied().filter(|w| self.windows.contains_key(w)));
        self.stacking = stacking;
    }

    pub fn stacking(&self) -> &[u32] {
        &self.stacking
    }

    /// Visible, textured windows ordered for drawing
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items: Vec<DrawItem> = self
            .stacking
            .iter()
            .enumerate()
            .filter_map(|(index, window)| {
                let cw = self.windows.get(window)?;
                let item = cw.item.as_ref()?;
                if !cw.visible || !item.is_valid() {
                    return None;
                }
                Some(DrawItem {
                    window: cw.window,
                    texture: item.texture(),
                    rect: cw.scene_rect(),
                    opacity: cw.opacity as f32,
                    inverted: item.inverted_texture(),
                    crop_top: cw.crop_top(),
                    z: cw.z_override.unwrap_or(index as i32),
                })
            })
            .collect();
        items.sort_by_key(|item| item.z);
        items
    }
}

impl AnimationTarget for Scene {
    fn stacking_len(&self) -> usize {
        self.stacking.len()
    }

    fn set_position(&mut self, window: u32, position: PointF) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.position = position;
        }
    }

    fn set_scale(&mut self, window: u32, scale: f64) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.scale = scale;
        }
    }

    fn set_opacity(&mut self, window: u32, opacity: f64) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.opacity = opacity;
        }
    }

    fn set_visible(&mut self, window: u32, visible: bool) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.visible = visible;
        }
    }

    fn set_z_override(&mut self, window: u32, z: Option<i32>) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.z_override = z;
        }
    }

    fn set_crop(&mut self, window: u32, crop: Option<RectF>) {
        if let Some(cw) = self.windows.get_mut(&window) {
            cw.crop = crop;
        }
    }

    fn finalize_state(&mut self, window: u32, kind: AnimationType) -> FinalState {
        let Some(cw) = self.windows.get_mut(&window) else {
            return FinalState::Closed;
        };
        let state = match kind {
            AnimationType::Iconify => {
                cw.iconified = true;
                cw.visible = false;
                FinalState::Iconified
            }
            AnimationType::Closing => {
                cw.visible = false;
                FinalState::Closed
            }
            _ => {
                cw.iconified = false;
                cw.visible = true;
                FinalState::Restored
            }
        };
        debug!("Window 0x{:x} {:?}", window, state);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new(10, 20, 100, 50)
    }

    #[test]
    fn test_scene_rect_applies_scale() {
        let mut cw = CompositeWindow::new(1, geometry());
        assert_eq!(cw.scene_rect(), RectF::new(10.0, 20.0, 100.0, 50.0));
        cw.scale = 0.5;
        assert_eq!(cw.scene_rect(), RectF::new(10.0, 20.0, 50.0, 25.0));
    }

    #[test]
    fn test_stacking_operations() {
        let mut scene = Scene::new();
        scene.add(1, geometry());
        scene.add(2, geometry());
        scene.add(3, geometry());
        scene.add(1, geometry());
        assert_eq!(scene.stacking(), &[1, 2, 3]);

        scene.raise(1);
        assert_eq!(scene.stacking(), &[2, 3, 1]);

        scene.restack(&[1, 2, 99]);
        assert_eq!(scene.stacking(), &[3, 1, 2]);

        scene.remove(1);
        assert_eq!(scene.stacking(), &[3, 2]);
        assert_eq!(scene.stacking_len(), 2);
    }

    #[test]
    fn test_finalize_iconify_hides() {
        let mut scene = Scene::new();
        scene.add(1, geometry()).visible = true;
        assert_eq!(scene.finalize_state(1, AnimationType::Iconify), FinalState::Iconified);
        let cw = scene.get(1).unwrap();
        assert!(!cw.visible);
        assert!(cw.iconified);

        assert_eq!(scene.finalize_state(1, AnimationType::Restore), FinalState::Restored);
        let cw = scene.get(1).unwrap();
        assert!(cw.visible);
        assert!(!cw.iconified);
    }

    #[test]
    fn test_finalize_close_and_unknown() {
        let mut scene = Scene::new();
        scene.add(1, geometry()).visible = true;
        assert_eq!(scene.finalize_state(1, AnimationType::Closing), FinalState::Closed);
        assert!(!scene.get(1).unwrap().visible);
        assert_eq!(scene.finalize_state(42, AnimationType::Showing), FinalState::Closed);
    }

    #[test]
    fn test_untextured_windows_are_not_drawn() {
        let mut scene = Scene::new();
        scene.add(1, geometry()).visible = true;
        assert!(scene.draw_list().is_empty());
    }

    #[test]
    fn test_crop_is_scaled() {
        let mut cw = CompositeWindow::new(1, geometry());
        cw.crop = Some(RectF::new(0.0, 0.0, 100.0, 10.0));
        cw.scale = 0.5;
        assert_eq!(cw.crop_top(), 5.0);
        cw.crop = Some(RectF::new(0.0, 30.0, 100.0, 10.0));
        assert_eq!(cw.crop_top(), 0.0);
    }
}
