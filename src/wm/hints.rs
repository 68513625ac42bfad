//! Hints Module
//!
//! WM_HINTS decoding (XWMHints equivalent).

use bitflags::bitflags;
use x11rb::protocol::xproto::Window;

bitflags! {
    /// WM_HINTS flags field
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WmHintsFlags: u32 {
        const INPUT         = 1 << 0;
        const STATE         = 1 << 1;
        const ICON_PIXMAP   = 1 << 2;
        const ICON_WINDOW   = 1 << 3;
        const ICON_POSITION = 1 << 4;
        const ICON_MASK     = 1 << 5;
        const WINDOW_GROUP  = 1 << 6;
        const URGENCY       = 1 << 8;
    }
}

/// Number of 32-bit fields in a complete WM_HINTS property
pub const WM_HINTS_LEN: usize = 9;

/// WM hints (XWMHints equivalent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WmHints {
    pub flags: WmHintsFlags,
    pub input: bool,
    pub initial_state: u32,
    pub icon_pixmap: u32,
    pub icon_window: Window,
    pub icon_x: i32,
    pub icon_y: i32,
    pub icon_mask: u32,
    pub window_group: Window,
}

impl WmHints {
    /// Decode the property value. Short properties decode to `None`.
    pub fn parse(values: &[u32]) -> Option<Self> {
        if values.len() < WM_HINTS_LEN {
            return None;
        }
        Some(Self {
            flags: WmHintsFlags::from_bits_retain(values[0]),
            input: values[1] != 0,
            initial_state: values[2],
            icon_pixmap: values[3],
            icon_window: values[4],
            icon_x: values[5] as i32,
            icon_y: values[6] as i32,
            icon_mask: values[7],
            window_group: values[8],
        })
    }

    /// False only when the client set InputHint and asked for no input
    pub fn wants_focus(&self) -> bool {
        !(self.flags.contains(WmHintsFlags::INPUT) && !self.input)
    }

    pub fn window_group(&self) -> Option<Window> {
        self.flags
            .contains(WmHintsFlags::WINDOW_GROUP)
            .then_some(self.window_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hints_are_rejected() {
        assert_eq!(WmHints::parse(&[1, 0, 0]), None);
    }

    #[test]
    fn test_input_hint_controls_focus() {
        let hints = WmHints::parse(&[1, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(!hints.wants_focus());
        let hints = WmHints::parse(&[0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(hints.wants_focus());
        assert!(WmHints::default().wants_focus());
    }

    #[test]
    fn test_window_group_requires_flag() {
        let hints = WmHints::parse(&[1 << 6, 1, 0, 0, 0, 0, 0, 0, 77]).unwrap();
        assert_eq!(hints.window_group(), Some(77));
        let hints = WmHints::parse(&[0, 1, 0, 0, 0, 0, 0, 0, 77]).unwrap();
        assert_eq!(hints.window_group(), None);
    }
}
