//! Interned atoms
//!
//! Every atom the property cache and the compositor look at. All intern
//! requests are sent before the first reply is read, so startup costs one
//! round trip instead of one per atom.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

macro_rules! atoms {
    ($($field:ident => $name:literal,)*) => {
        /// Holds all interned atoms
        #[derive(Debug, Clone)]
        pub struct Atoms {
            $(pub $field: Atom,)*
        }

        impl Atoms {
            pub fn new<C: Connection>(conn: &C) -> Result<Self> {
                $(
                    let $field = conn
                        .intern_atom(false, $name.as_bytes())
                        .with_context(|| format!("Failed to send intern request for {}", $name))?;
                )*
                Ok(Self {
                    $(
                        $field: $field
                            .reply()
                            .with_context(|| format!("Failed to intern {}", $name))?
                            .atom,
                    )*
                })
            }

            /// Distinct fake atom values, for tests that never talk to a server
            #[cfg(test)]
            pub fn sequential() -> Self {
                let mut next: Atom = 1000;
                $(
                    next += 1;
                    let $field = next;
                )*
                Self { $($field,)* }
            }
        }
    };
}

atoms! {
    wm_protocols => "WM_PROTOCOLS",
    wm_delete_window => "WM_DELETE_WINDOW",
    wm_take_focus => "WM_TAKE_FOCUS",
    wm_transient_for => "WM_TRANSIENT_FOR",
    wm_hints => "WM_HINTS",
    wm_state => "WM_STATE",
    wm_name => "WM_NAME",

    net_wm_window_type => "_NET_WM_WINDOW_TYPE",
    net_wm_window_type_desktop => "_NET_WM_WINDOW_TYPE_DESKTOP",
    net_wm_window_type_normal => "_NET_WM_WINDOW_TYPE_NORMAL",
    net_wm_window_type_dock => "_NET_WM_WINDOW_TYPE_DOCK",
    net_wm_window_type_input => "_NET_WM_WINDOW_TYPE_INPUT",
    net_wm_window_type_notification => "_NET_WM_WINDOW_TYPE_NOTIFICATION",
    net_wm_window_type_dialog => "_NET_WM_WINDOW_TYPE_DIALOG",
    net_wm_window_type_menu => "_NET_WM_WINDOW_TYPE_MENU",
    kde_net_wm_window_type_override => "_KDE_NET_WM_WINDOW_TYPE_OVERRIDE",
    meegotouch_net_wm_window_type_sheet => "_MEEGOTOUCH_NET_WM_WINDOW_TYPE_SHEET",

    net_wm_state => "_NET_WM_STATE",
    net_wm_state_above => "_NET_WM_STATE_ABOVE",
    net_wm_state_skip_taskbar => "_NET_WM_STATE_SKIP_TASKBAR",
    net_wm_state_fullscreen => "_NET_WM_STATE_FULLSCREEN",
    net_wm_state_modal => "_NET_WM_STATE_MODAL",
    net_wm_icon_geometry => "_NET_WM_ICON_GEOMETRY",
    net_wm_pid => "_NET_WM_PID",

    meegotouch_decorator_window => "_MEEGOTOUCH_DECORATOR_WINDOW",
    meegotouch_decorator_buttons => "_MEEGOTOUCH_DECORATOR_BUTTONS",
    meegotouch_global_alpha => "_MEEGOTOUCH_GLOBAL_ALPHA",
    meegotouch_video_alpha => "_MEEGOTOUCH_VIDEO_ALPHA",
    meego_stacking_layer => "_MEEGO_STACKING_LAYER",
    meegotouch_always_mapped => "_MEEGOTOUCH_ALWAYS_MAPPED",
    meegotouch_desktop_view => "_MEEGOTOUCH_DESKTOP_VIEW",
    meegotouch_cannot_minimize => "_MEEGOTOUCH_CANNOT_MINIMIZE",
    meegotouch_mstatusbar_geometry => "_MEEGOTOUCH_MSTATUSBAR_GEOMETRY",
    meegotouch_custom_region => "_MEEGOTOUCH_CUSTOM_REGION",
    meegotouch_orientation_angle => "_MEEGOTOUCH_ORIENTATION_ANGLE",
    meegotouch_wm_invoked_by => "_MEEGOTOUCH_WM_INVOKED_BY",
    meego_low_power_mode => "_MEEGO_LOW_POWER_MODE",
    meegotouch_opaque_window => "_MEEGOTOUCH_OPAQUE_WINDOW",
    meegotouch_prestarted => "_MEEGOTOUCH_PRESTARTED",
    meegotouch_no_animations => "_MEEGOTOUCH_NO_ANIMATIONS",
    mcompositor_skip_taskbar => "_MCOMPOSITOR_SKIP_TASKBAR",
    omap_video_overlay => "_OMAP_VIDEO_OVERLAY",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_atoms_are_distinct() {
        let atoms = Atoms::sequential();
        let sample = [
            atoms.wm_protocols,
            atoms.net_wm_window_type_dialog,
            atoms.kde_net_wm_window_type_override,
            atoms.omap_video_overlay,
        ];
        for (i, a) in sample.iter().enumerate() {
            for b in &sample[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
