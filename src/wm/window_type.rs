//! Window type classification
//!
//! Maps the `_NET_WM_WINDOW_TYPE` atom list of a window onto the closed set
//! of types the compositor distinguishes.

use x11rb::protocol::xproto::Atom;

use crate::wm::atoms::Atoms;

/// Window type as seen by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowType {
    #[default]
    Invalid,
    Desktop,
    Normal,
    Dialog,
    Sheet,
    NoDecorDialog,
    Frameless,
    Dock,
    Input,
    Above,
    Notification,
    Decorator,
    Unknown,
}

impl WindowType {
    /// Classify from the window's type atoms.
    ///
    /// Only the first atom decides the type; the rest of the list is
    /// consulted for the override and sheet modifiers. `is_transient` is
    /// only evaluated for unrecognised first atoms.
    pub fn classify(type_atoms: &[Atom], atoms: &Atoms, is_transient: impl FnOnce() -> bool) -> Self {
        let Some(&first) = type_atoms.first() else {
            return WindowType::Normal;
        };
        let listed = |atom: Atom| type_atoms.contains(&atom);

        if first == atoms.net_wm_window_type_desktop {
            WindowType::Desktop
        } else if first == atoms.net_wm_window_type_normal {
            WindowType::Normal
        } else if first == atoms.net_wm_window_type_dialog {
            if listed(atoms.kde_net_wm_window_type_override) {
                WindowType::NoDecorDialog
            } else {
                WindowType::Dialog
            }
        } else if first == atoms.net_wm_window_type_dock {
            WindowType::Dock
        } else if first == atoms.net_wm_window_type_input {
            WindowType::Input
        } else if first == atoms.net_wm_window_type_notification {
            WindowType::Notification
        } else if first == atoms.kde_net_wm_window_type_override
            || first == atoms.net_wm_window_type_menu
        {
            if listed(atoms.meegotouch_net_wm_window_type_sheet) {
                WindowType::Sheet
            } else {
                WindowType::Frameless
            }
        } else if is_transient() {
            WindowType::Unknown
        } else {
            WindowType::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_with_override_has_no_decorations() {
        let atoms = Atoms::sequential();
        let list = [atoms.net_wm_window_type_dialog, atoms.kde_net_wm_window_type_override];
        assert_eq!(WindowType::classify(&list, &atoms, || false), WindowType::NoDecorDialog);
        assert_eq!(
            WindowType::classify(&list[..1], &atoms, || false),
            WindowType::Dialog
        );
    }

    #[test]
    fn test_override_and_menu_become_sheet_or_frameless() {
        let atoms = Atoms::sequential();
        let sheet = [atoms.kde_net_wm_window_type_override, atoms.meegotouch_net_wm_window_type_sheet];
        assert_eq!(WindowType::classify(&sheet, &atoms, || false), WindowType::Sheet);
        let menu = [atoms.net_wm_window_type_menu];
        assert_eq!(WindowType::classify(&menu, &atoms, || false), WindowType::Frameless);
    }

    #[test]
    fn test_unknown_type_depends_on_transient() {
        let atoms = Atoms::sequential();
        let list = [4242];
        assert_eq!(WindowType::classify(&list, &atoms, || true), WindowType::Unknown);
        assert_eq!(WindowType::classify(&list, &atoms, || false), WindowType::Normal);
    }

    #[test]
    fn test_empty_list_is_normal() {
        let atoms = Atoms::sequential();
        assert_eq!(WindowType::classify(&[], &atoms, || true), WindowType::Normal);
    }

    #[test]
    fn test_only_first_atom_decides() {
        let atoms = Atoms::sequential();
        let list = [atoms.net_wm_window_type_dock, atoms.net_wm_window_type_dialog];
        assert_eq!(WindowType::classify(&list, &atoms, || false), WindowType::Dock);
    }
}
