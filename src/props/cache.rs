//! Window property cache
//!
//! One cache per tracked window. Every property the compositor cares about
//! is requested up front without waiting for the reply; accessors collect
//! the reply the first time they are called after a request and return the
//! cached value afterwards. An invalid cache (window vanished before we saw
//! its attributes, or the dummy placeholder) answers every accessor with a
//! default and never touches the wire.
//!
//! Relationships to other windows (transient parents) are reported as
//! [`CacheSignal`]s and applied by the registry, which owns all caches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use super::collector::{Collector, CollectorKey};
use super::pict::PictFormats;
use super::wire::{Cookie, PropertyReply, Reply, SharedWire, WindowAttributes};
use crate::shared::{Geometry, RectF, Region};
use crate::wm::atoms::Atoms;
use crate::wm::hints::{WmHints, WmHintsFlags};
use crate::wm::window_type::WindowType;

/// ICCCM WM_STATE values
pub const WITHDRAWN_STATE: i32 = 0;
pub const NORMAL_STATE: i32 = 1;
pub const ICONIC_STATE: i32 = 3;

const MAX_PROTOCOLS: u32 = 100;
const MAX_NET_WM_STATES: u32 = 100;
const MAX_NAME_LONGS: u32 = 100;
const CUSTOM_REGION_LONGS: u32 = 10 * 4;
const DECORATOR_BUTTON_LONGS: u32 = 8;
const DOCK_ALWAYS_MAPPED: i32 = 1000;
const MAX_STACKING_LAYER: u32 = 10;

/// Things a cache reports to whoever owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSignal {
    /// `child` resolved its WM_TRANSIENT_FOR to `parent`
    TransientResolved { child: Window, parent: Window },
    /// `child` is no longer transient for `parent`
    TransientUnlinked { child: Window, parent: Window },
    /// Stacking needs to be evaluated again
    StackingDirty,
    AlwaysMappedChanged(Window),
    DesktopViewChanged(Window),
    CustomRegionChanged(Window),
    IconGeometryUpdated(Window),
    DecoratorButtonsChanged(Window),
}

impl CacheSignal {
    /// Whether the owner has to re-check the global stacking order
    pub fn affects_stacking(&self) -> bool {
        matches!(self, CacheSignal::StackingDirty | CacheSignal::AlwaysMappedChanged(_))
    }
}

/// Shared services every cache needs
#[derive(Clone)]
pub struct CacheHandles {
    pub wire: SharedWire,
    pub atoms: Arc<Atoms>,
    pub pict: Arc<PictFormats>,
    pub collect_interval: Duration,
    pub max_type_atoms: u32,
}

/// What the caller already knows about the window
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheSeed {
    pub attributes: Option<WindowAttributes>,
    pub geometry: Option<Geometry>,
}

/// Home and close button rectangles published by the decorator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoratorButtons {
    pub home: Geometry,
    pub close: Geometry,
}

enum RequestSpec {
    Property { property: Atom, type_: Atom, long_length: u32 },
    Geometry,
    Shape,
}

pub struct WindowPropertyCache {
    window: Window,
    valid: bool,
    handles: CacheHandles,
    collector: Collector,
    attrs: WindowAttributes,
    being_mapped: bool,

    real_geom: Geometry,
    is_decorator: bool,
    transient_for: Option<Window>,
    invoked_by: Option<Window>,
    transients: Vec<Window>,
    stacking_layer: u32,
    low_power_mode: u32,
    opaque_window: u32,
    prestarted: bool,
    type_atoms: Vec<Atom>,
    window_type: WindowType,
    orientation_angle: u32,
    status_bar_geometry: Geometry,
    protocols: Vec<Atom>,
    window_state: i32,
    wm_hints: WmHints,
    icon_geometry: RectF,
    global_alpha: u8,
    video_global_alpha: u8,
    shape_region: Region,
    net_wm_state: Vec<Atom>,
    always_mapped: i32,
    cannot_minimize: i32,
    desktop_view: i32,
    custom_region: Region,
    wm_name: String,
    pid: u32,
    no_animations: u32,
    video_overlay: i32,
    skipping_taskbar_marker: bool,
    force_skipping_taskbar: bool,
    was_skipping_taskbar: bool,
    decorator_buttons: DecoratorButtons,
    has_alpha: Option<bool>,
    dont_iconify: bool,

    signals: Vec<CacheSignal>,
}

/// A single CARD32 (or WINDOW) value, exactly four bytes long
fn exactly_one_u32(reply: &PropertyReply) -> Option<u32> {
    if reply.byte_len() != 4 {
        return None;
    }
    reply.value32().first().copied()
}

impl WindowPropertyCache {
    /// Start tracking `window`. Attributes not supplied in `seed` are
    /// queried synchronously; if that fails the cache is invalid.
    pub fn new(window: Window, handles: CacheHandles, seed: CacheSeed) -> Self {
        let attrs = seed
            .attributes
            .or_else(|| handles.wire.window_attributes(window));
        let mut cache = Self::blank(window, handles);
        let Some(attrs) = attrs else {
            debug!("Window {} has no attributes, caching it as invalid", window);
            return cache;
        };
        cache.valid = true;
        cache.attrs = attrs;

        if let Some(geometry) = seed.geometry {
            cache.real_geom = geometry;
            cache.collector.mark_up_to_date(CollectorKey::RealGeometry);
        }

        if !attrs.viewable {
            // property changes that happen before we map the window
            cache.handles.wire.select_property_input(window);
        }

        cache.handles.pict.request(cache.handles.wire.as_ref());

        use CollectorKey::*;
        if seed.geometry.is_none() {
            cache.request(RealGeometry);
        }
        for key in [
            IsDecorator,
            TransientFor,
            InvokedBy,
            StackingLayer,
            LowPowerMode,
            OpaqueWindow,
            Prestarted,
            WindowTypeAtom,
            OrientationAngle,
            StatusBarGeometry,
            SupportedProtocols,
            WindowState,
            WmHints,
            IconGeometry,
            GlobalAlpha,
            VideoGlobalAlpha,
        ] {
            cache.request(key);
        }
        if !attrs.input_only {
            cache.request(ShapeRegion);
        }
        for key in [
            NetWmState,
            AlwaysMapped,
            CannotMinimize,
            WmName,
            Pid,
            NoAnimations,
            VideoOverlay,
            SkipTaskbarMarker,
            DecoratorButtons,
        ] {
            cache.request(key);
        }
        trace!("Window {}: initial property requests sent", window);
        cache
    }

    /// The placeholder used where no real window exists
    pub fn invalid(handles: CacheHandles) -> Self {
        Self::blank(0, handles)
    }

    fn blank(window: Window, handles: CacheHandles) -> Self {
        let normal = handles.atoms.net_wm_window_type_normal;
        let collector = Collector::new(handles.collect_interval);
        Self {
            window,
            valid: false,
            handles,
            collector,
            attrs: WindowAttributes::default(),
            being_mapped: false,
            real_geom: Geometry::default(),
            is_decorator: false,
            transient_for: None,
            invoked_by: None,
            transients: Vec::new(),
            stacking_layer: 0,
            low_power_mode: 0,
            opaque_window: 0,
            prestarted: false,
            type_atoms: vec![normal],
            window_type: WindowType::Invalid,
            orientation_angle: 0,
            status_bar_geometry: Geometry::default(),
            protocols: Vec::new(),
            window_state: -1,
            wm_hints: WmHints::default(),
            icon_geometry: RectF::default(),
            global_alpha: 255,
            video_global_alpha: 255,
            shape_region: Region::new(),
            net_wm_state: Vec::new(),
            always_mapped: 0,
            cannot_minimize: 0,
            desktop_view: -1,
            custom_region: Region::new(),
            wm_name: String::new(),
            pid: 0,
            no_animations: 0,
            video_overlay: 0,
            skipping_taskbar_marker: false,
            force_skipping_taskbar: false,
            was_skipping_taskbar: false,
            decorator_buttons: DecoratorButtons::default(),
            has_alpha: None,
            dont_iconify: false,
            signals: Vec::new(),
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    // ---- request bookkeeping -------------------------------------------

    fn request_spec(&self, key: CollectorKey) -> RequestSpec {
        use CollectorKey::*;
        let a = &self.handles.atoms;
        let cardinal = Atom::from(AtomEnum::CARDINAL);
        let prop = |property: Atom, type_: Atom, long_length: u32| RequestSpec::Property {
            property,
            type_,
            long_length,
        };
        match key {
            RealGeometry => RequestSpec::Geometry,
            ShapeRegion => RequestSpec::Shape,
            IsDecorator => prop(a.meegotouch_decorator_window, cardinal, 1),
            TransientFor => prop(a.wm_transient_for, AtomEnum::WINDOW.into(), 1),
            InvokedBy => prop(a.meegotouch_wm_invoked_by, AtomEnum::WINDOW.into(), 1),
            StackingLayer => prop(a.meego_stacking_layer, cardinal, 1),
            LowPowerMode => prop(a.meego_low_power_mode, cardinal, 1),
            OpaqueWindow => prop(a.meegotouch_opaque_window, cardinal, 1),
            Prestarted => prop(a.meegotouch_prestarted, cardinal, 1),
            WindowTypeAtom => prop(a.net_wm_window_type, AtomEnum::ATOM.into(), self.handles.max_type_atoms),
            OrientationAngle => prop(a.meegotouch_orientation_angle, cardinal, 1),
            StatusBarGeometry => prop(a.meegotouch_mstatusbar_geometry, cardinal, 4),
            SupportedProtocols => prop(a.wm_protocols, AtomEnum::ATOM.into(), MAX_PROTOCOLS),
            WindowState => prop(a.wm_state, a.wm_state, 1),
            WmHints => prop(a.wm_hints, AtomEnum::WM_HINTS.into(), 10),
            IconGeometry => prop(a.net_wm_icon_geometry, cardinal, 4),
            GlobalAlpha => prop(a.meegotouch_global_alpha, cardinal, 1),
            VideoGlobalAlpha => prop(a.meegotouch_video_alpha, cardinal, 1),
            NetWmState => prop(a.net_wm_state, AtomEnum::ATOM.into(), MAX_NET_WM_STATES),
            AlwaysMapped => prop(a.meegotouch_always_mapped, cardinal, 1),
            CannotMinimize => prop(a.meegotouch_cannot_minimize, cardinal, 1),
            DesktopView => prop(a.meegotouch_desktop_view, cardinal, 1),
            CustomRegion => prop(a.meegotouch_custom_region, cardinal, CUSTOM_REGION_LONGS),
            WmName => prop(a.wm_name, AtomEnum::STRING.into(), MAX_NAME_LONGS),
            Pid => prop(a.net_wm_pid, cardinal, 1),
            NoAnimations => prop(a.meegotouch_no_animations, cardinal, 1),
            VideoOverlay => prop(a.omap_video_overlay, AtomEnum::INTEGER.into(), 1),
            SkipTaskbarMarker => prop(a.mcompositor_skip_taskbar, cardinal, 1),
            DecoratorButtons => prop(a.meegotouch_decorator_buttons, cardinal, DECORATOR_BUTTON_LONGS),
        }
    }

    fn issue(&self, key: CollectorKey) -> Option<Cookie> {
        let wire = &self.handles.wire;
        match self.request_spec(key) {
            RequestSpec::Property { property, type_, long_length } => {
                wire.request_property(self.window, property, type_, long_length)
            }
            RequestSpec::Geometry => wire.request_geometry(self.window),
            RequestSpec::Shape => wire.request_shape(self.window),
        }
    }

    /// Ask for `key` unless a request for it is already in flight
    pub fn request(&mut self, key: CollectorKey) {
        if !self.valid || self.collector.is_pending(key) {
            return;
        }
        self.refresh(key);
    }

    /// Drop any in-flight reply for `key` and ask again, so that a reply
    /// sent before a property change can never overwrite what follows it
    pub fn refresh(&mut self, key: CollectorKey) {
        if !self.valid {
            return;
        }
        if let Some(cookie) = self.issue(key) {
            if let Some(stale) = self.collector.add(key, cookie, Instant::now()) {
                self.handles.wire.discard(stale);
            }
        }
    }

    /// Stop waiting for `key` without blocking
    pub fn cancel(&mut self, key: CollectorKey) {
        if let Some(cookie) = self.collector.cancel(key) {
            self.handles.wire.discard(cookie);
        }
    }

    pub fn cancel_all(&mut self) {
        for key in CollectorKey::ALL {
            self.cancel(key);
        }
    }

    pub fn is_up_to_date(&self, key: CollectorKey) -> bool {
        self.collector.is_up_to_date(key)
    }

    /// Next time the batch collector should run for this window
    pub fn collect_deadline(&self) -> Option<Instant> {
        self.collector.deadline()
    }

    /// Resolve every reply still in flight
    pub fn collect_pending(&mut self) {
        for key in self.collector.pending_keys() {
            self.resolve(key);
        }
        self.collector.clear_deadline();
    }

    fn resolve(&mut self, key: CollectorKey) {
        use CollectorKey::*;
        match key {
            RealGeometry => {
                self.real_geometry();
            }
            IsDecorator => {
                self.is_decorator();
            }
            TransientFor => {
                self.transient_for();
            }
            InvokedBy => {
                self.invoked_by();
            }
            StackingLayer => {
                self.stacking_layer();
            }
            LowPowerMode => {
                self.low_power_mode();
            }
            OpaqueWindow => {
                self.opaque_window();
            }
            Prestarted => {
                self.prestarted();
            }
            WindowTypeAtom => {
                self.window_type_atom();
            }
            OrientationAngle => {
                self.orientation_angle();
            }
            StatusBarGeometry => {
                self.status_bar_geometry();
            }
            SupportedProtocols => {
                self.supported_protocols();
            }
            WindowState => {
                self.window_state();
            }
            WmHints => {
                self.wm_hints();
            }
            IconGeometry => {
                self.icon_geometry();
            }
            GlobalAlpha => {
                self.global_alpha();
            }
            VideoGlobalAlpha => {
                self.video_global_alpha();
            }
            ShapeRegion => {
                self.shape_region();
            }
            NetWmState => {
                self.net_wm_state();
            }
            AlwaysMapped => {
                self.always_mapped();
            }
            CannotMinimize => {
                self.cannot_minimize();
            }
            DesktopView => {
                self.desktop_view();
            }
            CustomRegion => {
                self.custom_region();
            }
            WmName => {
                self.wm_name();
            }
            Pid => {
                self.pid();
            }
            NoAnimations => {
                self.no_animations();
            }
            VideoOverlay => {
                self.video_overlay();
            }
            SkipTaskbarMarker => {
                self.skipping_taskbar_marker();
            }
            DecoratorButtons => {
                self.decorator_buttons();
            }
        }
    }

    /// `None` when nothing is pending for `key`, otherwise the reply
    /// (`Some(None)` if the request failed)
    fn collect(&mut self, key: CollectorKey) -> Option<Option<Reply>> {
        if !self.valid {
            return None;
        }
        let cookie = self.collector.take(key)?;
        Some(self.handles.wire.fetch(cookie))
    }

    fn collect_property(&mut self, key: CollectorKey) -> Option<Option<PropertyReply>> {
        self.collect(key).map(|reply| match reply {
            Some(Reply::Property(p)) => Some(p),
            _ => None,
        })
    }

    /// A collected CARD32. A missing or malformed property reads as 0, so a
    /// deleted property clears the value it had before.
    fn collect_card32(&mut self, key: CollectorKey) -> Option<u32> {
        let reply = self.collect_property(key)?;
        Some(reply.as_ref().and_then(exactly_one_u32).unwrap_or(0))
    }

    fn collect_value32(&mut self, key: CollectorKey) -> Option<Option<Vec<u32>>> {
        self.collect_property(key)
            .map(|reply| reply.map(|p| p.value32()))
    }

    pub(crate) fn take_signals(&mut self) -> Vec<CacheSignal> {
        std::mem::take(&mut self.signals)
    }

    pub fn transients(&self) -> &[Window] {
        &self.transients
    }

    pub(crate) fn add_transient(&mut self, child: Window) {
        if !self.transients.contains(&child) {
            self.transients.push(child);
        }
    }

    pub(crate) fn remove_transient(&mut self, child: Window) {
        self.transients.retain(|w| *w != child);
    }

    /// Parent recorded by the last resolved WM_TRANSIENT_FOR, without
    /// collecting a pending reply
    pub(crate) fn resolved_transient_for(&self) -> Option<Window> {
        if self.collector.is_up_to_date(CollectorKey::TransientFor) {
            self.transient_for
        } else {
            None
        }
    }

    // ---- attributes ----------------------------------------------------

    pub fn is_mapped(&self) -> bool {
        self.valid && self.attrs.viewable
    }

    pub fn set_is_mapped(&mut self, mapped: bool) {
        self.attrs.viewable = mapped;
        if mapped {
            self.being_mapped = false;
        }
    }

    pub fn being_mapped(&self) -> bool {
        self.being_mapped
    }

    pub fn set_being_mapped(&mut self, being_mapped: bool) {
        self.being_mapped = being_mapped;
    }

    pub fn is_input_only(&self) -> bool {
        self.valid && self.attrs.input_only
    }

    pub fn is_override_redirect(&self) -> bool {
        self.valid && self.attrs.override_redirect
    }

    /// Whether the window's visual has an alpha channel, resolved once
    pub fn has_alpha(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        if let Some(alpha) = self.has_alpha {
            return alpha;
        }
        let alpha = self
            .handles
            .pict
            .visual_has_alpha(self.handles.wire.as_ref(), self.attrs.visual);
        self.has_alpha = Some(alpha);
        alpha
    }

    pub fn has_alpha_and_is_not_opaque(&mut self) -> bool {
        self.has_alpha() && self.opaque_window() == 0
    }

    // ---- geometry ------------------------------------------------------

    pub fn real_geometry(&mut self) -> Geometry {
        if let Some(Some(Reply::Geometry(g))) = self.collect(CollectorKey::RealGeometry) {
            self.real_geom = g;
        }
        self.real_geom
    }

    /// Geometry known from a ConfigureNotify; no need to wait for GetGeometry
    pub fn set_real_geometry(&mut self, rect: Geometry) {
        if !self.valid {
            return;
        }
        self.cancel(CollectorKey::RealGeometry);
        self.real_geom = rect;

        // a default shape tracks the geometry and gets no ShapeNotify
        if !self.collector.is_up_to_date(CollectorKey::ShapeRegion)
            || Region::from_rect(rect.at_origin()) != self.shape_region
        {
            self.shape_refresh();
        }
    }

    /// Bounding shape relative to the window origin.
    ///
    /// Input-only windows and windows whose shape was never asked for get
    /// the full window rectangle, as does an empty or failed shape reply.
    pub fn shape_region(&mut self) -> &Region {
        let key = CollectorKey::ShapeRegion;
        if self.collector.is_up_to_date(key) {
            return &self.shape_region;
        }
        if self.attrs.input_only || !self.collector.is_requested(key) {
            self.cancel(key);
            self.shape_region = Region::from_rect(self.real_geometry().at_origin());
            return &self.shape_region;
        }
        let region = match self.collect(key).flatten() {
            Some(Reply::Rectangles(rects)) => Region::from_rects(rects),
            _ => Region::new(),
        };
        self.shape_region = if region.is_empty() {
            Region::from_rect(self.real_geometry().at_origin())
        } else {
            region
        };
        &self.shape_region
    }

    pub fn shape_refresh(&mut self) {
        self.refresh(CollectorKey::ShapeRegion);
    }

    pub fn status_bar_geometry(&mut self) -> Geometry {
        if let Some(values) = self.collect_value32(CollectorKey::StatusBarGeometry) {
            self.status_bar_geometry = match values.as_deref() {
                Some(v) if v.len() == 4 => Geometry::from_cardinals(v).unwrap_or_default(),
                _ => Geometry::default(),
            };
        }
        self.status_bar_geometry
    }

    pub fn icon_geometry(&mut self) -> RectF {
        if let Some(values) = self.collect_value32(CollectorKey::IconGeometry) {
            self.icon_geometry = values
                .as_deref()
                .and_then(Geometry::from_cardinals)
                .map(Geometry::to_rectf)
                .unwrap_or_default();
        }
        self.icon_geometry
    }

    pub fn decorator_buttons(&mut self) -> DecoratorButtons {
        if let Some(values) = self.collect_value32(CollectorKey::DecoratorButtons) {
            self.decorator_buttons = match values.as_deref() {
                Some(v) if v.len() >= DECORATOR_BUTTON_LONGS as usize => DecoratorButtons {
                    home: Geometry::from_cardinals(&v[0..4]).unwrap_or_default(),
                    close: Geometry::from_cardinals(&v[4..8]).unwrap_or_default(),
                },
                _ => DecoratorButtons::default(),
            };
        }
        self.decorator_buttons
    }

    /// Requested on first use; later changes only arrive as signals
    pub fn custom_region(&mut self) -> &Region {
        let key = CollectorKey::CustomRegion;
        if self.valid && !self.collector.is_requested(key) {
            self.refresh(key);
        }
        if let Some(values) = self.collect_value32(key) {
            let values = values.unwrap_or_default();
            self.custom_region = Region::from_rects(
                values
                    .chunks_exact(4)
                    .filter_map(Geometry::from_cardinals),
            );
        }
        &self.custom_region
    }

    pub fn request_custom_region(&mut self) {
        self.refresh(CollectorKey::CustomRegion);
    }

    // ---- relationships -------------------------------------------------

    /// WM_TRANSIENT_FOR. A window naming itself counts as not transient.
    pub fn transient_for(&mut self) -> Option<Window> {
        if let Some(reply) = self.collect_property(CollectorKey::TransientFor) {
            let parent = reply
                .as_ref()
                .and_then(exactly_one_u32)
                .filter(|w| *w != 0 && *w != self.window);
            self.transient_for = parent;
            if let Some(parent) = parent {
                self.signals.push(CacheSignal::TransientResolved {
                    child: self.window,
                    parent,
                });
                self.signals.push(CacheSignal::StackingDirty);
            }
        }
        self.transient_for
    }

    pub fn invoked_by(&mut self) -> Option<Window> {
        if let Some(reply) = self.collect_property(CollectorKey::InvokedBy) {
            self.invoked_by = reply.as_ref().and_then(exactly_one_u32).filter(|w| *w != 0);
        }
        self.invoked_by
    }

    pub fn is_decorator(&mut self) -> bool {
        if let Some(v) = self.collect_card32(CollectorKey::IsDecorator) {
            self.is_decorator = v != 0;
        }
        self.is_decorator
    }

    // ---- type ----------------------------------------------------------

    pub fn window_type_atom(&mut self) -> Atom {
        if !self.valid {
            return AtomEnum::NONE.into();
        }
        let normal = self.handles.atoms.net_wm_window_type_normal;
        if let Some(values) = self.collect_value32(CollectorKey::WindowTypeAtom) {
            self.type_atoms = values.unwrap_or_default();
            if self.type_atoms.is_empty() {
                self.type_atoms.push(normal);
            }
        }
        self.type_atoms.first().copied().unwrap_or(normal)
    }

    pub fn window_type(&mut self) -> WindowType {
        if !self.valid {
            return WindowType::Invalid;
        }
        if self.window_type != WindowType::Invalid {
            return self.window_type;
        }
        self.window_type_atom();
        let atoms = Arc::clone(&self.handles.atoms);
        let type_atoms = self.type_atoms.clone();
        let window_type = WindowType::classify(&type_atoms, &atoms, || self.transient_for().is_some());
        self.window_type = window_type;
        window_type
    }

    // ---- simple cardinals ----------------------------------------------

    /// `_MEEGO_STACKING_LAYER`, at most 10
    pub fn stacking_layer(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::StackingLayer) {
            self.stacking_layer = v.min(MAX_STACKING_LAYER);
        }
        self.stacking_layer
    }

    pub fn low_power_mode(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::LowPowerMode) {
            self.low_power_mode = v;
        }
        self.low_power_mode
    }

    pub fn opaque_window(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::OpaqueWindow) {
            self.opaque_window = v;
        }
        self.opaque_window
    }

    pub fn orientation_angle(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::OrientationAngle) {
            self.orientation_angle = v;
        }
        self.orientation_angle
    }

    /// 0..=255; an unset property is fully opaque
    pub fn global_alpha(&mut self) -> u8 {
        if let Some(v) = self.collect_card32(CollectorKey::GlobalAlpha) {
            self.global_alpha = if v == 0 { 255 } else { (v >> 24) as u8 };
        }
        self.global_alpha
    }

    pub fn video_global_alpha(&mut self) -> u8 {
        if let Some(v) = self.collect_card32(CollectorKey::VideoGlobalAlpha) {
            self.video_global_alpha = if v == 0 { 255 } else { (v >> 24) as u8 };
        }
        self.video_global_alpha
    }

    /// Docks are always mapped unless they say otherwise
    pub fn always_mapped(&mut self) -> i32 {
        if let Some(v) = self.collect_card32(CollectorKey::AlwaysMapped) {
            self.always_mapped = v as i32;
            if self.always_mapped == 0 && self.window_type() == WindowType::Dock {
                self.always_mapped = DOCK_ALWAYS_MAPPED;
            }
        }
        self.always_mapped
    }

    pub fn cannot_minimize(&mut self) -> i32 {
        if let Some(v) = self.collect_card32(CollectorKey::CannotMinimize) {
            self.cannot_minimize = v as i32;
        }
        self.cannot_minimize
    }

    /// Requested on first use, and again on every call while unset
    pub fn desktop_view(&mut self) -> i32 {
        let key = CollectorKey::DesktopView;
        if self.valid && !self.collector.is_requested(key) {
            self.refresh(key);
        }
        if let Some(reply) = self.collect_property(key) {
            self.desktop_view = reply
                .as_ref()
                .and_then(exactly_one_u32)
                .map(|v| v as i32)
                .unwrap_or(-1);
            if self.desktop_view < 0 {
                self.collector.reset(key);
            }
        }
        self.desktop_view
    }

    pub fn request_desktop_view(&mut self) {
        self.refresh(CollectorKey::DesktopView);
    }

    pub fn pid(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::Pid) {
            self.pid = v;
        }
        self.pid
    }

    pub fn no_animations(&mut self) -> u32 {
        if let Some(v) = self.collect_card32(CollectorKey::NoAnimations) {
            self.no_animations = v;
        }
        self.no_animations
    }

    /// `_OMAP_VIDEO_OVERLAY` is a single 8-bit integer
    pub fn video_overlay(&mut self) -> i32 {
        if let Some(reply) = self.collect_property(CollectorKey::VideoOverlay) {
            self.video_overlay = match reply {
                Some(p) if p.byte_len() == 1 => p.value[0] as i8 as i32,
                _ => 0,
            };
        }
        self.video_overlay
    }

    /// Prestarted applications mark themselves with an 8-bit property
    pub fn prestarted(&mut self) -> bool {
        if let Some(Some(p)) = self.collect_property(CollectorKey::Prestarted) {
            if p.byte_len() == 1 && p.value[0] != 0 {
                self.prestarted = true;
            }
        }
        self.prestarted
    }

    pub fn wm_name(&mut self) -> &str {
        if let Some(Some(p)) = self.collect_property(CollectorKey::WmName) {
            let bytes = p.value.split(|b| *b == 0).next().unwrap_or_default();
            self.wm_name = String::from_utf8_lossy(bytes).into_owned();
        }
        &self.wm_name
    }

    // ---- protocols and hints ------------------------------------------

    pub fn supported_protocols(&mut self) -> &[Atom] {
        if let Some(values) = self.collect_value32(CollectorKey::SupportedProtocols) {
            self.protocols = values.unwrap_or_default();
        }
        &self.protocols
    }

    pub fn supports_protocol(&mut self, protocol: Atom) -> bool {
        self.supported_protocols().contains(&protocol)
    }

    pub fn wm_hints(&mut self) -> WmHints {
        if let Some(values) = self.collect_value32(CollectorKey::WmHints) {
            self.wm_hints = match values.as_deref().and_then(WmHints::parse) {
                Some(mut hints) => {
                    if self.prestarted() {
                        // prestarted apps ask to start iconic; ignore that
                        hints.flags.remove(WmHintsFlags::STATE);
                    }
                    hints
                }
                None => WmHints::default(),
            };
        }
        self.wm_hints
    }

    pub fn wants_focus(&mut self) -> bool {
        self.wm_hints().wants_focus()
    }

    pub fn window_group(&mut self) -> Option<Window> {
        self.wm_hints().window_group()
    }

    // ---- state ---------------------------------------------------------

    /// WM_STATE, or -1 when unknown.
    ///
    /// If the property disappeared while we already consider the window
    /// normal or iconic, our value is written back to the window.
    pub fn window_state(&mut self) -> i32 {
        let Some(reply) = self.collect(CollectorKey::WindowState) else {
            return self.window_state;
        };
        let failed = reply.is_none();
        let value = match &reply {
            Some(Reply::Property(p)) if p.byte_len() >= 4 => p.value32().first().copied(),
            _ => None,
        };
        if let Some(state) = value {
            self.window_state = state as i32;
        } else if self.window_state < 0 || self.window_state == WITHDRAWN_STATE || failed {
            self.window_state = -1;
        } else {
            let wm_state = self.handles.atoms.wm_state;
            self.handles.wire.change_property32(
                self.window,
                wm_state,
                wm_state,
                &[self.window_state as u32, 0],
            );
        }
        self.window_state
    }

    /// We are about to change the state ourselves; stop waiting for the old one
    pub fn set_window_state(&mut self, state: i32) {
        self.cancel(CollectorKey::WindowState);
        self.window_state = state;
    }

    pub fn net_wm_state(&mut self) -> &[Atom] {
        if let Some(values) = self.collect_value32(CollectorKey::NetWmState) {
            self.net_wm_state = values.unwrap_or_default();
        }
        &self.net_wm_state
    }

    fn write_net_wm_state(&self) {
        self.handles.wire.change_property32(
            self.window,
            self.handles.atoms.net_wm_state,
            AtomEnum::ATOM.into(),
            &self.net_wm_state,
        );
    }

    /// Returns false if the state was already there
    pub fn add_to_net_wm_state(&mut self, state: Atom) -> bool {
        if !self.valid {
            return false;
        }
        if self.force_skipping_taskbar && state == self.handles.atoms.net_wm_state_skip_taskbar {
            self.force_skipping_taskbar = false;
        }
        if self.net_wm_state().contains(&state) {
            return false;
        }
        self.net_wm_state.push(state);
        self.write_net_wm_state();
        true
    }

    /// Returns false if the state was not there
    pub fn remove_from_net_wm_state(&mut self, state: Atom) -> bool {
        if !self.valid {
            return false;
        }
        if self.force_skipping_taskbar && state == self.handles.atoms.net_wm_state_skip_taskbar {
            self.force_skipping_taskbar = false;
        }
        let before = self.net_wm_state().len();
        self.net_wm_state.retain(|s| *s != state);
        if self.net_wm_state.len() == before {
            return false;
        }
        self.write_net_wm_state();
        true
    }

    /// Keep the window off the taskbar, remembering whether the client had
    /// asked for that itself so it can be restored
    pub fn force_skipping_taskbar(&mut self, force: bool) {
        let skip = self.handles.atoms.net_wm_state_skip_taskbar;
        if force {
            if !self.force_skipping_taskbar {
                self.was_skipping_taskbar = !self.add_to_net_wm_state(skip);
                if !self.was_skipping_taskbar {
                    // lets a restarted compositor clean up after us
                    self.set_skipping_taskbar_marker(true);
                }
            } else {
                self.add_to_net_wm_state(skip);
            }
        } else if self.force_skipping_taskbar && !self.was_skipping_taskbar {
            self.remove_from_net_wm_state(skip);
            self.set_skipping_taskbar_marker(false);
        }
        self.force_skipping_taskbar = force;
    }

    pub fn is_forcing_skip_taskbar(&self) -> bool {
        self.force_skipping_taskbar
    }

    pub fn skipping_taskbar_marker(&mut self) -> bool {
        if let Some(v) = self.collect_card32(CollectorKey::SkipTaskbarMarker) {
            self.skipping_taskbar_marker = v != 0;
        }
        self.skipping_taskbar_marker
    }

    fn set_skipping_taskbar_marker(&mut self, setting: bool) {
        if self.skipping_taskbar_marker() == setting {
            return;
        }
        let marker = self.handles.atoms.mcompositor_skip_taskbar;
        if setting {
            self.handles
                .wire
                .change_property32(self.window, marker, AtomEnum::CARDINAL.into(), &[1]);
        } else {
            self.handles.wire.delete_property(self.window, marker);
        }
        self.skipping_taskbar_marker = setting;
    }

    // ---- derived -------------------------------------------------------

    pub fn set_dont_iconify(&mut self, dont_iconify: bool) {
        self.dont_iconify = dont_iconify;
    }

    /// Windows that must not be minimised
    pub fn dont_iconify(&mut self) -> bool {
        if self.dont_iconify || self.cannot_minimize() > 0 {
            return true;
        }
        self.stacking_layer() == 1 || self.is_lock_screen()
    }

    pub fn is_lock_screen(&mut self) -> bool {
        self.stacking_layer() > 0 && self.wm_name() == "Screen Lock"
    }

    pub fn is_call_ui(&mut self) -> bool {
        self.wm_name() == "call-ui"
    }

    // ---- events --------------------------------------------------------

    /// React to a PropertyNotify. Returns whether stacking must be
    /// evaluated again.
    pub fn property_event(&mut self, atom: Atom, new_value: bool) -> bool {
        if !self.valid {
            return false;
        }
        use CollectorKey::*;
        let a = Arc::clone(&self.handles.atoms);
        let window = self.window;

        if atom == a.wm_transient_for {
            if self.collector.is_up_to_date(TransientFor) {
                if let Some(parent) = self.transient_for {
                    self.signals.push(CacheSignal::TransientUnlinked { child: window, parent });
                }
            }
            self.refresh(TransientFor);
            true
        } else if atom == a.meegotouch_wm_invoked_by {
            self.refresh(InvokedBy);
            true
        } else if atom == a.meegotouch_always_mapped {
            self.refresh(AlwaysMapped);
            self.signals.push(CacheSignal::AlwaysMappedChanged(window));
            false
        } else if atom == a.meegotouch_cannot_minimize {
            self.refresh(CannotMinimize);
            false
        } else if atom == a.meegotouch_desktop_view {
            self.signals.push(CacheSignal::DesktopViewChanged(window));
            false
        } else if atom == a.wm_hints {
            self.refresh(WmHints);
            true
        } else if atom == a.net_wm_window_type {
            self.refresh(WindowTypeAtom);
            self.window_type = WindowType::Invalid;
            true
        } else if atom == a.net_wm_icon_geometry {
            self.refresh(IconGeometry);
            self.signals.push(CacheSignal::IconGeometryUpdated(window));
            false
        } else if atom == a.meegotouch_global_alpha {
            self.refresh(GlobalAlpha);
            false
        } else if atom == a.meegotouch_video_alpha {
            self.refresh(VideoGlobalAlpha);
            false
        } else if atom == a.meegotouch_decorator_window {
            self.refresh(IsDecorator);
            true
        } else if atom == a.meegotouch_decorator_buttons {
            self.refresh(DecoratorButtons);
            self.signals.push(CacheSignal::DecoratorButtonsChanged(window));
            false
        } else if atom == a.meegotouch_orientation_angle {
            self.refresh(OrientationAngle);
            false
        } else if atom == a.meegotouch_mstatusbar_geometry {
            self.refresh(StatusBarGeometry);
            true
        } else if atom == a.wm_protocols {
            self.refresh(SupportedProtocols);
            true
        } else if atom == a.net_wm_state {
            self.refresh(NetWmState);
            false
        } else if atom == a.wm_state {
            self.refresh(WindowState);
            true
        } else if atom == a.meego_stacking_layer {
            self.refresh(StackingLayer);
            true
        } else if atom == a.meego_low_power_mode {
            self.refresh(LowPowerMode);
            false
        } else if atom == a.meegotouch_opaque_window {
            // compositing mode may need to change
            self.refresh(OpaqueWindow);
            true
        } else if atom == a.meegotouch_custom_region {
            self.signals.push(CacheSignal::CustomRegionChanged(window));
            false
        } else if atom == a.wm_name {
            self.refresh(WmName);
            false
        } else if atom == a.meegotouch_no_animations {
            self.refresh(NoAnimations);
            false
        } else if atom == a.omap_video_overlay {
            self.refresh(VideoOverlay);
            false
        } else if atom == a.net_wm_pid {
            self.pid = 0;
            if new_value {
                self.refresh(Pid);
            } else {
                self.cancel(Pid);
            }
            false
        } else if atom == a.meegotouch_prestarted {
            if new_value {
                self.prestarted = true;
                self.wm_hints.flags.remove(WmHintsFlags::STATE);
            }
            false
        } else {
            false
        }
    }
}

impl Drop for WindowPropertyCache {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for WindowPropertyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowPropertyCache")
            .field("window", &self.window)
            .field("valid", &self.valid)
            .field("window_type", &self.window_type)
            .field("transient_for", &self.transient_for)
            .finish_non_exhaustive()
    }
}
