//! x11rb implementation of [`PropertyWire`].

use std::sync::Arc;

use tracing::{trace, warn};
use x11rb::connection::{DiscardMode, RequestConnection, RequestKind};
use x11rb::cookie::Cookie as X11Cookie;
use x11rb::protocol::render::{ConnectionExt as RenderExt, QueryPictFormatsReply};
use x11rb::protocol::shape::{ConnectionExt as ShapeExt, GetRectanglesReply, SK};
use x11rb::protocol::xproto::{
    Atom, ChangeWindowAttributesAux, ConnectionExt, EventMask, GetGeometryReply,
    GetPropertyReply, MapState, PropMode, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::TryParse;

use super::wire::{
    Cookie, PictDirectory, PropertyReply, PropertyWire, Reply, ReplyKind, WindowAttributes,
};
use crate::shared::Geometry;

/// Property requests over a shared x11rb connection
pub struct X11Wire {
    conn: Arc<RustConnection>,
}

impl X11Wire {
    pub fn new(conn: Arc<RustConnection>) -> Self {
        Self { conn }
    }

    /// Detach the sequence number from an x11rb cookie. Dropping the cookie
    /// would discard the reply, so it is forgotten instead.
    fn detach<C, R>(cookie: X11Cookie<'_, C, R>, kind: ReplyKind) -> Cookie
    where
        C: RequestConnection + ?Sized,
        R: TryParse,
    {
        let sequence = cookie.sequence_number();
        std::mem::forget(cookie);
        Cookie { sequence, kind }
    }
}

fn parse<T: TryParse>(buf: &[u8]) -> Option<T> {
    match T::try_parse(buf) {
        Ok((reply, _)) => Some(reply),
        Err(e) => {
            warn!("Failed to parse reply: {}", e);
            None
        }
    }
}

fn pict_directory(reply: QueryPictFormatsReply) -> PictDirectory {
    let mut dir = PictDirectory::default();
    for screen in &reply.screens {
        for depth in &screen.depths {
            for visual in &depth.visuals {
                dir.visual_formats.entry(visual.visual).or_insert(visual.format);
            }
        }
    }
    for format in &reply.formats {
        dir.alpha_masks.insert(format.id, format.direct.alpha_mask);
    }
    dir
}

impl PropertyWire for X11Wire {
    fn window_attributes(&self, window: Window) -> Option<WindowAttributes> {
        let reply = self.conn.get_window_attributes(window).ok()?.reply().ok()?;
        Some(WindowAttributes {
            visual: reply.visual,
            input_only: reply.class == WindowClass::INPUT_ONLY,
            override_redirect: reply.override_redirect,
            viewable: reply.map_state == MapState::VIEWABLE,
        })
    }

    fn request_property(&self, window: Window, property: Atom, type_: Atom, long_length: u32) -> Option<Cookie> {
        match self.conn.get_property(false, window, property, type_, 0, long_length) {
            Ok(cookie) => Some(Self::detach(cookie, ReplyKind::Property)),
            Err(e) => {
                warn!("GetProperty {} on window {} failed: {}", property, window, e);
                None
            }
        }
    }

    fn request_geometry(&self, window: Window) -> Option<Cookie> {
        self.conn
            .get_geometry(window)
            .map(|c| Self::detach(c, ReplyKind::Geometry))
            .map_err(|e| warn!("GetGeometry on window {} failed: {}", window, e))
            .ok()
    }

    fn request_shape(&self, window: Window) -> Option<Cookie> {
        self.conn
            .shape_get_rectangles(window, SK::BOUNDING)
            .map(|c| Self::detach(c, ReplyKind::Rectangles))
            .map_err(|e| warn!("ShapeGetRectangles on window {} failed: {}", window, e))
            .ok()
    }

    fn request_pict_formats(&self) -> Option<Cookie> {
        self.conn
            .render_query_pict_formats()
            .map(|c| Self::detach(c, ReplyKind::PictFormats))
            .map_err(|e| warn!("QueryPictFormats failed: {}", e))
            .ok()
    }

    fn fetch(&self, cookie: Cookie) -> Option<Reply> {
        use x11rb::connection::ReplyOrError;

        let buf = match self.conn.wait_for_reply_or_raw_error(cookie.sequence) {
            Ok(ReplyOrError::Reply(buf)) => buf,
            Ok(ReplyOrError::Error(_)) => {
                trace!("Request {} answered with an error", cookie.sequence);
                return None;
            }
            Err(e) => {
                warn!("Connection error while waiting for {}: {}", cookie.sequence, e);
                return None;
            }
        };
        match cookie.kind {
            ReplyKind::Property => parse::<GetPropertyReply>(&buf).map(|r| {
                Reply::Property(PropertyReply {
                    type_: r.type_,
                    format: r.format,
                    value: r.value,
                })
            }),
            ReplyKind::Geometry => parse::<GetGeometryReply>(&buf).map(|r| {
                Reply::Geometry(Geometry::new(r.x as i32, r.y as i32, r.width as u32, r.height as u32))
            }),
            ReplyKind::Rectangles => parse::<GetRectanglesReply>(&buf).map(|r| {
                Reply::Rectangles(
                    r.rectangles
                        .iter()
                        .map(|rect| Geometry::new(rect.x as i32, rect.y as i32, rect.width as u32, rect.height as u32))
                        .collect(),
                )
            }),
            ReplyKind::PictFormats => parse::<QueryPictFormatsReply>(&buf).map(|r| Reply::PictFormats(pict_directory(r))),
        }
    }

    fn discard(&self, cookie: Cookie) {
        self.conn.discard_reply(
            cookie.sequence,
            RequestKind::HasResponse,
            DiscardMode::DiscardReplyAndError,
        );
    }

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) {
        if let Err(e) = self.conn.change_property32(PropMode::REPLACE, window, property, type_, data) {
            warn!("ChangeProperty {} on window {} failed: {}", property, window, e);
        }
    }

    fn delete_property(&self, window: Window, property: Atom) {
        if let Err(e) = self.conn.delete_property(window, property) {
            warn!("DeleteProperty {} on window {} failed: {}", property, window, e);
        }
    }

    fn select_property_input(&self, window: Window) {
        let aux = ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE);
        if let Err(e) = self.conn.change_window_attributes(window, &aux) {
            warn!("Failed to select PropertyChange on window {}: {}", window, e);
        }
        if let Err(e) = self.conn.shape_select_input(window, true) {
            warn!("Failed to select ShapeNotify on window {}: {}", window, e);
        }
    }
}
