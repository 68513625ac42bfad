//! Readiness notification for the X connection
//!
//! A blocking mio poller watches the connection fd and pings the main loop.
//! The main loop flushes, waits for the ping and then drains everything
//! x11rb has already buffered.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use tracing::{info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X11_TOKEN: mio::Token = mio::Token(0);
/// How often the poller checks whether the stream is gone
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct X11EventStream {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    // the poller exits once this end is dropped
    _poller_alive: oneshot::Receiver<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
            .context("Failed to register X11 FD with mio")?;

        let readable = Arc::new(Notify::new());
        let ping = Arc::clone(&readable);
        let (alive, poller_alive) = oneshot::channel::<()>();

        tokio::task::spawn_blocking(move || {
            let mut events = mio::Events::with_capacity(1);
            while !alive.is_closed() {
                if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                    warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }
                if events.iter().any(|event| event.token() == X11_TOKEN) {
                    ping.notify_one();
                }
            }
            info!("X11 socket poller stopped");
        });

        Ok(Self {
            conn,
            readable,
            _poller_alive: poller_alive,
        })
    }

    /// Next queued event, if any. Never blocks.
    pub fn poll_next_event(&self) -> Result<Option<Event>> {
        Ok(self.conn.poll_for_event()?)
    }

    /// Move every queued event into `buf`; returns how many were added
    pub fn drain_into(&self, buf: &mut Vec<Event>) -> Result<usize> {
        let before = buf.len();
        while let Some(event) = self.poll_next_event()? {
            buf.push(event);
        }
        Ok(buf.len() - before)
    }

    /// Resolves once the connection fd has been readable
    pub async fn wait_readable(&self) {
        self.readable.notified().await;
    }

    /// Push out requests queued by the property caches and the renderer
    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush X11 connection")
    }
}
