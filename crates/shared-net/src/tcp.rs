//! # TCP Transport
//!
//! Outbound side keeps one connection per destination, opened on first use
//! and reused afterwards. Each destination has its own slot lock, so a slow
//! peer only holds up frames bound for that peer. Inbound side is an accept
//! loop spawning one reader task per connection. Frames are prefixed with a
//! 4-byte big-endian length.

use crate::errors::{NetError, NetResult};
use crate::message::Message;
use crate::ports::{InboxSender, Transport};
use crate::MAX_FRAME_BYTES;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Write one length-prefixed frame.
pub async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> NetResult<()> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge(frame.len()));
    }
    stream.write_all(&(frame.len() as u32).to_be_bytes()).await?;
    stream.write_all(frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` on clean EOF.
pub async fn read_frame(stream: &mut TcpStream) -> NetResult<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge(len));
    }
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await?;
    Ok(Some(data))
}

/// Upper bound on opening an outbound connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound connection to one destination, `None` until first use or after
/// a broken write.
type Slot = Arc<Mutex<Option<TcpStream>>>;

/// TCP transport with an owned outbound connection pool.
pub struct TcpTransport {
    /// Only held to look up a slot, never across I/O.
    slots: parking_lot::Mutex<HashMap<String, Slot>>,
    closed: AtomicBool,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            slots: parking_lot::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            connect_timeout,
        }
    }

    /// Number of currently pooled connections.
    pub async fn pooled(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        let mut open = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                open += 1;
            }
        }
        open
    }

    fn slot(&self, addr: &str) -> Slot {
        self.slots.lock().entry(addr.to_string()).or_default().clone()
    }

    async fn connect(&self, addr: &str) -> NetResult<TcpStream> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::Unreachable(addr.to_string()))??;
        stream.set_nodelay(true)?;
        debug!(addr = %addr, "[net] connection opened");
        Ok(stream)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_frame(&self, frame: &[u8], addr: &str) -> NetResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }
        let slot = self.slot(addr);
        let mut conn = slot.lock().await;

        if let Some(stream) = conn.as_mut() {
            match write_frame(stream, frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(addr = %addr, error = %e, "[net] pooled connection broken, reconnecting");
                    *conn = None;
                }
            }
        }

        let mut stream = self.connect(addr).await?;
        write_frame(&mut stream, frame).await?;
        *conn = Some(stream);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let slots: Vec<(String, Slot)> = self.slots.lock().drain().collect();
        for (addr, slot) in slots {
            if let Some(mut stream) = slot.lock().await.take() {
                if let Err(e) = stream.shutdown().await {
                    debug!(addr = %addr, error = %e, "[net] shutdown failed");
                }
            }
        }
        info!("[net] connection pool closed");
    }
}

/// Bind `addr` and spawn the accept loop.
///
/// Every decoded message is pushed into `inbox`. The loop exits when
/// `shutdown` flips to `true` or the inbox is dropped.
pub async fn spawn_listener(
    addr: &str,
    inbox: InboxSender,
    mut shutdown: watch::Receiver<bool>,
) -> NetResult<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "[net] listening");

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let inbox = inbox.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(handle_connection(stream, peer.to_string(), inbox, shutdown));
                        }
                        Err(e) => {
                            warn!(error = %e, "[net] accept failed");
                        }
                    }
                }
            }
            if inbox.is_closed() {
                break;
            }
        }
        info!("[net] listener closed");
    });
    Ok(handle)
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: String,
    inbox: InboxSender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return,
            frame = read_frame(&mut stream) => frame,
        };
        match frame {
            Ok(Some(frame)) => match Message::from_frame(&frame) {
                Ok(msg) => {
                    if inbox.send(msg).is_err() {
                        return;
                    }
                }
                Err(e) => warn!(peer = %peer, error = %e, "[net] dropping undecodable frame"),
            },
            Ok(None) => {
                debug!(peer = %peer, "[net] peer closed connection");
                return;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "[net] read failed");
                return;
            }
        }
    }
}
