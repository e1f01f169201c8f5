//! # In-Memory Network
//!
//! Routes frames between inboxes registered under string addresses. Frames
//! still go through the full encode/decode path so tests exercise the wire
//! codec. Individual addresses can be isolated to simulate a lagging or
//! crashed replica.

use crate::errors::{NetError, NetResult};
use crate::message::Message;
use crate::ports::{Inbox, InboxSender, Transport};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Default)]
struct Routes {
    inboxes: HashMap<String, InboxSender>,
    isolated: HashSet<String>,
}

/// Shared routing table. Cheap to clone.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    routes: Arc<RwLock<Routes>>,
    delivered: Arc<AtomicU64>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `addr` and return its inbox. Re-registering replaces the
    /// previous inbox.
    pub fn register(&self, addr: &str) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.write().inboxes.insert(addr.to_string(), tx);
        rx
    }

    pub fn unregister(&self, addr: &str) {
        self.routes.write().inboxes.remove(addr);
    }

    /// Silently drop every frame sent to `addr` until [`Self::heal`].
    pub fn isolate(&self, addr: &str) {
        self.routes.write().isolated.insert(addr.to_string());
    }

    pub fn heal(&self, addr: &str) {
        self.routes.write().isolated.remove(addr);
    }

    /// Frames delivered so far, across all inboxes.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// A transport handle bound to this network.
    pub fn transport(&self) -> InMemoryTransport {
        InMemoryTransport {
            network: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    fn deliver(&self, frame: &[u8], addr: &str) -> NetResult<()> {
        let sender = {
            let routes = self.routes.read();
            if routes.isolated.contains(addr) {
                trace!(addr = %addr, "[net] frame dropped, address isolated");
                return Ok(());
            }
            routes
                .inboxes
                .get(addr)
                .cloned()
                .ok_or_else(|| NetError::Unreachable(addr.to_string()))?
        };
        let msg = Message::from_frame(frame)?;
        sender
            .send(msg)
            .map_err(|_| NetError::Unreachable(addr.to_string()))?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Per-node sending handle on an [`InMemoryNetwork`].
pub struct InMemoryTransport {
    network: InMemoryNetwork,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send_frame(&self, frame: &[u8], addr: &str) -> NetResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }
        self.network.deliver(frame, addr)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
