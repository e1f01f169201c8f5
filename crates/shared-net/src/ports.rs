//! # Transport Port
//!
//! Point-to-point delivery of tagged frames. Broadcast is repeated unicast
//! that skips the sender.

use crate::errors::NetResult;
use crate::message::Message;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiving end of a node's decoded inbound messages.
pub type Inbox = mpsc::UnboundedReceiver<Message>;

/// Sending end feeding an [`Inbox`].
pub type InboxSender = mpsc::UnboundedSender<Message>;

/// Outbound message delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one already tagged frame to `addr`.
    async fn send_frame(&self, frame: &[u8], addr: &str) -> NetResult<()>;

    /// Drop every pooled connection. Later sends fail with `Closed`.
    async fn close(&self);

    /// Encode and deliver one message.
    async fn send(&self, msg: &Message, addr: &str) -> NetResult<()> {
        let frame = msg.to_frame()?;
        self.send_frame(&frame, addr).await
    }

    /// Send `msg` to every peer except `self_addr`.
    ///
    /// Failures are logged per peer and do not stop the broadcast.
    async fn broadcast(&self, msg: &Message, self_addr: &str, peers: &[String]) -> NetResult<()> {
        let frame = msg.to_frame()?;
        for peer in peers.iter().filter(|p| p.as_str() != self_addr) {
            if let Err(e) = self.send_frame(&frame, peer).await {
                warn!(peer = %peer, msg_type = %msg.message_type(), error = %e, "[net] broadcast leg failed");
            }
        }
        Ok(())
    }
}
