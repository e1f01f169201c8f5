//! # Shared Net - Wire Protocol and Transports
//!
//! Every byte exchanged between shard nodes and the supervisor goes through
//! this crate.
//!
//! ## Wire Format
//!
//! ```text
//! ┌───────────────────────────┬──────────────────────────┐
//! │ 30-byte ASCII type tag    │ JSON-encoded payload     │
//! │ (null padded)             │                          │
//! └───────────────────────────┴──────────────────────────┘
//! ```
//!
//! On TCP each such blob is preceded by a 4-byte big-endian length so that
//! one connection can carry many messages.
//!
//! ## Transports
//!
//! - [`TcpTransport`]: owns its outbound connection pool, reconnects on
//!   demand and closes every connection on [`Transport::close`].
//! - [`InMemoryNetwork`]: routes frames between in-process inboxes. Used by
//!   the test suites to run whole shards without sockets.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod memory;
pub mod message;
pub mod payloads;
pub mod ports;
pub mod tcp;

pub use errors::{NetError, NetResult};
pub use memory::{InMemoryNetwork, InMemoryTransport};
pub use message::{merge_message, split_message, Message, MessageType, TAG_LEN};
pub use payloads::*;
pub use ports::{Inbox, InboxSender, Transport};
pub use tcp::{spawn_listener, TcpTransport};

/// Upper bound for one framed message on TCP.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
