//! # Message Envelope
//!
//! Tags every payload with a fixed-width type prefix and maps between raw
//! frames and the typed [`Message`] enum.

use crate::errors::{NetError, NetResult};
use crate::payloads::{
    AccountStateAndTx, BlockInfoMsg, InjectTxs, PartitionModifiedMap, PartitionReady, PrePrepare,
    Relay, RequestOldMessage, SendOldMessage, SeqIdInfo, Vote,
};
use serde::de::DeserializeOwned;
use std::fmt;

/// Width of the null-padded type tag.
pub const TAG_LEN: usize = 30;

/// Every message type understood on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    PrePrepare,
    Prepare,
    Commit,
    RequestOldRequest,
    SendOldRequest,
    Stop,
    Relay,
    Inject,
    BlockInfo,
    SeqIdInfo,
    AccountStateAndTx,
    PartitionModifiedMap,
    PartitionReady,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        Self::PrePrepare,
        Self::Prepare,
        Self::Commit,
        Self::RequestOldRequest,
        Self::SendOldRequest,
        Self::Stop,
        Self::Relay,
        Self::Inject,
        Self::BlockInfo,
        Self::SeqIdInfo,
        Self::AccountStateAndTx,
        Self::PartitionModifiedMap,
        Self::PartitionReady,
    ];

    /// ASCII tag written in front of the payload.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PrePrepare => "preprepare",
            Self::Prepare => "prepare",
            Self::Commit => "commit",
            Self::RequestOldRequest => "requestOldrequest",
            Self::SendOldRequest => "sendOldrequest",
            Self::Stop => "stop",
            Self::Relay => "relay",
            Self::Inject => "inject",
            Self::BlockInfo => "BlockInfo",
            Self::SeqIdInfo => "SequenceID",
            Self::AccountStateAndTx => "AccountState&txs",
            Self::PartitionModifiedMap => "PartitionModifiedMap",
            Self::PartitionReady => "readyForPartition",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Prefix `content` with the null-padded type tag.
pub fn merge_message(msg_type: MessageType, content: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; TAG_LEN];
    let tag = msg_type.tag().as_bytes();
    out[..tag.len()].copy_from_slice(tag);
    out.extend_from_slice(content);
    out
}

/// Split a frame into its type tag (nulls stripped) and content.
pub fn split_message(frame: &[u8]) -> NetResult<(String, &[u8])> {
    if frame.len() < TAG_LEN {
        return Err(NetError::Truncated(frame.len()));
    }
    let (head, content) = frame.split_at(TAG_LEN);
    let tag: Vec<u8> = head.iter().copied().filter(|b| *b != 0).collect();
    let tag = String::from_utf8_lossy(&tag).into_owned();
    Ok((tag, content))
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PrePrepare(PrePrepare),
    Prepare(Vote),
    Commit(Vote),
    RequestOldRequest(RequestOldMessage),
    SendOldRequest(SendOldMessage),
    Stop,
    Relay(Relay),
    Inject(InjectTxs),
    BlockInfo(Box<BlockInfoMsg>),
    SeqIdInfo(SeqIdInfo),
    AccountStateAndTx(AccountStateAndTx),
    PartitionModifiedMap(PartitionModifiedMap),
    PartitionReady(PartitionReady),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::PrePrepare(_) => MessageType::PrePrepare,
            Self::Prepare(_) => MessageType::Prepare,
            Self::Commit(_) => MessageType::Commit,
            Self::RequestOldRequest(_) => MessageType::RequestOldRequest,
            Self::SendOldRequest(_) => MessageType::SendOldRequest,
            Self::Stop => MessageType::Stop,
            Self::Relay(_) => MessageType::Relay,
            Self::Inject(_) => MessageType::Inject,
            Self::BlockInfo(_) => MessageType::BlockInfo,
            Self::SeqIdInfo(_) => MessageType::SeqIdInfo,
            Self::AccountStateAndTx(_) => MessageType::AccountStateAndTx,
            Self::PartitionModifiedMap(_) => MessageType::PartitionModifiedMap,
            Self::PartitionReady(_) => MessageType::PartitionReady,
        }
    }

    /// Encode into a tagged frame.
    pub fn to_frame(&self) -> NetResult<Vec<u8>> {
        let content = match self {
            Self::PrePrepare(p) => serde_json::to_vec(p)?,
            Self::Prepare(v) | Self::Commit(v) => serde_json::to_vec(v)?,
            Self::RequestOldRequest(r) => serde_json::to_vec(r)?,
            Self::SendOldRequest(s) => serde_json::to_vec(s)?,
            Self::Stop => Vec::new(),
            Self::Relay(r) => serde_json::to_vec(r)?,
            Self::Inject(i) => serde_json::to_vec(i)?,
            Self::BlockInfo(b) => serde_json::to_vec(b)?,
            Self::SeqIdInfo(s) => serde_json::to_vec(s)?,
            Self::AccountStateAndTx(a) => serde_json::to_vec(a)?,
            Self::PartitionModifiedMap(p) => serde_json::to_vec(p)?,
            Self::PartitionReady(p) => serde_json::to_vec(p)?,
        };
        Ok(merge_message(self.message_type(), &content))
    }

    /// Decode a tagged frame.
    pub fn from_frame(frame: &[u8]) -> NetResult<Self> {
        let (tag, content) = split_message(frame)?;
        let msg_type = MessageType::from_tag(&tag).ok_or(NetError::UnknownType(tag))?;
        let msg = match msg_type {
            MessageType::PrePrepare => Self::PrePrepare(parse(content)?),
            MessageType::Prepare => Self::Prepare(parse(content)?),
            MessageType::Commit => Self::Commit(parse(content)?),
            MessageType::RequestOldRequest => Self::RequestOldRequest(parse(content)?),
            MessageType::SendOldRequest => Self::SendOldRequest(parse(content)?),
            MessageType::Stop => Self::Stop,
            MessageType::Relay => Self::Relay(parse(content)?),
            MessageType::Inject => Self::Inject(parse(content)?),
            MessageType::BlockInfo => Self::BlockInfo(Box::new(parse(content)?)),
            MessageType::SeqIdInfo => Self::SeqIdInfo(parse(content)?),
            MessageType::AccountStateAndTx => Self::AccountStateAndTx(parse(content)?),
            MessageType::PartitionModifiedMap => Self::PartitionModifiedMap(parse(content)?),
            MessageType::PartitionReady => Self::PartitionReady(parse(content)?),
        };
        Ok(msg)
    }
}

fn parse<T: DeserializeOwned>(content: &[u8]) -> NetResult<T> {
    Ok(serde_json::from_slice(content)?)
}
