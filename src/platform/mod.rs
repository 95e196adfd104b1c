pub mod discord;
pub mod telegram;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::RelayError;

/// A message received from the source platform, reduced to what the relay needs.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    /// Display name of the sender
    pub sender: String,
    /// Message text, or the media caption
    pub text: Option<String>,
    /// `None` when the message carries nothing the relay forwards
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text,
    Animation(RemoteFile),
    Document(RemoteFile),
    /// Every size Telegram offers for the photo
    Photo(Vec<PhotoVariant>),
}

/// A file stored on the source platform, downloaded on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoVariant {
    pub file: RemoteFile,
    pub width: u32,
    pub height: u32,
}

impl PhotoVariant {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// One message to post on the destination platform.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel_id: u64,
    pub content: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub data: AttachmentData,
}

impl Attachment {
    pub fn bytes(file_name: String, data: Vec<u8>) -> Self {
        Self {
            file_name,
            data: AttachmentData::Bytes(data),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentData {
    Bytes(Vec<u8>),
    /// Read from disk at send time
    Path(PathBuf),
}

/// Source of file bytes referenced by inbound updates.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, RelayError>;

    async fn fetch_to_path(&self, file_id: &str, path: &Path) -> Result<(), RelayError>;
}

/// Where relayed messages end up.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), RelayError>;
}
