use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Config, RelayConfig};
use crate::error::RelayError;
use crate::media::Transcoder;
use crate::platform::{
    Attachment, AttachmentData, Destination, InboundUpdate, MediaSource, OutboundMessage, Payload,
    PhotoVariant, RemoteFile,
};

/// Filename used for documents Telegram sent without one
const FALLBACK_DOCUMENT_NAME: &str = "document";

/// What happened to one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    /// Dropped by the link filter
    Filtered,
    /// Nothing the relay knows how to forward
    Ignored,
}

/// Coarse link blocker: any whitespace-separated token that starts with
/// `prefix` must contain one of `allowed_domains` somewhere in it.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    prefix: String,
    allowed_domains: Vec<String>,
}

impl LinkFilter {
    pub fn new(prefix: impl Into<String>, allowed_domains: Vec<String>) -> Self {
        Self {
            prefix: prefix.into(),
            allowed_domains,
        }
    }

    /// Returns the first offending token, if any.
    pub fn violation<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.split_whitespace().find(|word| {
            word.starts_with(self.prefix.as_str())
                && !self
                    .allowed_domains
                    .iter()
                    .any(|domain| word.contains(domain.as_str()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub channel_id: u64,
    pub link_filter: LinkFilter,
    pub animation_fps: u32,
    pub photo_filename: String,
    pub bold_sender: bool,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        let RelayConfig {
            link_prefix,
            allowed_link_domains,
            animation_fps,
            photo_filename,
            bold_sender,
            ..
        } = &config.relay;

        Self {
            channel_id: config.discord.channel_id,
            link_filter: LinkFilter::new(link_prefix.clone(), allowed_link_domains.clone()),
            animation_fps: *animation_fps,
            photo_filename: photo_filename.clone(),
            bold_sender: *bold_sender,
        }
    }
}

/// Turns inbound updates into at most one destination send each.
pub struct Relay {
    source: Arc<dyn MediaSource>,
    transcoder: Arc<dyn Transcoder>,
    destination: Arc<dyn Destination>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        source: Arc<dyn MediaSource>,
        transcoder: Arc<dyn Transcoder>,
        destination: Arc<dyn Destination>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            source,
            transcoder,
            destination,
            settings,
        }
    }

    pub fn compose_text(&self, update: &InboundUpdate) -> String {
        let body = update.text.as_deref().unwrap_or("");
        if self.settings.bold_sender {
            format!("**{}**: {}", update.sender, body)
        } else {
            format!("{}: {}", update.sender, body)
        }
    }

    pub async fn handle(&self, update: &InboundUpdate) -> Result<Outcome, RelayError> {
        let text = self.compose_text(update);

        if let Some(link) = self.settings.link_filter.violation(&text) {
            info!(
                "Link detected from {}, message will not be forwarded: {}",
                update.sender, link
            );
            return Ok(Outcome::Filtered);
        }

        let payload = match &update.payload {
            Some(payload) => payload,
            None => {
                debug!("Nothing to forward from {}", update.sender);
                return Ok(Outcome::Ignored);
            }
        };

        match payload {
            Payload::Text => self.send(text, None).await?,
            Payload::Animation(file) => self.relay_animation(text, file).await?,
            Payload::Document(file) => {
                let data = self.source.fetch(&file.file_id).await?;
                let file_name = file
                    .file_name
                    .clone()
                    .unwrap_or_else(|| FALLBACK_DOCUMENT_NAME.to_string());
                self.send(text, Some(Attachment::bytes(file_name, data)))
                    .await?
            }
            Payload::Photo(variants) => {
                let largest = match largest_photo(variants) {
                    Some(variant) => variant,
                    None => {
                        warn!("Photo from {} has no sizes, skipping", update.sender);
                        return Ok(Outcome::Ignored);
                    }
                };
                let data = self.source.fetch(&largest.file.file_id).await?;
                let file_name = self.settings.photo_filename.clone();
                self.send(text, Some(Attachment::bytes(file_name, data)))
                    .await?
            }
        }

        Ok(Outcome::Forwarded)
    }

    /// Download, convert to GIF, send. The scratch directory lives until the
    /// send resolves and is removed on every path out of here.
    async fn relay_animation(&self, text: String, file: &RemoteFile) -> Result<(), RelayError> {
        let scratch = tempfile::Builder::new()
            .prefix("tgrelay-")
            .tempdir()
            .map_err(|e| RelayError::fetch(&file.file_id, e))?;

        let stem = safe_file_stem(&file.file_id);
        let input = scratch.path().join(&stem);
        let gif_name = format!("{}.gif", stem);
        let output = scratch.path().join(&gif_name);

        self.source.fetch_to_path(&file.file_id, &input).await?;
        self.transcoder
            .to_gif(&input, &output, self.settings.animation_fps)
            .await?;

        let attachment = Attachment {
            file_name: gif_name,
            data: AttachmentData::Path(output),
        };
        let sent = self.send(text, Some(attachment)).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(
                "Failed to remove scratch directory {}: {}",
                scratch_path.display(),
                e
            );
        }

        sent
    }

    async fn send(
        &self,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<(), RelayError> {
        let message = OutboundMessage {
            channel_id: self.settings.channel_id,
            content,
            attachment,
        };
        self.destination.send(message).await
    }
}

/// Highest resolution variant; on ties the later one wins.
fn largest_photo(variants: &[PhotoVariant]) -> Option<&PhotoVariant> {
    variants.iter().max_by_key(|v| v.pixels())
}

/// File ids are URL-safe base64 already; anything else becomes `_`.
fn safe_file_stem(file_id: &str) -> String {
    let stem: String = file_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "animation".to_string()
    } else {
        stem
    }
}
