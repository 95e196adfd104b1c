use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DiscordConfig;
use crate::error::RelayError;
use crate::platform::{AttachmentData, Destination, OutboundMessage};

/// Discord rejects message content longer than this
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    allowed_mentions: AllowedMentions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentDescriptor<'a>>,
}

/// An empty `parse` list turns off @everyone, role and user pings.
#[derive(Debug, Serialize, Default)]
struct AllowedMentions {
    parse: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AttachmentDescriptor<'a> {
    id: u32,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Minimal Discord REST client: enough to post into one channel.
pub struct DiscordClient {
    client: reqwest::Client,
    config: DiscordConfig,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .context("Failed to build Discord HTTP client")?;
        Ok(Self { client, config })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    /// The bot account behind the token. Used as a startup credential check.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        let url = format!("{}/users/@me", self.config.effective_base_url());

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization())
            .send()
            .await
            .context("Failed to reach Discord")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse Discord user")
    }

    pub async fn create_message(&self, message: OutboundMessage) -> Result<()> {
        let content = truncate_content(&message.content, MAX_CONTENT_CHARS);
        if content.len() < message.content.len() {
            debug!(
                "Truncated message from {} to {} bytes",
                message.content.len(),
                content.len()
            );
        }

        let url = format!(
            "{}/channels/{}/messages",
            self.config.effective_base_url(),
            message.channel_id
        );

        let request = self
            .client
            .post(&url)
            .header("Authorization", self.authorization());

        let request = match message.attachment {
            None => request.json(&build_payload(content, None)),
            Some(attachment) => {
                let data = match attachment.data {
                    AttachmentData::Bytes(bytes) => bytes,
                    AttachmentData::Path(path) => {
                        tokio::fs::read(&path).await.with_context(|| {
                            format!("Failed to read attachment: {}", path.display())
                        })?
                    }
                };
                debug!(
                    "Uploading {} ({} bytes) to Discord",
                    attachment.file_name,
                    data.len()
                );

                let payload = serde_json::to_string(&build_payload(
                    content,
                    Some(attachment.file_name.as_str()),
                ))
                .context("Failed to encode message payload")?;

                let form = Form::new().text("payload_json", payload).part(
                    "files[0]",
                    Part::bytes(data).file_name(attachment.file_name.clone()),
                );
                request.multipart(form)
            }
        };

        let response = request
            .send()
            .await
            .context("Failed to send request to Discord")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API error ({}): {}", status, error_body);
        }

        info!("Relayed message to Discord channel {}", message.channel_id);
        Ok(())
    }
}

#[async_trait]
impl Destination for DiscordClient {
    async fn send(&self, message: OutboundMessage) -> Result<(), RelayError> {
        let channel_id = message.channel_id;
        self.create_message(message)
            .await
            .map_err(|e| RelayError::send(channel_id, e))
    }
}

/// Discord asks bots to identify as `DiscordBot (name-or-url, version)`.
fn user_agent() -> String {
    format!(
        "DiscordBot ({}, {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

fn build_payload<'a>(content: &'a str, file_name: Option<&'a str>) -> CreateMessage<'a> {
    CreateMessage {
        content,
        allowed_mentions: AllowedMentions::default(),
        attachments: file_name
            .map(|filename| vec![AttachmentDescriptor { id: 0, filename }])
            .unwrap_or_default(),
    }
}

/// Cut `text` to at most `max_chars` characters without splitting one.
fn truncate_content(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
