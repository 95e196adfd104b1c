use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use teloxide::update_listeners::webhooks;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::TelegramConfig;
use crate::error::RelayError;
use crate::platform::{InboundUpdate, MediaSource, Payload, PhotoVariant, RemoteFile};
use crate::relay::{Outcome, Relay};

/// Downloads files referenced by Telegram messages.
pub struct TelegramSource {
    bot: Bot,
}

impl TelegramSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn file_path(&self, file_id: &str) -> Result<String, RelayError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| RelayError::fetch(file_id, e))?;
        Ok(file.path)
    }
}

#[async_trait]
impl MediaSource for TelegramSource {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, RelayError> {
        let path = self.file_path(file_id).await?;
        let mut data = Vec::new();
        self.bot
            .download_file(&path, &mut data)
            .await
            .map_err(|e| RelayError::fetch(file_id, e))?;
        debug!("Fetched {} ({} bytes)", file_id, data.len());
        Ok(data)
    }

    async fn fetch_to_path(&self, file_id: &str, path: &Path) -> Result<(), RelayError> {
        let remote = self.file_path(file_id).await?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| RelayError::fetch(file_id, e))?;
        self.bot
            .download_file(&remote, &mut file)
            .await
            .map_err(|e| RelayError::fetch(file_id, e))?;
        file.flush()
            .await
            .map_err(|e| RelayError::fetch(file_id, e))?;
        debug!("Fetched {} to {}", file_id, path.display());
        Ok(())
    }
}

/// `@username` if the sender has one, else their full name.
fn sender_name(msg: &Message) -> String {
    match msg.from.as_ref() {
        Some(user) => user.username.clone().unwrap_or_else(|| user.full_name()),
        None => msg
            .chat
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn remote(file_id: &FileId, file_name: Option<&String>) -> RemoteFile {
    RemoteFile {
        file_id: file_id.0.clone(),
        file_name: file_name.cloned(),
    }
}

/// Classify a Telegram message. Text wins over media, then animation,
/// document and photo in that order.
pub fn inbound_from_message(msg: &Message) -> InboundUpdate {
    let payload = if msg.text().is_some() {
        Some(Payload::Text)
    } else if let Some(animation) = msg.animation() {
        Some(Payload::Animation(remote(
            &animation.file.id,
            animation.file_name.as_ref(),
        )))
    } else if let Some(document) = msg.document() {
        Some(Payload::Document(remote(
            &document.file.id,
            document.file_name.as_ref(),
        )))
    } else {
        msg.photo().map(|sizes| {
            Payload::Photo(
                sizes
                    .iter()
                    .map(|size| PhotoVariant {
                        file: remote(&size.file.id, None),
                        width: size.width,
                        height: size.height,
                    })
                    .collect(),
            )
        })
    };

    InboundUpdate {
        sender: sender_name(msg),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        payload,
    }
}

async fn handle_update(update: InboundUpdate, relay: Arc<Relay>) -> Result<(), RelayError> {
    info!(
        "Telegram message from {} ({})",
        update.sender,
        update_kind(&update)
    );

    match relay.handle(&update).await? {
        Outcome::Forwarded => debug!("Forwarded message from {}", update.sender),
        Outcome::Filtered | Outcome::Ignored => {}
    }
    Ok(())
}

fn update_kind(update: &InboundUpdate) -> &'static str {
    match update.payload {
        Some(Payload::Text) => "text",
        Some(Payload::Animation(_)) => "animation",
        Some(Payload::Document(_)) => "document",
        Some(Payload::Photo(_)) => "photo",
        None => "unsupported",
    }
}

/// Adds `GET /healthz` next to the webhook route.
fn with_health_route(base: Router) -> Router {
    base.route("/healthz", get(|| async { "ok" }))
}

/// Register the webhook, serve it, and dispatch updates until Ctrl-C.
pub async fn run(
    bot: Bot,
    relay: Arc<Relay>,
    config: &TelegramConfig,
    addr: SocketAddr,
) -> Result<()> {
    let url = reqwest::Url::parse(&config.webhook_url)
        .with_context(|| format!("Invalid webhook URL: {}", config.webhook_url))?;

    let mut options = webhooks::Options::new(addr, url);
    if let Some(secret) = &config.secret_token {
        options = options.secret_token(secret.clone());
    }

    info!("Registering Telegram webhook {}", config.webhook_url);
    let (listener, stop_flag, router) = webhooks::axum_to_router(bot.clone(), options)
        .await
        .context("Failed to set up Telegram webhook")?;

    let app = with_health_route(router);
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening for Telegram updates on {}", addr);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, app)
            .with_graceful_shutdown(stop_flag)
            .await
        {
            error!("Webhook server error: {}", e);
        }
    });

    let handler = Update::filter_message()
        .map(|msg: Message| inbound_from_message(&msg))
        .endpoint(handle_update);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            debug!("Ignoring update {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("relay"))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("webhook listener"),
        )
        .await;

    info!("Telegram listener stopped");
    server.await.context("Webhook server task panicked")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn message(extra: Value) -> Message {
        let mut value = json!({
            "message_id": 7,
            "date": 1700000000,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": {
                "id": 42,
                "is_bot": false,
                "first_name": "Alice",
                "last_name": "Liddell",
                "username": "alice"
            }
        });
        let fields = value.as_object_mut().unwrap();
        for (key, val) in extra.as_object().unwrap() {
            fields.insert(key.clone(), val.clone());
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_message() {
        let update = inbound_from_message(&message(json!({ "text": "hello there" })));
        assert_eq!(update.sender, "alice");
        assert_eq!(update.text.as_deref(), Some("hello there"));
        assert_eq!(update.payload, Some(Payload::Text));
    }

    #[test]
    fn test_sender_falls_back_to_full_name() {
        let mut msg = message(json!({ "text": "hi" }));
        if let Some(user) = msg.from.as_mut() {
            user.username = None;
        }
        assert_eq!(inbound_from_message(&msg).sender, "Alice Liddell");
    }

    #[test]
    fn test_photo_with_caption() {
        let update = inbound_from_message(&message(json!({
            "caption": "sunset",
            "photo": [
                { "file_id": "small", "file_unique_id": "u1", "file_size": 100, "width": 90, "height": 60 },
                { "file_id": "large", "file_unique_id": "u2", "file_size": 900, "width": 1280, "height": 853 }
            ]
        })));
        assert_eq!(update.text.as_deref(), Some("sunset"));
        match update.payload {
            Some(Payload::Photo(variants)) => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[1].file.file_id, "large");
                assert_eq!(variants[1].width, 1280);
            }
            other => panic!("expected photo, got {:?}", other),
        }
    }

    #[test]
    fn test_document_keeps_file_name() {
        let update = inbound_from_message(&message(json!({
            "document": {
                "file_id": "doc-id",
                "file_unique_id": "doc-u",
                "file_size": 2048,
                "file_name": "report (1).pdf",
                "mime_type": "application/pdf"
            }
        })));
        assert_eq!(update.text, None);
        assert_eq!(
            update.payload,
            Some(Payload::Document(RemoteFile {
                file_id: "doc-id".to_string(),
                file_name: Some("report (1).pdf".to_string()),
            }))
        );
    }

    #[test]
    fn test_unsupported_message_has_no_payload() {
        let update = inbound_from_message(&message(json!({
            "location": { "latitude": 52.5, "longitude": 13.4 }
        })));
        assert_eq!(update.payload, None);
        assert_eq!(update_kind(&update), "unsupported");
    }

    #[tokio::test]
    async fn test_healthz_route() {
        let resp = with_health_route(Router::new())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_health_route_keeps_existing_routes() {
        let base = Router::new().route("/", axum::routing::post(|| async { "webhook" }));
        let resp = with_health_route(base)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
