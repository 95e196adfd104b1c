use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::RelayError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Public URL Telegram posts updates to.
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sent to Telegram with setWebhook and checked on every request.
    #[serde(default)]
    pub secret_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub channel_id: u64,
    #[serde(default)]
    pub base_url: String,
}

impl DiscordConfig {
    /// Returns the effective base_url, falling back to the public API.
    pub fn effective_base_url(&self) -> &str {
        if self.base_url.is_empty() {
            "https://discord.com/api/v10"
        } else {
            self.base_url.trim_end_matches('/')
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
    #[serde(default = "default_allowed_link_domains")]
    pub allowed_link_domains: Vec<String>,
    #[serde(default = "default_animation_fps")]
    pub animation_fps: u32,
    #[serde(default = "default_photo_filename")]
    pub photo_filename: String,
    /// Render the sender as `**name**:` instead of `name:`
    #[serde(default)]
    pub bold_sender: bool,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            webhook_url: String::new(),
            listen_address: default_listen_address(),
            port: default_port(),
            secret_token: None,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            link_prefix: default_link_prefix(),
            allowed_link_domains: default_allowed_link_domains(),
            animation_fps: default_animation_fps(),
            photo_filename: default_photo_filename(),
            bold_sender: false,
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

fn default_listen_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    5001
}

fn default_link_prefix() -> String {
    "http".to_string()
}

fn default_allowed_link_domains() -> Vec<String> {
    vec!["x.com".to_string()]
}

fn default_animation_fps() -> u32 {
    25
}

fn default_photo_filename() -> String {
    "image.png".to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Config {
    /// Socket address the webhook server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.telegram.listen_address, self.telegram.port)
    }

    /// Load from `path` (if it exists), apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::warn!(
                "Config file {} not found, using environment only",
                path.display()
            );
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Replace file values with whatever `lookup` returns for the known keys.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(url) = get("TELEGRAM_WEBHOOK_URL") {
            self.telegram.webhook_url = url;
        }
        if let Some(token) = get("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = token;
        }
        if let Some(id) = get("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = id.trim().parse().map_err(|_| {
                RelayError::Configuration(format!("DISCORD_CHANNEL_ID is not a number: {id}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let missing = |what: &str| RelayError::Configuration(format!("{what} is not set"));

        if self.telegram.bot_token.is_empty() {
            return Err(missing("telegram.bot_token"));
        }
        if self.telegram.webhook_url.is_empty() {
            return Err(missing("telegram.webhook_url"));
        }
        reqwest::Url::parse(&self.telegram.webhook_url).map_err(|e| {
            RelayError::Configuration(format!("telegram.webhook_url is not a valid URL: {e}"))
        })?;
        if let Some(secret) = &self.telegram.secret_token {
            check_secret_token(secret)?;
        }
        if self.discord.bot_token.is_empty() {
            return Err(missing("discord.bot_token"));
        }
        if self.discord.channel_id == 0 {
            return Err(missing("discord.channel_id"));
        }
        if self.relay.animation_fps == 0 {
            return Err(RelayError::Configuration(
                "relay.animation_fps must be positive".to_string(),
            ));
        }
        if self.relay.link_prefix.is_empty() {
            return Err(missing("relay.link_prefix"));
        }
        Ok(())
    }
}

/// Telegram accepts 1-256 characters from `A-Za-z0-9_-` as a webhook secret.
fn check_secret_token(secret: &str) -> Result<(), RelayError> {
    if secret.is_empty() || secret.len() > 256 {
        return Err(RelayError::Configuration(
            "telegram.secret_token must be 1-256 characters long".to_string(),
        ));
    }
    if let Some(c) = secret
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(RelayError::Configuration(format!(
            "telegram.secret_token contains {c:?}; only A-Z, a-z, 0-9, _ and - are allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
[telegram]
bot_token = "tg-token"
webhook_url = "https://relay.example.com/"
port = 8443

[discord]
bot_token = "dc-token"
channel_id = 42

[relay]
allowed_link_domains = ["x.com", "twitter.com"]
bold_sender = true
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.telegram.port, 8443);
        assert_eq!(config.telegram.listen_address, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.discord.channel_id, 42);
        assert_eq!(config.relay.link_prefix, "http");
        assert_eq!(config.relay.animation_fps, 25);
        assert_eq!(config.relay.photo_filename, "image.png");
        assert!(config.relay.bold_sender);
        assert_eq!(config.relay.allowed_link_domains.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.telegram.port, 5001);
        assert_eq!(config.relay.allowed_link_domains, vec!["x.com".to_string()]);
        assert_eq!(config.discord.effective_base_url(), "https://discord.com/api/v10");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_toml_str(FULL).unwrap();
        config
            .apply_overrides(env(&[
                ("TELEGRAM_BOT_TOKEN", "env-tg"),
                ("DISCORD_CHANNEL_ID", "777"),
                ("DISCORD_BOT_TOKEN", ""),
            ]))
            .unwrap();
        assert_eq!(config.telegram.bot_token, "env-tg");
        assert_eq!(config.discord.channel_id, 777);
        // blank values do not clobber the file
        assert_eq!(config.discord.bot_token, "dc-token");
    }

    #[test]
    fn test_env_only_config_validates() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("TELEGRAM_BOT_TOKEN", "t"),
                ("TELEGRAM_WEBHOOK_URL", "https://hook.example.com"),
                ("DISCORD_BOT_TOKEN", "d"),
                ("DISCORD_CHANNEL_ID", "1"),
            ]))
            .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().port(), 5001);
    }

    #[test]
    fn test_bad_channel_id_is_configuration_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("DISCORD_CHANNEL_ID", "general")]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_missing_values_fail_validation() {
        let config = Config::default();
        match config.validate() {
            Err(RelayError::Configuration(msg)) => assert!(msg.contains("telegram.bot_token")),
            other => panic!("expected configuration error, got {:?}", other),
        }

        let mut config = Config::from_toml_str(FULL).unwrap();
        config.discord.channel_id = 0;
        match config.validate() {
            Err(RelayError::Configuration(msg)) => assert!(msg.contains("channel_id")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_webhook_url_rejected() {
        let mut config = Config::from_toml_str(FULL).unwrap();
        config.telegram.webhook_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(RelayError::Configuration(_))
        ));
    }

    #[test]
    fn test_secret_token_checked() {
        let mut config = Config::from_toml_str(FULL).unwrap();

        config.telegram.secret_token = Some("relay_Secret-123".to_string());
        assert!(config.validate().is_ok());

        for bad in ["my secret!".to_string(), String::new(), "a".repeat(257)] {
            config.telegram.secret_token = Some(bad.clone());
            assert!(
                matches!(config.validate(), Err(RelayError::Configuration(_))),
                "accepted secret token {bad:?}"
            );
        }

        config.telegram.secret_token = Some("a".repeat(256));
        assert!(config.validate().is_ok());
    }
}
