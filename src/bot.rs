use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::media::FfmpegTranscoder;
use crate::platform::discord::DiscordClient;
use crate::platform::telegram::{self, TelegramSource};
use crate::relay::{Relay, RelaySettings};

/// Process-wide clients, created once at startup and handed to the relay.
pub struct AppState {
    config: Config,
    bot: Bot,
    discord: Arc<DiscordClient>,
    relay: Arc<Relay>,
}

impl AppState {
    /// Build both platform clients and check the Discord credentials.
    pub async fn init(config: Config) -> Result<Self> {
        let discord = Arc::new(DiscordClient::new(config.discord.clone())?);
        let me = discord
            .current_user()
            .await
            .context("Discord rejected the bot token")?;
        info!("{} ({}) has connected to Discord!", me.username, me.id);

        let bot = Bot::new(&config.telegram.bot_token);
        let relay = Arc::new(Relay::new(
            Arc::new(TelegramSource::new(bot.clone())),
            Arc::new(FfmpegTranscoder::new(config.relay.ffmpeg_path.clone())),
            discord.clone(),
            RelaySettings::from_config(&config),
        ));

        Ok(Self {
            config,
            bot,
            discord,
            relay,
        })
    }

    /// Serve until the inbound listener stops, then release the outbound client.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listen_addr();
        let result = telegram::run(self.bot, self.relay, &self.config.telegram, addr).await;

        info!("Shutting down Discord client");
        drop(self.discord);

        result
    }
}
