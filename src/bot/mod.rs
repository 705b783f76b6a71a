//! # Bot Module
//!
//! Discord-facing side of the bot.
//!
//! - Slash command registration ([`commands`])
//! - Command handling ([`handlers`])
//! - Voice connection management and bot-disconnect cleanup
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait. It owns no queue
//! state itself: the [`AudioPlayer`] registry and the [`TrackResolver`] are
//! created in `main` and handed in, and every voice connection gets a
//! [`SongbirdSink`] attached to the player.

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        events::EventSender,
        player::AudioPlayer,
        sink::{SongbirdSink, VoiceSink},
    },
    config::Config,
    sources::TrackResolver,
};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, volume, limits)
/// - `player`: Per-guild queues shared with the playback event dispatcher
/// - `resolver`: Turns `/play` queries into tracks
/// - `events`: Handed to every voice sink so track ends reach the dispatcher
pub struct MusicBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
    pub resolver: Arc<dyn TrackResolver>,
    events: EventSender,
    http: reqwest::Client,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        player: Arc<AudioPlayer>,
        resolver: Arc<dyn TrackResolver>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            player,
            resolver,
            events,
            http: reqwest::Client::new(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per-guild when `GUILD_ID` is set (updates show
    /// up almost immediately), globally otherwise (can take up to an hour).
    ///
    /// # Required Permissions
    ///
    /// The bot must have `applications.commands` permission in the target guild(s).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .with_context(|| format!("could not register commands in guild {}", guild_id))?;
                info!("✅ Commands registered for guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx)
                    .await
                    .context("could not register global commands")?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Makes sure the guild has a voice output, joining `channel_id` if not.
    ///
    /// Concurrent `/play` calls for one guild join once; later ones keep the
    /// existing connection and its current track.
    pub async fn ensure_voice(&self, ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.player
            .ensure_sink(guild_id, || self.join_voice_channel(ctx, guild_id, channel_id))
            .await?;
        Ok(())
    }

    /// Joins a voice channel and builds a songbird sink for it.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceSink>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

        let call = manager
            .join(guild_id, channel_id)
            .await
            .context("failed to join voice channel")?;

        let sink = SongbirdSink::new(
            guild_id,
            call,
            self.http.clone(),
            self.config.default_volume,
            self.events.clone(),
        );

        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(Arc::new(sink))
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Resets a guild's playback when the bot gets disconnected from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Disconnected from voice in guild {}", guild_id);
        self.player.detach(guild_id).await;

        if let Some(manager) = songbird::get(&ctx).await {
            if let Err(e) = manager.remove(guild_id).await {
                warn!("Error removing voice call for guild {}: {:?}", guild_id, e);
            }
        }
    }
}
