use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{bot::MusicBot, ui::messages};

/// Handles slash commands
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, messages::NOT_IN_GUILD).await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await,
        _ => reply(ctx, &command, messages::UNKNOWN_COMMAND).await,
    }
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing query option"))?
        .to_string();

    // Resolving can take a few seconds
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, messages::NOT_IN_VOICE).await;
    };

    if let Err(e) = bot.ensure_voice(ctx, guild_id, voice_channel_id).await {
        warn!("Could not join voice in guild {}: {:?}", guild_id, e);
        return edit(ctx, command, messages::JOIN_FAILED).await;
    }

    let content = match bot.player.play_request(guild_id, bot.resolver.as_ref(), &query).await {
        Ok(outcome) => messages::play_outcome(&outcome),
        Err(e) => messages::error(&e),
    };

    edit(ctx, command, &content).await
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let content = match bot.player.pause(guild_id).await {
        Ok(()) => messages::PAUSED.to_string(),
        Err(e) => messages::error(&e),
    };
    reply(ctx, command, &content).await
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let content = match bot.player.resume(guild_id).await {
        Ok(()) => messages::RESUMED.to_string(),
        Err(e) => messages::error(&e),
    };
    reply(ctx, command, &content).await
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let content = match bot.player.skip(guild_id).await {
        Ok(outcome) => messages::skipped(&outcome),
        Err(e) => messages::error(&e),
    };
    reply(ctx, command, &content).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let snapshot = bot.player.inspect(guild_id).await;
    reply(ctx, command, &messages::queue(&snapshot)).await
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let removed = bot.player.clear(guild_id).await;
    reply(ctx, command, &messages::cleared(removed)).await
}

// Helpers

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
