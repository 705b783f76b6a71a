use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::Command, application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers commands globally (propagation can take a while)
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        queue_command(),
        clear_command(),
    ]
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song from a Spotify or YouTube link, or search terms")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Link or search terms",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused song")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next song")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current song and what's waiting")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Empty the queue (the current song keeps playing)")
}
