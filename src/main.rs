use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{events, player::AudioPlayer},
    bot::MusicBot,
    config::Config,
    sources::SourceManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    let sources = Arc::new(SourceManager::new(&config)?);

    if std::env::args().any(|arg| arg == "--health-check") {
        sources.verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    // Track-end notifications from every voice call feed a single dispatcher
    let (event_tx, event_rx) = events::channel();
    let player = Arc::new(AudioPlayer::new(config.max_queue_size));
    tokio::spawn(events::dispatch(player.clone(), event_rx));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), player, sources, event_tx);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Shutdown signal received, closing...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Could not listen for Ctrl+C: {:?}", e),
        }
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
