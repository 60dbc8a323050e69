use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;

use crate::audio::{
    fetcher::TrackFetcher, player::PlaybackController, queue::GuildQueueStore,
    voice::{SongbirdVoice, VoiceSession},
};
use crate::bot::{handlers::MusicContext, DjBot};
use crate::config::Config;
use crate::sources::{YouTubeApiV3, YtDlpSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_dj=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting guild-dj v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Config::load()?;
    info!("{}", config.summary());

    // Voz
    let songbird = Songbird::serenity();
    let voice: Arc<dyn VoiceSession> = Arc::new(SongbirdVoice::new(songbird.clone()));

    // Cola y reproducción
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let player = PlaybackController::new(
        GuildQueueStore::new(config.max_queue_size),
        voice,
        events_tx,
        config.tick_interval(),
    );

    let fetcher = TrackFetcher::new(
        player.clone(),
        Arc::new(YtDlpSource::new(config.ytdlp_format.clone())),
        config.music_dir.clone(),
        config.audio_extension.clone(),
        config.default_volume,
    );
    let search = Arc::new(YouTubeApiV3::new(
        config.youtube_api_key.clone(),
        config.search_timeout(),
    )?);

    let handler = DjBot::new(MusicContext {
        player: player.clone(),
        fetcher,
        search,
        prefix: config.command_prefix.clone(),
    });

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(bot::events::run_announcer(
        events_rx,
        client.http.clone(),
        player,
    ));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp is missing");
    }
}
