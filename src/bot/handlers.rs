use anyhow::Result;
use serenity::{
    async_trait,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::commands::{help_text, CommandSpec, GuildCommand, MusicCommand};
use crate::{
    audio::{
        fetcher::TrackFetcher,
        player::{DeleteOutcome, DownloadOutcome, PlaybackController, SkipOutcome},
        queue::QueueError,
    },
    sources::TrackSearch,
};

/// Where command replies go.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}

/// Where a command came from.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub guild_id: Option<GuildId>,
    pub text_channel: ChannelId,
    /// Voice channel the author is in, if any.
    pub voice_channel: Option<ChannelId>,
}

/// Todo lo que necesitan los comandos de música
#[derive(Clone)]
pub struct MusicContext {
    pub player: PlaybackController,
    pub fetcher: TrackFetcher,
    pub search: Arc<dyn TrackSearch>,
    pub prefix: String,
}

/// Runs one parsed command and answers through `responder`.
pub async fn handle_command(
    music: &MusicContext,
    ctx: CommandContext,
    command: MusicCommand,
    responder: Arc<dyn Responder>,
) -> Result<()> {
    info!("📝 {:?} in guild {:?}", command, ctx.guild_id);

    match command {
        MusicCommand::Help => responder.say(&help_text(&music.prefix)).await,
        MusicCommand::Usage(spec) => handle_usage(music, spec, responder.as_ref()).await,
        MusicCommand::Unknown(name) => {
            responder
                .say(&format!(
                    "❓ Unknown command `{0}{name}`. Try `{0}help`.",
                    music.prefix
                ))
                .await
        }
        MusicCommand::Guild(command) => {
            let Some(guild_id) = ctx.guild_id else {
                return responder.say("❌ Music commands only work in a server.").await;
            };

            match command {
                GuildCommand::Play { keyword } => {
                    handle_play(music, guild_id, ctx, &keyword, responder).await?;
                    Ok(())
                }
                GuildCommand::List => handle_list(music, guild_id, responder.as_ref()).await,
                GuildCommand::History => {
                    handle_history(music, guild_id, responder.as_ref()).await
                }
                GuildCommand::Skip => handle_skip(music, guild_id, responder.as_ref()).await,
                GuildCommand::Delete { index } => {
                    handle_delete(music, guild_id, index, responder.as_ref()).await
                }
                GuildCommand::Clear => handle_clear(music, guild_id, responder.as_ref()).await,
                GuildCommand::Leave => handle_leave(music, guild_id, responder.as_ref()).await,
            }
        }
    }
}

async fn handle_usage(
    music: &MusicContext,
    spec: &CommandSpec,
    responder: &dyn Responder,
) -> Result<()> {
    responder
        .say(&format!("ℹ️ Usage: `{}`", spec.usage(&music.prefix)))
        .await
}

/// Resolves `keyword`, queues the result and starts its download.
///
/// Returns the download task so callers can wait for it; the command itself
/// is answered as soon as the track is queued.
pub async fn handle_play(
    music: &MusicContext,
    guild_id: GuildId,
    ctx: CommandContext,
    keyword: &str,
    responder: Arc<dyn Responder>,
) -> Result<Option<JoinHandle<()>>> {
    let Some(voice_channel) = ctx.voice_channel else {
        responder
            .say("🔇 Join a voice channel to use music commands.")
            .await?;
        return Ok(None);
    };

    // un track READY que esperaba la conexión puede arrancar ahora
    if let Err(e) = music.player.connect(guild_id, voice_channel).await {
        error!("Error joining voice in guild {}: {:?}", guild_id, e);
        responder
            .say("❌ Could not join your voice channel.")
            .await?;
        return Ok(None);
    }

    let info = match music.search.search(keyword).await {
        Ok(Some(info)) => info,
        Ok(None) => {
            responder
                .say(&format!("🔍 '{keyword}' does not exist."))
                .await?;
            return Ok(None);
        }
        Err(e) => {
            error!("Search failed for {}: {}", keyword, e);
            responder
                .say(&format!("❌ Failed to load data.\n{}", e.user_message()))
                .await?;
            return Ok(None);
        }
    };

    let title = info.title.clone();
    let locator = info.locator.clone();
    let enqueued = match music.player.enqueue(guild_id, info, ctx.text_channel).await {
        Ok(enqueued) => enqueued,
        Err(QueueError::Full { max }) => {
            responder
                .say(&format!("🚫 The queue is full ({max} songs max)."))
                .await?;
            return Ok(None);
        }
    };

    // the queue may have run out and the bot left while we were searching
    if let Err(e) = music.player.connect(guild_id, voice_channel).await {
        warn!("Could not rejoin voice in guild {}: {:?}", guild_id, e);
    }

    responder.say(&format!("📥 Downloading '{title}'.")).await?;

    let fetcher = music.fetcher.clone();
    let task = tokio::spawn(async move {
        let outcome = fetcher.fetch(guild_id, &enqueued.id, &locator).await;
        let reply = match outcome {
            Ok(DownloadOutcome::Queued { position }) if position > 1 => {
                format!("➕ Added '{title}' to the queue at position {position}.")
            }
            // the announcer covers the front of the queue
            Ok(_) => return,
            Err(e) => format!("❌ Failed to download {}.", e.path().display()),
        };

        if let Err(e) = responder.say(&reply).await {
            warn!("Could not send download result: {:?}", e);
        }
    });

    Ok(Some(task))
}

async fn handle_list(music: &MusicContext, guild_id: GuildId, responder: &dyn Responder) -> Result<()> {
    match music.player.list(guild_id).await {
        Some(lines) if !lines.is_empty() => responder.say(&lines.join("\n")).await,
        _ => responder.say("📭 Nothing is playing right now.").await,
    }
}

async fn handle_history(
    music: &MusicContext,
    guild_id: GuildId,
    responder: &dyn Responder,
) -> Result<()> {
    match music.player.history(guild_id).await {
        Some(lines) if !lines.is_empty() => responder.say(&lines.join("\n")).await,
        _ => responder.say("📭 No songs have been played yet.").await,
    }
}

async fn handle_skip(music: &MusicContext, guild_id: GuildId, responder: &dyn Responder) -> Result<()> {
    match music.player.skip(guild_id).await {
        SkipOutcome::Skipped { title, .. } => {
            responder.say(&format!("⏭️ Skipped '{title}'.")).await
        }
        SkipOutcome::NoQueue | SkipOutcome::Empty => {
            responder.say("📭 There is nothing to skip.").await
        }
    }
}

async fn handle_delete(
    music: &MusicContext,
    guild_id: GuildId,
    index: usize,
    responder: &dyn Responder,
) -> Result<()> {
    match music.player.delete(guild_id, index).await {
        DeleteOutcome::Deleted { title } => {
            responder
                .say(&format!("🗑️ Deleted {index}. {title}."))
                .await
        }
        DeleteOutcome::OutOfRange => {
            responder
                .say(&format!("❌ There is no song at position {index}."))
                .await
        }
        DeleteOutcome::NoQueue => responder.say("📭 This server has no queue.").await,
    }
}

async fn handle_clear(music: &MusicContext, guild_id: GuildId, responder: &dyn Responder) -> Result<()> {
    if music.player.clear(guild_id).await {
        responder.say("🧹 Cleared the queue.").await
    } else {
        responder.say("📭 This server has no queue.").await
    }
}

async fn handle_leave(music: &MusicContext, guild_id: GuildId, responder: &dyn Responder) -> Result<()> {
    match music.player.leave(guild_id).await {
        Ok(true) => responder.say("👋 Leaving the voice channel.").await,
        Ok(false) => responder.say("🔇 I'm not in a voice channel.").await,
        Err(e) => {
            error!("Error leaving voice in guild {}: {:?}", guild_id, e);
            responder
                .say("❌ Could not leave the voice channel.")
                .await
        }
    }
}
