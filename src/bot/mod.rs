//! # Bot Module
//!
//! Discord side of guild-dj: prefix commands in, text replies and playback
//! notices out.
//!
//! ## Architecture
//!
//! The bot is built around the [`DjBot`] struct which implements Serenity's
//! [`EventHandler`] trait. It:
//!
//! - Parses `~`-prefixed messages with [`commands::parse`]
//! - Runs them through [`handlers::handle_command`] against the shared
//!   [`MusicContext`]
//! - Clears a guild's queue when the bot is disconnected from voice
//!
//! Playback notices (now playing, queue exhausted, ...) are not produced here;
//! they come from [`events::run_announcer`], which `main` spawns next to the
//! client.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    async_trait,
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod events;
pub mod handlers;

use handlers::{CommandContext, MusicContext, Responder};

/// Discord message length limit.
const MAX_MESSAGE_LEN: usize = 2000;

/// Main Discord event handler.
///
/// Holds no per-guild state itself; everything lives in the
/// [`PlaybackController`](crate::audio::player::PlaybackController) inside
/// [`MusicContext`].
pub struct DjBot {
    music: MusicContext,
}

impl DjBot {
    pub fn new(music: MusicContext) -> Self {
        Self { music }
    }

    /// Voice channel `user_id` is currently in, from the gateway cache.
    fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = guild_id.to_guild_cached(&ctx.cache)?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
    }
}

#[async_trait]
impl EventHandler for DjBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());
    }

    /// Parses prefix commands and runs them.
    ///
    /// Messages from bots and messages without the prefix are ignored.
    /// Errors are logged; a failed reply never takes the handler down.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = commands::parse(&self.music.prefix, &msg.content) else {
            return;
        };

        let command_ctx = CommandContext {
            guild_id: msg.guild_id,
            text_channel: msg.channel_id,
            voice_channel: msg
                .guild_id
                .and_then(|guild_id| Self::user_voice_channel(&ctx, guild_id, msg.author.id)),
        };
        debug!("Command from {} in {:?}", msg.author.name, msg.guild_id);

        let responder = Arc::new(ChannelResponder {
            http: ctx.http.clone(),
            channel_id: msg.channel_id,
        });

        if let Err(e) = handlers::handle_command(&self.music, command_ctx, command, responder).await {
            error!("Error handling command: {:?}", e);
        }
    }

    /// Reports the bot's own voice disconnects to the controller, which clears
    /// the queue unless the bot left on its own.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if self.music.player.on_voice_disconnected(guild_id).await {
            info!("🔌 Queue cleared after losing voice in guild {}", guild_id);
        }
    }
}

/// Replies in the channel the command came from.
struct ChannelResponder {
    http: Arc<Http>,
    channel_id: ChannelId,
}

#[async_trait]
impl Responder for ChannelResponder {
    async fn say(&self, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.channel_id.say(&self.http, chunk).await?;
        }
        Ok(())
    }
}

/// Splits `text` into pieces of at most `max` bytes, on line breaks when possible.
fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let mut line = line;
        while line.len() > max {
            let mut cut = max;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(line[..cut].to_string());
            line = &line[cut..];
        }

        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_messages_are_sent_whole() {
        assert_eq!(split_message("1. A\n2. B", 2000), vec!["1. A\n2. B"]);
    }

    #[test]
    fn long_lists_split_on_line_breaks() {
        let text = (1..=5)
            .map(|i| format!("{i}. song"))
            .collect::<Vec<_>>()
            .join("\n");

        let chunks = split_message(&text, 16);

        assert_eq!(chunks, vec!["1. song\n2. song", "3. song\n4. song", "5. song"]);
        assert!(chunks.iter().all(|c| c.len() <= 16));
    }

    #[test]
    fn overlong_lines_are_cut_on_char_boundaries() {
        let text = "ñ".repeat(5);

        let chunks = split_message(&text, 4);

        assert_eq!(chunks, vec!["ññ", "ññ", "ñ"]);
    }
}
