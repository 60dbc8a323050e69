use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{input::Input, tracks::TrackHandle, Songbird};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::track::AudioResource;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("voice gateway error: {0}")]
    Join(#[from] songbird::error::JoinError),

    #[error("no voice connection in guild {0}")]
    NotConnected(GuildId),

    #[error("track control error: {0}")]
    Control(#[from] songbird::error::ControlError),
}

/// Voice connection and audio output of each guild.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Joins `channel_id` unless the guild already has a connection.
    async fn ensure_connected(&self, guild_id: GuildId, channel_id: ChannelId)
        -> Result<(), VoiceError>;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    /// Plays `resource` on the guild's connection, replacing any current track.
    async fn subscribe(&self, guild_id: GuildId, resource: &AudioResource)
        -> Result<(), VoiceError>;

    async fn stop(&self, guild_id: GuildId);

    /// Destroys the connection. `false` if there was none.
    async fn leave(&self, guild_id: GuildId) -> Result<bool, VoiceError>;
}

pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            current_tracks: DashMap::new(),
        }
    }
}

#[async_trait]
impl VoiceSession for SongbirdVoice {
    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), VoiceError> {
        if self.manager.get(guild_id).is_some() {
            debug!("Already connected in guild {}", guild_id);
            return Ok(());
        }

        self.manager.join(guild_id, channel_id).await?;
        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.manager.get(guild_id).is_some()
    }

    async fn subscribe(
        &self,
        guild_id: GuildId,
        resource: &AudioResource,
    ) -> Result<(), VoiceError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or(VoiceError::NotConnected(guild_id))?;

        let input = Input::from(songbird::input::File::new(resource.path.clone()));

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };
        handle.set_volume(resource.volume)?;

        if let Some(previous) = self.current_tracks.insert(guild_id, handle) {
            // play_only_input already stopped it; an error here just means it is gone
            if let Err(e) = previous.stop() {
                debug!("Previous track in guild {} already ended: {}", guild_id, e);
            }
        }

        debug!("▶️ Subscribed {} in guild {}", resource.path.display(), guild_id);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            if let Err(e) = track.stop() {
                warn!("Could not stop track in guild {}: {}", guild_id, e);
            }
        }
    }

    async fn leave(&self, guild_id: GuildId) -> Result<bool, VoiceError> {
        if self.manager.get(guild_id).is_none() {
            return Ok(false);
        }

        self.stop(guild_id).await;
        self.manager.remove(guild_id).await?;
        info!("👋 Left voice channel in guild {}", guild_id);
        Ok(true)
    }
}
