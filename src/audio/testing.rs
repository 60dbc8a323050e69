//! In-memory collaborators for tests.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use super::{
    track::AudioResource,
    voice::{VoiceError, VoiceSession},
};

/// Records what the controller asked of the voice layer.
#[derive(Default)]
pub struct FakeVoice {
    connected: Mutex<HashSet<GuildId>>,
    played: Mutex<Vec<(GuildId, PathBuf)>>,
    stops: AtomicUsize,
    leaves: AtomicUsize,
}

impl FakeVoice {
    pub fn connected_to(guild_id: GuildId) -> Self {
        let voice = Self::default();
        voice.connected.lock().unwrap().insert(guild_id);
        voice
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Loses the connection without going through `leave`, like being kicked.
    pub fn drop_connection(&self, guild_id: GuildId) {
        self.connected.lock().unwrap().remove(&guild_id);
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceSession for FakeVoice {
    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<(), VoiceError> {
        self.connected.lock().unwrap().insert(guild_id);
        Ok(())
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().unwrap().contains(&guild_id)
    }

    async fn subscribe(
        &self,
        guild_id: GuildId,
        resource: &AudioResource,
    ) -> Result<(), VoiceError> {
        if !self.is_connected(guild_id).await {
            return Err(VoiceError::NotConnected(guild_id));
        }
        self.played
            .lock()
            .unwrap()
            .push((guild_id, resource.path.clone()));
        Ok(())
    }

    async fn stop(&self, _guild_id: GuildId) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn leave(&self, guild_id: GuildId) -> Result<bool, VoiceError> {
        let existed = self.connected.lock().unwrap().remove(&guild_id);
        if existed {
            self.leaves.fetch_add(1, Ordering::SeqCst);
        }
        Ok(existed)
    }
}
