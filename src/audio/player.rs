use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    queue::{GuildMusicState, GuildQueueStore, QueueError, TimerHandle},
    track::{AudioResource, Track, TrackId, TrackStatus},
    voice::{VoiceError, VoiceSession},
};
use crate::sources::TrackInfo;

/// Something the chat side should hear about, addressed to the channel the
/// affected track was requested from.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    NowPlaying {
        guild_id: GuildId,
        channel_id: ChannelId,
        title: String,
    },
    /// The track had no playable audio and was skipped.
    ResourceMissing {
        guild_id: GuildId,
        channel_id: ChannelId,
        title: String,
    },
    NotConnected {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    /// The new front cannot start yet (still downloading, or failed).
    Waiting {
        guild_id: GuildId,
        channel_id: ChannelId,
        title: String,
        status: TrackStatus,
    },
    QueueExhausted {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
}

impl PlaybackEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlaybackEvent::NowPlaying { guild_id, .. }
            | PlaybackEvent::ResourceMissing { guild_id, .. }
            | PlaybackEvent::NotConnected { guild_id, .. }
            | PlaybackEvent::Waiting { guild_id, .. }
            | PlaybackEvent::QueueExhausted { guild_id, .. } => *guild_id,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        match self {
            PlaybackEvent::NowPlaying { channel_id, .. }
            | PlaybackEvent::ResourceMissing { channel_id, .. }
            | PlaybackEvent::NotConnected { channel_id, .. }
            | PlaybackEvent::Waiting { channel_id, .. }
            | PlaybackEvent::QueueExhausted { channel_id, .. } => *channel_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub id: TrackId,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started { title: String },
    AlreadyPlaying,
    FrontNotReady(TrackStatus),
    NotConnected,
    Exhausted,
    NoQueue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Started,
    Queued { position: usize },
    /// The track left the queue while it was downloading.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipOutcome {
    NoQueue,
    Empty,
    Skipped { title: String, next: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    NoQueue,
    OutOfRange,
    Deleted { title: String },
}

/// Decides when each guild's tracks start, advance and stop.
///
/// Every operation holds the guild's lock for its whole read-modify-write,
/// voice calls included, so commands, timers and download completions for one
/// guild are applied one at a time. Events are published after the lock is
/// released.
#[derive(Clone)]
pub struct PlaybackController {
    store: GuildQueueStore,
    voice: Arc<dyn VoiceSession>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    tick_interval: Duration,
    /// Disconnects we started ourselves and whose gateway echo has not arrived yet.
    own_leaves: Arc<DashMap<GuildId, usize>>,
}

impl PlaybackController {
    pub fn new(
        store: GuildQueueStore,
        voice: Arc<dyn VoiceSession>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            voice,
            events,
            tick_interval,
            own_leaves: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &GuildQueueStore {
        &self.store
    }

    /// Agrega un track en estado `DOWNLOAD`.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        info: TrackInfo,
        text_channel: ChannelId,
    ) -> Result<Enqueued, QueueError> {
        let state = self.store.get_or_create(guild_id);
        let mut state = state.lock().await;

        let track = Track::new(info, text_channel);
        let id = track.id.clone();
        let position = state.enqueue(track)?;

        Ok(Enqueued { id, position })
    }

    /// Joins `channel_id` unless already connected, then starts a `READY`
    /// front that was waiting for the connection.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<StartOutcome, VoiceError> {
        let Some(state) = self.store.get(guild_id) else {
            self.voice.ensure_connected(guild_id, channel_id).await?;
            return Ok(StartOutcome::NoQueue);
        };

        let mut events = Vec::new();
        let outcome = {
            let mut state = state.lock().await;
            self.voice.ensure_connected(guild_id, channel_id).await?;
            self.start_front(guild_id, &mut state, None, &mut events)
                .await
        };
        self.publish(events);
        Ok(outcome)
    }

    pub async fn start_if_idle(&self, guild_id: GuildId) -> StartOutcome {
        let Some(state) = self.store.get(guild_id) else {
            return StartOutcome::NoQueue;
        };

        let mut events = Vec::new();
        let outcome = {
            let mut state = state.lock().await;
            self.start_front(guild_id, &mut state, None, &mut events)
                .await
        };
        self.publish(events);
        outcome
    }

    /// Marks a finished download `READY` and starts it when it is the front.
    pub async fn on_download_ready(
        &self,
        guild_id: GuildId,
        id: &TrackId,
        resource: AudioResource,
    ) -> DownloadOutcome {
        let Some(state) = self.store.get(guild_id) else {
            return DownloadOutcome::Discarded;
        };

        let mut events = Vec::new();
        let outcome = {
            let mut state = state.lock().await;

            let Some(position) = state.position_of(id) else {
                debug!("Download {} finished after leaving the queue", id);
                return DownloadOutcome::Discarded;
            };
            match state.track_mut(id) {
                Some(track) if track.status == TrackStatus::Download => {
                    track.status = TrackStatus::Ready;
                    track.resource = Some(resource);
                }
                _ => return DownloadOutcome::Discarded,
            }

            if position > 1 {
                info!("📥 Ready at position {} in guild {}", position, guild_id);
                DownloadOutcome::Queued { position }
            } else {
                match self
                    .start_front(guild_id, &mut state, None, &mut events)
                    .await
                {
                    StartOutcome::Started { .. } => DownloadOutcome::Started,
                    _ => DownloadOutcome::Queued { position },
                }
            }
        };
        self.publish(events);
        outcome
    }

    /// `DOWNLOAD -> ERROR`. The entry stays queued until skipped or deleted.
    pub async fn on_download_failed(&self, guild_id: GuildId, id: &TrackId) {
        let Some(state) = self.store.get(guild_id) else {
            return;
        };
        let mut state = state.lock().await;

        if let Some(track) = state.track_mut(id) {
            if track.status == TrackStatus::Download {
                warn!("❌ Download failed for {} in guild {}", track.title, guild_id);
                track.status = TrackStatus::Error;
            }
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> SkipOutcome {
        let Some(state) = self.store.get(guild_id) else {
            return SkipOutcome::NoQueue;
        };

        let mut events = Vec::new();
        let outcome = {
            let mut state = state.lock().await;
            match self
                .finish_front(guild_id, &mut state, TrackStatus::Skip, &mut events)
                .await
            {
                Some((title, next)) => SkipOutcome::Skipped {
                    title,
                    next: match next {
                        StartOutcome::Started { title } => Some(title),
                        _ => None,
                    },
                },
                None => SkipOutcome::Empty,
            }
        };
        self.publish(events);
        outcome
    }

    /// Removes the entry at a 1-based `position`.
    ///
    /// Deleting the playing track is a skip: its timers are cancelled and the
    /// next track starts.
    pub async fn delete(&self, guild_id: GuildId, position: usize) -> DeleteOutcome {
        let Some(state) = self.store.get(guild_id) else {
            return DeleteOutcome::NoQueue;
        };

        let mut events = Vec::new();
        let outcome = {
            let mut state = state.lock().await;
            if position == 0 || position > state.len() {
                return DeleteOutcome::OutOfRange;
            }

            let front_playing = state
                .front()
                .is_some_and(|track| track.status == TrackStatus::Playing);

            if position == 1 && front_playing {
                match self
                    .finish_front(guild_id, &mut state, TrackStatus::Skip, &mut events)
                    .await
                {
                    Some((title, _)) => DeleteOutcome::Deleted { title },
                    None => DeleteOutcome::OutOfRange,
                }
            } else {
                let Some(id) = state.remove_at(position) else {
                    return DeleteOutcome::OutOfRange;
                };
                let Some(track) = state.track_mut(&id) else {
                    return DeleteOutcome::OutOfRange;
                };
                if track.status.is_in_flight() {
                    track.status = TrackStatus::Skip;
                }
                track.resource = None;
                let title = track.title.clone();
                let channel = track.text_channel;

                // el nuevo frente puede estar listo
                if position == 1 {
                    self.start_front(guild_id, &mut state, Some(channel), &mut events)
                        .await;
                }
                DeleteOutcome::Deleted { title }
            }
        };
        self.publish(events);
        outcome
    }

    /// Empties the queue and stops playback. `false` if the guild never queued anything.
    pub async fn clear(&self, guild_id: GuildId) -> bool {
        let Some(state) = self.store.get(guild_id) else {
            return false;
        };

        let mut state = state.lock().await;
        state.clear();
        self.voice.stop(guild_id).await;
        true
    }

    /// Leaves voice and clears the queue. `Ok(false)` when there was no
    /// connection, in which case nothing is touched.
    pub async fn leave(&self, guild_id: GuildId) -> Result<bool, VoiceError> {
        let state = self.store.get(guild_id);
        let mut guard = match &state {
            Some(state) => Some(state.lock().await),
            None => None,
        };

        if !self.leave_voice(guild_id).await? {
            return Ok(false);
        }

        if let Some(state) = guard.as_mut() {
            state.clear();
        }
        Ok(true)
    }

    /// Leaves voice only if the queue is still empty.
    pub async fn leave_if_idle(&self, guild_id: GuildId) -> bool {
        let state = self.store.get(guild_id);
        let guard = match &state {
            Some(state) => Some(state.lock().await),
            None => None,
        };

        if guard.as_ref().is_some_and(|state| !state.is_empty()) {
            debug!("Queue refilled in guild {}, staying connected", guild_id);
            return false;
        }

        match self.leave_voice(guild_id).await {
            Ok(left) => left,
            Err(e) => {
                error!("Error leaving voice in guild {}: {:?}", guild_id, e);
                false
            }
        }
    }

    /// The bot's voice connection in `guild_id` went away.
    ///
    /// The echo of a leave we asked for is ignored, so a track queued right
    /// after an auto-leave survives. Any other disconnect (kicked, channel
    /// deleted) tears the connection down and clears the queue. Returns
    /// whether the queue was cleared.
    pub async fn on_voice_disconnected(&self, guild_id: GuildId) -> bool {
        if self.take_own_leave(guild_id) {
            debug!("Voice disconnect in guild {} was our own leave", guild_id);
            return false;
        }

        info!("🔌 Disconnected from voice in guild {}, clearing queue", guild_id);
        let state = self.store.get(guild_id);
        let mut guard = match &state {
            Some(state) => Some(state.lock().await),
            None => None,
        };

        if let Err(e) = self.voice.leave(guild_id).await {
            warn!("Error tearing down voice in guild {}: {:?}", guild_id, e);
        }

        match guard.as_mut() {
            Some(state) => {
                state.clear();
                true
            }
            None => false,
        }
    }

    /// `None` when the guild never queued anything.
    pub async fn list(&self, guild_id: GuildId) -> Option<Vec<String>> {
        let state = self.store.get(guild_id)?;
        let state = state.lock().await;
        Some(state.queue_titles())
    }

    pub async fn history(&self, guild_id: GuildId) -> Option<Vec<String>> {
        let state = self.store.get(guild_id)?;
        let state = state.lock().await;
        Some(state.history_lines())
    }

    /// Leaves voice and remembers that the disconnect was ours.
    async fn leave_voice(&self, guild_id: GuildId) -> Result<bool, VoiceError> {
        *self.own_leaves.entry(guild_id).or_insert(0) += 1;

        let left = self.voice.leave(guild_id).await;
        if !matches!(left, Ok(true)) {
            self.take_own_leave(guild_id);
        }
        left
    }

    fn take_own_leave(&self, guild_id: GuildId) -> bool {
        let Some(mut pending) = self.own_leaves.get_mut(&guild_id) else {
            return false;
        };
        *pending -= 1;
        let settled = *pending == 0;
        drop(pending);

        if settled {
            self.own_leaves.remove_if(&guild_id, |_, pending| *pending == 0);
        }
        true
    }

    async fn on_advance_timer(&self, guild_id: GuildId, epoch: u64) {
        let Some(state) = self.store.get(guild_id) else {
            return;
        };

        let mut events = Vec::new();
        {
            let mut state = state.lock().await;
            if state.epoch() != epoch {
                debug!("Stale advance timer ignored in guild {}", guild_id);
                return;
            }

            let played_ms = state.elapsed_play_ms();
            if let Some((title, _)) = self
                .finish_front(guild_id, &mut state, TrackStatus::Done, &mut events)
                .await
            {
                info!("✅ Finished {} (~{} ms played)", title, played_ms);
            }
        }
        self.publish(events);
    }

    /// Takes the front out of the queue with `status` and moves on to the next
    /// one. `None` when the queue is empty.
    async fn finish_front(
        &self,
        guild_id: GuildId,
        state: &mut GuildMusicState,
        status: TrackStatus,
        events: &mut Vec<PlaybackEvent>,
    ) -> Option<(String, StartOutcome)> {
        let was_playing = state.front()?.status == TrackStatus::Playing;

        state.cancel_timers();
        state.reset_elapsed();
        let id = state.pop_front()?;

        let track = state.track_mut(&id)?;
        if track.status.is_in_flight() {
            track.status = status;
        }
        track.resource = None;
        let title = track.title.clone();
        let channel = track.text_channel;

        if was_playing {
            self.voice.stop(guild_id).await;
        }

        let next = self
            .start_front(guild_id, state, Some(channel), events)
            .await;
        Some((title, next))
    }

    /// Starts the front track unless something is already playing.
    ///
    /// A `READY` front without audio is skipped and the next one is tried.
    /// `left_from` is the text channel of the last track that left the queue
    /// during this operation; when set, running dry is announced.
    async fn start_front(
        &self,
        guild_id: GuildId,
        state: &mut GuildMusicState,
        mut left_from: Option<ChannelId>,
        events: &mut Vec<PlaybackEvent>,
    ) -> StartOutcome {
        loop {
            let Some(front) = state.front() else {
                if let Some(channel_id) = left_from {
                    info!("📭 Queue exhausted in guild {}", guild_id);
                    events.push(PlaybackEvent::QueueExhausted {
                        guild_id,
                        channel_id,
                    });
                }
                return StartOutcome::Exhausted;
            };

            let id = front.id.clone();
            let title = front.title.clone();
            let channel_id = front.text_channel;
            let duration = front.duration();

            match front.status {
                TrackStatus::Ready => {}
                TrackStatus::Playing => return StartOutcome::AlreadyPlaying,
                status => {
                    if left_from.is_some() {
                        events.push(PlaybackEvent::Waiting {
                            guild_id,
                            channel_id,
                            title,
                            status,
                        });
                    }
                    return StartOutcome::FrontNotReady(status);
                }
            }

            if !self.voice.is_connected(guild_id).await {
                warn!("🔇 No voice connection in guild {}, {} stays ready", guild_id, title);
                events.push(PlaybackEvent::NotConnected {
                    guild_id,
                    channel_id,
                });
                return StartOutcome::NotConnected;
            }

            let resource = state.track_mut(&id).and_then(|track| track.resource.take());
            let failed_status = match resource {
                Some(resource) => match self.voice.subscribe(guild_id, &resource).await {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Error starting {} in guild {}: {:?}", title, guild_id, e);
                        Some(TrackStatus::Error)
                    }
                },
                None => {
                    warn!("⏭️ {} has no audio resource, skipping", title);
                    Some(TrackStatus::Skip)
                }
            };

            if let Some(status) = failed_status {
                state.set_status(&id, status);
                state.pop_front();
                events.push(PlaybackEvent::ResourceMissing {
                    guild_id,
                    channel_id,
                    title,
                });
                left_from = Some(channel_id);
                continue;
            }

            state.set_status(&id, TrackStatus::Playing);
            state.reset_elapsed();
            self.arm_timers(guild_id, state, duration);

            info!("🎵 Now playing in guild {}: {}", guild_id, title);
            events.push(PlaybackEvent::NowPlaying {
                guild_id,
                channel_id,
                title: title.clone(),
            });
            return StartOutcome::Started { title };
        }
    }

    fn arm_timers(&self, guild_id: GuildId, state: &mut GuildMusicState, duration: Duration) {
        state.cancel_timers();
        let epoch = state.epoch();

        let controller = self.clone();
        let advance = TimerHandle::once(duration, async move {
            controller.on_advance_timer(guild_id, epoch).await;
        });

        let elapsed = state.elapsed_counter();
        let step_ms = self.tick_interval.as_millis() as u64;
        let tick = TimerHandle::every(self.tick_interval, move || {
            elapsed.fetch_add(step_ms, Ordering::Relaxed);
        });

        debug!(
            "⏱️ Advance timer armed for {} in guild {}",
            humantime::format_duration(duration),
            guild_id
        );
        state.arm_timers(advance, tick);
    }

    fn publish(&self, events: Vec<PlaybackEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                debug!("Playback event dropped, no listener");
            }
        }
    }
}
