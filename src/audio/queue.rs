use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::track::{Track, TrackId, TrackStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("the queue is full (maximum {max} tracks)")]
    Full { max: usize },
}

/// Owned, cancellable timer task.
///
/// Cancelling (or dropping) the handle guarantees the callback never starts
/// afterwards. A callback that already started is not interrupted.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Runs `callback` once after `delay`.
    ///
    /// The callback is spawned as its own task so that cancelling this handle
    /// from inside the callback cannot abort it halfway.
    pub fn once<F>(delay: Duration, callback: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !child.is_cancelled() {
                        tokio::spawn(callback);
                    }
                }
            }
        });

        Self { token, task }
    }

    /// Calls `on_tick` every `period`, first call one period from now.
    pub fn every<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => on_tick(),
                }
            }
        });

        Self { token, task }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Music state of one guild.
///
/// `history` holds the only record of every track ever enqueued; `queue` holds
/// ids into it, front first. A status change is therefore visible from both
/// views at once.
#[derive(Debug)]
pub struct GuildMusicState {
    queue: VecDeque<TrackId>,
    history: Vec<Track>,
    index: HashMap<TrackId, usize>,
    elapsed_play_ms: Arc<AtomicU64>,
    advance_timer: Option<TimerHandle>,
    tick_timer: Option<TimerHandle>,
    playback_epoch: u64,
    max_size: usize,
}

impl GuildMusicState {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            history: Vec::new(),
            index: HashMap::new(),
            elapsed_play_ms: Arc::new(AtomicU64::new(0)),
            advance_timer: None,
            tick_timer: None,
            playback_epoch: 0,
            max_size,
        }
    }

    /// Agrega un track a la cola y al historial; devuelve su posición (desde 1).
    pub fn enqueue(&mut self, track: Track) -> Result<usize, QueueError> {
        if self.queue.len() >= self.max_size {
            return Err(QueueError::Full { max: self.max_size });
        }

        info!("➕ Queued: {}", track.title);
        self.index.insert(track.id.clone(), self.history.len());
        self.queue.push_back(track.id.clone());
        self.history.push(track);

        Ok(self.queue.len())
    }

    /// Removes the entry at a 1-based `position`, shifting the rest forward.
    pub fn remove_at(&mut self, position: usize) -> Option<TrackId> {
        if position == 0 || position > self.queue.len() {
            return None;
        }

        let id = self.queue.remove(position - 1)?;
        debug!("❌ Removed queue entry at position {}", position);
        Some(id)
    }

    pub fn pop_front(&mut self) -> Option<TrackId> {
        self.queue.pop_front()
    }

    pub fn front(&self) -> Option<&Track> {
        self.queue.front().and_then(|id| self.track(id))
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.history[i])
    }

    pub fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.index.get(id).map(|&i| &mut self.history[i])
    }

    /// 1-based position of `id` in the live queue.
    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.queue.iter().position(|queued| queued == id).map(|i| i + 1)
    }

    pub fn set_status(&mut self, id: &TrackId, status: TrackStatus) -> bool {
        match self.track_mut(id) {
            Some(track) => {
                debug!("{} {} -> {}", track.title, track.status, status);
                track.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    /// Queue entries as `"1. title"` lines, front first.
    pub fn queue_titles(&self) -> Vec<String> {
        self.queue
            .iter()
            .filter_map(|id| self.track(id))
            .enumerate()
            .map(|(i, track)| format!("{}. {}", i + 1, track.title))
            .collect()
    }

    /// History entries as `"1. title [STATUS]"` lines, oldest first.
    pub fn history_lines(&self) -> Vec<String> {
        self.history
            .iter()
            .enumerate()
            .map(|(i, track)| format!("{}. {} [{}]", i + 1, track.title, track.status))
            .collect()
    }

    pub fn playing_count(&self) -> usize {
        self.history
            .iter()
            .filter(|track| track.status == TrackStatus::Playing)
            .count()
    }

    pub fn elapsed_play_ms(&self) -> u64 {
        self.elapsed_play_ms.load(Ordering::Relaxed)
    }

    pub fn elapsed_counter(&self) -> Arc<AtomicU64> {
        self.elapsed_play_ms.clone()
    }

    pub fn reset_elapsed(&mut self) {
        self.elapsed_play_ms.store(0, Ordering::Relaxed);
    }

    /// Identifies the current playback; bumped every time timers are cancelled.
    pub fn epoch(&self) -> u64 {
        self.playback_epoch
    }

    pub fn has_timers(&self) -> bool {
        self.advance_timer.is_some() || self.tick_timer.is_some()
    }

    /// Installs both timers, cancelling whatever was armed before. The epoch
    /// is left alone so callers can capture it before building the timers.
    pub fn arm_timers(&mut self, advance: TimerHandle, tick: TimerHandle) {
        self.drop_timers();
        self.advance_timer = Some(advance);
        self.tick_timer = Some(tick);
    }

    /// Cancels both timers and starts a new epoch.
    pub fn cancel_timers(&mut self) {
        self.drop_timers();
        self.playback_epoch += 1;
    }

    fn drop_timers(&mut self) {
        if let Some(timer) = self.advance_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.tick_timer.take() {
            timer.cancel();
        }
    }

    /// Limpia la cola. History keeps every entry; unfinished ones become `Skip`.
    pub fn clear(&mut self) {
        self.cancel_timers();

        for track in self.history.iter_mut() {
            if track.status.is_in_flight() {
                track.status = TrackStatus::Skip;
            }
            track.resource = None;
        }

        self.queue.clear();
        self.reset_elapsed();
        info!("🗑️ Queue cleared");
    }
}

/// Per-guild music state, created lazily.
///
/// Each guild gets its own async mutex so that mutations for one guild are
/// totally ordered while different guilds never contend.
#[derive(Debug, Clone)]
pub struct GuildQueueStore {
    guilds: Arc<DashMap<GuildId, Arc<Mutex<GuildMusicState>>>>,
    max_queue_size: usize,
}

impl GuildQueueStore {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            guilds: Arc::new(DashMap::new()),
            max_queue_size,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildMusicState>>> {
        self.guilds.get(&guild_id).map(|state| state.clone())
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Mutex<GuildMusicState>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildMusicState::new(self.max_queue_size))))
            .clone()
    }
}
