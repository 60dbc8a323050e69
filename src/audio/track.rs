use serenity::model::id::ChannelId;
use std::{fmt, path::PathBuf, time::Duration};

use crate::sources::TrackInfo;

/// Opaque track identifier, generated at enqueue time.
///
/// Also names the downloaded file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(String);

impl TrackId {
    /// 20 random bytes rendered as lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; 20] = rand::random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a track: `Download -> Ready -> Playing -> {Done | Skip | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Download,
    Ready,
    Playing,
    Done,
    Skip,
    Error,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Download => "DOWNLOAD",
            TrackStatus::Ready => "READY",
            TrackStatus::Playing => "PLAYING",
            TrackStatus::Done => "DONE",
            TrackStatus::Skip => "SKIP",
            TrackStatus::Error => "ERROR",
        }
    }

    /// Still waiting for, or in the middle of, playback.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TrackStatus::Download | TrackStatus::Ready | TrackStatus::Playing
        )
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downloaded audio ready to be handed to the voice session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResource {
    pub path: PathBuf,
    pub volume: f32,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub duration_secs: u64,
    pub locator: String,
    pub status: TrackStatus,
    /// Present from `Ready` until playback takes it.
    pub resource: Option<AudioResource>,
    /// Canal de texto donde se pidió el track
    pub text_channel: ChannelId,
}

impl Track {
    pub fn new(info: TrackInfo, text_channel: ChannelId) -> Self {
        Self {
            id: TrackId::generate(),
            title: info.title,
            duration_secs: info.duration_secs,
            locator: info.locator,
            status: TrackStatus::Download,
            resource: None,
            text_channel,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}
