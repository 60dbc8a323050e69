use futures::StreamExt;
use serenity::model::id::GuildId;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

use super::{
    player::{DownloadOutcome, PlaybackController},
    track::{AudioResource, TrackId},
};
use crate::sources::{ByteSource, StreamError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not open audio for {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: StreamError,
    },

    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("audio stream for {} broke: {source}", path.display())]
    Stream {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// File the download was being written to.
    pub fn path(&self) -> &Path {
        match self {
            FetchError::Open { path, .. }
            | FetchError::Write { path, .. }
            | FetchError::Stream { path, .. } => path,
        }
    }
}

/// Downloads track audio into the music directory and hands it to the
/// [`PlaybackController`].
#[derive(Clone)]
pub struct TrackFetcher {
    player: PlaybackController,
    source: Arc<dyn ByteSource>,
    music_dir: PathBuf,
    extension: String,
    volume: f32,
}

impl TrackFetcher {
    pub fn new(
        player: PlaybackController,
        source: Arc<dyn ByteSource>,
        music_dir: PathBuf,
        extension: String,
        volume: f32,
    ) -> Self {
        Self {
            player,
            source,
            music_dir,
            extension,
            volume,
        }
    }

    /// `<music_dir>/<id>.<ext>`
    pub fn path_for(&self, id: &TrackId) -> PathBuf {
        self.music_dir
            .join(format!("{}.{}", id.as_str(), self.extension))
    }

    /// Downloads `locator` and reports the result to the controller.
    ///
    /// On failure the track is marked `ERROR` and stays queued. No retry.
    pub async fn fetch(
        &self,
        guild_id: GuildId,
        id: &TrackId,
        locator: &str,
    ) -> Result<DownloadOutcome, FetchError> {
        let path = self.path_for(id);

        match self.download(locator, &path).await {
            Ok(bytes) => {
                info!("💾 Downloaded {} bytes to {}", bytes, path.display());
                let resource = AudioResource {
                    path,
                    volume: self.volume,
                };
                Ok(self.player.on_download_ready(guild_id, id, resource).await)
            }
            Err(e) => {
                warn!("❌ Download failed for {}: {}", locator, e);
                self.player.on_download_failed(guild_id, id).await;
                Err(e)
            }
        }
    }

    async fn download(&self, locator: &str, path: &Path) -> Result<u64, FetchError> {
        let write_err = |source: io::Error| FetchError::Write {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.music_dir).await.map_err(write_err)?;

        let mut stream = self
            .source
            .open(locator)
            .await
            .map_err(|source| FetchError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut file = fs::File::create(path).await.map_err(write_err)?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Stream {
                path: path.to_path_buf(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_err)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{queue::GuildQueueStore, testing::FakeVoice, track::TrackStatus},
        sources::{MockByteSource, TrackInfo},
    };
    use bytes::Bytes;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const GUILD: GuildId = GuildId::new(7);

    fn source_with(chunks: Vec<io::Result<Bytes>>) -> MockByteSource {
        let mut source = MockByteSource::new();
        let mut chunks = Some(chunks);
        source.expect_open().times(1).returning(move |_| {
            Ok(stream::iter(chunks.take().unwrap_or_default()).boxed())
        });
        source
    }

    fn player() -> PlaybackController {
        let (tx, _rx) = mpsc::unbounded_channel();
        PlaybackController::new(
            GuildQueueStore::new(10),
            Arc::new(FakeVoice::connected_to(GUILD)),
            tx,
            Duration::from_secs(1),
        )
    }

    async fn enqueue(player: &PlaybackController, title: &str) -> TrackId {
        player
            .enqueue(
                GUILD,
                TrackInfo {
                    title: title.into(),
                    duration_secs: 60,
                    locator: "https://www.youtube.com/watch?v=abc".into(),
                },
                ChannelId::new(1),
            )
            .await
            .unwrap()
            .id
    }

    async fn status(player: &PlaybackController, id: &TrackId) -> TrackStatus {
        let state = player.store().get(GUILD).unwrap();
        let state = state.lock().await;
        state.track(id).unwrap().status
    }

    #[tokio::test]
    async fn writes_the_stream_and_starts_playback() {
        let dir = tempfile::tempdir().unwrap();
        let player = player();
        let id = enqueue(&player, "A").await;
        let fetcher = TrackFetcher::new(
            player.clone(),
            Arc::new(source_with(vec![
                Ok(Bytes::from_static(b"ID3")),
                Ok(Bytes::from_static(b"audio")),
            ])),
            dir.path().join("music"),
            "m4a".into(),
            0.5,
        );

        let outcome = fetcher
            .fetch(GUILD, &id, "https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Started);
        let path = dir.path().join("music").join(format!("{id}.m4a"));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3audio");
        assert_eq!(status(&player, &id).await, TrackStatus::Playing);
    }

    #[tokio::test]
    async fn broken_stream_marks_the_track_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let player = player();
        let id = enqueue(&player, "A").await;
        let fetcher = TrackFetcher::new(
            player.clone(),
            Arc::new(source_with(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(io::Error::other("connection reset")),
            ])),
            dir.path().to_path_buf(),
            "m4a".into(),
            0.5,
        );

        let err = fetcher
            .fetch(GUILD, &id, "https://www.youtube.com/watch?v=abc")
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Stream { .. }));
        assert_eq!(err.path(), fetcher.path_for(&id).as_path());
        assert_eq!(status(&player, &id).await, TrackStatus::Error);
        assert_eq!(player.list(GUILD).await, Some(vec!["1. A".to_string()]));
    }

    #[tokio::test]
    async fn unopenable_locator_marks_the_track_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let player = player();
        let id = enqueue(&player, "A").await;
        let mut source = MockByteSource::new();
        source.expect_open().returning(|locator| {
            Err(StreamError::InvalidLocator {
                locator: locator.to_string(),
                reason: "relative URL without a base".into(),
            })
        });
        let fetcher = TrackFetcher::new(
            player.clone(),
            Arc::new(source),
            dir.path().to_path_buf(),
            "m4a".into(),
            0.5,
        );

        let err = fetcher.fetch(GUILD, &id, "nope").await.unwrap_err();

        assert!(matches!(err, FetchError::Open { .. }));
        assert_eq!(status(&player, &id).await, TrackStatus::Error);
    }

    #[tokio::test]
    async fn download_finishing_after_clear_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let player = player();
        let id = enqueue(&player, "A").await;
        player.clear(GUILD).await;
        let fetcher = TrackFetcher::new(
            player.clone(),
            Arc::new(source_with(vec![Ok(Bytes::from_static(b"audio"))])),
            dir.path().to_path_buf(),
            "m4a".into(),
            0.5,
        );

        let outcome = fetcher
            .fetch(GUILD, &id, "https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Discarded);
        assert_eq!(status(&player, &id).await, TrackStatus::Skip);
    }
}
