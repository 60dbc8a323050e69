use anyhow::Result;
use serenity::{async_trait, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::audio::player::{PlaybackController, PlaybackEvent};

/// Sends plain text to a chat channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, channel_id: ChannelId, text: &str) -> Result<()>;
}

#[async_trait]
impl ChannelSender for Http {
    async fn send(&self, channel_id: ChannelId, text: &str) -> Result<()> {
        channel_id.say(self, text).await?;
        Ok(())
    }
}

/// Texto del aviso para cada evento de reproducción
pub fn describe(event: &PlaybackEvent) -> String {
    match event {
        PlaybackEvent::NowPlaying { title, .. } => format!("🎵 Now playing '{title}'."),
        PlaybackEvent::ResourceMissing { title, .. } => {
            format!("⏭️ '{title}' has no audio, skipping it.")
        }
        PlaybackEvent::NotConnected { .. } => "🔇 I'm not in a voice channel.".to_string(),
        PlaybackEvent::Waiting { title, status, .. } => {
            format!("⏳ Next up is '{title}', which is not ready yet ({status}).")
        }
        PlaybackEvent::QueueExhausted { .. } => {
            "📭 The queue is empty, leaving the voice channel.".to_string()
        }
    }
}

/// Announces playback events until every sender is gone.
///
/// An exhausted queue also makes the bot leave voice, unless something was
/// queued in the meantime.
pub async fn run_announcer(
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
    sender: Arc<dyn ChannelSender>,
    player: PlaybackController,
) {
    while let Some(event) = events.recv().await {
        if let Err(e) = sender.send(event.channel_id(), &describe(&event)).await {
            error!("Error sending playback notice: {:?}", e);
        }

        if let PlaybackEvent::QueueExhausted { guild_id, .. } = event {
            if player.leave_if_idle(guild_id).await {
                info!("👋 Left voice in guild {} after the queue ran out", guild_id);
            }
        }
    }

    info!("Playback announcer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            queue::GuildQueueStore,
            testing::FakeVoice,
            track::{AudioResource, TrackStatus},
        },
        sources::TrackInfo,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::GuildId;
    use std::{sync::Mutex, time::Duration};

    const GUILD: GuildId = GuildId::new(5);
    const TEXT: ChannelId = ChannelId::new(50);

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(ChannelId, String)>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        async fn send(&self, channel_id: ChannelId, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id, text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn waiting_notice_shows_the_status() {
        let text = describe(&PlaybackEvent::Waiting {
            guild_id: GUILD,
            channel_id: TEXT,
            title: "T2".into(),
            status: TrackStatus::Download,
        });

        assert_eq!(text, "⏳ Next up is 'T2', which is not ready yet (DOWNLOAD).");
    }

    #[tokio::test(start_paused = true)]
    async fn announces_playback_and_leaves_when_the_queue_runs_out() {
        let voice = Arc::new(FakeVoice::connected_to(GUILD));
        let (tx, rx) = mpsc::unbounded_channel();
        let player = PlaybackController::new(
            GuildQueueStore::new(10),
            voice.clone(),
            tx,
            Duration::from_secs(1),
        );
        let sender = Arc::new(RecordingSender::default());
        let announcer = tokio::spawn(run_announcer(rx, sender.clone(), player.clone()));

        let id = player
            .enqueue(
                GUILD,
                TrackInfo {
                    title: "Only".into(),
                    duration_secs: 3,
                    locator: "https://www.youtube.com/watch?v=only".into(),
                },
                TEXT,
            )
            .await
            .unwrap()
            .id;
        player
            .on_download_ready(
                GUILD,
                &id,
                AudioResource {
                    path: "/music/only.m4a".into(),
                    volume: 0.5,
                },
            )
            .await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (TEXT, "🎵 Now playing 'Only'.".to_string()),
                (
                    TEXT,
                    "📭 The queue is empty, leaving the voice channel.".to_string()
                ),
            ]
        );
        assert_eq!(voice.leave_count(), 1);

        drop(player);
        announcer.abort();
    }
}
