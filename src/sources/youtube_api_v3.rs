use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{parse_iso8601_duration, SearchError, TrackInfo, TrackSearch};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    id: String,
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

/// `{"error": {"code": 403, "message": "...", "status": "PERMISSION_DENIED"}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Resolver backed by the YouTube Data API v3: one search call for the best
/// match, then one videos call for its title and duration.
pub struct YouTubeApiV3 {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeApiV3 {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { api_key, client })
    }

    async fn first_video_id(&self, keyword: &str) -> Result<Option<String>, SearchError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", keyword),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let body: SearchResponse = Self::read_json(response).await?;
        Ok(body.items.into_iter().find_map(|item| item.id.video_id))
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<TrackInfo>, SearchError> {
        let response = self
            .client
            .get(VIDEOS_URL)
            .query(&[
                ("part", "contentDetails,snippet"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let body: VideosResponse = Self::read_json(response).await?;
        Ok(body.items.into_iter().next().map(track_info_from))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        error!("❌ YouTube API error: {} - {}", status, body);
        Err(api_error(status, &body))
    }
}

#[async_trait]
impl TrackSearch for YouTubeApiV3 {
    async fn search(&self, keyword: &str) -> Result<Option<TrackInfo>, SearchError> {
        debug!("🔍 YouTube search: {}", keyword);

        let Some(video_id) = self.first_video_id(keyword).await? else {
            info!("No results for {}", keyword);
            return Ok(None);
        };

        let track = self.video_details(&video_id).await?;
        if let Some(track) = &track {
            info!("✅ Resolved {} -> {} ({}s)", keyword, track.title, track.duration_secs);
        }
        Ok(track)
    }
}

fn track_info_from(video: VideoDetails) -> TrackInfo {
    let duration_secs = match parse_iso8601_duration(&video.content_details.duration) {
        Some(duration) => duration.as_secs(),
        None => {
            warn!(
                "Unparseable duration {:?} for {}",
                video.content_details.duration, video.id
            );
            0
        }
    };

    TrackInfo {
        title: video.snippet.title,
        duration_secs,
        locator: format!("https://www.youtube.com/watch?v={}", video.id),
    }
}

/// Builds an [`SearchError::Api`] from a failed response, falling back to the
/// HTTP status when the body is not the API's error envelope.
fn api_error(status: reqwest::StatusCode, body: &str) -> SearchError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => SearchError::Api {
            code: error.code,
            message: error.message,
            status: error.status,
        },
        Err(_) => SearchError::Api {
            code: status.as_u16(),
            message: body.trim().to_string(),
            status: status
                .canonical_reason()
                .unwrap_or("UNKNOWN")
                .to_string(),
        },
    }
}
