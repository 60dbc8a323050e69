pub mod youtube_api_v3;
pub mod ytdlp;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use regex::Regex;
use std::{io, sync::LazyLock, time::Duration};
use thiserror::Error;

pub use youtube_api_v3::YouTubeApiV3;
pub use ytdlp::YtDlpSource;

/// What the resolver knows about a track before it is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub duration_secs: u64,
    /// URL handed to the [`ByteSource`].
    pub locator: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// La API respondió con un error propio.
    #[error("search API error {code} ({status}): {message}")]
    Api {
        code: u16,
        message: String,
        status: String,
    },

    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl SearchError {
    /// Chat-friendly rendering with the API's diagnostic fields on separate lines.
    pub fn user_message(&self) -> String {
        match self {
            SearchError::Api {
                code,
                message,
                status,
            } => format!("code: {code}\nmessage: {message}\nstatus: {status}"),
            SearchError::Http(e) => {
                let code = e
                    .status()
                    .map(|s| s.as_u16().to_string())
                    .unwrap_or_else(|| "-".to_string());
                let status = e
                    .status()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("TRANSPORT_ERROR");
                format!("code: {code}\nmessage: {e}\nstatus: {status}")
            }
        }
    }
}

/// Keyword to track lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// `Ok(None)` when nothing matched.
    async fn search(&self, keyword: &str) -> Result<Option<TrackInfo>, SearchError>;
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid locator {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("could not start downloader: {0}")]
    Spawn(#[source] io::Error),
}

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Audio bytes of a locator, as a stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn open(&self, locator: &str) -> Result<ByteStream, StreamError>;
}

static ISO8601_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("ISO 8601 duration regex is valid")
});

/// Parsea duración ISO 8601 (`PT1H2M3S`, `P1DT2S`). `None` si está mal formada o no cabe en `u64`.
pub fn parse_iso8601_duration(raw: &str) -> Option<Duration> {
    let caps = ISO8601_DURATION.captures(raw)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let secs = part(1)?
        .checked_mul(86_400)?
        .checked_add(part(2)?.checked_mul(3_600)?)?
        .checked_add(part(3)?.checked_mul(60)?)?
        .checked_add(part(4)?)?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_youtube_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), Some(Duration::from_secs(253)));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(Duration::from_secs(45)));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(Duration::from_secs(86_401)));
        // live streams report a zero duration
        assert_eq!(parse_iso8601_duration("P0D"), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse_iso8601_duration(""), None);
        assert_eq!(parse_iso8601_duration("4M13S"), None);
        assert_eq!(parse_iso8601_duration("PT4X"), None);
    }

    #[test]
    fn rejects_durations_that_overflow() {
        assert_eq!(parse_iso8601_duration("P99999999999999999D"), None);
        assert_eq!(parse_iso8601_duration("PT99999999999999999999S"), None);
        assert_eq!(
            parse_iso8601_duration("P213503982334601DT7S"),
            Some(Duration::from_secs(213_503_982_334_601 * 86_400 + 7))
        );
    }

    #[test]
    fn api_error_message_has_one_field_per_line() {
        let err = SearchError::Api {
            code: 403,
            message: "quota exceeded".into(),
            status: "PERMISSION_DENIED".into(),
        };

        assert_eq!(
            err.user_message(),
            "code: 403\nmessage: quota exceeded\nstatus: PERMISSION_DENIED"
        );
    }
}
