use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use std::{io, process::Stdio};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use super::{ByteSource, ByteStream, StreamError};

/// Streams audio by running `yt-dlp -f <format> -o - <url>` and reading its stdout.
pub struct YtDlpSource {
    program: String,
    format: String,
}

impl YtDlpSource {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: format.into(),
        }
    }

    /// Uses another executable with the same command line.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn validate(locator: &str) -> Result<Url, StreamError> {
        let invalid = |reason: String| StreamError::InvalidLocator {
            locator: locator.to_string(),
            reason,
        };

        let url = Url::parse(locator).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme {other}"))),
        }
    }
}

#[async_trait]
impl ByteSource for YtDlpSource {
    async fn open(&self, locator: &str) -> Result<ByteStream, StreamError> {
        let url = Self::validate(locator)?;

        let mut child = Command::new(&self.program)
            .args(["-f", &self.format, "-o", "-", "--no-playlist", "--quiet"])
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(StreamError::Spawn)?;

        info!("📥 {} streaming {}", self.program, url);

        let stdout = child.stdout.take().ok_or_else(|| {
            StreamError::Spawn(io::Error::other("downloader stdout was not captured"))
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                }
            });
        }

        let program = self.program.clone();
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(io::Error::other(format!(
                    "{program} exited with {status}"
                )))),
                Err(e) => Some(Err(e)),
            }
        })
        .filter_map(future::ready);

        Ok(ReaderStream::new(stdout).chain(exit).boxed())
    }
}
