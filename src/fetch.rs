use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::FetchError;
use crate::pipeline::SourceText;
use crate::settings::{NetworkSettings, SourceLocation};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Downloads (or reads) source playlists before the pipeline runs.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
}

fn local_path(location: &str) -> Option<PathBuf> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(location.strip_prefix("file://").unwrap_or(location)))
}

/// Doubling delay before retry `attempt` (1-based), capped at 64x the base.
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    RETRY_BASE_DELAY.saturating_mul(1 << shift)
}

impl Fetcher {
    pub fn new(settings: &NetworkSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    pub async fn fetch(&self, location: &SourceLocation) -> Result<SourceText, FetchError> {
        let origin = location.url().to_string();
        let text = match local_path(&origin) {
            Some(path) => tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| FetchError::File { path, source })?,
            None => self.get_with_retry(&origin).await?,
        };
        Ok(SourceText {
            origin,
            format: location.format(),
            text,
        })
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                self.client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await
            }
            .await;

            match result {
                Ok(text) => return Ok(text),
                Err(e) if attempt < attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Fetch failed, retrying: url={} attempt={}/{} delay_ms={} err={}",
                        url,
                        attempt,
                        attempts,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }

    /// Fetches every source concurrently. Failed sources are logged and left
    /// out; the order of the remaining ones follows `locations`.
    pub async fn fetch_all(&self, locations: &[SourceLocation]) -> Vec<SourceText> {
        let results = join_all(locations.iter().map(|loc| self.fetch(loc))).await;
        let mut sources = Vec::with_capacity(results.len());
        for (location, result) in locations.iter().zip(results) {
            match result {
                Ok(source) => {
                    info!(
                        "Fetched source: origin={} bytes={}",
                        source.origin,
                        source.text.len()
                    );
                    sources.push(source);
                }
                Err(e) => error!("Skipping source {}: {}", location.url(), e),
            }
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("https://a.example.com/x.m3u"), None);
        assert_eq!(local_path("http://a.example.com/x.m3u"), None);
        assert_eq!(local_path("file:///tmp/x.txt"), Some(PathBuf::from("/tmp/x.txt")));
        assert_eq!(local_path("sources/x.txt"), Some(PathBuf::from("sources/x.txt")));
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(1), RETRY_BASE_DELAY);
        assert_eq!(backoff_delay(2), RETRY_BASE_DELAY * 2);
        assert_eq!(backoff_delay(3), RETRY_BASE_DELAY * 4);
        assert_eq!(backoff_delay(7), RETRY_BASE_DELAY * 64);
        assert_eq!(backoff_delay(40), RETRY_BASE_DELAY * 64);
        assert_eq!(backoff_delay(u32::MAX), RETRY_BASE_DELAY * 64);
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "X,http://x.example.com/1\n").unwrap();

        let fetcher = Fetcher::new(&NetworkSettings::default()).unwrap();
        let locations = vec![
            SourceLocation::Plain(dir.path().join("missing.txt").display().to_string()),
            SourceLocation::Detailed {
                url: good.display().to_string(),
                format: Some(crate::source::SourceFormat::Txt),
            },
        ];
        let sources = fetcher.fetch_all(&locations).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].text, "X,http://x.example.com/1\n");
        assert_eq!(sources[0].format, Some(crate::source::SourceFormat::Txt));
    }
}
