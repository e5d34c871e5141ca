use crate::error::{Result, VastError};
use async_trait::async_trait;
use log::debug;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Transport metadata kept on a resolution record
#[derive(Debug, Clone, PartialEq)]
pub struct TagResponse {
    pub url: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
}

/// A fetched VAST document
#[derive(Debug, Clone)]
pub struct FetchedTag {
    pub body: String,
    pub response: TagResponse,
}

/// Retrieves the raw XML behind a VAST tag
#[async_trait]
pub trait TagFetcher: Send + Sync {
    async fn fetch(&self, tag: &str) -> Result<FetchedTag>;
}

/// Fetches tags over HTTP, from `file://` URIs or from local paths
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Per-request transport timeout; the ad-load budget is enforced separately
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VastError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpFetcher { client })
    }

    async fn fetch_url(&self, tag: &str) -> Result<FetchedTag> {
        // Short id to pair up the log lines of one request
        let req_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        let url = url::Url::parse(tag)?;
        debug!("[{}] Fetching from URL: {}", req_id, url);

        let start_time = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            debug!("[{}] Request failed after {:?}", req_id, start_time.elapsed());
            VastError::Fetch {
                tag: tag.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        debug!("[{}] Received {} in {:?}", req_id, status, start_time.elapsed());

        if !status.is_success() {
            return Err(VastError::Fetch {
                tag: tag.to_string(),
                reason: format!("HTTP status {}", status),
            });
        }

        let tag_response = TagResponse {
            url: response.url().to_string(),
            status: Some(status.as_u16()),
            content_type: response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        };

        let body = response.text().await.map_err(|e| VastError::Fetch {
            tag: tag.to_string(),
            reason: format!("Failed to read response body: {}", e),
        })?;

        debug!("[{}] Total request completed in {:?}", req_id, start_time.elapsed());

        Ok(FetchedTag {
            body,
            response: tag_response,
        })
    }
}

#[async_trait]
impl TagFetcher for HttpFetcher {
    async fn fetch(&self, tag: &str) -> Result<FetchedTag> {
        match local_path(tag) {
            Some(path) => {
                debug!("Reading VAST from file: {}", path.display());
                let body = tokio::fs::read_to_string(&path).await?;
                Ok(FetchedTag {
                    body,
                    response: TagResponse {
                        url: tag.to_string(),
                        status: None,
                        content_type: None,
                    },
                })
            }
            None => self.fetch_url(tag).await,
        }
    }
}

/// Resolve `file://` URIs and plain paths to a file on disk
fn local_path(tag: &str) -> Option<PathBuf> {
    if let Some(path) = tag.strip_prefix("file://") {
        #[cfg(target_os = "windows")]
        let path = path.trim_start_matches('/');

        let path_buf = PathBuf::from(path);
        if path_buf.exists() {
            return Some(path_buf);
        }
        let samples_path = PathBuf::from("samples").join(path);
        return Some(if samples_path.exists() { samples_path } else { path_buf });
    }

    if !tag.contains("://") && Path::new(tag).exists() {
        return Some(PathBuf::from(tag));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_local_tags() {
        assert_eq!(local_path("file:///definitely/missing.xml"), Some(PathBuf::from("/definitely/missing.xml")));
        assert_eq!(local_path("https://ads.example.com/vast"), None);
        assert_eq!(local_path("Cargo.toml"), Some(PathBuf::from("Cargo.toml")));
    }

    #[tokio::test]
    async fn missing_files_are_io_errors() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("file:///definitely/missing.xml").await.unwrap_err();
        assert!(matches!(err, VastError::IoError(_)));
    }

    #[tokio::test]
    async fn invalid_urls_fail_before_any_request() {
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, VastError::UrlError(_)));
    }
}
