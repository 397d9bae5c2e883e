use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Source of product photo bytes.
pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    allow_local: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build http client")?;
        Ok(Self {
            client,
            timeout,
            allow_local: true,
        })
    }

    /// Rejects anything that is not an http(s) URL.
    pub fn remote_only(mut self) -> Self {
        self.allow_local = false;
        self
    }

    /// Fetcher for links found in `feed_source`: a remote feed may only point at remote images.
    pub fn for_feed(&self, feed_source: &str) -> Self {
        if is_remote(feed_source) {
            self.clone().remote_only()
        } else {
            self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if is_remote(url) {
                download(&self.client, url).await
            } else if self.allow_local {
                read_local(url).await
            } else {
                Err(anyhow!("refusing local path {} from a remote feed", url))
            }
        })
    }
}

pub fn is_remote(source: &str) -> bool {
    let lower = source.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    debug!("fetch: GET {}", url);
    let response = client.get(url).send().await.map_err(|err| {
        if err.is_timeout() {
            anyhow!("timed out fetching {}", url)
        } else {
            anyhow!("failed to fetch {}: {}", url, err)
        }
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("failed to fetch {} (status {})", url, status));
    }
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("failed to read body of {}", url))?;
    if bytes.is_empty() {
        return Err(anyhow!("empty response from {}", url));
    }
    Ok(bytes.to_vec())
}

async fn read_local(source: &str) -> Result<Vec<u8>> {
    let path = source.trim();
    let path = Path::new(path.strip_prefix("file://").unwrap_or(path));
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("{} is empty", path.display()));
    }
    Ok(bytes)
}

/// Loads the feed document from a URL or a local path. Any failure here is fatal.
pub async fn load_feed_source(source: &str, timeout: Duration) -> Result<Vec<u8>> {
    let fetcher = HttpFetcher::new(timeout)?;
    fetcher
        .fetch(source)
        .await
        .with_context(|| format!("failed to load feed: {}", source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_remote_sources() {
        assert!(is_remote("https://shop.example/feed.xml"));
        assert!(is_remote("  HTTP://shop.example/feed.xml"));
        assert!(!is_remote("file:///tmp/feed.xml"));
        assert!(!is_remote("feed.xml"));
    }

    #[tokio::test]
    async fn reads_local_files_with_or_without_scheme() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo.bin");
        std::fs::write(&path, b"abc").expect("write");
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).expect("fetcher");
        let plain = fetcher.fetch(path.to_str().expect("path")).await.expect("plain");
        let with_scheme = format!("file://{}", path.display());
        let schemed = fetcher.fetch(&with_scheme).await.expect("scheme");
        assert_eq!(plain, b"abc");
        assert_eq!(schemed, b"abc");
    }

    #[tokio::test]
    async fn remote_feed_cannot_read_local_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secret.png");
        std::fs::write(&path, b"abc").expect("write");
        let base = HttpFetcher::new(Duration::from_secs(1)).expect("fetcher");
        let local = path.to_str().expect("path");

        let from_local_feed = base.for_feed("/srv/feed.xml");
        assert_eq!(from_local_feed.fetch(local).await.expect("local"), b"abc");

        let from_remote_feed = base.for_feed("https://shop.example/feed.xml");
        let err = from_remote_feed.fetch(local).await.err().expect("rejected");
        assert!(err.to_string().contains("remote feed"));
        let schemed = format!("file://{}", local);
        assert!(from_remote_feed.fetch(&schemed).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_url_is_an_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).expect("fetcher");
        assert!(fetcher.fetch("http://127.0.0.1:9/missing.jpg").await.is_err());
    }

    #[tokio::test]
    async fn missing_feed_reports_source() {
        let err = load_feed_source("/nonexistent/feed.xml", Duration::from_secs(1))
            .await
            .err()
            .expect("missing feed");
        assert!(err.to_string().contains("/nonexistent/feed.xml"));
    }
}
