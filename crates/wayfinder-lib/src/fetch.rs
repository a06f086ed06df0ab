//! HTTP-like fetch capability used by downloads and predictive caching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Fetch primitive supplied by the platform.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;

    async fn get_json(&self, url: &str) -> Result<Value> {
        let bytes = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Fetcher backed by `reqwest`. Relative URLs resolve against `base_url`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

fn user_agent() -> String {
    format!(
        "wayfinder-lib/{version} ({repo})",
        version = env!("CARGO_PKG_VERSION"),
        repo = "https://github.com/wayfinder-campus/wayfinder-rs"
    )
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(url);
        debug!(url = %resolved, "fetching bytes");
        let response = self.client.get(&resolved).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resolved = self.resolve(url);
        debug!(url = %resolved, "fetching json");
        let response = self
            .client
            .get(&resolved)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// Fetcher reading from a local directory, used to seed the cache from an
/// exported dataset without network access.
///
/// URLs are interpreted as paths relative to the root; `file://` prefixes
/// and leading slashes are stripped.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Err(Error::Config {
                message: format!("local dataset source cannot fetch remote url {url}"),
            });
        }
        let relative = url.strip_prefix("file://").unwrap_or(url);
        let relative = relative.trim_start_matches('/');
        // Collection endpoints like `nodes/` map to `nodes.json` on disk.
        match relative.strip_suffix('/') {
            Some(collection) if !collection.is_empty() => {
                Ok(self.root.join(format!("{collection}.json")))
            }
            _ => Ok(self.root.join(relative)),
        }
    }
}

#[async_trait]
impl Fetch for LocalFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.resolve(url)?;
        debug!(path = %path.display(), "reading local resource");
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Fetcher used when no dataset source is configured. Every request fails,
/// so the cache only serves what is already stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetch for OfflineFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Err(Error::Config {
            message: format!("no dataset source configured, cannot fetch {url}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_join_base() {
        let fetcher =
            HttpFetcher::new("https://example.edu/api/", Duration::from_secs(5)).expect("client");
        assert_eq!(fetcher.resolve("/nodes/"), "https://example.edu/api/nodes/");
        assert_eq!(
            fetcher.resolve("https://cdn.example.edu/a.jpg"),
            "https://cdn.example.edu/a.jpg"
        );
    }

    #[tokio::test]
    async fn local_fetcher_reads_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("nodes.json"), "[1, 2]").expect("write");

        let fetcher = LocalFetcher::new(dir.path());
        let value = fetcher.get_json("file:///nodes.json").await.expect("json");
        assert_eq!(value, serde_json::json!([1, 2]));
        let value = fetcher.get_json("nodes/").await.expect("collection");
        assert_eq!(value, serde_json::json!([1, 2]));
        assert!(fetcher.get_bytes("https://example.edu/x").await.is_err());
    }
}
