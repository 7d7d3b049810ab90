//! The downloader collaborator boundary.
//!
//! HTTP transport is external to this core: the engine hands a URL to a
//! [`Fetcher`] and receives either a [`ResponseContext`] or an error that is
//! distinguishable from "zero results". A fetch error terminates the task in
//! the `Failed` state without retry; retry policy, if wanted, belongs inside
//! the fetcher implementation.

use crate::error::CrawlError;
use crate::response::ResponseContext;
use async_trait::async_trait;
use dashmap::DashMap;
use url::Url;

/// Downloads one URL. Implementations may be backed by an HTTP client, a
/// cache, or fixtures.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<ResponseContext, CrawlError>;
}

/// A fixture-backed fetcher serving canned bodies by exact URL.
///
/// URLs without a registered body return a fetch error, which doubles as the
/// failure injection point in tests.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: DashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` as the response for `url`.
    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), body.into());
    }

    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    /// Unregisters a URL, making subsequent fetches of it fail.
    pub fn remove(&self, url: &str) {
        self.pages.remove(url);
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<ResponseContext, CrawlError> {
        match self.pages.get(url.as_str()) {
            Some(body) => Ok(ResponseContext::new(url.clone(), 200, body.value().clone())),
            None => Err(CrawlError::fetch(url.as_str(), "no response registered")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_page_is_an_error_not_empty_content() {
        let fetcher = StaticFetcher::new().with_page("http://a.example.com/", "");
        let ok = fetcher
            .fetch(&Url::parse("http://a.example.com/").unwrap())
            .await
            .unwrap();
        assert!(ok.is_empty());

        let err = fetcher
            .fetch(&Url::parse("http://b.example.com/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Fetch { .. }));
    }
}
