//! The response view handed to parse steps.

use url::Url;

/// A fetched response, as seen by a rule's parse step.
///
/// The scheduler never inspects the body; querying it (CSS selectors, JSON
/// paths, whatever the site needs) is the rule author's concern.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// The URL the downloader actually fetched.
    pub url: Url,
    /// HTTP status reported by the downloader.
    pub status: u16,
    body: String,
}

impl ResponseContext {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        ResponseContext {
            url,
            status,
            body: body.into(),
        }
    }

    /// The raw response body.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Body length in bytes, for stats.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
