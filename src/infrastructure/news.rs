//! SerpApi Google News client implementing the [`NewsFeed`] trait.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::news::{Headline, NewsError, NewsFeed};

/// SerpApi search endpoint
const SERPAPI_BASE: &str = "https://serpapi.com";

/// Per-call HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SerpApi-backed headline feed
pub struct SerpApiNews {
    http: Client,
    base: String,
    api_key: Zeroizing<String>,
}

impl std::fmt::Debug for SerpApiNews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiNews")
            .field("base", &self.base)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    date: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
}

impl SerpApiNews {
    pub fn new(api_key: String) -> Result<Self, NewsError> {
        Self::with_base(api_key, SERPAPI_BASE.to_string())
    }

    /// Create a client against a specific base URL (testing)
    pub fn with_base(api_key: String, base: String) -> Result<Self, NewsError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base,
            api_key: Zeroizing::new(api_key),
        })
    }
}

#[async_trait]
impl NewsFeed for SerpApiNews {
    async fn headlines(&self, query: &str) -> Result<Vec<Headline>, NewsError> {
        let response = self
            .http
            .get(format!("{}/search.json", self.base))
            .query(&[
                ("engine", "google_news"),
                ("q", query),
                ("gl", "us"),
                ("hl", "en"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NewsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        debug!("News feed returned {} results", parsed.news_results.len());
        Ok(parsed
            .news_results
            .into_iter()
            .map(|r| Headline {
                title: r.title,
                date: r.date,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_tolerates_missing_fields() {
        let body = r#"{"news_results": [{"title": "Bitcoin climbs"}, {"date": "yesterday"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.news_results.len(), 2);
        assert_eq!(parsed.news_results[0].title, "Bitcoin climbs");
        assert_eq!(parsed.news_results[1].title, "");
    }

    #[test]
    fn test_search_response_without_results_key() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.news_results.is_empty());
    }
}
