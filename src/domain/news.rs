//! News Feed Trait
//!
//! Thin capability over a headline search service. The snapshot builder
//! tolerates every failure here: a broken feed degrades the snapshot to an
//! empty news slice rather than blocking the cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One news headline, title and published date only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub date: String,
}

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("News service rejected request (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Headline search capability
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Most recent headlines for the query, newest first
    async fn headlines(&self, query: &str) -> Result<Vec<Headline>, NewsError>;
}
