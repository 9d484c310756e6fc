//! Social platform seam: reading mentions of the bot and posting replies.

pub mod x;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use x::XClient;

/// A post that mentions the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub id: String,
    pub author_id: String,
    /// `None` when the platform did not resolve the author.
    pub author_username: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of mentions, oldest first. Later pages hold older posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionPage {
    pub mentions: Vec<Mention>,
    /// Highest post id in the page, to resume from.
    pub newest_id: Option<String>,
    /// Set while older mentions remain past this page.
    pub next_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum SocialError {
    /// Retrying cannot help (forbidden, deleted post, rejected text).
    #[error("Rejected by platform ({status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("Rate limited by platform")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Platform unavailable: {0}")]
    Transient(String),
}

impl SocialError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            401 | 408 => Self::Transient(format!("{status}: {message}")),
            400..=499 => Self::Permanent { status, message },
            _ => Self::Transient(format!("{status}: {message}")),
        }
    }
}

impl From<reqwest::Error> for SocialError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Mentions of the bot newer than `since_id`, one page at a time.
    async fn fetch_mentions(
        &self,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage, SocialError>;

    /// Post `text` as a reply under `post_id`. Returns the new post's id.
    async fn reply_to_post(&self, post_id: &str, text: &str) -> Result<String, SocialError>;

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), SocialError>;
}
