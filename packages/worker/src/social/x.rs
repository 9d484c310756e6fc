use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Mention, MentionPage, SocialClient, SocialError};
use crate::config::SocialConfig;

/// Mentions requested per poll.
const MENTIONS_PAGE_SIZE: u32 = 20;

/// X API v2 client acting as the bot account.
#[derive(Debug, Clone)]
pub struct XClient {
    client: Client,
    base_url: String,
    bearer_token: String,
    bot_user_id: String,
}

impl XClient {
    pub fn from_config(config: &SocialConfig) -> Result<Self, SocialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            bot_user_id: config.bot_user_id.clone(),
        })
    }

    async fn check(response: Response) -> Result<Response, SocialError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = rate_limit_delay(response.headers(), Utc::now());
        let body = response.text().await.unwrap_or_default();
        Err(SocialError::from_status(status.as_u16(), body, retry_after))
    }
}

#[derive(Debug, Deserialize)]
struct MentionsResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    newest_id: Option<String>,
    next_token: Option<String>,
}

#[derive(Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    reply: ReplySettings<'a>,
}

#[derive(Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Serialize)]
struct DirectMessage<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct Created {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

fn into_page(response: MentionsResponse) -> MentionPage {
    let usernames: HashMap<String, String> = response
        .includes
        .users
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    // The API answers newest first.
    let mentions = response
        .data
        .into_iter()
        .rev()
        .map(|t| {
            let author_id = t.author_id.unwrap_or_default();
            Mention {
                author_username: usernames.get(&author_id).cloned(),
                id: t.id,
                author_id,
                text: t.text,
                created_at: t.created_at,
            }
        })
        .collect();

    MentionPage {
        mentions,
        newest_id: response.meta.newest_id,
        next_token: response.meta.next_token,
    }
}

/// Wait implied by `x-rate-limit-reset` (epoch seconds) or `retry-after`.
fn rate_limit_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(reset) = header("x-rate-limit-reset") {
        return Some(Duration::from_secs((reset - now.timestamp()).max(0) as u64));
    }
    header("retry-after").map(|secs| Duration::from_secs(secs.max(0) as u64))
}

#[async_trait]
impl SocialClient for XClient {
    async fn fetch_mentions(
        &self,
        since_id: Option<&str>,
        pagination_token: Option<&str>,
    ) -> Result<MentionPage, SocialError> {
        let url = format!("{}/2/users/{}/mentions", self.base_url, self.bot_user_id);
        let mut query = vec![
            ("max_results", MENTIONS_PAGE_SIZE.to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
            ("tweet.fields", "created_at,author_id".to_string()),
        ];
        if let Some(since_id) = since_id {
            query.push(("since_id", since_id.to_string()));
        }
        if let Some(token) = pagination_token {
            query.push(("pagination_token", token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(&query)
            .send()
            .await?;
        let body: MentionsResponse = Self::check(response).await?.json().await?;
        let page = into_page(body);
        debug!(
            count = page.mentions.len(),
            since_id = ?since_id,
            more = page.next_token.is_some(),
            "Fetched mentions"
        );
        Ok(page)
    }

    async fn reply_to_post(&self, post_id: &str, text: &str) -> Result<String, SocialError> {
        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(&CreateTweet {
                text,
                reply: ReplySettings {
                    in_reply_to_tweet_id: post_id,
                },
            })
            .send()
            .await?;
        let created: Created = Self::check(response).await?.json().await?;
        Ok(created.data.id)
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), SocialError> {
        let response = self
            .client
            .post(format!(
                "{}/2/dm_conversations/with/{}/messages",
                self.base_url, user_id
            ))
            .bearer_auth(&self.bearer_token)
            .json(&DirectMessage { text })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
