//! Slack Web API access: posting, updating and channel lookup.
//!
//! [`ChatApi`] keeps the phase orchestration independent of the HTTP client;
//! tests substitute a recording fake. Every call is attempted exactly once.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::NotifyError;
use crate::message::Attachment;

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_PAGE_LIMIT: u32 = 200;

pub trait ChatApi {
    /// Post a new message; returns its `ts` when Slack reports one.
    fn post_message(&self, channel: &str, attachments: &[Attachment]) -> Result<Option<String>>;

    /// Replace the message identified by `ts`.
    fn update_message(
        &self,
        channel: &str,
        ts: &str,
        attachments: &[Attachment],
    ) -> Result<Option<String>>;

    /// Find a channel id by exact name. `#`/`@` sigils are ignored.
    fn find_channel_id(&self, name: &str) -> Result<Option<String>>;
}

/// Strip every `#` and `@` from a user-supplied channel name.
pub fn normalize_channel_name(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '#' | '@')).collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<&'a str>,
    attachments: &'a [Attachment],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// Blocking Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    http: Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build slack http client")?;
        Ok(Self {
            http,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn chat(&self, method: &str, request: &ChatRequest<'_>) -> Result<Option<String>> {
        let resp = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .map_err(|err| NotifyError::ChatApiFailure(format!("{method}: {err}")))?;
        let body: ChatResponse = read_json(resp, method)?;
        if !body.ok {
            return Err(NotifyError::ChatApiFailure(format!(
                "{method}: {}",
                body.error.as_deref().unwrap_or("unknown_error")
            ))
            .into());
        }
        debug!(method, ts = ?body.ts, "slack call succeeded");
        Ok(body.ts)
    }
}

impl ChatApi for SlackClient {
    #[instrument(skip(self, attachments))]
    fn post_message(&self, channel: &str, attachments: &[Attachment]) -> Result<Option<String>> {
        self.chat(
            "chat.postMessage",
            &ChatRequest {
                channel,
                ts: None,
                attachments,
            },
        )
    }

    #[instrument(skip(self, attachments))]
    fn update_message(
        &self,
        channel: &str,
        ts: &str,
        attachments: &[Attachment],
    ) -> Result<Option<String>> {
        self.chat(
            "chat.update",
            &ChatRequest {
                channel,
                ts: Some(ts),
                attachments,
            },
        )
    }

    #[instrument(skip(self))]
    fn find_channel_id(&self, name: &str) -> Result<Option<String>> {
        let wanted = normalize_channel_name(name);
        let limit = CHANNEL_PAGE_LIMIT.to_string();
        let mut cursor = String::new();
        loop {
            let resp = {
                let mut query = vec![
                    ("types", "public_channel,private_channel"),
                    ("exclude_archived", "true"),
                    ("limit", limit.as_str()),
                ];
                if !cursor.is_empty() {
                    query.push(("cursor", cursor.as_str()));
                }
                self.http
                    .get(self.url("conversations.list"))
                    .bearer_auth(&self.token)
                    .query(&query)
                    .send()
                    .context("conversations.list")?
            };
            let page: ConversationsPage = read_json(resp, "conversations.list")?;
            if !page.ok {
                anyhow::bail!(
                    "conversations.list: {}",
                    page.error.as_deref().unwrap_or("unknown_error")
                );
            }
            if let Some(id) = find_in_page(&page.channels, &wanted) {
                return Ok(Some(id));
            }
            cursor = page
                .response_metadata
                .map(|meta| meta.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                debug!(channel = %wanted, "channel not found");
                return Ok(None);
            }
        }
    }
}

fn find_in_page(channels: &[Conversation], wanted: &str) -> Option<String> {
    channels
        .iter()
        .find(|channel| channel.name == wanted)
        .map(|channel| channel.id.clone())
}

fn read_json<T: DeserializeOwned>(resp: reqwest::blocking::Response, method: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(NotifyError::ChatApiFailure(format!("{method}: HTTP {status}")).into());
    }
    resp.json()
        .map_err(|err| NotifyError::ChatApiFailure(format!("{method}: {err}")).into())
}
