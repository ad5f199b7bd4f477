//! Construction of the remote API clients.
//!
//! Clients are built on demand from the resolved tokens, so a phase that
//! decides to do nothing never touches the network.

use anyhow::Result;

use crate::io::github::{GithubClient, JobLister};
use crate::io::slack::{ChatApi, SlackClient};

pub trait Connector {
    type Chat: ChatApi;
    type Jobs: JobLister;

    fn chat(&self, slack_token: &str) -> Result<Self::Chat>;

    fn jobs(&self, github_token: &str) -> Result<Self::Jobs>;
}

/// Real Slack and GitHub REST clients.
pub struct HttpConnector;

impl Connector for HttpConnector {
    type Chat = SlackClient;
    type Jobs = GithubClient;

    fn chat(&self, slack_token: &str) -> Result<SlackClient> {
        SlackClient::new(slack_token)
    }

    fn jobs(&self, github_token: &str) -> Result<GithubClient> {
        GithubClient::new(github_token)
    }
}
