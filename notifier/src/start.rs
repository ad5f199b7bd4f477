//! START phase: announce the job in Slack.
//!
//! Posts a new message, or updates the one a previous attempt of this job
//! already posted, and persists its id for the END phase.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::core::lifecycle::start_status;
use crate::core::types::LifecycleStatus;
use crate::error::NotifyError;
use crate::io::clients::Connector;
use crate::io::context::RunContext;
use crate::io::platform::Platform;
use crate::io::slack::ChatApi;
use crate::io::store::StateStore;
use crate::job::locate_current_job;
use crate::message::build_attachments;

/// What the START phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// No Slack token configured; only state was recorded.
    Skipped,
    Posted {
        channel: String,
        message_id: Option<String>,
        status: LifecycleStatus,
    },
    Updated {
        channel: String,
        message_id: String,
        status: LifecycleStatus,
    },
    /// The chat call failed and was reported as a warning.
    ChatFailed { channel: String },
}

/// Run the START phase.
///
/// Only channel resolution errors (and store write errors) are returned;
/// a failing chat call is reported and yields [`StartOutcome::ChatFailed`].
pub fn run_start<P: Platform, K: Connector>(
    store: &mut StateStore<P>,
    config: &mut Configuration,
    ctx: &RunContext,
    connector: &K,
    timestamp: i64,
) -> Result<StartOutcome> {
    // Persist the token even when it came from state, for later steps.
    let github_token = config.github_token.value().clone();
    store.set(&mut config.github_token, github_token)?;

    if !config.slack_enabled() {
        info!("no slack-token configured; not posting");
        return Ok(StartOutcome::Skipped);
    }

    let chat = connector.chat(config.slack_token.value())?;
    let channel = resolve_channel(&chat, config)?;
    store.set(&mut config.channel_id, channel.clone())?;

    let previous = Some(config.message_id.value().clone()).filter(|id| !id.is_empty());

    let lister = connector.jobs(config.github_token.value())?;
    let job = locate_current_job(store.platform_mut(), &lister, ctx, config.matrix.value());
    let status = start_status(job.as_ref());
    let attachments = build_attachments(ctx, &config.message_inputs(status, job.as_ref(), timestamp));

    let response = match &previous {
        Some(ts) => chat.update_message(&channel, ts, &attachments),
        None => chat.post_message(&channel, &attachments),
    };
    let returned = match response {
        Ok(returned) => returned,
        Err(err) => {
            let message = format!("{err:#}");
            warn!(%channel, error = %message, "could not send start message");
            store.platform_mut().warning(&message);
            return Ok(StartOutcome::ChatFailed { channel });
        }
    };

    if let Some(ts) = returned.clone() {
        store.set(&mut config.message_id, ts)?;
    }
    debug!(%channel, %status, ?returned, "start message sent");

    Ok(match previous {
        Some(ts) => StartOutcome::Updated {
            channel,
            message_id: returned.unwrap_or(ts),
            status,
        },
        None => StartOutcome::Posted {
            channel,
            message_id: returned,
            status,
        },
    })
}

/// `channel-id` if set, else a lookup of `channel-name`.
fn resolve_channel<C: ChatApi>(chat: &C, config: &Configuration) -> Result<String, NotifyError> {
    let id = config.channel_id.value();
    if !id.is_empty() {
        return Ok(id.clone());
    }
    let name = &config.channel_name;
    if name.is_empty() {
        return Err(NotifyError::ChannelResolutionFailure(
            "Either 'channel-id' or 'channel-name' must be set".to_string(),
        ));
    }
    match chat.find_channel_id(name) {
        Ok(Some(id)) => {
            debug!(%name, %id, "channel resolved");
            Ok(id)
        }
        Ok(None) => Err(NotifyError::ChannelResolutionFailure(format!(
            "Channel {name} could not be found"
        ))),
        Err(err) => Err(NotifyError::ChannelResolutionFailure(format!(
            "Channel {name} could not be looked up: {err:#}"
        ))),
    }
}
