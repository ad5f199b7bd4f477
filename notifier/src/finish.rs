//! END phase: replace the START message with the job's conclusion.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::core::lifecycle::end_status;
use crate::core::types::LifecycleStatus;
use crate::io::clients::Connector;
use crate::io::context::RunContext;
use crate::io::platform::Platform;
use crate::io::sleep::Sleeper;
use crate::io::slack::ChatApi;
use crate::io::store::StateStore;
use crate::job::locate_current_job;
use crate::message::build_attachments;

/// What the END phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    Updated {
        channel: String,
        message_id: String,
        status: LifecycleStatus,
    },
    /// START never produced a message to update (no token, no channel or
    /// no message id). Nothing is sent.
    NeverSent,
    /// The update failed and was reported as a warning.
    ChatFailed { channel: String },
}

/// Run the END phase.
///
/// The settle delay runs before the job is re-resolved so the listing
/// reflects the steps that just finished. When there is no message to update,
/// the phase returns before waiting or calling anything remote.
pub fn run_finish<P: Platform, K: Connector, S: Sleeper>(
    store: &mut StateStore<P>,
    config: &Configuration,
    ctx: &RunContext,
    connector: &K,
    sleeper: &S,
    timestamp: i64,
) -> Result<FinishOutcome> {
    let message_id = config.message_id.value();
    let channel = config.channel_id.value();
    if message_id.is_empty() || channel.is_empty() || !config.slack_enabled() {
        info!(
            has_message_id = !message_id.is_empty(),
            has_channel = !channel.is_empty(),
            has_slack_token = config.slack_enabled(),
            "no start message to update"
        );
        return Ok(FinishOutcome::NeverSent);
    }

    debug!(delay = ?config.settle_delay, "waiting for job status to settle");
    sleeper.sleep(config.settle_delay);

    let lister = connector.jobs(config.github_token.value())?;
    let job = locate_current_job(store.platform_mut(), &lister, ctx, config.matrix.value());
    let status = end_status(job.as_ref());

    let chat = connector.chat(config.slack_token.value())?;
    let mut inputs = config.message_inputs(status, job.as_ref(), timestamp);
    // `job-status` is shown alongside "unknown" when the listing told us nothing.
    if job.is_none() {
        inputs.reported_status = config.reported_job_status();
    }
    let attachments = build_attachments(ctx, &inputs);
    match chat.update_message(channel, message_id, &attachments) {
        Ok(_) => {
            debug!(%channel, %status, "end message updated");
            Ok(FinishOutcome::Updated {
                channel: channel.clone(),
                message_id: message_id.clone(),
                status,
            })
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(%channel, error = %message, "could not update message");
            store.platform_mut().warning(&message);
            Ok(FinishOutcome::ChatFailed {
                channel: channel.clone(),
            })
        }
    }
}
