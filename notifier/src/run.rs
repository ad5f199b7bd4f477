//! Phase dispatch and the exit-status policy.
//!
//! Fatal configuration errors mark the step failed and exit non-zero. Every
//! other notifier problem is a warning, so the job being reported on is never
//! failed by its own notification.

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Configuration;
use crate::core::types::RunPhase;
use crate::error::NotifyError;
use crate::exit_codes;
use crate::finish::{FinishOutcome, run_finish};
use crate::io::clients::Connector;
use crate::io::context::RunContext;
use crate::io::platform::{Platform, ReadOnly};
use crate::io::sleep::Sleeper;
use crate::io::store::StateStore;
use crate::start::{StartOutcome, run_start};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Start(StartOutcome),
    Finish(FinishOutcome),
}

/// Run whichever phase this invocation is. Returns the platform and the
/// process exit code.
pub fn invoke<P: Platform, K: Connector, S: Sleeper>(
    platform: P,
    ctx: &RunContext,
    connector: &K,
    sleeper: &S,
    timestamp: i64,
) -> (P, i32) {
    let mut store = StateStore::new(platform);
    let code = match drive(&mut store, ctx, connector, sleeper, timestamp) {
        Ok(outcome) => {
            info!(?outcome, "notifier finished");
            exit_codes::OK
        }
        Err(err) => match err.downcast_ref::<NotifyError>() {
            Some(notify) if !notify.is_fatal() => {
                let message = notify.to_string();
                warn!(error = %message, "notifier degraded");
                store.platform_mut().warning(&message);
                exit_codes::OK
            }
            _ => {
                let message = format!("{err:#}");
                error!(error = %message, "notifier failed");
                store.platform_mut().fail(&message);
                exit_codes::FAILED
            }
        },
    };
    (store.into_platform(), code)
}

fn drive<P: Platform, K: Connector, S: Sleeper>(
    store: &mut StateStore<P>,
    ctx: &RunContext,
    connector: &K,
    sleeper: &S,
    timestamp: i64,
) -> Result<PhaseOutcome> {
    let phase = store.detect_phase()?;
    info!(phase = phase.as_str(), "notifier invoked");
    let mut config = Configuration::load(store)?;
    match phase {
        RunPhase::Start => {
            run_start(store, &mut config, ctx, connector, timestamp).map(PhaseOutcome::Start)
        }
        RunPhase::End => {
            run_finish(store, &config, ctx, connector, sleeper, timestamp).map(PhaseOutcome::Finish)
        }
    }
}

/// Sanitized configuration summary as the next invocation would see it.
/// Nothing is written.
pub fn inspect<P: Platform>(platform: P) -> Result<Value> {
    let mut store = StateStore::new(ReadOnly(platform));
    store.detect_phase()?;
    let config = Configuration::load(&mut store)?;
    Ok(config.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LifecycleStatus;
    use crate::test_support::{
        ChatCall, FakeConnector, MemoryPlatform, RecordingChat, RecordingSleeper,
        ScriptedJobLister, matrix_listing, run_context,
    };

    fn inputs() -> MemoryPlatform {
        MemoryPlatform::default()
            .with_input("github-token", "ghs_abc")
            .with_input("slack-token", "xoxb-1")
            .with_input("channel-id", "C1")
            .with_input("matrix", r#"{"os": "linux", "arch": "amd64"}"#)
    }

    #[test]
    fn start_then_end_updates_the_same_message() {
        let connector = FakeConnector::new(
            RecordingChat::default(),
            ScriptedJobLister::returning(matrix_listing()),
        );
        let sleeper = RecordingSleeper::default();
        let ctx = run_context();

        let (platform, code) = invoke(inputs(), &ctx, &connector, &sleeper, 1);
        assert_eq!(code, exit_codes::OK);
        assert_eq!(
            platform.outputs.get("message-id").map(String::as_str),
            Some("1700000000.000100")
        );
        assert!(sleeper.slept().is_empty());

        let (platform, code) = invoke(platform.next_invocation(), &ctx, &connector, &sleeper, 2);
        assert_eq!(code, exit_codes::OK);
        assert!(platform.failures.is_empty());
        assert_eq!(sleeper.slept().len(), 1);

        let calls = connector.chat.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], ChatCall::Post { .. }));
        let ChatCall::Update { ts, attachments, .. } = &calls[1] else {
            panic!("expected an update, got {calls:?}");
        };
        assert_eq!(ts, "1700000000.000100");
        assert_eq!(attachments[0].ts, "2");
        // Two completed success steps so far.
        assert_eq!(attachments[0].color, "good");
        assert_eq!(connector.jobs.calls(), 2);
    }

    #[test]
    fn end_without_start_message_is_never_sent() {
        let connector = FakeConnector::default();
        let sleeper = RecordingSleeper::default();
        let platform = MemoryPlatform::default()
            .with_input("github-token", "ghs_abc")
            .with_step_state("is-post", "true");

        let (platform, code) = invoke(platform, &run_context(), &connector, &sleeper, 1);
        assert_eq!(code, exit_codes::OK);
        assert!(platform.failures.is_empty());
        assert!(connector.chat.calls().is_empty());
        assert_eq!(connector.jobs.calls(), 0);
    }

    #[test]
    fn start_without_slack_token_exits_cleanly() {
        let connector = FakeConnector::default();
        let platform = MemoryPlatform::default().with_input("github-token", "ghs_abc");
        let (platform, code) = invoke(
            platform,
            &run_context(),
            &connector,
            &RecordingSleeper::default(),
            1,
        );
        assert_eq!(code, exit_codes::OK);
        assert!(connector.connected().is_empty());
        assert_eq!(
            platform.step_state.get("is-post").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn missing_github_token_fails_the_step() {
        let connector = FakeConnector::default();
        let (platform, code) = invoke(
            MemoryPlatform::default(),
            &run_context(),
            &connector,
            &RecordingSleeper::default(),
            1,
        );
        assert_eq!(code, exit_codes::FAILED);
        assert_eq!(platform.failures.len(), 1);
        assert!(platform.failures[0].contains("github-token"));
    }

    #[test]
    fn unresolvable_channel_fails_the_step() {
        let connector = FakeConnector::default();
        let platform = MemoryPlatform::default()
            .with_input("github-token", "ghs_abc")
            .with_input("slack-token", "xoxb-1")
            .with_input("channel-name", "ghosts");
        let (platform, code) = invoke(
            platform,
            &run_context(),
            &connector,
            &RecordingSleeper::default(),
            1,
        );
        assert_eq!(code, exit_codes::FAILED);
        assert!(platform.failures[0].contains("ghosts"));
    }

    struct UnavailableChat;

    impl Connector for UnavailableChat {
        type Chat = RecordingChat;
        type Jobs = ScriptedJobLister;

        fn chat(&self, _slack_token: &str) -> Result<RecordingChat> {
            Err(NotifyError::ChatApiFailure("client unavailable".to_string()).into())
        }

        fn jobs(&self, _github_token: &str) -> Result<ScriptedJobLister> {
            Ok(ScriptedJobLister::default())
        }
    }

    #[test]
    fn non_fatal_errors_only_warn() {
        let (platform, code) = invoke(
            inputs(),
            &run_context(),
            &UnavailableChat,
            &RecordingSleeper::default(),
            1,
        );
        assert_eq!(code, exit_codes::OK);
        assert!(platform.failures.is_empty());
        assert!(platform.warnings.iter().any(|w| w.contains("client unavailable")));
    }

    #[test]
    fn inspect_reports_without_writing() {
        let platform = inputs()
            .with_step_state("is-post", "true")
            .with_job_env("message-id", "1700.1");
        let summary = inspect(platform).expect("inspect");
        assert_eq!(summary["phase"], "end");
        assert_eq!(summary["message-id"], "1700.1");
        assert_eq!(summary["slack-token-provided"], true);
        assert!(!summary.to_string().contains("xoxb-1"));
    }

    #[test]
    fn phase_outcome_exposes_status() {
        let connector = FakeConnector::new(RecordingChat::default(), ScriptedJobLister::default());
        let mut store = StateStore::new(inputs());
        let outcome = drive(
            &mut store,
            &run_context(),
            &connector,
            &RecordingSleeper::default(),
            1,
        )
        .expect("drive");
        assert_eq!(
            outcome,
            PhaseOutcome::Start(StartOutcome::Posted {
                channel: "C1".to_string(),
                message_id: Some("1700000000.000100".to_string()),
                status: LifecycleStatus::Started,
            })
        );
        assert_eq!(connector.jobs.calls(), 1);
    }
}
