//! Notifier configuration, resolved once per invocation from the state store.

use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::{JobDescriptor, LifecycleStatus, MatrixContext, RunPhase};
use crate::error::NotifyError;
use crate::io::platform::Platform;
use crate::io::store::{Codec, FieldOptions, FieldValue, StateField, StateStore};
use crate::message::{MessageInputs, MessageType};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(5_000);

const HAS_RUN_BEFORE_FIELD: &str = "has-run-before";
const SETTLE_DELAY_INPUT: &str = "settle-delay-ms";

impl FieldValue for MessageType {
    fn is_present(&self) -> bool {
        true
    }
}

fn message_type_codec() -> Codec<MessageType> {
    Codec {
        parse: MessageType::parse,
        serialize: |value| value.as_str().to_string(),
        null_input_is_absent: true,
    }
}

/// Every setting the phases act on.
///
/// Fields that a phase writes back (`channel_id`, `message_id`) stay
/// [`StateField`]s so the write goes through the store.
#[derive(Debug)]
pub struct Configuration {
    pub phase: RunPhase,
    /// Whether an earlier invocation in this job already ran the notifier.
    pub has_run_before: bool,
    pub slack_token: StateField<String>,
    pub github_token: StateField<String>,
    pub matrix: StateField<MatrixContext>,
    pub channel_name: String,
    pub channel_id: StateField<String>,
    pub message_id: StateField<String>,
    pub message_type: StateField<MessageType>,
    pub message_custom: StateField<String>,
    pub message_summary: StateField<String>,
    pub message_text: StateField<String>,
    /// Raw `job-status` input (usually `${{ job.status }}`).
    pub job_status: String,
    pub settle_delay: Duration,
}

impl Configuration {
    /// Declare every field against `store`, whose phase must already be known.
    pub fn load<P: Platform>(store: &mut StateStore<P>) -> Result<Self> {
        let mut has_run_before =
            store.declare(HAS_RUN_BEFORE_FIELD, FieldOptions::flag().state_only())?;
        let ran_before = *has_run_before.value();
        store.set(&mut has_run_before, true)?;

        let slack_token = store.declare("slack-token", FieldOptions::text().sensitive())?;
        let github_token =
            store.declare("github-token", FieldOptions::text().required().sensitive())?;
        let matrix = store.declare("matrix", FieldOptions::<MatrixContext>::json())?;
        let channel_id = store.declare("channel-id", FieldOptions::text().output())?;
        let message_id = store.declare("message-id", FieldOptions::text().output())?;
        let message_type = store.declare(
            "message-type",
            FieldOptions::new(MessageType::Rich, message_type_codec()),
        )?;
        let message_custom = store.declare("message-custom", FieldOptions::text())?;
        let message_summary = store.declare("message-summary", FieldOptions::text())?;
        let message_text = store.declare("message-text", FieldOptions::text())?;

        let platform = store.platform();
        let channel_name = platform.input("channel-name").unwrap_or_default();
        let job_status = platform.input("job-status").unwrap_or_default();
        let settle_delay = parse_settle_delay(platform.input(SETTLE_DELAY_INPUT))?;

        let config = Self {
            phase: store.phase(),
            has_run_before: ran_before,
            slack_token,
            github_token,
            matrix,
            channel_name,
            channel_id,
            message_id,
            message_type,
            message_custom,
            message_summary,
            message_text,
            job_status,
            settle_delay,
        };
        debug!(state = %config.summary(), "configuration loaded");
        Ok(config)
    }

    pub fn slack_enabled(&self) -> bool {
        !self.slack_token.value().is_empty()
    }

    /// `job-status` as a lifecycle label, when it names a known conclusion.
    pub fn reported_job_status(&self) -> Option<LifecycleStatus> {
        match self.job_status.trim().to_ascii_lowercase().as_str() {
            "success" => Some(LifecycleStatus::Success),
            "failure" => Some(LifecycleStatus::Failure),
            "cancelled" => Some(LifecycleStatus::Cancelled),
            "skipped" => Some(LifecycleStatus::Skipped),
            _ => None,
        }
    }

    /// Message content settings combined with a status and optional job.
    pub fn message_inputs<'a>(
        &'a self,
        status: LifecycleStatus,
        job: Option<&'a JobDescriptor>,
        timestamp: i64,
    ) -> MessageInputs<'a> {
        MessageInputs {
            status,
            job,
            matrix: self.matrix.value(),
            message_type: *self.message_type.value(),
            custom: self.message_custom.value(),
            summary: self.message_summary.value(),
            text: self.message_text.value(),
            timestamp,
            reported_status: None,
        }
    }

    /// Sanitized view for logs and `notifier state`; tokens appear only as
    /// booleans.
    pub fn summary(&self) -> Value {
        json!({
            "phase": self.phase.as_str(),
            "is-post-processing": self.phase == RunPhase::End,
            "has-run-before": self.has_run_before,
            "slack-token-provided": self.slack_enabled(),
            "github-token-provided": !self.github_token.value().is_empty(),
            "matrix": self.matrix.value(),
            "status": self.job_status,
            "channel-name": self.channel_name,
            "channel-id": self.channel_id.value(),
            "message-id": self.message_id.value(),
            "message-type": self.message_type.value().as_str(),
            "message-custom": self.message_custom.value(),
            "message-summary": self.message_summary.value(),
            "message-text": self.message_text.value(),
            "settle-delay-ms": u64::try_from(self.settle_delay.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

fn parse_settle_delay(raw: Option<String>) -> Result<Duration> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_SETTLE_DELAY);
    };
    let millis: u64 = raw.parse().map_err(|_| NotifyError::InvalidFieldValue {
        name: SETTLE_DELAY_INPUT.to_string(),
        reason: format!("expected milliseconds, got '{raw}'"),
    })?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryPlatform;

    fn load(platform: MemoryPlatform, phase: RunPhase) -> Result<(Configuration, MemoryPlatform)> {
        let mut store = StateStore::with_phase(platform, phase);
        let config = Configuration::load(&mut store)?;
        Ok((config, store.into_platform()))
    }

    fn base() -> MemoryPlatform {
        MemoryPlatform::default().with_input("github-token", "ghs_abc")
    }

    #[test]
    fn github_token_is_required() {
        let err = load(MemoryPlatform::default(), RunPhase::Start).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NotifyError>(),
            Some(NotifyError::MissingRequiredField(name)) if name == "github-token"
        ));
    }

    #[test]
    fn defaults_apply_without_inputs() {
        let (config, _) = load(base(), RunPhase::Start).expect("load");
        assert!(!config.slack_enabled());
        assert_eq!(*config.message_type.value(), MessageType::Rich);
        assert_eq!(config.settle_delay, DEFAULT_SETTLE_DELAY);
        assert!(config.matrix.value().is_empty());
        assert!(!config.has_run_before);
        assert_eq!(config.reported_job_status(), None);
    }

    #[test]
    fn has_run_before_flips_on_next_invocation() {
        let (first, platform) = load(base(), RunPhase::Start).expect("first");
        assert!(!first.has_run_before);

        let (second, _) = load(platform.next_invocation(), RunPhase::Start).expect("second");
        assert!(second.has_run_before);
    }

    #[test]
    fn invalid_message_type_is_fatal() {
        let platform = base().with_input("message-type", "fancy");
        let err = load(platform, RunPhase::Start).unwrap_err();
        let notify = err.downcast_ref::<NotifyError>().expect("typed error");
        assert!(notify.is_fatal());
        assert!(matches!(
            notify,
            NotifyError::InvalidFieldValue { name, .. } if name == "message-type"
        ));
    }

    #[test]
    fn invalid_settle_delay_is_fatal() {
        let platform = base().with_input("settle-delay-ms", "soon");
        let err = load(platform, RunPhase::Start).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NotifyError>(),
            Some(NotifyError::InvalidFieldValue { name, .. }) if name == "settle-delay-ms"
        ));

        let platform = base().with_input("settle-delay-ms", "0");
        let (config, _) = load(platform, RunPhase::Start).expect("load");
        assert!(config.settle_delay.is_zero());
    }

    #[test]
    fn start_inputs_carry_over_to_end() {
        let platform = base()
            .with_input("slack-token", "xoxb-1")
            .with_input("matrix", r#"{"os": "linux"}"#)
            .with_input("message-type", "plain")
            .with_input("message-custom", "nightly");
        let (_, platform) = load(platform, RunPhase::Start).expect("start");

        // END re-reads persisted values even when inputs changed in between.
        let next = platform
            .next_invocation()
            .with_input("message-custom", "changed")
            .with_input("message-type", "rich");
        let (config, _) = load(next, RunPhase::End).expect("end");
        assert!(config.slack_enabled());
        assert_eq!(config.github_token.value(), "ghs_abc");
        assert_eq!(*config.message_type.value(), MessageType::Plain);
        assert_eq!(config.message_custom.value(), "nightly");
        assert_eq!(
            config.matrix.value().get("os"),
            Some(&Value::String("linux".to_string()))
        );
    }

    #[test]
    fn summary_never_contains_tokens() {
        let platform = base()
            .with_input("slack-token", "xoxb-secret")
            .with_input("job-status", "Failure");
        let (config, platform) = load(platform, RunPhase::Start).expect("load");
        let rendered = config.summary().to_string();
        assert!(!rendered.contains("xoxb-secret"));
        assert!(!rendered.contains("ghs_abc"));
        assert_eq!(config.summary()["slack-token-provided"], true);
        assert_eq!(config.reported_job_status(), Some(LifecycleStatus::Failure));
        assert!(platform.masked.iter().any(|m| m == "xoxb-secret"));
    }
}
