//! Host platform capabilities the notifier relies on.
//!
//! The [`Platform`] trait is the flat string key/value surface the CI runner
//! provides: explicit inputs, persisted values that survive into the next
//! process invocation, step outputs, secret masking and annotations.
//! Production uses [`crate::io::actions::ActionsPlatform`]; tests use the
//! in-memory platform from `test_support`.

use anyhow::Result;
use tracing::{debug, error, warn};

/// Prefix for job-scoped persisted keys, keeping them clear of the runner's
/// own reserved variables.
pub const JOB_ENV_PREFIX: &str = "SLACK_NOTIFICATION_";

/// Where a persisted value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Exported job environment, visible to every later step of the job.
    Job,
    /// Action-private state, visible only to this action's own post step.
    Step,
}

pub trait Platform {
    /// Explicitly supplied input value, trimmed. `None` when unset.
    fn input(&self, name: &str) -> Option<String>;

    /// Previously persisted value for `name` in `scope`.
    fn load(&self, scope: Scope, name: &str) -> Option<String>;

    /// Persist `value` so the next invocation can `load` it.
    fn save(&mut self, scope: Scope, name: &str, value: &str) -> Result<()>;

    /// Publish a step output.
    fn set_output(&mut self, name: &str, value: &str) -> Result<()>;

    /// Register a secret so the runner redacts it from logs.
    fn mask(&mut self, value: &str);

    /// Surface a non-fatal problem to the user.
    fn warning(&mut self, message: &str);

    /// Mark the step failed with a user-visible message.
    fn fail(&mut self, message: &str);
}

/// Read-only view of a platform. Writes are dropped and annotations go to
/// the log instead of the runner, so inspecting state never changes it.
pub struct ReadOnly<P>(pub P);

impl<P: Platform> Platform for ReadOnly<P> {
    fn input(&self, name: &str) -> Option<String> {
        self.0.input(name)
    }

    fn load(&self, scope: Scope, name: &str) -> Option<String> {
        self.0.load(scope, name)
    }

    fn save(&mut self, scope: Scope, name: &str, _value: &str) -> Result<()> {
        debug!(?scope, name, "read-only: dropping save");
        Ok(())
    }

    fn set_output(&mut self, name: &str, _value: &str) -> Result<()> {
        debug!(name, "read-only: dropping output");
        Ok(())
    }

    fn mask(&mut self, _value: &str) {}

    fn warning(&mut self, message: &str) {
        warn!("{message}");
    }

    fn fail(&mut self, message: &str) {
        error!("{message}");
    }
}

/// Normalize a field name into its environment key form.
///
/// `message id` and `MESSAGE ID` both map to `MESSAGE_ID`.
pub fn env_key(name: &str) -> String {
    name.trim().replace(' ', "_").to_uppercase()
}

/// Full variable name of a job-scoped persisted field.
pub fn job_env_var(name: &str) -> String {
    format!("{JOB_ENV_PREFIX}{}", env_key(name))
}

/// Full variable name of a step-scoped persisted field.
pub fn step_state_var(name: &str) -> String {
    format!("STATE_{name}")
}

/// Full variable name of an explicit input.
pub fn input_var(name: &str) -> String {
    format!("INPUT_{}", env_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_upper_snake_with_prefix() {
        assert_eq!(job_env_var("message-id"), "SLACK_NOTIFICATION_MESSAGE-ID");
        assert_eq!(job_env_var(" has run before "), "SLACK_NOTIFICATION_HAS_RUN_BEFORE");
        assert_eq!(input_var("github token"), "INPUT_GITHUB_TOKEN");
        assert_eq!(step_state_var("is-post"), "STATE_is-post");
    }

    #[test]
    fn read_only_view_drops_writes() {
        let inner = crate::test_support::MemoryPlatform::default()
            .with_input("channel-id", "C1")
            .with_job_env("message-id", "1700.1");
        let mut view = ReadOnly(inner);
        assert_eq!(view.input("channel-id").as_deref(), Some("C1"));
        assert_eq!(view.load(Scope::Job, "message-id").as_deref(), Some("1700.1"));

        view.save(Scope::Step, "is-post", "true").expect("save");
        view.set_output("channel-id", "C1").expect("output");
        view.warning("ignored");
        let inner = view.0;
        assert!(inner.step_state.is_empty());
        assert!(inner.outputs.is_empty());
        assert!(inner.warnings.is_empty());
    }
}
