//! Error taxonomy for the notifier.
//!
//! Configuration errors are fatal and surface at the process boundary.
//! Remote-call errors are caught where they happen and reported as warnings,
//! so a notification hiccup never fails the job being reported on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Input required and not supplied: {0}")]
    MissingRequiredField(String),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidFieldValue { name: String, reason: String },

    #[error("{0}")]
    ChannelResolutionFailure(String),

    #[error("listing jobs for this workflow run failed with HTTP {status}")]
    JobListingFailure { status: u16 },

    #[error(
        "listing jobs for this workflow run was forbidden (HTTP 403); \
         the github-token needs the `actions: read` permission scope"
    )]
    JobListingForbidden,

    #[error("no job in this workflow run matched '{name}'")]
    JobNotFound { name: String },

    #[error(
        "{} jobs in this workflow run matched '{name}': {}",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousJob { name: String, candidates: Vec<String> },

    #[error(
        "job name '{name}' contains an expression that cannot be evaluated here; \
         only ${{{{ matrix.<axis> }}}} placeholders are supported"
    )]
    UnsupportedJobName { name: String },

    #[error("chat API call failed: {0}")]
    ChatApiFailure(String),
}

impl NotifyError {
    /// Errors that must stop the invocation and mark the step failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NotifyError::MissingRequiredField(_)
                | NotifyError::InvalidFieldValue { .. }
                | NotifyError::ChannelResolutionFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_listing_mentions_required_scope() {
        let msg = NotifyError::JobListingForbidden.to_string();
        assert!(msg.contains("actions: read"));
    }

    #[test]
    fn unsupported_name_message_renders_placeholder_hint() {
        let msg = NotifyError::UnsupportedJobName {
            name: "Build ${{ env.X }}".to_string(),
        }
        .to_string();
        assert!(msg.contains("${{ matrix.<axis> }}"));
    }

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(NotifyError::MissingRequiredField("github-token".into()).is_fatal());
        assert!(NotifyError::ChannelResolutionFailure("x".into()).is_fatal());
        assert!(!NotifyError::JobListingFailure { status: 500 }.is_fatal());
        assert!(
            !NotifyError::AmbiguousJob {
                name: "build".into(),
                candidates: vec!["build (a)".into(), "build (b)".into()],
            }
            .is_fatal()
        );
        assert!(!NotifyError::ChatApiFailure("boom".into()).is_fatal());
    }
}
