//! Shared deterministic types for notifier core logic.
//!
//! Job and step shapes mirror the workflow-jobs REST payload closely enough to
//! deserialize it directly; everything else is derived from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the two process invocations bracketing the host job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// First invocation, at job start.
    Start,
    /// Second invocation, after the user's steps.
    End,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Start => "start",
            RunPhase::End => "end",
        }
    }
}

/// Execution status of a single job step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Queued,
    InProgress,
    Completed,
    #[serde(other)]
    Other,
}

/// Conclusion reported for a step or a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteConclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    Neutral,
    TimedOut,
    ActionRequired,
    #[serde(other)]
    Other,
}

/// One step of a job as reported by the job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default)]
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub conclusion: Option<RemoteConclusion>,
}

impl StepResult {
    /// Completed and not skipped.
    pub fn is_terminal(&self) -> bool {
        self.status == StepStatus::Completed
            && self.conclusion != Some(RemoteConclusion::Skipped)
    }
}

/// One job instance in the workflow run (possibly one cell of a matrix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    /// Stays `null` until the job itself has finished.
    #[serde(default)]
    pub conclusion: Option<RemoteConclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Raw result of one job-listing call for the current run attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListing {
    /// HTTP status of the listing call.
    pub status: u16,
    pub jobs: Vec<JobDescriptor>,
}

impl JobListing {
    pub fn ok(jobs: Vec<JobDescriptor>) -> Self {
        Self { status: 200, jobs }
    }
}

/// Final classification of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    Unknown,
}

impl From<RemoteConclusion> for Conclusion {
    fn from(value: RemoteConclusion) -> Self {
        match value {
            RemoteConclusion::Success => Conclusion::Success,
            RemoteConclusion::Failure | RemoteConclusion::TimedOut => Conclusion::Failure,
            RemoteConclusion::Cancelled => Conclusion::Cancelled,
            RemoteConclusion::Skipped => Conclusion::Skipped,
            RemoteConclusion::Neutral
            | RemoteConclusion::ActionRequired
            | RemoteConclusion::Other => Conclusion::Unknown,
        }
    }
}

/// Status shown in the chat message over the job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Started,
    InProgress,
    Success,
    Failure,
    Cancelled,
    Skipped,
    Unknown,
}

impl LifecycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Started => "started",
            LifecycleStatus::InProgress => "in_progress",
            LifecycleStatus::Success => "success",
            LifecycleStatus::Failure => "failure",
            LifecycleStatus::Cancelled => "cancelled",
            LifecycleStatus::Skipped => "skipped",
            LifecycleStatus::Unknown => "unknown",
        }
    }
}

impl From<Conclusion> for LifecycleStatus {
    fn from(value: Conclusion) -> Self {
        match value {
            Conclusion::Success => LifecycleStatus::Success,
            Conclusion::Failure => LifecycleStatus::Failure,
            Conclusion::Cancelled => LifecycleStatus::Cancelled,
            Conclusion::Skipped => LifecycleStatus::Skipped,
            Conclusion::Unknown => LifecycleStatus::Unknown,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matrix axis → value for the executing job. Empty means "no matrix".
///
/// Values are kept as raw JSON so numeric and boolean axes survive a
/// persist/reload cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixContext(BTreeMap<String, Value>);

impl MatrixContext {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, axis: &str) -> Option<&Value> {
        self.0.get(axis)
    }

    /// Every scalar value in the context, nested objects and arrays included,
    /// rendered the way the job listing renders them in a job name.
    pub fn flattened_values(&self) -> Vec<String> {
        let mut out = Vec::new();
        for value in self.0.values() {
            flatten_into(value, &mut out);
        }
        out
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MatrixContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for MatrixContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(axis, value)| format!("{axis}: {}", render_scalar(value)))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Render a JSON value without quotes around strings.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                flatten_into(item, out);
            }
        }
        scalar => out.push(render_scalar(scalar)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_status_tolerates_unknown_values() {
        let step: StepResult =
            serde_json::from_value(json!({"name": "x", "status": "waiting", "conclusion": null}))
                .expect("parse step");
        assert_eq!(step.status, StepStatus::Other);
        assert!(!step.is_terminal());
    }

    #[test]
    fn flattened_values_include_nested_scalars() {
        let matrix: MatrixContext = serde_json::from_value(json!({
            "os": "linux",
            "python": 3.11,
            "include": {"arch": "amd64", "extra": [true, null]}
        }))
        .expect("parse matrix");
        let mut values = matrix.flattened_values();
        values.sort();
        assert_eq!(values, vec!["3.11", "amd64", "linux", "true"]);
    }

    #[test]
    fn matrix_display_lists_axes_in_key_order() {
        let matrix: MatrixContext = [("os", "linux"), ("arch", "amd64")].into_iter().collect();
        assert_eq!(matrix.to_string(), "arch: amd64, os: linux");
    }
}
