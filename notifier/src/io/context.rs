//! Workflow run context read from the runner's `GITHUB_*` environment.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

/// Everything the notifier needs to know about the surrounding run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub api_url: String,
    pub server_url: String,
    /// `owner/repo`.
    pub repository: String,
    pub run_id: u64,
    /// 1-indexed attempt of this run.
    pub run_attempt: u32,
    /// Job key from the workflow file (`jobs.<key>`).
    pub job: String,
    pub workflow: String,
    /// `owner/repo/.github/workflows/ci.yml@refs/heads/main`.
    pub workflow_ref: Option<String>,
    pub workspace: Option<PathBuf>,
    pub sha: String,
    pub git_ref: String,
    pub event_name: String,
    pub actor: String,
    /// Webhook payload of the triggering event.
    pub event: Value,
}

impl RunContext {
    /// Read the context from the process environment.
    pub fn from_process_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_env(&env)
    }

    /// Read the context from an environment snapshot.
    ///
    /// Every value is optional so the binary still runs (and reports sensible
    /// errors) outside a runner.
    pub fn from_env(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).cloned().unwrap_or_default();
        let event = env
            .get("GITHUB_EVENT_PATH")
            .filter(|path| !path.is_empty())
            .map(|path| load_event(Path::new(path)))
            .unwrap_or(Value::Null);

        Self {
            api_url: env
                .get("GITHUB_API_URL")
                .cloned()
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            server_url: env
                .get("GITHUB_SERVER_URL")
                .cloned()
                .unwrap_or_else(|| "https://github.com".to_string()),
            repository: get("GITHUB_REPOSITORY"),
            run_id: get("GITHUB_RUN_ID").parse().unwrap_or(0),
            run_attempt: get("GITHUB_RUN_ATTEMPT").parse().unwrap_or(1),
            job: get("GITHUB_JOB"),
            workflow: get("GITHUB_WORKFLOW"),
            workflow_ref: env.get("GITHUB_WORKFLOW_REF").cloned(),
            workspace: env.get("GITHUB_WORKSPACE").map(PathBuf::from),
            sha: get("GITHUB_SHA"),
            git_ref: get("GITHUB_REF"),
            event_name: get("GITHUB_EVENT_NAME"),
            actor: get("GITHUB_ACTOR"),
            event,
        }
    }

    pub fn repo_url(&self) -> String {
        format!("{}/{}", self.server_url, self.repository)
    }

    pub fn branch_name(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    /// Path of the running workflow file inside the checked-out workspace.
    ///
    /// Derived from `workflow_ref`; `None` when either piece is missing.
    pub fn workflow_file(&self) -> Option<PathBuf> {
        let workspace = self.workspace.as_ref()?;
        let workflow_ref = self.workflow_ref.as_deref()?;
        let without_ref = workflow_ref.split('@').next()?;
        let relative = without_ref
            .strip_prefix(&self.repository)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(without_ref);
        if relative.is_empty() {
            return None;
        }
        Some(workspace.join(relative))
    }
}

fn load_event(path: &Path) -> Value {
    let parsed = fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|err| err.to_string()));
    match parsed {
        Ok(event) => {
            debug!(path = %path.display(), "event payload loaded");
            event
        }
        Err(reason) => {
            warn!(path = %path.display(), %reason, "could not read event payload");
            Value::Null
        }
    }
}
