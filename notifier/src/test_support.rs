//! Test-only fixtures and fakes for the platform, the remote APIs and the clock.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::types::{
    JobDescriptor, JobListing, MatrixContext, RemoteConclusion, StepResult, StepStatus,
};
use crate::error::NotifyError;
use crate::io::clients::Connector;
use crate::io::context::RunContext;
use crate::io::github::{JobLister, parse_jobs};
use crate::io::platform::{Platform, Scope, env_key};
use crate::io::sleep::Sleeper;
use crate::io::slack::{ChatApi, normalize_channel_name};
use crate::message::Attachment;

/// In-memory platform. Keys of `inputs` and `job_env` are normalized with
/// [`env_key`]; `step_state` keeps raw names.
#[derive(Debug, Default, Clone)]
pub struct MemoryPlatform {
    pub inputs: BTreeMap<String, String>,
    pub job_env: BTreeMap<String, String>,
    pub step_state: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub masked: Vec<String>,
    pub warnings: Vec<String>,
    pub failures: Vec<String>,
}

impl MemoryPlatform {
    pub fn with_input(mut self, name: &str, value: &str) -> Self {
        self.inputs.insert(env_key(name), value.to_string());
        self
    }

    pub fn with_job_env(mut self, name: &str, value: &str) -> Self {
        self.job_env.insert(env_key(name), value.to_string());
        self
    }

    pub fn with_step_state(mut self, name: &str, value: &str) -> Self {
        self.step_state.insert(name.to_string(), value.to_string());
        self
    }

    /// What the next process of the same job sees: inputs and persisted
    /// values carry over, everything emitted by this process does not.
    pub fn next_invocation(self) -> Self {
        Self {
            inputs: self.inputs,
            job_env: self.job_env,
            step_state: self.step_state,
            ..Self::default()
        }
    }
}

impl Platform for MemoryPlatform {
    fn input(&self, name: &str) -> Option<String> {
        self.inputs
            .get(&env_key(name))
            .map(|value| value.trim().to_string())
    }

    fn load(&self, scope: Scope, name: &str) -> Option<String> {
        match scope {
            Scope::Job => self.job_env.get(&env_key(name)).cloned(),
            Scope::Step => self.step_state.get(name).cloned(),
        }
    }

    fn save(&mut self, scope: Scope, name: &str, value: &str) -> Result<()> {
        match scope {
            Scope::Job => self.job_env.insert(env_key(name), value.to_string()),
            Scope::Step => self.step_state.insert(name.to_string(), value.to_string()),
        };
        Ok(())
    }

    fn set_output(&mut self, name: &str, value: &str) -> Result<()> {
        self.outputs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn mask(&mut self, value: &str) {
        self.masked.push(value.to_string());
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn fail(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }
}

pub fn step(status: StepStatus, conclusion: Option<RemoteConclusion>) -> StepResult {
    StepResult {
        name: String::new(),
        status,
        conclusion,
    }
}

pub fn job(id: u64, name: &str, steps: Vec<StepResult>) -> JobDescriptor {
    JobDescriptor {
        id,
        name: name.to_string(),
        steps,
        conclusion: None,
        html_url: None,
    }
}

pub fn matrix(axes: &[(&str, &str)]) -> MatrixContext {
    axes.iter()
        .map(|(axis, value)| (axis.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Jobs from `tests/fixtures/jobs_matrix.json`.
pub fn matrix_listing() -> JobListing {
    let jobs = parse_jobs(include_str!("../tests/fixtures/jobs_matrix.json"))
        .expect("fixture listing parses");
    JobListing::ok(jobs)
}

/// Run context of a push to `main` in `acme/widgets`, job key `build`.
pub fn run_context() -> RunContext {
    RunContext {
        api_url: "https://api.github.com".to_string(),
        server_url: "https://github.com".to_string(),
        repository: "acme/widgets".to_string(),
        run_id: 4242,
        run_attempt: 1,
        job: "build".to_string(),
        workflow: "CI".to_string(),
        workflow_ref: Some("acme/widgets/.github/workflows/ci.yml@refs/heads/main".to_string()),
        workspace: None,
        sha: "abc123".to_string(),
        git_ref: "refs/heads/main".to_string(),
        event_name: "push".to_string(),
        actor: "octocat".to_string(),
        event: Value::Null,
    }
}

/// Job lister returning a fixed listing, or a transport error when `None`.
#[derive(Debug, Clone)]
pub struct ScriptedJobLister {
    listing: Option<JobListing>,
    calls: Rc<Cell<usize>>,
}

impl Default for ScriptedJobLister {
    fn default() -> Self {
        Self::returning(JobListing::ok(Vec::new()))
    }
}

impl ScriptedJobLister {
    pub fn returning(listing: JobListing) -> Self {
        Self {
            listing: Some(listing),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::returning(JobListing {
            status,
            jobs: Vec::new(),
        })
    }

    pub fn unreachable() -> Self {
        Self {
            listing: None,
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl JobLister for ScriptedJobLister {
    fn list_jobs(&self, _run: &RunContext) -> Result<JobListing> {
        self.calls.set(self.calls.get() + 1);
        match &self.listing {
            Some(listing) => Ok(listing.clone()),
            None => bail!("connection refused"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Post {
        channel: String,
        attachments: Vec<Attachment>,
    },
    Update {
        channel: String,
        ts: String,
        attachments: Vec<Attachment>,
    },
    FindChannel {
        name: String,
    },
}

#[derive(Debug, Default)]
struct ChatLog {
    calls: Vec<ChatCall>,
    channels: BTreeMap<String, String>,
    ts: Option<String>,
    failure: Option<String>,
}

/// Chat API fake. Clones share one call log.
#[derive(Debug, Clone)]
pub struct RecordingChat {
    log: Rc<RefCell<ChatLog>>,
}

impl Default for RecordingChat {
    fn default() -> Self {
        Self {
            log: Rc::new(RefCell::new(ChatLog {
                ts: Some("1700000000.000100".to_string()),
                ..ChatLog::default()
            })),
        }
    }
}

impl RecordingChat {
    pub fn with_channel(self, name: &str, id: &str) -> Self {
        self.log
            .borrow_mut()
            .channels
            .insert(name.to_string(), id.to_string());
        self
    }

    /// Message id returned by post/update.
    pub fn with_ts(self, ts: Option<&str>) -> Self {
        self.log.borrow_mut().ts = ts.map(str::to_string);
        self
    }

    /// Make post/update fail with `reason`.
    pub fn failing(self, reason: &str) -> Self {
        self.log.borrow_mut().failure = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.log.borrow().calls.clone()
    }

    fn respond(&self, call: ChatCall) -> Result<Option<String>> {
        let mut log = self.log.borrow_mut();
        log.calls.push(call);
        if let Some(reason) = &log.failure {
            return Err(NotifyError::ChatApiFailure(reason.clone()).into());
        }
        Ok(log.ts.clone())
    }
}

impl ChatApi for RecordingChat {
    fn post_message(&self, channel: &str, attachments: &[Attachment]) -> Result<Option<String>> {
        self.respond(ChatCall::Post {
            channel: channel.to_string(),
            attachments: attachments.to_vec(),
        })
    }

    fn update_message(
        &self,
        channel: &str,
        ts: &str,
        attachments: &[Attachment],
    ) -> Result<Option<String>> {
        self.respond(ChatCall::Update {
            channel: channel.to_string(),
            ts: ts.to_string(),
            attachments: attachments.to_vec(),
        })
    }

    fn find_channel_id(&self, name: &str) -> Result<Option<String>> {
        let mut log = self.log.borrow_mut();
        log.calls.push(ChatCall::FindChannel {
            name: name.to_string(),
        });
        Ok(log.channels.get(&normalize_channel_name(name)).cloned())
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Connector handing out shared fakes and remembering which clients were built.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub chat: RecordingChat,
    pub jobs: ScriptedJobLister,
    connected: Rc<RefCell<Vec<&'static str>>>,
}

impl FakeConnector {
    pub fn new(chat: RecordingChat, jobs: ScriptedJobLister) -> Self {
        Self {
            chat,
            jobs,
            connected: Rc::default(),
        }
    }

    /// Clients built so far, in order (`"slack"`, `"github"`).
    pub fn connected(&self) -> Vec<&'static str> {
        self.connected.borrow().clone()
    }
}

impl Connector for FakeConnector {
    type Chat = RecordingChat;
    type Jobs = ScriptedJobLister;

    fn chat(&self, _slack_token: &str) -> Result<RecordingChat> {
        self.connected.borrow_mut().push("slack");
        Ok(self.chat.clone())
    }

    fn jobs(&self, _github_token: &str) -> Result<ScriptedJobLister> {
        self.connected.borrow_mut().push("github");
        Ok(self.jobs.clone())
    }
}

/// Temporary `GITHUB_ENV` / `GITHUB_STATE` / `GITHUB_OUTPUT` files.
pub struct ActionsFiles {
    _dir: TempDir,
    pub env_file: PathBuf,
    pub state_file: PathBuf,
    pub output_file: PathBuf,
}

impl ActionsFiles {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join("env");
        let state_file = dir.path().join("state");
        let output_file = dir.path().join("output");
        for path in [&env_file, &state_file, &output_file] {
            std::fs::write(path, "")?;
        }
        Ok(Self {
            _dir: dir,
            env_file,
            state_file,
            output_file,
        })
    }

    /// Environment entries pointing the runner file commands at these files.
    pub fn env(&self) -> HashMap<String, String> {
        [
            ("GITHUB_ENV", &self.env_file),
            ("GITHUB_STATE", &self.state_file),
            ("GITHUB_OUTPUT", &self.output_file),
        ]
        .into_iter()
        .map(|(key, path)| (key.to_string(), path.display().to_string()))
        .collect()
    }
}

/// Parse `name<<DELIM\nvalue\nDELIM` file command records.
pub fn read_file_commands(contents: &str) -> BTreeMap<String, String> {
    let mut records = BTreeMap::new();
    let mut lines = contents.lines();
    while let Some(header) = lines.next() {
        let Some((name, delimiter)) = header.split_once("<<") else {
            continue;
        };
        let mut value = Vec::new();
        for line in lines.by_ref() {
            if line == delimiter {
                break;
            }
            value.push(line);
        }
        records.insert(name.to_string(), value.join("\n"));
    }
    records
}
