//! Slack attachment content for a lifecycle status.

use serde::Serialize;
use serde_json::Value;

use crate::core::types::{JobDescriptor, LifecycleStatus, MatrixContext};
use crate::io::context::RunContext;

const FOOTER_ICON: &str = "https://github.githubassets.com/favicon.ico";

/// How much detail a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Title plus Repo/Status/Workflow/Job/Matrix/Extra fields.
    Rich,
    /// Title and free text only.
    Plain,
}

impl MessageType {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rich" => Ok(MessageType::Rich),
            "plain" => Ok(MessageType::Plain),
            other => Err(format!("expected 'rich' or 'plain', got '{other}'")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Rich => "rich",
            MessageType::Plain => "plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<AttachmentField>>,
    pub author_name: String,
    pub author_link: String,
    pub footer_icon: String,
    pub footer: String,
    pub ts: String,
    pub mrkdwn_in: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
}

/// Everything a message is built from.
#[derive(Debug, Clone)]
pub struct MessageInputs<'a> {
    pub status: LifecycleStatus,
    pub job: Option<&'a JobDescriptor>,
    pub matrix: &'a MatrixContext,
    pub message_type: MessageType,
    /// `message-custom`, shown as the "Extra" field.
    pub custom: &'a str,
    /// `message-summary`, the attachment body.
    pub summary: &'a str,
    /// `message-text`, shown above the attachment.
    pub text: &'a str,
    /// Unix seconds stamped on the attachment.
    pub timestamp: i64,
    /// `job-status` as reported by the workflow, shown only when no job was
    /// resolved.
    pub reported_status: Option<LifecycleStatus>,
}

pub fn status_color(status: LifecycleStatus) -> &'static str {
    match status {
        LifecycleStatus::Started | LifecycleStatus::Skipped => "#c0c0c0",
        LifecycleStatus::Unknown => "#800080",
        LifecycleStatus::Cancelled => "warning",
        LifecycleStatus::InProgress => "#0000cc",
        LifecycleStatus::Success => "good",
        LifecycleStatus::Failure => "danger",
    }
}

/// Build the attachment list for one post or update.
pub fn build_attachments(ctx: &RunContext, inputs: &MessageInputs<'_>) -> Vec<Attachment> {
    let repo_url = ctx.repo_url();
    let repo_link = format!("<{repo_url} | {}>", ctx.repository);

    let fields = match inputs.message_type {
        MessageType::Rich => Some(rich_fields(ctx, inputs, &repo_url, &repo_link)),
        MessageType::Plain => None,
    };
    let (title, title_link) = title_for(ctx, &repo_url);

    vec![Attachment {
        color: status_color(inputs.status).to_string(),
        fields,
        author_name: ctx.actor.clone(),
        author_link: format!("{}/{}", ctx.server_url, ctx.actor),
        footer_icon: FOOTER_ICON.to_string(),
        footer: repo_link,
        ts: inputs.timestamp.to_string(),
        mrkdwn_in: vec!["pretext".to_string(), "text".to_string()],
        pretext: non_empty(inputs.text),
        text: non_empty(inputs.summary),
        title: Some(title),
        title_link,
    }]
}

fn rich_fields(
    ctx: &RunContext,
    inputs: &MessageInputs<'_>,
    repo_url: &str,
    repo_link: &str,
) -> Vec<AttachmentField> {
    let mut fields = vec![
        field("Repo", repo_link.to_string()),
        field("Status", title_case(inputs.status.as_str())),
        field(
            "Workflow",
            format!("<{repo_url}/actions/runs/{} | {}>", ctx.run_id, ctx.workflow),
        ),
    ];
    match (inputs.job, inputs.reported_status) {
        (Some(job), _) => fields.push(field(
            "Job",
            format!(
                "<{repo_url}/runs/{}?check_suite_focus=true | {}>",
                job.id, job.name
            ),
        )),
        (None, Some(reported)) => {
            fields.push(field("Reported Status", title_case(reported.as_str())));
        }
        (None, None) => {}
    }
    if !inputs.matrix.is_empty() {
        fields.push(field("Matrix", inputs.matrix.to_string()));
    }
    if !inputs.custom.is_empty() {
        fields.push(field("Extra", inputs.custom.to_string()));
    }
    fields
}

fn title_for(ctx: &RunContext, repo_url: &str) -> (String, Option<String>) {
    let event_title = title_case(&ctx.event_name);
    let payload = &ctx.event;
    let branch = ctx.branch_name();
    match ctx.event_name.as_str() {
        "pull_request" => (
            format!(
                "{event_title} [{}]: {}",
                text_at(payload, &["action"]),
                text_at(payload, &["pull_request", "title"])
            ),
            link_at(payload, &["pull_request", "html_url"]),
        ),
        "release" => (
            format!(
                "{event_title}: {} [{}]",
                text_at(payload, &["release", "name"]),
                text_at(payload, &["release", "tag_name"])
            ),
            link_at(payload, &["release", "html_url"]),
        ),
        "push" => (
            format!(
                "{event_title}: {} [{branch}]",
                text_at(payload, &["head_commit", "message"])
            ),
            link_at(payload, &["compare"]),
        ),
        _ => (
            format!("{event_title}: {branch}"),
            Some(format!("{repo_url}/commit/{}", ctx.sha)),
        ),
    }
}

fn field(title: &str, value: String) -> AttachmentField {
    AttachmentField {
        title: title.to_string(),
        value,
        short: true,
    }
}

fn text_at<'a>(payload: &'a Value, path: &[&str]) -> &'a str {
    lookup(payload, path).and_then(Value::as_str).unwrap_or("")
}

fn link_at(payload: &Value, path: &[&str]) -> Option<String> {
    lookup(payload, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |value, key| value.get(key))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// `pull_request` → `Pull Request`.
fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
