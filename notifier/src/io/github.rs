//! Job listing for the current workflow run attempt.
//!
//! The [`JobLister`] trait decouples job resolution from the REST API so
//! tests can script listings. A transport error is an `Err`; an HTTP error
//! status is a successful call carrying that status in the [`JobListing`].

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::types::{JobDescriptor, JobListing};
use crate::io::context::RunContext;

const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// The listing is a single best-effort call; one page covers any realistic run.
const PER_PAGE: u32 = 100;

pub trait JobLister {
    /// List the jobs of the run attempt described by `run`.
    fn list_jobs(&self, run: &RunContext) -> Result<JobListing>;
}

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<JobDescriptor>,
}

/// REST client for `GET /repos/{repo}/actions/runs/{id}/attempts/{n}/jobs`.
pub struct GithubClient {
    http: Client,
    token: String,
}

impl GithubClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build github http client")?;
        Ok(Self {
            http,
            token: token.to_string(),
        })
    }
}

impl JobLister for GithubClient {
    #[instrument(skip_all, fields(run_id = run.run_id, attempt = run.run_attempt))]
    fn list_jobs(&self, run: &RunContext) -> Result<JobListing> {
        let url = jobs_url(run);
        debug!(%url, "listing jobs");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("notifier/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION)
            .query(&[("per_page", PER_PAGE)])
            .send()
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            debug!(status, "job listing returned an error status");
            return Ok(JobListing {
                status,
                jobs: Vec::new(),
            });
        }
        let body = resp.text().context("read job listing")?;
        let jobs = parse_jobs(&body)?;
        debug!(status, jobs = jobs.len(), "jobs listed");
        Ok(JobListing { status, jobs })
    }
}

fn jobs_url(run: &RunContext) -> String {
    format!(
        "{}/repos/{}/actions/runs/{}/attempts/{}/jobs",
        run.api_url.trim_end_matches('/'),
        run.repository,
        run.run_id,
        run.run_attempt
    )
}

/// Parse a raw listing body.
pub fn parse_jobs(body: &str) -> Result<Vec<JobDescriptor>> {
    let page: JobsPage = serde_json::from_str(body).context("parse job listing")?;
    Ok(page.jobs)
}
