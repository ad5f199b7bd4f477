//! Declared job names from the running workflow file.
//!
//! Only `jobs.<key>.name` is read. A job without `name:` is displayed under
//! its key, so it is simply left out of the map.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yml::Value;
use tracing::{debug, warn};

use crate::io::context::RunContext;

#[derive(Debug, Deserialize)]
struct WorkflowFile {
    #[serde(default)]
    jobs: BTreeMap<String, WorkflowJob>,
}

#[derive(Debug, Deserialize)]
struct WorkflowJob {
    #[serde(default)]
    name: Option<Value>,
}

/// Parse workflow YAML into job key → declared name.
pub fn parse_job_names(contents: &str) -> Result<BTreeMap<String, String>> {
    let workflow: WorkflowFile = serde_yml::from_str(contents).context("parse workflow yaml")?;
    let names = workflow
        .jobs
        .into_iter()
        .filter_map(|(key, job)| {
            let name = match job.name? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, name))
        })
        .collect();
    Ok(names)
}

/// Read and parse a workflow file.
pub fn load_job_names(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_job_names(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Job names for the running workflow; empty when the file is unavailable.
///
/// The workflow file is only present when the repository is checked out, so
/// any failure here is logged and the caller falls back to job keys.
pub fn job_names_for(ctx: &RunContext) -> BTreeMap<String, String> {
    let Some(path) = ctx.workflow_file() else {
        debug!("workflow file location unknown; using job keys");
        return BTreeMap::new();
    };
    match load_job_names(&path) {
        Ok(names) => {
            debug!(path = %path.display(), jobs = names.len(), "workflow job names loaded");
            names
        }
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "could not read workflow job names");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const WORKFLOW: &str = r#"
name: CI
on: [push]
jobs:
  build:
    name: Build ${{ matrix.os }}
    runs-on: ${{ matrix.os }}
    strategy:
      matrix:
        os: [ubuntu-latest, macos-latest]
    steps:
      - uses: actions/checkout@v4
  lint:
    runs-on: ubuntu-latest
    steps:
      - run: make lint
  release:
    name: Release
    runs-on: ubuntu-latest
"#;

    #[test]
    fn declared_names_are_collected() {
        let names = parse_job_names(WORKFLOW).expect("parse");
        assert_eq!(
            names.get("build").map(String::as_str),
            Some("Build ${{ matrix.os }}")
        );
        assert_eq!(names.get("release").map(String::as_str), Some("Release"));
        assert!(!names.contains_key("lint"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_job_names("jobs: [unterminated").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_empty_map() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = crate::test_support::run_context();
        ctx.workspace = Some(PathBuf::from(temp.path()));
        assert!(job_names_for(&ctx).is_empty());

        let dir = temp.path().join(".github/workflows");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("ci.yml"), WORKFLOW).expect("write workflow");
        assert_eq!(
            job_names_for(&ctx).get("release").map(String::as_str),
            Some("Release")
        );
    }
}
