//! Identify which job in a workflow run is the one currently executing.
//!
//! The job listing exposes no structured matrix data. A matrix cell only shows
//! up as a display suffix, `build (linux, amd64)`, so matching works on that
//! suffix: base name compared case-insensitively, suffix tokens checked for
//! membership in the supplied matrix context. Token order in the suffix is not
//! guaranteed to follow axis order, and the context may carry axes that the
//! display name leaves out, hence set containment rather than equality.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{JobDescriptor, JobListing, MatrixContext, render_scalar};
use crate::error::NotifyError;

static MATRIX_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)\s*\((?P<matrix>[^()]+)\)\s*$").expect("valid matrix name regex")
});

static MATRIX_PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*matrix\.(?P<axis>[A-Za-z0-9_-]+)\s*\}\}")
        .expect("valid placeholder regex")
});

/// A job display name split into its base name and matrix suffix tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixJobName<'a> {
    pub base: &'a str,
    pub values: Vec<&'a str>,
}

/// Split `base (v1, v2, ...)`. Returns `None` when there is no suffix or the
/// suffix holds no tokens.
pub fn parse_matrix_job_name(name: &str) -> Option<MatrixJobName<'_>> {
    let caps = MATRIX_NAME_RE.captures(name)?;
    let base = caps.name("name")?.as_str().trim();
    let values: Vec<&str> = caps
        .name("matrix")?
        .as_str()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(MatrixJobName { base, values })
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Does `job_name` denote the matrix cell described by `matrix`?
pub fn matches_matrix_job(job_name: &str, expected_name: &str, matrix: &MatrixContext) -> bool {
    let Some(parsed) = parse_matrix_job_name(job_name) else {
        return false;
    };
    if !same_name(parsed.base, expected_name) {
        return false;
    }
    let known = matrix.flattened_values();
    parsed
        .values
        .iter()
        .all(|token| known.iter().any(|value| value == token))
}

/// Pick the one job matching `expected_name` (and `matrix`, when non-empty).
///
/// Exact case-insensitive name matches are considered first; matrix matches
/// only when there is none. Exactly one candidate must remain.
pub fn find_current_job<'a>(
    jobs: &'a [JobDescriptor],
    expected_name: &str,
    matrix: &MatrixContext,
) -> Result<&'a JobDescriptor, NotifyError> {
    let mut candidates: Vec<&JobDescriptor> = jobs
        .iter()
        .filter(|job| same_name(&job.name, expected_name))
        .collect();
    if candidates.is_empty() && !matrix.is_empty() {
        candidates = jobs
            .iter()
            .filter(|job| matches_matrix_job(&job.name, expected_name, matrix))
            .collect();
    }
    match candidates.as_slice() {
        [] => Err(NotifyError::JobNotFound {
            name: expected_name.to_string(),
        }),
        [job] => Ok(*job),
        many => Err(NotifyError::AmbiguousJob {
            name: expected_name.to_string(),
            candidates: many.iter().map(|job| job.name.clone()).collect(),
        }),
    }
}

/// Resolve the current job from a listing result.
///
/// A listing that did not succeed fails before any matching is attempted.
pub fn resolve_current_job<'a>(
    listing: &'a JobListing,
    expected_name: &str,
    matrix: &MatrixContext,
) -> Result<&'a JobDescriptor, NotifyError> {
    match listing.status {
        200..=299 => {}
        403 => return Err(NotifyError::JobListingForbidden),
        status => return Err(NotifyError::JobListingFailure { status }),
    }
    find_current_job(&listing.jobs, expected_name, matrix)
}

/// Compute the display name the current job should carry.
///
/// `declared` is the job's `name:` from the workflow file, if any.
/// `${{ matrix.<axis> }}` placeholders are filled from `matrix`; any other
/// expression cannot be evaluated here and yields `UnsupportedJobName`.
pub fn expected_job_name(
    job_key: &str,
    declared: Option<&str>,
    matrix: &MatrixContext,
) -> Result<String, NotifyError> {
    let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(job_key.to_string());
    };
    let mut unresolved = false;
    let rendered = MATRIX_PLACEHOLDER_RE.replace_all(declared, |caps: &regex::Captures<'_>| {
        match matrix.get(&caps["axis"]) {
            Some(value) => render_scalar(value),
            None => {
                unresolved = true;
                caps[0].to_string()
            }
        }
    });
    if unresolved || rendered.contains("${{") {
        return Err(NotifyError::UnsupportedJobName {
            name: declared.to_string(),
        });
    }
    Ok(rendered.trim().to_string())
}
