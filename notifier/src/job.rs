//! Locate the job this invocation runs in, degrading to "unknown job".
//!
//! Every failure on this path (unsupported job name, unreachable API, error
//! status, no match or several matches) is reported as a warning and yields `None`; callers then
//! build their message without job details.

use tracing::{debug, warn};

use crate::core::resolver::{expected_job_name, resolve_current_job};
use crate::core::types::{JobDescriptor, MatrixContext};
use crate::io::context::RunContext;
use crate::io::github::JobLister;
use crate::io::platform::Platform;
use crate::io::workflow::job_names_for;

pub fn locate_current_job<P: Platform, L: JobLister>(
    platform: &mut P,
    lister: &L,
    ctx: &RunContext,
    matrix: &MatrixContext,
) -> Option<JobDescriptor> {
    let names = job_names_for(ctx);
    let declared = names.get(&ctx.job).map(String::as_str);
    let expected = match expected_job_name(&ctx.job, declared, matrix) {
        Ok(name) => name,
        Err(err) => {
            report(platform, &err.to_string());
            return None;
        }
    };
    debug!(job_key = %ctx.job, %expected, "resolving current job");

    let listing = match lister.list_jobs(ctx) {
        Ok(listing) => listing,
        Err(err) => {
            report(platform, &format!("could not list jobs for this run: {err:#}"));
            return None;
        }
    };

    match resolve_current_job(&listing, &expected, matrix) {
        Ok(job) => {
            debug!(job_id = job.id, name = %job.name, "current job resolved");
            Some(job.clone())
        }
        Err(err) => {
            report(platform, &err.to_string());
            None
        }
    }
}

fn report<P: Platform>(platform: &mut P, message: &str) {
    warn!("{message}");
    platform.warning(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::JobListing;
    use crate::test_support::{
        MemoryPlatform, ScriptedJobLister, job, matrix, matrix_listing, run_context,
    };
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn matrix_cell_is_resolved_from_listing() {
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::returning(matrix_listing());
        let job = locate_current_job(
            &mut platform,
            &lister,
            &run_context(),
            &matrix(&[("os", "linux"), ("arch", "amd64")]),
        )
        .expect("job");
        assert_eq!(job.id, 9002);
        assert!(platform.warnings.is_empty());
        assert_eq!(lister.calls(), 1);
    }

    #[test]
    fn forbidden_listing_warns_about_scope() {
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::status(403);
        let job = locate_current_job(
            &mut platform,
            &lister,
            &run_context(),
            &MatrixContext::default(),
        );
        assert!(job.is_none());
        assert_eq!(platform.warnings.len(), 1);
        assert!(platform.warnings[0].contains("actions: read"));
        assert!(platform.failures.is_empty());
    }

    #[test]
    fn unreachable_api_degrades_to_unknown_job() {
        let mut platform = MemoryPlatform::default();
        let job = locate_current_job(
            &mut platform,
            &ScriptedJobLister::unreachable(),
            &run_context(),
            &MatrixContext::default(),
        );
        assert!(job.is_none());
        assert!(platform.warnings[0].contains("connection refused"));
    }

    #[test]
    fn unmatched_job_is_reported() {
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::returning(matrix_listing());
        let job = locate_current_job(
            &mut platform,
            &lister,
            &run_context(),
            &matrix(&[("os", "windows")]),
        );
        assert!(job.is_none());
        assert!(platform.warnings[0].contains("'build'"));
    }

    #[test]
    fn ambiguous_match_degrades_to_unknown_job() {
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::returning(JobListing::ok(vec![
            job(1, "build (linux)", Vec::new()),
            job(2, "build (linux, amd64)", Vec::new()),
        ]));
        let located = locate_current_job(
            &mut platform,
            &lister,
            &run_context(),
            &matrix(&[("os", "linux"), ("arch", "amd64")]),
        );
        assert!(located.is_none());
        assert_eq!(platform.warnings.len(), 1);
        assert!(platform.warnings[0].contains("2 jobs in this workflow run matched 'build'"));
        assert!(platform.failures.is_empty());
    }

    #[test]
    fn declared_name_with_expression_skips_listing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(".github/workflows");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(
            dir.join("ci.yml"),
            "jobs:\n  build:\n    name: Build ${{ github.ref }}\n",
        )
        .expect("write workflow");

        let mut ctx = run_context();
        ctx.workspace = Some(PathBuf::from(temp.path()));
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::returning(matrix_listing());
        let job = locate_current_job(&mut platform, &lister, &ctx, &MatrixContext::default());

        assert!(job.is_none());
        assert_eq!(lister.calls(), 0);
        assert!(platform.warnings[0].contains("matrix.<axis>"));
    }

    #[test]
    fn declared_name_is_rendered_before_matching() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join(".github/workflows");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("ci.yml"), "jobs:\n  build:\n    name: lint\n").expect("write workflow");

        let mut ctx = run_context();
        ctx.workspace = Some(PathBuf::from(temp.path()));
        let mut platform = MemoryPlatform::default();
        let lister = ScriptedJobLister::returning(matrix_listing());
        let job = locate_current_job(&mut platform, &lister, &ctx, &MatrixContext::default())
            .expect("job");
        assert_eq!(job.id, 9003);
    }
}
