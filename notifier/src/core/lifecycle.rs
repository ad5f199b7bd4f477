//! Lifecycle queries over a resolved job.
//!
//! The job's own `conclusion` stays empty while the job is running, which is
//! exactly when both queries run, so they work off the step list instead.

use crate::core::types::{Conclusion, JobDescriptor, LifecycleStatus, RemoteConclusion, StepResult};

/// Completed non-skipped steps still counted as "just started".
///
/// The platform always injects a "Set up job" step; one more covers a
/// checkout that has to run before the notifier itself.
pub const JUST_STARTED_STEP_ALLOWANCE: usize = 2;

/// True while no more than [`JUST_STARTED_STEP_ALLOWANCE`] steps have finished.
pub fn has_job_just_started(job: &JobDescriptor) -> bool {
    terminal_steps(job).count() <= JUST_STARTED_STEP_ALLOWANCE
}

/// Derive the job's conclusion from its finished steps.
///
/// Priority: failure, then cancelled, then success. With no finished steps
/// fall back to the job's own conclusion, or `Unknown`.
pub fn compute_conclusion(job: &JobDescriptor) -> Conclusion {
    let mut saw_cancelled = false;
    let mut saw_success = false;
    for step in terminal_steps(job) {
        match step.conclusion {
            Some(RemoteConclusion::Failure) => return Conclusion::Failure,
            Some(RemoteConclusion::Cancelled) => saw_cancelled = true,
            Some(RemoteConclusion::Success) => saw_success = true,
            _ => {}
        }
    }
    if saw_cancelled {
        return Conclusion::Cancelled;
    }
    if saw_success {
        return Conclusion::Success;
    }
    job.conclusion.map(Conclusion::from).unwrap_or(Conclusion::Unknown)
}

/// Status label for the START phase.
pub fn start_status(job: Option<&JobDescriptor>) -> LifecycleStatus {
    // An unresolved job is treated as freshly started.
    match job {
        Some(job) if !has_job_just_started(job) => LifecycleStatus::InProgress,
        _ => LifecycleStatus::Started,
    }
}

/// Status label for the END phase.
pub fn end_status(job: Option<&JobDescriptor>) -> LifecycleStatus {
    job.map(compute_conclusion)
        .unwrap_or(Conclusion::Unknown)
        .into()
}

fn terminal_steps(job: &JobDescriptor) -> impl Iterator<Item = &StepResult> {
    job.steps.iter().filter(|step| step.is_terminal())
}
