//! Slack notifications for a GitHub Actions job, posted when the job starts
//! and updated with its conclusion when it ends.
//!
//! The binary runs twice per job: once as the action's main step (START) and
//! once as its post step (END). The two processes share nothing but the
//! runner's persisted state, so the crate is organized around that boundary:
//!
//! - **[`core`]**: Pure, deterministic logic (job resolution, matrix matching,
//!   lifecycle status). No I/O, fully testable in isolation.
//! - **[`io`]**: Side effects: the runner platform, the typed state store
//!   layered on it, and the GitHub and Slack clients behind traits.
//!
//! Orchestration modules ([`start`], [`finish`], [`run`]) combine the two
//! for each phase, with [`config`] resolving every setting up front.

pub mod config;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod finish;
pub mod io;
pub mod job;
pub mod logging;
pub mod message;
pub mod run;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
