//! Stable exit codes for notifier CLI commands.

/// The phase completed, possibly with warnings about remote calls.
pub const OK: i32 = 0;
/// Invalid configuration: a required input is missing or malformed, or the
/// channel cannot be resolved.
pub const FAILED: i32 = 1;
