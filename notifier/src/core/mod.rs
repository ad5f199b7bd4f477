//! Deterministic, pure logic for job identity and lifecycle status.
//!
//! Core modules must be free of I/O side effects. They operate on job
//! listings and matrix contexts already in memory.

pub mod lifecycle;
pub mod resolver;
pub mod types;
