//! Download task execution -- the sequential part loop of one task.
//!
//! Split into focused submodules:
//! - [`context`] - Per-task state shared by every part
//! - [`part`] - One attempt at one part: probe, classify, fetch, rename, record
//! - [`orchestration`] - Part loop, error budget and stop handling
//! - [`finalization`] - Cover queue drain and run summary

mod context;
mod finalization;
mod orchestration;
mod part;

pub(crate) use context::TaskContext;
pub(crate) use orchestration::run_task;
