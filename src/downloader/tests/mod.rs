use crate::downloader::test_helpers::*;
use crate::error::Error;
use crate::fetcher::OutputTarget;
use crate::identity::Fingerprint;
use crate::ledger::Classification;
use crate::types::{OutcomeStatus, RunOutcome, TaskId, TaskStatus};
use std::sync::Arc;

mod resume;
mod retry;
