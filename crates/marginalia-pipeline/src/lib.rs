//! marginalia-pipeline — the moderation-triggered publication pipeline.
//!
//! A bounded in-memory queue feeds exactly one background worker task;
//! each dequeued run executes checkout → generate → hugo → commit → push
//! against the site's working directory, recording per-step state in the
//! store. Runs are globally serialized: git working directories and
//! subprocess invocations do not interleave safely across runs.

pub mod generator;
pub mod gitcli;
pub mod hugocli;
pub mod runner;
pub mod worker;

pub use runner::Runner;
pub use worker::{EnqueueError, Enqueuer, RunRequest, Worker, DEFAULT_QUEUE_SIZE};
