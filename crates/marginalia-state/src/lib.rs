//! marginalia-state — SQLite-backed persistence for marginalia.
//!
//! Owns every durable row: sites, comments, pipeline runs, users, and
//! user↔site grants. All status transitions are conditional updates keyed
//! on the current status, so concurrent moderation decisions are safe and
//! "no row changed" is the canonical already-decided signal.

mod comments;
mod error;
mod runs;
mod sites;
mod store;
mod types;
mod users;

pub use comments::CommentFilter;
pub use error::{StoreError, StoreResult};
pub use store::{epoch_secs, Store};
pub use types::{
    Comment, CommentStatus, PipelineRun, RunState, RunStep, Site, SiteStatus, StatusFilter, User,
};
