//! Domain types persisted by the store.

use serde::{Deserialize, Serialize};

// ── Sites ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Disabled,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Active => "active",
            SiteStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SiteStatus::Active),
            "disabled" => Some(SiteStatus::Disabled),
            _ => None,
        }
    }
}

/// A site row. Created by the synchronizer when the config first lists the
/// key; never deleted, only disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub id: i64,
    pub site_key: String,
    pub title: String,
    pub status: SiteStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

// ── Comments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
    Deleted,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
            CommentStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommentStatus::Pending),
            "approved" => Some(CommentStatus::Approved),
            "rejected" => Some(CommentStatus::Rejected),
            "spam" => Some(CommentStatus::Spam),
            "deleted" => Some(CommentStatus::Deleted),
            _ => None,
        }
    }
}

/// A stored comment. `id` is a ULID, so the default `(created_at, id)`
/// ordering is deterministic even within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: String,
    pub site_id: i64,
    pub entry_id: Option<String>,
    /// URL path of the page bundle, e.g. "/posts/foo/".
    pub post_path: String,
    pub parent_id: Option<String>,
    pub status: CommentStatus,
    pub author: String,
    pub email: String,
    pub author_url: Option<String>,
    pub body: String,
    pub ip: Option<String>,
    pub created_at: i64,
    pub approved_at: Option<i64>,
    pub rejected_at: Option<i64>,
}

/// Status selector for moderation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    One(CommentStatus),
    All,
}

impl StatusFilter {
    pub fn parse(s: &str) -> Option<Self> {
        if s == "all" {
            return Some(StatusFilter::All);
        }
        CommentStatus::parse(s).map(StatusFilter::One)
    }
}

// ── Pipeline runs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Success,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RunState::Queued),
            "running" => Some(RunState::Running),
            "success" => Some(RunState::Success),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }
}

/// Pipeline stages, as recorded in the run row. `Enqueue` marks a run that
/// never made it into the queue; `Pipeline` marks a failure outside any
/// specific stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStep {
    Enqueue,
    Checkout,
    Generate,
    Hugo,
    Commit,
    Push,
    Pipeline,
}

impl RunStep {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStep::Enqueue => "enqueue",
            RunStep::Checkout => "checkout",
            RunStep::Generate => "generate",
            RunStep::Hugo => "hugo",
            RunStep::Commit => "commit",
            RunStep::Push => "push",
            RunStep::Pipeline => "pipeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enqueue" => Some(RunStep::Enqueue),
            "checkout" => Some(RunStep::Checkout),
            "generate" => Some(RunStep::Generate),
            "hugo" => Some(RunStep::Hugo),
            "commit" => Some(RunStep::Commit),
            "push" => Some(RunStep::Push),
            "pipeline" => Some(RunStep::Pipeline),
            _ => None,
        }
    }
}

/// One end-to-end publication attempt. Terminal states are sticky; a
/// failed run's step identifies the failing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub id: i64,
    pub site_id: i64,
    pub trigger_comment_id: Option<String>,
    pub state: RunState,
    pub step: Option<RunStep>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

// ── Users ─────────────────────────────────────────────────────────

/// An admin user. `password` holds the PHC-encoded Argon2id hash and is
/// never serialized into API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: i64,
    pub updated_at: i64,
}
