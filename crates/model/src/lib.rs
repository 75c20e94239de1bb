//! Core domain for ForkGuard.
//!
//! ForkGuard keeps a fork in step with its upstream, watches upstream tags for
//! tampering, and makes sure security scans run on the pull requests that
//! synchronisation opens. This crate holds every domain concept, the pure
//! decision functions behind those three routines, and the port traits the
//! infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`CommitSha`, `TagName`, `IssueNumber`, etc.) |
//! | [`types`] | Shared value types (`RepositoryRef`, `DiffStats`, `OriginIdentity`, etc.) |
//! | [`errors`] | Port and run-level errors, retry policy |
//! | [`sync`] | Branch sync decision ([`plan_sync`]) |
//! | [`tags`] | Tag snapshots and classification ([`classify_tags`]) |
//! | [`scan`] | Findings and risk assessment ([`assess_risk`]) |
//! | [`notices`] | Issue, alert, pull request, and comment templates |
//! | [`ports`] | Traits implemented by infrastructure |

pub mod errors;
pub mod identifiers;
pub mod notices;
pub mod ports;
pub mod scan;
pub mod sync;
pub mod tags;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{ForkGuardError, HostError, RetryPolicy};
pub use identifiers::{
    BranchName, CommentId, CommitSha, IssueNumber, Label, Login, PullRequestNumber, RunId, TagName,
};
pub use notices::{Notice, Priority, PullRequestDraft};
pub use ports::{
    BaselineStore, CodeRepository, CommentRecord, IssueRecord, IssueTracker, NewPullRequest,
    PullRequestManager, PullRequestRecord, SecurityFindings, WorkflowDispatcher,
};
pub use scan::{assess_risk, Finding, FindingSource, RiskAssessment, RiskLevel, Severity};
pub use sync::{heads_match, plan_sync, AncestryRelation, Comparison, SyncOutcome, SyncPlan};
pub use tags::{
    classify_tags, validate_tag_name, RawTag, SkipReason, SkippedTag, TagClassification,
    TagEntry, TagMutation, TagReport, TagSnapshot, TagTarget, MAX_PEEL_DEPTH,
};
pub use types::{
    AccountKind, Actor, BranchRef, DiffStats, OriginIdentity, RepositoryRef, Revision, Timestamp,
    AMBIENT_TOKEN_LOGIN,
};
