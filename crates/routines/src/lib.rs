//! ForkGuard routines.
//!
//! Three independent, stateless check-and-report routines and the run-group
//! coordination used when they run on intervals inside one process.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Routines sequence calls between the decision logic
//! in the [`model`] crate and the port traits it defines. They contain no
//! domain rules of their own and share no state with each other: all
//! coordination goes through the hosting platform, read fresh on every run.
//!
//! | Routine | Entry point |
//! |---------|-------------|
//! | Branch sync checker | [`BranchSyncChecker::run`] |
//! | Tag integrity monitor | [`TagIntegrityMonitor::run`] |
//! | Scan trigger gate | [`ScanTriggerGate::trigger`], [`ScanTriggerGate::summarize`] |

pub mod branch_sync;
pub mod notify;
pub mod run_group;
pub mod scan_gate;
pub mod tag_monitor;

pub use branch_sync::{BranchSyncChecker, BranchSyncConfig, PullRequestAction, SyncReport};
pub use notify::{raise_notice, IssueAction};
pub use run_group::{group_key, LatestWins, RunGroups};
pub use scan_gate::{
    CommentAction, ScanGateConfig, ScanSummaryReport, ScanTrigger, ScanTriggerGate,
};
pub use tag_monitor::{
    BaselineSource, TagIntegrityMonitor, TagMonitorConfig, TagMonitorReport, TagNotification,
};
