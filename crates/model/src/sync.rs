//! Branch synchronisation decisions.
//!
//! [`plan_sync`] is the whole decision procedure of the branch sync checker:
//! given the two branch heads, how they relate in history, and the force flag,
//! it says what to do. Everything else the checker does is I/O.

use serde::{Deserialize, Serialize};

use crate::{CommitSha, DiffStats};

/// How `head` relates to `base` in commit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncestryRelation {
    /// Same commit.
    Identical,
    /// `base` is a strict ancestor of `head`.
    Ahead,
    /// `head` is a strict ancestor of `base`.
    Behind,
    /// Neither is an ancestor of the other.
    Diverged,
}

/// Result of comparing two revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub relation: AncestryRelation,
    /// Commits on `head` not on `base`.
    pub ahead_by: u64,
    /// Commits on `base` not on `head`.
    pub behind_by: u64,
    pub stats: DiffStats,
}

/// Outcome of one sync attempt. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    AlreadyCurrent,
    FastForwarded,
    /// Terminal for the run; a human has to reconcile the branches.
    Diverged,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyCurrent => write!(f, "already-current"),
            Self::FastForwarded => write!(f, "fast-forwarded"),
            Self::Diverged => write!(f, "diverged"),
        }
    }
}

/// What the checker must do to the tracking branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// Heads are equal and nothing was forced.
    NoOp,
    /// Move the tracking branch to the upstream head.
    ///
    /// `force_reset` discards tracking-branch commits not on upstream.
    Advance { force_reset: bool },
    /// Fast-forward is impossible; report and leave the branch alone.
    ReportDivergence,
}

impl SyncPlan {
    /// The outcome this plan produces when carried out successfully.
    pub fn outcome(self) -> SyncOutcome {
        match self {
            Self::NoOp => SyncOutcome::AlreadyCurrent,
            Self::Advance { .. } => SyncOutcome::FastForwarded,
            Self::ReportDivergence => SyncOutcome::Diverged,
        }
    }
}

/// Returns `true` when the heads are equal and no history comparison is needed.
pub fn heads_match(tracking: &CommitSha, upstream: &CommitSha) -> bool {
    tracking == upstream
}

/// Decides how to bring the tracking branch up to date.
///
/// `relation` is upstream's head relative to the tracking head (base = tracking,
/// head = upstream). The tracking branch can be fast-forwarded only when it is
/// an ancestor of upstream; a tracking branch that carries its own commits
/// (`Behind` or `Diverged`) needs `force`.
pub fn plan_sync(relation: AncestryRelation, force: bool) -> SyncPlan {
    match (relation, force) {
        (AncestryRelation::Identical, false) => SyncPlan::NoOp,
        (AncestryRelation::Identical, true) | (AncestryRelation::Ahead, _) => {
            SyncPlan::Advance { force_reset: false }
        }
        (AncestryRelation::Behind | AncestryRelation::Diverged, true) => {
            SyncPlan::Advance { force_reset: true }
        }
        (AncestryRelation::Behind | AncestryRelation::Diverged, false) => SyncPlan::ReportDivergence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AncestryRelation; 4] = [
        AncestryRelation::Identical,
        AncestryRelation::Ahead,
        AncestryRelation::Behind,
        AncestryRelation::Diverged,
    ];

    #[test]
    fn test_identical_without_force_is_already_current() {
        let plan = plan_sync(AncestryRelation::Identical, false);
        assert_eq!(plan, SyncPlan::NoOp);
        assert_eq!(plan.outcome(), SyncOutcome::AlreadyCurrent);
    }

    #[test]
    fn test_ancestor_fast_forwards() {
        for force in [false, true] {
            let plan = plan_sync(AncestryRelation::Ahead, force);
            assert_eq!(plan, SyncPlan::Advance { force_reset: false });
            assert_eq!(plan.outcome(), SyncOutcome::FastForwarded);
        }
    }

    #[test]
    fn test_diverged_without_force_reports() {
        assert_eq!(
            plan_sync(AncestryRelation::Diverged, false),
            SyncPlan::ReportDivergence
        );
        // Local-only commits on the tracking branch also block a fast-forward.
        assert_eq!(
            plan_sync(AncestryRelation::Behind, false),
            SyncPlan::ReportDivergence
        );
    }

    #[test]
    fn test_force_never_diverges() {
        for relation in ALL {
            assert_ne!(plan_sync(relation, true).outcome(), SyncOutcome::Diverged);
        }
    }

    #[test]
    fn test_force_resets_divergent_branch() {
        assert_eq!(
            plan_sync(AncestryRelation::Diverged, true),
            SyncPlan::Advance { force_reset: true }
        );
    }

    #[test]
    fn test_heads_match() {
        let a = CommitSha::new("aaaa1111").unwrap();
        let b = CommitSha::new("bbbb2222").unwrap();
        assert!(heads_match(&a, &a.clone()));
        assert!(!heads_match(&a, &b));
    }
}
