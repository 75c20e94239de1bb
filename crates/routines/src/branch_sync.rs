//! Branch sync checker.
//!
//! Brings the fork's tracking branch up to the upstream default branch by
//! fast-forward, then proposes the result to the fork's default branch as a
//! pull request. When a fast-forward is impossible it reports the divergence
//! instead and leaves the branch alone.
//!
//! Every read happens before the single ref write, so a failed run leaves no
//! partial state behind.

use std::sync::Arc;

use model::{
    heads_match, notices, plan_sync, AncestryRelation, BranchName, BranchRef, CodeRepository,
    CommitSha, Comparison, DiffStats, ForkGuardError, HostError, IssueTracker, NewPullRequest,
    OriginIdentity, PullRequestManager, PullRequestNumber, RepositoryRef, Revision, RunId,
    SyncOutcome, SyncPlan,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::notify::{raise_notice, IssueAction};

/// Inputs of one sync run.
#[derive(Debug, Clone)]
pub struct BranchSyncConfig {
    pub upstream: RepositoryRef,
    /// Upstream's default branch.
    pub upstream_branch: BranchName,
    pub fork: RepositoryRef,
    /// The fork's own default branch, where local changes live.
    pub fork_default_branch: BranchName,
    /// Branch in the fork dedicated to mirroring upstream.
    pub tracking_branch: BranchName,
    /// Reset the tracking branch to upstream even when that discards commits.
    pub force: bool,
}

impl BranchSyncConfig {
    fn upstream_ref(&self) -> BranchRef {
        BranchRef {
            repository: self.upstream.clone(),
            branch: self.upstream_branch.clone(),
        }
    }

    fn tracking_ref(&self) -> BranchRef {
        BranchRef {
            repository: self.fork.clone(),
            branch: self.tracking_branch.clone(),
        }
    }

    fn default_ref(&self) -> BranchRef {
        BranchRef {
            repository: self.fork.clone(),
            branch: self.fork_default_branch.clone(),
        }
    }
}

/// What happened to the sync pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "number")]
pub enum PullRequestAction {
    Opened(PullRequestNumber),
    /// An open sync pull request already existed; its body was refreshed.
    Refreshed(PullRequestNumber),
    /// The tracking branch has nothing the default branch lacks.
    NothingToMerge,
}

/// Result of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: RunId,
    pub outcome: SyncOutcome,
    /// Tracking head before the run; `None` if the branch had to be created.
    pub tracking_before: Option<CommitSha>,
    pub upstream_head: CommitSha,
    pub force_reset: bool,
    pub pull_request: Option<PullRequestAction>,
    pub divergence_issue: Option<IssueAction>,
    /// Identity used to create pull requests in this run.
    pub pull_request_identity: OriginIdentity,
}

/// Runs the branch sync protocol against the hosting platform.
pub struct BranchSyncChecker {
    code: Arc<dyn CodeRepository>,
    issues: Arc<dyn IssueTracker>,
    pulls: Arc<dyn PullRequestManager>,
    pull_request_identity: OriginIdentity,
}

impl BranchSyncChecker {
    /// Creates a checker.
    ///
    /// `pulls` is the client pull requests are created with and
    /// `pull_request_identity` the identity it acts as; the two must agree.
    pub fn new(
        code: Arc<dyn CodeRepository>,
        issues: Arc<dyn IssueTracker>,
        pulls: Arc<dyn PullRequestManager>,
        pull_request_identity: OriginIdentity,
    ) -> Self {
        Self {
            code,
            issues,
            pulls,
            pull_request_identity,
        }
    }

    /// Performs one sync attempt and returns its single outcome.
    ///
    /// # Errors
    ///
    /// - [`ForkGuardError::Host`] when either repository is unreachable or the
    ///   upstream branch does not exist; nothing was modified.
    /// - [`ForkGuardError::ConcurrentModification`] when the tracking branch
    ///   moved between read and write; safe to retry.
    #[instrument(
        skip_all,
        fields(run_id = %run_id, upstream = %config.upstream_ref(), tracking = %config.tracking_ref(), force = config.force)
    )]
    pub async fn run(
        &self,
        run_id: RunId,
        config: &BranchSyncConfig,
    ) -> Result<SyncReport, ForkGuardError> {
        let upstream_head = self
            .code
            .branch_head(&config.upstream, &config.upstream_branch)
            .await?
            .ok_or_else(|| HostError::NotFound {
                resource: config.upstream_ref().to_string(),
            })?;
        let tracking_head = self
            .code
            .branch_head(&config.fork, &config.tracking_branch)
            .await?;

        let mut report = SyncReport {
            run_id,
            outcome: SyncOutcome::AlreadyCurrent,
            tracking_before: tracking_head.clone(),
            upstream_head: upstream_head.clone(),
            force_reset: false,
            pull_request: None,
            divergence_issue: None,
            pull_request_identity: self.pull_request_identity,
        };

        let Some(tracking_head) = tracking_head else {
            info!(sha = %upstream_head, "Tracking branch missing; creating it at upstream head");
            self.code
                .create_branch(&config.fork, &config.tracking_branch, &upstream_head)
                .await
                .map_err(|e| conflict_as_race(e, config))?;
            report.outcome = SyncOutcome::FastForwarded;
            report.pull_request = Some(self.propose(config, &upstream_head, false).await?);
            return Ok(report);
        };

        let comparison = if heads_match(&tracking_head, &upstream_head) {
            Comparison {
                relation: AncestryRelation::Identical,
                ahead_by: 0,
                behind_by: 0,
                stats: DiffStats::default(),
            }
        } else {
            self.code
                .compare(
                    &config.fork,
                    &Revision::Commit(tracking_head.clone()),
                    &Revision::Commit(upstream_head.clone()),
                )
                .await?
        };
        let relation = comparison.relation;

        let plan = plan_sync(relation, config.force);
        report.outcome = plan.outcome();
        match plan {
            SyncPlan::NoOp => {
                info!(sha = %upstream_head, "Tracking branch already current");
            }
            SyncPlan::ReportDivergence => {
                warn!(
                    tracking = %tracking_head,
                    upstream = %upstream_head,
                    ?relation,
                    "Tracking branch cannot be fast-forwarded"
                );
                report.divergence_issue = Some(
                    self.report_divergence(config, &tracking_head, &upstream_head, &comparison)
                        .await?,
                );
            }
            SyncPlan::Advance { force_reset } => {
                if relation != AncestryRelation::Identical {
                    self.code
                        .update_branch(&config.fork, &config.tracking_branch, &upstream_head, force_reset)
                        .await
                        .map_err(|e| conflict_as_race(e, config))?;
                    if force_reset {
                        warn!(from = %tracking_head, to = %upstream_head, "Tracking branch force-reset to upstream");
                    } else {
                        info!(from = %tracking_head, to = %upstream_head, "Tracking branch fast-forwarded");
                    }
                }
                report.force_reset = force_reset;
                report.pull_request = Some(self.propose(config, &upstream_head, force_reset).await?);
            }
        }

        Ok(report)
    }

    async fn report_divergence(
        &self,
        config: &BranchSyncConfig,
        tracking_head: &CommitSha,
        upstream_head: &CommitSha,
        comparison: &Comparison,
    ) -> Result<IssueAction, ForkGuardError> {
        let notice = notices::divergence_notice(
            &config.tracking_ref(),
            tracking_head,
            &config.upstream_ref(),
            upstream_head,
            comparison,
        );
        let followup = notices::divergence_followup(tracking_head, upstream_head);
        Ok(raise_notice(self.issues.as_ref(), &config.fork, &notice, Some(&followup)).await?)
    }

    /// Opens (or refreshes) the pull request from the tracking branch into the
    /// fork's default branch.
    async fn propose(
        &self,
        config: &BranchSyncConfig,
        upstream_head: &CommitSha,
        force_reset: bool,
    ) -> Result<PullRequestAction, ForkGuardError> {
        let stats = self
            .code
            .compare(
                &config.fork,
                &Revision::Branch(config.fork_default_branch.clone()),
                &Revision::Branch(config.tracking_branch.clone()),
            )
            .await?
            .stats;
        if stats.is_empty() {
            info!("Default branch already contains the tracking branch; no pull request needed");
            return Ok(PullRequestAction::NothingToMerge);
        }

        let draft = notices::sync_pull_request(
            &config.tracking_ref(),
            &config.default_ref(),
            &config.upstream_ref(),
            upstream_head,
            &stats,
            force_reset,
        );

        if let Some(number) = self
            .pulls
            .find_open_pull_request(&config.fork, &config.tracking_branch, &config.fork_default_branch)
            .await?
        {
            self.pulls
                .update_pull_request_body(&config.fork, number, &draft.body)
                .await?;
            info!(pull_request = %number, %stats, "Refreshed open sync pull request");
            return Ok(PullRequestAction::Refreshed(number));
        }

        let number = self
            .pulls
            .create_pull_request(
                &config.fork,
                &NewPullRequest {
                    head: config.tracking_branch.clone(),
                    base: config.fork_default_branch.clone(),
                    title: draft.title,
                    body: draft.body,
                },
            )
            .await?;
        self.pulls.add_labels(&config.fork, number, &draft.labels).await?;
        info!(pull_request = %number, %stats, identity = %self.pull_request_identity, "Opened sync pull request");
        if !self.pull_request_identity.triggers_automation() {
            warn!(
                pull_request = %number,
                "Pull request opened with the automation token; security scans will not start until a human interacts with it or the scan gate dispatches them"
            );
        }
        Ok(PullRequestAction::Opened(number))
    }
}

fn conflict_as_race(error: HostError, config: &BranchSyncConfig) -> ForkGuardError {
    match error {
        HostError::Conflict { .. } => ForkGuardError::ConcurrentModification {
            branch: config.tracking_ref(),
        },
        other => other.into(),
    }
}
