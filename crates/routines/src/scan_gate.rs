//! Scan trigger gate.
//!
//! Makes sure the security scan runs on a sync pull request and keeps exactly
//! one risk-summary comment on it.
//!
//! Whether the scan starts by itself depends on who opened the pull request:
//! the platform does not start automation for events caused by its ambient
//! automation token. For those pull requests the gate dispatches the scan
//! workflow explicitly, which the platform does allow. Without a configured
//! workflow the scan waits for the next human interaction.

use std::sync::Arc;

use model::{
    assess_risk, notices, CommentId, ForkGuardError, IssueNumber, IssueTracker, Login,
    OriginIdentity, PullRequestManager, PullRequestNumber, RepositoryRef, RiskAssessment, RunId,
    SecurityFindings, Severity, WorkflowDispatcher,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Gate settings for one repository.
#[derive(Debug, Clone)]
pub struct ScanGateConfig {
    /// Repository the pull requests live in (the fork).
    pub repo: RepositoryRef,
    /// Login the ambient automation token acts as.
    pub ambient_login: Login,
    /// Scan workflow to dispatch for pull requests that will not trigger it
    /// themselves.
    pub workflow: Option<String>,
    /// Dependency findings at or above this severity block the merge.
    pub blocking_severity: Severity,
}

/// How the scan came to run (or not) for a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "trigger")]
pub enum ScanTrigger {
    /// The pull request's origin starts automation by itself.
    Automatic { origin: OriginIdentity },
    /// The scan workflow was dispatched explicitly.
    Dispatched { workflow: String },
    /// Nothing will start the scan until a human labels or pushes.
    AwaitingHumanInteraction,
}

/// What happened to the summary comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum CommentAction {
    Created { id: CommentId },
    /// The existing summary was replaced; `removed` extra summaries were deleted.
    Updated { id: CommentId, removed: usize },
    /// The existing summary already had this content.
    Unchanged { id: CommentId, removed: usize },
}

/// Result of one summarize run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummaryReport {
    pub run_id: RunId,
    pub pull_request: PullRequestNumber,
    pub origin: OriginIdentity,
    pub assessment: RiskAssessment,
    pub comment: CommentAction,
}

/// Runs the scan trigger protocol against the hosting platform.
pub struct ScanTriggerGate {
    pulls: Arc<dyn PullRequestManager>,
    issues: Arc<dyn IssueTracker>,
    findings: Arc<dyn SecurityFindings>,
    dispatcher: Arc<dyn WorkflowDispatcher>,
}

impl ScanTriggerGate {
    pub fn new(
        pulls: Arc<dyn PullRequestManager>,
        issues: Arc<dyn IssueTracker>,
        findings: Arc<dyn SecurityFindings>,
        dispatcher: Arc<dyn WorkflowDispatcher>,
    ) -> Self {
        Self {
            pulls,
            issues,
            findings,
            dispatcher,
        }
    }

    /// Ensures the scan will run for `number`.
    #[instrument(skip_all, fields(run_id = %run_id, repo = %config.repo, pull_request = %number))]
    pub async fn trigger(
        &self,
        run_id: RunId,
        config: &ScanGateConfig,
        number: PullRequestNumber,
    ) -> Result<ScanTrigger, ForkGuardError> {
        let pr = self.pulls.pull_request(&config.repo, number).await?;
        let origin = OriginIdentity::of_author(&pr.author, &config.ambient_login);

        if origin.triggers_automation() {
            info!(%origin, author = %pr.author.login, "Scan starts automatically for this origin");
            return Ok(ScanTrigger::Automatic { origin });
        }

        match &config.workflow {
            Some(workflow) => {
                let inputs = vec![("pull_request".to_string(), number.to_string())];
                self.dispatcher
                    .dispatch_workflow(&config.repo, workflow, &pr.head_branch, &inputs)
                    .await?;
                info!(%workflow, head = %pr.head_branch, "Dispatched scan workflow");
                Ok(ScanTrigger::Dispatched {
                    workflow: workflow.clone(),
                })
            }
            None => {
                warn!(
                    "Pull request was opened with the automation token and no scan workflow is configured; \
                     the scan runs on the next human interaction"
                );
                Ok(ScanTrigger::AwaitingHumanInteraction)
            }
        }
    }

    /// Collects scanner findings for `number` and upserts the single summary
    /// comment.
    #[instrument(skip_all, fields(run_id = %run_id, repo = %config.repo, pull_request = %number))]
    pub async fn summarize(
        &self,
        run_id: RunId,
        config: &ScanGateConfig,
        number: PullRequestNumber,
    ) -> Result<ScanSummaryReport, ForkGuardError> {
        let pr = self.pulls.pull_request(&config.repo, number).await?;
        let origin = OriginIdentity::of_author(&pr.author, &config.ambient_login);

        let mut findings = self
            .findings
            .dependency_findings(&config.repo, &pr.base_sha, &pr.head_sha)
            .await?;
        findings.extend(
            self.findings
                .code_scanning_findings(&config.repo, number)
                .await?,
        );

        let assessment = assess_risk(findings, config.blocking_severity);
        info!(
            level = %assessment.level,
            blocking = assessment.blocking,
            findings = assessment.findings.len(),
            "Assessed pull request risk"
        );

        let body = notices::scan_summary_comment(&assessment, &pr.head_sha, origin);
        let comment = self.upsert_summary(&config.repo, number.into(), &body).await?;

        Ok(ScanSummaryReport {
            run_id,
            pull_request: number,
            origin,
            assessment,
            comment,
        })
    }

    /// Leaves exactly one marked summary comment with `body` on the issue.
    async fn upsert_summary(
        &self,
        repo: &RepositoryRef,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentAction, ForkGuardError> {
        let existing: Vec<_> = self
            .issues
            .list_comments(repo, issue)
            .await?
            .into_iter()
            .filter(|c| c.body.starts_with(notices::SCAN_SUMMARY_MARKER))
            .collect();

        let Some((keep, extra)) = existing.split_first() else {
            let id = self.issues.create_comment(repo, issue, body).await?;
            info!(comment = %id, "Posted scan summary");
            return Ok(CommentAction::Created { id });
        };

        for duplicate in extra {
            self.issues.delete_comment(repo, duplicate.id).await?;
            debug!(comment = %duplicate.id, "Deleted duplicate scan summary");
        }

        if keep.body == body {
            debug!(comment = %keep.id, "Scan summary unchanged");
            return Ok(CommentAction::Unchanged {
                id: keep.id,
                removed: extra.len(),
            });
        }

        self.issues.update_comment(repo, keep.id, body).await?;
        info!(comment = %keep.id, removed = extra.len(), "Replaced scan summary");
        Ok(CommentAction::Updated {
            id: keep.id,
            removed: extra.len(),
        })
    }
}
