//! [`SecurityFindings`] and [`WorkflowDispatcher`].
//!
//! Findings come from the platform's dependency review and code scanning
//! services. A repository without either service enabled answers 404, which
//! is reported as "no findings" rather than failing the summary.

use async_trait::async_trait;
use model::{
    BranchName, CommitSha, Finding, HostError, PullRequestNumber, RepositoryRef,
    SecurityFindings, WorkflowDispatcher,
};
use reqwest::Method;
use tracing::{info, warn};

use crate::client::{repo_path, GithubClient};
use crate::models::{CodeScanningAlert, DependencyChange, WorkflowDispatch};

fn absent_service<T>(result: Result<Vec<T>, HostError>, service: &str) -> Result<Vec<T>, HostError> {
    match result {
        Err(HostError::NotFound { resource }) => {
            warn!(%service, %resource, "Security service not available; treating as no findings");
            Ok(Vec::new())
        }
        other => other,
    }
}

#[async_trait]
impl SecurityFindings for GithubClient {
    async fn dependency_findings(
        &self,
        repo: &RepositoryRef,
        base: &CommitSha,
        head: &CommitSha,
    ) -> Result<Vec<Finding>, HostError> {
        let url = self.endpoint(
            &repo_path(repo, &format!("dependency-graph/compare/{base}...{head}")),
            &[],
        )?;
        let changes: Vec<DependencyChange> =
            absent_service(self.get(url).await, "dependency review")?;
        Ok(changes
            .into_iter()
            .flat_map(DependencyChange::into_findings)
            .collect())
    }

    async fn code_scanning_findings(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
    ) -> Result<Vec<Finding>, HostError> {
        let git_ref = format!("refs/pull/{number}/head");
        let url = self.endpoint(
            &repo_path(repo, "code-scanning/alerts"),
            &[("ref", git_ref.as_str()), ("state", "open")],
        )?;
        let alerts: Vec<CodeScanningAlert> =
            absent_service(self.get_all(url).await, "code scanning")?;
        Ok(alerts.into_iter().map(CodeScanningAlert::into_finding).collect())
    }
}

#[async_trait]
impl WorkflowDispatcher for GithubClient {
    async fn dispatch_workflow(
        &self,
        repo: &RepositoryRef,
        workflow: &str,
        git_ref: &BranchName,
        inputs: &[(String, String)],
    ) -> Result<(), HostError> {
        let url = self.endpoint(
            &repo_path(repo, &format!("actions/workflows/{workflow}/dispatches")),
            &[],
        )?;
        let body = WorkflowDispatch {
            git_ref: git_ref.as_str(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        };
        self.send_empty(Method::POST, url, Some(&body)).await?;
        info!(%repo, %workflow, %git_ref, "Dispatched workflow");
        Ok(())
    }
}
