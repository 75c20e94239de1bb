//! [`PullRequestManager`] over the pulls endpoints.

use async_trait::async_trait;
use model::{
    BranchName, HostError, Label, NewPullRequest, PullRequestManager, PullRequestNumber,
    PullRequestRecord, RepositoryRef,
};
use reqwest::Method;
use tracing::info;

use crate::client::{repo_path, GithubClient};
use crate::models::{AddLabels, CreatePullRequest, Created, PullRequest, TextBody};

#[async_trait]
impl PullRequestManager for GithubClient {
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryRef,
        head: &BranchName,
        base: &BranchName,
    ) -> Result<Option<PullRequestNumber>, HostError> {
        // `head` must be qualified with the owner of the head repository.
        let qualified = format!("{}:{head}", repo.owner());
        let url = self.endpoint(
            &repo_path(repo, "pulls"),
            &[
                ("state", "open"),
                ("head", qualified.as_str()),
                ("base", base.as_str()),
            ],
        )?;
        let open: Vec<PullRequest> = self.get_all(url).await?;
        Ok(open.first().map(|pr| PullRequestNumber::new(pr.number)))
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PullRequestNumber, HostError> {
        let url = self.endpoint(&repo_path(repo, "pulls"), &[])?;
        let body = CreatePullRequest {
            title: &request.title,
            body: &request.body,
            head: request.head.as_str(),
            base: request.base.as_str(),
            maintainer_can_modify: true,
        };
        let created: Created = self.send_json(Method::POST, url, &body).await?;
        info!(%repo, number = created.number, identity = %self.identity(), "Created pull request");
        Ok(PullRequestNumber::new(created.number))
    }

    async fn update_pull_request_body(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
        body: &str,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("pulls/{number}")), &[])?;
        self.send_empty(Method::PATCH, url, Some(&TextBody { body }))
            .await
    }

    async fn add_labels(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
        labels: &[Label],
    ) -> Result<(), HostError> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&repo_path(repo, &format!("issues/{number}/labels")), &[])?;
        let body = AddLabels {
            labels: labels.iter().map(Label::as_str).collect(),
        };
        self.send_empty(Method::POST, url, Some(&body)).await
    }

    async fn pull_request(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
    ) -> Result<PullRequestRecord, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("pulls/{number}")), &[])?;
        let pr: PullRequest = self.get(url).await?;
        pr.into_record()
    }
}
