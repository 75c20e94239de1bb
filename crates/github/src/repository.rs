//! [`CodeRepository`] over the Git data and compare endpoints.

use async_trait::async_trait;
use model::{
    BranchName, CodeRepository, CommitSha, Comparison, HostError, RawTag, RepositoryRef, Revision,
    TagTarget,
};
use reqwest::Method;
use tracing::{debug, instrument};

use crate::client::{repo_path, GithubClient};
use crate::models::{raw_tags, CompareResponse, CreateRef, GitRef, TagObject, UpdateRef};

#[async_trait]
impl CodeRepository for GithubClient {
    #[instrument(skip_all, fields(repo = %repo, branch = %branch))]
    async fn branch_head(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Option<CommitSha>, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("git/ref/heads/{branch}")), &[])?;
        match self.get_optional::<GitRef>(url).await? {
            Some(r) => r.object.object_id().map(Some),
            None => {
                debug!("Branch does not exist");
                Ok(None)
            }
        }
    }

    async fn compare(
        &self,
        repo: &RepositoryRef,
        base: &Revision,
        head: &Revision,
    ) -> Result<Comparison, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("compare/{base}...{head}")), &[])?;
        let response: CompareResponse = self.get(url).await?;
        response.into_comparison()
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &CommitSha,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&repo_path(repo, "git/refs"), &[])?;
        let body = CreateRef {
            name: format!("refs/heads/{branch}"),
            sha: sha.as_str(),
        };
        self.send_empty(Method::POST, url, Some(&body)).await
    }

    async fn update_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &CommitSha,
        force: bool,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("git/refs/heads/{branch}")), &[])?;
        let body = UpdateRef {
            sha: sha.as_str(),
            force,
        };
        self.send_empty(Method::PATCH, url, Some(&body)).await
    }

    #[instrument(skip_all, fields(repo = %repo))]
    async fn list_tags(&self, repo: &RepositoryRef) -> Result<Vec<RawTag>, HostError> {
        let url = self.endpoint(&repo_path(repo, "git/matching-refs/tags/"), &[])?;
        let refs: Vec<GitRef> = self.get_all(url).await?;
        debug!(count = refs.len(), "Listed tag refs");
        Ok(raw_tags(refs))
    }

    async fn read_tag_object(
        &self,
        repo: &RepositoryRef,
        object: &CommitSha,
    ) -> Result<TagTarget, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("git/tags/{object}")), &[])?;
        let tag: TagObject = self.get(url).await?;
        tag.object.into_tag_target()
    }
}
