//! [`IssueTracker`] over the issues and issue-comments endpoints.

use async_trait::async_trait;
use model::{
    CommentId, CommentRecord, HostError, IssueNumber, IssueRecord, IssueTracker, Label,
    RepositoryRef,
};
use reqwest::Method;

use crate::client::{repo_path, GithubClient};
use crate::models::{Comment, CreateIssue, Created, CreatedComment, Issue, TextBody};

#[async_trait]
impl IssueTracker for GithubClient {
    async fn find_open_issue(
        &self,
        repo: &RepositoryRef,
        label: &Label,
        title: &str,
    ) -> Result<Option<IssueRecord>, HostError> {
        let url = self.endpoint(
            &repo_path(repo, "issues"),
            &[("state", "open"), ("labels", label.as_str())],
        )?;
        let issues: Vec<Issue> = self.get_all(url).await?;
        Ok(issues
            .into_iter()
            .find(|i| !i.is_pull_request() && i.title == title)
            .map(Issue::into_record))
    }

    async fn create_issue(
        &self,
        repo: &RepositoryRef,
        title: &str,
        body: &str,
        labels: &[Label],
    ) -> Result<IssueNumber, HostError> {
        let url = self.endpoint(&repo_path(repo, "issues"), &[])?;
        let request = CreateIssue {
            title,
            body,
            labels: labels.iter().map(Label::as_str).collect(),
        };
        let created: Created = self.send_json(Method::POST, url, &request).await?;
        Ok(IssueNumber::new(created.number))
    }

    async fn create_comment(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentId, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("issues/{number}/comments")), &[])?;
        let created: CreatedComment = self
            .send_json(Method::POST, url, &TextBody { body })
            .await?;
        Ok(CommentId::new(created.id))
    }

    async fn list_comments(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<Vec<CommentRecord>, HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("issues/{number}/comments")), &[])?;
        let comments: Vec<Comment> = self.get_all(url).await?;
        comments.into_iter().map(Comment::into_record).collect()
    }

    async fn update_comment(
        &self,
        repo: &RepositoryRef,
        id: CommentId,
        body: &str,
    ) -> Result<(), HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("issues/comments/{id}")), &[])?;
        self.send_empty(Method::PATCH, url, Some(&TextBody { body }))
            .await
    }

    async fn delete_comment(&self, repo: &RepositoryRef, id: CommentId) -> Result<(), HostError> {
        let url = self.endpoint(&repo_path(repo, &format!("issues/comments/{id}")), &[])?;
        self.send_empty(Method::DELETE, url, None::<&()>).await
    }
}
