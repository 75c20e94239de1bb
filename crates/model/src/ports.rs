//! Port traits: what the routines need from the hosting platform.
//!
//! Infrastructure crates implement these; the routines only ever see the
//! traits. Every method is a single platform operation and returns
//! [`HostError`] on failure, never a transport-specific type.

use async_trait::async_trait;

use crate::{
    Actor, BranchName, CommentId, CommitSha, Comparison, Finding, ForkGuardError, HostError,
    IssueNumber, Label, PullRequestNumber, RawTag, RepositoryRef, Revision, TagSnapshot, TagTarget,
};

// ---------------------------------------------------------------------------
// Records returned by ports
// ---------------------------------------------------------------------------

/// An open issue found by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub number: IssueNumber,
    pub title: String,
}

/// A comment on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: CommentId,
    pub author: Actor,
    pub body: String,
}

/// The parts of a pull request the routines care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: PullRequestNumber,
    pub author: Actor,
    pub head_branch: BranchName,
    pub head_sha: CommitSha,
    pub base_branch: BranchName,
    pub base_sha: CommitSha,
    pub labels: Vec<Label>,
}

/// Request to open a pull request within one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub head: BranchName,
    pub base: BranchName,
    pub title: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Branches, commits, and tags of a repository.
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Returns the head commit of `branch`, or `None` if the branch does not exist.
    async fn branch_head(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Option<CommitSha>, HostError>;

    /// Compares `base...head` within `repo`.
    async fn compare(
        &self,
        repo: &RepositoryRef,
        base: &Revision,
        head: &Revision,
    ) -> Result<Comparison, HostError>;

    /// Creates `branch` at `sha`.
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &CommitSha,
    ) -> Result<(), HostError>;

    /// Moves `branch` to `sha`.
    ///
    /// Without `force` the platform must reject anything but a fast-forward
    /// with [`HostError::Conflict`].
    async fn update_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &CommitSha,
        force: bool,
    ) -> Result<(), HostError>;

    /// Lists every tag ref, undereferenced.
    async fn list_tags(&self, repo: &RepositoryRef) -> Result<Vec<RawTag>, HostError>;

    /// Reads one annotated tag object and returns what it points at.
    ///
    /// The result is itself a [`TagTarget`]: a commit, another tag
    /// object, or some other object kind.
    async fn read_tag_object(
        &self,
        repo: &RepositoryRef,
        object: &CommitSha,
    ) -> Result<TagTarget, HostError>;
}

/// Issues and comments.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Finds an open issue (not pull request) with `label` and exactly `title`.
    async fn find_open_issue(
        &self,
        repo: &RepositoryRef,
        label: &Label,
        title: &str,
    ) -> Result<Option<IssueRecord>, HostError>;

    async fn create_issue(
        &self,
        repo: &RepositoryRef,
        title: &str,
        body: &str,
        labels: &[Label],
    ) -> Result<IssueNumber, HostError>;

    /// Adds a comment to an issue or pull request.
    async fn create_comment(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentId, HostError>;

    async fn list_comments(
        &self,
        repo: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<Vec<CommentRecord>, HostError>;

    async fn update_comment(
        &self,
        repo: &RepositoryRef,
        id: CommentId,
        body: &str,
    ) -> Result<(), HostError>;

    async fn delete_comment(&self, repo: &RepositoryRef, id: CommentId) -> Result<(), HostError>;
}

/// Pull requests.
///
/// The implementation used to *create* pull requests determines their
/// [`crate::OriginIdentity`], and with it whether downstream automation
/// starts on its own.
#[async_trait]
pub trait PullRequestManager: Send + Sync {
    /// Finds an open pull request from `head` into `base` within `repo`.
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryRef,
        head: &BranchName,
        base: &BranchName,
    ) -> Result<Option<PullRequestNumber>, HostError>;

    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PullRequestNumber, HostError>;

    async fn update_pull_request_body(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
        body: &str,
    ) -> Result<(), HostError>;

    async fn add_labels(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
        labels: &[Label],
    ) -> Result<(), HostError>;

    async fn pull_request(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
    ) -> Result<PullRequestRecord, HostError>;
}

/// Results of the external security services.
#[async_trait]
pub trait SecurityFindings: Send + Sync {
    /// Vulnerabilities in dependencies added between `base` and `head`.
    async fn dependency_findings(
        &self,
        repo: &RepositoryRef,
        base: &CommitSha,
        head: &CommitSha,
    ) -> Result<Vec<Finding>, HostError>;

    /// Open static-analysis alerts on a pull request.
    async fn code_scanning_findings(
        &self,
        repo: &RepositoryRef,
        number: PullRequestNumber,
    ) -> Result<Vec<Finding>, HostError>;
}

/// Starts automation explicitly.
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    /// Dispatches `workflow` (file name or id) on `git_ref` with string inputs.
    async fn dispatch_workflow(
        &self,
        repo: &RepositoryRef,
        workflow: &str,
        git_ref: &BranchName,
        inputs: &[(String, String)],
    ) -> Result<(), HostError>;
}

/// Durable record of the last tag snapshot, for runs that do not use the
/// fork's own tags as the baseline.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Loads the previous snapshot, or `None` on the first run.
    async fn load(&self) -> Result<Option<TagSnapshot>, ForkGuardError>;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &TagSnapshot) -> Result<(), ForkGuardError>;
}
