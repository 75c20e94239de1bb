//! GitHub REST wire types and their conversion into domain records.
//!
//! Only the fields ForkGuard reads are declared; serde ignores the rest.

use model::{
    AccountKind, Actor, AncestryRelation, BranchName, CommentId, CommentRecord, CommitSha,
    Comparison, DiffStats, Finding, FindingSource, HostError, IssueNumber, IssueRecord, Label,
    Login, PullRequestNumber, PullRequestRecord, RawTag, Severity, TagTarget,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn malformed(message: impl Into<String>) -> HostError {
    HostError::Malformed {
        message: message.into(),
    }
}

fn sha(value: &str) -> Result<CommitSha, HostError> {
    CommitSha::new(value).ok_or_else(|| malformed(format!("'{value}' is not an object id")))
}

// ---------------------------------------------------------------------------
// Git data
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl GitObject {
    pub fn object_id(&self) -> Result<CommitSha, HostError> {
        sha(&self.sha)
    }

    /// Interprets the object a tag ref or tag object points at.
    pub fn into_tag_target(self) -> Result<TagTarget, HostError> {
        let object = sha(&self.sha)?;
        Ok(match self.kind.as_str() {
            "commit" => TagTarget::Commit(object),
            "tag" => TagTarget::Annotated(object),
            _ => TagTarget::Other(object),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitObject,
}

impl GitRef {
    pub fn into_raw_tag(self) -> Result<RawTag, HostError> {
        let name = self
            .name
            .strip_prefix("refs/tags/")
            .ok_or_else(|| malformed(format!("'{}' is not a tag ref", self.name)))?
            .to_string();
        Ok(RawTag {
            name,
            target: self.object.into_tag_target()?,
        })
    }
}

/// Converts a tag ref listing, dropping refs that do not convert.
pub(crate) fn raw_tags(refs: Vec<GitRef>) -> Vec<RawTag> {
    refs.into_iter()
        .filter_map(|r| {
            let name = r.name.clone();
            match r.into_raw_tag() {
                Ok(tag) => Some(tag),
                Err(e) => {
                    warn!(tag_ref = %name, error = %e, "Skipping unreadable tag ref");
                    None
                }
            }
        })
        .collect()
}

/// An annotated tag object.
#[derive(Debug, Deserialize)]
pub(crate) struct TagObject {
    pub object: GitObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRef<'a> {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRef<'a> {
    pub sha: &'a str,
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileChange {
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

/// Most files the compare endpoint lists for one comparison.
const COMPARE_FILE_LIMIT: usize = 300;

/// Response of `compare/{base}...{head}`.
#[derive(Debug, Deserialize)]
pub(crate) struct CompareResponse {
    pub status: String,
    pub ahead_by: u64,
    pub behind_by: u64,
    pub total_commits: u64,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

impl CompareResponse {
    pub fn into_comparison(self) -> Result<Comparison, HostError> {
        let relation = match self.status.as_str() {
            "identical" => AncestryRelation::Identical,
            "ahead" => AncestryRelation::Ahead,
            "behind" => AncestryRelation::Behind,
            "diverged" => AncestryRelation::Diverged,
            other => return Err(malformed(format!("unknown compare status '{other}'"))),
        };
        let stats = DiffStats {
            commits: self.total_commits,
            files_changed: self.files.len() as u64,
            additions: self.files.iter().map(|f| f.additions).sum(),
            deletions: self.files.iter().map(|f| f.deletions).sum(),
            files_truncated: self.files.len() >= COMPARE_FILE_LIMIT,
        };
        Ok(Comparison {
            relation,
            ahead_by: self.ahead_by,
            behind_by: self.behind_by,
            stats,
        })
    }
}

// ---------------------------------------------------------------------------
// Issues, comments, pull requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl User {
    pub fn into_actor(self) -> Result<Actor, HostError> {
        let kind = match self.kind.as_str() {
            "Bot" => AccountKind::Bot,
            "Organization" => AccountKind::Organization,
            _ => AccountKind::User,
        };
        Ok(Actor {
            login: Login::new(self.login).ok_or_else(|| malformed("empty login"))?,
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Issue {
    pub number: u64,
    pub title: String,
    /// Present when the "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn into_record(self) -> IssueRecord {
        IssueRecord {
            number: IssueNumber::new(self.number),
            title: self.title,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIssue<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub labels: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Comment {
    pub id: u64,
    pub user: User,
    #[serde(default)]
    pub body: Option<String>,
}

impl Comment {
    pub fn into_record(self) -> Result<CommentRecord, HostError> {
        Ok(CommentRecord {
            id: CommentId::new(self.id),
            author: self.user.into_actor()?,
            body: self.body.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TextBody<'a> {
    pub body: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedComment {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelObject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    pub user: User,
    pub head: PullRequestBranch,
    pub base: PullRequestBranch,
    #[serde(default)]
    pub labels: Vec<LabelObject>,
}

impl PullRequest {
    pub fn into_record(self) -> Result<PullRequestRecord, HostError> {
        let branch = |name: String| {
            BranchName::new(name).ok_or_else(|| malformed("pull request has an empty branch name"))
        };
        Ok(PullRequestRecord {
            number: PullRequestNumber::new(self.number),
            author: self.user.into_actor()?,
            head_sha: sha(&self.head.sha)?,
            head_branch: branch(self.head.branch)?,
            base_sha: sha(&self.base.sha)?,
            base_branch: branch(self.base.branch)?,
            labels: self.labels.into_iter().filter_map(|l| Label::new(l.name)).collect(),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddLabels<'a> {
    pub labels: Vec<&'a str>,
}

// ---------------------------------------------------------------------------
// Security services
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct Vulnerability {
    pub severity: String,
    pub advisory_ghsa_id: String,
    pub advisory_summary: String,
    #[serde(default)]
    pub advisory_url: Option<String>,
}

/// One entry of `dependency-graph/compare/{base}...{head}`.
#[derive(Debug, Deserialize)]
pub(crate) struct DependencyChange {
    pub change_type: String,
    pub manifest: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl DependencyChange {
    /// Findings introduced by this change. Removed dependencies introduce none.
    pub fn into_findings(self) -> Vec<Finding> {
        if self.change_type != "added" {
            return Vec::new();
        }
        let package = match &self.version {
            Some(v) => format!("{}@{v}", self.name),
            None => self.name.clone(),
        };
        self.vulnerabilities
            .into_iter()
            .map(|v| Finding {
                source: FindingSource::DependencyReview,
                severity: Severity::parse(&v.severity).unwrap_or(Severity::Medium),
                identifier: v.advisory_ghsa_id,
                title: format!("{package}: {}", v.advisory_summary),
                location: Some(self.manifest.clone()),
                url: v.advisory_url,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Rule {
    pub id: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub security_severity_level: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlertLocation {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub start_line: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlertInstance {
    #[serde(default)]
    pub location: Option<AlertLocation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CodeScanningAlert {
    pub html_url: String,
    pub rule: Rule,
    #[serde(default)]
    pub most_recent_instance: Option<AlertInstance>,
}

impl CodeScanningAlert {
    pub fn into_finding(self) -> Finding {
        // The security level is set for security queries; plain rule severity otherwise.
        let severity = self
            .rule
            .security_severity_level
            .as_deref()
            .or(self.rule.severity.as_deref())
            .and_then(Severity::parse)
            .unwrap_or(Severity::Note);
        let location = self
            .most_recent_instance
            .and_then(|i| i.location)
            .and_then(|l| match (l.path, l.start_line) {
                (Some(path), Some(line)) => Some(format!("{path}:{line}")),
                (path, _) => path,
            });
        Finding {
            source: FindingSource::CodeScanning,
            severity,
            identifier: self.rule.id,
            title: self.rule.description,
            location,
            url: Some(self.html_url),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkflowDispatch<'a> {
    #[serde(rename = "ref")]
    pub git_ref: &'a str,
    pub inputs: serde_json::Map<String, serde_json::Value>,
}
