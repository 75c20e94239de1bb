//! Shared value types for the ForkGuard domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (a repository reference always has both halves, a
//! diff summary never has negative counts) and participate in domain
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BranchName, CommitSha, Login};

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Identifies a remote repository by `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    owner: String,
    name: String,
}

impl RepositoryRef {
    /// Creates a repository reference.
    ///
    /// Returns `None` if either half is empty or contains a `/`.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let owner = owner.into();
        let name = name.into();
        let valid = |s: &str| !s.is_empty() && !s.contains('/') && !s.chars().any(char::is_whitespace);
        if valid(&owner) && valid(&name) {
            Some(Self { owner, name })
        } else {
            None
        }
    }

    /// Parses `"owner/name"`.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A branch on a specific repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchRef {
    pub repository: RepositoryRef,
    pub branch: BranchName,
}

impl std::fmt::Display for BranchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.branch)
    }
}

/// A revision argument for compare operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Commit(CommitSha),
    Branch(BranchName),
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit(sha) => write!(f, "{sha}"),
            Self::Branch(branch) => write!(f, "{branch}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Diff statistics
// ---------------------------------------------------------------------------

/// Size of a change set between two revisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Commits reachable from the head but not the base.
    pub commits: u64,
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
    /// The platform cut the file list short; file and line counts are lower
    /// bounds.
    #[serde(default)]
    pub files_truncated: bool,
}

impl DiffStats {
    /// Returns `true` when the head adds nothing over the base.
    pub fn is_empty(&self) -> bool {
        self.commits == 0
    }
}

impl std::fmt::Display for DiffStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} commits, {} files changed, +{} -{}",
            self.commits, self.files_changed, self.additions, self.deletions
        )
    }
}

// ---------------------------------------------------------------------------
// Origin identity
// ---------------------------------------------------------------------------

/// Kind of account on the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    User,
    Bot,
    Organization,
}

/// The account that authored a pull request, issue, or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: Login,
    pub kind: AccountKind,
}

/// Default login the platform assigns to the ambient automation token.
pub const AMBIENT_TOKEN_LOGIN: &str = "github-actions[bot]";

/// The identity under which a pull request was created.
///
/// The hosting platform does not start further automation for events caused
/// by its ambient automation token. Events caused by an installed application
/// or by a human do start it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginIdentity {
    AutomationToken,
    InstalledApplication,
    Human,
}

impl OriginIdentity {
    /// Classifies the author of a pull request.
    ///
    /// `ambient_login` is the login the ambient automation token acts as.
    pub fn of_author(author: &Actor, ambient_login: &Login) -> Self {
        if &author.login == ambient_login {
            return Self::AutomationToken;
        }
        match author.kind {
            AccountKind::Bot => Self::InstalledApplication,
            AccountKind::User | AccountKind::Organization => Self::Human,
        }
    }

    /// Returns `true` if events from this identity start downstream automation.
    pub fn triggers_automation(self) -> bool {
        !matches!(self, Self::AutomationToken)
    }
}

impl std::fmt::Display for OriginIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutomationToken => write!(f, "automation-token"),
            Self::InstalledApplication => write!(f, "installed-application"),
            Self::Human => write!(f, "human"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
