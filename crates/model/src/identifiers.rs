//! Newtype domain identifiers.
//!
//! Every concept that has an identity on the hosting platform is represented
//! as a distinct newtype wrapping a primitive. This keeps an [`IssueNumber`]
//! from being passed where a [`PullRequestNumber`] is expected even though
//! both are `u64` under the hood, and keeps a [`TagName`] apart from a
//! [`BranchName`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (GitHub-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// A GitHub issue number, unique within one repository.
    IssueNumber
}

u64_id! {
    /// A GitHub pull request number, unique within one repository.
    ///
    /// Pull requests share the issue number space, so comments on a pull
    /// request are addressed through the same number.
    PullRequestNumber
}

u64_id! {
    /// Identifies a single issue or pull request comment.
    CommentId
}

impl From<PullRequestNumber> for IssueNumber {
    fn from(number: PullRequestNumber) -> Self {
        Self(number.as_u64())
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single invocation of one routine.
///
/// Generated fresh for every run and recorded on its tracing span so all
/// activity from one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (Git names)
// ---------------------------------------------------------------------------

string_id! {
    /// A Git branch name (e.g. `"main"`, `"upstream-sync"`).
    BranchName
}

string_id! {
    /// A Git tag name as it appears under `refs/tags/` (e.g. `"v2.0.0"`).
    ///
    /// Construction only rejects the empty string; use
    /// [`crate::tags::validate_tag_name`] to apply the full ref-format rules.
    TagName
}

string_id! {
    /// A hosting-platform account login (e.g. `"octocat"`, `"github-actions[bot]"`).
    Login
}

string_id! {
    /// An issue or pull request label.
    Label
}

// ---------------------------------------------------------------------------
// Commit identifiers
// ---------------------------------------------------------------------------

/// A Git object identifier (lowercase hex).
///
/// Full SHA-1 and SHA-256 object names are accepted, as are abbreviated forms
/// of at least four digits, since the platform and humans both use them.
/// Input is normalised to lowercase so equality is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a [`CommitSha`], returning `None` unless `value` is 4–64 hex digits.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let valid = (4..=64).contains(&v.len()) && v.chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Some(Self(v.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first seven characters, for titles and log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }
}

impl std::fmt::Display for CommitSha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CommitSha {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.clone()).ok_or_else(|| format!("'{value}' is not a hex object id"))
    }
}

impl From<CommitSha> for String {
    fn from(sha: CommitSha) -> Self {
        sha.0
    }
}
