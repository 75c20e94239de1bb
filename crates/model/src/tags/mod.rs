//! Tag snapshots and tag-integrity classification.
//!
//! Tags are compared by the commit they ultimately name, never by the identity
//! of the tag object itself. Converting a lightweight tag into an annotated
//! one (or back) changes the tag object but not the commit, and must not be
//! reported as a mutation.
//!
//! [`classify_tags`] is a pure function over two immutable snapshots. Its
//! result is a partition: every name in either snapshot lands in exactly one of
//! added, mutated, deleted, or unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CommitSha, TagName, Timestamp};

/// Maximum number of tag objects followed when peeling an annotated tag.
///
/// Tags of tags are legal but rare; anything deeper than this is treated as
/// malformed rather than followed indefinitely.
pub const MAX_PEEL_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Raw tags as listed by the platform
// ---------------------------------------------------------------------------

/// What a tag ref points at before dereferencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "sha")]
pub enum TagTarget {
    /// A lightweight tag: the ref names the commit directly.
    Commit(CommitSha),
    /// An annotated tag: the ref names a tag object that must be peeled.
    Annotated(CommitSha),
    /// A tag naming a tree or blob. Never comparable as a release.
    Other(CommitSha),
}

/// A tag exactly as listed, name not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub name: String,
    pub target: TagTarget,
}

/// Why a listed tag was left out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    MalformedName(String),
    /// The tag ultimately names a tree or blob.
    NotACommit,
    /// Peeling followed more than [`MAX_PEEL_DEPTH`] tag objects.
    PeelDepthExceeded,
    /// A tag object could not be read or parsed.
    UnreadableObject(String),
    /// The same name was listed twice; the first entry was kept.
    Duplicate,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedName(why) => write!(f, "malformed name ({why})"),
            Self::NotACommit => write!(f, "does not name a commit"),
            Self::PeelDepthExceeded => {
                write!(f, "more than {MAX_PEEL_DEPTH} nested tag objects")
            }
            Self::UnreadableObject(why) => write!(f, "unreadable tag object ({why})"),
            Self::Duplicate => write!(f, "duplicate name"),
        }
    }
}

/// A tag that was left out of a snapshot, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTag {
    pub name: String,
    pub reason: SkipReason,
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Validates a tag name against Git's ref-format rules.
///
/// Returns the validated [`TagName`] or a short description of the first rule
/// the name breaks.
pub fn validate_tag_name(name: &str) -> Result<TagName, String> {
    if name.is_empty() {
        return Err("empty".into());
    }
    if name == "@" {
        return Err("'@' alone".into());
    }
    if name.starts_with('-') {
        return Err("leading '-'".into());
    }
    if name.ends_with('/') || name.ends_with('.') {
        return Err("trailing '/' or '.'".into());
    }
    if name.contains("..") {
        return Err("contains '..'".into());
    }
    if name.contains("@{") {
        return Err("contains '@{'".into());
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Err(format!("forbidden character {c:?}"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err("empty path component".into());
        }
        if component.starts_with('.') {
            return Err("path component starts with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component ends with '.lock'".into());
        }
    }
    TagName::new(name).ok_or_else(|| "empty".into())
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Name-keyed map of tags to the commits they dereference to, captured at one
/// point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSnapshot {
    pub captured_at: Timestamp,
    tags: BTreeMap<TagName, CommitSha>,
}

impl TagSnapshot {
    /// Creates an empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self {
            captured_at: Timestamp::now(),
            tags: BTreeMap::new(),
        }
    }

    /// Builds a snapshot from already-dereferenced `(name, commit)` pairs.
    ///
    /// Malformed and duplicate names are skipped with a warning and returned
    /// alongside the snapshot; they never abort the build.
    pub fn from_dereferenced<I>(entries: I) -> (Self, Vec<SkippedTag>)
    where
        I: IntoIterator<Item = (String, CommitSha)>,
    {
        let mut snapshot = Self::empty();
        let mut skipped = Vec::new();
        for (name, commit) in entries {
            if let Err(reason) = snapshot.insert(&name, commit) {
                warn!(tag = %name, %reason, "Skipping tag");
                skipped.push(SkippedTag { name, reason });
            }
        }
        (snapshot, skipped)
    }

    /// Adds one dereferenced tag. The first entry for a name wins.
    pub fn insert(&mut self, name: &str, commit: CommitSha) -> Result<(), SkipReason> {
        let name = validate_tag_name(name).map_err(SkipReason::MalformedName)?;
        if self.tags.contains_key(&name) {
            return Err(SkipReason::Duplicate);
        }
        self.tags.insert(name, commit);
        Ok(())
    }

    pub fn get(&self, name: &TagName) -> Option<&CommitSha> {
        self.tags.get(name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates tags in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagName, &CommitSha)> {
        self.tags.iter()
    }

    /// Copies `baseline`'s commit for each of `skipped` this snapshot lacks.
    ///
    /// A tag that exists but could not be read keeps its recorded commit, so
    /// it is neither reported deleted nor forgotten by the next baseline.
    /// Returns the names carried over.
    pub fn carry_forward(
        &mut self,
        baseline: &TagSnapshot,
        skipped: &[SkippedTag],
    ) -> Vec<TagName> {
        let mut carried = Vec::new();
        for tag in skipped {
            let Some(name) = TagName::new(tag.name.as_str()) else {
                continue;
            };
            if self.tags.contains_key(&name) {
                continue;
            }
            if let Some(commit) = baseline.get(&name) {
                self.tags.insert(name.clone(), commit.clone());
                carried.push(name);
            }
        }
        carried
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Class of one tag name across an upstream snapshot and a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagClassification {
    Added,
    Mutated,
    Deleted,
    Unchanged,
}

/// A tag present on only one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: TagName,
    pub commit: CommitSha,
}

/// A tag whose name now dereferences to a different commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMutation {
    pub name: TagName,
    /// Commit recorded in the baseline.
    pub previous: CommitSha,
    /// Commit upstream names today.
    pub current: CommitSha,
}

/// Per-name classification of an upstream snapshot against a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReport {
    pub added: Vec<TagEntry>,
    pub mutated: Vec<TagMutation>,
    pub deleted: Vec<TagEntry>,
    pub unchanged: Vec<TagName>,
}

impl TagReport {
    /// Returns `true` if any tag needs a notification.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.mutated.is_empty() && self.deleted.is_empty())
    }

    /// Returns the class a name fell into, or `None` if it was in neither snapshot.
    pub fn classification_of(&self, name: &TagName) -> Option<TagClassification> {
        if self.added.iter().any(|t| &t.name == name) {
            Some(TagClassification::Added)
        } else if self.mutated.iter().any(|t| &t.name == name) {
            Some(TagClassification::Mutated)
        } else if self.deleted.iter().any(|t| &t.name == name) {
            Some(TagClassification::Deleted)
        } else if self.unchanged.contains(name) {
            Some(TagClassification::Unchanged)
        } else {
            None
        }
    }

    /// Total number of classified names.
    pub fn total(&self) -> usize {
        self.added.len() + self.mutated.len() + self.deleted.len() + self.unchanged.len()
    }
}

/// Classifies every tag name in `upstream` and `baseline`.
///
/// Output vectors are ordered by tag name.
pub fn classify_tags(upstream: &TagSnapshot, baseline: &TagSnapshot) -> TagReport {
    let mut report = TagReport::default();

    for (name, current) in upstream.iter() {
        match baseline.get(name) {
            None => report.added.push(TagEntry {
                name: name.clone(),
                commit: current.clone(),
            }),
            Some(previous) if previous != current => report.mutated.push(TagMutation {
                name: name.clone(),
                previous: previous.clone(),
                current: current.clone(),
            }),
            Some(_) => report.unchanged.push(name.clone()),
        }
    }

    for (name, previous) in baseline.iter() {
        if upstream.get(name).is_none() {
            report.deleted.push(TagEntry {
                name: name.clone(),
                commit: previous.clone(),
            });
        }
    }

    report
}
