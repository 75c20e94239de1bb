//! Tag integrity monitor.
//!
//! Snapshots upstream's tags, compares them against a baseline by the commit
//! each tag ultimately names, and raises one notice per non-empty category.
//! The monitor is purely observational: it never gates merges and never
//! writes refs.

use std::sync::Arc;

use model::{
    classify_tags, notices, validate_tag_name, BaselineStore, CodeRepository, CommitSha,
    ForkGuardError, HostError, IssueTracker, RawTag, RepositoryRef, RunId, SkipReason, SkippedTag,
    TagClassification, TagReport, TagSnapshot, TagTarget, MAX_PEEL_DEPTH,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::notify::{raise_notice, IssueAction};

/// Where the previous state of upstream's tags is read from.
#[derive(Clone)]
pub enum BaselineSource {
    /// The fork's own tags are the record of what upstream looked like.
    ForkTags,
    /// A snapshot persisted by the previous run. Rewritten after each
    /// successful run.
    Stored(Arc<dyn BaselineStore>),
}

impl std::fmt::Debug for BaselineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForkTags => write!(f, "ForkTags"),
            Self::Stored(_) => write!(f, "Stored"),
        }
    }
}

/// Inputs of one monitor run.
#[derive(Debug, Clone)]
pub struct TagMonitorConfig {
    pub upstream: RepositoryRef,
    /// Repository notices are filed on, and whose tags form the
    /// [`BaselineSource::ForkTags`] baseline.
    pub fork: RepositoryRef,
    pub baseline: BaselineSource,
}

/// One notice raised by a monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TagNotification {
    pub classification: TagClassification,
    pub issue: IssueAction,
}

/// Result of one monitor run.
#[derive(Debug, Clone, Serialize)]
pub struct TagMonitorReport {
    pub run_id: RunId,
    pub report: TagReport,
    /// Tags left out of either snapshot, with the reason.
    pub skipped: Vec<SkippedTag>,
    /// No baseline existed; every upstream tag was reported as added.
    pub first_run: bool,
    pub notifications: Vec<TagNotification>,
}

impl TagMonitorReport {
    /// Returns `true` if any tag now names a different commit.
    pub fn has_mutations(&self) -> bool {
        !self.report.mutated.is_empty()
    }
}

/// Runs the tag integrity protocol against the hosting platform.
pub struct TagIntegrityMonitor {
    code: Arc<dyn CodeRepository>,
    issues: Arc<dyn IssueTracker>,
}

impl TagIntegrityMonitor {
    pub fn new(code: Arc<dyn CodeRepository>, issues: Arc<dyn IssueTracker>) -> Self {
        Self { code, issues }
    }

    /// Classifies upstream's tags against the baseline and raises notices.
    ///
    /// # Errors
    ///
    /// Fails if either tag listing cannot be fetched or the stored baseline
    /// cannot be read or written. Malformed individual tags never fail the run.
    #[instrument(skip_all, fields(run_id = %run_id, upstream = %config.upstream, baseline = ?config.baseline))]
    pub async fn run(
        &self,
        run_id: RunId,
        config: &TagMonitorConfig,
    ) -> Result<TagMonitorReport, ForkGuardError> {
        let (upstream, upstream_skipped) = self.snapshot(&config.upstream).await?;
        let mut skipped = upstream_skipped.clone();

        let (baseline, first_run) = match &config.baseline {
            BaselineSource::ForkTags => {
                let (fork, fork_skipped) = self.snapshot(&config.fork).await?;
                skipped.extend(fork_skipped);
                let first_run = fork.is_empty();
                (fork, first_run)
            }
            BaselineSource::Stored(store) => match store.load().await? {
                Some(snapshot) => (snapshot, false),
                None => (TagSnapshot::empty(), true),
            },
        };
        if first_run {
            info!(
                tags = upstream.len(),
                "No baseline recorded; reporting every upstream tag as added"
            );
        }

        let mut report = classify_tags(&upstream, &baseline);
        let mut next_baseline = upstream;
        let carried = next_baseline.carry_forward(&baseline, &upstream_skipped);
        if !carried.is_empty() {
            report.deleted.retain(|t| !carried.contains(&t.name));
            debug!(tags = ?carried, "Keeping recorded commits for skipped upstream tags");
        }
        info!(
            added = report.added.len(),
            mutated = report.mutated.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged.len(),
            skipped = skipped.len(),
            "Classified upstream tags"
        );
        for m in &report.mutated {
            error!(
                tag = %m.name,
                previous = %m.previous,
                current = %m.current,
                "Upstream tag now points to a different commit"
            );
        }

        let notifications = self.notify(config, &report).await?;

        if let BaselineSource::Stored(store) = &config.baseline {
            store.save(&next_baseline).await?;
        }

        Ok(TagMonitorReport {
            run_id,
            report,
            skipped,
            first_run,
            notifications,
        })
    }

    async fn notify(
        &self,
        config: &TagMonitorConfig,
        report: &TagReport,
    ) -> Result<Vec<TagNotification>, HostError> {
        let mut raised = Vec::new();
        let upstream = &config.upstream;

        if !report.mutated.is_empty() {
            let notice = notices::tag_mutation_alert(upstream, &report.mutated);
            let followup = notices::tag_mutation_followup(&report.mutated);
            raised.push(TagNotification {
                classification: TagClassification::Mutated,
                issue: raise_notice(self.issues.as_ref(), &config.fork, &notice, Some(&followup))
                    .await?,
            });
        }
        if !report.added.is_empty() {
            let notice = notices::new_tags_notice(upstream, &report.added);
            raised.push(TagNotification {
                classification: TagClassification::Added,
                issue: raise_notice(self.issues.as_ref(), &config.fork, &notice, None).await?,
            });
        }
        if !report.deleted.is_empty() {
            let notice = notices::deleted_tags_notice(upstream, &report.deleted);
            raised.push(TagNotification {
                classification: TagClassification::Deleted,
                issue: raise_notice(self.issues.as_ref(), &config.fork, &notice, None).await?,
            });
        }

        Ok(raised)
    }

    /// Lists and dereferences every tag of `repo`.
    async fn snapshot(
        &self,
        repo: &RepositoryRef,
    ) -> Result<(TagSnapshot, Vec<SkippedTag>), HostError> {
        let raw = self.code.list_tags(repo).await?;
        let mut entries = Vec::with_capacity(raw.len());
        let mut skipped = Vec::new();

        for RawTag { name, target } in raw {
            // Check the name first so malformed tags cost no peel requests.
            if let Err(why) = validate_tag_name(&name) {
                warn!(%repo, tag = %name, reason = %why, "Skipping tag with malformed name");
                skipped.push(SkippedTag {
                    name,
                    reason: SkipReason::MalformedName(why),
                });
                continue;
            }
            match self.dereference(repo, target).await? {
                Ok(commit) => entries.push((name, commit)),
                Err(reason) => {
                    warn!(%repo, tag = %name, %reason, "Skipping tag");
                    skipped.push(SkippedTag { name, reason });
                }
            }
        }

        let (snapshot, duplicates) = TagSnapshot::from_dereferenced(entries);
        skipped.extend(duplicates);
        Ok((snapshot, skipped))
    }

    /// Follows annotated tag objects to the commit they ultimately name.
    ///
    /// The outer error aborts the run; the inner one only skips this tag.
    async fn dereference(
        &self,
        repo: &RepositoryRef,
        target: TagTarget,
    ) -> Result<Result<CommitSha, SkipReason>, HostError> {
        let mut current = target;
        let mut followed = 0;
        loop {
            match current {
                TagTarget::Commit(sha) => return Ok(Ok(sha)),
                TagTarget::Other(_) => return Ok(Err(SkipReason::NotACommit)),
                TagTarget::Annotated(object) => {
                    if followed == MAX_PEEL_DEPTH {
                        return Ok(Err(SkipReason::PeelDepthExceeded));
                    }
                    current = match self.code.read_tag_object(repo, &object).await {
                        Ok(next) => next,
                        Err(HostError::Malformed { message }) => {
                            return Ok(Err(SkipReason::UnreadableObject(message)))
                        }
                        Err(HostError::NotFound { resource }) => {
                            return Ok(Err(SkipReason::UnreadableObject(format!(
                                "{resource} not found"
                            ))))
                        }
                        Err(other) => return Err(other),
                    };
                    followed += 1;
                }
            }
        }
    }
}
