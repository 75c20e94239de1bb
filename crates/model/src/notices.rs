//! Notification templates.
//!
//! Every issue, alert, pull request, and comment ForkGuard writes is rendered
//! here from domain values. Each issue body has the same three sections:
//! *Summary*, *Affected refs*, *Recommended action*. Titles are stable for a
//! given subject so an open notification can be found again and updated
//! instead of duplicated.

use std::fmt::Write as _;

use crate::{
    BranchRef, CommitSha, Comparison, DiffStats, FindingSource, Label, OriginIdentity,
    RepositoryRef, RiskAssessment, Severity, TagEntry, TagMutation,
};

/// Label on sync pull requests.
pub const LABEL_UPSTREAM_SYNC: &str = "upstream-sync";
/// Label on divergence issues.
pub const LABEL_DIVERGENCE: &str = "upstream-divergence";
/// Label on new-tag issues.
pub const LABEL_NEW_TAG: &str = "upstream-tag";
/// Label on deleted-tag notices.
pub const LABEL_DELETED_TAG: &str = "upstream-tag-deleted";
/// Labels on tag-mutation alerts.
pub const LABELS_TAG_MUTATION: [&str; 3] = ["security", "tag-mutation", "priority: high"];

/// Hidden marker identifying the scan summary comment on a pull request.
pub const SCAN_SUMMARY_MARKER: &str = "<!-- forkguard:scan-summary -->";

/// Tag names listed in a title before the rest are counted.
const MAX_TITLE_TAGS: usize = 3;

const SECURITY_REVIEW_CHECKLIST: &[&str] = &[
    "Review the upstream changelog and release notes",
    "Check new and updated dependencies for known vulnerabilities",
    "Inspect changes to CI workflows, build scripts, and install hooks",
    "Confirm no credentials, tokens, or keys were added",
    "Wait for the security scan summary comment before merging",
];

/// Urgency of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Informational,
    High,
}

/// An issue to open (or update, when one with the same title is already open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub labels: Vec<Label>,
    pub priority: Priority,
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub labels: Vec<Label>,
}

fn labels(names: &[&str]) -> Vec<Label> {
    names.iter().filter_map(|n| Label::new(*n)).collect()
}

fn checklist(body: &mut String) {
    for item in SECURITY_REVIEW_CHECKLIST {
        let _ = writeln!(body, "- [ ] {item}");
    }
}

fn tag_list_title<'a>(names: impl ExactSizeIterator<Item = &'a str>) -> String {
    let total = names.len();
    let shown: Vec<&str> = names.take(MAX_TITLE_TAGS).collect();
    let mut title = shown.join(", ");
    if total > MAX_TITLE_TAGS {
        let _ = write!(title, " (+{} more)", total - MAX_TITLE_TAGS);
    }
    title
}

// ---------------------------------------------------------------------------
// Branch sync
// ---------------------------------------------------------------------------

/// Issue raised when the tracking branch cannot be fast-forwarded.
pub fn divergence_notice(
    tracking: &BranchRef,
    tracking_head: &CommitSha,
    upstream: &BranchRef,
    upstream_head: &CommitSha,
    comparison: &Comparison,
) -> Notice {
    let mut body = String::new();
    let _ = writeln!(body, "## Summary\n");
    let _ = writeln!(
        body,
        "`{tracking}` can no longer be fast-forwarded to `{upstream}`. \
         The tracking branch has {} commit(s) that upstream does not, and upstream has {} \
         commit(s) that the tracking branch does not. The tracking branch was not modified.\n",
        comparison.behind_by, comparison.ahead_by
    );
    let _ = writeln!(body, "## Affected refs\n");
    let _ = writeln!(body, "| Ref | Commit |\n|-----|--------|");
    let _ = writeln!(body, "| `{tracking}` | `{tracking_head}` |");
    let _ = writeln!(body, "| `{upstream}` | `{upstream_head}` |\n");
    let _ = writeln!(body, "## Recommended action\n");
    let _ = writeln!(
        body,
        "- [ ] Determine whether upstream rewrote history (force-push) or the tracking branch received local commits"
    );
    let _ = writeln!(
        body,
        "- [ ] Move local changes to the fork's default branch, then re-run the sync with `force` to reset the tracking branch"
    );
    let _ = writeln!(
        body,
        "- [ ] If upstream history was rewritten unexpectedly, treat it as a potential supply-chain incident"
    );

    Notice {
        title: format!("Upstream divergence: {} vs {}", tracking, upstream),
        body,
        labels: labels(&[LABEL_DIVERGENCE]),
        priority: Priority::High,
    }
}

/// Comment added to an already-open divergence issue on a repeat detection.
pub fn divergence_followup(tracking_head: &CommitSha, upstream_head: &CommitSha) -> String {
    format!(
        "Divergence still present: tracking branch at `{tracking_head}`, upstream at `{upstream_head}`."
    )
}

/// Comment added to an open mutation alert when the same tags move again.
pub fn tag_mutation_followup(mutated: &[TagMutation]) -> String {
    let mut body = String::from("Tags mutated again since this alert was opened:\n\n");
    for m in mutated {
        let _ = writeln!(body, "- `{}`: `{}` -> `{}`", m.name, m.previous, m.current);
    }
    body
}

/// Pull request from the tracking branch to the fork's default branch.
pub fn sync_pull_request(
    tracking: &BranchRef,
    default: &BranchRef,
    upstream: &BranchRef,
    upstream_head: &CommitSha,
    stats: &DiffStats,
    force_reset: bool,
) -> PullRequestDraft {
    let mut body = String::new();
    let _ = writeln!(body, "## Summary\n");
    let _ = writeln!(
        body,
        "Brings `{upstream}` at `{upstream_head}` into `{}` via `{}`.\n",
        default.branch, tracking.branch
    );
    if force_reset {
        let _ = writeln!(
            body,
            "> **Note:** the tracking branch was force-reset to upstream; commits that existed only on it were discarded.\n"
        );
    }
    let _ = writeln!(body, "## Diff statistics\n");
    let _ = writeln!(body, "| Commits | Files changed | Additions | Deletions |");
    let _ = writeln!(body, "|---------|---------------|-----------|-----------|");
    let _ = writeln!(
        body,
        "| {} | {} | +{} | -{} |\n",
        stats.commits, stats.files_changed, stats.additions, stats.deletions
    );
    if stats.files_truncated {
        let _ = writeln!(
            body,
            "> **Note:** the comparison listed only part of the changed files; file and line counts are lower bounds.\n"
        );
    }
    let _ = writeln!(body, "## Security review\n");
    checklist(&mut body);

    PullRequestDraft {
        title: format!("Sync upstream {} ({})", upstream, upstream_head.short()),
        body,
        labels: labels(&[LABEL_UPSTREAM_SYNC]),
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Informational issue for tags that appeared upstream.
pub fn new_tags_notice(upstream: &RepositoryRef, added: &[TagEntry]) -> Notice {
    let mut body = String::new();
    let _ = writeln!(body, "## Summary\n");
    let _ = writeln!(body, "{} new tag(s) appeared on `{upstream}`.\n", added.len());
    let _ = writeln!(body, "## Affected refs\n");
    let _ = writeln!(body, "| Tag | Commit |\n|-----|--------|");
    for tag in added {
        let _ = writeln!(body, "| `{}` | `{}` |", tag.name, tag.commit);
    }
    let _ = writeln!(body, "\n## Recommended action\n");
    checklist(&mut body);

    Notice {
        title: format!(
            "New upstream tags in {upstream}: {}",
            tag_list_title(added.iter().map(|t| t.name.as_str()))
        ),
        body,
        labels: labels(&[LABEL_NEW_TAG]),
        priority: Priority::Informational,
    }
}

/// High-priority alert for tags that now name different commits.
pub fn tag_mutation_alert(upstream: &RepositoryRef, mutated: &[TagMutation]) -> Notice {
    let mut body = String::new();
    let _ = writeln!(body, "## Summary\n");
    let _ = writeln!(
        body,
        "**Security alert.** {} tag(s) on `{upstream}` now point to different commits than previously recorded. \
         A released version changing content is a strong signal of supply-chain tampering.\n",
        mutated.len()
    );
    let _ = writeln!(body, "## Affected refs\n");
    let _ = writeln!(body, "| Tag | Previous commit | Current commit |");
    let _ = writeln!(body, "|-----|-----------------|----------------|");
    for m in mutated {
        let _ = writeln!(body, "| `{}` | `{}` | `{}` |", m.name, m.previous, m.current);
    }
    let _ = writeln!(body, "\n## Recommended action\n");
    let _ = writeln!(body, "- [ ] Do not consume the affected versions until verified");
    let _ = writeln!(body, "- [ ] Contact the upstream maintainers to confirm the re-tag was intentional");
    let _ = writeln!(body, "- [ ] Diff the previous and current commits for unexpected changes");
    let _ = writeln!(body, "- [ ] Audit builds or deployments that used these tags since the change");

    Notice {
        title: format!(
            "SECURITY: upstream tag mutated in {upstream}: {}",
            tag_list_title(mutated.iter().map(|m| m.name.as_str()))
        ),
        body,
        labels: labels(&LABELS_TAG_MUTATION),
        priority: Priority::High,
    }
}

/// Low-priority notice for tags that disappeared upstream.
pub fn deleted_tags_notice(upstream: &RepositoryRef, deleted: &[TagEntry]) -> Notice {
    let mut body = String::new();
    let _ = writeln!(body, "## Summary\n");
    let _ = writeln!(
        body,
        "{} previously recorded tag(s) no longer exist on `{upstream}`.\n",
        deleted.len()
    );
    let _ = writeln!(body, "## Affected refs\n");
    let _ = writeln!(body, "| Tag | Last known commit |\n|-----|-------------------|");
    for tag in deleted {
        let _ = writeln!(body, "| `{}` | `{}` |", tag.name, tag.commit);
    }
    let _ = writeln!(body, "\n## Recommended action\n");
    let _ = writeln!(body, "- [ ] Check whether the deletion was announced upstream");
    let _ = writeln!(body, "- [ ] Pin consumers to commits rather than the deleted tags");

    Notice {
        title: format!(
            "Upstream tags deleted in {upstream}: {}",
            tag_list_title(deleted.iter().map(|t| t.name.as_str()))
        ),
        body,
        labels: labels(&[LABEL_DELETED_TAG]),
        priority: Priority::Low,
    }
}

// ---------------------------------------------------------------------------
// Scan summary
// ---------------------------------------------------------------------------

/// Body of the single risk-summary comment on a pull request.
///
/// Always starts with [`SCAN_SUMMARY_MARKER`].
pub fn scan_summary_comment(
    assessment: &RiskAssessment,
    head: &CommitSha,
    origin: OriginIdentity,
) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "{SCAN_SUMMARY_MARKER}");
    let _ = writeln!(body, "## Security scan summary\n");
    let verdict = if assessment.blocking {
        format!(
            "**Blocking**: dependency findings at or above `{}` severity.",
            assessment.threshold
        )
    } else {
        "No blocking findings.".to_string()
    };
    let _ = writeln!(
        body,
        "Risk level: **{}** for `{}`. {verdict}\n",
        assessment.level,
        head.short()
    );

    let _ = writeln!(body, "| Severity | Findings |\n|----------|----------|");
    for severity in Severity::DESCENDING {
        let _ = writeln!(body, "| {severity} | {} |", assessment.count(severity));
    }

    if !assessment.findings.is_empty() {
        let _ = writeln!(body, "\n### Findings\n");
        for f in &assessment.findings {
            let source = match f.source {
                FindingSource::DependencyReview => "dependency",
                FindingSource::CodeScanning => "code",
            };
            let location = f
                .location
                .as_deref()
                .map(|l| format!(" in `{l}`"))
                .unwrap_or_default();
            let id = match &f.url {
                Some(url) => format!("[{}]({url})", f.identifier),
                None => format!("`{}`", f.identifier),
            };
            let _ = writeln!(
                body,
                "- **{}** ({source}) {id}: {}{location}",
                f.severity, f.title
            );
        }
    }

    if !origin.triggers_automation() {
        let _ = writeln!(
            body,
            "\n_This pull request was opened with the automation token; automatic checks may not have run._"
        );
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assess_risk, AncestryRelation, BranchName, Finding, TagName};

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    fn branch(repo: &str, name: &str) -> BranchRef {
        BranchRef {
            repository: RepositoryRef::parse(repo).unwrap(),
            branch: BranchName::new(name).unwrap(),
        }
    }

    #[test]
    fn test_divergence_notice_names_both_commits() {
        let comparison = Comparison {
            relation: AncestryRelation::Diverged,
            ahead_by: 2,
            behind_by: 1,
            stats: DiffStats::default(),
        };
        let notice = divergence_notice(
            &branch("me/widgets", "upstream-sync"),
            &sha("aaaa1111"),
            &branch("octo/widgets", "main"),
            &sha("cccc3333"),
            &comparison,
        );
        assert!(notice.body.contains("aaaa1111"));
        assert!(notice.body.contains("cccc3333"));
        assert!(notice.body.contains("## Recommended action"));
        assert_eq!(
            notice.title,
            "Upstream divergence: me/widgets@upstream-sync vs octo/widgets@main"
        );
        assert_eq!(notice.labels, vec![Label::new(LABEL_DIVERGENCE).unwrap()]);
    }

    #[test]
    fn test_sync_pull_request_has_stats_and_checklist() {
        let stats = DiffStats {
            commits: 4,
            files_changed: 3,
            additions: 120,
            deletions: 7,
            files_truncated: false,
        };
        let draft = sync_pull_request(
            &branch("me/widgets", "upstream-sync"),
            &branch("me/widgets", "main"),
            &branch("octo/widgets", "main"),
            &sha("bbbb2222cccc"),
            &stats,
            false,
        );
        assert!(draft.body.contains("| 4 | 3 | +120 | -7 |"));
        assert!(draft.body.contains("- [ ] "));
        assert!(!draft.body.contains("force-reset"));
        assert!(!draft.body.contains("lower bounds"));
        assert_eq!(draft.title, "Sync upstream octo/widgets@main (bbbb222)");
        assert_eq!(draft.labels, vec![Label::new(LABEL_UPSTREAM_SYNC).unwrap()]);
    }

    #[test]
    fn test_mutation_alert_is_high_priority_and_names_commits() {
        let upstream = RepositoryRef::parse("octo/widgets").unwrap();
        let alert = tag_mutation_alert(
            &upstream,
            &[TagMutation {
                name: TagName::new("v2.0.0").unwrap(),
                previous: sha("abc123"),
                current: sha("def456"),
            }],
        );
        assert_eq!(alert.priority, Priority::High);
        assert!(alert.body.contains("`abc123`"));
        assert!(alert.body.contains("`def456`"));
        assert!(alert.title.contains("v2.0.0"));
        assert_eq!(alert.labels.len(), 3);
    }

    #[test]
    fn test_mutation_followup_lists_every_commit_pair() {
        let followup = tag_mutation_followup(&[
            TagMutation {
                name: TagName::new("v2.0.0").unwrap(),
                previous: sha("def456"),
                current: sha("999fff"),
            },
            TagMutation {
                name: TagName::new("v2.1.0").unwrap(),
                previous: sha("1111"),
                current: sha("2222"),
            },
        ]);
        assert!(followup.contains("- `v2.0.0`: `def456` -> `999fff`"));
        assert!(followup.contains("- `v2.1.0`: `1111` -> `2222`"));
    }

    #[test]
    fn test_sync_pull_request_notes_truncated_file_list() {
        let stats = DiffStats {
            commits: 40,
            files_changed: 300,
            additions: 9000,
            deletions: 12,
            files_truncated: true,
        };
        let draft = sync_pull_request(
            &branch("me/widgets", "upstream-sync"),
            &branch("me/widgets", "main"),
            &branch("octo/widgets", "main"),
            &sha("bbbb2222cccc"),
            &stats,
            false,
        );
        assert!(draft.body.contains("| 40 | 300 | +9000 | -12 |"));
        assert!(draft.body.contains("lower bounds"));
    }

    #[test]
    fn test_tag_titles_truncate_long_lists() {
        let upstream = RepositoryRef::parse("octo/widgets").unwrap();
        let added: Vec<TagEntry> = (1..=5)
            .map(|i| TagEntry {
                name: TagName::new(format!("v{i}")).unwrap(),
                commit: sha("aaaa"),
            })
            .collect();
        let notice = new_tags_notice(&upstream, &added);
        assert_eq!(notice.title, "New upstream tags in octo/widgets: v1, v2, v3 (+2 more)");
        assert!(notice.body.contains("`v5`"));
        assert_eq!(notice.priority, Priority::Informational);

        let deleted = deleted_tags_notice(&upstream, &added[..1]);
        assert_eq!(deleted.priority, Priority::Low);
        assert_eq!(deleted.title, "Upstream tags deleted in octo/widgets: v1");
    }

    #[test]
    fn test_scan_summary_starts_with_marker() {
        let assessment = assess_risk(
            vec![Finding {
                source: FindingSource::DependencyReview,
                severity: Severity::High,
                identifier: "GHSA-xxxx".into(),
                title: "Prototype pollution".into(),
                location: Some("npm:lodash@4.17.0".into()),
                url: Some("https://github.com/advisories/GHSA-xxxx".into()),
            }],
            Severity::High,
        );
        let body = scan_summary_comment(&assessment, &sha("abcdef0123"), OriginIdentity::Human);
        assert!(body.starts_with(SCAN_SUMMARY_MARKER));
        assert!(body.contains("**Blocking**"));
        assert!(body.contains("| high | 1 |"));
        assert!(body.contains("[GHSA-xxxx](https://github.com/advisories/GHSA-xxxx)"));
        assert!(!body.contains("automation token"));
    }

    #[test]
    fn test_scan_summary_flags_ambient_token_origin() {
        let assessment = assess_risk(vec![], Severity::High);
        let body = scan_summary_comment(
            &assessment,
            &sha("abcdef0123"),
            OriginIdentity::AutomationToken,
        );
        assert!(body.contains("No blocking findings."));
        assert!(body.contains("automation token"));
    }
}
