//! Rendering run reports on stdout.

use routines::{
    CommentAction, IssueAction, PullRequestAction, ScanSummaryReport, ScanTrigger, SyncReport,
    TagMonitorReport,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// A short human-readable summary.
    #[default]
    Text,
    /// The full report as pretty-printed JSON.
    Json,
}

/// Prints `report` in the requested format.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    report: &T,
    describe: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Text => describe(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    };
    println!("{rendered}");
    Ok(())
}

fn issue(action: &IssueAction) -> String {
    match action {
        IssueAction::Opened(n) => format!("opened issue #{n}"),
        IssueAction::Commented(n) => format!("commented on issue #{n}"),
        IssueAction::AlreadyOpen(n) => format!("issue #{n} already open"),
    }
}

pub fn describe_sync(report: &SyncReport) -> String {
    let mut lines = vec![
        format!("outcome: {}", report.outcome),
        format!("upstream head: {}", report.upstream_head.short()),
    ];
    match &report.tracking_before {
        Some(sha) => lines.push(format!("tracking head before: {}", sha.short())),
        None => lines.push("tracking head before: (branch created)".to_string()),
    }
    if report.force_reset {
        lines.push("tracking branch was force-reset".to_string());
    }
    if let Some(pr) = &report.pull_request {
        lines.push(match pr {
            PullRequestAction::Opened(n) => {
                format!("pull request: opened #{n} as {}", report.pull_request_identity)
            }
            PullRequestAction::Refreshed(n) => format!("pull request: refreshed #{n}"),
            PullRequestAction::NothingToMerge => "pull request: nothing to merge".to_string(),
        });
    }
    if let Some(action) = &report.divergence_issue {
        lines.push(format!("divergence: {}", issue(action)));
    }
    lines.join("\n")
}

pub fn describe_tags(report: &TagMonitorReport) -> String {
    let tags = &report.report;
    let mut lines = vec![format!(
        "tags: {} added, {} mutated, {} deleted, {} unchanged, {} skipped",
        tags.added.len(),
        tags.mutated.len(),
        tags.deleted.len(),
        tags.unchanged.len(),
        report.skipped.len()
    )];
    if report.first_run {
        lines.push("no baseline existed; every upstream tag reported as added".to_string());
    }
    for m in &tags.mutated {
        lines.push(format!("MUTATED {}: {} -> {}", m.name, m.previous, m.current));
    }
    for s in &report.skipped {
        lines.push(format!("skipped {}: {}", s.name, s.reason));
    }
    for n in &report.notifications {
        lines.push(format!("{:?}: {}", n.classification, issue(&n.issue)).to_lowercase());
    }
    lines.join("\n")
}

pub fn describe_trigger(trigger: &ScanTrigger) -> String {
    match trigger {
        ScanTrigger::Automatic { origin } => {
            format!("scan starts automatically (opened by {origin})")
        }
        ScanTrigger::Dispatched { workflow } => format!("dispatched scan workflow {workflow}"),
        ScanTrigger::AwaitingHumanInteraction => {
            "scan waits for a human to interact with the pull request".to_string()
        }
    }
}

pub fn describe_summary(report: &ScanSummaryReport) -> String {
    let assessment = &report.assessment;
    let comment = match report.comment {
        CommentAction::Created { id } => format!("posted summary comment {id}"),
        CommentAction::Updated { id, removed } => {
            format!("updated summary comment {id}, removed {removed} duplicates")
        }
        CommentAction::Unchanged { id, removed } => {
            format!("summary comment {id} unchanged, removed {removed} duplicates")
        }
    };
    format!(
        "pull request #{}: risk {}, {} findings{}\n{comment}",
        report.pull_request,
        assessment.level,
        assessment.findings.len(),
        if assessment.blocking { ", BLOCKING" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use model::{
        CommitSha, IssueNumber, OriginIdentity, PullRequestNumber, RunId, SyncOutcome, TagMutation,
        TagName, TagReport,
    };

    use super::*;

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    #[test]
    fn test_describe_sync_names_pull_request_and_identity() {
        let report = SyncReport {
            run_id: RunId::new_random(),
            outcome: SyncOutcome::FastForwarded,
            tracking_before: Some(sha("aaaaaaaaaaaaaaaa")),
            upstream_head: sha("bbbbbbbbbbbbbbbb"),
            force_reset: false,
            pull_request: Some(PullRequestAction::Opened(PullRequestNumber::new(7))),
            divergence_issue: None,
            pull_request_identity: OriginIdentity::AutomationToken,
        };

        let text = describe_sync(&report);

        assert!(text.contains("opened #7 as automation-token"));
        assert!(text.contains(report.upstream_head.short()));
    }

    #[test]
    fn test_describe_sync_reports_divergence_issue() {
        let report = SyncReport {
            run_id: RunId::new_random(),
            outcome: SyncOutcome::Diverged,
            tracking_before: Some(sha("aaaaaaaaaaaaaaaa")),
            upstream_head: sha("cccccccccccccccc"),
            force_reset: false,
            pull_request: None,
            divergence_issue: Some(IssueAction::Commented(IssueNumber::new(3))),
            pull_request_identity: OriginIdentity::InstalledApplication,
        };

        assert!(describe_sync(&report).contains("divergence: commented on issue #3"));
    }

    #[test]
    fn test_describe_tags_lists_mutations() {
        let report = TagMonitorReport {
            run_id: RunId::new_random(),
            report: TagReport {
                mutated: vec![TagMutation {
                    name: TagName::new("v2.0.0").unwrap(),
                    previous: sha("abc123"),
                    current: sha("def456"),
                }],
                ..TagReport::default()
            },
            skipped: Vec::new(),
            first_run: false,
            notifications: Vec::new(),
        };

        let text = describe_tags(&report);

        assert!(text.contains("1 mutated"));
        assert!(text.contains("MUTATED v2.0.0: abc123 -> def456"));
    }

    #[test]
    fn test_json_output_is_the_serialized_report() {
        let trigger = ScanTrigger::Dispatched {
            workflow: "scan.yml".into(),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["trigger"], "dispatched");
        assert_eq!(json["workflow"], "scan.yml");
        assert!(describe_trigger(&trigger).contains("scan.yml"));
    }
}
