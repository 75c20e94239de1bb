//! Raising notices without duplicating open issues.

use model::{IssueNumber, IssueTracker, Notice, RepositoryRef};
use serde::Serialize;
use tracing::{debug, info};

/// What happened when a notice was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "issue")]
pub enum IssueAction {
    /// A new issue was opened.
    Opened(IssueNumber),
    /// An open issue with the same title existed; a follow-up comment was added.
    Commented(IssueNumber),
    /// An open issue with the same title existed and nothing was added.
    AlreadyOpen(IssueNumber),
}

/// Opens `notice` as an issue on `repo` unless an open issue with the same
/// primary label and title already exists.
///
/// When one exists and `followup` is given, the follow-up is posted as a
/// comment on it instead.
pub async fn raise_notice(
    issues: &dyn IssueTracker,
    repo: &RepositoryRef,
    notice: &Notice,
    followup: Option<&str>,
) -> Result<IssueAction, model::HostError> {
    if let Some(label) = notice.labels.first() {
        if let Some(existing) = issues.find_open_issue(repo, label, &notice.title).await? {
            return match followup {
                Some(body) => {
                    issues.create_comment(repo, existing.number, body).await?;
                    info!(issue = %existing.number, title = %notice.title, "Commented on open issue");
                    Ok(IssueAction::Commented(existing.number))
                }
                None => {
                    debug!(issue = %existing.number, title = %notice.title, "Issue already open");
                    Ok(IssueAction::AlreadyOpen(existing.number))
                }
            };
        }
    }

    let number = issues
        .create_issue(repo, &notice.title, &notice.body, &notice.labels)
        .await?;
    info!(issue = %number, title = %notice.title, priority = ?notice.priority, "Opened issue");
    Ok(IssueAction::Opened(number))
}
