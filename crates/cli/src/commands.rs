//! Wiring the routines to the GitHub adapter, and the `watch` loop.

use std::sync::Arc;

use github::{Credentials, FileBaselineStore, GithubClient};
use model::{ForkGuardError, PullRequestManager, PullRequestNumber, RunId};
use routines::{
    group_key, BaselineSource, BranchSyncChecker, LatestWins, PullRequestAction, RunGroups,
    ScanSummaryReport, ScanTrigger, ScanTriggerGate, SyncReport, TagIntegrityMonitor,
    TagMonitorReport,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{BaselineKind, Settings};

/// The routines, bound to one configured fork.
pub struct App {
    settings: Settings,
    sync: BranchSyncChecker,
    tags: TagIntegrityMonitor,
    scan: ScanTriggerGate,
    pulls: Arc<dyn PullRequestManager>,
}

impl App {
    /// Connects every routine to a single GitHub client.
    pub fn connect(settings: Settings, credentials: Credentials) -> Result<Self, ForkGuardError> {
        let client = Arc::new(GithubClient::new(
            settings.api_base_url.clone(),
            credentials,
            settings.request_timeout,
        )?);
        let identity = client.identity();
        info!(api = %settings.api_base_url, %identity, fork = %settings.fork, "Connected GitHub client");

        Ok(Self {
            sync: BranchSyncChecker::new(client.clone(), client.clone(), client.clone(), identity),
            tags: TagIntegrityMonitor::new(client.clone(), client.clone()),
            scan: ScanTriggerGate::new(client.clone(), client.clone(), client.clone(), client.clone()),
            pulls: client,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn sync(&self) -> Result<SyncReport, ForkGuardError> {
        self.sync
            .run(RunId::new_random(), &self.settings.sync_config())
            .await
    }

    pub async fn tags(&self) -> Result<TagMonitorReport, ForkGuardError> {
        let baseline = match self.settings.baseline {
            BaselineKind::Fork => BaselineSource::ForkTags,
            BaselineKind::Snapshot => BaselineSource::Stored(Arc::new(FileBaselineStore::new(
                &self.settings.snapshot_path,
            ))),
        };
        self.tags
            .run(RunId::new_random(), &self.settings.tag_config(baseline))
            .await
    }

    pub async fn trigger_scan(&self, number: PullRequestNumber) -> Result<ScanTrigger, ForkGuardError> {
        self.scan
            .trigger(RunId::new_random(), &self.settings.scan_config(), number)
            .await
    }

    pub async fn summarize_scan(
        &self,
        number: PullRequestNumber,
    ) -> Result<ScanSummaryReport, ForkGuardError> {
        self.scan
            .summarize(RunId::new_random(), &self.settings.scan_config(), number)
            .await
    }

    /// The open pull request from the tracking branch into the fork's
    /// default branch, if any.
    pub async fn open_sync_pull_request(&self) -> Result<Option<PullRequestNumber>, ForkGuardError> {
        Ok(self
            .pulls
            .find_open_pull_request(
                &self.settings.fork,
                &self.settings.tracking_branch,
                &self.settings.fork_default_branch,
            )
            .await?)
    }
}

fn log_failure(routine: &str, e: &ForkGuardError) {
    error!(%routine, error = %e, retry = ?e.retry_policy(), "Run failed; retrying on the next interval");
}

/// Runs every routine on its interval until interrupted.
///
/// Sync and tag runs are serialised per fork: a run triggered while the
/// previous one is still going waits for it. A sync run that opens the sync
/// pull request, or moves the branch behind it, triggers the scan for it
/// immediately;
/// scan summaries are otherwise refreshed on their own interval, and a newer
/// summary run for a pull request supersedes an older one.
pub async fn watch(app: Arc<App>) -> anyhow::Result<()> {
    let groups = Arc::new(RunGroups::new());
    let scans = Arc::new(LatestWins::new());

    let settings = app.settings();
    let mut sync_tick = interval(settings.sync_interval);
    let mut tags_tick = interval(settings.tags_interval);
    let mut scan_tick = interval(settings.scan_interval);
    for tick in [&mut sync_tick, &mut tags_tick, &mut scan_tick] {
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }
    info!(
        upstream = %settings.upstream,
        fork = %settings.fork,
        sync_secs = settings.sync_interval.as_secs(),
        tags_secs = settings.tags_interval.as_secs(),
        scan_secs = settings.scan_interval.as_secs(),
        "Watching"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = sync_tick.tick() => {
                let (app, groups, scans) = (Arc::clone(&app), Arc::clone(&groups), Arc::clone(&scans));
                tokio::spawn(async move {
                    let key = group_key("sync", &app.settings().fork);
                    match groups.run(&key, app.sync()).await {
                        Ok(report) => match scan_target(&report) {
                            Some(n) => spawn_trigger(&app, &scans, n),
                            None => debug!(outcome = %report.outcome, "Sync run finished"),
                        },
                        Err(e) => log_failure("sync", &e),
                    }
                });
            }
            _ = tags_tick.tick() => {
                let (app, groups) = (Arc::clone(&app), Arc::clone(&groups));
                tokio::spawn(async move {
                    let key = group_key("tags", &app.settings().upstream);
                    match groups.run(&key, app.tags()).await {
                        Ok(report) if report.has_mutations() => {
                            warn!(mutated = report.report.mutated.len(), "Upstream tags were mutated");
                        }
                        Ok(_) => {}
                        Err(e) => log_failure("tags", &e),
                    }
                });
            }
            _ = scan_tick.tick() => {
                let (app, scans) = (Arc::clone(&app), Arc::clone(&scans));
                tokio::spawn(async move {
                    match app.open_sync_pull_request().await {
                        Ok(Some(n)) => spawn_summary(&app, &scans, n),
                        Ok(None) => debug!("No open sync pull request to summarize"),
                        Err(e) => log_failure("scan", &e),
                    }
                });
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "Cannot listen for the interrupt signal; stopping");
                }
                info!(in_flight_scans = scans.in_flight(), "Shutting down");
                return Ok(());
            }
        }
    }
}

/// The sync pull request whose scan a sync run should trigger.
///
/// A refresh that left the tracking branch where it was changes nothing the
/// scan has not already seen.
fn scan_target(report: &SyncReport) -> Option<PullRequestNumber> {
    match report.pull_request? {
        PullRequestAction::Opened(n) => Some(n),
        PullRequestAction::Refreshed(n)
            if report.tracking_before.as_ref() != Some(&report.upstream_head) =>
        {
            Some(n)
        }
        PullRequestAction::Refreshed(_) | PullRequestAction::NothingToMerge => None,
    }
}

/// Ensures the scan runs for `number`, then summarizes it.
fn spawn_trigger(app: &Arc<App>, scans: &Arc<LatestWins>, number: PullRequestNumber) {
    let (app, summaries) = (Arc::clone(app), Arc::clone(scans));
    scans.spawn(group_key("scan-trigger", number), async move {
        match app.trigger_scan(number).await {
            Ok(trigger) => {
                debug!(pull_request = %number, ?trigger, "Scan trigger finished");
                spawn_summary(&app, &summaries, number);
            }
            Err(e) => log_failure("scan", &e),
        }
    });
}

fn spawn_summary(app: &Arc<App>, scans: &LatestWins, number: PullRequestNumber) {
    let app = Arc::clone(app);
    scans.spawn(group_key("scan", number), async move {
        match app.summarize_scan(number).await {
            Ok(report) if report.assessment.blocking => {
                warn!(pull_request = %number, level = %report.assessment.level, "Sync pull request has blocking findings");
            }
            Ok(_) => {}
            Err(e) => log_failure("scan", &e),
        }
    });
}

#[cfg(test)]
mod tests {
    use model::{CommitSha, OriginIdentity, SyncOutcome};

    use super::*;

    fn sha(s: &str) -> CommitSha {
        CommitSha::new(s).unwrap()
    }

    fn report(before: Option<&str>, head: &str, pull_request: PullRequestAction) -> SyncReport {
        SyncReport {
            run_id: RunId::new_random(),
            outcome: SyncOutcome::FastForwarded,
            tracking_before: before.map(sha),
            upstream_head: sha(head),
            force_reset: false,
            pull_request: Some(pull_request),
            divergence_issue: None,
            pull_request_identity: OriginIdentity::AutomationToken,
        }
    }

    #[test]
    fn test_refresh_without_branch_movement_does_not_rescan() {
        let n = PullRequestNumber::new(9);

        let idle = report(Some("bbbb2222"), "bbbb2222", PullRequestAction::Refreshed(n));
        assert_eq!(scan_target(&idle), None);

        let advanced = report(Some("aaaa1111"), "bbbb2222", PullRequestAction::Refreshed(n));
        assert_eq!(scan_target(&advanced), Some(n));
    }

    #[test]
    fn test_opened_pull_request_is_always_scanned() {
        let n = PullRequestNumber::new(4);
        let opened = report(Some("bbbb2222"), "bbbb2222", PullRequestAction::Opened(n));
        assert_eq!(scan_target(&opened), Some(n));

        let created = report(None, "bbbb2222", PullRequestAction::Opened(n));
        assert_eq!(scan_target(&created), Some(n));

        let nothing = report(Some("aaaa1111"), "bbbb2222", PullRequestAction::NothingToMerge);
        assert_eq!(scan_target(&nothing), None);
    }
}
