//! Configuration loading and validation.
//!
//! Configuration lives in a TOML file (default `.forkguard/config.toml`).
//! Every section and field is optional in the file; command-line flags then
//! override file values, and [`ForkGuardConfig::resolve`] turns the result
//! into typed [`Settings`]. The binary never runs a routine with settings
//! that failed to resolve.

use std::path::{Path, PathBuf};
use std::time::Duration;

use github::{Credentials, DEFAULT_API_BASE_URL};
use model::{
    BranchName, ForkGuardError, Login, RepositoryRef, Severity, AMBIENT_TOKEN_LOGIN,
};
use routines::{BaselineSource, BranchSyncConfig, ScanGateConfig, TagMonitorConfig};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

/// Path of the configuration file when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".forkguard/config.toml";

/// Environment variable the platform sets to the running repository.
pub const REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkGuardConfig {
    pub upstream: UpstreamSection,
    pub fork: ForkSection,
    pub sync: SyncSection,
    pub tags: TagsSection,
    pub scan: ScanSection,
    pub identity: IdentitySection,
    pub github: GithubSection,
    pub watch: WatchSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamSection {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub default_branch: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            default_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkSection {
    /// `owner/name`; falls back to `GITHUB_REPOSITORY`.
    pub repository: Option<String>,
    pub default_branch: String,
    pub tracking_branch: String,
}

impl Default for ForkSection {
    fn default() -> Self {
        Self {
            repository: None,
            default_branch: "main".to_string(),
            tracking_branch: "upstream-sync".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub force: bool,
}

/// Where the tag monitor reads the previous state of upstream's tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    /// The fork's own tags.
    #[default]
    Fork,
    /// A JSON snapshot file written by the previous run.
    Snapshot,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagsSection {
    pub baseline: BaselineKind,
    pub snapshot_path: PathBuf,
    pub fail_on_mutation: bool,
}

impl Default for TagsSection {
    fn default() -> Self {
        Self {
            baseline: BaselineKind::Fork,
            snapshot_path: PathBuf::from(".forkguard/tag-baseline.json"),
            fail_on_mutation: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    /// Workflow file name or id dispatched for pull requests opened with the
    /// ambient token.
    pub workflow: Option<String>,
    pub blocking_severity: Severity,
    pub ambient_login: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            workflow: None,
            blocking_severity: Severity::High,
            ambient_login: AMBIENT_TOKEN_LOGIN.to_string(),
        }
    }
}

/// Which credentials the GitHub client authenticates with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// The workflow's ambient token.
    #[default]
    Ambient,
    /// A GitHub App installation token.
    Application,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    pub mode: IdentityMode,
    pub token_env: String,
    pub app_id: Option<String>,
    pub app_id_env: String,
    pub private_key_env: String,
    pub private_key_path: Option<PathBuf>,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            mode: IdentityMode::Ambient,
            token_env: "GITHUB_TOKEN".to_string(),
            app_id: None,
            app_id_env: "FORKGUARD_APP_ID".to_string(),
            private_key_env: "FORKGUARD_APP_PRIVATE_KEY".to_string(),
            private_key_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubSection {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Intervals used by `forkguard watch`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSection {
    pub sync_interval_secs: u64,
    pub tags_interval_secs: u64,
    pub scan_interval_secs: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            sync_interval_secs: 900,
            tags_interval_secs: 3600,
            scan_interval_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Command-line overrides
// ---------------------------------------------------------------------------

/// Repository flags shared by every subcommand. Each one overrides the
/// matching file value.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RepoArgs {
    /// Owner of the upstream repository.
    #[arg(long)]
    pub upstream_owner: Option<String>,

    /// Name of the upstream repository.
    #[arg(long)]
    pub upstream_repo: Option<String>,

    /// Upstream default branch [default: main].
    #[arg(long)]
    pub default_branch: Option<String>,

    /// The fork, as owner/name [default: $GITHUB_REPOSITORY].
    #[arg(long)]
    pub fork: Option<String>,

    /// Reset the tracking branch to upstream even when that discards commits.
    #[arg(long)]
    pub force: bool,
}

impl ForkGuardConfig {
    /// Loads the configuration file.
    ///
    /// An explicitly requested file must exist. The default file is optional:
    /// when it is absent every value comes from defaults and flags.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ForkGuardError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "No configuration file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(configuration(format!(
                    "cannot read '{}': {e}",
                    path.display()
                )))
            }
        };

        let config = Self::parse(&text)
            .map_err(|e| configuration(format!("'{}': {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, args: &RepoArgs) {
        if let Some(owner) = &args.upstream_owner {
            self.upstream.owner = Some(owner.clone());
        }
        if let Some(repo) = &args.upstream_repo {
            self.upstream.repo = Some(repo.clone());
        }
        if let Some(branch) = &args.default_branch {
            self.upstream.default_branch = branch.clone();
        }
        if let Some(fork) = &args.fork {
            self.fork.repository = Some(fork.clone());
        }
        // A flag can only turn force on; `--force=false` is not a thing.
        self.sync.force |= args.force;
    }

    /// Validates the configuration and resolves it into typed settings.
    ///
    /// `env` looks up environment variables; it is injected so tests do not
    /// depend on the process environment.
    pub fn resolve(&self, env: impl Fn(&str) -> Option<String>) -> Result<Settings, ForkGuardError> {
        let owner = self
            .upstream
            .owner
            .as_deref()
            .ok_or_else(|| configuration("upstream owner is not set ([upstream].owner or --upstream-owner)"))?;
        let repo = self
            .upstream
            .repo
            .as_deref()
            .ok_or_else(|| configuration("upstream repository is not set ([upstream].repo or --upstream-repo)"))?;
        let upstream = RepositoryRef::new(owner, repo)
            .ok_or_else(|| configuration(format!("'{owner}/{repo}' is not a valid upstream repository")))?;

        let fork_name = self
            .fork
            .repository
            .clone()
            .or_else(|| env(REPOSITORY_ENV).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| configuration(format!("fork repository is not set ([fork].repository, --fork or {REPOSITORY_ENV})")))?;
        let fork = RepositoryRef::parse(fork_name.trim())
            .ok_or_else(|| configuration(format!("'{fork_name}' is not an owner/name repository")))?;

        if fork == upstream {
            return Err(configuration(format!("fork and upstream are both '{fork}'")));
        }

        let upstream_branch = branch("[upstream].default_branch", &self.upstream.default_branch)?;
        let fork_default_branch = branch("[fork].default_branch", &self.fork.default_branch)?;
        let tracking_branch = branch("[fork].tracking_branch", &self.fork.tracking_branch)?;
        if tracking_branch == fork_default_branch {
            return Err(configuration(format!(
                "the tracking branch must differ from the fork's default branch '{fork_default_branch}'"
            )));
        }

        if self.tags.baseline == BaselineKind::Snapshot && self.tags.snapshot_path.as_os_str().is_empty() {
            return Err(configuration("[tags].snapshot_path must be set for the snapshot baseline"));
        }

        let workflow = match &self.scan.workflow {
            Some(w) if w.trim().is_empty() => {
                return Err(configuration("[scan].workflow must not be empty when set"))
            }
            other => other.clone(),
        };
        let ambient_login = Login::new(self.scan.ambient_login.trim())
            .ok_or_else(|| configuration("[scan].ambient_login must not be empty"))?;

        if self.github.api_base_url.trim().is_empty() {
            return Err(configuration("[github].api_base_url must not be empty"));
        }

        Ok(Settings {
            upstream,
            upstream_branch,
            fork,
            fork_default_branch,
            tracking_branch,
            force: self.sync.force,
            baseline: self.tags.baseline,
            snapshot_path: self.tags.snapshot_path.clone(),
            fail_on_mutation: self.tags.fail_on_mutation,
            workflow,
            blocking_severity: self.scan.blocking_severity,
            ambient_login,
            api_base_url: self.github.api_base_url.trim().to_string(),
            request_timeout: seconds("[github].request_timeout_secs", self.github.request_timeout_secs)?,
            sync_interval: seconds("[watch].sync_interval_secs", self.watch.sync_interval_secs)?,
            tags_interval: seconds("[watch].tags_interval_secs", self.watch.tags_interval_secs)?,
            scan_interval: seconds("[watch].scan_interval_secs", self.watch.scan_interval_secs)?,
        })
    }

    /// Builds the credentials selected by `[identity].mode`.
    ///
    /// # Errors
    ///
    /// [`ForkGuardError::MissingCredential`] names the environment variable
    /// that has to be set.
    pub fn credentials(
        &self,
        env: impl Fn(&str) -> Option<String>,
        installation_repo: &RepositoryRef,
    ) -> Result<Credentials, ForkGuardError> {
        let identity = &self.identity;
        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        match identity.mode {
            IdentityMode::Ambient => {
                let token = lookup(&identity.token_env).ok_or_else(|| ForkGuardError::MissingCredential {
                    secret: identity.token_env.clone(),
                })?;
                Ok(Credentials::token(token.trim()))
            }
            IdentityMode::Application => {
                let app_id = identity
                    .app_id
                    .clone()
                    .or_else(|| lookup(&identity.app_id_env))
                    .ok_or_else(|| ForkGuardError::MissingCredential {
                        secret: identity.app_id_env.clone(),
                    })?;

                let pem = match lookup(&identity.private_key_env) {
                    Some(pem) => pem,
                    None => match &identity.private_key_path {
                        Some(path) => std::fs::read_to_string(path).map_err(|e| {
                            configuration(format!("cannot read private key '{}': {e}", path.display()))
                        })?,
                        None => {
                            return Err(ForkGuardError::MissingCredential {
                                secret: identity.private_key_env.clone(),
                            })
                        }
                    },
                };

                Credentials::app(app_id.trim(), &SecretString::from(pem), installation_repo.clone())
                    .map_err(|e| configuration(format!("GitHub App credentials: {e}")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Validated, typed configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub upstream: RepositoryRef,
    pub upstream_branch: BranchName,
    pub fork: RepositoryRef,
    pub fork_default_branch: BranchName,
    pub tracking_branch: BranchName,
    pub force: bool,
    pub baseline: BaselineKind,
    pub snapshot_path: PathBuf,
    pub fail_on_mutation: bool,
    pub workflow: Option<String>,
    pub blocking_severity: Severity,
    pub ambient_login: Login,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub sync_interval: Duration,
    pub tags_interval: Duration,
    pub scan_interval: Duration,
}

impl Settings {
    pub fn sync_config(&self) -> BranchSyncConfig {
        BranchSyncConfig {
            upstream: self.upstream.clone(),
            upstream_branch: self.upstream_branch.clone(),
            fork: self.fork.clone(),
            fork_default_branch: self.fork_default_branch.clone(),
            tracking_branch: self.tracking_branch.clone(),
            force: self.force,
        }
    }

    pub fn tag_config(&self, baseline: BaselineSource) -> TagMonitorConfig {
        TagMonitorConfig {
            upstream: self.upstream.clone(),
            fork: self.fork.clone(),
            baseline,
        }
    }

    pub fn scan_config(&self) -> ScanGateConfig {
        ScanGateConfig {
            repo: self.fork.clone(),
            ambient_login: self.ambient_login.clone(),
            workflow: self.workflow.clone(),
            blocking_severity: self.blocking_severity,
        }
    }
}

fn configuration(message: impl Into<String>) -> ForkGuardError {
    ForkGuardError::Configuration {
        message: message.into(),
    }
}

fn branch(field: &str, value: &str) -> Result<BranchName, ForkGuardError> {
    let value = value.trim();
    if value.contains(char::is_whitespace) || value.starts_with("refs/") {
        return Err(configuration(format!("{field} '{value}' is not a plain branch name")));
    }
    BranchName::new(value).ok_or_else(|| configuration(format!("{field} must not be empty")))
}

fn seconds(field: &str, value: u64) -> Result<Duration, ForkGuardError> {
    if value == 0 {
        return Err(configuration(format!("{field} must be greater than zero")));
    }
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    fn minimal() -> ForkGuardConfig {
        ForkGuardConfig::parse(
            r#"
            [upstream]
            owner = "octo"
            repo = "widgets"

            [fork]
            repository = "me/widgets"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ForkGuardConfig::parse("").unwrap();
        assert_eq!(config.upstream.default_branch, "main");
        assert_eq!(config.fork.tracking_branch, "upstream-sync");
        assert_eq!(config.tags.baseline, BaselineKind::Fork);
        assert!(!config.tags.fail_on_mutation);
        assert_eq!(config.scan.blocking_severity, Severity::High);
        assert_eq!(config.scan.ambient_login, AMBIENT_TOKEN_LOGIN);
        assert_eq!(config.identity.mode, IdentityMode::Ambient);
        assert_eq!(config.identity.token_env, "GITHUB_TOKEN");
        assert_eq!(config.github.request_timeout_secs, 30);
    }

    #[test]
    fn test_full_file_parses() {
        let config = ForkGuardConfig::parse(
            r#"
            [upstream]
            owner = "octo"
            repo = "widgets"
            default_branch = "trunk"

            [fork]
            repository = "me/widgets"
            tracking_branch = "mirror"

            [sync]
            force = true

            [tags]
            baseline = "snapshot"
            snapshot_path = "state/tags.json"
            fail_on_mutation = true

            [scan]
            workflow = "security-scan.yml"
            blocking_severity = "critical"

            [identity]
            mode = "application"
            app_id = "12345"
            private_key_path = "/run/secrets/app.pem"

            [github]
            api_base_url = "https://ghe.example.com/api/v3"
            request_timeout_secs = 10

            [watch]
            sync_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.default_branch, "trunk");
        assert!(config.sync.force);
        assert_eq!(config.tags.baseline, BaselineKind::Snapshot);
        assert_eq!(config.scan.blocking_severity, Severity::Critical);
        assert_eq!(config.identity.mode, IdentityMode::Application);
        assert_eq!(config.watch.sync_interval_secs, 60);
        assert_eq!(config.watch.tags_interval_secs, 3600);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ForkGuardConfig::parse("[sync]\nforce = true\nretries = 3\n").unwrap_err();
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn test_resolve_minimal_config() {
        let settings = minimal().resolve(env(&[])).unwrap();

        assert_eq!(settings.upstream.to_string(), "octo/widgets");
        assert_eq!(settings.fork.to_string(), "me/widgets");
        assert_eq!(settings.upstream_branch.as_str(), "main");
        assert_eq!(settings.tracking_branch.as_str(), "upstream-sync");
        assert!(!settings.force);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));

        let sync = settings.sync_config();
        assert_eq!(sync.fork_default_branch.as_str(), "main");
        let scan = settings.scan_config();
        assert_eq!(scan.repo, settings.fork);
        assert!(scan.workflow.is_none());
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut config = minimal();
        config.apply(&RepoArgs {
            upstream_owner: Some("acme".into()),
            upstream_repo: None,
            default_branch: Some("develop".into()),
            fork: Some("acme-fork/widgets".into()),
            force: true,
        });

        let settings = config.resolve(env(&[])).unwrap();
        assert_eq!(settings.upstream.to_string(), "acme/widgets");
        assert_eq!(settings.upstream_branch.as_str(), "develop");
        assert_eq!(settings.fork.to_string(), "acme-fork/widgets");
        assert!(settings.force);
    }

    #[test]
    fn test_fork_falls_back_to_repository_env() {
        let mut config = minimal();
        config.fork.repository = None;

        let settings = config
            .resolve(env(&[(REPOSITORY_ENV, "ci-owner/widgets")]))
            .unwrap();
        assert_eq!(settings.fork.to_string(), "ci-owner/widgets");

        let err = config.resolve(env(&[])).unwrap_err();
        assert!(matches!(err, ForkGuardError::Configuration { message } if message.contains(REPOSITORY_ENV)));
    }

    #[test]
    fn test_missing_upstream_is_a_configuration_error() {
        let err = ForkGuardConfig::default().resolve(env(&[])).unwrap_err();
        assert!(matches!(err, ForkGuardError::Configuration { message } if message.contains("upstream owner")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = minimal();
        config.fork.tracking_branch = "main".into();
        assert!(config.resolve(env(&[])).is_err());

        let mut config = minimal();
        config.github.request_timeout_secs = 0;
        assert!(config.resolve(env(&[])).is_err());

        let mut config = minimal();
        config.fork.repository = Some("octo/widgets".into());
        assert!(config.resolve(env(&[])).is_err());

        let mut config = minimal();
        config.fork.repository = Some("not-a-repo".into());
        assert!(config.resolve(env(&[])).is_err());

        let mut config = minimal();
        config.scan.workflow = Some("  ".into());
        assert!(config.resolve(env(&[])).is_err());
    }

    #[test]
    fn test_ambient_credentials_require_token() {
        let config = minimal();
        let fork = RepositoryRef::parse("me/widgets").unwrap();

        let err = config.credentials(env(&[]), &fork).unwrap_err();
        assert!(matches!(err, ForkGuardError::MissingCredential { secret } if secret == "GITHUB_TOKEN"));

        let credentials = config
            .credentials(env(&[("GITHUB_TOKEN", "ghs_abc")]), &fork)
            .unwrap();
        assert_eq!(credentials.identity(), model::OriginIdentity::AutomationToken);
    }

    #[test]
    fn test_application_credentials_name_missing_secret() {
        let mut config = minimal();
        config.identity.mode = IdentityMode::Application;
        let fork = RepositoryRef::parse("me/widgets").unwrap();

        let err = config.credentials(env(&[]), &fork).unwrap_err();
        assert!(matches!(err, ForkGuardError::MissingCredential { secret } if secret == "FORKGUARD_APP_ID"));

        let err = config
            .credentials(env(&[("FORKGUARD_APP_ID", "42")]), &fork)
            .unwrap_err();
        assert!(
            matches!(err, ForkGuardError::MissingCredential { secret } if secret == "FORKGUARD_APP_PRIVATE_KEY")
        );
    }

    #[test]
    fn test_application_key_file_must_hold_an_rsa_key() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("app.pem");
        std::fs::write(&key_path, "not a pem").unwrap();

        let mut config = minimal();
        config.identity.mode = IdentityMode::Application;
        config.identity.app_id = Some("42".into());
        config.identity.private_key_path = Some(key_path);
        let fork = RepositoryRef::parse("me/widgets").unwrap();

        let err = config.credentials(env(&[]), &fork).unwrap_err();
        assert!(matches!(err, ForkGuardError::Configuration { message } if message.contains("GitHub App")));
    }

    #[test]
    fn test_unreadable_key_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = minimal();
        config.identity.mode = IdentityMode::Application;
        config.identity.app_id = Some("42".into());
        config.identity.private_key_path = Some(dir.path().join("missing.pem"));
        let fork = RepositoryRef::parse("me/widgets").unwrap();

        let err = config.credentials(env(&[]), &fork).unwrap_err();
        assert!(matches!(err, ForkGuardError::Configuration { message } if message.contains("private key")));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ForkGuardConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ForkGuardError::Configuration { .. }));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upstream]\nowner = \"octo\"\nrepo = \"widgets\"\n").unwrap();

        let config = ForkGuardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.upstream.owner.as_deref(), Some("octo"));
    }
}
