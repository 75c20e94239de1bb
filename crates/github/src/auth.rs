//! Credential strategies.
//!
//! Two identities are supported:
//!
//! - **Token**: a static bearer token, normally the workflow's ambient
//!   automation token. Pull requests it opens do not start further automation.
//! - **App**: a GitHub App installation. Installation tokens are minted on
//!   demand with an RS256-signed JWT and cached until shortly before expiry.
//!   Pull requests the App opens start automation like any other event.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use model::{HostError, OriginIdentity, RepositoryRef};
use reqwest::{Client as HttpClient, Method, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{decode, ensure_success, transport_error};

/// Installation tokens are refreshed once they have less than this left.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Failures while preparing App credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("GitHub App id must not be empty")]
    EmptyAppId,

    #[error("invalid GitHub App private key: {0}")]
    InvalidPrivateKey(String),

    #[error("could not sign GitHub App JWT: {0}")]
    Signing(String),

    #[error("system clock is before the Unix epoch")]
    Clock,
}

impl From<AuthError> for HostError {
    fn from(error: AuthError) -> Self {
        HostError::Unauthorized {
            message: error.to_string(),
        }
    }
}

/// How requests are authenticated.
pub enum Credentials {
    Token(SecretString),
    App(AppCredentials),
}

impl Credentials {
    /// Static bearer token credentials.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(SecretString::from(token.into()))
    }

    /// GitHub App credentials for the installation on `installation_repo`.
    ///
    /// # Errors
    ///
    /// Fails if the app id is empty or the key is not an RSA PEM key. The key
    /// is parsed here so a bad secret is reported at startup.
    pub fn app(
        app_id: impl Into<String>,
        private_key_pem: &SecretString,
        installation_repo: RepositoryRef,
    ) -> Result<Self, AuthError> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(AuthError::EmptyAppId);
        }
        let key = EncodingKey::from_rsa_pem(private_key_pem.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::App(AppCredentials {
            app_id,
            key,
            installation_repo,
            cached: Mutex::new(None),
        }))
    }

    /// Identity the platform attributes our writes to.
    pub fn identity(&self) -> OriginIdentity {
        match self {
            Self::Token(_) => OriginIdentity::AutomationToken,
            Self::App(_) => OriginIdentity::InstalledApplication,
        }
    }

    /// Returns a bearer token valid for the next request.
    pub(crate) async fn bearer(
        &self,
        http: &HttpClient,
        api_base: &str,
    ) -> Result<SecretString, HostError> {
        match self {
            Self::Token(token) => Ok(SecretString::from(token.expose_secret().to_owned())),
            Self::App(app) => app.installation_token(http, api_base).await,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credentials::Token([REDACTED])"),
            Self::App(app) => write!(
                f,
                "Credentials::App {{ app_id: {}, installation_repo: {} }}",
                app.app_id, app.installation_repo
            ),
        }
    }
}

/// A GitHub App identity plus its cached installation token.
pub struct AppCredentials {
    app_id: String,
    key: EncodingKey,
    installation_repo: RepositoryRef,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AppCredentials {
    async fn installation_token(
        &self,
        http: &HttpClient,
        api_base: &str,
    ) -> Result<SecretString, HostError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if current.expires_at - Utc::now() > ChronoDuration::minutes(REFRESH_MARGIN_MINUTES) {
                return Ok(SecretString::from(current.token.expose_secret().to_owned()));
            }
        }

        let jwt = self.jwt(unix_now()?)?;
        let repo = &self.installation_repo;
        let installation: Installation = app_request(
            http,
            Method::GET,
            &format!("{api_base}/repos/{}/{}/installation", repo.owner(), repo.name()),
            &jwt,
        )
        .await?;
        debug!(installation = installation.id, %repo, "Resolved GitHub App installation");

        let minted: InstallationToken = app_request(
            http,
            Method::POST,
            &format!("{api_base}/app/installations/{}/access_tokens", installation.id),
            &jwt,
        )
        .await?;
        info!(app_id = %self.app_id, expires_at = %minted.expires_at, "Minted installation token");

        let token = SecretString::from(minted.token);
        let bearer = SecretString::from(token.expose_secret().to_owned());
        *cached = Some(CachedToken {
            token,
            expires_at: minted.expires_at,
        });
        Ok(bearer)
    }

    /// Signs the short-lived JWT that authenticates as the App itself.
    fn jwt(&self, now: u64) -> Result<String, AuthError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iat: u64,
            exp: u64,
            iss: &'a str,
        }

        // Backdated for clock drift; GitHub rejects lifetimes over ten minutes.
        let claims = Claims {
            iat: now.saturating_sub(60),
            exp: now + 540,
            iss: &self.app_id,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

async fn app_request<T: serde::de::DeserializeOwned>(
    http: &HttpClient,
    method: Method,
    url: &str,
    jwt: &str,
) -> Result<T, HostError> {
    let url = Url::parse(url).map_err(|e| HostError::Malformed {
        message: format!("invalid request URL '{url}': {e}"),
    })?;
    let response = http
        .request(method, url)
        .bearer_auth(jwt)
        .send()
        .await
        .map_err(transport_error)?;
    decode(ensure_success(response).await?).await
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| AuthError::Clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryRef {
        RepositoryRef::parse("me/widgets").unwrap()
    }

    #[test]
    fn test_token_credentials_act_as_automation_token() {
        let creds = Credentials::token("ghs_example");
        assert_eq!(creds.identity(), OriginIdentity::AutomationToken);
        assert_eq!(format!("{creds:?}"), "Credentials::Token([REDACTED])");
    }

    #[test]
    fn test_app_credentials_reject_invalid_pem() {
        let key = SecretString::from("not a pem".to_string());
        let err = Credentials::app("12345", &key, repo()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_app_credentials_reject_empty_id() {
        let key = SecretString::from("not a pem".to_string());
        let err = Credentials::app("  ", &key, repo()).unwrap_err();
        assert!(matches!(err, AuthError::EmptyAppId));
    }

    #[test]
    fn test_auth_errors_surface_as_unauthorized() {
        let host: HostError = AuthError::InvalidPrivateKey("bad base64".into()).into();
        assert!(matches!(host, HostError::Unauthorized { message } if message.contains("bad base64")));
    }

    #[tokio::test]
    async fn test_static_token_is_returned_as_bearer() {
        let creds = Credentials::token("ghs_example");
        let bearer = creds
            .bearer(&HttpClient::new(), "https://api.github.invalid")
            .await
            .unwrap();
        assert_eq!(bearer.expose_secret(), "ghs_example");
    }
}
