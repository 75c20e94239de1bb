//! HTTP plumbing shared by every port implementation.
//!
//! [`GithubClient`] owns the `reqwest` client, resolves a bearer token for
//! each request, follows `Link` pagination, and maps non-success responses to
//! [`HostError`]. The port implementations in the sibling modules only build
//! paths and convert wire types.

use std::time::Duration;

use model::{HostError, OriginIdentity, RepositoryRef};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK, RETRY_AFTER};
use reqwest::{Client as HttpClient, Method, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::Credentials;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("forkguard/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: &str = "100";

/// Client for the GitHub REST API.
///
/// Implements every port trait in the `model` crate. Cheap to share behind an
/// `Arc`; each request resolves its own bearer token.
#[derive(Debug)]
pub struct GithubClient {
    http: HttpClient,
    api_base: String,
    credentials: Credentials,
}

impl GithubClient {
    /// Creates a client.
    ///
    /// `timeout` bounds every request end to end, so a stalled call fails the
    /// run instead of hanging it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Identity that pull requests and comments created by this client carry.
    pub fn identity(&self) -> OriginIdentity {
        self.credentials.identity()
    }

    /// Builds an absolute URL for `path` with encoded query parameters.
    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, HostError> {
        let raw = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| HostError::Malformed {
            message: format!("invalid request URL '{raw}': {e}"),
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, HostError> {
        let response = self.send(Method::GET, url, None::<&()>).await?;
        decode(response).await
    }

    /// GETs `url`, treating 404 as absence.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Option<T>, HostError> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(HostError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GETs every page of a list endpoint.
    pub(crate) async fn get_all<T: DeserializeOwned>(&self, mut url: Url) -> Result<Vec<T>, HostError> {
        url.query_pairs_mut().append_pair("per_page", PAGE_SIZE);
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let response = self.send(Method::GET, url, None::<&()>).await?;
            next = next_link(response.headers())
                .map(|link| {
                    Url::parse(&link).map_err(|e| HostError::Malformed {
                        message: format!("invalid pagination link '{link}': {e}"),
                    })
                })
                .transpose()?;
            let page: Vec<T> = decode(response).await?;
            items.extend(page);
        }
        Ok(items)
    }

    pub(crate) async fn send_json<T, B>(&self, method: Method, url: Url, body: &B) -> Result<T, HostError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, url, Some(body)).await?;
        decode(response).await
    }

    /// Sends a request whose response body is ignored.
    pub(crate) async fn send_empty<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<(), HostError>
    where
        B: Serialize + ?Sized,
    {
        self.send(method, url, body).await.map(drop)
    }

    async fn send<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Response, HostError>
    where
        B: Serialize + ?Sized,
    {
        let token = self.credentials.bearer(&self.http, &self.api_base).await?;
        debug!(%method, path = url.path(), "GitHub request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        ensure_success(response).await
    }
}

/// `repos/{owner}/{name}/{rest}`.
pub(crate) fn repo_path(repo: &RepositoryRef, rest: &str) -> String {
    format!("repos/{}/{}/{rest}", repo.owner(), repo.name())
}

/// Passes successful responses through and converts the rest to [`HostError`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let resource = response.url().path().to_string();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    let error = error_for_status(status, &headers, &resource, &body);
    warn!(status = status.as_u16(), %resource, error = %error, "GitHub request failed");
    Err(error)
}

pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, HostError> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| HostError::Malformed {
        message: e.to_string(),
    })
}

pub(crate) fn transport_error(error: reqwest::Error) -> HostError {
    HostError::Transport {
        message: error.to_string(),
    }
}

/// Maps a non-success status to a [`HostError`].
///
/// GitHub signals rate limiting with 403 or 429 plus rate-limit headers; a
/// bare 403 is a permission problem.
pub(crate) fn error_for_status(
    status: StatusCode,
    headers: &HeaderMap,
    resource: &str,
    body: &str,
) -> HostError {
    let message = api_message(body);
    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if is_rate_limited(status, headers) => {
            HostError::RateLimited {
                retry_after: retry_after(headers),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostError::Unauthorized { message },
        StatusCode::NOT_FOUND => HostError::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => HostError::Conflict { message },
        other => HostError::Unexpected {
            status: other.as_u16(),
            message,
        },
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || headers.contains_key(RETRY_AFTER)
        || header_str(headers, "x-ratelimit-remaining") == Some("0")
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset: i64 = header_str(headers, "x-ratelimit-reset")?.parse().ok()?;
    let wait = reset - chrono::Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(0).unsigned_abs()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extracts the `message` field of a GitHub error body, falling back to the raw text.
fn api_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }
    match serde_json::from_str::<ApiError>(body) {
        Ok(e) => e.message,
        Err(_) if body.is_empty() => "no response body".to_string(),
        Err(_) => body.chars().take(200).collect(),
    }
}

/// Returns the `rel="next"` target of a `Link` header, if any.
pub(crate) fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        Some(
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string(),
        )
    })
}
