//! REST client for repository recency, file fetch, and snapshot download.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use pomwatch_shared::{GithubConfig, PomwatchError, RepoSlug, Result};
use reqwest::{Client, Response, header, redirect};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// User agent for API requests; GitHub rejects requests without one.
const USER_AGENT: &str = concat!("pomwatch/", env!("CARGO_PKG_VERSION"));

/// Media type for JSON API responses.
const MEDIA_TYPE_JSON: &str = "application/vnd.github+json";

/// Media type that returns file contents raw instead of base64-wrapped JSON.
const MEDIA_TYPE_RAW: &str = "application/vnd.github.raw";

/// `Last-Modified` format, e.g. `Mon, 15 Jan 2024 10:00:00 GMT`.
const LAST_MODIFIED_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Client for the GitHub REST API.
///
/// A missing access token is logged but not fatal; unauthenticated calls
/// work until the anonymous rate limit is hit.
pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    viewer: OnceCell<String>,
}

impl GithubClient {
    /// Build a client from config, reading the token from the configured
    /// environment variable.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            warn!(
                var = %config.token_env,
                "github access token not set; unauthenticated requests are heavily rate limited"
            );
        }
        Self::with_token(&config.api_url, token)
    }

    /// Build a client against an explicit API base URL with an explicit token.
    pub fn with_token(api_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PomwatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            viewer: OnceCell::new(),
        })
    }

    /// Normalize a repository identifier into `owner/name` form.
    ///
    /// Accepts a full git URL, an `owner/name` pair, or a bare repository
    /// name (qualified with the authenticated user's login). A single
    /// trailing `.git` suffix is stripped, and `org` overrides the owner
    /// segment; text before a final `:` in the owner is dropped.
    /// Already-normalized input resolves to itself.
    pub async fn resolve(&self, identifier: &str, org: Option<&str>) -> Result<RepoSlug> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(PomwatchError::validation(
                "not a valid repository: empty identifier",
            ));
        }
        let stripped = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let segments: Vec<&str> = stripped.split('/').collect();

        let name = segments[segments.len() - 1];
        let owner = match org {
            Some(owner) => strip_owner_prefix(owner).to_string(),
            None if segments.len() == 1 => self.viewer_login().await?,
            None => strip_owner_prefix(segments[segments.len() - 2]).to_string(),
        };

        if owner.is_empty() || name.is_empty() {
            return Err(PomwatchError::validation(format!(
                "not a valid repository: {identifier:?}"
            )));
        }
        Ok(RepoSlug::new(owner, name))
    }

    /// When the repository was last touched, from the `Last-Modified` header.
    pub async fn last_modified(&self, repo: &str, org: Option<&str>) -> Result<DateTime<Utc>> {
        let slug = self.resolve(repo, org).await?;
        let context = format!("repository {slug}");
        let response = self
            .get(&format!("/repos/{slug}"))
            .header(header::ACCEPT, MEDIA_TYPE_JSON)
            .send()
            .await
            .map_err(|e| PomwatchError::Network(format!("{context}: {e}")))?;
        let response = Self::check_status(&context, response).await?;

        let value = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PomwatchError::parse(format!("no Last-Modified header for {slug}")))?;
        parse_last_modified(&value)
    }

    /// Whether the repository was modified within the last `days` days.
    /// The window is inclusive: exactly `days` days ago still counts.
    pub async fn is_recently_modified(
        &self,
        repo: &str,
        days: i64,
        org: Option<&str>,
    ) -> Result<bool> {
        let last = self.last_modified(repo, org).await?;
        let recent = within_window(last, Utc::now(), days);
        debug!(repo, last_modified = %last, days, recent, "recency check");
        Ok(recent)
    }

    /// Fetch one file from a repository at a ref, decoded as UTF-8 text.
    /// `None` (or an empty ref) reads from the default branch.
    pub async fn fetch_file(
        &self,
        repo: &str,
        filename: &str,
        git_ref: Option<&str>,
    ) -> Result<String> {
        let slug = self.resolve(repo, None).await?;
        let context = format!("{filename} in {slug}");
        let mut request = self
            .get(&format!("/repos/{slug}/contents/{filename}"))
            .header(header::ACCEPT, MEDIA_TYPE_RAW);
        if let Some(r) = git_ref.filter(|r| !r.is_empty()) {
            request = request.query(&[("ref", r)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PomwatchError::Network(format!("{context}: {e}")))?;
        let response = Self::check_status(&context, response).await?;
        response
            .text()
            .await
            .map_err(|e| PomwatchError::Network(format!("{context}: {e}")))
    }

    /// Download a zip snapshot of the repository tree at `git_ref`.
    /// Returns the short repository name together with the archive bytes.
    pub async fn clone_snapshot(&self, repo: &str, git_ref: &str) -> Result<(String, Bytes)> {
        let slug = self.resolve(repo, None).await?;
        let context = format!("snapshot of {slug} at {git_ref}");
        let response = self
            .get(&format!("/repos/{slug}/zipball/{git_ref}"))
            .send()
            .await
            .map_err(|e| PomwatchError::Network(format!("{context}: {e}")))?;
        let response = Self::check_status(&context, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PomwatchError::Network(format!("{context}: {e}")))?;
        info!(repo = %slug, git_ref, bytes = bytes.len(), "downloaded repository snapshot");
        Ok((slug.name, bytes))
    }

    /// Login of the authenticated user, fetched once and cached.
    async fn viewer_login(&self) -> Result<String> {
        let login = self
            .viewer
            .get_or_try_init(|| async {
                debug!("fetching authenticated user login");
                let response = self
                    .get("/user")
                    .header(header::ACCEPT, MEDIA_TYPE_JSON)
                    .send()
                    .await
                    .map_err(|e| PomwatchError::Network(format!("authenticated user: {e}")))?;
                let response = Self::check_status("authenticated user", response).await?;
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| PomwatchError::parse(format!("user response: {e}")))?;
                body.get("login")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| PomwatchError::parse("user response missing login"))
            })
            .await?;
        Ok(login.clone())
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(format!("{}{path}", self.api_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Map a non-success API status onto the pomwatch error taxonomy.
    async fn check_status(context: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status.as_u16() {
            401 => PomwatchError::BadCredentials(format!(
                "github rejected the access token ({context})"
            )),
            403 | 429 => {
                PomwatchError::RateLimited(format!("github api limit reached ({context})"))
            }
            404 => PomwatchError::NotFound(context.to_string()),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                PomwatchError::Network(format!("{context}: HTTP {status}: {snippet}"))
            }
        })
    }
}

/// Owner segments may carry a `prefix:` (ssh shorthand); keep the last part.
fn strip_owner_prefix(owner: &str) -> &str {
    owner.rsplit(':').next().unwrap_or(owner)
}

fn parse_last_modified(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LAST_MODIFIED_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| PomwatchError::parse(format!("invalid Last-Modified date {value:?}: {e}")))
}

fn within_window(last_modified: DateTime<Utc>, now: DateTime<Utc>, days: i64) -> bool {
    (now - last_modified).num_days() <= days
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GithubClient {
        GithubClient::with_token(&server.uri(), Some("test-token".into())).expect("client")
    }

    fn offline_client() -> GithubClient {
        GithubClient::with_token("http://127.0.0.1:1", Some("test-token".into())).expect("client")
    }

    // -----------------------------------------------------------------------
    // Identifier resolution
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn resolve_full_url() {
        let slug = offline_client()
            .resolve("https://github.com/acme/widget", None)
            .await
            .expect("resolve");
        assert_eq!(slug, RepoSlug::new("acme", "widget"));
    }

    #[tokio::test]
    async fn resolve_strips_git_suffix() {
        let client = offline_client();
        let with_suffix = client
            .resolve("https://github.com/acme/widget.git", None)
            .await
            .expect("resolve");
        let without = client
            .resolve("https://github.com/acme/widget", None)
            .await
            .expect("resolve");
        assert_eq!(with_suffix, without);
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let client = offline_client();
        let first = client.resolve("acme/widget", None).await.expect("resolve");
        let second = client
            .resolve(&first.to_string(), None)
            .await
            .expect("resolve");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn resolve_org_override_replaces_owner() {
        let slug = offline_client()
            .resolve("https://github.com/acme/widget", Some("other"))
            .await
            .expect("resolve");
        assert_eq!(slug, RepoSlug::new("other", "widget"));
    }

    #[tokio::test]
    async fn resolve_owner_keeps_text_after_colon() {
        let client = offline_client();
        let overridden = client
            .resolve("acme/widget", Some("git@github.com:other"))
            .await
            .expect("resolve");
        assert_eq!(overridden, RepoSlug::new("other", "widget"));

        let ssh_style = client
            .resolve("git@github.com:acme/widget.git", None)
            .await
            .expect("resolve");
        assert_eq!(ssh_style, RepoSlug::new("acme", "widget"));
    }

    #[tokio::test]
    async fn resolve_bare_name_uses_viewer_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octo" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let slug = client.resolve("widget", None).await.expect("resolve");
        assert_eq!(slug, RepoSlug::new("octo", "widget"));

        // Second resolution must reuse the cached login (expect(1) above).
        let again = client.resolve("gadget", None).await.expect("resolve");
        assert_eq!(again, RepoSlug::new("octo", "gadget"));
    }

    #[tokio::test]
    async fn resolve_rejects_empty_identifier() {
        let err = offline_client()
            .resolve("  ", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::Validation { .. }));
    }

    #[tokio::test]
    async fn resolve_rejects_empty_segments() {
        let err = offline_client()
            .resolve("/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::Validation { .. }));
    }

    // -----------------------------------------------------------------------
    // Recency
    // -----------------------------------------------------------------------

    #[test]
    fn window_is_inclusive_at_the_boundary() {
        let now = Utc::now();
        assert!(within_window(now - chrono::Duration::days(31), now, 31));
        assert!(!within_window(now - chrono::Duration::days(32), now, 31));
        assert!(within_window(now, now, 31));
    }

    #[test]
    fn last_modified_header_parses() {
        let parsed = parse_last_modified("Mon, 15 Jan 2024 10:00:00 GMT").expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2024-01-15T10:00:00+00:00");

        let err = parse_last_modified("yesterday").expect_err("should fail");
        assert!(matches!(err, PomwatchError::Parse { .. }));
    }

    #[tokio::test]
    async fn last_modified_reads_repository_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", "Mon, 15 Jan 2024 10:00:00 GMT")
                    .set_body_json(json!({ "full_name": "acme/widget" })),
            )
            .mount(&server)
            .await;

        let last = client_for(&server)
            .last_modified("https://github.com/acme/widget", None)
            .await
            .expect("last_modified");
        assert_eq!(last.to_rfc3339(), "2024-01-15T10:00:00+00:00");
    }

    #[tokio::test]
    async fn missing_last_modified_header_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .last_modified("acme/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::Parse { .. }));
    }

    #[tokio::test]
    async fn is_recently_modified_with_fresh_repo() {
        let server = MockServer::start().await;
        let fresh = (Utc::now() - chrono::Duration::days(1))
            .format(LAST_MODIFIED_FORMAT)
            .to_string();
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", fresh.as_str())
                    .set_body_json(json!({})),
            )
            .mount(&server)
            .await;

        let recent = client_for(&server)
            .is_recently_modified("acme/widget", 31, None)
            .await
            .expect("recency");
        assert!(recent);
    }

    // -----------------------------------------------------------------------
    // Status mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unauthorized_maps_to_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .last_modified("acme/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::BadCredentials(_)));
    }

    #[tokio::test]
    async fn forbidden_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .last_modified("acme/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn missing_repo_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .last_modified("acme/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_network_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .last_modified("acme/widget", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::Network(_)));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    // -----------------------------------------------------------------------
    // File fetch and snapshots
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fetch_file_requests_raw_content_at_ref() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/contents/pom.xml"))
            .and(query_param("ref", "v1"))
            .and(header("Accept", MEDIA_TYPE_RAW))
            .respond_with(ResponseTemplate::new(200).set_body_string("<project/>"))
            .expect(1)
            .mount(&server)
            .await;

        let content = client_for(&server)
            .fetch_file("https://github.com/acme/widget", "pom.xml", Some("v1"))
            .await
            .expect("fetch");
        assert_eq!(content, "<project/>");
    }

    #[tokio::test]
    async fn fetch_file_without_ref_uses_default_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/contents/pom.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<project/>"))
            .mount(&server)
            .await;

        // An empty ref is treated like no ref at all.
        let content = client_for(&server)
            .fetch_file("acme/widget", "pom.xml", Some(""))
            .await
            .expect("fetch");
        assert_eq!(content, "<project/>");
    }

    #[tokio::test]
    async fn missing_file_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/contents/pom.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_file("acme/widget", "pom.xml", None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, PomwatchError::NotFound(_)));
        assert!(err.to_string().contains("pom.xml"));
    }

    #[tokio::test]
    async fn clone_snapshot_returns_name_and_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/zipball/master"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04fake".to_vec()))
            .mount(&server)
            .await;

        let (name, bytes) = client_for(&server)
            .clone_snapshot("https://github.com/acme/widget", "master")
            .await
            .expect("snapshot");
        assert_eq!(name, "widget");
        assert_eq!(&bytes[..], b"PK\x03\x04fake");
    }
}
