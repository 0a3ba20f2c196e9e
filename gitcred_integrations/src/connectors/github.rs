//! GitHub page transport.
//!
//! Fetches one page of a repository's pull requests from the GitHub REST API
//! v3. One call, one attempt: the retry contract is applied by the core's
//! `RetryingFetcher`, and this transport's job is to map protocol failures
//! onto the error taxonomy (401/403 to `Auth`, everything transient to
//! `Upstream`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitcred_core::models::{Contribution, ContributionState, RepoRef};
use gitcred_core::sync::models::{PageRequest, SortKey};
use gitcred_core::sync::traits::PageTransport;
use gitcred_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Author login recorded for pull requests whose account was deleted.
const DELETED_ACCOUNT_LOGIN: &str = "ghost";

#[derive(Debug, Deserialize, Clone)]
struct GithubPull {
    number: u64,
    state: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GithubUser>,
    #[serde(rename = "created_at")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Clone)]
struct GithubUser {
    login: String,
}

#[derive(Clone)]
pub struct GithubTransport {
    client: Client,
    api_base: String,
    token: String,
}

impl GithubTransport {
    pub fn new(token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");

        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        }
    }

    /// Point the transport at a different API host (GitHub Enterprise, test
    /// doubles).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static("gitcred"));
        h.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        let auth = format!("Bearer {}", self.token);
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| Error::Auth(format!("invalid github auth header: {e}")))?,
        );
        Ok(h)
    }

    /// GitHub's pulls endpoint has no number sort; creation order is number
    /// order, so `Number` maps to `sort=created`.
    fn query_params(request: &PageRequest) -> [(&'static str, String); 5] {
        let sort = match request.sort {
            SortKey::Number => "created",
            SortKey::Updated => "updated",
        };
        [
            ("state", "all".to_string()),
            ("sort", sort.to_string()),
            ("direction", request.direction.as_str().to_string()),
            ("per_page", request.per_page.to_string()),
            ("page", request.page.to_string()),
        ]
    }

    fn map_pull(repo: &RepoRef, pull: GithubPull) -> Result<Contribution> {
        let author = pull
            .user
            .map(|u| u.login)
            .filter(|login| !login.trim().is_empty())
            .unwrap_or_else(|| DELETED_ACCOUNT_LOGIN.to_string());
        // The pulls payload reports merged PRs as "closed"; merged_at is the
        // authoritative signal.
        let state = if pull.merged_at.is_some() {
            ContributionState::Merged
        } else if pull.state == "open" {
            ContributionState::Open
        } else {
            ContributionState::Closed
        };

        Contribution::new(
            repo.clone(),
            pull.number,
            state,
            pull.title,
            pull.body,
            author,
            pull.created_at,
            pull.updated_at,
            pull.merged_at,
        )
    }

    fn status_error(status: StatusCode, body: &str) -> Error {
        let detail = Self::truncate_for_error(body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(format!(
                "github rejected the token ({status}): {detail}"
            )),
            _ => Error::UpstreamMessage(format!("github responded {status}: {detail}")),
        }
    }

    fn truncate_for_error(body: &str) -> String {
        const MAX_LEN: usize = 200;
        if body.chars().count() <= MAX_LEN {
            body.to_owned()
        } else {
            format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
        }
    }
}

#[async_trait]
impl PageTransport for GithubTransport {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, repo: &RepoRef, request: &PageRequest) -> Result<Vec<Contribution>> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.api_base, repo.owner, repo.name
        );

        let resp = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .query(&Self::query_params(request))
            .send()
            .await
            .map_err(Error::upstream_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::status_error(status, &body));
        }

        let pulls: Vec<GithubPull> = resp.json().await.map_err(Error::upstream_reqwest)?;
        pulls
            .into_iter()
            .map(|pull| Self::map_pull(repo, pull))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitcred_core::sync::models::SortDirection;

    fn repo() -> RepoRef {
        RepoRef::new("octo", "credits").expect("repo ref")
    }

    fn sample_pull(json: serde_json::Value) -> GithubPull {
        serde_json::from_value(json).expect("pull payload")
    }

    #[test]
    fn number_sort_maps_to_created() {
        let request = PageRequest::new(3, 50, SortKey::Number, SortDirection::Asc)
            .expect("request");
        let params = GithubTransport::query_params(&request);
        assert!(params.contains(&("sort", "created".to_string())));
        assert!(params.contains(&("direction", "asc".to_string())));
        assert!(params.contains(&("per_page", "50".to_string())));
        assert!(params.contains(&("page", "3".to_string())));
    }

    #[test]
    fn merged_at_overrides_the_reported_state() {
        let pull = sample_pull(serde_json::json!({
            "number": 7,
            "state": "closed",
            "title": "Expand the sync engine",
            "user": {"login": "alice"},
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "merged_at": "2026-01-02T00:00:00Z",
        }));
        let contribution = GithubTransport::map_pull(&repo(), pull).expect("contribution");
        assert_eq!(contribution.state, ContributionState::Merged);
        assert_eq!(contribution.author, "alice");
        assert!(contribution.merged_at.is_some());
    }

    #[test]
    fn unmerged_states_pass_through() {
        let open = sample_pull(serde_json::json!({
            "number": 8,
            "state": "open",
            "title": "WIP",
            "user": {"login": "bob"},
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }));
        assert_eq!(
            GithubTransport::map_pull(&repo(), open).expect("open").state,
            ContributionState::Open
        );

        let closed = sample_pull(serde_json::json!({
            "number": 9,
            "state": "closed",
            "title": "Abandoned",
            "user": {"login": "bob"},
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }));
        assert_eq!(
            GithubTransport::map_pull(&repo(), closed).expect("closed").state,
            ContributionState::Closed
        );
    }

    #[test]
    fn deleted_accounts_fall_back_to_ghost() {
        let pull = sample_pull(serde_json::json!({
            "number": 10,
            "state": "open",
            "title": "Orphaned",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        }));
        let contribution = GithubTransport::map_pull(&repo(), pull).expect("contribution");
        assert_eq!(contribution.author, DELETED_ACCOUNT_LOGIN);
    }

    #[test]
    fn auth_statuses_are_terminal_and_server_faults_are_retryable() {
        let unauthorized =
            GithubTransport::status_error(StatusCode::UNAUTHORIZED, "bad credentials");
        assert!(matches!(unauthorized, Error::Auth(_)));
        assert!(!unauthorized.is_retryable());

        let forbidden = GithubTransport::status_error(StatusCode::FORBIDDEN, "saml enforced");
        assert!(matches!(forbidden, Error::Auth(_)));

        let unavailable =
            GithubTransport::status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert!(unavailable.is_retryable());

        let rate_limited =
            GithubTransport::status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(rate_limited.is_retryable());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(500);
        let err = GithubTransport::status_error(StatusCode::BAD_GATEWAY, &body);
        let text = err.to_string();
        assert!(text.len() < 300);
        assert!(text.contains("..."));
    }
}
