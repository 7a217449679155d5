use searxng_mcp_core::{Error, Query, Result, ResultSet, SearchBackend};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8888";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Backend calls must not hang indefinitely. Keep the ceiling bounded even if callers
/// configure something huge.
pub fn clamp_timeout_ms(ms: u64) -> u64 {
    ms.clamp(1_000, 120_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn base_url_from_env() -> String {
    env("SEARXNG_MCP_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

pub fn timeout_ms_from_env() -> u64 {
    clamp_timeout_ms(
        env("SEARXNG_MCP_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS),
    )
}

pub fn default_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("searxng-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}

/// Backend gateway for a single SearXNG instance (`POST {base}/search`, `format=json`).
#[derive(Debug, Clone)]
pub struct SearxngClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl SearxngClient {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Self::endpoint_search_for(base_url);
        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| Error::NotConfigured(format!("invalid SearXNG url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::NotConfigured(format!(
                "SearXNG url must be http(s): {base_url}"
            )));
        }
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        Self::new(
            client,
            &base_url_from_env(),
            Duration::from_millis(timeout_ms_from_env()),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint_search_for(base_url: &str) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = base_url.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            base = DEFAULT_BASE_URL.to_string();
        }
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }

    pub fn form_fields(q: &Query) -> Vec<(&'static str, String)> {
        let mut form = vec![("q", q.text.clone()), ("format", "json".to_string())];
        if let Some(lang) = q.language.as_deref().filter(|s| !s.is_empty()) {
            form.push(("language", lang.to_string()));
        }
        if let Some(tr) = q.time_range {
            form.push(("time_range", tr.as_str().to_string()));
        }
        if let Some(cats) = q.categories_param() {
            form.push(("categories", cats));
        }
        if q.page > 0 {
            form.push(("pageno", q.page.to_string()));
        }
        form
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Transport(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            Error::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for SearxngClient {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &Query) -> Result<ResultSet> {
        if q.text.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        let t0 = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Forwarded-For", "127.0.0.1")
            .header("X-Real-IP", "127.0.0.1")
            .form(&Self::form_fields(q))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), endpoint = %self.endpoint, "searxng returned non-success status");
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let rs = ResultSet::from_json_slice(&body)?;
        tracing::debug!(
            results = rs.results.len(),
            total = rs.number_of_results,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "searxng search ok"
        );
        Ok(rs)
    }
}
