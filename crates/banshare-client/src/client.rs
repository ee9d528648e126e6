//! Main registry client implementation.

use crate::api::{ListApi, PushApi, ReleaseApi};
use banshare_core::{Result, RetryConfig, ShareError};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry API client
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    token: String,
    base_url: Url,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Create a client with default settings
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        RegistryClientBuilder::new(base_url, token).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(base_url: &str, token: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(base_url, token)
    }

    /// Access the push endpoint
    #[must_use]
    pub const fn push(&self) -> PushApi<'_> {
        PushApi::new(self)
    }

    /// Access the list endpoints
    #[must_use]
    pub const fn list(&self) -> ListApi<'_> {
        ListApi::new(self)
    }

    /// Access the release endpoint
    #[must_use]
    pub const fn release(&self) -> ReleaseApi<'_> {
        ReleaseApi::new(self)
    }

    /// The registry base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Perform a GET request with query parameters
    #[instrument(skip(self, params), level = "debug")]
    pub(crate) async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = self.build_url(path, params)?;
        self.execute(path, || self.inner.http.get(url.clone())).await
    }

    /// Perform a POST request with JSON body
    #[instrument(skip(self, body), level = "debug")]
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.build_url(path, &[])?;
        self.execute(path, || self.inner.http.post(url.clone()).json(body))
            .await
    }

    /// Send a request, retrying transient failures with backoff
    async fn execute<T, F>(&self, path: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let retry = &self.inner.retry_config;
        let mut attempt = 0;
        loop {
            match self.send_once(path, build()).await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(&e, attempt) => {
                    let backoff = match &e {
                        ShareError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs).min(retry.max_backoff),
                        _ => retry.backoff_for(attempt),
                    };
                    attempt += 1;
                    warn!(
                        path,
                        attempt,
                        max = retry.max_retries,
                        error = %e,
                        "registry request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn should_retry(&self, error: &ShareError, attempt: u32) -> bool {
        let retry = &self.inner.retry_config;
        if attempt >= retry.max_retries || !error.is_retryable() {
            return false;
        }
        !matches!(error, ShareError::RateLimited { .. }) || retry.retry_on_rate_limit
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        debug!(path, "registry request");
        let response = request
            .bearer_auth(&self.inner.token)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        self.handle_response(path, response).await
    }

    /// Build a URL with query parameters
    fn build_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ShareError::InvalidUrl(format!("{path}: {e}")))?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn transport_error(&self, error: &reqwest::Error) -> ShareError {
        if error.is_timeout() {
            ShareError::Timeout(self.inner.timeout.as_secs())
        } else if error.is_connect() {
            ShareError::Connection(error.to_string())
        } else {
            ShareError::Http(error.to_string())
        }
    }

    /// Handle an API response that returns JSON
    async fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| self.transport_error(&e))?;
            serde_json::from_str(&body).map_err(|e| ShareError::Malformed(format!("{path}: {e}")))
        } else {
            Self::handle_error(status, response).await
        }
    }

    /// Convert an error response to a [`ShareError`]
    async fn handle_error<T>(status: StatusCode, response: reqwest::Response) -> Result<T> {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        // Registry errors come back as {"error": "..."} or {"detail": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("detail"))
                    .and_then(|e| e.as_str())
                    .map(String::from)
            })
            .unwrap_or(body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ShareError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ShareError::NotFound { resource: message }),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(?retry_after, "rate limited by registry");
                Err(ShareError::RateLimited { retry_after })
            }
            _ => Err(ShareError::Api {
                code: status.as_u16(),
                message,
            }),
        }
    }
}

/// Builder for configuring a [`RegistryClient`]
pub struct RegistryClientBuilder {
    base_url: String,
    token: String,
    timeout: Duration,
    user_agent: String,
    retry_config: RetryConfig,
}

impl RegistryClientBuilder {
    /// Create a new builder for the given registry and token
    #[must_use]
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.to_string(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("banshare/{}", env!("CARGO_PKG_VERSION")),
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set retry configuration
    #[must_use]
    pub const fn retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RegistryClient> {
        // A trailing slash makes relative joins append instead of replace.
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| ShareError::InvalidUrl(format!("{base}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ShareError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }
        if self.token.trim().is_empty() {
            return Err(ShareError::Config("registry token must not be empty".into()));
        }

        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| ShareError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(RegistryClient {
            inner: Arc::new(ClientInner {
                http,
                token: self.token,
                base_url,
                timeout: self.timeout,
                retry_config: self.retry_config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banshare_core::{PushRequest, PushResponse};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry(max: u32) -> RetryConfig {
        RetryConfig::new()
            .max_retries(max)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        assert!(matches!(
            RegistryClient::new("not a url", "t"),
            Err(ShareError::InvalidUrl(_))
        ));
        assert!(matches!(
            RegistryClient::new("ftp://example.com", "t"),
            Err(ShareError::InvalidUrl(_))
        ));
        assert!(matches!(
            RegistryClient::new("http://example.com", " "),
            Err(ShareError::Config(_))
        ));
    }

    #[test]
    fn test_build_url_keeps_prefix() {
        let client = RegistryClient::new("http://example.com/api", "t").unwrap();
        let url = client
            .build_url("/get_ips", &[("page", "2".into()), ("search_ip", "10.0".into())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.com/api/get_ips?page=2&search_ip=10.0"
        );
    }

    #[tokio::test]
    async fn test_bearer_token_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted_count": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri(), "secret").unwrap();
        let response: PushResponse = client
            .post("/add_ips", &PushRequest::new(vec!["10.0.0.1".into()]))
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 1);
    }

    #[tokio::test]
    async fn test_error_statuses_mapped() {
        let server = MockServer::start().await;
        Mock::given(path("/unauthorized"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "no such ip"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = RegistryClient::builder(&server.uri(), "t")
            .retry(RetryConfig::none())
            .build()
            .unwrap();

        let err = client
            .get_with_query::<PushResponse>("/unauthorized", &[])
            .await
            .unwrap_err();
        assert!(err.is_auth_error());

        let err = client
            .get_with_query::<PushResponse>("/missing", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotFound { resource } if resource == "no such ip"));

        let err = client
            .get_with_query::<PushResponse>("/busy", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::RateLimited { retry_after: Some(7) }));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted_count": 1,
                "surprise": true
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri(), "t").unwrap();
        let err = client
            .post::<PushResponse, _>("/add_ips", &PushRequest::new(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted_count": 3
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::builder(&server.uri(), "t")
            .retry(fast_retry(3))
            .build()
            .unwrap();
        let response: PushResponse = client
            .post("/add_ips", &PushRequest::new(vec!["10.0.0.1".into()]))
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let client = RegistryClient::builder(&server.uri(), "t")
            .retry(fast_retry(2))
            .build()
            .unwrap();
        let err = client
            .post::<PushResponse, _>("/add_ips", &PushRequest::new(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add_ips"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "ips must not be empty"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::builder(&server.uri(), "t")
            .retry(fast_retry(3))
            .build()
            .unwrap();
        let err = client
            .post::<PushResponse, _>("/add_ips", &PushRequest::new(vec![]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ShareError::Api { code: 400, ref message } if message == "ips must not be empty")
        );
    }

    /// Serve one truncated response, then a complete one, on a raw socket.
    fn truncated_then_ok() -> (String, std::thread::JoinHandle<usize>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let responses = [
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\nconnection: close\r\n\r\n{\"accepted",
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 20\r\nconnection: close\r\n\r\n{\"accepted_count\":2}",
            ];
            let mut served = 0;
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0_u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                stream.write_all(response.as_bytes()).unwrap();
                served += 1;
            }
            served
        });
        (uri, handle)
    }

    #[test]
    fn test_http_failure_is_retryable() {
        let client = RegistryClient::builder("http://example.com", "t")
            .retry(fast_retry(2))
            .build()
            .unwrap();
        let reset = ShareError::Http("connection reset by peer".into());
        assert!(client.should_retry(&reset, 0));
        assert!(!client.should_retry(&reset, 2));
    }

    #[tokio::test]
    async fn test_truncated_body_retried() {
        let (uri, server) = truncated_then_ok();
        let client = RegistryClient::builder(&uri, "t")
            .retry(fast_retry(3))
            .build()
            .unwrap();

        let response: PushResponse = client.get_with_query("/add_ips", &[]).await.unwrap();
        assert_eq!(response.accepted_count, 2);
        assert_eq!(server.join().unwrap(), 2);
    }
}
