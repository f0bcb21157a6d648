//! HTTP fetch client.
//!
//! This module provides the HTTP-based [`FetchClient`] for the Export API.
//! The actual HTTP library is abstracted via [`HttpClient`] so tests can
//! script responses; [`ReqwestClient`] is the production implementation.

use crate::config::SyncConfig;
use crate::credentials::TokenProvider;
use crate::error::{SyncError, SyncResult};
use crate::transport::FetchClient;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use rollsync_model::{decode_batch, Collection, RemoteRecord};
use thiserror::Error;
use tracing::debug;

/// Longest slice of an error body kept in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the start of the body as text, for error messages.
    pub fn body_excerpt(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(BODY_EXCERPT_LEN).collect()
    }
}

/// An HTTP exchange that did not produce a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// The request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a GET with a bearer credential.
    fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, HttpFailure>;

    /// Sends a form-encoded POST.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, HttpFailure>;
}

impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, HttpFailure> {
        (**self).get(url, bearer)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, HttpFailure> {
        (**self).post_form(url, form)
    }
}

/// [`HttpClient`] over `reqwest`'s blocking client.
///
/// Every request is bounded by [`SyncConfig::timeout`].
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client from the sync configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn finish(
        result: Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> Result<HttpResponse, HttpFailure> {
        let response = result.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(classify)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn classify(err: reqwest::Error) -> HttpFailure {
    if err.is_timeout() {
        HttpFailure::Timeout(err.to_string())
    } else if err.is_connect() {
        HttpFailure::Connect(err.to_string())
    } else {
        HttpFailure::Other(err.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, HttpFailure> {
        Self::finish(
            self.client
                .get(url)
                .bearer_auth(bearer)
                .header(ACCEPT, "application/json")
                .send(),
        )
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, HttpFailure> {
        Self::finish(
            self.client
                .post(url)
                .header(ACCEPT, "application/json")
                .form(form)
                .send(),
        )
    }
}

/// Export API fetch client.
///
/// Issues `GET {base_url}{endpoint}?ts={since}` with a bearer credential from
/// the [`TokenProvider`] and maps the outcome onto the sync error taxonomy.
pub struct HttpFetchClient<C: HttpClient, P: TokenProvider> {
    base_url: String,
    client: C,
    tokens: P,
}

impl<C: HttpClient, P: TokenProvider> HttpFetchClient<C, P> {
    /// Creates a new fetch client.
    pub fn new(base_url: impl Into<String>, client: C, tokens: P) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }

    /// Returns the URL fetched for `collection` at `since`.
    pub fn url_for(&self, collection: Collection, since: i64) -> String {
        format!("{}{}?ts={}", self.base_url, collection.endpoint(), since)
    }

    fn fetch_inner(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>> {
        let token = self.tokens.token()?;
        let url = self.url_for(collection, since);

        let response = self
            .client
            .get(&url, &token)
            .map_err(|e| SyncError::TransientFetch(format!("{}: {e}", collection.endpoint())))?;

        if response.is_success() {
            return Ok(decode_batch(collection, &response.body)?);
        }
        match response.status {
            401 | 403 => Err(SyncError::Auth(format!(
                "{} returned {}",
                collection.endpoint(),
                response.status
            ))),
            400..=499 => Err(SyncError::Request {
                status: response.status,
                message: response.body_excerpt(),
            }),
            500..=599 => Err(SyncError::TransientFetch(format!(
                "{} returned {}",
                collection.endpoint(),
                response.status
            ))),
            other => Err(SyncError::Protocol(format!(
                "{} returned unexpected status {other}",
                collection.endpoint()
            ))),
        }
    }
}

impl<C: HttpClient, P: TokenProvider> FetchClient for HttpFetchClient<C, P> {
    fn fetch(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>> {
        debug!(%collection, since, "fetching batch");
        let records = self.fetch_inner(collection, since)?;
        debug!(%collection, count = records.len(), "batch received");
        Ok(records)
    }

    fn refresh_credentials(&self) -> SyncResult<()> {
        self.tokens.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticToken;
    use parking_lot::Mutex;
    use rollsync_model::RecordKey;

    struct TestClient {
        response: Mutex<Result<HttpResponse, HttpFailure>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl TestClient {
        fn new(response: Result<HttpResponse, HttpFailure>) -> Self {
            Self {
                response: Mutex::new(response),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn status(status: u16, body: &str) -> Self {
            Self::new(Ok(HttpResponse::new(status, body.as_bytes())))
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, HttpFailure> {
            self.requests.lock().push((url.to_string(), bearer.to_string()));
            self.response.lock().clone()
        }

        fn post_form(&self, _url: &str, _form: &[(&str, &str)]) -> Result<HttpResponse, HttpFailure> {
            Err(HttpFailure::Other("not scripted".into()))
        }
    }

    fn fetcher(client: TestClient) -> HttpFetchClient<TestClient, StaticToken> {
        HttpFetchClient::new("https://export.example.com/", client, StaticToken::new("t0k"))
    }

    #[test]
    fn builds_url_and_sends_bearer() {
        let fetcher = fetcher(TestClient::status(200, "[]"));
        let records = fetcher.fetch(Collection::Resources, 1727267733).unwrap();
        assert!(records.is_empty());

        let requests = fetcher.client.requests.lock().clone();
        assert_eq!(
            requests,
            vec![(
                "https://export.example.com/GetResources?ts=1727267733".to_string(),
                "t0k".to_string()
            )]
        );
        assert_eq!(
            fetcher.url_for(Collection::ActivityEvents, 0),
            "https://export.example.com/GetUserActivityEvents?ts=0"
        );
    }

    #[test]
    fn decodes_successful_batch() {
        let fetcher = fetcher(TestClient::status(
            200,
            r#"[{"resourceId":"a","format":"Video","ts":1727890123,"deleted":false}]"#,
        ));
        let records = fetcher.fetch(Collection::Resources, 1727267733).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), RecordKey::Resource("a".into()));
    }

    #[test]
    fn maps_auth_statuses() {
        for status in [401, 403] {
            let fetcher = fetcher(TestClient::status(status, ""));
            let err = fetcher.fetch(Collection::Resources, 0).unwrap_err();
            assert!(matches!(err, SyncError::Auth(_)), "status {status}");
        }
    }

    #[test]
    fn maps_other_client_errors_to_request() {
        let fetcher = fetcher(TestClient::status(400, "ts must be numeric"));
        let err = fetcher.fetch(Collection::ActivityEvents, 0).unwrap_err();
        match err {
            SyncError::Request { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "ts must be numeric");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn any_2xx_is_decoded() {
        let fetcher = fetcher(TestClient::status(203, "[]"));
        assert!(fetcher.fetch(Collection::Resources, 0).unwrap().is_empty());
    }

    #[test]
    fn informational_and_redirect_statuses_are_protocol_errors() {
        for status in [101, 302] {
            let fetcher = fetcher(TestClient::status(status, ""));
            let err = fetcher.fetch(Collection::Resources, 0).unwrap_err();
            assert!(matches!(err, SyncError::Protocol(_)), "status {status}");
        }
    }

    #[test]
    fn maps_server_errors_to_transient() {
        let fetcher = fetcher(TestClient::status(503, "maintenance"));
        let err = fetcher.fetch(Collection::Resources, 0).unwrap_err();
        assert!(matches!(err, SyncError::TransientFetch(_)));
    }

    #[test]
    fn maps_transport_failures_to_transient() {
        for failure in [
            HttpFailure::Timeout("30s".into()),
            HttpFailure::Connect("refused".into()),
        ] {
            let fetcher = fetcher(TestClient::new(Err(failure)));
            let err = fetcher.fetch(Collection::Resources, 0).unwrap_err();
            assert!(matches!(err, SyncError::TransientFetch(_)));
        }
    }

    #[test]
    fn malformed_body_is_protocol_error() {
        let fetcher = fetcher(TestClient::status(200, "<html>oops</html>"));
        let err = fetcher.fetch(Collection::Resources, 0).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn body_excerpt_is_bounded() {
        let response = HttpResponse::new(400, "x".repeat(1000));
        assert_eq!(response.body_excerpt().len(), BODY_EXCERPT_LEN);
        assert!(!response.is_success());
        assert!(HttpResponse::new(204, "").is_success());
    }
}
