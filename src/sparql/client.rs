//! HTTP client for SPARQL SELECT queries.
//!
//! The endpoint is consumed at its narrowest useful surface: submit a query
//! string, get back a table of named-column bindings. Response parsing uses
//! internal wire structs that mirror the SPARQL JSON results format exactly.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot DBpedia endpoint (last released version).
pub const DBPEDIA_ENDPOINT: &str = "https://dbpedia.org/sparql";

/// Live DBpedia endpoint.
pub const DBPEDIA_LIVE_ENDPOINT: &str = "https://dbpedia-live.openlinksw.com/sparql";

/// User agent string for all endpoint requests.
const CLIENT_USER_AGENT: &str = concat!("vagueplaces/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Maximum error-body length included in diagnostics.
const MAX_ERROR_BODY: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types (match the SPARQL JSON results format exactly)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireSelectResponse {
    results: WireResults,
}

#[derive(Debug, Deserialize)]
struct WireResults {
    bindings: Vec<Binding>,
}

/// One value cell of a binding. The wire format also carries `type` and
/// `datatype` fields; only `value` is consumed here.
#[derive(Debug, Clone, Deserialize)]
pub struct BindingValue {
    /// The cell's lexical value.
    pub value: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// One row of a query result: a mapping from column name to a value cell.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Binding(HashMap<String, BindingValue>);

impl Binding {
    /// Returns the value of the named column, if bound in this row.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(|cell| cell.value.as_str())
    }

    /// Builds a binding from `(column, value)` pairs. Test/support helper.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), BindingValue { value: v.into() }))
                .collect(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SparqlClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for executing SELECT queries against a SPARQL endpoint.
#[derive(Clone)]
pub struct SparqlClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Endpoint URL requests are issued against.
    endpoint: Url,
    /// Whether this client targets the live endpoint.
    live: bool,
}

impl SparqlClient {
    /// Creates a client against the snapshot or live DBpedia endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(live: bool) -> Result<Self, AppError> {
        let endpoint = if live {
            DBPEDIA_LIVE_ENDPOINT
        } else {
            DBPEDIA_ENDPOINT
        };
        let mut client = Self::with_endpoint(endpoint)?;
        client.live = live;
        Ok(client)
    }

    /// Creates a client against an arbitrary endpoint URL.
    ///
    /// Used for mirrors and for tests that point at a local fake.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidQuery` for an unparseable URL and
    /// `AppError::Internal` if the HTTP client fails to initialize.
    pub fn with_endpoint(endpoint: &str) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::InvalidQuery(format!("Invalid endpoint URL: {}", e)))?;
        Ok(Self {
            http: build_http_client()?,
            endpoint,
            live: false,
        })
    }

    /// Whether this client targets the live endpoint.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Executes one SELECT query and returns the result bindings.
    ///
    /// Issues `GET <endpoint>?query=<q>&format=json` and parses the SPARQL
    /// JSON results table. An empty binding list is a valid result, not an
    /// error.
    ///
    /// # Errors
    ///
    /// - `AppError::ConnectionFailed` - transport failure
    /// - `AppError::SparqlError` - non-2xx endpoint response
    /// - `AppError::MalformedResponse` - body is not a SPARQL result table
    pub async fn select(&self, query: &str) -> Result<Vec<Binding>, AppError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("format", "json");

        debug!(path = url.path(), "issuing SELECT request");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("SPARQL request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::SparqlError(format!(
                "HTTP {} - {}",
                status.as_u16(),
                truncate(&body, MAX_ERROR_BODY)
            )));
        }

        let wire: WireSelectResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::MalformedResponse(format!(
                "{} (body starts: {})",
                e,
                truncate(&body, MAX_ERROR_BODY)
            ))
        })?;

        Ok(wire.results.bindings)
    }
}

/// Truncates a diagnostic string on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Builds the shared HTTP client with timeout and user agent.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
