//! Request executor with status-code-driven bounded retries
//!
//! Every remote call in the crate goes through [`RequestExecutor::execute`].
//! Each attempt's response is classified into a tagged [`Disposition`] and a
//! generic bounded-retry driver decides what happens next:
//!
//! - `200`/`204` return the response immediately
//! - `429`/`501`/`503` are transient and retried without backoff
//! - `404` surfaces as [`Fetched::NotFound`] — an absent resource, not a bug
//! - `401`/`400` in a login context abort immediately with an auth error
//! - anything else is logged with its body text and retried
//!
//! Transport failures (timeouts, resets, decode errors) are logged and
//! retried like any other retryable outcome. Terminal auth failures and
//! transient overload never share a code path: the first kind must fail fast,
//! the second kind must be hammered through.
//!
//! The attempt ceiling depends on the call's [`CallPurpose`]: interactive
//! setup calls give up quickly, background farming calls tolerate long
//! outages. Exhausting the ceiling is not an error — it returns
//! [`Fetched::Exhausted`] and the caller decides whether to skip or drop.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Why a call is being made, which selects its attempt ceiling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPurpose {
    /// Login and session setup; fails fast enough for a human to notice
    Interactive,
    /// Unattended catalog/chapter/view traffic; grinds through long outages
    Background,
}

impl CallPurpose {
    /// Attempt ceiling for this purpose under the given retry policy
    pub fn attempt_budget(self, retry: &RetryConfig) -> u32 {
        match self {
            CallPurpose::Interactive => retry.interactive_attempts,
            CallPurpose::Background => retry.background_attempts,
        }
    }
}

/// Outcome of an executed call
///
/// `NotFound` and `Exhausted` are both "absent result" to callers, but they
/// are kept distinct: a 404 means the resource genuinely does not exist,
/// while exhaustion means the next cycle should try again.
#[derive(Debug)]
pub enum Fetched {
    /// The call succeeded
    Ok(Response),
    /// The server answered 404; the resource does not exist
    NotFound,
    /// The attempt budget ran out without a success
    Exhausted,
}

impl Fetched {
    /// The successful response, if any
    pub fn into_response(self) -> Option<Response> {
        match self {
            Fetched::Ok(response) => Some(response),
            Fetched::NotFound | Fetched::Exhausted => None,
        }
    }
}

/// Per-attempt classification of a response status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Disposition {
    /// 200/204 — return the response
    Success,
    /// 429/501/503 — server overload, retry immediately
    Transient,
    /// 404 — terminal absent
    NotFound,
    /// 401 in a login context — the token is bad, bail now
    InvalidToken,
    /// 400 in a login context — the username/token pair is bad, bail now
    InvalidCredentials,
    /// Any other status — log with body text and retry
    Retryable,
}

fn classify(status: StatusCode, login_context: bool) -> Disposition {
    match status.as_u16() {
        200 | 204 => Disposition::Success,
        429 | 501 | 503 => Disposition::Transient,
        404 => Disposition::NotFound,
        401 if login_context => Disposition::InvalidToken,
        400 if login_context => Disposition::InvalidCredentials,
        _ => Disposition::Retryable,
    }
}

/// One call to execute, with everything the retry driver needs to know
#[derive(Debug)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Query string pairs
    pub query: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<serde_json::Value>,
    /// Which attempt ceiling applies
    pub purpose: CallPurpose,
    /// Whether 401/400 mean bad credentials rather than a generic failure
    pub login_context: bool,
}

impl RequestSpec {
    /// GET request with the given purpose
    pub fn get(url: impl Into<String>, purpose: CallPurpose) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
            purpose,
            login_context: false,
        }
    }

    /// POST request with the given purpose
    pub fn post(url: impl Into<String>, purpose: CallPurpose) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            body: None,
            purpose,
            login_context: false,
        }
    }

    /// Adds a query string pair
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets the JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Marks this call as a login-context call (401/400 become auth-fatal)
    pub fn login_context(mut self) -> Self {
        self.login_context = true;
        self
    }
}

/// HTTP request executor shared by every component of a farming task
///
/// Wraps the underlying transport (an opaque [`reqwest::Client`]) and the
/// retry policy. Headers are per-call because the session owns them and they
/// change as the login handshake progresses.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    client: Client,
    retry: RetryConfig,
}

impl RequestExecutor {
    /// Creates an executor with the given retry policy
    pub fn new(retry: RetryConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, retry })
    }

    /// Executes one call under the bounded retry loop
    ///
    /// Returns `Err` only for terminal auth failures; every transient
    /// condition is absorbed here. Transient and retryable attempts both
    /// count toward the purpose's budget.
    pub async fn execute(
        &self,
        headers: &HashMap<String, String>,
        spec: RequestSpec,
    ) -> Result<Fetched> {
        let budget = spec.purpose.attempt_budget(&self.retry);
        let header_map = build_header_map(headers);
        let mut attempts = 0u32;

        while attempts < budget {
            let mut request = self
                .client
                .request(spec.method.clone(), &spec.url)
                .headers(header_map.clone());
            if !spec.query.is_empty() {
                request = request.query(&spec.query);
            }
            if let Some(body) = &spec.body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    error!(url = %spec.url, method = %spec.method, error = %e, "transport failure");
                    attempts += 1;
                    continue;
                }
            };

            let status = response.status();
            match classify(status, spec.login_context) {
                Disposition::Success => {
                    debug!(url = %spec.url, method = %spec.method, status = %status, "request ok");
                    return Ok(Fetched::Ok(response));
                }
                Disposition::Transient => {
                    debug!(url = %spec.url, method = %spec.method, status = %status, "transient status, retrying");
                    attempts += 1;
                }
                Disposition::NotFound => {
                    debug!(url = %spec.url, method = %spec.method, "resource not found");
                    return Ok(Fetched::NotFound);
                }
                Disposition::InvalidToken => {
                    return Err(Error::InvalidToken {
                        token: headers.get("token").cloned().unwrap_or_default(),
                    });
                }
                Disposition::InvalidCredentials => {
                    return Err(Error::InvalidCredentials {
                        username: spec
                            .body
                            .as_ref()
                            .and_then(|b| b.get("user"))
                            .and_then(|u| u.as_str())
                            .map(str::to_string),
                        token: headers.get("token").cloned(),
                    });
                }
                Disposition::Retryable => {
                    let text = response.text().await.unwrap_or_default();
                    error!(
                        url = %spec.url,
                        method = %spec.method,
                        status = %status,
                        text = %text,
                        "unexpected status, retrying"
                    );
                    attempts += 1;
                }
            }
        }

        warn!(url = %spec.url, method = %spec.method, budget, "retry budget exhausted");
        Ok(Fetched::Exhausted)
    }
}

/// Converts the session's string header map into a reqwest header map
///
/// Entries with invalid names or values (control characters and the like)
/// are dropped with a warning rather than failing the whole call.
fn build_header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid header entry"),
        }
    }
    map
}
