//! Session construction: the multi-step login handshake
//!
//! The target service stores session state split across cookies that only the
//! server can mint, so building an authenticated session is a small state
//! machine rather than a single login call:
//!
//! 1. obtain an access token — directly from the credentials, or by posting
//!    username/password to the login endpoint
//! 2. if the session started from a bare token, fetch the current-user
//!    profile to recover the metadata a password login would have returned
//! 3. register the serialized profile and then the token with the site's
//!    cookie-relay endpoint, capturing the cookie each registration sets
//! 4. join the accumulated cookie jar into one `cookie` header and add the
//!    `token` / `authorization` fields
//!
//! As a side effect the builder also refreshes the versioned per-title JSON
//! path from the homepage's build manifest; the site rotates that segment on
//! every frontend deploy and a stale one silently breaks branch lookups.

use crate::accounts::Credentials;
use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::executor::{CallPurpose, Fetched, RequestExecutor, RequestSpec};
use crate::types::{SessionSnapshot, UserProfile};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

/// An authenticated session: header map plus user identity
///
/// Owned by exactly one account's farming task and passed by reference to
/// every component that issues requests. Mutated only here (and by the
/// builder's title-path refresh); everything else reads it.
#[derive(Clone, Debug)]
pub struct Session {
    /// Request headers sent with every call, cookie string included
    pub headers: HashMap<String, String>,

    /// Authenticated user profile
    pub user: Option<UserProfile>,

    /// Access token in effect
    pub token: Option<String>,

    /// Current per-title JSON path template; `{}` is the title directory slug
    pub title_page_template: String,
}

impl Session {
    /// Rebuilds a session from a persisted snapshot
    pub fn restore(snapshot: &SessionSnapshot, endpoints: &EndpointConfig) -> Self {
        Self {
            headers: snapshot.headers.clone(),
            user: snapshot.user_info.clone(),
            token: snapshot.token.clone(),
            title_page_template: endpoints.title_page_template.clone(),
        }
    }

    /// Username for log lines: the profile's if known
    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    /// Numeric user id, required for bookmark endpoints
    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Absolute URL of the per-title JSON document for a directory slug
    pub fn title_page_url(&self, endpoints: &EndpointConfig, dir: &str) -> String {
        endpoints.site_url(&self.title_page_template.replacen("{}", dir, 1))
    }
}

/// Default header set expected by the service
fn default_headers(endpoints: &EndpointConfig) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("user-agent".into(), "okhttp".into());
    headers.insert("refer".into(), endpoints.site_base.clone());
    headers.insert("content-type".into(), "application/json".into());
    headers.insert("origin".into(), endpoints.site_base.clone());
    headers.insert("agesubmitted".into(), "true".into());
    headers.insert("x-nextjs-data".into(), "1".into());
    headers
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    content: UserProfile,
}

/// Builds authenticated sessions for one set of credentials
pub struct SessionBuilder<'a> {
    executor: &'a RequestExecutor,
    endpoints: &'a EndpointConfig,
    credentials: &'a Credentials,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a builder
    pub fn new(
        executor: &'a RequestExecutor,
        endpoints: &'a EndpointConfig,
        credentials: &'a Credentials,
    ) -> Self {
        Self {
            executor,
            endpoints,
            credentials,
        }
    }

    /// Runs the full login handshake and returns a ready session
    ///
    /// Fails with [`Error::Config`] before any network call if the
    /// credentials are unusable, and with an auth error if the login endpoint
    /// rejects them.
    pub async fn build(&self) -> Result<Session> {
        self.check_credentials()?;

        let mut headers = default_headers(self.endpoints);
        let mut cookie_jar = vec!["agesubmitted=true;".to_string()];
        let mut profile: Option<UserProfile> = None;

        // An empty token field (e.g. a trailing colon in the account line)
        // falls back to a password login rather than being sent as-is.
        let supplied_token = self.credentials.token().filter(|t| !t.is_empty());
        let access_token = match supplied_token {
            Some(token) => token.to_string(),
            None => self.password_login(&headers, &mut cookie_jar, &mut profile).await?,
        };

        cookie_jar.push(format!("token={access_token};"));
        headers.insert("token".into(), access_token.clone());
        headers.insert("authorization".into(), format!("bearer {access_token}"));

        // A pre-issued token skipped the login response, so the profile
        // metadata has to come from the current-user endpoint instead.
        if supplied_token.is_some() {
            profile = Some(self.fetch_current_user(&headers).await?);
        }

        let mut profile = profile.ok_or_else(|| Error::UnexpectedResponse {
            endpoint: self.endpoints.login_url(),
            message: "login produced no user profile".into(),
        })?;
        profile
            .extra
            .insert("token".into(), json!(access_token.clone()));

        self.register_server_user(&headers, &mut cookie_jar, &profile)
            .await?;
        self.register_server_token(&headers, &mut cookie_jar, &access_token)
            .await?;

        headers.insert("cookie".into(), cookie_jar.join(" "));

        let mut session = Session {
            headers,
            user: Some(profile),
            token: Some(access_token),
            title_page_template: self.endpoints.title_page_template.clone(),
        };
        self.refresh_title_page(&mut session).await?;

        info!(username = session.username().unwrap_or("<token>"), "successful login");
        Ok(session)
    }

    /// Re-reads the homepage build manifest and updates the per-title path
    ///
    /// Called at the end of every build, and separately after a cache restore
    /// (the cached path may predate a frontend deploy).
    pub async fn refresh_title_page(&self, session: &mut Session) -> Result<()> {
        let spec = RequestSpec::get(
            self.endpoints.site_url(""),
            CallPurpose::Interactive,
        );
        let response = required(
            self.executor.execute(&session.headers, spec).await?,
            &self.endpoints.site_base,
        )?;
        let body = response.text().await?;

        if let Some(build_id) = extract_build_id(&body) {
            let refreshed = with_build_id(&session.title_page_template, build_id);
            info!(path = %refreshed, "refreshed title page path");
            session.title_page_template = refreshed;
        }
        Ok(())
    }

    fn check_credentials(&self) -> Result<()> {
        let has_password_pair = matches!(
            (self.credentials.username(), self.credentials.password()),
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty()
        );
        let has_token = self.credentials.token().is_some_and(|t| !t.is_empty());

        if has_password_pair || has_token {
            Ok(())
        } else {
            Err(Error::Config {
                message: "no auth credentials, provide username/password or a token".into(),
                key: Some("credentials".into()),
            })
        }
    }

    /// `Unauthenticated -> TokenAcquired` via the login endpoint
    ///
    /// Pushes the serialized profile and the login set-cookie pair onto the
    /// jar and returns the access token from the response body.
    async fn password_login(
        &self,
        headers: &HashMap<String, String>,
        cookie_jar: &mut Vec<String>,
        profile: &mut Option<UserProfile>,
    ) -> Result<String> {
        let url = self.endpoints.login_url();
        let payload = json!({
            "user": self.credentials.username(),
            "password": self.credentials.password(),
            "g-recaptcha-response": "WITHOUT_TOKEN",
        });
        let spec = RequestSpec::post(&url, CallPurpose::Interactive)
            .json(payload)
            .login_context();

        let response = required(self.executor.execute(headers, spec).await?, &url)?;
        let (cookie_name, cookie_value) = unpack_cookie(&response, &url)?;

        let envelope: ProfileEnvelope = response.json().await?;
        let content = envelope.content;

        cookie_jar.push(format!(
            "serverUser={};",
            serde_json::to_string(&content)?
        ));
        cookie_jar.push(format!("{cookie_name}={cookie_value};"));

        let token = content.access_token.clone().ok_or_else(|| {
            Error::UnexpectedResponse {
                endpoint: url,
                message: "login content carried no access_token".into(),
            }
        })?;
        *profile = Some(content);
        Ok(token)
    }

    /// `TokenAcquired -> ServerUserRegistered` prerequisite for bare tokens
    async fn fetch_current_user(
        &self,
        headers: &HashMap<String, String>,
    ) -> Result<UserProfile> {
        let url = self.endpoints.current_user_url();
        let spec = RequestSpec::get(&url, CallPurpose::Interactive).login_context();
        let response = required(self.executor.execute(headers, spec).await?, &url)?;
        let envelope: ProfileEnvelope = response.json().await?;
        Ok(envelope.content)
    }

    /// Registers the serialized profile with the cookie relay
    ///
    /// The relay mirrors the value into a server-managed cookie; the captured
    /// pair is pushed twice, once under its server name and once as `user`.
    async fn register_server_user(
        &self,
        headers: &HashMap<String, String>,
        cookie_jar: &mut Vec<String>,
        profile: &UserProfile,
    ) -> Result<()> {
        let serialized = serde_json::to_string(profile)?;
        let (name, value) = self.relay_cookie(headers, "serverUser", json!(serialized)).await?;
        cookie_jar.push(format!("{name}={value}"));
        cookie_jar.push(format!("user={value}"));
        Ok(())
    }

    /// `ServerUserRegistered -> ServerTokenRegistered`
    async fn register_server_token(
        &self,
        headers: &HashMap<String, String>,
        cookie_jar: &mut Vec<String>,
        access_token: &str,
    ) -> Result<()> {
        let (name, value) = self
            .relay_cookie(headers, "serverToken", json!(access_token))
            .await?;
        cookie_jar.push(format!("{name}={value};"));
        Ok(())
    }

    async fn relay_cookie(
        &self,
        headers: &HashMap<String, String>,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(String, String)> {
        let url = self.endpoints.cookie_relay_url();
        let payload = json!([{
            "key": key,
            "value": value,
            "options": {"httpOnly": true},
        }]);
        let spec = RequestSpec::post(&url, CallPurpose::Interactive).json(payload);
        let response = required(self.executor.execute(headers, spec).await?, &url)?;
        unpack_cookie(&response, &url)
    }
}

/// Maps an absent executor result to an error; session setup has no "next
/// cycle" to fall back to, so absence here aborts the account's startup.
fn required(fetched: Fetched, endpoint: &str) -> Result<Response> {
    fetched.into_response().ok_or_else(|| Error::UnexpectedResponse {
        endpoint: endpoint.to_string(),
        message: "no response within the retry budget".into(),
    })
}

/// Splits a response's `set-cookie` header into its first name/value pair
fn unpack_cookie(response: &Response, endpoint: &str) -> Result<(String, String)> {
    let header = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: "response carried no set-cookie header".into(),
        })?;

    let first = header.split(';').next().unwrap_or_default();
    let (name, value) = first.split_once('=').ok_or_else(|| Error::UnexpectedResponse {
        endpoint: endpoint.to_string(),
        message: format!("malformed set-cookie fragment: {first}"),
    })?;
    Ok((name.to_string(), value.to_string()))
}

/// Finds the frontend build id in the homepage HTML/JS
///
/// The homepage references `/_next/static/<build>/_buildManifest.js`; the
/// build id is the fourth path segment of that reference.
fn extract_build_id(body: &str) -> Option<&str> {
    body.split_whitespace()
        .find(|token| token.contains("_buildManifest.js"))
        .and_then(|token| token.split('/').nth(3))
}

/// Replaces the build segment (fourth path component) of a title-page template
fn with_build_id(template: &str, build_id: &str) -> String {
    let mut segments: Vec<&str> = template.split('/').collect();
    if segments.len() > 3 {
        segments[3] = build_id;
    }
    segments.join("/")
}
