//! Configuration types for remanga-farmer
//!
//! Everything the farming loop treats as data rather than protocol lives
//! here: the endpoint map (the service rotates parts of it, so nothing is a
//! compile-time constant), the retry ceilings keyed by call purpose, the
//! farming cadence, and the cache location.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for a farming run
///
/// Deserializable from JSON with every field defaulted, so an empty `{}`
/// yields a working configuration pointed at the production service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint map
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Retry ceilings for the request executor
    #[serde(default)]
    pub retry: RetryConfig,

    /// Farming loop cadence and catalog paging
    #[serde(default)]
    pub farming: FarmingConfig,

    /// Directory holding per-account cache snapshots (default: "./data")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            retry: RetryConfig::default(),
            farming: FarmingConfig::default(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Remote endpoint map
///
/// Exact paths are configuration data, not protocol: the versioned title-page
/// template in particular rotates whenever the site ships a new frontend
/// build, and the session builder refreshes it at startup (see
/// [`crate::session`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the JSON API (default: "https://api.remanga.org/api")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL of the site itself (default: "https://remanga.org")
    #[serde(default = "default_site_base")]
    pub site_base: String,

    /// Login endpoint (POST, username/password)
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Current-user profile endpoint (GET, bearer auth)
    #[serde(default = "default_current_user_path")]
    pub current_user_path: String,

    /// Per-type bookmark count endpoint; `{}` is replaced by the user id
    #[serde(default = "default_bookmark_counts_path")]
    pub bookmark_counts_path: String,

    /// Bookmark listing endpoint; `{}` is replaced by the user id
    #[serde(default = "default_bookmarks_path")]
    pub bookmarks_path: String,

    /// Catalog search endpoint
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Chapter listing endpoint (by branch id)
    #[serde(default = "default_chapters_path")]
    pub chapters_path: String,

    /// View submission endpoint (POST)
    #[serde(default = "default_views_path")]
    pub views_path: String,

    /// Cookie relay endpoint on the site host; mirrors a posted value into a
    /// server-managed cookie
    #[serde(default = "default_cookie_relay_path")]
    pub cookie_relay_path: String,

    /// Versioned per-title JSON document path; `{}` is replaced by the title
    /// directory slug. Refreshed at session build time from the homepage's
    /// build manifest, so the default only has to be close enough to start.
    #[serde(default = "default_title_page_template")]
    pub title_page_template: String,
}

impl EndpointConfig {
    /// Absolute URL for an API path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Absolute URL for a site path
    pub fn site_url(&self, path: &str) -> String {
        format!("{}{}", self.site_base, path)
    }

    /// Login endpoint URL
    pub fn login_url(&self) -> String {
        self.api_url(&self.login_path)
    }

    /// Current-user endpoint URL
    pub fn current_user_url(&self) -> String {
        self.api_url(&self.current_user_path)
    }

    /// Bookmark-count endpoint URL for a user id
    pub fn bookmark_counts_url(&self, user_id: i64) -> String {
        self.api_url(&self.bookmark_counts_path.replacen("{}", &user_id.to_string(), 1))
    }

    /// Bookmark listing endpoint URL for a user id
    pub fn bookmarks_url(&self, user_id: i64) -> String {
        self.api_url(&self.bookmarks_path.replacen("{}", &user_id.to_string(), 1))
    }

    /// Catalog search endpoint URL
    pub fn catalog_url(&self) -> String {
        self.api_url(&self.catalog_path)
    }

    /// Chapter listing endpoint URL
    pub fn chapters_url(&self) -> String {
        self.api_url(&self.chapters_path)
    }

    /// View submission endpoint URL
    pub fn views_url(&self) -> String {
        self.api_url(&self.views_path)
    }

    /// Cookie relay endpoint URL
    pub fn cookie_relay_url(&self) -> String {
        self.site_url(&self.cookie_relay_path)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            site_base: default_site_base(),
            login_path: default_login_path(),
            current_user_path: default_current_user_path(),
            bookmark_counts_path: default_bookmark_counts_path(),
            bookmarks_path: default_bookmarks_path(),
            catalog_path: default_catalog_path(),
            chapters_path: default_chapters_path(),
            views_path: default_views_path(),
            cookie_relay_path: default_cookie_relay_path(),
            title_page_template: default_title_page_template(),
        }
    }
}

/// Retry ceilings for the request executor, keyed by call purpose
///
/// Interactive calls (login handshake, profile fetch) fail fast enough for a
/// human to notice; background calls (catalog, chapters, views) run
/// unattended for long stretches and are allowed to grind through extended
/// transient outages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt ceiling for interactive (login/setup) calls (default: 30)
    #[serde(default = "default_interactive_attempts")]
    pub interactive_attempts: u32,

    /// Attempt ceiling for background (farming) calls (default: 400)
    #[serde(default = "default_background_attempts")]
    pub background_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interactive_attempts: default_interactive_attempts(),
            background_attempts: default_background_attempts(),
        }
    }
}

/// Farming loop cadence and catalog paging
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FarmingConfig {
    /// Catalog entries requested per page (default: 3000)
    #[serde(default = "default_catalog_page_size")]
    pub catalog_page_size: u32,

    /// Catalog ordering key (default: "id")
    #[serde(default = "default_order_by")]
    pub order_by: String,

    /// Idle sleep between farming cycles (default: 20 seconds)
    #[serde(default = "default_idle_sleep", with = "duration_serde")]
    pub idle_sleep: Duration,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            catalog_page_size: default_catalog_page_size(),
            order_by: default_order_by(),
            idle_sleep: default_idle_sleep(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_api_base() -> String {
    "https://api.remanga.org/api".to_string()
}

fn default_site_base() -> String {
    "https://remanga.org".to_string()
}

fn default_login_path() -> String {
    "/users/login/".to_string()
}

fn default_current_user_path() -> String {
    "/v2/users/current".to_string()
}

fn default_bookmark_counts_path() -> String {
    "/users/{}/user_bookmarks".to_string()
}

fn default_bookmarks_path() -> String {
    "/users/{}/bookmarks".to_string()
}

fn default_catalog_path() -> String {
    "/search/catalog".to_string()
}

fn default_chapters_path() -> String {
    "/titles/chapters".to_string()
}

fn default_views_path() -> String {
    "/activity/views/".to_string()
}

fn default_cookie_relay_path() -> String {
    "/node-api/cookie/".to_string()
}

fn default_title_page_template() -> String {
    "/_next/data/0WMsTVhcJNvltEilcpQjj/ru/manga/{}.json".to_string()
}

fn default_interactive_attempts() -> u32 {
    30
}

fn default_background_attempts() -> u32 {
    400
}

fn default_catalog_page_size() -> u32 {
    3000
}

fn default_order_by() -> String {
    "id".to_string()
}

fn default_idle_sleep() -> Duration {
    Duration::from_secs(20)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
