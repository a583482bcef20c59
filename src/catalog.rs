//! Catalog scanning: bookmarks and the paged title catalog
//!
//! The scanner builds two collections for the farming loop: the ignore set
//! (titles the user already bookmarks, which must never be farmed) and the
//! pending set (newly discovered titles awaiting view submission). Bookmarks
//! are fetched in a single page sized to the user's total bookmark count;
//! the catalog is walked page by page across farming cycles.

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::executor::{CallPurpose, RequestExecutor, RequestSpec};
use crate::session::Session;
use crate::types::{PendingTitle, TitleId};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Titles the user already tracks, keyed by title id to directory slug
///
/// Built once per run from the user's bookmarks; read-only afterward.
pub type IgnoreSet = HashMap<TitleId, String>;

#[derive(Debug, Deserialize)]
struct BookmarkCountsEnvelope {
    #[serde(default)]
    content: Vec<BookmarkTypeCount>,
}

#[derive(Debug, Deserialize)]
struct BookmarkTypeCount {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BookmarksEnvelope {
    #[serde(default)]
    content: Vec<BookmarkEntry>,
}

#[derive(Debug, Deserialize)]
struct BookmarkEntry {
    #[serde(default)]
    title: Option<BookmarkTitle>,
}

#[derive(Debug, Deserialize)]
struct BookmarkTitle {
    id: TitleId,
    #[serde(default)]
    dir: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEnvelope {
    #[serde(default)]
    content: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: TitleId,
    dir: String,
    main_name: String,
}

/// Scanner over the user's bookmarks and the title catalog
pub struct CatalogScanner<'a> {
    executor: &'a RequestExecutor,
    endpoints: &'a EndpointConfig,
}

impl<'a> CatalogScanner<'a> {
    /// Creates a scanner
    pub fn new(executor: &'a RequestExecutor, endpoints: &'a EndpointConfig) -> Self {
        Self {
            executor,
            endpoints,
        }
    }

    /// Sums the per-type bookmark counts for the session's user
    pub async fn total_bookmark_count(&self, session: &Session) -> Result<u64> {
        let user_id = require_user_id(session)?;
        let url = self.endpoints.bookmark_counts_url(user_id);
        let spec = RequestSpec::get(&url, CallPurpose::Background);

        let response = required(self.executor.execute(&session.headers, spec).await?, &url)?;
        let envelope: BookmarkCountsEnvelope = response.json().await?;
        Ok(envelope.content.iter().map(|t| t.count).sum())
    }

    /// Fetches every bookmark in one page and builds the ignore set
    pub async fn load_ignore_set(&self, session: &Session) -> Result<IgnoreSet> {
        let count = self.total_bookmark_count(session).await?;
        let user_id = require_user_id(session)?;
        let url = self.endpoints.bookmarks_url(user_id);
        let spec = RequestSpec::get(&url, CallPurpose::Background)
            .query("type", "0")
            .query("count", count)
            .query("page", "1");

        let response = required(self.executor.execute(&session.headers, spec).await?, &url)?;
        let envelope: BookmarksEnvelope = response.json().await?;

        let mut ignore = IgnoreSet::new();
        for entry in envelope.content {
            if let Some(title) = entry.title {
                ignore.insert(title.id, title.dir);
            }
        }
        debug!(bookmarks = ignore.len(), "ignore set loaded");
        Ok(ignore)
    }

    /// Scans one catalog page and folds new titles into the pending set
    ///
    /// Titles already ignored or already pending are skipped, so re-scanning
    /// a page is idempotent: the title id is the dedup key. Returns how many
    /// titles were newly added.
    pub async fn scan_catalog_page(
        &self,
        session: &Session,
        page: u32,
        order_by: &str,
        page_size: u32,
        ignore: &IgnoreSet,
        pending: &mut HashMap<TitleId, PendingTitle>,
    ) -> Result<usize> {
        let url = self.endpoints.catalog_url();
        let spec = RequestSpec::get(&url, CallPurpose::Background)
            .query("content", "manga")
            .query("count", page_size)
            .query("ordering", order_by)
            .query("page", page);

        let fetched = self.executor.execute(&session.headers, spec).await?;
        let Some(response) = fetched.into_response() else {
            warn!(page, "catalog page unavailable this cycle");
            return Ok(0);
        };
        let envelope: CatalogEnvelope = response.json().await?;

        let mut added = 0;
        for entry in envelope.content {
            if ignore.contains_key(&entry.id) || pending.contains_key(&entry.id) {
                continue;
            }
            pending.insert(
                entry.id,
                PendingTitle {
                    id: entry.id,
                    dir: entry.dir,
                    name: entry.main_name,
                },
            );
            added += 1;
        }
        debug!(page, added, pending = pending.len(), "catalog page scanned");
        Ok(added)
    }
}

fn require_user_id(session: &Session) -> Result<i64> {
    session.user_id().ok_or_else(|| Error::Config {
        message: "session carries no user profile".into(),
        key: None,
    })
}

fn required(
    fetched: crate::executor::Fetched,
    endpoint: &str,
) -> Result<reqwest::Response> {
    fetched.into_response().ok_or_else(|| Error::UnexpectedResponse {
        endpoint: endpoint.to_string(),
        message: "no response within the retry budget".into(),
    })
}
