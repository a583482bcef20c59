//! The farming orchestrator: per-account view-farming loop
//!
//! One [`AccountFarmer`] owns everything for one account: the authenticated
//! session, the ignore/pending sets, the viewed-chapter set and the catalog
//! page cursor. Its loop runs forever:
//!
//! 1. load the ignore set (first cycle only)
//! 2. advance the page cursor and scan one catalog page
//! 3. fan out over every pending title: resolve its reading branch, fetch
//!    and filter its chapters, submit view events for the survivors
//! 4. persist a snapshot, sleep, repeat
//!
//! Fan-out is structured: all per-title lookups of a cycle run concurrently
//! on the account's task via `join_all`, and within a title all view
//! submissions run concurrently the same way. Every sub-task returns a
//! [`TitleOutcome`] the orchestrator folds into its run state; the only write
//! shared between in-flight sub-tasks is the append on [`ViewedChapters`].
//!
//! Failure policy: a title whose branch or chapter list cannot be fetched is
//! skipped this cycle and naturally retried on a later pass; a failed view
//! submission is dropped for the cycle. Only configuration and auth errors
//! end the account's task, and no account failure stops any other account.

use crate::accounts::Credentials;
use crate::cache::CacheStore;
use crate::catalog::{CatalogScanner, IgnoreSet};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{CallPurpose, RequestExecutor, RequestSpec};
use crate::session::{Session, SessionBuilder};
use crate::types::{
    BranchId, ChapterCandidate, ChapterId, PendingTitle, SessionSnapshot, TitleId, ViewedChapters,
    chapter_threshold,
};
use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct TitlePageEnvelope {
    #[serde(rename = "pageProps", default)]
    page_props: PageProps,
}

#[derive(Debug, Default, Deserialize)]
struct PageProps {
    #[serde(rename = "fallbackData", default)]
    fallback_data: FallbackData,
}

#[derive(Debug, Default, Deserialize)]
struct FallbackData {
    #[serde(default)]
    content: TitleContent,
}

#[derive(Debug, Default, Deserialize)]
struct TitleContent {
    #[serde(default)]
    branches: Vec<Branch>,
    #[serde(default)]
    current_reading: Option<CurrentReading>,
}

#[derive(Debug, Deserialize)]
struct Branch {
    id: BranchId,
}

#[derive(Debug, Deserialize)]
struct CurrentReading {
    #[serde(default)]
    chapter: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChaptersEnvelope {
    #[serde(default)]
    content: Vec<ChapterCandidate>,
}

/// What happened to one pending title during a farming cycle
///
/// Returned by the per-title sub-task and folded into run state by the
/// orchestrator, so no closure captures the run-wide collections.
#[derive(Debug, Default)]
pub struct TitleOutcome {
    /// Chapter ids successfully submitted this cycle, with their labels
    pub submitted: Vec<(ChapterId, String)>,
    /// Chapters skipped because they are paid-only
    pub skipped_paid: usize,
    /// Chapters skipped because their number is below the reading threshold
    pub skipped_below_threshold: usize,
    /// Chapters skipped because they were already viewed
    pub skipped_viewed: usize,
    /// View submissions dropped after exhausting their retry budget
    pub dropped: usize,
    /// False when the branch or chapter list could not be fetched; the title
    /// stays pending and is retried on a later cycle
    pub resolved: bool,
}

/// The current-reading threshold from a title page, defaulting to 0.0
fn reading_threshold(current: Option<&CurrentReading>) -> f64 {
    match current.map(|c| &c.chapter) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => chapter_threshold(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Splits a chapter list into submittable chapters and skip counts
///
/// Chapters are considered oldest-first (the wire order is reverse
/// chronological, hence the caller reverses). A chapter survives when it is
/// not paid, not below the threshold, and not already viewed.
fn partition_chapters<'c>(
    chapters: impl Iterator<Item = &'c ChapterCandidate>,
    threshold: f64,
    viewed: &ViewedChapters,
    outcome: &mut TitleOutcome,
) -> Vec<&'c ChapterCandidate> {
    let mut surviving = Vec::new();
    for chapter in chapters {
        if chapter.is_paid {
            outcome.skipped_paid += 1;
            continue;
        }
        if chapter.number().is_some_and(|n| n < threshold) {
            outcome.skipped_below_threshold += 1;
            continue;
        }
        if viewed.contains(chapter.id) {
            outcome.skipped_viewed += 1;
            continue;
        }
        surviving.push(chapter);
    }
    surviving
}

/// Farming state and loop for one account
pub struct AccountFarmer {
    config: Arc<Config>,
    executor: RequestExecutor,
    credentials: Credentials,
    cache: CacheStore,
    session: Session,
    ignore: Option<IgnoreSet>,
    pending: HashMap<TitleId, PendingTitle>,
    viewed: ViewedChapters,
    page: u32,
}

impl AccountFarmer {
    /// Prepares an account for farming: cache restore or full login
    ///
    /// A valid cached snapshot skips the login handshake entirely; the
    /// versioned title-page path is refreshed either way, since the cached
    /// one may predate a frontend deploy.
    pub async fn bootstrap(config: Arc<Config>, credentials: Credentials) -> Result<Self> {
        let executor = RequestExecutor::new(config.retry.clone())?;
        let cache = CacheStore::new(config.cache_dir.clone());
        let builder = SessionBuilder::new(&executor, &config.endpoints, &credentials);

        let (session, page, viewed) = match cache.load(credentials.cache_key())? {
            Some(snapshot) => {
                let mut session = Session::restore(&snapshot, &config.endpoints);
                builder.refresh_title_page(&mut session).await?;
                info!(
                    username = snapshot.username.as_deref().unwrap_or("<token>"),
                    page = snapshot.page,
                    "session restored from cache"
                );
                (
                    session,
                    snapshot.page,
                    ViewedChapters::from_snapshot(&snapshot.viewed),
                )
            }
            None => (builder.build().await?, 0, ViewedChapters::new()),
        };

        Ok(Self {
            config,
            executor,
            credentials,
            cache,
            session,
            ignore: None,
            pending: HashMap::new(),
            viewed,
            page,
        })
    }

    /// Username for log lines: the credential's, else the profile's
    fn username(&self) -> &str {
        self.credentials
            .username()
            .or_else(|| self.session.username())
            .unwrap_or("<token>")
    }

    /// Catalog page cursor (next cycle scans `page + 1`)
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Chapter ids viewed so far this run
    pub fn viewed(&self) -> &ViewedChapters {
        &self.viewed
    }

    /// Titles currently pending
    pub fn pending(&self) -> &HashMap<TitleId, PendingTitle> {
        &self.pending
    }

    /// Runs the farming loop until a fatal error
    ///
    /// Cycle failures are logged and absorbed; the loop itself never returns
    /// `Ok`.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if let Err(e) = self.farm_cycle().await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(username = self.username(), error = %e, "farming cycle failed, will retry");
            }
            info!(
                username = self.username(),
                idle_secs = self.config.farming.idle_sleep.as_secs(),
                "cycle complete, idling"
            );
            sleep(self.config.farming.idle_sleep).await;
        }
    }

    /// One full farming cycle: scan, farm, persist
    pub async fn farm_cycle(&mut self) -> Result<()> {
        let scanner = CatalogScanner::new(&self.executor, &self.config.endpoints);

        if self.ignore.is_none() {
            self.ignore = Some(scanner.load_ignore_set(&self.session).await?);
        }
        let ignore = &*self.ignore.get_or_insert_with(IgnoreSet::new);

        self.page += 1;
        scanner
            .scan_catalog_page(
                &self.session,
                self.page,
                &self.config.farming.order_by,
                self.config.farming.catalog_page_size,
                ignore,
                &mut self.pending,
            )
            .await?;

        self.farm_pending().await;
        self.persist()?;
        Ok(())
    }

    /// Fans out over all pending titles and folds their outcomes
    async fn farm_pending(&self) {
        let outcomes = join_all(self.pending.values().map(|title| self.farm_title(title))).await;

        let mut submitted = 0;
        let mut unresolved = 0;
        let mut dropped = 0;
        for outcome in &outcomes {
            submitted += outcome.submitted.len();
            dropped += outcome.dropped;
            if !outcome.resolved {
                unresolved += 1;
            }
        }
        debug!(
            username = self.username(),
            titles = outcomes.len(),
            submitted,
            unresolved,
            dropped,
            "pending titles farmed"
        );
    }

    /// Farms one title: branch resolution, chapter filtering, view fan-out
    async fn farm_title(&self, title: &PendingTitle) -> TitleOutcome {
        let mut outcome = TitleOutcome::default();

        let Some((branch, threshold)) = self.resolve_branch(title).await else {
            return outcome;
        };
        let Some(chapters) = self.fetch_chapters(branch).await else {
            return outcome;
        };
        outcome.resolved = true;

        // Wire order is reverse chronological; walk oldest-first.
        let surviving = partition_chapters(chapters.iter().rev(), threshold, &self.viewed, &mut outcome);

        let results = join_all(
            surviving
                .into_iter()
                .map(|chapter| self.submit_view(title, chapter)),
        )
        .await;
        for result in results {
            match result {
                Some(entry) => outcome.submitted.push(entry),
                None => outcome.dropped += 1,
            }
        }
        outcome
    }

    /// Resolves a title's first reading branch and current-reading threshold
    ///
    /// `None` means the title is skipped this cycle: either it genuinely has
    /// no reading branches (not reachable or no content), or the lookup
    /// failed and a later pass will retry it.
    async fn resolve_branch(&self, title: &PendingTitle) -> Option<(BranchId, f64)> {
        let url = self.session.title_page_url(&self.config.endpoints, &title.dir);
        let spec = RequestSpec::get(&url, CallPurpose::Background)
            .query("content", "manga")
            .query("title", &title.dir)
            .query("p", "chapters");

        let response = self.absorb(self.executor.execute(&self.session.headers, spec).await)?;
        let envelope: TitlePageEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(title = %title.dir, error = %e, "title page body malformed, skipping");
                return None;
            }
        };

        let content = envelope.page_props.fallback_data.content;
        let branch = content.branches.first()?.id;
        let threshold = reading_threshold(content.current_reading.as_ref());
        Some((branch, threshold))
    }

    /// Fetches a branch's chapter list, newest first
    async fn fetch_chapters(&self, branch: BranchId) -> Option<Vec<ChapterCandidate>> {
        let url = self.config.endpoints.chapters_url();
        let spec = RequestSpec::get(&url, CallPurpose::Background)
            .query("branch_id", branch)
            .query("user_data", "0");

        let response = self.absorb(self.executor.execute(&self.session.headers, spec).await)?;
        match response.json::<ChaptersEnvelope>().await {
            Ok(envelope) => Some(envelope.content),
            Err(e) => {
                warn!(branch = %branch, error = %e, "chapter list body malformed, skipping");
                None
            }
        }
    }

    /// Submits one whole-chapter view event (page sentinel -1)
    ///
    /// Returns the chapter id/label on success after recording it in the
    /// viewed set; `None` means the submission was dropped for this cycle.
    async fn submit_view(
        &self,
        title: &PendingTitle,
        chapter: &ChapterCandidate,
    ) -> Option<(ChapterId, String)> {
        let url = self.config.endpoints.views_url();
        let spec = RequestSpec::post(&url, CallPurpose::Background)
            .json(json!({"chapter": chapter.id, "page": -1}));

        self.absorb(self.executor.execute(&self.session.headers, spec).await)?;
        self.viewed.insert(chapter.id);
        info!(
            username = self.username(),
            manga = %title.name,
            chapter = %chapter.label,
            "viewed"
        );
        Some((chapter.id, chapter.label.clone()))
    }

    /// Collapses an executor result into `Option`, logging the failure modes
    ///
    /// Auth errors cannot occur here (no farming call is a login-context
    /// call), so an `Err` is only ever a malformed-response artifact and is
    /// absorbed like an exhausted budget.
    fn absorb(&self, result: Result<crate::executor::Fetched>) -> Option<reqwest::Response> {
        match result {
            Ok(fetched) => fetched.into_response(),
            Err(e) => {
                warn!(username = self.username(), error = %e, "farming call failed");
                None
            }
        }
    }

    /// Writes the current run state as a cache snapshot
    fn persist(&self) -> Result<()> {
        let username = self
            .credentials
            .username()
            .or_else(|| self.session.username())
            .map(str::to_string);
        let key = username
            .clone()
            .or_else(|| self.credentials.token().map(str::to_string))
            .ok_or_else(|| Error::Config {
                message: "no cache key available for this account".into(),
                key: None,
            })?;

        let snapshot = SessionSnapshot {
            username,
            password: self.credentials.password().map(str::to_string),
            token: self.session.token.clone(),
            headers: self.session.headers.clone(),
            user_info: self.session.user.clone(),
            page: self.page,
            viewed: self.viewed.snapshot(),
            saved_at: Utc::now(),
        };
        self.cache.save(&key, &snapshot)
    }
}

/// Runs every account's farming loop cooperatively until process exit
///
/// Accounts fail independently: a fatal error (bad credentials, no
/// credentials) ends that account's task with an error log and leaves the
/// rest running.
pub async fn farm_all(config: Arc<Config>, accounts: Vec<Credentials>) {
    let tasks = accounts.into_iter().map(|credentials| {
        let config = Arc::clone(&config);
        async move {
            let key = credentials.cache_key().to_string();
            match AccountFarmer::bootstrap(config, credentials).await {
                Ok(farmer) => {
                    if let Err(e) = farmer.run().await {
                        error!(account = %key, error = %e, "account task terminated");
                    }
                }
                Err(e) => error!(account = %key, error = %e, "account bootstrap failed"),
            }
        }
    });
    join_all(tasks).await;
}
