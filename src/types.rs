//! Core types for remanga-farmer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Unique identifier for a catalog title
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TitleId(pub i64);

impl std::fmt::Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a chapter
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChapterId(pub i64);

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reading branch of a title
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BranchId(pub i64);

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user profile as returned by the login / current-user
/// endpoints
///
/// The service returns more metadata than the farmer needs; everything beyond
/// the fields read directly is kept in `extra` because the serialized whole
/// object is what gets registered as the `serverUser` cookie.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Numeric user id, used to build per-user endpoint URLs
    pub id: i64,

    /// Username, used as the cache key and in log lines
    pub username: String,

    /// Access token issued at login, if the server included one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Remaining profile metadata, preserved verbatim for cookie registration
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A title discovered in the catalog that still needs farming
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTitle {
    /// Catalog title id (dedup key for the pending set)
    pub id: TitleId,

    /// Directory slug used in the per-title JSON document URL
    pub dir: String,

    /// Display name, for log lines only
    pub name: String,
}

/// One chapter of a branch, as considered for view submission
///
/// Ephemeral: produced per branch lookup and filtered before submission.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChapterCandidate {
    /// Chapter id
    pub id: ChapterId,

    /// Chapter label; usually numeric ("6", "6.5") but sometimes a range
    /// string ("12-13"). Occasionally absent on the wire; an empty label has
    /// no number and never compares below the threshold.
    #[serde(rename = "chapter", default)]
    pub label: String,

    /// Paid chapters are never submitted
    #[serde(default)]
    pub is_paid: bool,
}

impl ChapterCandidate {
    /// The chapter's numeric value for threshold comparison, if parseable
    pub fn number(&self) -> Option<f64> {
        chapter_threshold(&self.label)
    }
}

/// Parses a chapter label into a number for threshold comparison
///
/// Plain numeric labels parse directly. Labels that fail plain parsing
/// (range-style like "12-13") fall back to the integer prefix before the
/// first `-` or `.`. The fallback is deliberately lossy — "10-2" parses as 10
/// — and is kept as-is rather than "fixed", since the comparison only has to
/// be stable, not exact.
pub fn chapter_threshold(label: &str) -> Option<f64> {
    let trimmed = label.trim();
    if let Ok(number) = trimmed.parse::<f64>() {
        return Some(number);
    }

    let prefix: String = trimmed
        .chars()
        .take_while(|c| *c != '-' && *c != '.')
        .collect();
    prefix.parse::<f64>().ok()
}

/// Append-only set of chapter ids already submitted as viewed
///
/// Shared by reference across all in-flight view submissions of a farming
/// cycle; `insert` is the only write those sub-tasks perform, and the
/// interior mutex makes concurrent appends safe. A chapter id, once added, is
/// never resubmitted.
#[derive(Debug, Default)]
pub struct ViewedChapters {
    inner: Mutex<HashSet<ChapterId>>,
}

impl ViewedChapters {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the set from a persisted snapshot
    pub fn from_snapshot(ids: &[ChapterId]) -> Self {
        Self {
            inner: Mutex::new(ids.iter().copied().collect()),
        }
    }

    /// Records a chapter as viewed; returns false if it was already present
    pub fn insert(&self, id: ChapterId) -> bool {
        self.lock().insert(id)
    }

    /// Returns true if the chapter has already been submitted
    pub fn contains(&self, id: ChapterId) -> bool {
        self.lock().contains(&id)
    }

    /// Number of chapters viewed so far in this run
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no chapters have been viewed yet
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the set, for persistence
    pub fn snapshot(&self) -> Vec<ChapterId> {
        let mut ids: Vec<ChapterId> = self.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ChapterId>> {
        // A poisoned lock only means a panicking task held it; the set itself
        // is still valid (inserts are atomic).
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Everything persisted for one account between runs
///
/// Written after every farming cycle and read at startup to short-circuit the
/// login handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Account username, if known
    pub username: Option<String>,

    /// Account password, if the account logged in with one
    pub password: Option<String>,

    /// Access token in effect when the snapshot was taken
    pub token: Option<String>,

    /// Fully assembled request header map, cookie string included
    pub headers: HashMap<String, String>,

    /// Authenticated user profile
    pub user_info: Option<UserProfile>,

    /// Catalog page cursor; a restart resumes here instead of rescanning
    pub page: u32,

    /// Chapter ids already submitted as viewed
    pub viewed: Vec<ChapterId>,

    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    // --- chapter label parsing ---

    #[test]
    fn plain_numeric_labels_parse_directly() {
        assert_eq!(chapter_threshold("3"), Some(3.0));
        assert_eq!(chapter_threshold("6.5"), Some(6.5));
        assert_eq!(chapter_threshold(" 12 "), Some(12.0));
    }

    #[test]
    fn range_labels_fall_back_to_the_integer_prefix() {
        assert_eq!(chapter_threshold("7-8"), Some(7.0));
        assert_eq!(chapter_threshold("12-13"), Some(12.0));
    }

    #[test]
    fn reversed_range_keeps_the_lossy_prefix_semantics() {
        // "10-2" is ambiguous; the prefix rule reads it as 10 and that
        // behavior is pinned deliberately.
        assert_eq!(chapter_threshold("10-2"), Some(10.0));
    }

    #[test]
    fn unparseable_labels_yield_none() {
        assert_eq!(chapter_threshold("extra"), None);
        assert_eq!(chapter_threshold(""), None);
        // A bare leading dash leaves an empty prefix for the fallback.
        assert_eq!(chapter_threshold("-extra"), None);
    }

    #[test]
    fn threshold_filter_keeps_boundary_and_range_labels() {
        // current_reading.chapter = 5.0 over ["3","5","6","6.5","7-8"]
        // must keep ["5","6","6.5","7-8"].
        let labels = ["3", "5", "6", "6.5", "7-8"];
        let surviving: Vec<&str> = labels
            .iter()
            .filter(|l| chapter_threshold(l).is_some_and(|n| n >= 5.0))
            .copied()
            .collect();

        assert_eq!(surviving, vec!["5", "6", "6.5", "7-8"]);
    }

    // --- ViewedChapters ---

    #[test]
    fn viewed_chapters_insert_is_append_once() {
        let viewed = ViewedChapters::new();

        assert!(viewed.insert(ChapterId(100)));
        assert!(!viewed.insert(ChapterId(100)), "second insert must report a duplicate");
        assert!(viewed.contains(ChapterId(100)));
        assert_eq!(viewed.len(), 1);
    }

    #[test]
    fn viewed_chapters_snapshot_is_sorted() {
        let viewed = ViewedChapters::new();
        viewed.insert(ChapterId(30));
        viewed.insert(ChapterId(10));
        viewed.insert(ChapterId(20));

        assert_eq!(
            viewed.snapshot(),
            vec![ChapterId(10), ChapterId(20), ChapterId(30)]
        );
    }

    #[test]
    fn viewed_chapters_restores_from_snapshot() {
        let viewed = ViewedChapters::from_snapshot(&[ChapterId(1), ChapterId(2)]);

        assert!(viewed.contains(ChapterId(1)));
        assert!(!viewed.insert(ChapterId(2)));
        assert!(viewed.insert(ChapterId(3)));
    }

    // --- serde shapes ---

    #[test]
    fn id_newtypes_serialize_transparently() {
        assert_eq!(serde_json::to_string(&TitleId(10)).unwrap(), "10");
        assert_eq!(serde_json::from_str::<ChapterId>("100").unwrap(), ChapterId(100));
    }

    #[test]
    fn user_profile_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "id": 7,
            "username": "alice",
            "access_token": "tok",
            "avatar": "/media/a.png",
            "balance": 0
        });

        let profile: UserProfile = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(profile.id, 7);
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.access_token.as_deref(), Some("tok"));

        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back, raw, "extra metadata must survive the round-trip");
    }

    #[test]
    fn chapter_candidate_tolerates_a_missing_label() {
        let raw = serde_json::json!({"id": 55, "is_paid": false});
        let candidate: ChapterCandidate = serde_json::from_value(raw).unwrap();

        assert_eq!(candidate.label, "");
        assert_eq!(candidate.number(), None);
    }

    #[test]
    fn chapter_candidate_reads_the_wire_shape() {
        let raw = serde_json::json!({"id": 55, "chapter": "6.5", "is_paid": false});
        let candidate: ChapterCandidate = serde_json::from_value(raw).unwrap();

        assert_eq!(candidate.id, ChapterId(55));
        assert_eq!(candidate.label, "6.5");
        assert_eq!(candidate.number(), Some(6.5));
        assert!(!candidate.is_paid);
    }
}
