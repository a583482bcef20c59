//! End-to-end farming cycle against a mock server.
//!
//! Scenario: account `alice:pw1`, no bookmarks, catalog page 1 returns one
//! title; its branch has a single free chapter above the reading threshold.
//! One full cycle must submit exactly one view event, record the chapter as
//! viewed, and persist a restorable snapshot.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use remanga_farmer::accounts::Credentials;
use remanga_farmer::config::{Config, EndpointConfig, RetryConfig};
use remanga_farmer::farmer::AccountFarmer;
use remanga_farmer::types::ChapterId;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sessionid=s1; Path=/; HttpOnly")
                .set_body_json(serde_json::json!({
                    "content": {"id": 7, "username": "alice", "access_token": "tok"}
                })),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/node-api/cookie/"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "relayed=v; Path=/"))
        .expect(2)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<script src=\"/_next/static/TESTBUILD/_buildManifest.js\"></script>",
        ))
        .mount(server)
        .await;
}

async fn mount_empty_bookmarks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/7/user_bookmarks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/7/bookmarks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
        )
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, cache_dir: &TempDir) -> Arc<Config> {
    Arc::new(Config {
        endpoints: EndpointConfig {
            api_base: server.uri(),
            site_base: server.uri(),
            ..EndpointConfig::default()
        },
        retry: RetryConfig {
            interactive_attempts: 3,
            background_attempts: 3,
        },
        cache_dir: cache_dir.path().to_path_buf(),
        ..Config::default()
    })
}

#[tokio::test]
async fn one_cycle_views_the_discovered_chapter_exactly_once() {
    let server = MockServer::start().await;
    mount_login_handshake(&server).await;
    mount_empty_bookmarks(&server).await;

    // Fresh cursor starts at 0, so the first scanned page is 1.
    Mock::given(method("GET"))
        .and(path("/search/catalog"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"id": 10, "dir": "foo", "main_name": "Foo"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Per-title document under the refreshed build id.
    Mock::given(method("GET"))
        .and(path("/_next/data/TESTBUILD/ru/manga/foo.json"))
        .and(query_param("title", "foo"))
        .and(query_param("p", "chapters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pageProps": {"fallbackData": {"content": {
                "branches": [{"id": 1}],
                "current_reading": {"chapter": 0.0}
            }}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/titles/chapters"))
        .and(query_param("branch_id", "1"))
        .and(query_param("user_data", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"id": 100, "chapter": "1", "is_paid": false}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The view event must be submitted exactly once, whole-chapter sentinel.
    Mock::given(method("POST"))
        .and(path("/activity/views/"))
        .and(body_json(serde_json::json!({"chapter": 100, "page": -1})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = config_for(&server, &cache_dir);
    let credentials = Credentials::Password {
        username: "alice".into(),
        password: "pw1".into(),
    };

    let mut farmer = AccountFarmer::bootstrap(Arc::clone(&config), credentials)
        .await
        .unwrap();
    farmer.farm_cycle().await.unwrap();

    assert_eq!(farmer.page(), 1);
    assert!(farmer.viewed().contains(ChapterId(100)));
    assert_eq!(farmer.viewed().snapshot(), vec![ChapterId(100)]);

    // Snapshot written and restorable.
    let store = remanga_farmer::cache::CacheStore::new(cache_dir.path());
    let snapshot = store.load("alice").unwrap().expect("snapshot must be written");
    assert_eq!(snapshot.username.as_deref(), Some("alice"));
    assert_eq!(snapshot.password.as_deref(), Some("pw1"));
    assert_eq!(snapshot.token.as_deref(), Some("tok"));
    assert_eq!(snapshot.page, 1);
    assert_eq!(snapshot.viewed, vec![ChapterId(100)]);
}

#[tokio::test]
async fn second_cycle_never_resubmits_a_viewed_chapter() {
    let server = MockServer::start().await;
    mount_login_handshake(&server).await;
    mount_empty_bookmarks(&server).await;

    // Pages 1 and 2 both surface the same title.
    Mock::given(method("GET"))
        .and(path("/search/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"id": 10, "dir": "foo", "main_name": "Foo"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/_next/data/TESTBUILD/ru/manga/foo.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pageProps": {"fallbackData": {"content": {
                "branches": [{"id": 1}]
            }}}
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/titles/chapters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"id": 100, "chapter": "1", "is_paid": false}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    // Both cycles re-farm the pending title, but the view goes out once.
    Mock::given(method("POST"))
        .and(path("/activity/views/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = config_for(&server, &cache_dir);
    let credentials = Credentials::Password {
        username: "alice".into(),
        password: "pw1".into(),
    };

    let mut farmer = AccountFarmer::bootstrap(config, credentials).await.unwrap();
    farmer.farm_cycle().await.unwrap();
    farmer.farm_cycle().await.unwrap();

    assert_eq!(farmer.page(), 2);
    assert_eq!(farmer.viewed().len(), 1);
    assert_eq!(farmer.pending().len(), 1, "title id is the dedup key for the pending set");
}

#[tokio::test]
async fn paid_chapters_are_never_submitted() {
    let server = MockServer::start().await;
    mount_login_handshake(&server).await;
    mount_empty_bookmarks(&server).await;

    Mock::given(method("GET"))
        .and(path("/search/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"id": 10, "dir": "foo", "main_name": "Foo"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_next/data/TESTBUILD/ru/manga/foo.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pageProps": {"fallbackData": {"content": {"branches": [{"id": 1}]}}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titles/chapters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [
                {"id": 200, "chapter": "2", "is_paid": true},
                {"id": 100, "chapter": "1", "is_paid": false}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/activity/views/"))
        .and(body_json(serde_json::json!({"chapter": 100, "page": -1})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = config_for(&server, &cache_dir);
    let credentials = Credentials::Password {
        username: "alice".into(),
        password: "pw1".into(),
    };

    let mut farmer = AccountFarmer::bootstrap(config, credentials).await.unwrap();
    farmer.farm_cycle().await.unwrap();

    assert!(farmer.viewed().contains(ChapterId(100)));
    assert!(!farmer.viewed().contains(ChapterId(200)), "paid chapter must never be viewed");
}

#[tokio::test]
async fn restored_cache_skips_login_and_resumes_the_cursor() {
    let server = MockServer::start().await;

    // Only the homepage (title-path refresh) and farming endpoints exist; a
    // login attempt would 404 and fail the bootstrap.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<script src=\"/_next/static/TESTBUILD/_buildManifest.js\"></script>",
        ))
        .mount(&server)
        .await;
    mount_empty_bookmarks(&server).await;

    // The restored cursor is 4, so the next scanned page must be 5.
    Mock::given(method("GET"))
        .and(path("/search/catalog"))
        .and(query_param("page", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})))
        .expect(1)
        .mount(&server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = config_for(&server, &cache_dir);

    let snapshot = remanga_farmer::types::SessionSnapshot {
        username: Some("alice".into()),
        password: Some("pw1".into()),
        token: Some("tok".into()),
        headers: std::collections::HashMap::new(),
        user_info: Some(serde_json::from_value(serde_json::json!({
            "id": 7, "username": "alice"
        })).unwrap()),
        page: 4,
        viewed: vec![ChapterId(100)],
        saved_at: chrono::Utc::now(),
    };
    remanga_farmer::cache::CacheStore::new(cache_dir.path())
        .save("alice", &snapshot)
        .unwrap();

    let credentials = Credentials::Password {
        username: "alice".into(),
        password: "pw1".into(),
    };
    let mut farmer = AccountFarmer::bootstrap(config, credentials).await.unwrap();

    assert_eq!(farmer.page(), 4);
    assert!(farmer.viewed().contains(ChapterId(100)));

    farmer.farm_cycle().await.unwrap();
    assert_eq!(farmer.page(), 5);
}
