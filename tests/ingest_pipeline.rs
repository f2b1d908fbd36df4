//! End-to-end ingestion: HTTP feed → SQLite dedup records → SQLite queues.
//!
//! Each test creates its own in-memory database and mock server. The
//! database plays both the identifier store and every queue.

use std::time::Duration;

use feedrelay::config::Config;
use feedrelay::feed::HttpFetcher;
use feedrelay::ingest::{BatchError, IngestSettings, Ingestor};
use feedrelay::storage::{Database, IdentifierStore, OutboundEntry, QueueClient};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VISIBILITY: Duration = Duration::from_secs(300);

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn ingestor(db: &Database, config: &Config) -> Ingestor<HttpFetcher, Database, Database> {
    Ingestor::new(
        HttpFetcher::from_config(reqwest::Client::new(), config),
        db.clone(),
        db.clone(),
        IngestSettings::from(config),
    )
}

fn rss_feed(guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|g| {
            format!(
                "<item><title>Post {g}</title><link>https://blog.example/{g}</link><guid>{g}</guid></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example/</link>
    <description>Posts</description>
    {}
  </channel>
</rss>"#,
        items
    )
}

async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn enqueue_task(db: &Database, config: &Config, body: serde_json::Value) {
    let outcome = db
        .send_batch(
            &config.feed_queue_url,
            &[OutboundEntry {
                id: "0".to_string(),
                body: body.to_string(),
                delay_seconds: 0,
            }],
        )
        .await
        .unwrap();
    assert!(outcome.failed.is_empty());
}

async fn item_bodies(db: &Database, config: &Config) -> Vec<serde_json::Value> {
    db.peek_messages(&config.item_queue_url)
        .await
        .unwrap()
        .iter()
        .map(|m| serde_json::from_str(&m.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_first_run_dispatches_every_item() {
    let server = MockServer::start().await;
    mount_feed(&server, "/rss", rss_feed(&["a", "b"])).await;
    let db = test_db().await;
    let config = Config::default();
    let source = format!("{}/rss", server.uri());

    enqueue_task(&db, &config, serde_json::json!({"source": source, "type": "RSS"})).await;
    let tasks = db
        .receive_batch(&config.feed_queue_url, 10, VISIBILITY)
        .await
        .unwrap();
    let reports = ingestor(&db, &config).process_batch(&tasks).await.unwrap();

    assert_eq!(reports[0].new_items, 2);
    let bodies = item_bodies(&db, &config).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["source"], source.as_str());
    assert_eq!(bodies[0]["type"], "RSS");
    assert_eq!(bodies[0]["item"]["guid"], "a");
    assert_eq!(bodies[1]["item"]["guid"], "b");
    assert_eq!(bodies[0]["feed"]["title"], "Example Blog");

    // Task retired
    assert!(db
        .peek_messages(&config.feed_queue_url)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_second_run_only_sends_new_and_prunes_stale() {
    let server = MockServer::start().await;
    mount_feed(&server, "/rss", rss_feed(&["b", "c"])).await;
    let db = test_db().await;
    let config = Config::default();
    let source = format!("{}/rss", server.uri());

    // What a completion worker would have recorded after the first run
    db.put_id(&source, "a").await.unwrap();
    db.put_id(&source, "b").await.unwrap();

    enqueue_task(&db, &config, serde_json::json!({"source": source, "type": "RSS"})).await;
    let tasks = db
        .receive_batch(&config.feed_queue_url, 10, VISIBILITY)
        .await
        .unwrap();
    let reports = ingestor(&db, &config).process_batch(&tasks).await.unwrap();

    assert_eq!(reports[0].new_items, 1);
    assert_eq!(reports[0].stale_ids, 1);
    assert_eq!(reports[0].reconcile.deleted, 1);

    let bodies = item_bodies(&db, &config).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["item"]["guid"], "c");

    let remaining = db.query_ids(&source, None).await.unwrap();
    assert_eq!(remaining.ids, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_delays_follow_item_position() {
    let server = MockServer::start().await;
    let guids: Vec<String> = (0..12).map(|i| format!("g{:02}", i)).collect();
    let guid_refs: Vec<&str> = guids.iter().map(String::as_str).collect();
    mount_feed(&server, "/rss", rss_feed(&guid_refs)).await;
    let db = test_db().await;
    let config = Config {
        item_delay_seconds: 100,
        ..Config::default()
    };

    enqueue_task(
        &db,
        &config,
        serde_json::json!({"source": format!("{}/rss", server.uri()), "type": "RSS"}),
    )
    .await;
    let before = chrono::Utc::now().timestamp_millis();
    let tasks = db
        .receive_batch(&config.feed_queue_url, 10, VISIBILITY)
        .await
        .unwrap();
    let reports = ingestor(&db, &config).process_batch(&tasks).await.unwrap();
    assert_eq!(reports[0].dispatch.sent, 12);
    assert!(reports[0].dispatch.failed.is_empty());

    let held = db.peek_messages(&config.item_queue_url).await.unwrap();
    assert_eq!(held.len(), 12);
    let delays: Vec<i64> = held
        .iter()
        .map(|m| (m.visible_at - before) / 1000)
        .collect();
    // Second batch restarts one unit past the batch number; the first
    // batch reaches the 900s cap at its ninth item.
    let expected = [100, 200, 300, 400, 500, 600, 700, 800, 900, 900, 200, 300];
    for (delay, expected) in delays.iter().zip(expected) {
        assert!(
            (expected..expected + 5).contains(delay),
            "delay {} not near {}",
            delay,
            expected
        );
    }
}

#[tokio::test]
async fn test_fetch_failure_leaves_task_for_redelivery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let db = test_db().await;
    let config = Config::default();

    enqueue_task(
        &db,
        &config,
        serde_json::json!({"source": format!("{}/rss", server.uri()), "type": "RSS"}),
    )
    .await;
    let tasks = db
        .receive_batch(&config.feed_queue_url, 10, Duration::ZERO)
        .await
        .unwrap();
    let result = ingestor(&db, &config).process_batch(&tasks).await;

    assert_eq!(result, Err(BatchError::TasksFailed { failed: 1, total: 1 }));
    let redelivered = db
        .receive_batch(&config.feed_queue_url, 10, VISIBILITY)
        .await
        .unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].message_id, tasks[0].message_id);
    assert!(db
        .peek_messages(&config.item_queue_url)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_atom_feed_with_headers() {
    let server = MockServer::start().await;
    let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>urn:uuid:60a76c80-d399-11d9-b91C-0003939e0af6</id>
  <updated>2003-12-13T18:30:02Z</updated>
  <entry>
    <title>Atom-Powered Robots Run Amok</title>
    <link href="http://example.org/2003/12/13/atom03"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2003-12-13T18:30:02Z</updated>
    <summary type="html">&lt;p&gt;Some   text.&lt;/p&gt;</summary>
  </entry>
</feed>"#;
    Mock::given(method("GET"))
        .and(path("/atom"))
        .and(header("X-Custom-Header", "CustomHeaderValue"))
        .respond_with(ResponseTemplate::new(200).set_body_string(atom))
        .expect(1)
        .mount(&server)
        .await;
    let db = test_db().await;
    let config = Config::default();

    enqueue_task(
        &db,
        &config,
        serde_json::json!({
            "source": format!("{}/atom", server.uri()),
            "type": "ATOM",
            "headers": {"X-Custom-Header": "CustomHeaderValue"}
        }),
    )
    .await;
    let tasks = db
        .receive_batch(&config.feed_queue_url, 10, VISIBILITY)
        .await
        .unwrap();
    ingestor(&db, &config).process_batch(&tasks).await.unwrap();

    let bodies = item_bodies(&db, &config).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["type"], "ATOM");
    assert_eq!(
        bodies[0]["item"]["id"],
        "urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a"
    );
    assert_eq!(bodies[0]["feed"]["title"], "Example Atom");
}
