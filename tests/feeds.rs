use std::io::Write;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use cvescout::feeds::nvd::NvdFeed;
use cvescout::feeds::osv::OsvFeed;
use cvescout::feeds::FeedAdapter;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAY: Duration = Duration::from_secs(86_400);

fn hours_ago(hours: i64) -> String {
    (Utc::now() - ChronoDuration::hours(hours)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn nvd_feed_reads_the_gzipped_document() {
    let server = MockServer::start().await;
    let document = json!({"vulnerabilities": [
        {"cve": {"id": "CVE-2025-0001", "published": hours_ago(2),
                 "descriptions": [{"lang": "en", "value": "Apache flaw"}]}},
        {"cve": {"id": "CVE-2025-0002", "published": hours_ago(1),
                 "descriptions": [{"lang": "es", "value": "Fallo"}, {"lang": "en", "value": "Zimbra flaw"}]}},
        {"cve": {"id": "CVE-2020-0003", "published": "2020-01-01T00:00:00.000",
                 "descriptions": []}},
        {"cve": {"published": hours_ago(1)}}
    ]});
    Mock::given(method("GET"))
        .and(path("/feeds/recent.json.gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(gzip(document.to_string().as_bytes())),
        )
        .mount(&server)
        .await;

    let feed = NvdFeed::new(
        &format!("{}/feeds/recent.json.gz", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let candidates = feed.fetch(10, DAY).await;

    let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["CVE-2025-0002", "CVE-2025-0001"]);
    assert_eq!(candidates[0].description, "Zimbra flaw");
    assert_eq!(candidates[0].source, "nvd");
}

#[tokio::test]
async fn nvd_feed_failure_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let feed = NvdFeed::new(&server.uri(), Duration::from_secs(5)).unwrap();
    assert!(feed.fetch(10, DAY).await.is_empty());
}

#[tokio::test]
async fn nvd_feed_with_a_broken_archive_is_an_empty_list() {
    let server = MockServer::start().await;
    let mut broken = gzip(b"{\"vulnerabilities\": []}");
    broken.truncate(12);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(broken))
        .mount(&server)
        .await;

    let feed = NvdFeed::new(&server.uri(), Duration::from_secs(5)).unwrap();
    assert!(feed.fetch(10, DAY).await.is_empty());
}

#[tokio::test]
async fn osv_feed_posts_a_batch_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/querybatch"))
        .and(body_partial_json(json!({"queries": [{}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"vulns": [
            {"id": "GHSA-1111-2222-3333", "aliases": ["CVE-2025-1000"],
             "published": hours_ago(3), "details": "Prototype pollution"},
            {"id": "GHSA-4444-5555-6666", "published": hours_ago(1),
             "summary": "No CVE yet"}
        ]}]})))
        .expect(1)
        .mount(&server)
        .await;

    let feed = OsvFeed::new(
        &format!("{}/v1/querybatch", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let candidates = feed.fetch(10, DAY).await;

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].id, "GHSA-4444-5555-6666");
    assert_eq!(candidates[0].description, "No CVE yet");
    assert_eq!(candidates[1].id, "CVE-2025-1000");
    assert_eq!(candidates[1].source, "osv");
}

#[tokio::test]
async fn osv_feed_with_malformed_json_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let feed = OsvFeed::new(&server.uri(), Duration::from_secs(5)).unwrap();
    assert!(feed.fetch(10, DAY).await.is_empty());
}
