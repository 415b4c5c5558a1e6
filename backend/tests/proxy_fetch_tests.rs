//! Proxy fetch tests against an in-memory transport.

mod common;

use common::{connector, no_staging_left, sha1_hex, ProxyFixture, CENTRAL, MANAGED, MIRROR};

use maven_proxy::services::failure_cache::UrlFailureCache;
use maven_proxy::services::metadata_service::MetadataStore;
use maven_proxy::services::proxy_service::{FetchOutcome, ProxyError};

const JAR: &str = "org/example/lib/1.0/lib-1.0.jar";
const SNAPSHOT_JAR: &str = "org/example/lib/1.1-SNAPSHOT/lib-1.1-20070504.153317-1.jar";

fn metadata_xml(versions: &[&str], last_updated: &str) -> String {
    let versions: String = versions
        .iter()
        .map(|v| format!("<version>{}</version>", v))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\
         <groupId>org.example</groupId><artifactId>lib</artifactId>\
         <versioning><versions>{}</versions><lastUpdated>{}</lastUpdated></versioning>\
         </metadata>",
        versions, last_updated
    )
}

#[tokio::test]
async fn test_fetch_prefers_lowest_order() {
    let fixture = ProxyFixture::new(vec![connector(MIRROR, 2), connector(CENTRAL, 1)]);
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"from central");
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    let path = outcome.path().expect("artifact should be found").to_path_buf();

    assert_eq!(path, fixture.local(JAR));
    assert_eq!(std::fs::read(&path).unwrap(), b"from central");
    assert_eq!(fixture.transport.request_count(MIRROR, JAR), 0);
    assert!(fixture.local(&format!("{}.sha1", JAR)).exists());
    assert!(no_staging_left(&fixture.root()));
}

#[tokio::test]
async fn test_fetch_falls_through_not_found() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1), connector(MIRROR, 2)]);
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"from mirror");
    assert_eq!(fixture.transport.request_count(CENTRAL, JAR), 1);
}

#[tokio::test]
async fn test_disabled_connector_is_skipped() {
    let mut disabled = connector(CENTRAL, 1);
    disabled.disabled = true;
    let fixture = ProxyFixture::new(vec![disabled, connector(MIRROR, 2)]);
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"from central");
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"from mirror");
    assert!(fixture.transport.requests().iter().all(|(remote, _)| remote != CENTRAL));
}

#[tokio::test]
async fn test_blacklisted_path_skips_connector() {
    let mut central = connector(CENTRAL, 1);
    central.blacklist = vec!["org/example/**".to_string()];
    let fixture = ProxyFixture::new(vec![central, connector(MIRROR, 2)]);
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"from central");
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"from mirror");
    assert_eq!(fixture.transport.request_count(CENTRAL, JAR), 0);
}

#[tokio::test]
async fn test_queued_error_tries_next_connector() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1), connector(MIRROR, 2)]);
    fixture.transport.fail(CENTRAL, JAR, "connection reset");
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"from mirror");

    let central_key = UrlFailureCache::key(CENTRAL, JAR);
    assert!(fixture.handler.failure_cache().has_failed_before(&central_key));
    let mirror_key = UrlFailureCache::key(MIRROR, JAR);
    assert!(!fixture.handler.failure_cache().has_failed_before(&mirror_key));
}

#[tokio::test]
async fn test_queued_errors_are_reported_when_nothing_found() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1), connector(MIRROR, 2)]);
    fixture.transport.fail(CENTRAL, JAR, "connection reset");
    fixture.transport.fail(MIRROR, JAR, "timed out");

    match fixture.handler.fetch(MANAGED, JAR).await.unwrap() {
        FetchOutcome::NotFound { failures } => {
            let remotes: Vec<&str> = failures.iter().map(|f| f.remote_id.as_str()).collect();
            assert_eq!(remotes, vec![CENTRAL, MIRROR]);
            assert!(failures[1].message.contains("timed out"));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(!fixture.local(JAR).exists());
}

#[tokio::test]
async fn test_stop_policy_propagates_error() {
    let fixture = ProxyFixture::new(vec![
        connector(CENTRAL, 1).with_policy("propagate-errors", "stop"),
        connector(MIRROR, 2),
    ]);
    fixture.transport.fail(CENTRAL, JAR, "connection reset");
    fixture.transport.serve_with_sha1(MIRROR, JAR, b"from mirror");

    let err = fixture.handler.fetch(MANAGED, JAR).await.unwrap_err();
    assert!(matches!(err, ProxyError::Transport { ref remote, .. } if remote == CENTRAL));
    assert_eq!(fixture.transport.request_count(MIRROR, JAR), 0);
}

#[tokio::test]
async fn test_stop_policy_queues_when_local_copy_exists() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("propagate-errors", "stop")]);
    fixture.put_local(JAR, b"local");
    fixture.transport.fail(CENTRAL, JAR, "connection reset");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"local");
}

#[tokio::test]
async fn test_cached_failure_short_circuits() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("cache-failures", "yes")]);

    let first = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(matches!(first, FetchOutcome::NotFound { .. }));

    let second = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(matches!(second, FetchOutcome::NotFound { ref failures } if failures.is_empty()));
    assert_eq!(fixture.transport.request_count(CENTRAL, JAR), 1);
}

#[tokio::test]
async fn test_every_connector_refusing_is_rejected() {
    let fixture = ProxyFixture::new(vec![
        connector(CENTRAL, 1).with_policy("releases", "never"),
        connector(MIRROR, 2).with_policy("releases", "never"),
    ]);
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"from central");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Rejected(ref reason) if reason.contains("releases")));
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn test_success_clears_cached_failure() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1)]);
    fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    let key = UrlFailureCache::key(CENTRAL, JAR);
    assert!(fixture.handler.failure_cache().has_failed_before(&key));

    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"now present");
    fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(!fixture.handler.failure_cache().has_failed_before(&key));
}

#[tokio::test]
async fn test_checksum_fail_discards_download() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("checksum", "fail")]);
    fixture.transport.serve(CENTRAL, JAR, b"jar content");
    fixture
        .transport
        .serve(CENTRAL, &format!("{}.sha1", JAR), "0000000000000000000000000000000000000000");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    match outcome {
        FetchOutcome::NotFound { failures } => assert_eq!(failures.len(), 1),
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(!fixture.local(JAR).exists());
    assert!(!fixture.local(&format!("{}.sha1", JAR)).exists());
    assert!(no_staging_left(&fixture.root()));
    assert!(!fixture.local("org").exists());
    assert!(fixture.root().exists());
}

#[tokio::test]
async fn test_checksum_fail_requires_a_checksum() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("checksum", "fail")]);
    fixture.transport.serve(CENTRAL, JAR, b"jar content");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(outcome.path().is_none());
    assert!(!fixture.local(JAR).exists());
}

#[tokio::test]
async fn test_checksum_fix_repairs_side_files() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("checksum", "fix")]);
    fixture.transport.serve(CENTRAL, JAR, b"jar content");
    fixture
        .transport
        .serve(CENTRAL, &format!("{}.sha1", JAR), "0000000000000000000000000000000000000000");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert!(outcome.path().is_some());

    let sha1 = std::fs::read_to_string(fixture.local(&format!("{}.sha1", JAR))).unwrap();
    assert!(sha1.starts_with(&sha1_hex(b"jar content")));
    assert!(fixture.local(&format!("{}.md5", JAR)).exists());
}

#[tokio::test]
async fn test_checksum_request_returns_side_file() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1)]);
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"jar content");

    let sha1_path = format!("{}.sha1", JAR);
    let outcome = fixture.handler.fetch(MANAGED, &sha1_path).await.unwrap();
    assert_eq!(outcome.path(), Some(fixture.local(&sha1_path).as_path()));
    assert!(fixture.local(JAR).exists());
}

#[tokio::test]
async fn test_metadata_merged_across_remotes() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1), connector(MIRROR, 2)]);
    let path = "org/example/lib/maven-metadata.xml";
    fixture
        .transport
        .serve(CENTRAL, path, metadata_xml(&["1.0", "1.1"], "20070101000000"));
    fixture
        .transport
        .serve(MIRROR, path, metadata_xml(&["1.1", "1.2"], "20070202000000"));

    let outcome = fixture.handler.fetch(MANAGED, path).await.unwrap();
    let merged = outcome.path().expect("merged metadata").to_path_buf();

    let metadata = MetadataStore::read(&merged).unwrap().unwrap();
    assert_eq!(metadata.available_versions, vec!["1.0", "1.1", "1.2"]);
    assert_eq!(metadata.latest_version.as_deref(), Some("1.2"));
    assert!(fixture.local("org/example/lib/maven-metadata-central.xml").exists());
    assert!(fixture.local("org/example/lib/maven-metadata-mirror.xml").exists());
    assert!(fixture.local("org/example/lib/maven-metadata.xml.sha1").exists());
}

#[tokio::test]
async fn test_releases_only_repository_rejects_snapshots() {
    let fixture = ProxyFixture::with_repository(|repo| repo.snapshots = false, vec![connector(CENTRAL, 1)]);
    fixture.transport.serve_with_sha1(CENTRAL, SNAPSHOT_JAR, b"snapshot");

    let outcome = fixture.handler.fetch(MANAGED, SNAPSHOT_JAR).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Rejected(_)));
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn test_update_never_serves_local_copy() {
    let fixture = ProxyFixture::new(vec![connector(CENTRAL, 1).with_policy("releases", "never")]);
    fixture.put_local(JAR, b"local");
    fixture.transport.serve_with_sha1(CENTRAL, JAR, b"from central");

    let outcome = fixture.handler.fetch(MANAGED, JAR).await.unwrap();
    assert_eq!(std::fs::read(outcome.path().unwrap()).unwrap(), b"local");
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_repository() {
    let fixture = ProxyFixture::new(vec![]);
    let err = fixture.handler.fetch("nope", JAR).await.unwrap_err();
    assert!(matches!(err, ProxyError::UnknownRepository(id) if id == "nope"));
}
