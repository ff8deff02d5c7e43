use std::sync::Arc;
use std::time::Duration;

use migr_api::{ApiClient, PollConfig, RequestExecutor, RetryPolicy};
use migr_core::config::MigrConfig;
use migr_core::error::MigrError;
use migr_core::models::source::SourceType;
use migr_core::models::target::{ImportFile, ImportTarget, Target};
use migr_log::category::SUBMITTED_TARGETS_LOG;
use migr_log::FileLogSink;
use migr_sync::{run_import, sync_org, BatchScheduler, ImportContext, SyncSettings};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(server: &MockServer, log_dir: &std::path::Path) -> ApiClient {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    };
    let executor = RequestExecutor::new(&server.uri(), "test-token", policy).unwrap();
    let poll = PollConfig {
        max_attempts: 5,
        interval: Duration::from_millis(5),
        max_wait: Some(Duration::from_secs(5)),
    };
    ApiClient::new(executor, Arc::new(FileLogSink::new(log_dir)), poll)
}

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_config_defaults() {
    let config = MigrConfig::default();
    assert_eq!(config.concurrency, 5);
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.retry.base_delay_ms, 2_000);
    assert_eq!(config.entitlements, vec!["openSource".to_string()]);
}

#[test]
fn test_config_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = MigrConfig::default();
    config.concurrency = 12;
    config.exclusion_globs = vec!["fixtures".to_string()];
    config.save_to(&path).unwrap();

    let loaded = MigrConfig::load_from(&path).unwrap();
    assert_eq!(loaded.concurrency, 12);
    assert_eq!(loaded.exclusion_globs, vec!["fixtures".to_string()]);
    assert_eq!(loaded.poll.interval_secs, config.poll.interval_secs);
}

#[test]
fn test_import_file_roundtrip_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets/import.json");

    let file = ImportFile {
        targets: vec![
            ImportTarget::new("o", "i", Target::repo("snyk", "cli", Some("main"))),
            ImportTarget::new("o", "i", Target::GitLab {
                id: 42,
                branch: None,
                name: None,
            }),
        ],
    };
    file.save_to(&path).unwrap();

    let loaded = ImportFile::load_from(&path).unwrap();
    let ids: Vec<String> = loaded.targets.iter().map(|t| t.target_id().0).collect();
    assert_eq!(ids, vec!["o:i:cli:snyk:main", "o:i:42"]);

    let err = ImportFile::load_from(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, MigrError::PathNotFound { .. }));
}

#[tokio::test]
async fn test_import_run_writes_logs_and_rerun_skips() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/org/o/integrations/i/import"))
        .and(body_partial_json(json!({"target": {"name": "bad"}})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "no such repo"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/org/o/integrations/i/import"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("location", format!("{}/jobs/1", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/jobs/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "logs": [{"projects": [
                {"targetFile": "package.json", "success": true, "projectUrl": "https://app/p/1"}
            ]}]
        })))
        .mount(&server)
        .await;

    let logs = tempfile::tempdir().unwrap();
    let targets = || {
        ["cli", "bad", "api"]
            .iter()
            .map(|name| ImportTarget::new("o", "i", Target::repo("snyk", name, Some("main"))))
            .collect::<Vec<_>>()
    };

    let mut ctx = ImportContext::from_config(fast_client(&server, logs.path()), &MigrConfig::default());
    ctx.concurrency = 2;
    ctx.previous_log = Some(logs.path().join(SUBMITTED_TARGETS_LOG));

    let first = run_import(targets(), &ctx).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.processed, 3);
    assert_eq!(first.failed_targets, 1);
    assert_eq!(first.succeeded_projects, 2);

    let submitted = read_lines(&logs.path().join(SUBMITTED_TARGETS_LOG));
    assert_eq!(submitted.len(), 2);
    let failed = read_lines(&logs.path().join("failed-imports.log"));
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["status"], 400);
    assert!(logs.path().join("o.imported-projects.log").exists());

    // The second run reads the first run's submitted log.
    let second = run_import(targets(), &ctx).await.unwrap();
    assert_eq!(second.skipped, 2);
    assert_eq!(second.processed, 1);
    assert_eq!(
        second.summary_line(logs.path()),
        format!("1 processed out of 3, 2 skipped, see logs at {}", logs.path().display())
    );
}

#[tokio::test]
async fn test_sync_org_against_github() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/org/o1/featureflags/customBranch"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/org/o1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [
                {"id": "p1", "name": "snyk/cli:package.json", "origin": "github",
                 "type": "npm", "branch": "master", "status": "active"},
                {"id": "p2", "name": "snyk/cli:old/package.json", "origin": "github",
                 "type": "npm", "branch": "master", "status": "active"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/snyk/cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "full_name": "snyk/cli", "name": "cli",
            "owner": {"login": "snyk"},
            "clone_url": "https://github.com/snyk/cli.git",
            "default_branch": "main"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/snyk/cli/git/trees/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tree": [
                {"path": "package.json", "type": "blob"},
                {"path": "web/package.json", "type": "blob"},
                {"path": "web", "type": "tree"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/org/o1/project/p\d$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/org/o1/project/p2/deactivate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/org/o1/integrations/i1/import"))
        .and(body_partial_json(json!({"files": [{"path": "web/package.json"}]})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("location", format!("{}/jobs/9", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "logs": [{"projects": [{"targetFile": "web/package.json", "success": true}]}]
        })))
        .mount(&server)
        .await;

    let logs = tempfile::tempdir().unwrap();
    let api = fast_client(&server, logs.path());
    let host_url = url::Url::parse(&server.uri()).unwrap();
    let provider = migr_host::create_provider(SourceType::GitHub, Some(&host_url), "gh").unwrap();
    let settings = SyncSettings {
        org_id: "o1".to_string(),
        integration_id: "i1".to_string(),
        source: SourceType::GitHub,
        namespace: Some("snyk".to_string()),
        dry_run: false,
        allowed_types: vec!["npm"],
        exclusion_globs: Vec::new(),
        clone: None,
    };

    let summary = sync_org(&api, provider.as_ref(), &settings, &BatchScheduler::new(5))
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.failed, 0);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.target, "snyk/cli");
    assert_eq!(outcome.imported, vec!["web/package.json"]);
    assert_eq!(outcome.deactivated, vec!["p2"]);
    assert!(outcome.branches_updated() >= 1);
    assert!(outcome.record.errors.is_empty());

    assert!(!read_lines(&logs.path().join("o1.updated-projects.log")).is_empty());
}
