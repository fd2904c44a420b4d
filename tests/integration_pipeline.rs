use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use qnotify::config::{BackendKind, Config, FilesystemConfig};
use qnotify::ledger::{Ledger, LedgerKey};
use qnotify::models::{Entity, EntityKind};
use qnotify::notify::{DeliveryError, Mailer, RenderedMessage};
use qnotify::runner::{RunReport, Runner};
use qnotify::system::Roster;

/// Full pipeline tests: sidecar-backed filesystems over temp JSON documents,
/// an on-disk temp ledger, an injected roster, and test mailers.

#[derive(Clone, Default)]
struct RecordingMailer {
    sent: Arc<Mutex<Vec<RenderedMessage>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, message: &RenderedMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

impl RecordingMailer {
    fn sent(&self) -> Vec<RenderedMessage> {
        self.sent.lock().unwrap().clone()
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn deliver(&self, _message: &RenderedMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::Build("transport is down".to_string()))
    }
}

fn roster() -> Roster {
    Roster::from_entities(
        vec![Entity::user(1001, "jdoe"), Entity::user(1002, "asmith")],
        Vec::new(),
    )
}

/// Write a sidecar usage document: (uid, used_bytes, capacity_bytes) triples.
fn write_usage(path: &Path, entries: &[(u32, u64, u64)]) {
    let entries: Vec<String> = entries
        .iter()
        .map(|(uid, used, capacity)| {
            format!(r#"{{"uid": {uid}, "used_bytes": {used}, "capacity_bytes": {capacity}}}"#)
        })
        .collect();
    let document = format!(r#"{{"entries": [{}]}}"#, entries.join(","));
    std::fs::write(path, document).unwrap();
}

fn sidecar_filesystem(name: &str, document: &Path, thresholds: &[u8]) -> FilesystemConfig {
    FilesystemConfig {
        name: name.to_string(),
        path: PathBuf::from("/mnt").join(name),
        kind: BackendKind::Sidecar,
        thresholds: thresholds.to_vec(),
        timeout_secs: 5,
        sidecar_path: Some(document.to_path_buf()),
        storage_pool: 1,
    }
}

fn test_config(filesystems: Vec<FilesystemConfig>, ledger_path: &Path) -> Config {
    let mut config = Config::default();
    config.filesystems = filesystems;
    config.run.ledger_path = ledger_path.to_path_buf();
    config.email.domain = "example.org".to_string();
    config
}

async fn run_once(config: &Config, mailer: Box<dyn Mailer>, dry_run: bool) -> RunReport {
    let ledger = Ledger::open(&config.run.ledger_path).unwrap();
    let mut runner = Runner::from_config(config, ledger, mailer, roster(), dry_run).unwrap();
    runner.run().await.unwrap()
}

fn ledger_tier(config: &Config, uid: u32, filesystem: &str) -> Option<u8> {
    let ledger = Ledger::open(&config.run.ledger_path).unwrap();
    ledger
        .last_tier(&LedgerKey {
            entity_id: uid,
            entity_kind: EntityKind::User,
            filesystem: filesystem.to_string(),
        })
        .unwrap()
}

#[tokio::test]
async fn test_concrete_scenario_three_runs() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&document, &[(1001, 82, 100)]);
    let config = test_config(
        vec![sidecar_filesystem("main", &document, &[50, 75, 90])],
        &ledger_path,
    );

    // First run: 82% crosses tier 75, one notification
    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.crossings.len(), 1);
    assert_eq!(report.crossings[0].tier, 75);
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(mailer.sent()[0].to, "jdoe@example.org");
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(75));

    // Second run, unchanged usage: already notified for tier 75
    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;
    assert_eq!(report.notifications_sent, 0);
    assert!(report.crossings.is_empty());
    assert!(mailer.sent().is_empty());
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(75));

    // Third run: usage rises to 91%, crossing tier 90
    write_usage(&document, &[(1001, 91, 100)]);
    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.crossings[0].tier, 90);
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(90));
}

#[tokio::test]
async fn test_hysteresis_cycle() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    let config = test_config(
        vec![sidecar_filesystem("main", &document, &[75, 90])],
        &ledger_path,
    );

    let mut total_sent = 0;
    for (percent, expect_sent) in [(60, 0), (80, 1), (60, 0), (85, 1)] {
        write_usage(&document, &[(1001, percent, 100)]);
        let mailer = RecordingMailer::default();
        let report = run_once(&config, Box::new(mailer.clone()), false).await;
        assert_eq!(
            report.notifications_sent, expect_sent,
            "unexpected notifications at {percent}%"
        );
        total_sent += report.notifications_sent;
    }
    assert_eq!(total_sent, 2);

    // The ledger re-armed when usage fell to 60%, so the 85% sample
    // re-notified for tier 75
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(75));
}

#[tokio::test]
async fn test_blocklisted_user_is_invisible() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&document, &[(1001, 99, 100), (1002, 99, 100)]);
    let mut config = test_config(
        vec![sidecar_filesystem("main", &document, &[90])],
        &ledger_path,
    );
    config.blocklist.users.push("1001".to_string());

    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;

    // Only the non-blocked user is evaluated and notified
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(mailer.sent()[0].to, "asmith@example.org");
    assert_eq!(ledger_tier(&config, 1001, "main"), None);
    assert_eq!(ledger_tier(&config, 1002, "main"), Some(90));
}

#[tokio::test]
async fn test_unavailable_filesystem_does_not_block_others() {
    let scratch = TempDir::new().unwrap();
    let good_document = scratch.path().join("good.json");
    let missing_document = scratch.path().join("never-written.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&good_document, &[(1001, 95, 100)]);
    let config = test_config(
        vec![
            sidecar_filesystem("good", &good_document, &[90]),
            sidecar_filesystem("bad", &missing_document, &[90]),
        ],
        &ledger_path,
    );

    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;

    assert_eq!(report.filesystems_ok, vec!["good".to_string()]);
    assert_eq!(report.filesystems_unavailable.len(), 1);
    assert_eq!(report.filesystems_unavailable[0].name, "bad");

    // The healthy filesystem still notified
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(ledger_tier(&config, 1001, "good"), Some(90));
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&document, &[(1001, 95, 100)]);
    let config = test_config(
        vec![sidecar_filesystem("main", &document, &[90])],
        &ledger_path,
    );

    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), true).await;

    // The decision is computed and observable, but nothing is persisted or
    // delivered
    assert!(report.dry_run);
    assert_eq!(report.crossings.len(), 1);
    assert_eq!(report.crossings[0].tier, 90);
    assert_eq!(report.notifications_sent, 0);
    assert!(mailer.sent().is_empty());
    assert_eq!(ledger_tier(&config, 1001, "main"), None);

    // A real run afterwards notifies exactly once, proving the dry run left
    // the ledger untouched
    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;
    assert_eq!(report.notifications_sent, 1);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_next_run() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&document, &[(1001, 82, 100)]);
    let config = test_config(
        vec![sidecar_filesystem("main", &document, &[75])],
        &ledger_path,
    );

    // Delivery fails: the crossing is computed but the ledger must not
    // advance
    let report = run_once(&config, Box::new(FailingMailer), false).await;
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(report.notifications_failed, 1);
    assert_eq!(ledger_tier(&config, 1001, "main"), None);

    // Next run with a healthy transport retries the same notification
    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(75));
}

#[tokio::test]
async fn test_crossings_on_multiple_filesystems_share_one_message() {
    let scratch = TempDir::new().unwrap();
    let main_document = scratch.path().join("main.json");
    let scratch_document = scratch.path().join("scratch.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&main_document, &[(1001, 82, 100)]);
    write_usage(&scratch_document, &[(1001, 95, 100)]);
    let config = test_config(
        vec![
            sidecar_filesystem("main", &main_document, &[75]),
            sidecar_filesystem("scratch", &scratch_document, &[90]),
        ],
        &ledger_path,
    );

    let mailer = RecordingMailer::default();
    let report = run_once(&config, Box::new(mailer.clone()), false).await;

    // Two crossings, one aggregated message
    assert_eq!(report.crossings.len(), 2);
    assert_eq!(report.notifications_sent, 1);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("main"));
    assert!(sent[0].body.contains("scratch"));
    assert_eq!(ledger_tier(&config, 1001, "main"), Some(75));
    assert_eq!(ledger_tier(&config, 1001, "scratch"), Some(90));
}

#[tokio::test]
async fn test_rerun_is_idempotent_across_filesystems() {
    let scratch = TempDir::new().unwrap();
    let document = scratch.path().join("main.json");
    let ledger_path = scratch.path().join("ledger.db");

    write_usage(&document, &[(1001, 82, 100), (1002, 91, 100)]);
    let config = test_config(
        vec![sidecar_filesystem("main", &document, &[50, 75, 90])],
        &ledger_path,
    );

    let first = RecordingMailer::default();
    let report = run_once(&config, Box::new(first.clone()), false).await;
    assert_eq!(report.notifications_sent, 2);

    // Unchanged usage data: the second run is silent and writes nothing
    let second = RecordingMailer::default();
    let report = run_once(&config, Box::new(second.clone()), false).await;
    assert_eq!(report.notifications_sent, 0);
    assert!(second.sent().is_empty());
}
