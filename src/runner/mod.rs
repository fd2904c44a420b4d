// Run orchestration module

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backends::{Backend, BackendError};
use crate::config::{Config, FilesystemConfig};
use crate::evaluate::{current_tier, evaluate, BlockList, BlockRuleError, CrossingDecision};
use crate::ledger::{Ledger, LedgerError, LedgerKey, LedgerOp};
use crate::models::{EntityKind, UsageRecord};
use crate::notify::{batch_by_entity, Crossing, Mailer, MessageTemplate};
use crate::system::Roster;

/// Fatal run failures. Per-filesystem and per-delivery problems never abort
/// the run; they are recorded in the report instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Serialize)]
pub struct UnavailableFilesystem {
    pub name: String,
    pub reason: String,
}

/// One crossing decision computed this run, kept in the report so dry runs
/// stay observable.
#[derive(Debug, Clone, Serialize)]
pub struct CrossingSummary {
    pub entity: String,
    pub kind: EntityKind,
    pub filesystem: String,
    pub percent: u8,
    pub tier: u8,
}

/// What happened during one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub filesystems_ok: Vec<String>,
    pub filesystems_unavailable: Vec<UnavailableFilesystem>,
    pub crossings: Vec<CrossingSummary>,
    pub notifications_sent: u32,
    pub notifications_failed: u32,
}

/// Drives one full check: concurrent filesystem queries, block-list
/// filtering, threshold evaluation against the ledger, and notification
/// dispatch.
pub struct Runner {
    filesystems: Vec<FilesystemConfig>,
    max_concurrent: usize,
    template: MessageTemplate,
    user_blocklist: BlockList,
    group_blocklist: BlockList,
    ledger: Ledger,
    mailer: Box<dyn Mailer>,
    roster: Arc<Roster>,
    dry_run: bool,
}

impl Runner {
    pub fn from_config(
        config: &Config,
        ledger: Ledger,
        mailer: Box<dyn Mailer>,
        roster: Roster,
        dry_run: bool,
    ) -> Result<Self, BlockRuleError> {
        Ok(Self {
            filesystems: config.filesystems.clone(),
            max_concurrent: config.run.max_concurrent_checks,
            template: MessageTemplate::from_config(&config.email),
            user_blocklist: config.user_blocklist()?,
            group_blocklist: config.group_blocklist()?,
            ledger,
            mailer,
            roster: Arc::new(roster),
            dry_run,
        })
    }

    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        let mut report = RunReport {
            dry_run: self.dry_run,
            ..RunReport::default()
        };

        let records = self.query_filesystems(&mut report).await;
        let records = self.apply_blocklists(records);
        self.evaluate_and_dispatch(records, &mut report).await?;

        tracing::info!(
            ok = report.filesystems_ok.len(),
            unavailable = report.filesystems_unavailable.len(),
            sent = report.notifications_sent,
            failed = report.notifications_failed,
            "run complete"
        );
        Ok(report)
    }

    /// Query every configured filesystem concurrently, bounded by the
    /// configured fan-out, each bounded by its own timeout. A failed or
    /// timed-out query marks only that filesystem unavailable.
    async fn query_filesystems(&self, report: &mut RunReport) -> Vec<UsageRecord> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<(String, Result<Vec<UsageRecord>, BackendError>)> = JoinSet::new();

        for fs in self.filesystems.clone() {
            let semaphore = Arc::clone(&semaphore);
            let roster = Arc::clone(&self.roster);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                tracing::debug!(filesystem = %fs.name, "querying");
                let backend = Backend::for_kind(fs.kind);
                let outcome = match tokio::time::timeout(fs.timeout(), backend.query(&fs, &roster))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::TimedOut(fs.timeout_secs)),
                };

                (fs.name, outcome)
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((name, outcome)) = joined else {
                tracing::error!("filesystem query task panicked");
                continue;
            };

            match outcome {
                Ok(mut found) => {
                    tracing::info!(filesystem = %name, records = found.len(), "query ok");
                    report.filesystems_ok.push(name);
                    records.append(&mut found);
                }
                Err(err) => {
                    tracing::warn!(filesystem = %name, error = %err, "filesystem unavailable");
                    report.filesystems_unavailable.push(UnavailableFilesystem {
                        name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.filesystems_ok.sort();
        report.filesystems_unavailable.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Drop records for block-listed entities before any ledger traffic.
    fn apply_blocklists(&self, records: Vec<UsageRecord>) -> Vec<UsageRecord> {
        records
            .into_iter()
            .filter(|record| {
                let blocked = match record.entity.kind {
                    EntityKind::User => self.user_blocklist.contains(record.entity.id),
                    EntityKind::Group => self.group_blocklist.contains(record.entity.id),
                };
                if blocked {
                    tracing::debug!(entity = %record.entity, "block-listed, skipping");
                }
                !blocked
            })
            .collect()
    }

    async fn evaluate_and_dispatch(
        &mut self,
        mut records: Vec<UsageRecord>,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        // Deterministic evaluation order across runs
        records.sort_by(|a, b| {
            a.entity
                .cmp(&b.entity)
                .then_with(|| a.filesystem.cmp(&b.filesystem))
        });

        let thresholds: BTreeMap<&str, &[u8]> = self
            .filesystems
            .iter()
            .map(|fs| (fs.name.as_str(), fs.thresholds.as_slice()))
            .collect();

        let mut reset_ops = Vec::new();
        let mut crossings = Vec::new();

        for record in records {
            let Some(thresholds) = thresholds.get(record.filesystem.as_str()) else {
                continue;
            };

            let key = LedgerKey::for_record(&record);
            let last = self.ledger.last_tier(&key)?;
            let tier_now = current_tier(record.percent(), thresholds);

            match evaluate(tier_now, last) {
                CrossingDecision::Notify { tier } => {
                    report.crossings.push(CrossingSummary {
                        entity: record.entity.name.clone(),
                        kind: record.entity.kind,
                        filesystem: record.filesystem.clone(),
                        percent: record.percent(),
                        tier,
                    });
                    crossings.push(Crossing { record, tier });
                }
                CrossingDecision::Unchanged => {}
                CrossingDecision::Reset { to } => {
                    reset_ops.push(match to {
                        Some(tier) => LedgerOp::Set { key, tier },
                        None => LedgerOp::Clear { key },
                    });
                }
            }
        }

        if self.dry_run {
            tracing::info!(
                pending = crossings.len(),
                "dry run: skipping ledger updates and delivery"
            );
            return Ok(());
        }

        // Resets carry no notification, so they commit regardless of how
        // delivery goes below.
        self.ledger.apply(&reset_ops)?;

        for batch in batch_by_entity(crossings) {
            let message = self.template.render(&batch);

            match self.mailer.deliver(&message).await {
                Ok(()) => {
                    // Advance the ledger only once the mail is out; a crash
                    // in between re-sends rather than silently losing the
                    // notification.
                    let ops: Vec<LedgerOp> = batch
                        .crossings
                        .iter()
                        .map(|crossing| LedgerOp::Set {
                            key: LedgerKey::for_record(&crossing.record),
                            tier: crossing.tier,
                        })
                        .collect();
                    self.ledger.apply(&ops)?;
                    report.notifications_sent += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        entity = %batch.entity,
                        error = %err,
                        "delivery failed, ledger left untouched for retry"
                    );
                    report.notifications_failed += 1;
                }
            }
        }

        Ok(())
    }
}
