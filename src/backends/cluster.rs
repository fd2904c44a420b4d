use tokio::process::Command;

use super::BackendError;
use crate::config::FilesystemConfig;
use crate::models::UsageRecord;
use crate::system::Roster;

/// Usage source for cluster filesystems with native per-group quota
/// accounting, queried in one bulk call to the quota reporting tool.
#[derive(Debug)]
pub struct ClusterSource;

impl ClusterSource {
    pub async fn query(
        &self,
        fs: &FilesystemConfig,
        roster: &Roster,
    ) -> Result<Vec<UsageRecord>, BackendError> {
        let gids = roster
            .groups()
            .iter()
            .map(|group| group.id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if gids.is_empty() {
            return Ok(Vec::new());
        }

        let output = Command::new("beegfs-ctl")
            .arg("--getquota")
            .arg("--csv")
            .arg(format!("--mount={}", fs.path.display()))
            .arg(format!("--storagepoolid={}", fs.storage_pool))
            .arg("--gid")
            .arg("--list")
            .arg(&gids)
            .output()
            .await
            .map_err(|e| BackendError::Unavailable(format!("beegfs-ctl: {e}")))?;

        if !output.status.success() {
            return Err(BackendError::Unavailable(format!(
                "beegfs-ctl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_quota_report(&String::from_utf8_lossy(&output.stdout), &fs.name, roster)
    }
}

/// Parse the tool's CSV report: a header row, then `name,gid,used,limit`
/// per group. Rows for groups missing from the roster are skipped.
fn parse_quota_report(
    output: &str,
    filesystem: &str,
    roster: &Roster,
) -> Result<Vec<UsageRecord>, BackendError> {
    let mut records = Vec::new();

    for line in output.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 4 {
            return Err(BackendError::Parse(format!(
                "expected 4 columns, got {}: {line:?}",
                fields.len()
            )));
        }

        let gid: u32 = fields[1]
            .trim()
            .parse()
            .map_err(|_| BackendError::Parse(format!("bad gid column: {line:?}")))?;
        let used: u64 = fields[2]
            .trim()
            .parse()
            .map_err(|_| BackendError::Parse(format!("bad used column: {line:?}")))?;
        let limit: u64 = fields[3]
            .trim()
            .parse()
            .map_err(|_| BackendError::Parse(format!("bad limit column: {line:?}")))?;

        let Some(group) = roster.group_by_id(gid) else {
            continue;
        };

        records.push(UsageRecord::new(group.clone(), filesystem, used, limit));
    }

    Ok(records)
}
