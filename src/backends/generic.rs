use std::path::Path;
use tokio::process::Command;

use super::BackendError;
use crate::config::FilesystemConfig;
use crate::models::UsageRecord;
use crate::system::Roster;

/// Usage source for plain filesystems without native quota accounting.
///
/// Each subdirectory of the mount whose name matches a known group is that
/// group's territory and is measured with a recursive disk-usage query.
/// Subdirectories that match no group are ignored, and a group without a
/// directory simply yields no record.
#[derive(Debug)]
pub struct GenericSource;

impl GenericSource {
    pub async fn query(
        &self,
        fs: &FilesystemConfig,
        roster: &Roster,
    ) -> Result<Vec<UsageRecord>, BackendError> {
        let capacity = mount_capacity(&fs.path).await?;

        let entries = std::fs::read_dir(&fs.path).map_err(|e| {
            BackendError::Unavailable(format!("cannot list {}: {e}", fs.path.display()))
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|file_type| file_type.is_dir()) {
                continue;
            }

            let dir_name = entry.file_name();
            let Some(group) = roster.group_named(&dir_name.to_string_lossy()) else {
                continue;
            };

            let used = directory_usage(&entry.path()).await?;
            records.push(UsageRecord::new(group.clone(), &fs.name, used, capacity));
        }

        Ok(records)
    }
}

/// Total size of the mounted filesystem in bytes, via `df`.
async fn mount_capacity(path: &Path) -> Result<u64, BackendError> {
    let output = Command::new("df")
        .arg("-B1")
        .arg("--output=size")
        .arg(path)
        .output()
        .await
        .map_err(|e| BackendError::Unavailable(format!("df: {e}")))?;

    if !output.status.success() {
        return Err(BackendError::Unavailable(format!(
            "df exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_df_size(&String::from_utf8_lossy(&output.stdout))
}

fn parse_df_size(output: &str) -> Result<u64, BackendError> {
    // Header row, then the size in bytes
    output
        .lines()
        .nth(1)
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| BackendError::Parse(format!("df output missing size column: {output:?}")))
}

/// Bytes used under one directory, via `du -sb`.
async fn directory_usage(dir: &Path) -> Result<u64, BackendError> {
    let output = Command::new("du")
        .arg("-sb")
        .arg(dir)
        .output()
        .await
        .map_err(|e| BackendError::Unavailable(format!("du: {e}")))?;

    if !output.status.success() {
        return Err(BackendError::Unavailable(format!(
            "du exited with {} for {}",
            output.status,
            dir.display()
        )));
    }

    parse_du_usage(&String::from_utf8_lossy(&output.stdout))
}

fn parse_du_usage(output: &str) -> Result<u64, BackendError> {
    output
        .split_whitespace()
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| BackendError::Parse(format!("du output missing size field: {output:?}")))
}
