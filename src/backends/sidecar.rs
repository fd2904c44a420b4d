use serde::Deserialize;

use super::BackendError;
use crate::config::FilesystemConfig;
use crate::models::UsageRecord;
use crate::system::Roster;

/// Usage source backed by a pre-computed usage document that an out-of-band
/// job keeps up to date. The document may be stale; freshness is the
/// producer's concern. A missing or malformed document makes the filesystem
/// unavailable for the run.
#[derive(Debug)]
pub struct SidecarSource;

#[derive(Debug, Deserialize)]
pub struct SidecarDocument {
    pub entries: Vec<SidecarEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SidecarEntry {
    pub uid: u32,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
}

impl SidecarSource {
    pub async fn query(
        &self,
        fs: &FilesystemConfig,
        roster: &Roster,
    ) -> Result<Vec<UsageRecord>, BackendError> {
        let Some(path) = fs.sidecar_path.as_ref() else {
            return Err(BackendError::Unavailable(
                "sidecar_path not configured".to_string(),
            ));
        };

        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            BackendError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;

        let document: SidecarDocument = serde_json::from_str(&contents).map_err(|e| {
            BackendError::Unavailable(format!("malformed usage document {}: {e}", path.display()))
        })?;

        let records = document
            .entries
            .into_iter()
            .filter_map(|entry| {
                let user = roster.user_by_id(entry.uid)?;
                Some(UsageRecord::new(
                    user.clone(),
                    &fs.name,
                    entry.used_bytes,
                    entry.capacity_bytes,
                ))
            })
            .collect();

        Ok(records)
    }
}
