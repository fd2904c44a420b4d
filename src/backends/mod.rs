// Usage source backends module
pub mod cluster;
pub mod generic;
pub mod sidecar;

pub use cluster::ClusterSource;
pub use generic::GenericSource;
pub use sidecar::SidecarSource;

use crate::config::{BackendKind, FilesystemConfig};
use crate::models::UsageRecord;
use crate::system::Roster;

/// Why a filesystem contributed no usage records this run. Never fatal for
/// the run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backing tool or document could not be used at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The query did not finish inside the configured deadline.
    #[error("query timed out after {0} seconds")]
    TimedOut(u64),
    /// The tool ran but produced output we could not understand.
    #[error("unexpected tool output: {0}")]
    Parse(String),
}

/// Closed set of usage backends. Adding a filesystem kind means adding a
/// variant here and an arm in [`Backend::for_kind`].
#[derive(Debug)]
pub enum Backend {
    Generic(GenericSource),
    Cluster(ClusterSource),
    Sidecar(SidecarSource),
}

impl Backend {
    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Generic => Backend::Generic(GenericSource),
            BackendKind::Cluster => Backend::Cluster(ClusterSource),
            BackendKind::Sidecar => Backend::Sidecar(SidecarSource),
        }
    }

    /// Produce usage records for the roster's entities on one filesystem.
    ///
    /// The caller owns the deadline: queries are raced against the
    /// descriptor's timeout and a loss is reported as [`BackendError::TimedOut`].
    pub async fn query(
        &self,
        fs: &FilesystemConfig,
        roster: &Roster,
    ) -> Result<Vec<UsageRecord>, BackendError> {
        match self {
            Backend::Generic(source) => source.query(fs, roster).await,
            Backend::Cluster(source) => source.query(fs, roster).await,
            Backend::Sidecar(source) => source.query(fs, roster).await,
        }
    }
}
