// Configuration module
pub mod settings;

pub use settings::{
    BackendKind, BlocklistConfig, Config, ConfigIssue, EmailConfig, FilesystemConfig, RunConfig,
};
