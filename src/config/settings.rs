use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::evaluate::{BlockList, BlockRule, BlockRuleError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filesystems: Vec<FilesystemConfig>,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

/// Which usage backend serves a filesystem. A closed set: an unknown tag in
/// the config file is rejected when the file is parsed, before any querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Generic,
    Cluster,
    Sidecar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Human readable name, unique across the config.
    pub name: String,
    /// Absolute path to the mounted filesystem.
    pub path: PathBuf,
    pub kind: BackendKind,
    /// Usage percentages to notify at, strictly increasing.
    pub thresholds: Vec<u8>,
    /// Give up on this filesystem's query after this many seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pre-computed usage document, required for the sidecar backend.
    #[serde(default)]
    pub sidecar_path: Option<PathBuf>,
    /// Storage pool id passed to the cluster quota tool.
    #[serde(default = "default_storage_pool")]
    pub storage_pool: u32,
}

impl FilesystemConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistConfig {
    /// User ids to exclude, as "<id>" or "<low>-<high>" ranges.
    #[serde(default)]
    pub users: Vec<String>,
    /// Group ids to exclude, same syntax.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            users: vec!["0".to_string()],
            groups: vec!["0".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Upper bound on filesystems queried at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// Location of the notification ledger database.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: default_max_concurrent(),
            ledger_path: default_ledger_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host. Empty means the local platform transport.
    #[serde(default)]
    pub smtp_host: String,
    /// SMTP port. Zero means the transport default.
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default = "default_email_from")]
    pub from: String,
    #[serde(default = "default_email_subject")]
    pub subject: String,
    /// Appended to entity names to build recipient addresses. The leading
    /// `@` is optional.
    #[serde(default = "default_email_domain")]
    pub domain: String,
    /// Opening paragraph shown before the usage summary table.
    #[serde(default = "default_email_header")]
    pub header: String,
    /// Closing paragraph shown after the usage summary table.
    #[serde(default = "default_email_footer")]
    pub footer: String,
    /// Escalation contacts for ledger storage failures.
    #[serde(default)]
    pub admin_contacts: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 0,
            from: default_email_from(),
            subject: default_email_subject(),
            domain: default_email_domain(),
            header: default_email_header(),
            footer: default_email_footer(),
            admin_contacts: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_storage_pool() -> u32 {
    1
}

fn default_max_concurrent() -> usize {
    4
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("/var/lib/qnotify/ledger.db")
}

fn default_email_from() -> String {
    "no-reply@localhost".to_string()
}

fn default_email_subject() -> String {
    "Disk usage alert".to_string()
}

fn default_email_domain() -> String {
    "localhost".to_string()
}

fn default_email_header() -> String {
    "This is an automated notification concerning your storage usage. \
     One or more of your quotas have crossed a usage threshold:"
        .to_string()
}

fn default_email_footer() -> String {
    "If you need additional storage, please contact your system administrators.".to_string()
}

/// A single configuration problem, named after the offending field.
/// Validation reports every issue found, not just the first.
#[derive(Debug, thiserror::Error)]
pub enum ConfigIssue {
    #[error("filesystem #{index}: name must not be blank")]
    BlankName { index: usize },
    #[error("filesystem `{name}`: declared more than once")]
    DuplicateName { name: String },
    #[error("filesystem `{name}`: path `{path}` is already monitored")]
    DuplicatePath { name: String, path: String },
    #[error("filesystem `{name}`: mount path `{path}` does not exist")]
    MissingMount { name: String, path: String },
    #[error("filesystem `{name}`: at least one threshold is required")]
    NoThresholds { name: String },
    #[error("filesystem `{name}`: threshold {value} is outside 1..=100")]
    ThresholdOutOfRange { name: String, value: u8 },
    #[error("filesystem `{name}`: thresholds must be strictly increasing")]
    ThresholdsNotIncreasing { name: String },
    #[error("filesystem `{name}`: timeout_secs must be greater than zero")]
    ZeroTimeout { name: String },
    #[error("filesystem `{name}`: sidecar backend requires sidecar_path")]
    MissingSidecarPath { name: String },
    #[error("blocklist.{list}: {source}")]
    BadBlockRule {
        list: &'static str,
        source: BlockRuleError,
    },
    #[error("run.max_concurrent_checks must be greater than zero")]
    ZeroConcurrency,
}

impl Config {
    /// Load configuration from an explicit path, or from the default path.
    ///
    /// An explicit path must exist. A missing default file yields built-in
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(explicit) => Self::from_file(Path::new(explicit)),
            None => {
                let default = Self::default_path()?;
                if !default.exists() {
                    return Ok(Self::default());
                }
                Self::from_file(&default)
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf> {
        let system = PathBuf::from("/etc/qnotify/config.toml");
        if system.exists() {
            return Ok(system);
        }

        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".config").join("qnotify").join("config.toml"))
    }

    /// Check every field and return the full list of problems found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut seen_paths: HashSet<&Path> = HashSet::new();

        for (index, fs) in self.filesystems.iter().enumerate() {
            if fs.name.trim().is_empty() {
                issues.push(ConfigIssue::BlankName { index });
                continue;
            }

            if !seen_names.insert(&fs.name) {
                issues.push(ConfigIssue::DuplicateName {
                    name: fs.name.clone(),
                });
            }
            if !seen_paths.insert(&fs.path) {
                issues.push(ConfigIssue::DuplicatePath {
                    name: fs.name.clone(),
                    path: fs.path.display().to_string(),
                });
            }

            // Only backends that touch the mount need it to exist; the
            // sidecar backend reads its document instead.
            if matches!(fs.kind, BackendKind::Generic | BackendKind::Cluster) && !fs.path.exists() {
                issues.push(ConfigIssue::MissingMount {
                    name: fs.name.clone(),
                    path: fs.path.display().to_string(),
                });
            }

            if fs.thresholds.is_empty() {
                issues.push(ConfigIssue::NoThresholds {
                    name: fs.name.clone(),
                });
            }
            for threshold in &fs.thresholds {
                if *threshold == 0 || *threshold > 100 {
                    issues.push(ConfigIssue::ThresholdOutOfRange {
                        name: fs.name.clone(),
                        value: *threshold,
                    });
                }
            }
            if fs.thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
                issues.push(ConfigIssue::ThresholdsNotIncreasing {
                    name: fs.name.clone(),
                });
            }

            if fs.timeout_secs == 0 {
                issues.push(ConfigIssue::ZeroTimeout {
                    name: fs.name.clone(),
                });
            }

            if fs.kind == BackendKind::Sidecar && fs.sidecar_path.is_none() {
                issues.push(ConfigIssue::MissingSidecarPath {
                    name: fs.name.clone(),
                });
            }
        }

        for (list, rules) in [
            ("users", &self.blocklist.users),
            ("groups", &self.blocklist.groups),
        ] {
            for rule in rules {
                if let Err(source) = rule.parse::<BlockRule>() {
                    issues.push(ConfigIssue::BadBlockRule { list, source });
                }
            }
        }

        if self.run.max_concurrent_checks == 0 {
            issues.push(ConfigIssue::ZeroConcurrency);
        }

        issues
    }

    pub fn user_blocklist(&self) -> Result<BlockList, BlockRuleError> {
        compile_blocklist(&self.blocklist.users)
    }

    pub fn group_blocklist(&self) -> Result<BlockList, BlockRuleError> {
        compile_blocklist(&self.blocklist.groups)
    }
}

fn compile_blocklist(rules: &[String]) -> Result<BlockList, BlockRuleError> {
    let rules = rules
        .iter()
        .map(|rule| rule.parse())
        .collect::<Result<Vec<BlockRule>, _>>()?;
    Ok(BlockList::new(rules))
}
