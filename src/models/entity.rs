use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an entity is a user account or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user or group known to the host system.
///
/// The name is kept alongside the numeric id because notification addresses
/// are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: u32,
    pub name: String,
}

impl Entity {
    pub fn user(id: u32, name: &str) -> Self {
        Self {
            kind: EntityKind::User,
            id,
            name: name.to_string(),
        }
    }

    pub fn group(id: u32, name: &str) -> Self {
        Self {
            kind: EntityKind::Group,
            id,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.id)
    }
}

/// A single usage sample for one entity on one filesystem.
///
/// Records are created fresh each run and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub entity: Entity,
    pub filesystem: String,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub sampled_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(entity: Entity, filesystem: &str, used_bytes: u64, capacity_bytes: u64) -> Self {
        Self {
            entity,
            filesystem: filesystem.to_string(),
            used_bytes,
            capacity_bytes,
            sampled_at: Utc::now(),
        }
    }

    /// Usage as an integer percentage, clamped to 0..=100.
    ///
    /// Zero capacity reads as 0%: an unlimited allocation can never cross a
    /// threshold.
    pub fn percent(&self) -> u8 {
        if self.capacity_bytes == 0 {
            return 0;
        }
        (self.used_bytes.saturating_mul(100) / self.capacity_bytes).min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(used: u64, capacity: u64) -> UsageRecord {
        UsageRecord::new(Entity::user(1001, "jdoe"), "main", used, capacity)
    }

    #[test]
    fn test_percent_basic() {
        assert_eq!(record(82, 100).percent(), 82);
        assert_eq!(record(0, 100).percent(), 0);
    }

    #[test]
    fn test_percent_rounds_down() {
        // 999/1000 bytes is 99%, not 100%
        assert_eq!(record(999, 1000).percent(), 99);
    }

    #[test]
    fn test_percent_clamped_over_capacity() {
        assert_eq!(record(150, 100).percent(), 100);
    }

    #[test]
    fn test_percent_zero_capacity() {
        assert_eq!(record(1_000_000, 0).percent(), 0);
    }

    #[test]
    fn test_entity_display() {
        let entity = Entity::group(200, "physics");
        assert_eq!(entity.to_string(), "group physics (200)");
    }
}
