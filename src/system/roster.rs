use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::{Entity, EntityKind};

/// Users and groups known to the host, read once per run from the system
/// account databases.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    users: Vec<Entity>,
    groups: Vec<Entity>,
}

impl Roster {
    pub fn load() -> Result<Self> {
        Self::from_files(Path::new("/etc/passwd"), Path::new("/etc/group"))
    }

    pub fn from_files(passwd: &Path, group: &Path) -> Result<Self> {
        let passwd_contents = fs::read_to_string(passwd)
            .with_context(|| format!("Failed to read user database: {}", passwd.display()))?;
        let group_contents = fs::read_to_string(group)
            .with_context(|| format!("Failed to read group database: {}", group.display()))?;

        Ok(Self {
            users: parse_account_db(&passwd_contents, EntityKind::User),
            groups: parse_account_db(&group_contents, EntityKind::Group),
        })
    }

    /// Build a roster from known entities. Used by tests and callers that
    /// already have the account list.
    pub fn from_entities(users: Vec<Entity>, groups: Vec<Entity>) -> Self {
        Self { users, groups }
    }

    pub fn users(&self) -> &[Entity] {
        &self.users
    }

    pub fn groups(&self) -> &[Entity] {
        &self.groups
    }

    pub fn group_named(&self, name: &str) -> Option<&Entity> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn user_by_id(&self, uid: u32) -> Option<&Entity> {
        self.users.iter().find(|user| user.id == uid)
    }

    pub fn group_by_id(&self, gid: u32) -> Option<&Entity> {
        self.groups.iter().find(|group| group.id == gid)
    }
}

/// Parse colon-separated account records ("name:password:id:...").
/// Malformed lines are skipped rather than failing the whole database.
fn parse_account_db(contents: &str, kind: EntityKind) -> Vec<Entity> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let mut fields = line.split(':');
            let name = fields.next()?;
            let _password = fields.next()?;
            let id: u32 = fields.next()?.trim().parse().ok()?;

            Some(Entity {
                kind,
                id,
                name: name.to_string(),
            })
        })
        .collect()
}
