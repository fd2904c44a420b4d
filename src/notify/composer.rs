use std::collections::BTreeMap;

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::config::EmailConfig;
use crate::models::{Entity, UsageRecord};
use crate::utils::format_bytes;

/// One new threshold crossing: the sample that caused it and the tier it
/// reached.
#[derive(Debug, Clone, Serialize)]
pub struct Crossing {
    pub record: UsageRecord,
    pub tier: u8,
}

/// All of an entity's crossings for the current run. Rendered as exactly one
/// message to exactly one derived address.
#[derive(Debug, Clone)]
pub struct NotificationBatch {
    pub entity: Entity,
    pub crossings: Vec<Crossing>,
}

/// A message ready to hand to the delivery interface.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Caller-supplied template for notification mail. The usage summary table
/// is substituted between the header and footer paragraphs.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pub from: String,
    pub subject: String,
    pub domain: String,
    pub header: String,
    pub footer: String,
}

impl MessageTemplate {
    pub fn from_config(email: &EmailConfig) -> Self {
        Self {
            from: email.from.clone(),
            subject: email.subject.clone(),
            domain: email.domain.clone(),
            header: email.header.clone(),
            footer: email.footer.clone(),
        }
    }

    /// Recipient address for an entity: its system name at the configured
    /// domain.
    pub fn address_for(&self, entity: &Entity) -> String {
        format!("{}@{}", entity.name, self.domain.trim_start_matches('@'))
    }

    pub fn render(&self, batch: &NotificationBatch) -> RenderedMessage {
        let table = usage_table(&batch.crossings);
        let body = [self.header.as_str(), table.as_str(), self.footer.as_str()].join("\n\n");

        RenderedMessage {
            to: self.address_for(&batch.entity),
            from: self.from.clone(),
            subject: self.subject.clone(),
            body,
        }
    }
}

/// Group crossings into one batch per entity, in deterministic entity order.
pub fn batch_by_entity(crossings: Vec<Crossing>) -> Vec<NotificationBatch> {
    let mut by_entity: BTreeMap<Entity, Vec<Crossing>> = BTreeMap::new();
    for crossing in crossings {
        by_entity
            .entry(crossing.record.entity.clone())
            .or_default()
            .push(crossing);
    }

    by_entity
        .into_iter()
        .map(|(entity, crossings)| NotificationBatch { entity, crossings })
        .collect()
}

#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Filesystem")]
    filesystem: String,
    #[tabled(rename = "Used")]
    used: String,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
}

fn usage_table(crossings: &[Crossing]) -> String {
    let rows: Vec<UsageRow> = crossings
        .iter()
        .map(|crossing| UsageRow {
            filesystem: crossing.record.filesystem.clone(),
            used: format_bytes(crossing.record.used_bytes),
            capacity: format_bytes(crossing.record.capacity_bytes),
            usage: format!("{}%", crossing.record.percent()),
            threshold: format!("{}%", crossing.tier),
        })
        .collect();

    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> MessageTemplate {
        MessageTemplate {
            from: "no-reply@example.org".to_string(),
            subject: "Disk usage alert".to_string(),
            domain: "example.org".to_string(),
            header: "Header paragraph.".to_string(),
            footer: "Footer paragraph.".to_string(),
        }
    }

    fn crossing(entity: Entity, filesystem: &str, used: u64, tier: u8) -> Crossing {
        Crossing {
            record: UsageRecord::new(entity, filesystem, used, 100),
            tier,
        }
    }

    #[test]
    fn test_address_derivation() {
        let template = template();
        assert_eq!(
            template.address_for(&Entity::user(1001, "jdoe")),
            "jdoe@example.org"
        );
    }

    #[test]
    fn test_address_tolerates_leading_at() {
        let mut template = template();
        template.domain = "@example.org".to_string();
        assert_eq!(
            template.address_for(&Entity::user(1001, "jdoe")),
            "jdoe@example.org"
        );
    }

    #[test]
    fn test_render_lists_every_filesystem() {
        let entity = Entity::user(1001, "jdoe");
        let batch = NotificationBatch {
            entity: entity.clone(),
            crossings: vec![
                crossing(entity.clone(), "main", 82, 75),
                crossing(entity, "scratch", 95, 90),
            ],
        };

        let message = template().render(&batch);
        assert_eq!(message.to, "jdoe@example.org");
        assert!(message.body.starts_with("Header paragraph."));
        assert!(message.body.ends_with("Footer paragraph."));
        assert!(message.body.contains("main"));
        assert!(message.body.contains("scratch"));
        assert!(message.body.contains("82%"));
        assert!(message.body.contains("95%"));
    }

    #[test]
    fn test_batching_groups_by_entity() {
        let jdoe = Entity::user(1001, "jdoe");
        let asmith = Entity::user(1002, "asmith");

        let batches = batch_by_entity(vec![
            crossing(jdoe.clone(), "main", 82, 75),
            crossing(asmith.clone(), "main", 91, 90),
            crossing(jdoe.clone(), "scratch", 76, 75),
        ]);

        assert_eq!(batches.len(), 2);
        let jdoe_batch = batches.iter().find(|b| b.entity == jdoe).unwrap();
        assert_eq!(jdoe_batch.crossings.len(), 2);
        let asmith_batch = batches.iter().find(|b| b.entity == asmith).unwrap();
        assert_eq!(asmith_batch.crossings.len(), 1);
    }
}
