use tabled::{Table, Tabled};

use crate::runner::RunReport;

/// Row for the per-filesystem query summary table
#[derive(Tabled)]
struct FilesystemRow {
    #[tabled(rename = "Filesystem")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Row for the crossing decisions table
#[derive(Tabled)]
struct CrossingRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Filesystem")]
    filesystem: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Tier")]
    tier: String,
}

pub fn render_report(report: &RunReport) -> String {
    let mut sections = Vec::new();

    let mut filesystem_rows: Vec<FilesystemRow> = report
        .filesystems_ok
        .iter()
        .map(|name| FilesystemRow {
            name: name.clone(),
            status: "ok".to_string(),
            detail: String::new(),
        })
        .collect();
    filesystem_rows.extend(report.filesystems_unavailable.iter().map(|fs| {
        FilesystemRow {
            name: fs.name.clone(),
            status: "unavailable".to_string(),
            detail: fs.reason.clone(),
        }
    }));

    if filesystem_rows.is_empty() {
        sections.push("No filesystems configured.".to_string());
    } else {
        sections.push(Table::new(filesystem_rows).to_string());
    }

    if report.crossings.is_empty() {
        sections.push("No new threshold crossings.".to_string());
    } else {
        let crossing_rows: Vec<CrossingRow> = report
            .crossings
            .iter()
            .map(|crossing| CrossingRow {
                entity: crossing.entity.clone(),
                kind: crossing.kind.to_string(),
                filesystem: crossing.filesystem.clone(),
                usage: format!("{}%", crossing.percent),
                tier: format!("{}%", crossing.tier),
            })
            .collect();
        sections.push(Table::new(crossing_rows).to_string());
    }

    let dry_run_note = if report.dry_run { " (dry run)" } else { "" };
    sections.push(format!(
        "Notifications sent: {}, failed: {}{}",
        report.notifications_sent, report.notifications_failed, dry_run_note
    ));

    sections.join("\n\n")
}

pub fn report_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
