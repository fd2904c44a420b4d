use anyhow::{bail, Result};

use crate::config::Config;

/// Validate the configuration and exit without querying or notifying.
/// Every problem found is reported, not just the first.
pub fn handle_validate_command(config: &Config) -> Result<()> {
    let issues = config.validate();

    if issues.is_empty() {
        println!(
            "Configuration OK: {} filesystem(s) configured.",
            config.filesystems.len()
        );
        return Ok(());
    }

    for issue in &issues {
        eprintln!("error: {issue}");
    }
    bail!("{} configuration issue(s) found", issues.len())
}
