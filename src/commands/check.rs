use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::ledger::{Ledger, LedgerError};
use crate::notify::{Mailer, RenderedMessage, SmtpMailer};
use crate::output;
use crate::runner::{RunError, Runner};
use crate::system::Roster;

/// Run a full quota check. Returns an error only for configuration or ledger
/// failures; unavailable filesystems and failed deliveries are reported but
/// leave the exit status at zero.
pub async fn handle_check_command(config: &Config, dry_run: bool, json: bool) -> Result<()> {
    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("error: {issue}");
        }
        bail!("configuration is invalid ({} issue(s))", issues.len());
    }

    let roster = Roster::load().context("Failed to load system account databases")?;

    let ledger = match Ledger::open(&config.run.ledger_path) {
        Ok(ledger) => ledger,
        Err(err) => {
            escalate_ledger_failure(config, &err).await;
            return Err(err.into());
        }
    };

    let mailer: Box<dyn Mailer> = Box::new(SmtpMailer::new(
        &config.email.smtp_host,
        config.email.smtp_port,
    ));
    let mut runner = Runner::from_config(config, ledger, mailer, roster, dry_run)
        .context("Failed to compile block-lists")?;

    match runner.run().await {
        Ok(report) => {
            if json {
                println!("{}", output::report_json(&report)?);
            } else {
                println!("{}", output::render_report(&report));
            }
            Ok(())
        }
        Err(RunError::Ledger(err)) => {
            escalate_ledger_failure(config, &err).await;
            Err(err.into())
        }
    }
}

/// Best-effort mail to the configured administrators when the run aborts on
/// ledger storage.
async fn escalate_ledger_failure(config: &Config, failure: &LedgerError) {
    if config.email.admin_contacts.is_empty() {
        return;
    }

    let mailer = SmtpMailer::new(&config.email.smtp_host, config.email.smtp_port);
    for admin in &config.email.admin_contacts {
        let message = RenderedMessage {
            to: admin.clone(),
            from: config.email.from.clone(),
            subject: format!("{}: ledger storage failure", config.email.subject),
            body: format!(
                "The quota check aborted before completing:\n\n{failure}\n\n\
                 No notifications were recorded for this run."
            ),
        };

        if let Err(err) = mailer.deliver(&message).await {
            tracing::error!(admin = %admin, error = %err, "failed to escalate ledger failure");
        }
    }
}
