use anyhow::{bail, Result};
use clap::Args;
use tubepace_cli::{LogNotifier, UpdateChecker, UpdateOutcome};

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct CheckUpdateArgs {
    /// Manifest URL (defaults to TUBEPACE_MANIFEST_URL, then the project manifest)
    #[arg(long, value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Exit non-zero when the check itself fails
    #[arg(long)]
    pub strict: bool,
}

pub async fn cmd_check_update(args: CheckUpdateArgs, _ctx: &CliContext) -> Result<()> {
    let current = env!("CARGO_PKG_VERSION");
    let checker = match args.manifest_url {
        Some(url) => UpdateChecker::new(url, current)?,
        None => UpdateChecker::from_env(current)?,
    };

    let outcome = checker.check_and_notify(&LogNotifier).await;
    print_outcome(&checker, &outcome);
    if let UpdateOutcome::Failed(err) = &outcome {
        if args.strict {
            bail!("update check failed: {err}");
        }
    }
    Ok(())
}

pub(crate) fn print_outcome(checker: &UpdateChecker, outcome: &UpdateOutcome) {
    let notification = checker.notification(outcome);
    println!("{}", notification.body);
    if let Some(action) = notification.action {
        println!("{}: {}", action.label, action.url);
    }
}
