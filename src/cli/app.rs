use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::init_logging;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format)?;
    debug!(
        target: "tubepace",
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "starting tubepace"
    );

    let ctx = CliContext::new(cli.config.as_deref(), cli.output)?;
    debug!(target: "tubepace", path = %ctx.config_path().display(), "settings file");

    match dispatch(&cli, &ctx).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(target: "tubepace", "command failed: {:#}", err);
            Err(err)
        }
    }
}
