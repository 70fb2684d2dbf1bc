use super::check_update::cmd_check_update;
use super::config::cmd_config;
use super::env::CliArgs;
use super::menu::cmd_commands;
use super::watch::cmd_watch;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Watch(args) => cmd_watch(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Commands(args) => cmd_commands(args, ctx).await,
        Commands::CheckUpdate(args) => cmd_check_update(args, ctx).await,
    }
}
