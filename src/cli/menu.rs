use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tubepace_cli::{load_settings, register_all, Command, LogNotifier, MenuSurface, UpdateChecker};

use super::check_update::print_outcome;
use super::config::apply;
use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct CommandsArgs {
    /// Invoke a command id (for example `rate:1.5` or `toggle:live`)
    #[arg(long, value_name = "ID")]
    pub invoke: Option<String>,
}

pub async fn cmd_commands(args: CommandsArgs, ctx: &CliContext) -> Result<()> {
    if let Some(id) = args.invoke {
        let command: Command = id.parse()?;
        if let Command::CheckUpdate = command {
            let checker = UpdateChecker::from_env(env!("CARGO_PKG_VERSION"))?;
            let outcome = checker.check_and_notify(&LogNotifier).await;
            print_outcome(&checker, &outcome);
            return Ok(());
        }
        apply(ctx, command).await?;
    }

    let settings = load_settings(ctx.store().as_ref()).await;
    let surface = Arc::new(MenuSurface::new());
    register_all(surface.as_ref(), &settings);
    emit(ctx.output(), &surface.entries(), |entries| {
        entries
            .iter()
            .map(|entry| format!("{:<16} {}\n", entry.id, entry.label))
            .collect()
    })
}
