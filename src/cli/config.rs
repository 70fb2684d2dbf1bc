use crate::cli::context::CliContext;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tubepace_cli::{load_settings, save_settings, Command, Settings, ToggleTarget};
use tubepace_core_types::PlaybackRate;

use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the stored settings (corrected and written back if invalid)
    Show,

    /// Set the target playback rate
    SetRate {
        /// One of 0.25, 0.5, 0.75, 1, 1.25, 1.5, 1.75, 2 (a trailing `x` is accepted)
        rate: String,
    },

    /// Flip a category override or the debug flag
    Toggle {
        /// live, premiere, shorts, music or debug
        name: String,
    },

    /// Print the settings file location
    Path,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.store();
    match args.action {
        ConfigAction::Show => {
            let settings = load_settings(store.as_ref()).await;
            emit(ctx.output(), &settings, render_settings)?;
        }
        ConfigAction::SetRate { rate } => {
            let rate: PlaybackRate = rate.parse().context("Invalid playback rate")?;
            let settings = apply(ctx, Command::SetRate(rate)).await?;
            println!("Target rate set to {}", settings.target_rate);
        }
        ConfigAction::Toggle { name } => {
            let target: ToggleTarget = name.parse()?;
            let settings = apply(ctx, Command::Toggle(target)).await?;
            let enabled = match target {
                ToggleTarget::Category(category) => settings.is_enabled(category),
                ToggleTarget::Debug => settings.debug_enabled,
            };
            println!(
                "{} is now {}",
                target.name(),
                if enabled { "on" } else { "off" }
            );
        }
        ConfigAction::Path => {
            println!("{}", ctx.config_path().display());
        }
    }

    Ok(())
}

/// Load, apply `command` and persist. A running `watch` adopts the change on
/// its next settings poll.
pub(crate) async fn apply(ctx: &CliContext, command: Command) -> Result<Settings> {
    let store = ctx.store();
    let mut settings = load_settings(store.as_ref()).await;
    if command.apply(&mut settings) {
        save_settings(store.as_ref(), &settings)
            .await
            .with_context(|| format!("Failed to save {}", ctx.config_path().display()))?;
    }
    Ok(settings)
}

fn render_settings(settings: &Settings) -> String {
    let mut out = format!("target_rate    = {}\n", settings.target_rate);
    for category in tubepace_core_types::Category::TOGGLEABLE {
        out.push_str(&format!(
            "{:<14} = {}\n",
            category.name(),
            settings.is_enabled(category)
        ));
    }
    out.push_str(&format!("debug_enabled  = {}\n", settings.debug_enabled));
    out
}
