use clap::Subcommand;

use super::check_update::CheckUpdateArgs;
use super::config::ConfigArgs;
use super::menu::CommandsArgs;
use super::watch::WatchArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Attach to a tab and keep the playback rate overridden until Ctrl-C
    Watch(WatchArgs),

    /// Inspect or change stored settings
    Config(ConfigArgs),

    /// List the command surface, or invoke one command against stored settings
    Commands(CommandsArgs),

    /// Check the update manifest for a newer release
    CheckUpdate(CheckUpdateArgs),
}
