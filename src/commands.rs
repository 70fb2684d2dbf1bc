//! User-facing command surface.
//!
//! One command per allowed rate, one per toggle and an update check. Labels
//! carry a `✓` for the current selection; a surface that cannot refresh its
//! labels keeps showing the state from registration time.

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use serde::Serialize;
use tubepace_core_types::{Category, PlaybackRate};

use crate::errors::TubePaceError;
use crate::settings::Settings;

const SELECTED: &str = "✓ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleTarget {
    Category(Category),
    Debug,
}

impl ToggleTarget {
    pub fn name(self) -> &'static str {
        match self {
            ToggleTarget::Category(category) => category.name(),
            ToggleTarget::Debug => "debug",
        }
    }
}

impl FromStr for ToggleTarget {
    type Err = TubePaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("debug") {
            return Ok(ToggleTarget::Debug);
        }
        match value.parse::<Category>() {
            Ok(category) if category.is_toggleable() => Ok(ToggleTarget::Category(category)),
            _ => Err(TubePaceError::invalid_command(format!(
                "cannot toggle '{value}', expected one of live, premiere, shorts, music, debug"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetRate(PlaybackRate),
    Toggle(ToggleTarget),
    CheckUpdate,
}

impl Command {
    /// Every command the surface offers, in menu order.
    pub fn all() -> Vec<Command> {
        let mut commands: Vec<Command> = PlaybackRate::allowed().map(Command::SetRate).collect();
        commands.extend(
            Category::TOGGLEABLE
                .into_iter()
                .map(|category| Command::Toggle(ToggleTarget::Category(category))),
        );
        commands.push(Command::Toggle(ToggleTarget::Debug));
        commands.push(Command::CheckUpdate);
        commands
    }

    pub fn id(&self) -> String {
        match self {
            Command::SetRate(rate) => format!("rate:{}", rate.value()),
            Command::Toggle(target) => format!("toggle:{}", target.name()),
            Command::CheckUpdate => "update:check".to_string(),
        }
    }

    pub fn is_selected(&self, settings: &Settings) -> bool {
        match self {
            Command::SetRate(rate) => settings.target_rate == *rate,
            Command::Toggle(ToggleTarget::Category(category)) => settings.is_enabled(*category),
            Command::Toggle(ToggleTarget::Debug) => settings.debug_enabled,
            Command::CheckUpdate => false,
        }
    }

    pub fn label(&self, settings: &Settings) -> String {
        let text = match self {
            Command::SetRate(rate) => format!("Speed {rate}"),
            Command::Toggle(ToggleTarget::Category(category)) => {
                format!("Override {}", category.name())
            }
            Command::Toggle(ToggleTarget::Debug) => "Debug logging".to_string(),
            Command::CheckUpdate => "Check for updates".to_string(),
        };
        if self.is_selected(settings) {
            format!("{SELECTED}{text}")
        } else {
            text
        }
    }

    /// Apply the command to `settings`; returns whether anything changed.
    pub fn apply(&self, settings: &mut Settings) -> bool {
        match self {
            Command::SetRate(rate) => {
                let changed = settings.target_rate != *rate;
                settings.target_rate = *rate;
                changed
            }
            Command::Toggle(ToggleTarget::Category(category)) => {
                settings.categories.toggle(*category).is_some()
            }
            Command::Toggle(ToggleTarget::Debug) => {
                settings.debug_enabled = !settings.debug_enabled;
                true
            }
            Command::CheckUpdate => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl FromStr for Command {
    type Err = TubePaceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (scope, arg) = trimmed
            .split_once(':')
            .ok_or_else(|| TubePaceError::invalid_command(format!("malformed command id: {value}")))?;
        match (scope, arg) {
            ("rate", raw) => raw
                .parse::<PlaybackRate>()
                .map(Command::SetRate)
                .map_err(|err| TubePaceError::invalid_command(err.to_string())),
            ("toggle", raw) => raw.parse().map(Command::Toggle),
            ("update", "check") => Ok(Command::CheckUpdate),
            _ => Err(TubePaceError::invalid_command(format!("unknown command: {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEntry {
    pub id: String,
    pub label: String,
}

/// Where commands get registered for the user to pick from.
pub trait CommandSurface: Send + Sync {
    fn register(&self, id: &str, label: &str);

    fn clear(&self);
}

/// In-process surface that records registrations in order.
#[derive(Default)]
pub struct MenuSurface {
    entries: Mutex<Vec<CommandEntry>>,
}

impl MenuSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CommandEntry> {
        self.entries.lock().clone()
    }
}

impl CommandSurface for MenuSurface {
    fn register(&self, id: &str, label: &str) {
        self.entries.lock().push(CommandEntry {
            id: id.to_string(),
            label: label.to_string(),
        });
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Register every command with labels reflecting `settings`.
pub fn register_all(surface: &dyn CommandSurface, settings: &Settings) -> usize {
    surface.clear();
    let commands = Command::all();
    for command in &commands {
        surface.register(&command.id(), &command.label(settings));
    }
    commands.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubepace_core_types::ALLOWED_RATES;

    #[test]
    fn ids_parse_back_to_the_same_command() {
        for command in Command::all() {
            assert_eq!(command.id().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn invalid_ids_are_rejected() {
        for raw in ["rate:3", "rate:fast", "toggle:regular", "toggle:podcast", "update:now", "bogus"] {
            let err = raw.parse::<Command>().unwrap_err();
            assert!(matches!(err, TubePaceError::InvalidCommand(_)), "{raw}");
        }
    }

    #[test]
    fn surface_gets_one_entry_per_rate_and_toggle() {
        let surface = MenuSurface::new();
        let count = register_all(&surface, &Settings::default());
        assert_eq!(count, ALLOWED_RATES.len() + 4 + 1 + 1);
        assert_eq!(surface.entries().len(), count);

        let selected: Vec<_> = surface
            .entries()
            .into_iter()
            .filter(|entry| entry.label.starts_with(SELECTED))
            .map(|entry| entry.id)
            .collect();
        assert_eq!(selected, vec!["rate:1".to_string(), "toggle:shorts".to_string()]);
    }

    #[test]
    fn registering_twice_replaces_entries() {
        let surface = MenuSurface::new();
        register_all(&surface, &Settings::default());
        let count = register_all(&surface, &Settings::default());
        assert_eq!(surface.entries().len(), count);
    }

    #[test]
    fn apply_updates_settings() {
        let mut settings = Settings::default();
        assert!(Command::SetRate(PlaybackRate::new(1.5).unwrap()).apply(&mut settings));
        assert!(!Command::SetRate(PlaybackRate::new(1.5).unwrap()).apply(&mut settings));
        assert!(Command::Toggle(ToggleTarget::Category(Category::Live)).apply(&mut settings));
        assert!(settings.is_enabled(Category::Live));
        assert!(Command::Toggle(ToggleTarget::Debug).apply(&mut settings));
        assert!(settings.debug_enabled);
        assert!(!Command::CheckUpdate.apply(&mut settings));
    }
}
