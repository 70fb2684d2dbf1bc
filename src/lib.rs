//! tubepace library
//!
//! The controller and its collaborators: settings and their store, the
//! command surface, the update checker and the status view. The CLI in
//! `main.rs` is a thin shell over these.

pub mod app_context;
pub mod commands;
pub mod config;
pub mod errors;
pub mod settings;
pub mod status;
pub mod tuning;
pub mod update_check;

pub use app_context::AppContext;
pub use commands::{register_all, Command, CommandEntry, CommandSurface, MenuSurface, ToggleTarget};
pub use config::{load_settings, save_settings, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use errors::TubePaceError;
pub use settings::{CategoryToggles, Settings, SETTINGS_KEY};
pub use status::{Decision, ElementStatus, EvaluationReport, StatusView};
pub use tuning::RuntimeTuning;
pub use update_check::{
    compare_versions, extract_version, LogNotifier, Notification, NotificationAction, Notifier,
    UpdateChecker, UpdateOutcome,
};
