use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use which::which;

pub const CHROME_ENV: &str = "TUBEPACE_CHROME";
pub const HEADLESS_ENV: &str = "TUBEPACE_HEADLESS";
pub const PROFILE_ENV: &str = "TUBEPACE_PROFILE";

/// How to reach the browser that hosts the target page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Empty means "let chromiumoxide pick".
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub default_deadline_ms: u64,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: find_browser().unwrap_or_default(),
            user_data_dir: env_path(PROFILE_ENV).unwrap_or_else(|| PathBuf::from(".tubepace-profile")),
            headless: env_flag(HEADLESS_ENV),
            default_deadline_ms: 15_000,
            websocket_url: None,
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

/// Unset means headful: watching a video is interactive.
fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(target_os = "windows")]
const BINARY_NAMES: &[&str] = &["chrome.exe", "msedge.exe", "chromium.exe"];
#[cfg(not(target_os = "windows"))]
const BINARY_NAMES: &[&str] = &["google-chrome-stable", "google-chrome", "chromium", "chromium-browser"];

#[cfg(target_os = "macos")]
fn install_locations() -> Vec<PathBuf> {
    ["Google Chrome.app/Contents/MacOS/Google Chrome", "Chromium.app/Contents/MacOS/Chromium"]
        .iter()
        .map(|app| PathBuf::from("/Applications").join(app))
        .collect()
}

#[cfg(target_os = "windows")]
fn install_locations() -> Vec<PathBuf> {
    ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
        .iter()
        .filter_map(|key| env_path(key))
        .flat_map(|root| {
            [
                root.join("Google/Chrome/Application/chrome.exe"),
                root.join("Microsoft/Edge/Application/msedge.exe"),
            ]
        })
        .collect()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn install_locations() -> Vec<PathBuf> {
    BINARY_NAMES.iter().map(|name| PathBuf::from("/usr/bin").join(name)).collect()
}

/// `TUBEPACE_CHROME` if it exists, then `PATH`, then well-known install dirs.
pub fn find_browser() -> Option<PathBuf> {
    env_path(CHROME_ENV)
        .filter(|path| path.exists())
        .or_else(|| BINARY_NAMES.iter().find_map(|name| which(name).ok()))
        .or_else(|| install_locations().into_iter().find(|path| path.exists()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_deadline_and_no_socket() {
        let cfg = CdpConfig::default();
        assert_eq!(cfg.default_deadline_ms, 15_000);
        assert!(cfg.websocket_url.is_none());
    }

    #[test]
    fn install_locations_cover_every_platform_build() {
        assert!(!BINARY_NAMES.is_empty());
        assert!(install_locations().iter().all(|path| path.is_absolute() || cfg!(windows)));
    }
}
