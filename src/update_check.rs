//! On-demand update check against a remote manifest.
//!
//! One fetch, no retry. The outcome is always handed to a [`Notifier`]; a
//! failed check is reported, never raised.

use std::cmp::Ordering;
use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::TubePaceError;

pub const MANIFEST_URL_ENV: &str = "TUBEPACE_MANIFEST_URL";
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/tubepace/tubepace/main/tubepace.meta.txt";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://github.com/tubepace/tubepace/releases/latest";

static VERSION_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"@version\s+([0-9][0-9A-Za-z.\-]*)"));

/// Pull the version token out of a manifest body.
pub fn extract_version(manifest: &str) -> Result<String, TubePaceError> {
    let pattern = VERSION_PATTERN
        .as_ref()
        .map_err(|err| TubePaceError::manifest(err.to_string()))?;
    pattern
        .captures(manifest)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
        .ok_or_else(|| TubePaceError::manifest("no @version token in manifest"))
}

fn numeric_components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|component| {
            let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Compare dotted versions numerically; missing trailing components are zero.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = numeric_components(left);
    let right = numeric_components(right);
    let len = left.len().max(right.len());
    (0..len)
        .map(|idx| {
            let a = left.get(idx).copied().unwrap_or(0);
            let b = right.get(idx).copied().unwrap_or(0);
            a.cmp(&b)
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    UpToDate { current: String },
    UpdateAvailable { current: String, latest: String },
    Failed(TubePaceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub action: Option<NotificationAction>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            target: "tubepace",
            title = %notification.title,
            action = notification.action.as_ref().map(|a| a.url.as_str()).unwrap_or("-"),
            "{}",
            notification.body
        );
    }
}

pub struct UpdateChecker {
    client: Client,
    manifest_url: String,
    download_url: String,
    current: String,
}

impl UpdateChecker {
    pub fn new(
        manifest_url: impl Into<String>,
        current: impl Into<String>,
    ) -> Result<Self, TubePaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("tubepace/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TubePaceError::network(err.to_string()))?;
        Ok(Self {
            client,
            manifest_url: manifest_url.into(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            current: current.into(),
        })
    }

    /// Manifest URL from `TUBEPACE_MANIFEST_URL`, else the project default.
    pub fn from_env(current: impl Into<String>) -> Result<Self, TubePaceError> {
        let url = env::var(MANIFEST_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string());
        Self::new(url, current)
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub async fn fetch_latest(&self) -> Result<String, TubePaceError> {
        debug!(target: "tubepace", url = %self.manifest_url, "fetching update manifest");
        let response = self
            .client
            .get(&self.manifest_url)
            .send()
            .await
            .map_err(|err| TubePaceError::network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TubePaceError::network(format!(
                "manifest request returned {status}"
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|err| TubePaceError::network(err.to_string()))?;
        extract_version(&body)
    }

    pub async fn check(&self) -> UpdateOutcome {
        match self.fetch_latest().await {
            Ok(latest) => self.outcome_for(latest),
            Err(err) => {
                warn!(target: "tubepace", url = %self.manifest_url, %err, "update check failed");
                UpdateOutcome::Failed(err)
            }
        }
    }

    pub async fn check_and_notify(&self, notifier: &dyn Notifier) -> UpdateOutcome {
        let outcome = self.check().await;
        notifier.notify(self.notification(&outcome));
        outcome
    }

    pub fn outcome_for(&self, latest: String) -> UpdateOutcome {
        match compare_versions(&latest, &self.current) {
            Ordering::Greater => UpdateOutcome::UpdateAvailable {
                current: self.current.clone(),
                latest,
            },
            _ => UpdateOutcome::UpToDate {
                current: self.current.clone(),
            },
        }
    }

    pub fn notification(&self, outcome: &UpdateOutcome) -> Notification {
        match outcome {
            UpdateOutcome::UpToDate { current } => Notification {
                title: "tubepace".to_string(),
                body: format!("You are running the latest version ({current})."),
                action: None,
            },
            UpdateOutcome::UpdateAvailable { current, latest } => Notification {
                title: "tubepace update available".to_string(),
                body: format!("Version {latest} is available (installed: {current})."),
                action: Some(NotificationAction {
                    label: "Open".to_string(),
                    url: self.download_url.clone(),
                }),
            },
            UpdateOutcome::Failed(err) => Notification {
                title: "tubepace update check failed".to_string(),
                body: err.to_string(),
                action: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_token_is_extracted() {
        let manifest = "// ==UserScript==\n// @name tubepace\n// @version      2.4.1\n// ==/UserScript==";
        assert_eq!(extract_version(manifest).unwrap(), "2.4.1");
        assert_eq!(extract_version("@version 3.0-beta.2").unwrap(), "3.0-beta.2");
    }

    #[test]
    fn missing_token_is_a_parse_failure() {
        let err = extract_version("<html>not found</html>").unwrap_err();
        assert!(matches!(err, TubePaceError::ManifestParseFailure(_)));
        assert!(extract_version("@version beta").is_err());
    }

    #[test]
    fn comparison_is_numeric_and_pads_with_zero() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.0.1", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("0.9", "1"), Ordering::Less);
        assert_eq!(compare_versions("2.0-beta", "2.0"), Ordering::Equal);
    }

    #[test]
    fn outcomes_map_to_notifications() {
        let checker = UpdateChecker::new("http://127.0.0.1:9/manifest", "1.2.0").unwrap();

        let newer = checker.outcome_for("1.3".into());
        assert!(matches!(newer, UpdateOutcome::UpdateAvailable { ref latest, .. } if latest == "1.3"));
        let note = checker.notification(&newer);
        assert_eq!(note.action.map(|a| a.label), Some("Open".to_string()));

        let same = checker.outcome_for("1.2".into());
        assert!(matches!(same, UpdateOutcome::UpToDate { .. }));
        assert!(checker.notification(&same).action.is_none());

        let older = checker.outcome_for("1.1.9".into());
        assert!(matches!(older, UpdateOutcome::UpToDate { .. }));
    }
}
