use std::fmt;
use std::time::Duration;

/// How much work an evaluation is allowed to do.
///
/// Ordered so that merging two pending triggers keeps the stronger one.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum EvaluationKind {
    /// Reuse the held element, single locator attempt, no backoff.
    Light,
    /// Full classification and a locator run under the retry policy.
    Full,
}

impl EvaluationKind {
    pub fn merge(self, other: EvaluationKind) -> EvaluationKind {
        self.max(other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationKind::Light => "light",
            EvaluationKind::Full => "full",
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to re-run the pipeline once. Requests sharing a `key`
/// collapse into one while they wait out the debounce window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub key: String,
    pub kind: EvaluationKind,
    pub reason: String,
}

impl Trigger {
    pub fn new(key: impl Into<String>, kind: EvaluationKind, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn full(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(key, EvaluationKind::Full, reason)
    }

    pub fn light(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(key, EvaluationKind::Light, reason)
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
        }
    }
}
