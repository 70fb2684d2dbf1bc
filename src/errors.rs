//! Error handling module
//!
//! Failures surfaced by the controller and its collaborators. None of these
//! is fatal to a running watch session: each is logged and the pipeline stays
//! ready for the next trigger.

use cdp_adapter::AdapterError;
use media_locator::LocatorError;
use rate_applier::ApplyError;
use thiserror::Error;
use tubepace_scheduler::SchedulerError;

#[derive(Debug, Error, Clone)]
pub enum TubePaceError {
    /// The locator exhausted its retry budget.
    #[error("no qualifying media element after {attempts} attempt(s)")]
    ElementNotFound { attempts: u32 },

    /// The configuration store could not be read or written.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The update manifest could not be fetched.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The update manifest carried no usable version token.
    #[error("manifest parse failure: {0}")]
    ManifestParseFailure(String),

    #[error("page error: {0}")]
    Page(#[from] AdapterError),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl TubePaceError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure(message.into())
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::ManifestParseFailure(message.into())
    }

    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand(message.into())
    }

    /// Short machine-readable tag used in logs and status output.
    pub fn code(&self) -> &'static str {
        match self {
            TubePaceError::ElementNotFound { .. } => "element_not_found",
            TubePaceError::StorageFailure(_) => "storage_failure",
            TubePaceError::NetworkFailure(_) => "network_failure",
            TubePaceError::ManifestParseFailure(_) => "manifest_parse_failure",
            TubePaceError::Page(_) => "page",
            TubePaceError::InvalidCommand(_) => "invalid_command",
        }
    }
}

impl From<LocatorError> for TubePaceError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::ElementNotFound { attempts } => TubePaceError::ElementNotFound { attempts },
            LocatorError::Page(err) => TubePaceError::Page(err),
        }
    }
}

impl From<ApplyError> for TubePaceError {
    fn from(err: ApplyError) -> Self {
        match err {
            // A detached element is indistinguishable from one that was never found.
            ApplyError::Detached { .. } => TubePaceError::ElementNotFound { attempts: 1 },
            ApplyError::Page(err) => TubePaceError::Page(err),
        }
    }
}

impl From<TubePaceError> for SchedulerError {
    fn from(err: TubePaceError) -> Self {
        SchedulerError::evaluation(err.to_string())
    }
}
