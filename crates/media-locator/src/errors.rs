//! Error types for the media locator

use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// No qualifying media element appeared within the retry budget
    #[error("no qualifying media element after {attempts} attempts")]
    ElementNotFound { attempts: u32 },

    /// Every attempt failed to reach the page
    #[error("page unreachable while locating media: {0}")]
    Page(#[from] AdapterError),
}

impl LocatorError {
    pub fn attempts(&self) -> Option<u32> {
        match self {
            LocatorError::ElementNotFound { attempts } => Some(*attempts),
            LocatorError::Page(_) => None,
        }
    }
}
