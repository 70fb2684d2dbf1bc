//! Media element location.
//!
//! [`ElementLocator`] owns the single [`ElementHandle`] the pipeline works
//! with. Candidates come from a fixed chain of selectors, most specific
//! first, and are accepted only when visible, sourced and ready enough.

pub mod errors;
pub mod locator;
pub mod types;

pub use errors::LocatorError;
pub use locator::ElementLocator;
pub use types::{ElementHandle, LocatorOptions, MediaStrategy, SourceChange};
