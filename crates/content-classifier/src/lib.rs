pub mod cache;
pub mod classifier;
pub mod signals;

pub use cache::{CacheMetric, ClassificationCache};
pub use classifier::ContentClassifier;
