use std::sync::Arc;

use cdp_adapter::PagePort;
use parking_lot::Mutex;
use tracing::{debug, warn};
use tubepace_core_types::Category;

use crate::cache::ClassificationCache;
use crate::signals;

/// Resolves the single category of the content currently on the page.
pub struct ContentClassifier {
    page: Arc<dyn PagePort>,
    cache: Arc<ClassificationCache>,
    last: Mutex<Option<Category>>,
}

impl ContentClassifier {
    pub fn new(page: Arc<dyn PagePort>, cache: Arc<ClassificationCache>) -> Self {
        Self {
            page,
            cache,
            last: Mutex::new(None),
        }
    }

    /// Walk the categories in priority order and return the first match.
    pub async fn classify(&self) -> Category {
        for category in Category::PRIORITY {
            if category == Category::Regular {
                break;
            }
            if self.check(category).await {
                *self.last.lock() = Some(category);
                return category;
            }
        }
        debug!(
            target: "tubepace-classifier",
            "no category signal matched, resolving to regular"
        );
        *self.last.lock() = Some(Category::Regular);
        Category::Regular
    }

    /// Evaluate one category signal, served from the cache while fresh.
    ///
    /// Page errors count as "signal absent" and are not cached.
    pub async fn check(&self, category: Category) -> bool {
        if let Some(cached) = self.cache.get(category) {
            return cached;
        }
        match signals::detect(category, self.page.as_ref()).await {
            Ok(value) => {
                self.cache.put(category, value);
                debug!(target: "tubepace-classifier", %category, value, "signal evaluated");
                value
            }
            Err(err) => {
                warn!(
                    target: "tubepace-classifier",
                    %category,
                    %err,
                    "signal check failed, treating as absent"
                );
                false
            }
        }
    }

    pub fn last_category(&self) -> Option<Category> {
        *self.last.lock()
    }

    pub fn reset(&self) {
        *self.last.lock() = None;
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::selectors;
    use cdp_adapter::MemoryPage;
    use tubepace_core_types::MarkerNode;

    fn classifier(page: Arc<MemoryPage>) -> ContentClassifier {
        ContentClassifier::new(page, Arc::new(ClassificationCache::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn live_outranks_shorts() {
        let page = MemoryPage::new("https://www.youtube.com/shorts/abc");
        page.add_marker(selectors::LIVE_BADGE, MarkerNode::shown());
        let classifier = classifier(page);

        assert!(classifier.check(Category::Shorts).await);
        assert_eq!(classifier.classify().await, Category::Live);
        assert_eq!(classifier.last_category(), Some(Category::Live));
    }

    #[tokio::test(start_paused = true)]
    async fn cached_result_matches_recomputed_result() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        page.add_marker(selectors::LIVE_BADGE, MarkerNode::shown());
        let classifier = classifier(page.clone());

        let first = classifier.check(Category::Live).await;
        let queries = page.marker_queries();
        let second = classifier.check(Category::Live).await;
        assert_eq!(first, second);
        assert_eq!(page.marker_queries(), queries);

        classifier.cache().clear();
        assert_eq!(classifier.check(Category::Live).await, first);
        assert!(page.marker_queries() > queries);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_cache_never_changes_category() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        page.add_marker(
            selectors::BADGE_LABEL,
            MarkerNode::shown().with_text("Premiere"),
        );
        let classifier = classifier(page);

        let before = classifier.classify().await;
        classifier.cache().clear();
        let after = classifier.classify().await;
        assert_eq!(before, Category::Premiere);
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_document_is_regular() {
        let classifier = classifier(MemoryPage::new("https://www.youtube.com/watch?v=a"));
        assert_eq!(classifier.classify().await, Category::Regular);
    }

    #[tokio::test(start_paused = true)]
    async fn page_failures_resolve_to_regular_without_caching() {
        let page = MemoryPage::new("https://www.youtube.com/shorts/abc");
        page.fail_queries(true);
        let classifier = classifier(page.clone());

        assert_eq!(classifier.classify().await, Category::Regular);
        assert!(classifier.cache().is_empty());

        page.fail_queries(false);
        assert_eq!(classifier.classify().await, Category::Shorts);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_recomputed_after_ttl() {
        let page = MemoryPage::new("https://www.youtube.com/watch?v=a");
        let classifier = classifier(page.clone());
        assert_eq!(classifier.classify().await, Category::Regular);

        page.add_marker(selectors::LIVE_BADGE, MarkerNode::shown());
        assert_eq!(classifier.classify().await, Category::Regular);

        tokio::time::advance(std::time::Duration::from_secs(4)).await;
        assert_eq!(classifier.classify().await, Category::Live);
    }
}
