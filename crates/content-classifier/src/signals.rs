//! One detection heuristic per category.
//!
//! Every predicate reads the page through [`PagePort`] only. Missing markers
//! come back as empty lists and simply make the predicate false.

use cdp_adapter::{AdapterError, PagePort};
use tubepace_core_types::{Category, MarkerNode};
use url::Url;

pub mod selectors {
    pub const LIVE_BADGE: &str = ".ytp-live-badge";
    pub const VIEW_COUNT: &str = "#info-container #info span";
    pub const BADGE_LABEL: &str = "ytd-badge-supported-renderer .badge-shape-wiz__text";
    pub const ACTIVE_REEL: &str = "ytd-reel-video-renderer[is-active] video";
    pub const VERIFIED_ARTIST: &str = "ytd-video-owner-renderer .badge-style-type-verified-artist";
    pub const GENRE_META: &str = "meta[itemprop=\"genre\"]";
}

pub const MUSIC_HOST_PREFIX: &str = "music.";

pub async fn detect(category: Category, page: &dyn PagePort) -> Result<bool, AdapterError> {
    match category {
        Category::Live => is_live(page).await,
        Category::Premiere => is_premiere(page).await,
        Category::Shorts => is_shorts(page).await,
        Category::Music => is_music(page).await,
        Category::Regular => Ok(true),
    }
}

async fn is_live(page: &dyn PagePort) -> Result<bool, AdapterError> {
    let badge = page
        .query_markers(selectors::LIVE_BADGE)
        .await?
        .iter()
        .any(|node| node.visible && !node.has_attr("disabled"));
    if badge {
        return Ok(true);
    }
    Ok(any_text(
        &page.query_markers(selectors::VIEW_COUNT).await?,
        &["watching now"],
    ))
}

async fn is_premiere(page: &dyn PagePort) -> Result<bool, AdapterError> {
    if any_text(
        &page.query_markers(selectors::VIEW_COUNT).await?,
        &["premieres", "premiering now"],
    ) {
        return Ok(true);
    }
    Ok(page
        .query_markers(selectors::BADGE_LABEL)
        .await?
        .iter()
        .any(|node| node.visible && node.text.trim().eq_ignore_ascii_case("premiere")))
}

async fn is_shorts(page: &dyn PagePort) -> Result<bool, AdapterError> {
    let location = page.location().await?;
    if let Ok(url) = Url::parse(&location) {
        if url.path().starts_with("/shorts/") {
            return Ok(true);
        }
    }
    Ok(page
        .query_markers(selectors::ACTIVE_REEL)
        .await?
        .iter()
        .any(|node| node.visible))
}

async fn is_music(page: &dyn PagePort) -> Result<bool, AdapterError> {
    let location = page.location().await?;
    let on_music_host = Url::parse(&location)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.starts_with(MUSIC_HOST_PREFIX)))
        .unwrap_or(false);
    if on_music_host {
        return Ok(true);
    }
    if page
        .query_markers(selectors::VERIFIED_ARTIST)
        .await?
        .iter()
        .any(|node| node.visible)
    {
        return Ok(true);
    }
    Ok(page
        .query_markers(selectors::GENRE_META)
        .await?
        .iter()
        .any(|node| node.attr("content") == Some("Music")))
}

fn any_text(nodes: &[MarkerNode], needles: &[&str]) -> bool {
    nodes.iter().filter(|node| node.visible).any(|node| {
        let text = node.text.to_lowercase();
        needles.iter().any(|needle| text.contains(needle))
    })
}
