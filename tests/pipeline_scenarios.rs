use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{MediaSpec, MemoryPage, PageEvent};
use content_classifier::signals::selectors;
use serde_json::json;
use tokio::time::sleep;
use tubepace_cli::{
    AppContext, ConfigStore, Decision, MemoryConfigStore, MenuSurface, RuntimeTuning, Settings,
    TubePaceError, SETTINGS_KEY,
};
use tubepace_core_types::{Category, MarkerNode};
use tubepace_scheduler::EvaluationKind;

const PLAYER: &str = "#movie_player video.html5-main-video";
const WATCH_A: &str = "https://www.youtube.com/watch?v=a";

fn stored(rate: f64, live: bool) -> serde_json::Value {
    json!({
        "target_rate": rate,
        "categories": {"live": live, "premiere": false, "shorts": true, "music": false},
        "debug_enabled": false,
    })
}

fn tuning() -> RuntimeTuning {
    RuntimeTuning {
        locator_attempts: 3,
        locator_step: Duration::from_millis(100),
        ..RuntimeTuning::default()
    }
}

async fn app(page: &Arc<MemoryPage>, store: &Arc<MemoryConfigStore>) -> AppContext {
    let app = AppContext::new(page.clone(), store.clone(), tuning()).await;
    app.start().await;
    app
}

#[tokio::test(start_paused = true)]
async fn regular_content_gets_the_configured_rate() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.25, false)));

    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(page.rate_of(&node), Some(1.25));
    let report = app.last_report().unwrap();
    assert_eq!(report.decision, Decision::Applied);
    assert_eq!(report.category, Some(Category::Regular));
    assert_eq!(report.node, Some(node.clone()));

    let status = app.status();
    assert!(status.element.present);
    assert_eq!(status.element.rate, Some(1.25));
    assert_eq!(status.last_category, Some(Category::Regular));
    assert!(!status.in_flight);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_category_leaves_rate_untouched() {
    let page = MemoryPage::new(WATCH_A);
    page.add_marker(selectors::LIVE_BADGE, MarkerNode::shown());
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.5, false)));

    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(page.rate_of(&node), Some(1.0));
    assert_eq!(page.rate_writes(), 0);
    let report = app.last_report().unwrap();
    assert_eq!(report.category, Some(Category::Live));
    assert_eq!(report.decision, Decision::CategoryDisabled);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn corrupt_stored_record_is_replaced_by_defaults() {
    let page = MemoryPage::new(WATCH_A);
    let store = Arc::new(MemoryConfigStore::with_value(
        SETTINGS_KEY,
        json!({"target_rate": 7.0, "categories": {"live": false}}),
    ));

    let app = AppContext::new(page, store.clone(), tuning()).await;

    assert_eq!(app.settings(), Settings::default());
    assert_eq!(store.value(SETTINGS_KEY), Some(Settings::default().to_value()));
    assert_eq!(store.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn same_identity_navigation_runs_light_and_keeps_state() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.5, false)));
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(app.last_report().unwrap().decision, Decision::Applied);

    page.emit(PageEvent::HostNavigation {
        name: "yt-page-data-updated".into(),
        url: format!("{WATCH_A}&t=30s"),
    });
    sleep(Duration::from_secs(2)).await;

    assert_eq!(app.cache().clears(), 0);
    assert_eq!(app.locator().current().map(|h| h.node), Some(node.clone()));
    let report = app.last_report().unwrap();
    assert_eq!(report.key, "navigation");
    assert_eq!(report.kind, EvaluationKind::Light);
    assert_eq!(report.decision, Decision::AlreadyAtRate);
    assert_eq!(page.rate_writes(), 1);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn navigation_to_new_content_clears_and_reapplies() {
    let page = MemoryPage::new(WATCH_A);
    let first = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(2.0, false)));
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;

    page.detach_media(&first);
    let second = page.add_media(MediaSpec::new("blob:b").matching(PLAYER));
    page.navigate("https://www.youtube.com/watch?v=b");
    sleep(Duration::from_secs(2)).await;

    assert_eq!(app.cache().clears(), 1);
    assert_eq!(page.rate_of(&second), Some(2.0));
    let report = app.last_report().unwrap();
    assert_eq!(report.key, "navigation");
    assert_eq!(report.kind, EvaluationKind::Full);
    assert_eq!(app.status().navigations, 1);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn single_host_revert_is_corrected_once() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    page.revert_next_writes(1, 1.0);
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.75, false)));

    let app = app(&page, &store).await;
    sleep(Duration::from_secs(3)).await;

    assert_eq!(page.rate_of(&node), Some(1.75));
    assert_eq!(page.rate_writes(), 2);
    assert_eq!(app.applier().writes(), 2);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_element_is_reported_and_recovers() {
    let page = MemoryPage::new(WATCH_A);
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.5, false)));
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(3)).await;

    let report = app.last_report().unwrap();
    assert_eq!(report.decision, Decision::ElementNotFound);
    assert!(!app.scheduler().in_flight());
    assert_eq!(app.scheduler().stats().completed, 1);

    let node = page.add_media(MediaSpec::new("blob:late").matching(PLAYER));
    page.navigate("https://www.youtube.com/watch?v=late");
    sleep(Duration::from_secs(2)).await;

    assert_eq!(page.rate_of(&node), Some(1.5));
    assert_eq!(app.last_report().unwrap().decision, Decision::Applied);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_page_fails_without_wedging() {
    let page = MemoryPage::new(WATCH_A);
    let store = Arc::new(MemoryConfigStore::new());
    let app = AppContext::new(page.clone(), store, tuning()).await;
    page.fail_queries(true);

    let report = app.run_once(EvaluationKind::Full).await.unwrap();
    assert_eq!(report.decision, Decision::Failed);
    assert!(report.detail.is_some());
    assert!(!app.scheduler().in_flight());
}

#[tokio::test(start_paused = true)]
async fn rate_command_persists_and_reapplies() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.25, false)));
    let surface = Arc::new(MenuSurface::new());
    let app = AppContext::new(page.clone(), store.clone(), tuning())
        .await
        .with_command_surface(surface.clone());
    app.start().await;
    sleep(Duration::from_secs(2)).await;

    app.invoke_id("rate:1.75").await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(page.rate_of(&node), Some(1.75));
    assert_eq!(store.value(SETTINGS_KEY).unwrap()["target_rate"], json!(1.75));
    assert_eq!(app.last_report().unwrap().key, "command");
    let selected: Vec<_> = surface
        .entries()
        .into_iter()
        .filter(|entry| entry.label.starts_with('✓'))
        .map(|entry| entry.id)
        .collect();
    assert!(selected.contains(&"rate:1.75".to_string()));
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn toggling_a_category_enables_its_override() {
    let page = MemoryPage::new(WATCH_A);
    page.add_marker(selectors::LIVE_BADGE, MarkerNode::shown());
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.5, false)));
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(page.rate_of(&node), Some(1.0));

    app.invoke_id("toggle:live").await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert!(app.settings().is_enabled(Category::Live));
    assert_eq!(page.rate_of(&node), Some(1.5));
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_settings_write_keeps_in_memory_value() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::new());
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;

    store.fail_writes(true);
    app.invoke_id("rate:0.5").await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(app.settings().target_rate.value(), 0.5);
    assert_eq!(page.rate_of(&node), Some(0.5));
    assert_eq!(store.value(SETTINGS_KEY), None);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_and_unconfigured_commands_are_rejected() {
    let page = MemoryPage::new(WATCH_A);
    let store = Arc::new(MemoryConfigStore::new());
    let app = AppContext::new(page, store.clone(), tuning()).await;

    let err = app.invoke_id("rate:9").await.unwrap_err();
    assert!(matches!(err, TubePaceError::InvalidCommand(_)));
    let err = app.invoke_id("update:check").await.unwrap_err();
    assert!(matches!(err, TubePaceError::InvalidCommand(_)));
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn reload_drops_the_handle() {
    let page = MemoryPage::new(WATCH_A);
    page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::new());
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;
    assert!(app.locator().current().is_some());

    page.emit(PageEvent::DocumentReloaded {
        url: WATCH_A.to_string(),
    });
    sleep(Duration::from_millis(50)).await;
    assert!(app.locator().current().is_none());
    assert_eq!(app.status().reloads, 1);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_run_is_refused_while_an_evaluation_is_in_flight() {
    let page = MemoryPage::new(WATCH_A);
    let store = Arc::new(MemoryConfigStore::new());
    let app = app(&page, &store).await;

    // Startup evaluation begins after the debounce and keeps retrying the locator.
    sleep(Duration::from_millis(300)).await;
    assert!(app.scheduler().in_flight());
    let queries = page.media_queries();

    assert!(app.run_once(EvaluationKind::Full).await.is_none());
    assert_eq!(page.media_queries(), queries);
    assert_eq!(app.scheduler().stats().dropped_busy, 1);

    sleep(Duration::from_secs(2)).await;
    let stats = app.scheduler().stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.completed, 1);
    assert!(app.run_once(EvaluationKind::Light).await.is_some());
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn settings_written_elsewhere_are_adopted_and_reapplied() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.25, false)));
    let surface = Arc::new(MenuSurface::new());
    let app = AppContext::new(page.clone(), store.clone(), tuning())
        .await
        .with_command_surface(surface.clone());
    app.start().await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(page.rate_of(&node), Some(1.25));

    // Another process, such as `tubepace config set-rate`, rewrites the record.
    store.set(SETTINGS_KEY, stored(1.75, false)).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(app.settings().target_rate.value(), 1.75);
    assert_eq!(page.rate_of(&node), Some(1.75));
    let report = app.last_report().unwrap();
    assert_eq!(report.key, "command");
    assert_eq!(report.reason, "settings-reload");
    assert!(surface
        .entries()
        .iter()
        .any(|entry| entry.id == "rate:1.75" && entry.label.starts_with('✓')));
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_never_overwrite_newer_stored_settings() {
    let page = MemoryPage::new(WATCH_A);
    page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.25, false)));
    let tuning = RuntimeTuning {
        settings_poll: Duration::ZERO,
        ..tuning()
    };
    let app = AppContext::new(page.clone(), store.clone(), tuning).await;
    app.start().await;
    sleep(Duration::from_secs(2)).await;

    store.set(SETTINGS_KEY, stored(1.25, true)).await.unwrap();
    app.invoke_id("rate:0.5").await.unwrap();

    let record = store.value(SETTINGS_KEY).unwrap();
    assert_eq!(record["target_rate"], json!(0.5));
    assert_eq!(record["categories"]["live"], json!(true));
    assert!(app.settings().is_enabled(Category::Live));

    store.set(SETTINGS_KEY, stored(2.0, true)).await.unwrap();
    assert!(app.reload_settings().await.unwrap());
    assert!(!app.reload_settings().await.unwrap());
    assert_eq!(app.settings().target_rate.value(), 2.0);
    app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn swapped_source_on_the_same_element_gets_the_rate() {
    let page = MemoryPage::new(WATCH_A);
    let node = page.add_media(MediaSpec::new("blob:a").matching(PLAYER));
    let store = Arc::new(MemoryConfigStore::with_value(SETTINGS_KEY, stored(1.5, false)));
    let app = app(&page, &store).await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(page.rate_of(&node), Some(1.5));

    // Loading a new source resets the element's rate.
    page.host_set_rate(&node, 1.0);
    page.swap_source(&node, "blob:b");
    sleep(Duration::from_secs(2)).await;

    assert_eq!(page.rate_of(&node), Some(1.5));
    assert_eq!(page.rate_writes(), 2);
    let report = app.last_report().unwrap();
    assert_eq!(report.key, "media");
    assert_eq!(report.decision, Decision::Applied);
    assert_eq!(app.locator().current().unwrap().source, "blob:b");
    assert_eq!(app.cache().clears(), 0);
    app.shutdown().await;
}
