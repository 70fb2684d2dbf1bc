//! The controller: one context object owning every pipeline component.
//!
//! Signals flow `NavigationWatcher -> bus -> ReactionScheduler ->
//! EvaluationPipeline`, and the pipeline runs classify, policy, locate and
//! apply in that order. Settings live here as a cached copy of the stored
//! record. Changes made here are written back; changes written to the store
//! by another process are picked up on the next settings poll.

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::PagePort;
use chrono::Utc;
use content_classifier::{ClassificationCache, ContentClassifier};
use media_locator::{ElementLocator, LocatorError};
use nav_watcher::NavigationWatcher;
use parking_lot::{Mutex, RwLock};
use rate_applier::{ApplyError, RateApplier};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tubepace_core_types::{Category, EvaluationId, NodeRef};
use tubepace_event_bus::{EventBus, InMemoryBus};
use tubepace_scheduler::{
    Admission, EvaluationKind, Pipeline, ReactionScheduler, SchedulerError, Trigger,
};

use crate::commands::{register_all, Command, CommandSurface};
use crate::config::{load_settings, save_settings, ConfigStore};
use crate::errors::TubePaceError;
use crate::settings::{Settings, SETTINGS_KEY};
use crate::status::{Decision, EvaluationReport, StatusView};
use crate::tuning::RuntimeTuning;
use crate::update_check::{Notifier, UpdateChecker, UpdateOutcome};

/// Trigger keys the controller schedules itself.
pub mod keys {
    pub const STARTUP: &str = "startup";
    pub const COMMAND: &str = "command";
    pub const LAGGED: &str = "lagged";
    pub const SETTINGS_RELOAD: &str = "settings-reload";
}

const BUS_CAPACITY: usize = 64;

struct EvaluationPipeline {
    settings: Arc<RwLock<Settings>>,
    classifier: Arc<ContentClassifier>,
    locator: Arc<ElementLocator>,
    applier: Arc<RateApplier>,
    watcher: Arc<NavigationWatcher>,
    last_report: Arc<Mutex<Option<EvaluationReport>>>,
}

struct Outcome {
    category: Option<Category>,
    decision: Decision,
    node: Option<NodeRef>,
    detail: Option<String>,
}

impl Outcome {
    fn new(category: Category, decision: Decision) -> Self {
        Self {
            category: Some(category),
            decision,
            node: None,
            detail: None,
        }
    }

    fn on(mut self, node: NodeRef) -> Self {
        self.node = Some(node);
        self
    }

    fn because(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

impl EvaluationPipeline {
    async fn run(&self, trigger: &Trigger, settings: &Settings) -> Result<Outcome, (Outcome, TubePaceError)> {
        let category = self.classifier.classify().await;
        if !settings.is_enabled(category) {
            return Ok(Outcome::new(category, Decision::CategoryDisabled));
        }

        let handle = match self.locator.locate(trigger.kind).await {
            Ok(handle) => handle,
            Err(LocatorError::ElementNotFound { attempts }) => {
                warn!(
                    target: "tubepace",
                    key = %trigger.key,
                    %category,
                    attempts,
                    "no media element to apply the rate to"
                );
                return Ok(Outcome::new(category, Decision::ElementNotFound)
                    .because(format!("gave up after {attempts} attempt(s)")));
            }
            Err(err) => {
                let outcome = Outcome::new(category, Decision::Failed).because(&err);
                return Err((outcome, err.into()));
            }
        };

        let target = settings.target_rate;
        match self.applier.apply(&handle, target).await {
            Ok(true) => {
                let mut probe = handle.last_probe.clone();
                probe.playback_rate = target.value();
                self.locator.refresh(probe);
                Ok(Outcome::new(category, Decision::Applied).on(handle.node))
            }
            Ok(false) => Ok(Outcome::new(category, Decision::AlreadyAtRate).on(handle.node)),
            Err(err) => {
                if matches!(err, ApplyError::Detached { .. }) {
                    self.locator.invalidate();
                }
                warn!(
                    target: "tubepace",
                    key = %trigger.key,
                    %category,
                    node = %handle.node,
                    source = %handle.source,
                    %err,
                    "rate application failed"
                );
                let outcome = Outcome::new(category, Decision::Failed)
                    .on(handle.node.clone())
                    .because(&err);
                Err((outcome, err.into()))
            }
        }
    }

    fn record(&self, id: EvaluationId, trigger: &Trigger, settings: &Settings, outcome: Outcome) {
        let report = EvaluationReport {
            id,
            key: trigger.key.clone(),
            kind: trigger.kind,
            reason: trigger.reason.clone(),
            category: outcome.category,
            decision: outcome.decision,
            target_rate: settings.target_rate.value(),
            node: outcome.node,
            detail: outcome.detail,
            at: Utc::now(),
        };
        log_report(&report, settings.debug_enabled);
        *self.last_report.lock() = Some(report);
    }
}

fn log_report(report: &EvaluationReport, verbose: bool) {
    let category = report.category.map(Category::name).unwrap_or("-");
    let node = report.node.as_ref().map(|n| n.0.as_str()).unwrap_or("-");
    if verbose {
        info!(
            target: "tubepace",
            id = %report.id,
            key = %report.key,
            kind = %report.kind,
            reason = %report.reason,
            category,
            node,
            decision = report.decision.as_str(),
            rate = report.target_rate,
            "evaluation finished"
        );
    } else {
        debug!(
            target: "tubepace",
            id = %report.id,
            key = %report.key,
            kind = %report.kind,
            category,
            node,
            decision = report.decision.as_str(),
            "evaluation finished"
        );
    }
}

#[async_trait::async_trait]
impl Pipeline for EvaluationPipeline {
    async fn evaluate(&self, trigger: Trigger) -> Result<(), SchedulerError> {
        self.watcher.settle();
        let id = EvaluationId::new();
        let settings = *self.settings.read();
        match self.run(&trigger, &settings).await {
            Ok(outcome) => {
                self.record(id, &trigger, &settings, outcome);
                Ok(())
            }
            Err((outcome, err)) => {
                self.record(id, &trigger, &settings, outcome);
                Err(err.into())
            }
        }
    }
}

/// In-memory settings plus the last record seen in, or written to, the store.
///
/// A stored record that differs from `synced` was written by someone else and
/// is adopted. A record that still equals `synced` is ours, so a failed write
/// never reverts the in-memory value.
struct SettingsLink {
    store: Arc<dyn ConfigStore>,
    current: Arc<RwLock<Settings>>,
    synced: Mutex<Settings>,
}

impl SettingsLink {
    /// Adopt an external change to the stored record, if there is one.
    async fn pull(&self) -> Result<Option<Settings>, TubePaceError> {
        let fallback = self.synced.lock().to_value();
        let stored = self.store.get(SETTINGS_KEY, fallback).await?;
        let (latest, _) = Settings::from_stored(&stored);
        {
            let mut synced = self.synced.lock();
            if *synced == latest {
                return Ok(None);
            }
            *synced = latest;
        }
        let previous = std::mem::replace(&mut *self.current.write(), latest);
        if previous == latest {
            return Ok(None);
        }
        info!(
            target: "tubepace",
            rate = %latest.target_rate,
            debug = latest.debug_enabled,
            "stored settings changed, adopting them"
        );
        Ok(Some(latest))
    }

    async fn push(&self, settings: &Settings) -> Result<(), TubePaceError> {
        save_settings(self.store.as_ref(), settings).await?;
        *self.synced.lock() = *settings;
        Ok(())
    }
}

pub struct AppContext {
    page: Arc<dyn PagePort>,
    link: Arc<SettingsLink>,
    settings: Arc<RwLock<Settings>>,
    tuning: RuntimeTuning,
    cache: Arc<ClassificationCache>,
    classifier: Arc<ContentClassifier>,
    locator: Arc<ElementLocator>,
    applier: Arc<RateApplier>,
    watcher: Arc<NavigationWatcher>,
    bus: Arc<InMemoryBus<Trigger>>,
    scheduler: ReactionScheduler,
    last_report: Arc<Mutex<Option<EvaluationReport>>>,
    surface: Option<Arc<dyn CommandSurface>>,
    updates: Option<(Arc<UpdateChecker>, Arc<dyn Notifier>)>,
    pump: Mutex<Option<JoinHandle<()>>>,
    settings_poll: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Build the pipeline over `page` and load settings from `store`.
    pub async fn new(
        page: Arc<dyn PagePort>,
        store: Arc<dyn ConfigStore>,
        tuning: RuntimeTuning,
    ) -> Self {
        let loaded = load_settings(store.as_ref()).await;
        let settings = Arc::new(RwLock::new(loaded));
        let link = Arc::new(SettingsLink {
            store,
            current: Arc::clone(&settings),
            synced: Mutex::new(loaded),
        });
        let cache = Arc::new(ClassificationCache::new(tuning.cache_ttl));
        let classifier = Arc::new(ContentClassifier::new(Arc::clone(&page), Arc::clone(&cache)));
        let locator = Arc::new(ElementLocator::new(Arc::clone(&page), tuning.locator()));
        let applier = Arc::new(RateApplier::new(Arc::clone(&page), tuning.applier()));
        let bus = InMemoryBus::new(BUS_CAPACITY);
        let watcher = Arc::new(NavigationWatcher::new(
            Arc::clone(&page),
            Arc::clone(&cache),
            Arc::clone(&locator),
            Arc::clone(&bus),
            tuning.watcher(),
        ));
        let last_report = Arc::new(Mutex::new(None));
        let pipeline = Arc::new(EvaluationPipeline {
            settings: Arc::clone(&settings),
            classifier: Arc::clone(&classifier),
            locator: Arc::clone(&locator),
            applier: Arc::clone(&applier),
            watcher: Arc::clone(&watcher),
            last_report: Arc::clone(&last_report),
        });
        let scheduler = ReactionScheduler::new(tuning.scheduler(), pipeline);

        Self {
            page,
            link,
            settings,
            tuning,
            cache,
            classifier,
            locator,
            applier,
            watcher,
            bus,
            scheduler,
            last_report,
            surface: None,
            updates: None,
            pump: Mutex::new(None),
            settings_poll: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_command_surface(mut self, surface: Arc<dyn CommandSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_update_checker(mut self, checker: Arc<UpdateChecker>, notifier: Arc<dyn Notifier>) -> Self {
        self.updates = Some((checker, notifier));
        self
    }

    /// Start listening and schedule the initial evaluation.
    pub async fn start(&self) {
        // Subscribe before the watcher starts so no trigger is missed.
        let rx = self.bus.subscribe();
        let pump = spawn_trigger_pump(rx, self.scheduler.clone(), self.shutdown.clone());
        if let Some(previous) = self.pump.lock().replace(pump) {
            previous.abort();
        }
        self.watcher.start().await;
        if !self.tuning.settings_poll.is_zero() {
            let poll = spawn_settings_poll(
                Arc::clone(&self.link),
                self.surface.clone(),
                self.scheduler.clone(),
                self.tuning.settings_poll,
                self.shutdown.clone(),
            );
            if let Some(previous) = self.settings_poll.lock().replace(poll) {
                previous.abort();
            }
        }
        self.refresh_commands();
        let identity = self.watcher.identity();
        info!(
            target: "tubepace",
            rate = %self.settings().target_rate,
            identity = identity.as_ref().map(|i| i.as_str()).unwrap_or("-"),
            "controller started"
        );
        self.schedule(Trigger::full(keys::STARTUP, keys::STARTUP));
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.cancel_pending();
        self.watcher.stop().await;
        self.applier.cancel_verification();
        let tasks = [self.pump.lock().take(), self.settings_poll.lock().take()];
        for task in tasks.into_iter().flatten() {
            let _ = task.await;
        }
        info!(target: "tubepace", "controller stopped");
    }

    pub fn schedule(&self, trigger: Trigger) {
        self.scheduler.schedule(trigger);
    }

    /// Run one evaluation immediately, bypassing the debounce window.
    ///
    /// Returns `None` without evaluating when another evaluation is in flight.
    pub async fn run_once(&self, kind: EvaluationKind) -> Option<EvaluationReport> {
        let trigger = Trigger::new("manual", kind, "manual");
        match self.scheduler.run_now(trigger).await {
            Admission::Busy => {
                debug!(target: "tubepace", "manual evaluation skipped, another one is in flight");
                return None;
            }
            Admission::Ran(Err(err)) => debug!(target: "tubepace", %err, "manual evaluation failed"),
            Admission::Ran(Ok(())) => {}
        }
        self.last_report()
    }

    pub fn settings(&self) -> Settings {
        *self.settings.read()
    }

    /// Change settings in memory, then persist.
    ///
    /// The stored record is re-read first so a change made elsewhere is not
    /// overwritten. A failed write is logged and the in-memory value is kept.
    pub async fn update_settings<F>(&self, change: F) -> Settings
    where
        F: FnOnce(&mut Settings) -> bool,
    {
        if let Err(err) = self.link.pull().await {
            debug!(target: "tubepace", %err, "could not re-read settings before changing them");
        }
        let (updated, changed) = {
            let mut guard = self.settings.write();
            let changed = change(&mut guard);
            (*guard, changed)
        };
        if changed {
            if let Err(err) = self.link.push(&updated).await {
                warn!(target: "tubepace", %err, "settings changed but could not be saved");
            }
            self.refresh_commands();
        }
        updated
    }

    /// Pick up a settings change written to the store by another process and
    /// re-evaluate under it. Returns whether anything changed.
    pub async fn reload_settings(&self) -> Result<bool, TubePaceError> {
        let adopted = self.link.pull().await?;
        if adopted.is_some() {
            self.refresh_commands();
            self.schedule(Trigger::full(keys::COMMAND, keys::SETTINGS_RELOAD));
        }
        Ok(adopted.is_some())
    }

    /// Execute a command from the surface.
    pub async fn invoke(&self, command: Command) -> Result<Option<UpdateOutcome>, TubePaceError> {
        if let Command::CheckUpdate = command {
            let (checker, notifier) = self
                .updates
                .as_ref()
                .ok_or_else(|| TubePaceError::invalid_command("update checks are not configured"))?;
            return Ok(Some(checker.check_and_notify(notifier.as_ref()).await));
        }

        let settings = self.update_settings(|settings| command.apply(settings)).await;
        info!(
            target: "tubepace",
            command = %command,
            rate = %settings.target_rate,
            debug = settings.debug_enabled,
            "command applied"
        );
        self.schedule(Trigger::full(keys::COMMAND, command.id()));
        Ok(None)
    }

    pub async fn invoke_id(&self, id: &str) -> Result<Option<UpdateOutcome>, TubePaceError> {
        let command: Command = id.parse()?;
        self.invoke(command).await
    }

    pub fn last_report(&self) -> Option<EvaluationReport> {
        self.last_report.lock().clone()
    }

    /// Synchronous, side-effect free snapshot of the pipeline.
    pub fn status(&self) -> StatusView {
        StatusView {
            settings: self.settings(),
            tuning: self.tuning.clone(),
            last_category: self.classifier.last_category(),
            in_flight: self.scheduler.in_flight(),
            pending: self.scheduler.pending(),
            element: self.locator.current().into(),
            identity: self.watcher.identity(),
            watch_phase: self.watcher.phase().as_str(),
            navigations: self.watcher.navigations(),
            reloads: self.watcher.reloads(),
            rate_writes: self.applier.writes(),
            scheduler: self.scheduler.stats(),
            cache: self.cache.metrics(),
            last_report: self.last_report(),
        }
    }

    pub fn page(&self) -> &Arc<dyn PagePort> {
        &self.page
    }

    pub fn watcher(&self) -> &Arc<NavigationWatcher> {
        &self.watcher
    }

    pub fn locator(&self) -> &Arc<ElementLocator> {
        &self.locator
    }

    pub fn applier(&self) -> &Arc<RateApplier> {
        &self.applier
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &ReactionScheduler {
        &self.scheduler
    }

    fn refresh_commands(&self) {
        refresh_surface(self.surface.as_deref(), &self.settings());
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.scheduler.cancel_pending();
        for slot in [&self.pump, &self.settings_poll] {
            if let Some(task) = slot.lock().take() {
                task.abort();
            }
        }
    }
}

fn spawn_trigger_pump(
    mut rx: tokio::sync::broadcast::Receiver<Trigger>,
    scheduler: ReactionScheduler,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(trigger) => {
                        debug!(
                            target: "tubepace",
                            key = %trigger.key,
                            kind = %trigger.kind,
                            reason = %trigger.reason,
                            "trigger received"
                        );
                        scheduler.schedule(trigger);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "tubepace", skipped, "triggers lost, scheduling full evaluation");
                        scheduler.schedule(Trigger::full(keys::LAGGED, keys::LAGGED));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    })
}

fn refresh_surface(surface: Option<&dyn CommandSurface>, settings: &Settings) {
    if let Some(surface) = surface {
        let count = register_all(surface, settings);
        debug!(target: "tubepace", count, "commands registered");
    }
}

fn spawn_settings_poll(
    link: Arc<SettingsLink>,
    surface: Option<Arc<dyn CommandSurface>>,
    scheduler: ReactionScheduler,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match link.pull().await {
                    Ok(Some(settings)) => {
                        refresh_surface(surface.as_deref(), &settings);
                        scheduler.schedule(Trigger::full(keys::COMMAND, keys::SETTINGS_RELOAD));
                    }
                    Ok(None) => {}
                    Err(err) => debug!(target: "tubepace", %err, "settings poll failed"),
                },
            }
        }
    })
}
