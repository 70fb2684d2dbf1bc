//! Read-only diagnostic view over a running controller.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use content_classifier::CacheMetric;
use media_locator::ElementHandle;
use serde::Serialize;
use tubepace_core_types::{Category, ContentIdentity, EvaluationId, NodeRef};
use tubepace_scheduler::{EvaluationKind, SchedulerStats};

use crate::settings::Settings;
use crate::tuning::RuntimeTuning;

/// What one evaluation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Applied,
    AlreadyAtRate,
    CategoryDisabled,
    ElementNotFound,
    Failed,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Applied => "applied",
            Decision::AlreadyAtRate => "already_at_rate",
            Decision::CategoryDisabled => "category_disabled",
            Decision::ElementNotFound => "element_not_found",
            Decision::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub id: EvaluationId,
    pub key: String,
    pub kind: EvaluationKind,
    pub reason: String,
    pub category: Option<Category>,
    pub decision: Decision,
    pub target_rate: f64,
    pub node: Option<NodeRef>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ElementStatus {
    pub present: bool,
    pub node: Option<NodeRef>,
    pub source: Option<String>,
    pub strategy: Option<&'static str>,
    pub rate: Option<f64>,
    pub ready_state: Option<u8>,
}

impl From<Option<ElementHandle>> for ElementStatus {
    fn from(handle: Option<ElementHandle>) -> Self {
        match handle {
            Some(handle) => Self {
                present: true,
                rate: Some(handle.rate()),
                ready_state: Some(handle.ready_state()),
                strategy: Some(handle.strategy.name()),
                node: Some(handle.node),
                source: Some(handle.source),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub settings: Settings,
    pub tuning: RuntimeTuning,
    pub last_category: Option<Category>,
    pub in_flight: bool,
    pub pending: usize,
    pub element: ElementStatus,
    pub identity: Option<ContentIdentity>,
    pub watch_phase: &'static str,
    pub navigations: u64,
    pub reloads: u64,
    pub rate_writes: u64,
    pub scheduler: SchedulerStats,
    pub cache: CacheMetric,
    pub last_report: Option<EvaluationReport>,
}

impl StatusView {
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "target rate     : {}", self.settings.target_rate);
        let enabled: Vec<&str> = Category::TOGGLEABLE
            .iter()
            .filter(|category| self.settings.is_enabled(**category))
            .map(|category| category.name())
            .collect();
        let _ = writeln!(out, "enabled         : regular, {}", enabled.join(", "));
        let _ = writeln!(out, "debug           : {}", self.settings.debug_enabled);
        let _ = writeln!(
            out,
            "content         : {} ({})",
            self.identity.as_ref().map(ContentIdentity::as_str).unwrap_or("-"),
            self.last_category.map(Category::name).unwrap_or("unclassified"),
        );
        let _ = writeln!(
            out,
            "pipeline        : {} in flight={} pending={}",
            self.watch_phase, self.in_flight, self.pending
        );
        match &self.element.node {
            Some(node) => {
                let _ = writeln!(
                    out,
                    "element         : {} via {} rate={} ready={}",
                    node,
                    self.element.strategy.unwrap_or("-"),
                    self.element.rate.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
                    self.element.ready_state.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
                );
            }
            None => {
                let _ = writeln!(out, "element         : none");
            }
        }
        let _ = writeln!(
            out,
            "evaluations     : scheduled={} coalesced={} completed={} failed={} dropped={}",
            self.scheduler.scheduled,
            self.scheduler.coalesced,
            self.scheduler.completed,
            self.scheduler.failed,
            self.scheduler.dropped_busy,
        );
        let _ = writeln!(
            out,
            "cache           : hit rate {:.0}% clears={} navigations={} reloads={}",
            self.cache.hit_rate * 100.0,
            self.cache.clears,
            self.navigations,
            self.reloads,
        );
        if let Some(report) = &self.last_report {
            let _ = writeln!(
                out,
                "last evaluation : {} {} ({}) at {}",
                report.decision.as_str(),
                report.category.map(Category::name).unwrap_or("-"),
                report.key,
                report.at.format("%H:%M:%S"),
            );
        }
        out
    }
}
