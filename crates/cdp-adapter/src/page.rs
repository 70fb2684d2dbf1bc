//! [`PagePort`] implementation backed by a DevTools session on one tab.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tubepace_core_types::{MarkerNode, MediaProbe, NodeRef};

use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::PageEvent;
use crate::port::PagePort;
use crate::scripts;
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};

/// Payload shape sent by the observer script through the binding.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum BindingPayload {
    Host { name: String, url: String },
    Location { url: String },
    Src { node: String, src: String },
    Ready { node: String, phase: String },
}

pub struct CdpPage {
    transport: Arc<dyn CdpTransport>,
    session_id: String,
    target_id: String,
    events: broadcast::Sender<PageEvent>,
    shutdown: CancellationToken,
    pump: JoinHandle<()>,
}

impl CdpPage {
    /// Open a tab on `url`, attach to it and install the observer.
    pub async fn open(transport: Arc<dyn CdpTransport>, url: &str) -> Result<Self, AdapterError> {
        let created = transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = string_field(&created, "targetId")?;

        let attached = transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        let (events, _) = broadcast::channel(256);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(pump_events(
            transport.clone(),
            session_id.clone(),
            target_id.clone(),
            events.clone(),
            shutdown.clone(),
        ));

        let page = Self {
            transport,
            session_id,
            target_id,
            events,
            shutdown,
            pump,
        };
        page.install().await?;
        page.send("Page.navigate", json!({ "url": url })).await?;
        info!(target: "cdp-transport", target = %page.target_id, %url, "page attached");
        Ok(page)
    }

    async fn install(&self) -> Result<(), AdapterError> {
        self.send("Page.enable", json!({})).await?;
        self.send("Runtime.enable", json!({})).await?;
        self.send("Runtime.addBinding", json!({ "name": scripts::BINDING_NAME }))
            .await?;
        self.send(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": scripts::OBSERVER_SCRIPT }),
        )
        .await?;
        self.evaluate_raw(scripts::OBSERVER_SCRIPT).await?;
        Ok(())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.transport
            .send_command(CommandTarget::Session(self.session_id.clone()), method, params)
            .await
    }

    async fn evaluate_raw(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|ex| ex.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script exception")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint(text)
                .with_data(details.clone()));
        }
        Ok(response
            .get("result")
            .and_then(|result| result.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn evaluate<T: DeserializeOwned>(&self, expression: &str) -> Result<T, AdapterError> {
        let value = self.evaluate_raw(expression).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Payload)
                .with_hint(format!("unexpected script result: {err}"))
        })
    }
}

#[async_trait]
impl PagePort for CdpPage {
    async fn location(&self) -> Result<String, AdapterError> {
        self.evaluate(scripts::LOCATION_SCRIPT).await
    }

    async fn query_markers(&self, selector: &str) -> Result<Vec<MarkerNode>, AdapterError> {
        self.evaluate(&scripts::markers(selector)).await
    }

    async fn media_candidates(&self, selector: &str) -> Result<Vec<MediaProbe>, AdapterError> {
        self.evaluate(&scripts::media_candidates(selector)).await
    }

    async fn probe_media(&self, node: &NodeRef) -> Result<Option<MediaProbe>, AdapterError> {
        self.evaluate(&scripts::probe(node)).await
    }

    async fn set_playback_rate(&self, node: &NodeRef, rate: f64) -> Result<f64, AdapterError> {
        let applied: Option<f64> = self.evaluate(&scripts::set_rate(node, rate)).await?;
        applied.ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Detached)
                .with_hint(format!("media node {node} is no longer attached"))
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.pump.abort();
    }
}

async fn pump_events(
    transport: Arc<dyn CdpTransport>,
    session_id: String,
    target_id: String,
    events: broadcast::Sender<PageEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = transport.next_event() => next,
        };
        let Some(raw) = next else {
            debug!(target: "cdp-transport", "event stream closed");
            break;
        };
        if raw.session_id.as_deref() != Some(session_id.as_str()) {
            continue;
        }
        if let Some(event) = translate(&raw, &target_id) {
            debug!(target: "cdp-transport", kind = event.kind(), "page event");
            let _ = events.send(event);
        }
    }
}

/// Reduce a raw protocol event to a [`PageEvent`], if it is one we track.
pub(crate) fn translate(raw: &TransportEvent, main_frame: &str) -> Option<PageEvent> {
    match raw.method.as_str() {
        "Runtime.bindingCalled" => {
            if raw.params.get("name").and_then(Value::as_str) != Some(scripts::BINDING_NAME) {
                return None;
            }
            let payload = raw.params.get("payload").and_then(Value::as_str)?;
            match serde_json::from_str::<BindingPayload>(payload) {
                Ok(BindingPayload::Host { name, url }) => Some(PageEvent::HostNavigation { name, url }),
                Ok(BindingPayload::Location { url }) => Some(PageEvent::LocationChanged { url }),
                Ok(BindingPayload::Src { node, src }) => Some(PageEvent::MediaSourceChanged {
                    node: NodeRef(node),
                    src,
                }),
                Ok(BindingPayload::Ready { node, phase }) => Some(PageEvent::MediaReady {
                    node: NodeRef(node),
                    phase,
                }),
                Err(err) => {
                    warn!(target: "cdp-transport", %err, "malformed binding payload");
                    None
                }
            }
        }
        "Page.navigatedWithinDocument" => {
            if raw.params.get("frameId").and_then(Value::as_str) != Some(main_frame) {
                return None;
            }
            let url = raw.params.get("url").and_then(Value::as_str)?;
            Some(PageEvent::LocationChanged {
                url: url.to_string(),
            })
        }
        "Page.frameNavigated" => {
            let frame = raw.params.get("frame")?;
            if frame.get("parentId").is_some()
                || frame.get("id").and_then(Value::as_str) != Some(main_frame)
            {
                return None;
            }
            let url = frame.get("url").and_then(Value::as_str)?;
            Some(PageEvent::DocumentReloaded {
                url: url.to_string(),
            })
        }
        _ => None,
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Payload)
                .with_hint(format!("response missing {field}"))
                .with_data(value.clone())
        })
}
