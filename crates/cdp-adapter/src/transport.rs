use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Raw command/event pipe to the browser.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

struct ControlMessage {
    target: CommandTarget,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, AdapterError>>,
}

type Inflight = HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>;

/// Transport over a chromiumoxide websocket connection, launching Chromium
/// when no websocket url is configured.
pub struct ChromiumTransport {
    command_tx: mpsc::Sender<ControlMessage>,
    events_rx: Mutex<mpsc::Receiver<TransportEvent>>,
    loop_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
    deadline: Duration,
}

impl ChromiumTransport {
    pub async fn connect(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (child, endpoint) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let (child, url) = spawn_chromium(cfg).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&endpoint)
            .await
            .map_err(|err| io_error(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let alive = Arc::new(AtomicBool::new(true));
        let pump = Pump {
            conn,
            pending: Inflight::new(),
            events: event_tx,
        };
        let pump_alive = Arc::clone(&alive);
        let loop_task = tokio::spawn(async move {
            let outcome = pump.run(command_rx).await;
            pump_alive.store(false, Ordering::Relaxed);
            if let Err(err) = outcome {
                error!(target: "cdp-transport", %err, "websocket pump stopped");
            }
        });

        info!(target: "cdp-transport", %endpoint, launched = child.is_some(), "devtools socket open");
        Ok(Self {
            command_tx,
            events_rx: Mutex::new(event_rx),
            loop_task,
            child: Mutex::new(child),
            alive,
            deadline: Duration::from_millis(cfg.default_deadline_ms),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

fn io_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn next_event(&self) -> Option<TransportEvent> {
        self.events_rx.lock().await.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        if !self.is_alive() {
            return Err(io_error("devtools socket is closed"));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(ControlMessage {
                target,
                method: method.to_owned(),
                params,
                responder: reply_tx,
            })
            .await
            .map_err(|_| io_error("websocket pump is gone"))?;

        tokio::time::timeout(self.deadline, reply_rx)
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint(format!("no reply to {method} within {:?}", self.deadline))
                    .retriable(true)
            })?
            .unwrap_or_else(|_| Err(io_error("reply dropped before it arrived")))
    }
}

impl Drop for ChromiumTransport {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();

        let Some(mut child) = self.child.try_lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "chromium child survived shutdown");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "runtime gone; leaving chromium child to exit"),
        }
    }
}

const COMMAND_QUEUE: usize = 128;
const EVENT_QUEUE: usize = 512;

const CHROMIUM_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--disable-breakpad",
    "--disable-background-timer-throttling",
    "--autoplay-policy=no-user-gesture-required",
    "--remote-allow-origins=*",
];

fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("cannot resolve profile dir: {err}"))
            })?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("cannot create profile dir {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let custom_executable = !cfg.executable.as_os_str().is_empty();
    if custom_executable && !cfg.executable.exists() {
        return Err(io_error(format!("browser binary not found at {}", cfg.executable.display()))
            .with_data(json!({
                "path": cfg.executable,
                "fix": "point TUBEPACE_CHROME at a chrome or chromium binary",
            })));
    }

    let mut flags: Vec<&str> = CHROMIUM_FLAGS.to_vec();
    if cfg.headless {
        flags.extend(["--headless=new", "--mute-audio"]);
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(Duration::from_secs(20))
        .user_data_dir(profile_dir(cfg)?)
        .args(flags);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if custom_executable {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder
        .build()
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("invalid browser config: {err}")))
}

async fn spawn_chromium(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = browser_config(cfg)?.launch().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("chromium did not start: {err}"))
    })?;
    let endpoint = extract_ws_url(&mut child)
        .await
        .map_err(|err| io_error(err.to_string()))?;
    Ok((child, endpoint))
}

/// Owns the websocket and the table of commands awaiting a reply.
struct Pump {
    conn: Connection<CdpEventMessage>,
    pending: Inflight,
    events: mpsc::Sender<TransportEvent>,
}

impl Pump {
    async fn run(mut self, mut commands: mpsc::Receiver<ControlMessage>) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                Some(cmd) = commands.recv() => self.dispatch(cmd),
                frame = self.conn.next() => match frame {
                    Some(Ok(Message::Response(resp))) => self.settle(resp),
                    Some(Ok(Message::Event(event))) => {
                        if let Err(err) = self.publish(event).await {
                            warn!(target: "cdp-transport", %err, "dropping undecodable event");
                        }
                    }
                    Some(Err(err)) => {
                        let err = classify_connection_error(err);
                        self.fail_pending(&err);
                        return Err(err);
                    }
                    None => {
                        self.fail_pending(&AdapterError::new(AdapterErrorKind::CdpIo).with_hint("socket closed"));
                        return Ok(());
                    }
                },
            }
        }
    }

    fn dispatch(&mut self, cmd: ControlMessage) {
        let session = match cmd.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
        };
        let method: MethodId = cmd.method.into();
        match self.conn.submit_command(method, session, cmd.params) {
            Ok(call) => {
                self.pending.insert(call, cmd.responder);
            }
            Err(err) => {
                let _ = cmd
                    .responder
                    .send(Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())));
            }
        }
    }

    fn settle(&mut self, resp: Response) {
        let Some(responder) = self.pending.remove(&resp.id) else {
            debug!(target: "cdp-transport", id = ?resp.id, "reply for unknown call");
            return;
        };
        let outcome = match (resp.result, resp.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("{} ({})", error.message, error.code))
                .retriable(error.code >= 500)),
            (None, None) => Err(AdapterError::new(AdapterErrorKind::Payload).with_hint("reply had no body")),
        };
        let _ = responder.send(outcome);
    }

    async fn publish(&self, event: CdpEventMessage) -> Result<(), AdapterError> {
        let raw: CdpJsonEventMessage = event.try_into().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Payload).with_hint(format!("event decode: {err}"))
        })?;
        let event = TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        };
        self.events
            .send(event)
            .await
            .map_err(|_| AdapterError::new(AdapterErrorKind::Internal).with_hint("event receiver gone"))
    }

    fn fail_pending(&mut self, err: &AdapterError) {
        for (_, responder) in self.pending.drain() {
            let _ = responder.send(Err(err.clone()));
        }
    }
}

fn classify_connection_error(err: CdpError) -> AdapterError {
    let kind = if matches!(err, CdpError::Timeout) {
        AdapterErrorKind::Timeout
    } else {
        AdapterErrorKind::CdpIo
    };
    AdapterError::new(kind).with_hint(err.to_string()).retriable(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_executable_is_reported_before_launch() {
        let cfg = CdpConfig {
            executable: PathBuf::from("/definitely/not/here/chrome"),
            ..CdpConfig::default()
        };
        let err = browser_config(&cfg).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.hint.unwrap_or_default().contains("not found"));
        assert!(err.data.is_some());
    }
}
