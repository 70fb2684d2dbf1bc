//! Page-side scripts evaluated through `Runtime.evaluate`.
//!
//! Media elements are addressed by a `data-tubepace-node` attribute that the
//! scripts assign on first sight, so a node reference stays valid exactly as
//! long as the element it was assigned to.

use serde_json::Value;
use tubepace_core_types::NodeRef;

pub const BINDING_NAME: &str = "__tubepaceSignal";

pub const NODE_ATTRIBUTE: &str = "data-tubepace-node";

/// Installs host event listeners, the URL/structure observer and per-element
/// media observers. Reports through the `__tubepaceSignal` binding.
pub const OBSERVER_SCRIPT: &str = r#"(() => {
  if (window.__tubepaceObserver) return;
  window.__tubepaceObserver = true;
  const send = (payload) => {
    try { window.__tubepaceSignal(JSON.stringify(payload)); } catch (_) {}
  };
  const nodeId = (el) => {
    if (!el.dataset.tubepaceNode) {
      window.__tubepaceNext = (window.__tubepaceNext || 0) + 1;
      el.dataset.tubepaceNode = 'media-' + window.__tubepaceNext;
    }
    return el.dataset.tubepaceNode;
  };
  const watched = new WeakSet();
  const watchMedia = (el) => {
    if (watched.has(el)) return;
    watched.add(el);
    ['loadedmetadata', 'canplay', 'playing'].forEach((phase) =>
      el.addEventListener(phase, () => send({ kind: 'ready', node: nodeId(el), phase })));
    new MutationObserver(() => send({ kind: 'src', node: nodeId(el), src: el.currentSrc || el.src || '' }))
      .observe(el, { attributes: true, attributeFilter: ['src'] });
  };
  let scanQueued = false;
  const queueScan = () => {
    if (scanQueued) return;
    scanQueued = true;
    setTimeout(() => {
      scanQueued = false;
      document.querySelectorAll('video').forEach(watchMedia);
    }, 200);
  };
  ['yt-navigate-start', 'yt-navigate-finish', 'yt-page-data-updated'].forEach((name) =>
    document.addEventListener(name, () => send({ kind: 'host', name, url: location.href })));
  let lastUrl = location.href;
  const start = () => {
    new MutationObserver(() => {
      if (location.href !== lastUrl) {
        lastUrl = location.href;
        send({ kind: 'location', url: lastUrl });
      }
      queueScan();
    }).observe(document.documentElement, { childList: true, subtree: true });
    queueScan();
  };
  if (document.documentElement) start();
  else document.addEventListener('DOMContentLoaded', start);
})()"#;

pub const LOCATION_SCRIPT: &str = "location.href";

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

pub fn markers(selector: &str) -> String {
    format!(
        r#"(() => Array.from(document.querySelectorAll({sel})).map((el) => {{
  const rect = el.getBoundingClientRect();
  const style = getComputedStyle(el);
  return {{
    visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
    text: (el.textContent || '').trim().slice(0, 200),
    attributes: Object.fromEntries(Array.from(el.attributes).map((a) => [a.name, a.value])),
  }};
}}))()"#,
        sel = quote(selector)
    )
}

const PROBE_FN: &str = r#"const probe = (el) => {
  if (!el.dataset.tubepaceNode) {
    window.__tubepaceNext = (window.__tubepaceNext || 0) + 1;
    el.dataset.tubepaceNode = 'media-' + window.__tubepaceNext;
  }
  const rect = el.getBoundingClientRect();
  const style = getComputedStyle(el);
  return {
    node: el.dataset.tubepaceNode,
    src: el.currentSrc || el.src || '',
    visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',
    ready_state: el.readyState,
    playback_rate: el.playbackRate,
    connected: el.isConnected,
  };
};"#;

pub fn media_candidates(selector: &str) -> String {
    format!(
        "(() => {{ {PROBE_FN} return Array.from(document.querySelectorAll({sel})).filter((el) => el instanceof HTMLMediaElement).map(probe); }})()",
        sel = quote(selector)
    )
}

fn node_selector(node: &NodeRef) -> String {
    quote(&format!("[{NODE_ATTRIBUTE}=\"{}\"]", node.0))
}

pub fn probe(node: &NodeRef) -> String {
    format!(
        "(() => {{ {PROBE_FN} const el = document.querySelector({sel}); return el ? probe(el) : null; }})()",
        sel = node_selector(node)
    )
}

pub fn set_rate(node: &NodeRef, rate: f64) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return null; el.playbackRate = {rate}; return el.playbackRate; }})()",
        sel = node_selector(node)
    )
}
