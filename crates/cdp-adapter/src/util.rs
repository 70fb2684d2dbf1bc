use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

/// Extract the DevTools websocket URL Chromium prints on stderr at startup.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = parse_ws_line(&line) {
                return Ok(ws);
            }
            captured.push(line);
        }
        Err(anyhow!(
            "chromium exited before exposing a devtools url: {}",
            captured.iter().take(8).cloned().collect::<Vec<_>>().join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for the devtools websocket url"))?
}

fn parse_ws_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}
