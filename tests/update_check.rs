use std::sync::Arc;

use parking_lot::Mutex;
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tubepace_cli::{Notification, Notifier, TubePaceError, UpdateChecker, UpdateOutcome};

/// Serve one canned HTTP response and return the manifest URL.
async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/tubepace.meta.txt")
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Notification>>);

impl Notifier for Recorder {
    fn notify(&self, notification: Notification) {
        self.0.lock().push(notification);
    }
}

#[tokio::test]
async fn newer_manifest_offers_an_open_action() {
    let url = serve_once("200 OK", "// ==UserScript==\n// @version 1.4.0\n// ==/UserScript==\n").await;
    let checker = UpdateChecker::new(url, "1.3.9")
        .unwrap()
        .with_download_url("https://example.org/download");
    let notifier = Arc::new(Recorder::default());

    let outcome = checker.check_and_notify(notifier.as_ref()).await;

    assert!(matches!(outcome, UpdateOutcome::UpdateAvailable { ref latest, .. } if latest == "1.4.0"));
    let sent = notifier.0.lock();
    assert_eq!(sent.len(), 1);
    let action = sent[0].action.as_ref().unwrap();
    assert_eq!(action.label, "Open");
    assert_eq!(action.url, "https://example.org/download");
}

#[tokio::test]
async fn equal_version_is_up_to_date() {
    let url = serve_once("200 OK", "@version 2.0").await;
    let checker = UpdateChecker::new(url, "2.0.0").unwrap();
    assert!(matches!(checker.check().await, UpdateOutcome::UpToDate { .. }));
}

#[tokio::test]
async fn manifest_without_version_is_a_parse_failure() {
    let url = serve_once("200 OK", "<html>moved</html>").await;
    let checker = UpdateChecker::new(url, "1.0.0").unwrap();
    let notifier = Recorder::default();

    let outcome = checker.check_and_notify(&notifier).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(TubePaceError::ManifestParseFailure(_))));
    assert!(notifier.0.lock()[0].action.is_none());
}

#[tokio::test]
async fn http_error_is_a_network_failure() {
    let url = serve_once("404 Not Found", "missing").await;
    let checker = UpdateChecker::new(url, "1.0.0").unwrap();
    assert!(matches!(
        checker.check().await,
        UpdateOutcome::Failed(TubePaceError::NetworkFailure(_))
    ));
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let checker = UpdateChecker::new(format!("http://{addr}/manifest"), "1.0.0").unwrap();
    assert!(matches!(
        checker.check().await,
        UpdateOutcome::Failed(TubePaceError::NetworkFailure(_))
    ));
}

#[test]
#[serial]
fn manifest_url_comes_from_the_environment() {
    std::env::set_var("TUBEPACE_MANIFEST_URL", "http://localhost:1/custom.txt");
    let checker = UpdateChecker::from_env("1.0.0").unwrap();
    assert_eq!(checker.manifest_url(), "http://localhost:1/custom.txt");

    std::env::set_var("TUBEPACE_MANIFEST_URL", "  ");
    let checker = UpdateChecker::from_env("1.0.0").unwrap();
    assert_eq!(checker.manifest_url(), tubepace_cli::update_check::DEFAULT_MANIFEST_URL);
    std::env::remove_var("TUBEPACE_MANIFEST_URL");
}
