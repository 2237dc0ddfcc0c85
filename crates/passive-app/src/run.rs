//! Run controller: drives one capture run from start to persisted log.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use passive_core::{CompletionNotice, RunSettings};
use passive_proxy::{CollectorClient, ProxyEngine, ResultSink};
use tracing::{info, warn};

use crate::error::RunError;

/// Lifecycle of a [`RunController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Runs the proxy until the deadline or a cancellation, then persists
/// everything the run captured.
pub struct RunController {
    settings: RunSettings,
    deadline: Duration,
    state: RunState,
}

impl RunController {
    /// Creates a controller whose deadline is the configured max run time.
    pub fn new(settings: RunSettings) -> Self {
        let deadline = settings.max_run_duration();
        Self {
            settings,
            deadline,
            state: RunState::Idle,
        }
    }

    /// Overrides the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Runs once and returns why the run ended.
    ///
    /// [`RunError::Timeout`] and [`RunError::Cancelled`] are the normal
    /// outcomes. Start failures are returned before anything is persisted.
    pub async fn run<F>(&mut self, cancel: F) -> RunError
    where
        F: Future<Output = ()>,
    {
        if self.state != RunState::Idle {
            return RunError::Config("run controller already used".into());
        }

        let sink = match ResultSink::for_run(
            self.settings.id.clone(),
            self.settings.remote_output_addr.as_deref(),
        ) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                self.state = RunState::Stopped;
                return e.into();
            }
        };

        let engine = ProxyEngine::new(self.settings.clone(), sink.clone());
        match engine.start().await {
            Ok(addr) => info!("Passive scan {:?} listening on {}", self.settings.id, addr),
            Err(e) => {
                self.state = RunState::Stopped;
                return e.into();
            }
        }
        self.state = RunState::Running;

        let outcome = tokio::select! {
            _ = tokio::time::sleep(self.deadline) => {
                if let Err(e) = self.notify_timeout().await {
                    warn!("Failed to send completion notice: {}", e);
                }
                RunError::Timeout
            }
            _ = cancel => RunError::Cancelled,
        };
        info!("Run ending: {}", outcome);

        // In-flight exchanges finish before the sink is drained.
        engine.close().await;

        let entries = sink.drain_all();
        match persist_run_log(&self.settings.log_dir, &self.settings.id, &entries) {
            Ok(path) => info!("Saved {} results to {:?}", entries.len(), path),
            Err(e) => warn!("Failed to save run log: {}", e),
        }

        self.state = RunState::Stopped;
        outcome
    }

    async fn notify_timeout(&self) -> Result<(), RunError> {
        let Some(addr) = self.settings.message_addr.as_deref() else {
            return Ok(());
        };
        let body = CompletionNotice::timeout(self.settings.id.clone()).to_json()?;
        CollectorClient::new(addr)?.post_json(body).await?;
        Ok(())
    }
}

/// Random 32-hex-character name for runs without an id.
pub fn random_run_name() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Writes drained entries to `<dir>/<id>`, each prefixed with `\r\n`.
///
/// An empty `id` is replaced by [`random_run_name`]. Returns the file path.
pub fn persist_run_log(dir: &Path, id: &str, entries: &[String]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let name = if id.trim().is_empty() {
        random_run_name()
    } else {
        id.trim().to_string()
    };
    let content: String = entries.iter().map(|entry| format!("\r\n{}", entry)).collect();

    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use passive_proxy::testing::spawn_responder;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn local_settings(id: &str, base: &Path) -> RunSettings {
        RunSettings::new(id, base)
            .with_listen("127.0.0.1", free_port().await)
            .with_log_dir(base.join("log"))
    }

    #[test]
    fn run_log_entries_are_prefixed() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("log").join("passivescanner");

        let path = persist_run_log(&dir, "task-9", &["a".to_string(), "b".to_string()]).unwrap();

        assert_eq!(path, dir.join("task-9"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "\r\na\r\nb");
    }

    #[test]
    fn empty_id_gets_random_name() {
        let temp = TempDir::new().unwrap();

        let path = persist_run_log(temp.path(), "", &[]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(name.len(), 32);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_run_name(), random_run_name());
    }

    #[tokio::test]
    async fn cancellation_persists_captured_requests() {
        let temp = TempDir::new().unwrap();
        let settings = local_settings("cancel-run", temp.path()).await;
        let proxy = format!("http://{}", settings.bind_addr().unwrap());
        let (upstream, _rx) = spawn_responder("ok").await;

        let mut controller = RunController::new(settings);
        let outcome = controller
            .run(async move {
                let client = reqwest::Client::builder()
                    .proxy(reqwest::Proxy::http(proxy).unwrap())
                    .build()
                    .unwrap();
                for _ in 0..2 {
                    let res = client
                        .get(format!("http://{}/page?id=1", upstream))
                        .send()
                        .await
                        .unwrap();
                    assert_eq!(res.status(), 200);
                }
            })
            .await;

        assert!(matches!(outcome, RunError::Cancelled));
        assert_eq!(controller.state(), RunState::Stopped);

        let log = std::fs::read_to_string(temp.path().join("log").join("cancel-run")).unwrap();
        assert_eq!(log.matches("\r\n").count(), 1);
        assert!(log.contains("/page?id=1"));
        assert!(log.contains(r#""tag":1"#));
    }

    #[tokio::test]
    async fn timeout_sends_completion_notice() {
        let temp = TempDir::new().unwrap();
        let (messages, mut rx) = spawn_responder("ok").await;
        let settings = local_settings("timeout-run", temp.path())
            .await
            .with_message_addr(format!("http://{}/notice", messages));

        let mut controller =
            RunController::new(settings).with_deadline(Duration::from_millis(200));
        let outcome = controller.run(std::future::pending::<()>()).await;

        assert!(matches!(outcome, RunError::Timeout));
        assert_eq!(outcome.to_string(), "running timeout");

        let received = rx.recv().await.unwrap();
        let notice: serde_json::Value = serde_json::from_str(&received.body).unwrap();
        assert_eq!(notice["id"], "timeout-run");
        assert_eq!(notice["code"], 0);
        assert_eq!(notice["message"], "running timeout");

        assert!(temp.path().join("log").join("timeout-run").exists());
    }

    #[tokio::test]
    async fn unreachable_notice_address_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let closed = free_port().await;
        let settings = local_settings("quiet-run", temp.path())
            .await
            .with_message_addr(format!("http://127.0.0.1:{}/", closed));

        let mut controller =
            RunController::new(settings).with_deadline(Duration::from_millis(100));

        assert!(matches!(controller.run(std::future::pending::<()>()).await, RunError::Timeout));
        assert!(temp.path().join("log").join("quiet-run").exists());
    }

    #[tokio::test]
    async fn cancellation_sends_no_notice() {
        let temp = TempDir::new().unwrap();
        let (messages, mut rx) = spawn_responder("ok").await;
        let settings = local_settings("cancelled", temp.path())
            .await
            .with_message_addr(format!("http://{}/notice", messages));

        let mut controller = RunController::new(settings);
        assert!(matches!(controller.run(async {}).await, RunError::Cancelled));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_failure_is_returned() {
        let temp = TempDir::new().unwrap();
        let settings = local_settings("no-ca", temp.path())
            .await
            .with_contain_https(true)
            .with_ca_paths(Some(temp.path().join("missing.pem")), None);

        let mut controller = RunController::new(settings);
        let outcome = controller.run(async {}).await;

        assert!(matches!(outcome, RunError::Proxy(_)));
        assert!(!outcome.is_termination());
        assert_eq!(controller.state(), RunState::Stopped);
        assert!(!temp.path().join("log").join("no-ca").exists());

        let again = controller.run(async {}).await;
        assert!(matches!(again, RunError::Config(_)));
    }
}
