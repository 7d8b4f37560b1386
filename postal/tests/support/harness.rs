//! End-to-end test harness for postal
//!
//! Starts a complete relay over a temporary SQLite outbox, delivering to a
//! mock SMTP server.

use std::time::{Duration, Instant};

use postal::Postal;
use postal_common::{DeliveryRecord, DomainPredicate, QueuedMessage};
use postal_delivery::DrainReport;
use postal_outbox::SqliteOutbox;
use tempfile::TempDir;
use tokio::{sync::oneshot, task::JoinHandle};

use super::mock_server::{MockSmtpServer, MockSmtpServerBuilder, SmtpCommand};

pub const LOCAL_DOMAIN: &str = "local.test";

pub struct E2ETestHarness {
    _dir: TempDir,
    outbox: SqliteOutbox,
    mock_server: MockSmtpServer,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<DrainReport>>>,
}

impl E2ETestHarness {
    #[must_use]
    pub fn builder() -> E2ETestHarnessBuilder {
        E2ETestHarnessBuilder {
            mock: MockSmtpServer::builder(),
            messages: Vec::new(),
            content_type: "Legacy",
        }
    }

    pub fn outbox(&self) -> &SqliteOutbox {
        &self.outbox
    }

    pub async fn mock_commands(&self) -> Vec<SmtpCommand> {
        self.mock_server.commands().await
    }

    pub async fn delivered_messages(&self) -> Vec<String> {
        self.mock_server.messages().await
    }

    /// Polls the delivery-record table until it holds `expected` rows.
    pub async fn wait_for_records(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<DeliveryRecord>, String> {
        let start = Instant::now();
        loop {
            let records = self.outbox.records().await.map_err(|e| e.to_string())?;
            if records.len() >= expected {
                return Ok(records);
            }
            if start.elapsed() > timeout {
                return Err(format!(
                    "Timeout waiting for {expected} delivery records, have {}",
                    records.len()
                ));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Requests shutdown and waits for both lanes to drain.
    pub async fn shutdown(mut self) -> anyhow::Result<DrainReport> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow::anyhow!("Harness already shut down"))?;
        let result = handle.await?;
        self.mock_server.shutdown();
        result
    }
}

pub struct E2ETestHarnessBuilder {
    mock: MockSmtpServerBuilder,
    messages: Vec<QueuedMessage>,
    content_type: &'static str,
}

impl E2ETestHarnessBuilder {
    #[must_use]
    pub fn with_message(mut self, message: QueuedMessage) -> Self {
        self.messages.push(message);
        self
    }

    #[must_use]
    pub fn with_mock(mut self, configure: impl FnOnce(MockSmtpServerBuilder) -> MockSmtpServerBuilder) -> Self {
        self.mock = configure(self.mock);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    pub async fn build(self) -> anyhow::Result<E2ETestHarness> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("outbox.db");

        let outbox = SqliteOutbox::new(&path, DomainPredicate::new(LOCAL_DOMAIN));
        outbox.init().await?;
        for message in &self.messages {
            outbox.enqueue(message).await?;
        }

        let mock_server = self.mock.build().await?;
        let addr = mock_server.addr();

        let settings = format!(
            r#"Postal (
                storage: Sqlite(connection: "{}"),
                smtp: (host: "{}", port: {}, helo_name: "postal.test"),
                distribution: (
                    local_domain: "{LOCAL_DOMAIN}",
                    local: (interval_secs: 1, batch_size: 10),
                    outer: (interval_secs: 1, batch_size: 10),
                ),
                content_type: {},
            )"#,
            path.display(),
            addr.ip(),
            addr.port(),
            self.content_type,
        );
        let postal: Postal = ron::from_str(&settings)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(postal.serve(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(E2ETestHarness {
            _dir: dir,
            outbox,
            mock_server,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}
