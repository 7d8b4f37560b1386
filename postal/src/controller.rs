use std::{
    future::Future,
    io::{BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
};

use postal_common::{
    config::{ConfigError, DistributionSettings, SmtpSettings},
    internal, logging,
};
use postal_delivery::{
    ContentTypeDetection, DrainReport, LaneResources, LaneSupervisor, MessageRenderer,
    SmtpSender,
};
use postal_outbox::StoreConfig;
use serde::Deserialize;
use tokio::sync::oneshot;

/// The whole relay, as described by its settings file.
#[derive(Debug, Deserialize)]
pub struct Postal {
    pub storage: StoreConfig,
    pub smtp: SmtpSettings,
    pub distribution: DistributionSettings,

    /// How bodies are classified as HTML or plain text
    ///
    /// Default: `Legacy`
    #[serde(default)]
    pub content_type: ContentTypeDetection,

    /// Also write log events to this file (appending)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Completes when an operator types `exit` on `input`. End of input is not
/// an exit request: the returned future then never completes.
///
/// `input` is read on its own OS thread, outside the runtime, so a read that
/// never returns does not hold up runtime shutdown.
pub async fn exit_command<R: BufRead + Send + 'static>(input: R) {
    println!("Started. Type \"exit\" to quit the program");

    let (exit, requested) = oneshot::channel();
    let reader = std::thread::Builder::new()
        .name("postal-stdin".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) if line.trim() == "exit" => {
                        let _ = exit.send(());
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Unable to read commands from stdin: {e}");
                        return;
                    }
                }
            }
        });

    match reader {
        Ok(_) => {
            if requested.await.is_ok() {
                return;
            }
        }
        Err(e) => tracing::warn!("Unable to start the stdin reader: {e}"),
    }

    std::future::pending::<()>().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Unable to listen for CTRL+C: {e}");
        std::future::pending::<()>().await;
    }
}

async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(e) => {
            tracing::warn!("Unable to listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// Completes on the first of CTRL+C, SIGTERM or `exit` on stdin.
pub async fn shutdown_requested() {
    tokio::select! {
        () = ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        () = terminate() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
        () = exit_command(BufReader::new(std::io::stdin())) => {
            internal!(level = INFO, "Exit requested, shutting down");
        }
    }
}

impl Postal {
    /// # Errors
    /// The first setting that is missing or unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.smtp.validate()?;
        self.distribution.validate()?;

        if self.storage.connection().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::MissingValue("storage.connection"));
        }

        Ok(())
    }

    /// Run the relay until an operator asks it to stop
    ///
    /// # Errors
    ///
    /// This function will return an error if logging or storage cannot be
    /// set up, the settings are invalid, or a lane stops on a fatal error.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(self.log_file.as_deref())?;

        self.serve(shutdown_requested()).await.map(|_| ())
    }

    /// Runs both lanes until `shutdown` completes, then drains them.
    ///
    /// A lane failing on its own also ends the run, after the other lane has
    /// been drained.
    ///
    /// # Errors
    ///
    /// Invalid settings, an unusable outbox, or a fatal lane error.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<DrainReport> {
        self.validate()?;

        internal!(
            level = INFO,
            "Opening {} outbox, relaying through {}",
            self.storage.driver(),
            self.smtp.address()
        );

        let store = self
            .storage
            .into_store(self.distribution.predicate())
            .await?;
        let resources = LaneResources {
            store,
            transport: Arc::new(SmtpSender::from_settings(&self.smtp)),
            renderer: MessageRenderer::new(self.content_type),
        };

        let mut supervisor = LaneSupervisor::new(&self.distribution, &resources);
        let handle = supervisor.shutdown_handle();
        supervisor.start();

        internal!(level = INFO, "Controller running");

        let drain = supervisor.await_drain();
        tokio::pin!(drain);

        let result = tokio::select! {
            result = &mut drain => result,
            () = shutdown => {
                handle.request();
                drain.await
            }
        };

        match result {
            Ok(report) => {
                internal!(
                    level = INFO,
                    "Stopped. Local lane delivered {} of {}, outer lane delivered {} of {}",
                    report.local.delivered,
                    report.local.attempted,
                    report.outer.delivered,
                    report.outer.attempted
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Stopping postal after a fatal error");
                Err(e.into())
            }
        }
    }
}
