//! A single dispatch lane.
//!
//! A lane repeatedly polls the outbox for its share of undelivered messages,
//! hands each one to the transport and records the outcome, then sleeps for
//! its interval. The shutdown signal is only looked at between cycles; the
//! sleep itself is not interrupted.

use std::{sync::Arc, time::Duration};

use postal_common::{
    DeliveryStatus, Lane, LaneState, QueuedMessage, Signal, config::LaneSchedule, internal,
    tracing,
};
use postal_outbox::OutboxStore;
use tokio::sync::{
    broadcast::{self, error::TryRecvError},
    watch,
};

use crate::{error::LaneError, render::MessageRenderer, transport::Transport};

/// Counters for one lane, accumulated over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    /// Completed polls of the outbox
    pub cycles: u64,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Failures the relay refused outright, as opposed to a broken session.
    /// Counted in `failed` as well.
    pub rejected: u64,
}

/// What every lane needs to move a message from the outbox to the relay.
#[derive(Debug, Clone)]
pub struct LaneResources {
    pub store: Arc<dyn OutboxStore>,
    pub transport: Arc<dyn Transport>,
    pub renderer: MessageRenderer,
}

#[derive(Debug)]
pub struct DispatchLane {
    lane: Lane,
    interval: Duration,
    batch_size: usize,
    resources: LaneResources,
    shutdown: broadcast::Receiver<Signal>,
    state: watch::Sender<LaneState>,
    stats: LaneStats,
}

impl DispatchLane {
    pub fn new(
        lane: Lane,
        schedule: LaneSchedule,
        resources: LaneResources,
        shutdown: broadcast::Receiver<Signal>,
    ) -> Self {
        let (state, _) = watch::channel(LaneState::default());

        Self {
            lane,
            interval: schedule.interval(),
            batch_size: schedule.batch_size,
            resources,
            shutdown,
            state,
            stats: LaneStats::default(),
        }
    }

    pub const fn lane(&self) -> Lane {
        self.lane
    }

    /// Observes the lane's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LaneState> {
        self.state.subscribe()
    }

    /// Runs the lane until shutdown is requested or storage fails.
    ///
    /// The lane is `Stopped` when this returns, whatever the outcome.
    ///
    /// # Errors
    /// If the outbox cannot be read or a delivery cannot be recorded
    pub async fn run(mut self) -> Result<LaneStats, LaneError> {
        internal!(
            level = INFO,
            "{} lane started (interval {:?}, batch size {})",
            self.lane,
            self.interval,
            self.batch_size
        );

        let result = self.serve().await;
        self.state.send_replace(LaneState::Stopped);

        match &result {
            Ok(()) => internal!(
                level = INFO,
                "{} lane stopped after {} cycles",
                self.lane,
                self.stats.cycles
            ),
            Err(e) => tracing::error!(lane = %self.lane, error = %e, "Lane stopped on a fatal error"),
        }

        result.map(|()| self.stats)
    }

    async fn serve(&mut self) -> Result<(), LaneError> {
        loop {
            if self.shutdown_requested() {
                return Ok(());
            }

            self.state.send_replace(LaneState::Polling);
            let batch = self
                .resources
                .store
                .fetch_batch(self.lane, self.batch_size)
                .await?;
            self.stats.cycles += 1;

            if !batch.is_empty() {
                self.state.send_replace(LaneState::Dispatching);
                tracing::debug!(lane = %self.lane, count = batch.len(), "Dispatching batch");

                for message in &batch {
                    self.dispatch(message).await?;
                }
            }

            self.state.send_replace(LaneState::Sleeping);
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Non-blocking check of the shutdown signal.
    fn shutdown_requested(&mut self) -> bool {
        match self.shutdown.try_recv() {
            Ok(Signal::Shutdown) => {
                internal!("{} lane received shutdown signal", self.lane);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Closed) => {
                tracing::warn!(lane = %self.lane, "Shutdown channel closed, stopping lane");
                true
            }
        }
    }

    /// Attempts one message and records the outcome. Only a failure to record
    /// is returned as an error.
    async fn dispatch(&mut self, message: &QueuedMessage) -> Result<(), LaneError> {
        let email = self.resources.renderer.render(message);
        let outcome = self
            .resources
            .transport
            .send(&email, &message.sender, &message.recipients, &message.cc)
            .await;
        let status = outcome.as_ref().map_or_else(
            |e| DeliveryStatus::Failed(e.to_string()),
            |_| DeliveryStatus::Delivered,
        );

        self.resources
            .store
            .record_delivery(message.id, &status)
            .await?;

        self.stats.attempted += 1;
        match outcome {
            Ok(()) => {
                self.stats.delivered += 1;
                tracing::info!(
                    lane = %self.lane,
                    message_id = %message.id,
                    recipients = %message.recipients_column(),
                    subject = %message.subject,
                    outcome = %status,
                    "Message delivered"
                );
            }
            Err(e) if e.is_rejection() => {
                self.stats.failed += 1;
                self.stats.rejected += 1;
                tracing::warn!(
                    lane = %self.lane,
                    message_id = %message.id,
                    recipients = %message.recipients_column(),
                    subject = %message.subject,
                    outcome = %status,
                    "Message rejected by relay"
                );
            }
            Err(_) => {
                self.stats.failed += 1;
                tracing::error!(
                    lane = %self.lane,
                    message_id = %message.id,
                    recipients = %message.recipients_column(),
                    subject = %message.subject,
                    outcome = %status,
                    "Message delivery failed"
                );
            }
        }

        Ok(())
    }
}
