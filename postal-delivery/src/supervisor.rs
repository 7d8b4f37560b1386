//! Runs the local and outer lanes side by side and brings them down together.
//!
//! Each lane reports how it ended over a result channel instead of being
//! awaited directly. A lane that hits a fatal storage error reports it and
//! returns; the supervisor then signals the other lane and waits for it, so
//! no lane ever waits on itself.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use postal_common::{
    Lane, LaneState, Signal, config::DistributionSettings, internal, tracing,
};
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    error::{LaneError, SupervisorError},
    lane::{DispatchLane, LaneResources, LaneStats},
};

/// Sends the shutdown signal to every lane, at most once.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: broadcast::Sender<Signal>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Requests shutdown. Returns `false` if it had already been requested.
    pub fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Err(e) = self.sender.send(Signal::Shutdown) {
            tracing::debug!("No lane received the shutdown signal: {e}");
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// How a lane task ended. `result` is `None` if the lane panicked.
#[derive(Debug)]
struct LaneExit {
    lane: Lane,
    result: Option<Result<LaneStats, LaneError>>,
}

/// Per-lane statistics of a clean drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub local: LaneStats,
    pub outer: LaneStats,
}

impl DrainReport {
    pub const fn get(&self, lane: Lane) -> LaneStats {
        match lane {
            Lane::Local => self.local,
            Lane::Outer => self.outer,
        }
    }
}

#[derive(Debug)]
pub struct LaneSupervisor {
    shutdown: ShutdownHandle,
    pending: Vec<DispatchLane>,
    states: BTreeMap<Lane, watch::Receiver<LaneState>>,
    exit_tx: Option<mpsc::UnboundedSender<LaneExit>>,
    exit_rx: mpsc::UnboundedReceiver<LaneExit>,
}

impl LaneSupervisor {
    /// Builds both lanes. Nothing runs until [`Self::start`].
    pub fn new(distribution: &DistributionSettings, resources: &LaneResources) -> Self {
        let (sender, _) = broadcast::channel(4);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        let pending: Vec<_> = Lane::ALL
            .iter()
            .map(|lane| {
                DispatchLane::new(
                    *lane,
                    distribution.schedule(*lane),
                    resources.clone(),
                    sender.subscribe(),
                )
            })
            .collect();

        let states = pending
            .iter()
            .map(|lane| (lane.lane(), lane.subscribe()))
            .collect();

        Self {
            shutdown: ShutdownHandle {
                sender,
                requested: Arc::new(AtomicBool::new(false)),
            },
            pending,
            states,
            exit_tx: Some(exit_tx),
            exit_rx,
        }
    }

    /// Spawns both lanes and returns immediately. Later calls do nothing.
    pub fn start(&mut self) {
        let Some(exit_tx) = self.exit_tx.take() else {
            return;
        };

        let count = self.pending.len();
        for dispatch in self.pending.drain(..) {
            let lane = dispatch.lane();
            let exits = exit_tx.clone();

            tokio::spawn(async move {
                let result = match tokio::spawn(dispatch.run()).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::error!(%lane, "Lane task failed: {e}");
                        None
                    }
                };

                if exits.send(LaneExit { lane, result }).is_err() {
                    tracing::warn!(%lane, "Supervisor went away before the lane reported");
                }
            });
        }

        internal!(level = INFO, "Started {count} dispatch lanes");
    }

    /// A handle that can request shutdown from anywhere, including while
    /// [`Self::await_drain`] is pending.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Delivers the shutdown signal to both lanes.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.request()
    }

    pub fn state(&self, lane: Lane) -> Option<LaneState> {
        self.states.get(&lane).map(|state| *state.borrow())
    }

    pub fn subscribe(&self, lane: Lane) -> Option<watch::Receiver<LaneState>> {
        self.states.get(&lane).cloned()
    }

    /// Waits until both lanes have stopped.
    ///
    /// When a lane stops on a fatal error, shutdown is requested for the
    /// other lane, it is drained, and the first error is returned.
    ///
    /// # Errors
    /// - [`SupervisorError::NotStarted`] before [`Self::start`]
    /// - [`SupervisorError::Lane`] if a lane stopped on a fatal error
    /// - [`SupervisorError::Lost`] if a lane task ended without reporting
    pub async fn await_drain(&mut self) -> Result<DrainReport, SupervisorError> {
        if self.exit_tx.is_some() {
            return Err(SupervisorError::NotStarted);
        }

        let mut stats = BTreeMap::new();
        let mut failure = None;

        while let Some(LaneExit { lane, result }) = self.exit_rx.recv().await {
            let error = match result {
                Some(Ok(lane_stats)) => {
                    stats.insert(lane, lane_stats);
                    continue;
                }
                Some(Err(source)) => SupervisorError::Lane { lane, source },
                None => SupervisorError::Lost(lane),
            };

            if self.request_shutdown() {
                internal!(level = WARN, "{lane} lane failed, stopping remaining lanes");
            }
            if failure.is_none() {
                failure = Some(error);
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }

        if let Some(lost) = Lane::ALL.into_iter().find(|lane| !stats.contains_key(lane)) {
            return Err(SupervisorError::Lost(lost));
        }

        internal!(level = INFO, "All dispatch lanes drained");

        Ok(DrainReport {
            local: stats.get(&Lane::Local).copied().unwrap_or_default(),
            outer: stats.get(&Lane::Outer).copied().unwrap_or_default(),
        })
    }
}
