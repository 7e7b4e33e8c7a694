//! Periodic sweep task.
//!
//! Runs the engine's sweep on an interval and serves on-demand triggers
//! (check-in, confirmation, cancel) through a command channel. On-demand
//! work and the periodic sweep only meet at the store's compare-and-set;
//! there is no lock shared across bundles.

use crate::engine::{Delivery, ReleaseEngine};
use crate::error::{ReleaseError, ReleaseResult};
use crate::store::BundleStore;
use bequest_types::{BundleId, TrusteeId};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands the sweeper accepts between ticks.
#[derive(Debug)]
pub enum SweeperCommand {
    /// Owner heartbeat check-in.
    CheckIn { bundle_id: BundleId },
    /// Trustee confirmation.
    Confirm {
        bundle_id: BundleId,
        trustee_id: TrusteeId,
    },
    /// Owner cancellation.
    Cancel { bundle_id: BundleId },
    /// Evaluate one bundle now instead of waiting for the next tick.
    Evaluate { bundle_id: BundleId },
    /// Stop the sweeper.
    Shutdown,
}

/// Configuration for the sweep task.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between full sweeps.
    pub sweep_interval: Duration,
    /// Command channel depth.
    pub command_buffer: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
            command_buffer: 64,
        }
    }
}

/// Handle for sending commands to a running sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    command_tx: mpsc::Sender<SweeperCommand>,
}

impl SweeperHandle {
    pub async fn send(&self, cmd: SweeperCommand) -> ReleaseResult<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| ReleaseError::ChannelClosed)
    }

    pub async fn check_in(&self, bundle_id: BundleId) -> ReleaseResult<()> {
        self.send(SweeperCommand::CheckIn { bundle_id }).await
    }

    pub async fn confirm(&self, bundle_id: BundleId, trustee_id: TrusteeId) -> ReleaseResult<()> {
        self.send(SweeperCommand::Confirm {
            bundle_id,
            trustee_id,
        })
        .await
    }

    pub async fn cancel(&self, bundle_id: BundleId) -> ReleaseResult<()> {
        self.send(SweeperCommand::Cancel { bundle_id }).await
    }

    pub async fn evaluate_now(&self, bundle_id: BundleId) -> ReleaseResult<()> {
        self.send(SweeperCommand::Evaluate { bundle_id }).await
    }

    pub async fn shutdown(&self) -> ReleaseResult<()> {
        self.send(SweeperCommand::Shutdown).await
    }
}

/// Spawns the sweep task. Commands and ticks share one loop, so a single
/// sweeper never evaluates the same bundle from two threads. Running
/// several sweepers against one store is also safe, by way of the CAS.
pub fn spawn_sweeper<S, D>(
    engine: Arc<ReleaseEngine<S, D>>,
    config: SweeperConfig,
) -> (SweeperHandle, JoinHandle<()>)
where
    S: BundleStore + 'static,
    D: Delivery + 'static,
{
    let (command_tx, mut command_rx) = mpsc::channel(config.command_buffer);
    let handle = SweeperHandle { command_tx };

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.sweep(Utc::now()) {
                        Ok(report) => debug!(
                            evaluated = report.evaluated,
                            transitioned = report.transitioned,
                            "periodic sweep"
                        ),
                        Err(e) => warn!(error = %e, "periodic sweep failed"),
                    }
                }
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !handle_command(&engine, cmd) {
                        break;
                    }
                }
            }
        }
        info!("release sweeper stopped");
    });

    (handle, task)
}

/// Returns false on shutdown.
fn handle_command<S: BundleStore, D: Delivery>(
    engine: &ReleaseEngine<S, D>,
    cmd: SweeperCommand,
) -> bool {
    let now = Utc::now();
    match cmd {
        SweeperCommand::CheckIn { bundle_id } => {
            if let Err(e) = engine.check_in(bundle_id, now) {
                warn!(bundle = %bundle_id, error = %e, "check-in failed");
            }
        }
        SweeperCommand::Confirm {
            bundle_id,
            trustee_id,
        } => {
            if let Err(e) = engine.confirm(bundle_id, trustee_id, now) {
                warn!(bundle = %bundle_id, trustee = %trustee_id, error = %e, "confirmation failed");
            }
        }
        SweeperCommand::Cancel { bundle_id } => {
            if let Err(e) = engine.cancel(bundle_id) {
                warn!(bundle = %bundle_id, error = %e, "cancel failed");
            }
        }
        SweeperCommand::Evaluate { bundle_id } => {
            if let Err(e) = engine.evaluate_bundle(bundle_id, now) {
                warn!(bundle = %bundle_id, error = %e, "on-demand evaluation failed");
            }
        }
        SweeperCommand::Shutdown => return false,
    }
    true
}
