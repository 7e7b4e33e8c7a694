//! Release engine: applies the pure evaluator through the store's
//! compare-and-set and owns the arm/check-in/pause/confirm/cancel
//! operations.
//!
//! Every transition goes through `update_status` (or a status-guarded
//! save), so concurrent sweeps and on-demand triggers for the same bundle
//! cannot double-fire: the CAS loser sees a no-op. Trustee notification is
//! gated by a per-(bundle, trustee) delivery claim, independent of
//! transition count.

use crate::bundle::{Bundle, ReleaseMode, ReleaseStatus};
use crate::error::{ReleaseError, ReleaseResult};
use crate::evaluator::evaluate;
use crate::policy::TierPolicy;
use crate::store::BundleStore;
use bequest_types::{BundleId, TrusteeId};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// External delivery seam (email/push). Called at most once per
/// `(bundle, trustee)`, only after a bundle reaches `Released`.
pub trait Delivery: Send + Sync {
    fn notify(
        &self,
        bundle_id: BundleId,
        trustee_email: &str,
        release_token: &str,
    ) -> ReleaseResult<()>;
}

/// Delivery that does nothing. For deployments that poll instead of push,
/// and for tests that only care about status transitions.
pub struct NoopDelivery;

impl Delivery for NoopDelivery {
    fn notify(&self, _: BundleId, _: &str, _: &str) -> ReleaseResult<()> {
        Ok(())
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub transitioned: usize,
    pub released: usize,
    pub errors: usize,
}

/// Glues evaluator, store and delivery together.
pub struct ReleaseEngine<S, D> {
    store: S,
    delivery: D,
}

impl<S: BundleStore, D: Delivery> ReleaseEngine<S, D> {
    pub fn new(store: S, delivery: D) -> Self {
        Self { store, delivery }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Arms a draft bundle: consults tier policy, validates the
    /// confirmation condition, starts heartbeat bookkeeping, and moves to
    /// the mode's waiting state.
    pub fn arm(
        &self,
        id: BundleId,
        policy: &dyn TierPolicy,
        now: DateTime<Utc>,
    ) -> ReleaseResult<()> {
        let mut bundle = self.store.get(id)?;
        if bundle.status != ReleaseStatus::Draft {
            return Err(ReleaseError::StateConflict {
                expected: ReleaseStatus::Draft,
                actual: bundle.status,
            });
        }
        validate_condition(&bundle)?;

        if let Some(max) = policy.max_armed_bundles(bundle.owner) {
            let armed = self.store.armed_bundle_count(bundle.owner)?;
            if armed >= max as usize {
                return Err(ReleaseError::PolicyDenied(format!(
                    "plan allows {max} armed bundles"
                )));
            }
        }
        if let Some(max) = policy.max_trustees_per_bundle(bundle.owner) {
            if bundle.trustees.len() > max as usize {
                return Err(ReleaseError::PolicyDenied(format!(
                    "plan allows {max} trustees per bundle"
                )));
            }
        }

        if let ReleaseMode::Heartbeat { cadence_days } = bundle.mode {
            bundle.heartbeat = Some(crate::bundle::HeartbeatState::start(cadence_days, now));
        }
        bundle.status = bundle.waiting_status();
        bundle.updated_at = now;

        if !self.store.save_if_status(&bundle, ReleaseStatus::Draft)? {
            return Err(self.conflict(id, ReleaseStatus::Draft));
        }
        info!(bundle = %id, status = %bundle.status, "bundle armed");
        Ok(())
    }

    /// Owner heartbeat check-in: resets the cadence window to `now`.
    pub fn check_in(&self, id: BundleId, now: DateTime<Utc>) -> ReleaseResult<()> {
        let mut bundle = self.store.get(id)?;
        if bundle.status != ReleaseStatus::WaitingHeartbeat {
            return Err(ReleaseError::StateConflict {
                expected: ReleaseStatus::WaitingHeartbeat,
                actual: bundle.status,
            });
        }
        let heartbeat = bundle
            .heartbeat
            .as_mut()
            .ok_or_else(|| ReleaseError::Storage("heartbeat bundle without state".into()))?;
        heartbeat.check_in(now);
        bundle.updated_at = now;

        if !self
            .store
            .save_if_status(&bundle, ReleaseStatus::WaitingHeartbeat)?
        {
            return Err(self.conflict(id, ReleaseStatus::WaitingHeartbeat));
        }
        debug!(bundle = %id, "heartbeat check-in");
        Ok(())
    }

    /// Suspends heartbeat evaluation. No deadline accrues while paused.
    pub fn pause(&self, id: BundleId, now: DateTime<Utc>) -> ReleaseResult<()> {
        let mut bundle = self.store.get(id)?;
        if bundle.status != ReleaseStatus::WaitingHeartbeat {
            return Err(ReleaseError::StateConflict {
                expected: ReleaseStatus::WaitingHeartbeat,
                actual: bundle.status,
            });
        }
        let heartbeat = bundle
            .heartbeat
            .as_mut()
            .ok_or_else(|| ReleaseError::Storage("heartbeat bundle without state".into()))?;
        heartbeat.pause(now);
        bundle.status = ReleaseStatus::Paused;
        bundle.updated_at = now;

        if !self
            .store
            .save_if_status(&bundle, ReleaseStatus::WaitingHeartbeat)?
        {
            return Err(self.conflict(id, ReleaseStatus::WaitingHeartbeat));
        }
        info!(bundle = %id, "heartbeat paused");
        Ok(())
    }

    /// Resumes a paused heartbeat. The cadence window restarts at `now`;
    /// time spent paused never counts against the owner.
    pub fn resume(&self, id: BundleId, now: DateTime<Utc>) -> ReleaseResult<()> {
        let mut bundle = self.store.get(id)?;
        if bundle.status != ReleaseStatus::Paused {
            return Err(ReleaseError::StateConflict {
                expected: ReleaseStatus::Paused,
                actual: bundle.status,
            });
        }
        let heartbeat = bundle
            .heartbeat
            .as_mut()
            .ok_or_else(|| ReleaseError::Storage("heartbeat bundle without state".into()))?;
        heartbeat.resume(now);
        bundle.status = ReleaseStatus::WaitingHeartbeat;
        bundle.updated_at = now;

        if !self.store.save_if_status(&bundle, ReleaseStatus::Paused)? {
            return Err(self.conflict(id, ReleaseStatus::Paused));
        }
        info!(bundle = %id, "heartbeat resumed");
        Ok(())
    }

    /// Records a trustee confirmation and re-evaluates immediately.
    ///
    /// Idempotent per trustee; a repeat confirmation never double-counts.
    /// Confirmations against terminal bundles are silent no-ops.
    pub fn confirm(
        &self,
        id: BundleId,
        trustee: TrusteeId,
        now: DateTime<Utc>,
    ) -> ReleaseResult<Option<ReleaseStatus>> {
        let bundle = self.store.get(id)?;
        if bundle.status.is_terminal() {
            return Ok(None);
        }
        if !bundle.has_trustee(trustee) {
            return Err(ReleaseError::UnknownTrustee);
        }
        self.store.record_confirmation(id, trustee)?;
        debug!(bundle = %id, trustee = %trustee, "trustee confirmation recorded");
        self.evaluate_bundle(id, now)
    }

    /// Owner cancellation. Effective immediately for any non-released
    /// bundle; idempotent if already cancelled. The CAS guarantees an
    /// in-flight evaluator transition cannot resurrect the bundle.
    pub fn cancel(&self, id: BundleId) -> ReleaseResult<()> {
        // Two attempts: one racing transition at most can interleave, and
        // Cancelled/Released are terminal.
        for _ in 0..2 {
            let bundle = self.store.get(id)?;
            match bundle.status {
                ReleaseStatus::Cancelled => return Ok(()),
                ReleaseStatus::Released => return Err(ReleaseError::AlreadyReleased),
                status => {
                    if self
                        .store
                        .update_status(id, status, ReleaseStatus::Cancelled)?
                    {
                        info!(bundle = %id, "bundle cancelled");
                        return Ok(());
                    }
                }
            }
        }
        Err(self.conflict(id, ReleaseStatus::Cancelled))
    }

    /// Evaluates one bundle and applies the transition, if any.
    ///
    /// Safe to call concurrently and repeatedly: losing the status CAS
    /// means another evaluator owns the transition, which is a no-op here,
    /// never an error and never a second delivery.
    pub fn evaluate_bundle(
        &self,
        id: BundleId,
        now: DateTime<Utc>,
    ) -> ReleaseResult<Option<ReleaseStatus>> {
        let bundle = self.store.get(id)?;
        let confirmed = self.store.confirmed_count(id)?;

        let Some(next) = evaluate(&bundle, confirmed, now) else {
            return Ok(None);
        };

        if !self.store.update_status(id, bundle.status, next)? {
            debug!(bundle = %id, "lost transition race, skipping");
            return Ok(None);
        }
        info!(bundle = %id, from = %bundle.status, to = %next, "bundle transitioned");

        if next == ReleaseStatus::Released {
            self.deliver(&bundle);
        }
        Ok(Some(next))
    }

    /// Evaluates every armed bundle. Per-bundle failures are logged and
    /// counted, leaving the bundle in its prior state for the next sweep;
    /// a bundle is never marked released speculatively.
    pub fn sweep(&self, now: DateTime<Utc>) -> ReleaseResult<SweepReport> {
        let mut report = SweepReport::default();
        for id in self.store.sweep_candidates()? {
            report.evaluated += 1;
            match self.evaluate_bundle(id, now) {
                Ok(Some(status)) => {
                    report.transitioned += 1;
                    if status == ReleaseStatus::Released {
                        report.released += 1;
                    }
                }
                Ok(None) => {}
                // Deleted between candidate listing and evaluation.
                Err(ReleaseError::NotFound(_)) => {}
                Err(e) => {
                    warn!(bundle = %id, error = %e, "sweep evaluation failed");
                    report.errors += 1;
                }
            }
        }
        debug!(
            evaluated = report.evaluated,
            transitioned = report.transitioned,
            released = report.released,
            "sweep complete"
        );
        Ok(report)
    }

    /// Resolves a release link. Only `Released` bundles resolve; anything
    /// else (wrong token, unknown token, not-yet-released bundle) is the
    /// same neutral [`ReleaseError::NotAvailable`].
    pub fn resolve_release(&self, encoded_token: &str) -> ReleaseResult<Bundle> {
        match self.store.find_by_release_token(encoded_token)? {
            Some(bundle) if bundle.status == ReleaseStatus::Released => Ok(bundle),
            _ => Err(ReleaseError::NotAvailable),
        }
    }

    /// Notifies every trustee that has not been notified yet. The claim
    /// flag, not the transition, is what enforces at-most-once.
    fn deliver(&self, bundle: &Bundle) {
        for trustee in &bundle.trustees {
            match self.store.claim_delivery(bundle.id, trustee.id) {
                Ok(true) => {
                    if let Err(e) =
                        self.delivery
                            .notify(bundle.id, &trustee.email, &bundle.release_token)
                    {
                        // At-most-once: the claim is spent. Log and move on.
                        warn!(bundle = %bundle.id, trustee = %trustee.id, error = %e, "delivery failed");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(bundle = %bundle.id, trustee = %trustee.id, error = %e, "delivery claim failed");
                }
            }
        }
    }

    fn conflict(&self, id: BundleId, expected: ReleaseStatus) -> ReleaseError {
        match self.store.get(id) {
            Ok(bundle) => ReleaseError::StateConflict {
                expected,
                actual: bundle.status,
            },
            Err(e) => e,
        }
    }
}

fn validate_condition(bundle: &Bundle) -> ReleaseResult<()> {
    match bundle.condition.required(bundle.trustees.len()) {
        None => Ok(()),
        Some(0) => Err(ReleaseError::InvalidCondition(
            "confirmation gate requires at least one trustee".into(),
        )),
        Some(required) if required > bundle.trustees.len() => Err(ReleaseError::InvalidCondition(
            format!(
                "gate requires {required} confirmations but bundle has {} trustees",
                bundle.trustees.len()
            ),
        )),
        Some(_) => Ok(()),
    }
}
