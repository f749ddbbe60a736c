//! RecoveryScanner — resumes tracking of in-flight jobs after a restart.
//!
//! The scan reads the recovery index for every job still `InProgress` or
//! `NotYetStarted` and hands each one to a [`JobTracker`], the hook through
//! which executor supervision picks the job back up.
//!
//! Reconciliation covers a narrower crash window: a deprovision whose
//! `Succeeded` state was written but whose instance delete never ran. Such
//! jobs are replayed through the deprovision subscriber, which either
//! finishes the cleanup or demotes the job. Jobs the broker already demoted
//! are left alone for an operator.

use std::sync::Arc;
use std::time::Duration;

use broker_core::{JobMethod, RecoverStatus, State};
use broker_state::{Dao, MultiError, StateResult};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::message::JobMsg;
use crate::subscriber::{DeprovisionWorkSubscriber, MessageOutcome, WorkSubscriber};

/// Receives jobs that need their executor supervision re-established.
pub trait JobTracker: Send + Sync {
    fn reattach(&self, status: &RecoverStatus);
}

/// Tracker that only logs; used when no supervisor is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTracker;

impl JobTracker for LoggingTracker {
    fn reattach(&self, status: &RecoverStatus) {
        info!(
            instance_id = %status.instance_id,
            token = %status.state.token,
            method = %status.state.method,
            state = %status.state.state,
            pod = %status.state.pod_name,
            "resuming tracking of in-flight job"
        );
    }
}

/// Result of one recovery scan.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub in_progress: Vec<RecoverStatus>,
    pub not_yet_started: Vec<RecoverStatus>,
    /// Job records that could not be decoded.
    pub errors: MultiError,
}

impl RecoveryReport {
    /// Number of jobs handed to the tracker.
    pub fn pending(&self) -> usize {
        self.in_progress.len() + self.not_yet_started.len()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Tokens whose cleanup finished on this pass.
    pub cleaned: Vec<String>,
    /// Tokens demoted because cleanup failed again.
    pub demoted: Vec<String>,
    pub errors: MultiError,
}

pub struct RecoveryScanner {
    dao: Dao,
    tracker: Arc<dyn JobTracker>,
    deprovision: DeprovisionWorkSubscriber,
}

impl RecoveryScanner {
    pub fn new(dao: Dao, tracker: Arc<dyn JobTracker>) -> Self {
        let deprovision = DeprovisionWorkSubscriber::new(Arc::new(dao.clone()));
        Self {
            dao,
            tracker,
            deprovision,
        }
    }

    /// Find every non-terminal job and re-attach it.
    ///
    /// A failed index query fails the scan; undecodable records are
    /// collected in the report.
    pub fn scan(&self) -> StateResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for state in [State::InProgress, State::NotYetStarted] {
            let found = self.dao.find_by_state(state)?;
            for err in found.errors.into_errors() {
                warn!(%state, error = %err, "skipping unreadable job state");
                report.errors.push(err);
            }
            for status in found.items {
                self.tracker.reattach(&status);
                match state {
                    State::InProgress => report.in_progress.push(status),
                    _ => report.not_yet_started.push(status),
                }
            }
        }

        info!(
            in_progress = report.in_progress.len(),
            not_yet_started = report.not_yet_started.len(),
            errors = report.errors.len(),
            "recovery scan complete"
        );
        Ok(report)
    }

    /// Finish cleanups for succeeded deprovisions whose instance is still
    /// stored.
    pub fn reconcile(&self) -> StateResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let found = self.dao.find_by_state(State::Succeeded)?;
        for err in found.errors.into_errors() {
            report.errors.push(err);
        }

        for status in found.items {
            if status.state.method != JobMethod::Deprovision || status.instance_id.is_empty() {
                continue;
            }
            match self.dao.get_service_instance(&status.instance_id) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    report.errors.push(e);
                    continue;
                }
            }

            warn!(
                instance_id = %status.instance_id,
                token = %status.state.token,
                "deprovision succeeded but instance remains, retrying cleanup"
            );
            let token = status.state.token.clone();
            let msg = JobMsg::new(status.instance_id, status.state);
            match self.deprovision.handle(&msg) {
                MessageOutcome::Completed => report.cleaned.push(token),
                MessageOutcome::Demoted | MessageOutcome::DemotionLost => report.demoted.push(token),
                outcome => debug!(%token, ?outcome, "reconcile left job unchanged"),
            }
        }

        info!(
            cleaned = report.cleaned.len(),
            demoted = report.demoted.len(),
            errors = report.errors.len(),
            "reconcile complete"
        );
        Ok(report)
    }

    /// Run scan (and reconcile, if enabled) every `interval` until the
    /// shutdown signal fires.
    pub async fn run(
        &self,
        interval: Duration,
        reconcile: bool,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), reconcile, "recovery loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.scan() {
                        error!(error = %e, "recovery scan failed");
                    }
                    if reconcile {
                        if let Err(e) = self.reconcile() {
                            error!(error = %e, "reconcile failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("recovery loop shutting down");
                    break;
                }
            }
        }
    }
}
