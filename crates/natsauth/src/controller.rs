//! Drives the engine: drains the work queue and runs reconciles as tasks.
//!
//! The controller has no timers. Delayed requeues are reported in each
//! [`Outcome`] for the caller to schedule; only immediate requeues (store
//! conflicts) go straight back onto the queue.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use natsauth_core::{Kind, ObjectKey};
use natsauth_store::Store;

use crate::engine::{Engine, Outcome};
use crate::error::Result;

/// Summary of a [`Controller::run_until_idle`] call.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Queue drains performed.
    pub rounds: usize,
    /// Total reconciles run.
    pub reconciles: usize,
    /// Latest outcome per object.
    pub outcomes: BTreeMap<ObjectKey, Outcome>,
    /// Whether the queue was empty when the run ended.
    pub idle: bool,
}

impl RunReport {
    pub fn outcome(&self, key: &ObjectKey) -> Option<&Outcome> {
        self.outcomes.get(key)
    }

    /// Whether every object's latest reconcile succeeded.
    pub fn all_ready(&self) -> bool {
        self.outcomes.values().all(Outcome::is_ready)
    }
}

/// Runs reconciles for queued objects, one task per object.
pub struct Controller<S: Store + 'static> {
    engine: Arc<Engine<S>>,
}

impl<S: Store + 'static> Controller<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_shared(engine: Arc<Engine<S>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    /// Queue every declared object: operators, then accounts, then users.
    ///
    /// Returns how many keys were newly queued.
    pub async fn enqueue_all(&self) -> Result<usize> {
        let mut queued = 0;
        for kind in [Kind::Operator, Kind::Account, Kind::User] {
            for object in self.engine.store().list_objects(kind).await? {
                if self.engine.queue().enqueue(object.key()) {
                    queued += 1;
                }
            }
        }
        tracing::debug!(queued, "enqueued declared objects");
        Ok(queued)
    }

    /// Drain the queue once and reconcile every key concurrently.
    pub async fn reconcile_pending(&self) -> Vec<Outcome> {
        let keys = self.engine.queue().drain();
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            let engine = Arc::clone(&self.engine);
            handles.push(tokio::spawn(async move { engine.reconcile(&key).await }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::warn!(error = %e, "reconcile task cancelled"),
            }
        }
        outcomes
    }

    /// Reconcile until nothing is queued or `max_rounds` drains have run.
    ///
    /// Notifications raised by one round (an account bumping its operator,
    /// an operator re-keying its accounts) are picked up by the next.
    pub async fn run_until_idle(&self, max_rounds: usize) -> RunReport {
        let mut report = RunReport::default();

        while report.rounds < max_rounds && !self.engine.queue().is_empty() {
            report.rounds += 1;
            let outcomes = self.reconcile_pending().await;
            report.reconciles += outcomes.len();

            for outcome in outcomes {
                if outcome.requeue_after == Some(Duration::ZERO) {
                    self.engine.queue().enqueue(outcome.key.clone());
                }
                report.outcomes.insert(outcome.key.clone(), outcome);
            }
        }

        report.idle = self.engine.queue().is_empty();
        tracing::debug!(
            rounds = report.rounds,
            reconciles = report.reconciles,
            idle = report.idle,
            "controller run finished"
        );
        report
    }
}
