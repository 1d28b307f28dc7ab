//! Sweep scheduler: the periodic entry point of the processor.
//!
//! Every tick runs one cycle for each patient with queued events or a pending
//! retry, on the blocking pool, bounded by `max_parallel_cycles`. Stopping the
//! scheduler ends the tick loop, then runs one last sweep so queued changes
//! are not left behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;

use super::processor::CycleOutcome;
use super::RiskEngine;

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub deferred: usize,
    pub failed: usize,
}

/// Handle for the background sweep task.
///
/// `shutdown()` stops ticking and waits for the final drain sweep. Dropping
/// the handle only signals the stop.
pub struct SweepSchedulerHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SweepSchedulerHandle {
    pub async fn shutdown(mut self) {
        self.signal();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Sweep scheduler task ended abnormally");
            }
        }
    }

    fn signal(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

impl Drop for SweepSchedulerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Spawn the sweep loop on the current runtime.
pub fn start_sweep_scheduler(engine: Arc<RiskEngine>, config: &EngineConfig) -> SweepSchedulerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let period = config.tick_interval();
    let max_parallel = config.max_parallel_cycles.max(1);

    let task = tokio::spawn({
        let stop = Arc::clone(&stop);
        let wake = Arc::clone(&wake);
        async move {
            tracing::info!(tick_secs = period.as_secs(), max_parallel, "Sweep scheduler started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wake.notified() => {}
                }
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                sweep_once(&engine, max_parallel).await;
            }
            let drained = sweep_once(&engine, max_parallel).await;
            tracing::info!(
                processed = drained.processed,
                deferred = drained.deferred,
                failed = drained.failed,
                "Sweep scheduler stopped after final drain"
            );
        }
    });

    SweepSchedulerHandle {
        stop,
        wake,
        task: Some(task),
    }
}

/// Run one cycle for every patient with work and wait for all of them.
pub async fn sweep_once(engine: &Arc<RiskEngine>, max_parallel: usize) -> SweepReport {
    let mut report = SweepReport::default();
    let patients = match engine.patients_with_work() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Sweep skipped, registry unavailable");
            return report;
        }
    };
    if patients.is_empty() {
        tracing::debug!("Sweep found no pending work");
        return report;
    }

    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut cycles = JoinSet::new();
    for patient_id in patients {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let engine = Arc::clone(engine);
        cycles.spawn_blocking(move || {
            let _permit = permit;
            let result = engine.process_patient_risk_update(&patient_id);
            (patient_id, result)
        });
    }

    while let Some(joined) = cycles.join_next().await {
        match joined {
            Ok((_, Ok(CycleOutcome::Completed(_)))) => report.processed += 1,
            Ok((_, Ok(CycleOutcome::Deferred))) => report.deferred += 1,
            Ok((_, Ok(CycleOutcome::Idle))) => {}
            Ok((patient_id, Err(e))) => {
                report.failed += 1;
                tracing::debug!(patient_id = %patient_id, error = %e, "Sweep cycle failed");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(error = %e, "Sweep cycle panicked");
            }
        }
    }
    tracing::debug!(
        processed = report.processed,
        deferred = report.deferred,
        failed = report.failed,
        "Sweep finished"
    );
    report
}
