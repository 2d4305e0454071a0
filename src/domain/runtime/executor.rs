use actix::prelude::Recipient;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::runtime::requests::{ApRequest, JobOutcome};
use crate::domain::scheduler::action::ActionKey;
use crate::domain::scheduler::task_scheduler::LaunchedJob;

/// Runs launched jobs and reports their end to `listener` with an [`ApRequest::JobEnd`].
pub trait JobExecutor: Send + Sync {
    fn submit(&self, job: LaunchedJob, listener: Recipient<ApRequest>);
}

/// Keeps every submitted job until the caller ends it by hand.
#[derive(Default, Clone)]
pub struct RecordingExecutor {
    jobs: Arc<Mutex<Vec<(LaunchedJob, Recipient<ApRequest>)>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        RecordingExecutor::default()
    }

    /// Jobs submitted and not yet ended, in submission order.
    pub fn jobs(&self) -> Vec<LaunchedJob> {
        match self.jobs.lock() {
            Ok(jobs) => jobs.iter().map(|(job, _)| job.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports the end of the job of `action`.
    ///
    /// # Returns
    /// `false` if no such job is pending.
    pub fn finish(&self, action: ActionKey, outcome: JobOutcome) -> bool {
        let entry = match self.jobs.lock() {
            Ok(mut jobs) => jobs.iter().position(|(job, _)| job.action == action).map(|index| jobs.remove(index)),
            Err(_) => None,
        };
        match entry {
            Some((_, listener)) => {
                listener.do_send(ApRequest::JobEnd { action, outcome });
                true
            }
            None => false,
        }
    }

    /// Reports the end of the oldest pending job.
    pub fn finish_next(&self, outcome: JobOutcome) -> Option<LaunchedJob> {
        let entry = match self.jobs.lock() {
            Ok(mut jobs) if !jobs.is_empty() => Some(jobs.remove(0)),
            _ => None,
        };
        entry.map(|(job, listener)| {
            listener.do_send(ApRequest::JobEnd { action: job.action, outcome });
            job
        })
    }
}

impl JobExecutor for RecordingExecutor {
    fn submit(&self, job: LaunchedJob, listener: Recipient<ApRequest>) {
        log::debug!("Recorded job of action {} on '{}'", job.action_id, job.worker_name);
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push((job, listener));
        }
    }
}

/// Pretends to run each job for its expected duration, with some jitter and random failures.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    /// Relative jitter applied to the expected duration, `0.1` means ±10%.
    pub jitter: f64,

    /// Probability that an attempt ends with [`JobOutcome::Error`].
    pub failure_rate: f64,

    /// Simulated milliseconds per real millisecond.
    pub speedup: u32,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        SimulatedExecutor { jitter: 0.1, failure_rate: 0.0, speedup: 1 }
    }
}

impl SimulatedExecutor {
    fn sample(&self, job: &LaunchedJob) -> (u64, JobOutcome) {
        let mut rng = rand::rng();
        let factor = if self.jitter > 0.0 { 1.0 + rng.random_range(-self.jitter..=self.jitter) } else { 1.0 };
        let duration = (job.expected_duration.max(0) as f64 * factor).max(0.0) / f64::from(self.speedup.max(1));
        let outcome = if self.failure_rate > 0.0 && rng.random_bool(self.failure_rate.clamp(0.0, 1.0)) { JobOutcome::Error } else { JobOutcome::Success };
        (duration.round() as u64, outcome)
    }
}

impl JobExecutor for SimulatedExecutor {
    /// Must be called from within a running actix system.
    fn submit(&self, job: LaunchedJob, listener: Recipient<ApRequest>) {
        let (sleep_ms, outcome) = self.sample(&job);
        log::info!("Simulating action {} ({:?}) on '{}' for {} ms", job.action_id, job.implementation.key, job.worker_name, sleep_ms);

        let action = job.action;
        actix::spawn(async move {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            listener.do_send(ApRequest::JobEnd { action, outcome });
        });
    }
}
