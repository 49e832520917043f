//! Completion tracker: process-wide bookkeeping of outstanding conversions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reel_telemetry::{CONVERSIONS_ACTIVE, CONVERSIONS_TOTAL};
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, Instrument};

use crate::conversion::{ConversionJob, ConversionOutcome, Transcoder};
use crate::error::TrackerError;

/// Registration of one unit of tracked work.
///
/// Deregisters when completed or dropped.
#[derive(Debug)]
pub struct JobToken {
    _task: TaskTrackerToken,
    outstanding: Arc<AtomicUsize>,
}

impl JobToken {
    pub fn complete(self) {}
}

impl Drop for JobToken {
    fn drop(&mut self) {
        let _ = self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Claim on the tracker held by a live session.
///
/// Keeps [`CompletionTracker::wait_all`] from returning while the session
/// can still produce a job, and lets that job in after the tracker closed.
#[derive(Debug)]
pub struct Reservation {
    _task: TaskTrackerToken,
}

/// Tracks conversion jobs so shutdown can wait for every one of them.
///
/// Once [`wait_all`](Self::wait_all) has started, new work is rejected with
/// [`TrackerError::Closed`]. Work covered by a [`Reservation`] taken earlier
/// is still accepted.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    tasks: TaskTracker,
    cancel: CancellationToken,
    closed: Mutex<bool>,
    outstanding: Arc<AtomicUsize>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work before it is dispatched.
    pub fn track(&self) -> Result<JobToken, TrackerError> {
        let closed = self.closed.lock();
        if *closed {
            return Err(TrackerError::Closed);
        }
        Ok(self.register())
    }

    /// Reserve room for a job that will be submitted later.
    pub fn reserve(&self) -> Result<Reservation, TrackerError> {
        let closed = self.closed.lock();
        if *closed {
            return Err(TrackerError::Closed);
        }
        Ok(Reservation {
            _task: self.tasks.token(),
        })
    }

    fn register(&self) -> JobToken {
        let _ = self.outstanding.fetch_add(1, Ordering::SeqCst);
        JobToken {
            _task: self.tasks.token(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Track `job` and run it on the tracker's task scope.
    ///
    /// Returns as soon as the job is registered; the outcome is only logged.
    pub fn submit(
        &self,
        job: ConversionJob,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<(), TrackerError> {
        let token = self.track()?;
        self.dispatch(token, job, transcoder);
        Ok(())
    }

    /// Run `job` under an earlier reservation. Accepted even once closed.
    pub fn submit_reserved(
        &self,
        reservation: Reservation,
        job: ConversionJob,
        transcoder: Arc<dyn Transcoder>,
    ) {
        let token = self.register();
        self.dispatch(token, job, transcoder);
        drop(reservation);
    }

    fn dispatch(&self, token: JobToken, job: ConversionJob, transcoder: Arc<dyn Transcoder>) {
        let cancel = self.cancel.clone();
        let span = info_span!(
            "conversion",
            input = %job.input().display(),
            output = %job.output().display(),
        );

        drop(self.tasks.spawn(
            async move {
                run_conversion(&job, transcoder.as_ref(), &cancel).await;
                token.complete();
            }
            .instrument(span),
        ));
    }

    /// Close the tracker to new work and wait for every tracked job.
    pub async fn wait_all(&self) {
        {
            let mut closed = self.closed.lock();
            *closed = true;
            let _ = self.tasks.close();
        }
        self.tasks.wait().await;
    }

    /// Tracked jobs that have not completed yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Terminate running conversions.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn run_conversion(job: &ConversionJob, transcoder: &dyn Transcoder, cancel: &CancellationToken) {
    metrics::gauge!(CONVERSIONS_ACTIVE).increment(1.0);
    info!("conversion started");

    let outcome = match transcoder.convert(job, cancel).await {
        Ok(outcome) => {
            match outcome {
                ConversionOutcome::Converted => info!("conversion finished"),
                ConversionOutcome::Cancelled => info!("conversion cancelled"),
            }
            outcome.as_str()
        }
        Err(e) => {
            error!(error = %e, "conversion failed");
            "failed"
        }
    };

    metrics::counter!(CONVERSIONS_TOTAL, "outcome" => outcome).increment(1);
    metrics::gauge!(CONVERSIONS_ACTIVE).decrement(1.0);
}
