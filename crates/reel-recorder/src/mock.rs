use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::conversion::{ConversionJob, ConversionOutcome, Transcoder};
use crate::error::ConversionError;

/// Scripted behavior of a [`MockTranscoder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockBehavior {
    /// Return `Converted` immediately.
    Succeed,
    /// Return a spawn error immediately.
    Fail,
    /// Block until cancelled, then return `Cancelled`.
    UntilCancelled,
    /// Block until [`MockTranscoder::release`] grants a permit or the job is cancelled.
    Gated,
}

/// Transcoder that records every job without spawning a process.
pub struct MockTranscoder {
    behavior: MockBehavior,
    jobs: Mutex<Vec<ConversionJob>>,
    gate: Semaphore,
    finished: AtomicUsize,
}

impl MockTranscoder {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            jobs: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(MockBehavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Fail)
    }

    pub fn until_cancelled() -> Self {
        Self::new(MockBehavior::UntilCancelled)
    }

    pub fn gated() -> Self {
        Self::new(MockBehavior::Gated)
    }

    /// Let `n` gated jobs finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Jobs received so far, in call order.
    pub fn jobs(&self) -> Vec<ConversionJob> {
        self.jobs.lock().clone()
    }

    /// Number of `convert` calls that have returned.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn convert(
        &self,
        job: &ConversionJob,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome, ConversionError> {
        self.jobs.lock().push(job.clone());

        let result = match self.behavior {
            MockBehavior::Succeed => Ok(ConversionOutcome::Converted),
            MockBehavior::Fail => Err(ConversionError::Spawn {
                program: "mock".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock failure"),
            }),
            MockBehavior::UntilCancelled => {
                cancel.cancelled().await;
                Ok(ConversionOutcome::Cancelled)
            }
            MockBehavior::Gated => {
                tokio::select! {
                    permit = self.gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        Ok(ConversionOutcome::Converted)
                    }
                    () = cancel.cancelled() => Ok(ConversionOutcome::Cancelled),
                }
            }
        };

        let _ = self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}
