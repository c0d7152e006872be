use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::WritebackJob;

/// A job with the time it was queued.
#[derive(Debug, Clone)]
pub struct WritebackEnvelope {
    pub queued_at: DateTime<Utc>,
    pub job: WritebackJob,
}

/// Handle for queueing write-behind jobs.
///
/// Cheap to clone. The writer stops once every handle is dropped.
#[derive(Clone)]
pub struct WritebackHandle {
    tx: mpsc::Sender<WritebackEnvelope>,
}

impl WritebackHandle {
    pub fn new(tx: mpsc::Sender<WritebackEnvelope>) -> Self {
        Self { tx }
    }

    /// Queue a job, waiting for buffer space.
    ///
    /// A closed channel is logged, not returned.
    pub async fn submit(&self, job: WritebackJob) {
        let envelope = WritebackEnvelope {
            queued_at: Utc::now(),
            job,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!(
                "Failed to queue write-behind for anime {}: channel closed",
                e.0.job.anime.external_id
            );
        }
    }

    /// Queue a job without waiting.
    ///
    /// Returns false when the buffer is full or the writer is gone; the job is dropped.
    pub fn try_submit(&self, job: WritebackJob) -> bool {
        let envelope = WritebackEnvelope {
            queued_at: Utc::now(),
            job,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping write-behind job: {}", e);
                false
            }
        }
    }
}
