use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use super::{WritebackEnvelope, WritebackHandle, WritebackOutcome};
use crate::library::{persist_remote, LibraryStore};
use crate::metrics;

/// Background task that writes queued catalog records into the library.
pub struct WritebackWriter {
    rx: mpsc::Receiver<WritebackEnvelope>,
    store: Arc<dyn LibraryStore>,
    reports: Option<mpsc::UnboundedSender<WritebackOutcome>>,
}

impl WritebackWriter {
    pub fn new(rx: mpsc::Receiver<WritebackEnvelope>, store: Arc<dyn LibraryStore>) -> Self {
        Self {
            rx,
            store,
            reports: None,
        }
    }

    /// Send the outcome of every job to `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<WritebackOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Process jobs until every [`WritebackHandle`] is dropped.
    ///
    /// Spawn with `tokio::spawn(writer.run())`.
    pub async fn run(mut self) {
        tracing::info!("Write-behind writer started");

        while let Some(envelope) = self.rx.recv().await {
            let external_id = envelope.job.anime.external_id.clone();
            let lag = Utc::now() - envelope.queued_at;

            let outcome =
                match persist_remote(self.store.as_ref(), &envelope.job.anime, &envelope.job.episodes) {
                    Ok(persisted) => {
                        tracing::debug!(
                            "Persisted anime {} as {} with {} episodes ({} ms after queueing)",
                            external_id,
                            persisted.anime_id,
                            persisted.episodes,
                            lag.num_milliseconds()
                        );
                        metrics::WRITEBACK_JOBS.with_label_values(&["persisted"]).inc();
                        WritebackOutcome::Persisted {
                            external_id,
                            anime_id: persisted.anime_id,
                            episodes: persisted.episodes,
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to persist anime {}: {}", external_id, e);
                        metrics::WRITEBACK_JOBS.with_label_values(&["failed"]).inc();
                        WritebackOutcome::Failed {
                            external_id,
                            error: e.to_string(),
                        }
                    }
                };

            if let Some(reports) = &self.reports {
                // Nobody listening is fine.
                let _ = reports.send(outcome);
            }
        }

        tracing::info!("Write-behind writer shutting down");
    }
}

/// Create the write-behind system.
///
/// Returns the handle (clone it to share across tasks) and the writer to
/// spawn with `tokio::spawn(writer.run())`. `buffer_size` bounds the number
/// of queued jobs.
pub fn create_writeback_system(
    store: Arc<dyn LibraryStore>,
    buffer_size: usize,
) -> (WritebackHandle, WritebackWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (WritebackHandle::new(tx), WritebackWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SqliteLibrary;
    use crate::testing::{fixtures, FailingLibrary};
    use crate::writeback::WritebackJob;

    fn spawn_system(
        store: Arc<dyn LibraryStore>,
    ) -> (
        WritebackHandle,
        tokio::task::JoinHandle<()>,
        mpsc::UnboundedReceiver<WritebackOutcome>,
    ) {
        let (handle, writer) = create_writeback_system(store, 16);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(writer.with_reports(reports_tx).run());
        (handle, task, reports_rx)
    }

    #[tokio::test]
    async fn test_writer_persists_anime_and_episodes() {
        let library = Arc::new(SqliteLibrary::in_memory().unwrap());
        let (handle, task, mut reports) = spawn_system(library.clone());

        handle
            .submit(WritebackJob::with_episodes(
                fixtures::remote_anime("12", "One Piece", Some(3)),
                fixtures::remote_episodes("12", 3),
            ))
            .await;
        drop(handle);
        task.await.unwrap();

        match reports.recv().await {
            Some(WritebackOutcome::Persisted {
                external_id,
                anime_id,
                episodes,
            }) => {
                assert_eq!(external_id, "12");
                assert_eq!(episodes, 3);
                let anime = library.get_anime(&anime_id).unwrap().unwrap();
                assert_eq!(anime.external_id.as_deref(), Some("12"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writer_reports_failures_and_keeps_going() {
        let (handle, task, mut reports) = spawn_system(Arc::new(FailingLibrary::new("disk full")));

        handle
            .submit(WritebackJob::anime(fixtures::remote_anime("1", "A", None)))
            .await;
        handle
            .submit(WritebackJob::anime(fixtures::remote_anime("2", "B", None)))
            .await;
        drop(handle);
        task.await.unwrap();

        for expected in ["1", "2"] {
            match reports.recv().await {
                Some(WritebackOutcome::Failed { external_id, error }) => {
                    assert_eq!(external_id, expected);
                    assert!(error.contains("disk full"));
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles_to_drop() {
        let library = Arc::new(SqliteLibrary::in_memory().unwrap());
        let (main_handle, task, mut reports) = spawn_system(library.clone());
        let tracker_handle = main_handle.clone();

        tracker_handle
            .submit(WritebackJob::anime(fixtures::remote_anime("12", "One Piece", None)))
            .await;
        assert!(reports.recv().await.is_some());

        drop(main_handle);
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(!task.is_finished(), "Writer should run while a handle is alive");

        drop(tracker_handle);
        let result = tokio::time::timeout(tokio::time::Duration::from_secs(1), task).await;
        assert!(result.is_ok(), "Writer should exit after all handles dropped");
        assert_eq!(library.stats().unwrap().animes, 1);
    }
}
