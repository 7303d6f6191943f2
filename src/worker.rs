use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checker;
use crate::config::LimitsConfig;
use crate::language::LanguageRegistry;
use crate::queue::SubmissionQueue;

/// Grading worker loop.  One submission is graded at a time, as a blocking
/// call on the blocking pool; tests within it run sequentially by design.
pub async fn worker(
    id: u8,
    registry: Arc<LanguageRegistry>,
    limits: Arc<LimitsConfig>,
    queue: Arc<SubmissionQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            submission = queue.pop() => {
                let submission_id = submission.id;
                log::info!("Worker {id} got submission {submission_id} from queue");

                let registry_ref = Arc::clone(&registry);
                let limits_ref = Arc::clone(&limits);
                let result_handle = tokio::task::spawn_blocking(move || {
                    let result = checker::grade(&registry_ref, &limits_ref, &submission.request);
                    log::info!("Submission {submission_id} finished on worker {id}");

                    (result, submission.responder)
                });

                match result_handle.await {
                    Ok((result, responder)) => {
                        if responder.send(result).is_err() {
                            log::warn!("Failed to send submission {submission_id} result back to caller");
                        }
                    }
                    Err(e) => {
                        log::error!("Grading submission {submission_id} failed on worker {id}: {e:?}");
                    }
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}
