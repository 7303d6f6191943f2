use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify, oneshot};

use crate::task::GradeRequest;
use crate::verdict::GradeResult;

/// One grading request waiting for a worker, carrying the channel its
/// verdict is sent back on.
pub struct QueuedSubmission {
    pub id: u64,
    pub request: GradeRequest,
    pub responder: oneshot::Sender<GradeResult>,
}

pub struct SubmissionQueue {
    queue: Mutex<VecDeque<QueuedSubmission>>,
    notify: Notify,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, submission: QueuedSubmission) {
        self.queue.lock().await.push_back(submission);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> QueuedSubmission {
        loop {
            if let Some(submission) = self.queue.lock().await.pop_front() {
                return submission;
            }
            self.notify.notified().await;
        }
    }

    /// Abandons a submission that has not started grading yet.  A running
    /// submission is not interrupted here; its child processes are bounded
    /// by the runner's deadline regardless.
    pub async fn cancel_pending(&self, id: u64) -> bool {
        let mut queue = self.queue.lock().await;
        let before_len = queue.len();
        queue.retain(|s| s.id != id);
        before_len != queue.len()
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::language::Language;
    use crate::task::Task;

    fn submission(id: u64) -> (QueuedSubmission, oneshot::Receiver<GradeResult>) {
        let (responder, receiver) = oneshot::channel();
        let request = GradeRequest {
            task: Task {
                name: "t".to_string(),
                complexity: 1,
                input: String::new(),
                output: String::new(),
                solution: String::new(),
            },
            language: Language::Python,
            source_code: String::new(),
            submitter: id.to_string(),
        };
        (QueuedSubmission { id, request, responder }, receiver)
    }

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = SubmissionQueue::new();
        let (first, _rx1) = submission(1);
        let (second, _rx2) = submission(2);
        queue.push(first).await;
        queue.push(second).await;

        assert_eq!(queue.pop().await.id, 1);
        assert_eq!(queue.pop().await.id, 2);
    }

    #[tokio::test]
    async fn cancels_only_pending_entries() {
        let queue = SubmissionQueue::new();
        let (first, _rx) = submission(7);
        queue.push(first).await;

        assert!(queue.cancel_pending(7).await);
        assert!(!queue.cancel_pending(7).await);
    }
}
