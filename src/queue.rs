use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result, StateError};

/// A deferred unit of work. The operation's typed result travels back to
/// its caller over a oneshot channel captured inside the future.
type QueueTask = BoxFuture<'static, ()>;

/// Serializes all operations against the shared automation session.
///
/// Operations run strictly in enqueue order, exactly one at a time. A
/// failing operation settles only its own caller's future; the drain loop
/// carries on with the next operation. After [`ActionQueue::stop`], the
/// running operation finishes and every still-pending operation is
/// rejected.
#[derive(Debug)]
pub struct ActionQueue {
    sender: mpsc::UnboundedSender<QueueTask>,
    stopped: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl ActionQueue {
    /// Construct a queue and spawn its drain task. `tick` is the pause
    /// between two operation completions.
    pub fn new(tick: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let drain = DrainTask {
            receiver,
            tick,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(drain.run());
        Self {
            sender,
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown,
        }
    }

    /// Submit an operation. Returns immediately; the returned future
    /// settles once the operation has actually run (or the queue stopped
    /// before it could).
    pub fn enqueue<T, F>(&self, operation: F) -> impl Future<Output = Result<T>> + use<T, F>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let submitted = if self.stopped.load(Ordering::SeqCst) {
            false
        } else {
            let task: QueueTask = Box::pin(async move {
                let result = operation.await;
                let _ = tx.send(result);
            });
            self.sender.send(task).is_ok()
        };

        async move {
            if !submitted {
                return Err(Error::State(StateError::QueueStopped));
            }
            match rx.await {
                Ok(result) => result,
                // The task was dropped without running: the queue stopped.
                Err(_) => Err(Error::State(StateError::QueueStopped)),
            }
        }
    }

    /// Halt the drain task. The operation currently running finishes;
    /// pending operations are rejected.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Background task draining the queue one operation at a time.
struct DrainTask {
    receiver: mpsc::UnboundedReceiver<QueueTask>,
    tick: Duration,
    shutdown: Arc<Notify>,
}

impl DrainTask {
    async fn run(mut self) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                maybe_task = self.receiver.recv() => match maybe_task {
                    Some(task) => task,
                    // Queue handle dropped with nothing pending.
                    None => return,
                },
            };
            task.await;
            tokio::time::sleep(self.tick).await;
        }

        // Reject whatever is still pending: dropping a task drops its
        // result channel, settling the caller with a queue-stopped error.
        self.receiver.close();
        let mut rejected = 0_usize;
        while self.receiver.try_recv().is_ok() {
            rejected += 1;
        }
        debug!(rejected, "action queue stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    fn test_queue() -> ActionQueue {
        ActionQueue::new(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_operations_settle_in_submission_order_without_overlap() {
        let queue = test_queue();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let log = log.clone();
            handles.push(queue.enqueue(async move {
                log.lock().unwrap().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().unwrap().push(format!("end {i}"));
                Ok(i)
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_second_operation_waits_for_first_to_settle() {
        let queue = test_queue();

        let first_done: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let second_started: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

        let done = first_done.clone();
        let op1 = queue.enqueue(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            *done.lock().unwrap() = Some(Instant::now());
            Ok(())
        });
        let started = second_started.clone();
        let op2 = queue.enqueue(async move {
            *started.lock().unwrap() = Some(Instant::now());
            Ok(())
        });

        op1.await.unwrap();
        op2.await.unwrap();

        let done = first_done.lock().unwrap().unwrap();
        let started = second_started.lock().unwrap().unwrap();
        assert!(started >= done);
    }

    #[tokio::test]
    async fn test_failure_reaches_only_its_own_caller() {
        let queue = test_queue();

        let op1 = queue.enqueue(async {
            Err::<(), _>(Error::State(StateError::NotAuthenticated))
        });
        let op2 = queue.enqueue(async { Ok(7) });

        assert!(matches!(
            op1.await,
            Err(Error::State(StateError::NotAuthenticated))
        ));
        assert_eq!(op2.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_stop_rejects_pending_operations() {
        let queue = test_queue();

        let op1 = queue.enqueue(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        });
        let op2 = queue.enqueue(async { Ok(2) });

        // Let the drain task pick up op1 before stopping.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.stop();

        assert_eq!(op1.await.unwrap(), 1);
        assert!(matches!(
            op2.await,
            Err(Error::State(StateError::QueueStopped))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_rejected_immediately() {
        let queue = test_queue();
        queue.stop();

        let op = queue.enqueue(async { Ok(()) });
        assert!(matches!(op.await, Err(Error::State(StateError::QueueStopped))));
    }
}
