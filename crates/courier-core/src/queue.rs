use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;
use crate::events::{Event, EventBus};

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;

struct QueuedTask {
    fut: TaskFuture,
    done: oneshot::Sender<Result<(), EngineError>>,
}

// Strictly serial task chain: task N starts only after task N-1 settles.
// The per-task timeout abandons waiting without cancelling the work, and a
// rejected task never breaks the chain.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
}

impl TaskQueue {
    pub fn spawn(timeout_ms: u64, progress_every: u64, events: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, Duration::from_millis(timeout_ms), progress_every, events));
        Self { tx }
    }

    pub fn add<F>(&self, fut: F) -> oneshot::Receiver<Result<(), EngineError>>
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let task = QueuedTask {
            fut: Box::pin(fut),
            done,
        };
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            let _ = task.done.send(Err(EngineError::transport("task queue stopped")));
        }
        rx
    }

    pub async fn add_and_wait<F>(&self, fut: F) -> Result<(), EngineError>
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.add(fut)
            .await
            .unwrap_or_else(|_| Err(EngineError::transport("task queue stopped")))
    }

    // Resolves once every task queued before the call has settled.
    pub async fn drain(&self) {
        let _ = self.add(async { Ok(()) }).await;
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<QueuedTask>,
    timeout: Duration,
    progress_every: u64,
    events: EventBus,
) {
    let mut completed: u64 = 0;
    while let Some(task) = rx.recv().await {
        let mut handle = tokio::spawn(task.fut);
        let result = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EngineError::transport(format!("task panicked: {join_err}"))),
            Err(_) => {
                // The work itself may not be cancellable; leave it running.
                Err(EngineError::TaskTimeout)
            }
        };
        completed += 1;
        if progress_every > 0 && completed % progress_every == 0 {
            events.publish(Event::Progress { count: completed });
        }
        let _ = task.done.send(result);
    }
}
