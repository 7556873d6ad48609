//! Cancellable handle to one in-flight observation.
//!
//! A [`PendingOp`] is a future resolving to the node's answer, paired with an
//! optional canceller supplied by whoever dispatched the request. Transports
//! built on callbacks hand over a oneshot receiver ([`PendingOp::from_receiver`]);
//! transports built on async tasks use [`PendingOp::spawn`] and cancel by
//! aborting the task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::ObserveError;

type BoxedObservation<T> = Pin<Box<dyn Future<Output = Result<T, ObserveError>> + Send + 'static>>;
type Canceller = Box<dyn FnOnce() + Send + 'static>;

/// An observation request that has been sent but not yet answered.
///
/// Once [`cancel`](Self::cancel) has been called the handle resolves
/// immediately to [`ObserveError::Cancelled`], whatever the transport does.
pub struct PendingOp<T> {
    future: BoxedObservation<T>,
    canceller: Option<Canceller>,
    cancelled: bool,
}

impl<T> PendingOp<T> {
    /// Wraps an arbitrary future and the hook that aborts it.
    pub fn new<F, C>(future: F, cancel: C) -> Self
    where
        F: Future<Output = Result<T, ObserveError>> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            canceller: Some(Box::new(cancel)),
            cancelled: false,
        }
    }

    /// An observation whose answer is already known.
    pub fn ready(result: Result<T, ObserveError>) -> Self
    where
        T: Send + 'static,
    {
        Self {
            future: Box::pin(std::future::ready(result)),
            canceller: None,
            cancelled: false,
        }
    }

    /// Adapts a callback-style transport. A dropped sender resolves to
    /// [`ObserveError::Cancelled`].
    pub fn from_receiver<C>(receiver: oneshot::Receiver<Result<T, ObserveError>>, cancel: C) -> Self
    where
        T: Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::new(
            async move { receiver.await.unwrap_or(Err(ObserveError::Cancelled)) },
            cancel,
        )
    }

    /// Runs the observation as a tokio task. Cancelling aborts the task.
    pub fn spawn<F>(observation: F) -> Self
    where
        F: Future<Output = Result<T, ObserveError>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(observation);
        let abort = handle.abort_handle();
        Self::new(
            async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) if e.is_cancelled() => Err(ObserveError::Cancelled),
                    Err(e) => Err(ObserveError::Transport(format!(
                        "observation task failed: {e}"
                    ))),
                }
            },
            move || abort.abort(),
        )
    }

    /// Transforms the answer, keeping the same canceller.
    pub fn map<U, F>(self, f: F) -> PendingOp<U>
    where
        F: FnOnce(T) -> U + Send + 'static,
        T: Send + 'static,
        U: Send + 'static,
    {
        let PendingOp {
            future,
            canceller,
            cancelled,
        } = self;
        PendingOp {
            future: Box::pin(async move { future.await.map(f) }),
            canceller,
            cancelled,
        }
    }

    /// Cancels the request. Safe to call repeatedly and after completion;
    /// the transport's hook runs at most once and is never awaited.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(cancel) = self.canceller.take() {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T> Future for PendingOp<T> {
    type Output = Result<T, ObserveError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(Err(ObserveError::Cancelled));
        }
        this.future.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for PendingOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOp")
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_canceller(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn ready_resolves_immediately() {
        let op = PendingOp::ready(Ok(7u32));
        assert_eq!(op.await, Ok(7));
    }

    #[tokio::test]
    async fn map_keeps_error() {
        let op: PendingOp<u32> = PendingOp::ready(Err(ObserveError::Transport("reset".into())));
        let mapped = op.map(|v| v * 2);
        assert_eq!(mapped.await, Err(ObserveError::Transport("reset".into())));
    }

    #[tokio::test]
    async fn cancel_runs_hook_once() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let mut op: PendingOp<u32> =
            PendingOp::new(std::future::pending(), counting_canceller(&cancels));

        op.cancel();
        op.cancel();
        op.cancel();

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(op.is_cancelled());
        assert_eq!(op.await, Err(ObserveError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_harmless() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let mut op = PendingOp::from_receiver(rx, counting_canceller(&cancels));

        tx.send(Ok(3u32)).unwrap();
        assert_eq!((&mut op).await, Ok(3));

        op.cancel();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_cancelled() {
        let (tx, rx) = oneshot::channel::<Result<u32, ObserveError>>();
        let op = PendingOp::from_receiver(rx, || {});
        drop(tx);
        assert_eq!(op.await, Err(ObserveError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_spawned_task() {
        let finished = Arc::new(AtomicUsize::new(0));
        let marker = Arc::clone(&finished);
        let mut op = PendingOp::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            marker.fetch_add(1, Ordering::SeqCst);
            Ok(1u32)
        });

        op.cancel();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(op.await, Err(ObserveError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_delivers_result() {
        let op = PendingOp::spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok("answer")
        });
        assert_eq!(op.await, Ok("answer"));
    }
}
