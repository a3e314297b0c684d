//! Single-use result delivery between runners, commands and callers.
//!
//! Every attempt gets a fresh channel with room for exactly one value. The
//! write end is consumed by [`ResultSender::send`], so a runner cannot deliver
//! twice, and a write whose reader has gone away (a timed-out attempt) returns
//! immediately instead of blocking the orphaned task.

use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Write end handed to [`Runner::run`](crate::Runner::run) and
/// [`Runner::fallback`](crate::Runner::fallback).
#[derive(Debug)]
pub struct ResultSender<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> ResultSender<T, E> {
    /// Deliver the outcome. Returns it back if nobody is listening anymore.
    pub fn send(self, result: Result<T, E>) -> Result<(), Result<T, E>> {
        self.tx.send(result)
    }

    /// Deliver a success value.
    pub fn ok(self, value: T) -> Result<(), Result<T, E>> {
        self.send(Ok(value))
    }

    /// Deliver a failure.
    pub fn err(self, error: E) -> Result<(), Result<T, E>> {
        self.send(Err(error))
    }

    /// `true` once the command stopped waiting (for example after a timeout).
    ///
    /// Long-running work may poll this to stop early; nothing forces it to.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub(crate) fn channel<T, E>() -> (ResultSender<T, E>, oneshot::Receiver<Result<T, E>>) {
    let (tx, rx) = oneshot::channel();
    (ResultSender { tx }, rx)
}

/// Read end returned by [`Command::queue`](crate::Command::queue).
///
/// Resolves to the command's one final result. If the orchestration task
/// panicked (only possible when a fallback panics or drops its sender), the
/// panic surfaces here when the receiver is polled.
#[pin_project]
#[derive(Debug)]
#[must_use = "a queued command's result is only observed by awaiting the receiver"]
pub struct ResultReceiver<T, E> {
    #[pin]
    rx: oneshot::Receiver<Result<T, E>>,
    taken: bool,
}

impl<T, E> ResultReceiver<T, E> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { rx, taken: false }
    }

    /// Non-blocking check; `None` while the command is still running.
    ///
    /// Once this returns `Some` the receiver is spent: later calls return
    /// `None`, and awaiting it panics.
    pub fn try_recv(&mut self) -> Option<Result<T, E>> {
        if self.taken {
            return None;
        }
        let result = self.rx.try_recv().ok();
        self.taken = result.is_some();
        result
    }

    /// `true` once the result has been taken with [`try_recv`](Self::try_recv).
    pub fn is_spent(&self) -> bool {
        self.taken
    }
}

impl<T, E> Future for ResultReceiver<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        assert!(!*this.taken, "command result already taken with try_recv");
        match this.rx.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => panic!("command task ended without delivering a result"),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_exactly_one_value() {
        let (tx, rx) = channel::<u32, std::io::Error>();
        assert!(tx.ok(7).is_ok());
        assert_eq!(rx.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn write_after_reader_dropped_returns_immediately() {
        let (tx, rx) = channel::<u32, std::io::Error>();
        drop(rx);
        assert!(tx.is_closed());
        let returned = tx.ok(1).unwrap_err();
        assert_eq!(returned.unwrap(), 1);
    }

    #[tokio::test]
    async fn receiver_resolves_to_sent_result() {
        let (tx, rx) = oneshot::channel::<Result<&str, std::io::Error>>();
        let mut receiver = ResultReceiver::new(rx);
        assert!(receiver.try_recv().is_none());
        tx.send(Ok("done")).unwrap();
        assert_eq!(receiver.await.unwrap(), "done");
    }

    #[tokio::test]
    #[should_panic(expected = "without delivering a result")]
    async fn receiver_panics_when_sender_vanishes() {
        let (tx, rx) = oneshot::channel::<Result<(), std::io::Error>>();
        drop(tx);
        let _ = ResultReceiver::new(rx).await;
    }

    #[test]
    fn try_recv_spends_the_receiver() {
        let (tx, rx) = oneshot::channel::<Result<u8, std::io::Error>>();
        let mut receiver = ResultReceiver::new(rx);
        tx.send(Ok(3)).unwrap();
        assert_eq!(receiver.try_recv().map(Result::unwrap), Some(3));
        assert!(receiver.is_spent());
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "already taken with try_recv")]
    async fn awaiting_after_try_recv_panics_clearly() {
        let (tx, rx) = oneshot::channel::<Result<u8, std::io::Error>>();
        let mut receiver = ResultReceiver::new(rx);
        tx.send(Ok(3)).unwrap();
        let _ = receiver.try_recv();
        let _ = receiver.await;
    }
}
