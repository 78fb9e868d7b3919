//! One-shot settlement primitive.
//!
//! A settlement is created as a pair: the [`Settler`] resolves it exactly once,
//! the [`Settlement`] is awaited by whoever needs the outcome. Settling consumes
//! the settler, so settling twice cannot be expressed. Dropping a settler
//! without settling aborts the settlement.
//!
//! The stream core uses settlements for both sides of its handshake: a pending
//! read is a `Settlement<Option<T>>`, the producer's backpressure gate is a
//! `Settlement<()>`.

use crate::error::StreamError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome carried by a settlement.
pub type Outcome<T> = Result<T, StreamError>;

/// Creates a fresh, pending settlement.
pub fn settlement<T>() -> (Settler<T>, Settlement<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Settler { tx },
        Settlement {
            state: State::Pending(rx),
        },
    )
}

/// The resolving half of a settlement.
#[derive(Debug)]
pub struct Settler<T> {
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> Settler<T> {
    /// Settles with `outcome`, waking the awaiting side.
    ///
    /// Returns the outcome back if the awaiting side was already dropped.
    pub fn settle(self, outcome: Outcome<T>) -> Result<(), Outcome<T>> {
        self.tx.send(outcome)
    }

    /// Settles with [`StreamError::Aborted`].
    pub fn abort(self) {
        let _ = self.tx.send(Err(StreamError::Aborted));
    }

    /// Returns `true` if nobody is waiting for this settlement anymore.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The awaitable half of a settlement.
///
/// Resolves immediately when polled after settlement. If the settler was
/// aborted or dropped, resolves to [`StreamError::Aborted`].
#[must_use = "settlements do nothing unless awaited"]
#[derive(Debug)]
pub struct Settlement<T> {
    state: State<T>,
}

// The outcome is moved out, never pinned.
impl<T> Unpin for Settlement<T> {}

#[derive(Debug)]
enum State<T> {
    Pending(oneshot::Receiver<Outcome<T>>),
    Settled(Option<Outcome<T>>),
}

impl<T> Settlement<T> {
    /// Creates a settlement that is already settled with `outcome`.
    pub fn settled(outcome: Outcome<T>) -> Self {
        Self {
            state: State::Settled(Some(outcome)),
        }
    }

    /// Takes the outcome without suspending, if the settlement has settled.
    pub fn try_take(&mut self) -> Option<Outcome<T>> {
        match &mut self.state {
            State::Settled(outcome) => outcome.take(),
            State::Pending(rx) => match rx.try_recv() {
                Ok(outcome) => {
                    self.state = State::Settled(None);
                    Some(outcome)
                }
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.state = State::Settled(None);
                    Some(Err(StreamError::Aborted))
                }
            },
        }
    }
}

impl<T> Future for Settlement<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            // Polling again after completion reports an abort rather than panicking.
            State::Settled(outcome) => Poll::Ready(outcome.take().unwrap_or(Err(StreamError::Aborted))),
            State::Pending(rx) => {
                let outcome = match Pin::new(rx).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(outcome)) => outcome,
                    Poll::Ready(Err(_)) => Err(StreamError::Aborted),
                };
                this.state = State::Settled(None);
                Poll::Ready(outcome)
            }
        }
    }
}
