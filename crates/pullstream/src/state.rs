//! Handshake state shared between a stream and its writer.

use crate::error::StreamError;
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_lock_released, debug_assert_quiescent, debug_assert_read_consumed,
    debug_assert_single_in_flight,
};
use crate::settlement::{settlement, Outcome, Settlement, Settler};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle of a [`PullStream`](crate::PullStream).
///
/// `Closed` is terminal; a closed stream never resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, producer not yet invoked.
    NotStarted,
    /// The producer has been started and has not finished.
    Running,
    /// The producer finished, failed, or the consumer closed the stream.
    Closed,
}

/// State behind the stream's mutex.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                lifecycle: Lifecycle::NotStarted,
                pending_read: None,
                producer_lock: None,
                parked: None,
                termination: None,
            }),
        })
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock()
    }
}

/// What `register_read` asks the stream to do next.
pub(crate) enum ReadRegistration<T> {
    /// The read was answered without involving the producer.
    Immediate(Settlement<Option<T>>),
    /// First read: the producer must be started.
    Start(Settlement<Option<T>>),
    /// The producer was released from its gate (or is busy elsewhere).
    Resumed(Settlement<Option<T>>),
}

pub(crate) struct State<T> {
    lifecycle: Lifecycle,
    /// The read the producer's next `write` will settle.
    pending_read: Option<Settler<Option<T>>>,
    /// The producer's backpressure gate, held until the next read arrives.
    producer_lock: Option<Settler<()>>,
    /// A written value whose read was dropped before it settled.
    parked: Option<T>,
    /// How the stream ended; reported to every read after closing.
    termination: Option<Outcome<()>>,
}

impl<T> State<T> {
    #[inline]
    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Registers a new read.
    pub(crate) fn register_read(&mut self) -> ReadRegistration<T> {
        if let Some(value) = self.parked.take() {
            trace!("delivering parked value");
            return ReadRegistration::Immediate(Settlement::settled(Ok(Some(value))));
        }

        if self.lifecycle == Lifecycle::Closed {
            return ReadRegistration::Immediate(Settlement::settled(self.closed_outcome()));
        }

        if self
            .pending_read
            .as_ref()
            .is_some_and(|read| !read.is_abandoned())
        {
            warn!("rejecting read: another read is still pending");
            return ReadRegistration::Immediate(Settlement::settled(Err(
                StreamError::ConcurrentRead,
            )));
        }

        // An abandoned pending read is simply replaced.
        let (settler, settlement) = settlement();
        self.pending_read = Some(settler);

        let registration = if self.lifecycle == Lifecycle::NotStarted {
            self.lifecycle = Lifecycle::Running;
            ReadRegistration::Start(settlement)
        } else {
            if let Some(lock) = self.producer_lock.take() {
                trace!("read releases producer lock");
                // The producer may have dropped its gate; nothing to wake then.
                let _ = lock.settle(Ok(()));
            }
            ReadRegistration::Resumed(settlement)
        };

        #[cfg(debug_assertions)]
        debug_assert_lock_released!(true, self.producer_lock.is_some());
        #[cfg(debug_assertions)]
        debug_assert_single_in_flight!(
            self.parked.is_some(),
            self.pending_read.is_some(),
            self.producer_lock.is_some()
        );

        registration
    }

    /// Hands `value` to the pending read and returns the producer's next gate.
    pub(crate) fn accept_write(&mut self, value: T) -> Result<Settlement<()>, StreamError> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(StreamError::Closed);
        }

        let Some(read) = self.pending_read.take() else {
            warn!("producer wrote without a pending read");
            return Err(StreamError::Backpressure);
        };

        if let Err(Ok(Some(value))) = read.settle(Ok(Some(value))) {
            trace!("pending read was abandoned, parking value");
            self.parked = Some(value);
        }

        let (lock, gate) = settlement();
        self.producer_lock = Some(lock);

        #[cfg(debug_assertions)]
        debug_assert_read_consumed!(self.pending_read.is_some(), self.producer_lock.is_some());
        #[cfg(debug_assertions)]
        debug_assert_single_in_flight!(
            self.parked.is_some(),
            self.pending_read.is_some(),
            self.producer_lock.is_some()
        );

        Ok(gate)
    }

    /// Records the producer's outcome and closes the stream.
    ///
    /// The first recorded outcome wins: a producer that ends after the
    /// consumer closed the stream does not overwrite `Closed`.
    pub(crate) fn terminate(&mut self, outcome: Outcome<()>) {
        match &outcome {
            Ok(()) => debug!("producer finished"),
            Err(err) => debug!(error = %err, "producer terminated with error"),
        }

        if self.termination.is_none() {
            self.termination = Some(outcome);
        }
        self.lifecycle = Lifecycle::Closed;

        if let Some(read) = self.pending_read.take() {
            let _ = read.settle(self.closed_outcome());
        }
        self.producer_lock = None;

        #[cfg(debug_assertions)]
        debug_assert_quiescent!(
            true,
            self.pending_read.is_some(),
            self.producer_lock.is_some()
        );
    }

    /// Closes the stream on behalf of the consumer.
    ///
    /// A stream that already terminated keeps its outcome: a clean end still
    /// reads as the end marker, a producer error as that error.
    pub(crate) fn close(&mut self) {
        self.parked = None;
        if self.lifecycle == Lifecycle::Closed {
            return;
        }

        debug!(lifecycle = ?self.lifecycle, "closing stream");
        self.termination = Some(Err(StreamError::Closed));
        self.lifecycle = Lifecycle::Closed;

        if let Some(read) = self.pending_read.take() {
            let _ = read.settle(Err(StreamError::Closed));
        }
        if let Some(lock) = self.producer_lock.take() {
            lock.abort();
        }

        #[cfg(debug_assertions)]
        debug_assert_quiescent!(
            true,
            self.pending_read.is_some(),
            self.producer_lock.is_some()
        );
    }

    fn closed_outcome(&self) -> Outcome<Option<T>> {
        match &self.termination {
            Some(Ok(())) => Ok(None),
            Some(Err(err)) => Err(err.clone()),
            None => Err(StreamError::Closed),
        }
    }
}
