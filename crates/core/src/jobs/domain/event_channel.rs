use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::jobs::domain::job::JobEvent;

/// Bounded FIFO of job events.
///
/// `push` never blocks: when the buffer is full the oldest event is dropped
/// to make room. Clones share the same queue, and an event is delivered to
/// exactly one reader.
#[derive(Clone)]
pub struct EventChannel {
    tx: Sender<JobEvent>,
    rx: Receiver<JobEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn push(&self, event: JobEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        log::debug!("Event channel full, dropped oldest event");
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<JobEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
