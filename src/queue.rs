// queue.rs
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::events::RawDriverEvent;

/// Per-device FIFO between the pump thread (producer) and whichever thread
/// drains the device via `update` (consumer).
///
/// Unbounded: `push` never blocks the pump thread and never fails, `try_pop`
/// never blocks the consumer. Ordering among events pushed by the single
/// producer is preserved.
pub struct EventQueue {
    tx: Sender<RawDriverEvent>,
    rx: Receiver<RawDriverEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, event: RawDriverEvent) {
        // send on an unbounded channel only fails when the receiver is gone,
        // and we hold both ends
        let _ = self.tx.send(event);
    }

    pub fn try_pop(&self) -> Option<RawDriverEvent> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
