// signal.rs
use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, Weak},
};

use tracing::error;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    // BTreeMap so emit walks handlers in registration order
    handlers: BTreeMap<u64, Handler<T>>,
}

/// Multi-subscriber broadcast channel for one event kind.
///
/// `emit` invokes all current handlers synchronously, in registration order,
/// on the emitting thread. A snapshot of the handler list is taken before
/// any handler runs, so subscribing or unsubscribing from inside a handler
/// is safe and takes effect on the next emit.
///
/// A panicking handler is caught, reported, and does not stop delivery to
/// the remaining handlers.
pub struct Signal<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                handlers: BTreeMap::new(),
            })),
        }
    }

    /// Register a handler; the returned token unsubscribes it.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let id = slots.next_id;
            slots.next_id += 1;
            slots.handlers.insert(id, Arc::new(handler));
            id
        };

        let weak = Arc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = Weak::upgrade(&weak) {
                let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
                slots.handlers.remove(&id);
            }
        })
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.handlers.values().cloned().collect()
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                error!("signal handler panicked; continuing with remaining handlers");
            }
        }
    }

    /// Number of currently registered handlers.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Token for one registered handler. Dropping the token keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_in_registration_order() {
        let sig: Signal<u32> = Signal::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let _keep = sig.subscribe(move |v: &u32| {
                seen.lock().unwrap().push(format!("{tag}{v}"));
            });
        }

        sig.emit(&1);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let sig: Signal<u32> = Signal::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let sub = sig.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = Arc::clone(&hits);
        let _keep = sig.subscribe(move |_| {
            h2.fetch_add(10, Ordering::SeqCst);
        });

        sig.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        sub.unsubscribe();
        assert_eq!(sig.len(), 1);

        sig.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn subscribing_from_inside_a_handler_does_not_deadlock() {
        let sig: Arc<Signal<u32>> = Arc::new(Signal::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_sig = Arc::clone(&sig);
        let inner_hits = Arc::clone(&hits);
        let _keep = sig.subscribe(move |_| {
            let h = Arc::clone(&inner_hits);
            // takes effect on the next emit, not this one
            let _ = inner_sig.subscribe(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        });

        sig.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sig.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let sig: Signal<u32> = Signal::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _a = sig.subscribe(|_| panic!("bad handler"));
        let h = Arc::clone(&hits);
        let _b = sig.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        sig.emit(&0);
        std::panic::set_hook(prev);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
