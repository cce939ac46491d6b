//! A minimal signal/slot fan-out primitive, used to notify
//! interested subscribers — a manager's SOR/EOR hooks, a transport
//! publisher — without the emitter knowing who's listening.

use std::sync::{Arc, RwLock};

type Slot<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A fan-out point for values of type `T`. Connected slots run in
/// connection order, synchronously, on the emitting thread — callers that
/// need async or cross-thread delivery wrap their own slot in whatever
/// bridges that (e.g. a channel sender).
pub struct Signal<T> {
    slots: RwLock<Vec<Slot<T>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `slot`, returning a token that [`Signal::disconnect`]
    /// accepts to remove it again.
    pub fn connect(&self, slot: impl Fn(&T) + Send + Sync + 'static) -> usize {
        let mut slots = self.slots.write().unwrap();
        slots.push(Arc::new(slot));
        slots.len() - 1
    }

    pub fn disconnect(&self, token: usize) {
        let mut slots = self.slots.write().unwrap();
        if token < slots.len() {
            slots.remove(token);
        }
    }

    pub fn emit(&self, value: &T) {
        let slots: Vec<_> = self.slots.read().unwrap().clone();
        for slot in slots {
            slot(value);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.slots.read().unwrap().len()
    }
}
