use crate::measurement::Measurement;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared holder of the latest measurement.
///
/// Cloning is cheap and every clone refers to the same measurement. Readers
/// always get a full copy; writers go through [`Snapshot::update`] so all
/// fields change under one write lock. The lock is never held across I/O.
#[derive(Debug, Clone)]
pub struct Snapshot {
    inner: Arc<RwLock<Measurement>>,
}

impl Snapshot {
    pub fn new(initial: Measurement) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Returns a copy of the current measurement.
    pub fn read(&self) -> Measurement {
        // A poisoned lock still holds a complete value, update never panics halfway
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to the measurement while holding the write lock and
    /// returns a copy of the result.
    pub fn update<F>(&self, f: F) -> Measurement
    where
        F: FnOnce(&Measurement) -> Measurement,
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&guard);
        *guard = next.clone();
        next
    }
}
