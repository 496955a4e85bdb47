//! Per-fingerprint single-flight.
//!
//! Concurrent callers for the same fingerprint share one computation: the
//! first caller runs it, the rest block until it finishes and receive a clone
//! of its outcome, success or failure. Callers for different fingerprints
//! never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use ditaa_cache::Fingerprint;

/// Table of in-flight computations keyed by fingerprint.
#[derive(Debug)]
pub(crate) struct FlightLocks<V> {
    flights: Mutex<HashMap<Fingerprint, Arc<OnceLock<V>>>>,
}

impl<V> Default for FlightLocks<V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> FlightLocks<V> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `fingerprint` unless a flight for it is already running,
    /// in which case wait for that flight and return its value.
    ///
    /// A finished flight is removed from the table, so callers arriving after
    /// it completed start a new one.
    ///
    /// # Panics
    ///
    /// Panics if the flight table mutex is poisoned.
    pub(crate) fn run(&self, fingerprint: &Fingerprint, f: impl FnOnce() -> V) -> V {
        let flight = {
            let mut flights = self.flights.lock().unwrap();
            Arc::clone(flights.entry(fingerprint.clone()).or_default())
        };

        let value = flight.get_or_init(f).clone();

        let mut flights = self.flights.lock().unwrap();
        if flights
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, &flight))
        {
            flights.remove(fingerprint);
        }
        value
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.flights.lock().unwrap().len()
    }
}
