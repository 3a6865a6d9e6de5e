//! Coalesces concurrent executions that share a fingerprint.
//!
//! The first caller for a fingerprint starts a flight and registers a
//! shared future; callers arriving while it is unresolved subscribe to that
//! same future instead of issuing their own page requests. Every live
//! subscriber observes progress. A flight keeps fetching while at least one
//! subscriber is uncancelled; once the last subscriber cancels or is
//! dropped, the fetch stops and the flight is forgotten.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use pagination::PageProgress;

use crate::domain::fingerprint::ExecutionFingerprint;

use super::{
    CancellationFlag, ExecutionOrigin, FetchedTable, ProgressCallback, SqlViewExecutionError,
};

pub(super) type FetchResult = Result<FetchedTable, SqlViewExecutionError>;
pub(super) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

type Flights = HashMap<ExecutionFingerprint, FlightEntry>;

/// One caller's interest in a flight.
pub(super) struct Subscriber {
    pub(super) progress: Option<ProgressCallback>,
    pub(super) cancellation: CancellationFlag,
}

struct FlightEntry {
    id: u64,
    shared: SharedFetch,
    subscribers: BTreeMap<u64, Subscriber>,
    next_subscriber: u64,
    pages_fetched: Arc<AtomicU32>,
}

impl FlightEntry {
    fn subscribe(&mut self, subscriber: Subscriber) -> u64 {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.insert(id, subscriber);
        id
    }

    fn is_abandoned(&self) -> bool {
        self.subscribers
            .values()
            .all(|subscriber| subscriber.cancellation.is_cancelled())
    }

    fn is_joinable(&self) -> bool {
        self.shared.peek().is_none() && !self.is_abandoned()
    }
}

#[derive(Default)]
pub(super) struct InFlight {
    flights: Arc<Mutex<Flights>>,
    next_flight: AtomicU64,
}

impl InFlight {
    /// Subscribe to the live flight for `fingerprint`, or start one by
    /// calling `lead` with the handle the new flight reports through.
    pub(super) fn join_or_lead<F>(
        &self,
        fingerprint: &ExecutionFingerprint,
        subscriber: Subscriber,
        lead: F,
    ) -> Subscription
    where
        F: FnOnce(FlightHandle) -> BoxFuture<'static, FetchResult>,
    {
        let mut flights = lock(&self.flights);
        if let Some(entry) = flights
            .get_mut(fingerprint)
            .filter(|entry| entry.is_joinable())
        {
            let subscriber_id = entry.subscribe(subscriber);
            return Subscription {
                flights: Arc::clone(&self.flights),
                fingerprint: fingerprint.clone(),
                flight_id: entry.id,
                subscriber_id,
                shared: entry.shared.clone(),
                pages_fetched: Arc::clone(&entry.pages_fetched),
                origin: ExecutionOrigin::Shared,
            };
        }

        let flight_id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let pages_fetched = Arc::new(AtomicU32::new(0));
        let handle = FlightHandle {
            flights: Arc::clone(&self.flights),
            fingerprint: fingerprint.clone(),
            flight_id,
            pages_fetched: Arc::clone(&pages_fetched),
        };
        let shared = lead(handle).shared();
        let mut entry = FlightEntry {
            id: flight_id,
            shared: shared.clone(),
            subscribers: BTreeMap::new(),
            next_subscriber: 0,
            pages_fetched: Arc::clone(&pages_fetched),
        };
        let subscriber_id = entry.subscribe(subscriber);
        // Any entry replaced here was resolved or abandoned; its remaining
        // subscriptions still hold their own clones.
        let replaced = flights.insert(fingerprint.clone(), entry);
        drop(flights);
        drop(replaced);

        Subscription {
            flights: Arc::clone(&self.flights),
            fingerprint: fingerprint.clone(),
            flight_id,
            subscriber_id,
            shared,
            pages_fetched,
            origin: ExecutionOrigin::Network,
        }
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        lock(&self.flights).len()
    }
}

/// A caller's place in a flight; leaving it unsubscribes.
///
/// Dropping the last subscription of a flight drops the flight's future,
/// which stops any page request still pending.
pub(super) struct Subscription {
    flights: Arc<Mutex<Flights>>,
    fingerprint: ExecutionFingerprint,
    flight_id: u64,
    subscriber_id: u64,
    shared: SharedFetch,
    pages_fetched: Arc<AtomicU32>,
    origin: ExecutionOrigin,
}

impl Subscription {
    /// How this caller relates to the network fetch.
    pub(super) fn origin(&self) -> ExecutionOrigin {
        self.origin
    }

    /// Pages the flight has completed so far.
    pub(super) fn pages_fetched(&self) -> u32 {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// The flight's outcome.
    pub(super) fn outcome(&self) -> SharedFetch {
        self.shared.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = {
            let mut flights = lock(&self.flights);
            let Some(entry) = flights
                .get_mut(&self.fingerprint)
                .filter(|entry| entry.id == self.flight_id)
            else {
                return;
            };
            entry.subscribers.remove(&self.subscriber_id);
            if entry.subscribers.is_empty() {
                flights.remove(&self.fingerprint)
            } else {
                None
            }
        };
        // Dropped outside the lock: this may drop the flight's future.
        drop(removed);
    }
}

/// The leading future's view of its own flight.
pub(super) struct FlightHandle {
    flights: Arc<Mutex<Flights>>,
    fingerprint: ExecutionFingerprint,
    flight_id: u64,
    pages_fetched: Arc<AtomicU32>,
}

impl FlightHandle {
    /// Record `progress` and pass it to every uncancelled subscriber.
    pub(super) fn report(&self, progress: PageProgress) {
        self.pages_fetched
            .store(progress.pages_fetched, Ordering::SeqCst);
        let callbacks: Vec<ProgressCallback> = {
            let flights = lock(&self.flights);
            self.entry(&flights)
                .map(|entry| {
                    entry
                        .subscribers
                        .values()
                        .filter(|subscriber| !subscriber.cancellation.is_cancelled())
                        .filter_map(|subscriber| subscriber.progress.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        // Callbacks run unlocked so they may start executions of their own.
        for callback in callbacks {
            callback(progress);
        }
    }

    /// Whether no subscriber still wants the result.
    pub(super) fn is_abandoned(&self) -> bool {
        let flights = lock(&self.flights);
        self.entry(&flights).is_none_or(FlightEntry::is_abandoned)
    }

    /// Forget the flight so later callers start afresh.
    pub(super) fn complete(&self) {
        let removed = {
            let mut flights = lock(&self.flights);
            if self.entry(&flights).is_some() {
                flights.remove(&self.fingerprint)
            } else {
                None
            }
        };
        drop(removed);
    }

    fn entry<'a>(&self, flights: &'a Flights) -> Option<&'a FlightEntry> {
        flights
            .get(&self.fingerprint)
            .filter(|entry| entry.id == self.flight_id)
    }
}

fn lock(flights: &Mutex<Flights>) -> MutexGuard<'_, Flights> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}
