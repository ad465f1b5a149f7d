//! Single-flight lazy values.
//!
//! The first caller starts the computation; callers arriving while it is in
//! flight await the same shared future and observe the same outcome. A
//! success is cached forever, a failure leaves the cell empty so the next
//! caller retries.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

enum Slot<T, E> {
    Empty,
    Pending(Shared<BoxFuture<'static, Result<T, E>>>),
    Ready(T),
}

/// A lazily computed value shared between concurrent callers.
pub struct SingleFlight<T, E> {
    slot: Mutex<Slot<T, E>>,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// The cached value, if a computation has succeeded.
    pub async fn get(&self) -> Option<T> {
        match &*self.slot.lock().await {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether a computation is currently in flight.
    pub async fn is_pending(&self) -> bool {
        matches!(&*self.slot.lock().await, Slot::Pending(_))
    }

    /// Return the cached value or join/start the computation.
    ///
    /// `init` is only invoked when no value is cached and nothing is in flight.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Pending(flight) => flight.clone(),
                Slot::Empty => {
                    let flight = init().boxed().shared();
                    *slot = Slot::Pending(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        // Whichever waiter gets here first settles the slot; the rest see
        // that it no longer holds this flight and leave it alone.
        let mut slot = self.slot.lock().await;
        if let Slot::Pending(current) = &*slot
            && current.ptr_eq(&flight)
        {
            *slot = match &result {
                Ok(value) => Slot::Ready(value.clone()),
                Err(_) => Slot::Empty,
            };
        }

        result
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
