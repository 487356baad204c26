//! Bounded pool of reusable upstream client handles.
//!
//! The pool favours availability over a strict cap. When no idle handle is
//! left, [`ClientPool::acquire`] builds an overflow handle instead of making
//! the caller wait. On release a handle goes back to the idle set only while
//! that set holds fewer than `pool_size` handles; otherwise it is dropped.
//! In steady state the pool therefore never keeps more than `pool_size` idle
//! handles, although more may exist for a moment under burst load.
//!
//! Handles are only reachable through a [`PooledClient`] guard, which returns
//! the handle on every exit path, including errors and cancelled futures.
//!
//! ```
//! use hotel_kit::pool::ClientPool;
//! use hotel_kit::upstream::{HotelsApi, StaticClientFactory};
//! use hotel_kit::models::HotelsListRequest;
//!
//! # async fn example() -> hotel_kit::Result<()> {
//! let pool = ClientPool::new(StaticClientFactory::default(), 4);
//! {
//!     let client = pool.acquire()?;
//!     client.hotels_by_geocode(&HotelsListRequest::new(48.85, 2.35)).await?;
//! } // handle returned here
//! assert_eq!(pool.stats().idle, 4);
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::upstream::ClientFactory;

/// Pool statistics information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Handles constructed over the pool's lifetime, eager ones included.
    pub created: usize,
    pub overflow_created: usize,
}

/// Pool of upstream handles built by a [`ClientFactory`].
pub struct ClientPool<F: ClientFactory> {
    factory: F,
    idle: Mutex<Vec<F::Client>>,
    pool_size: usize,
    closed: AtomicBool,
    in_use: AtomicUsize,
    created: AtomicUsize,
    overflow_created: AtomicUsize,
    drained: Notify,
}

impl<F: ClientFactory> ClientPool<F> {
    /// Create the pool and eagerly build `pool_size` handles (minimum 1).
    pub fn new(factory: F, pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        let idle: Vec<F::Client> = (0..pool_size).map(|_| factory.create()).collect();

        info!("✓ Client pool initialized with {} handles", pool_size);

        ClientPool {
            factory,
            idle: Mutex::new(idle),
            pool_size,
            closed: AtomicBool::new(false),
            in_use: AtomicUsize::new(0),
            created: AtomicUsize::new(pool_size),
            overflow_created: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<F::Client>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow a handle for one call.
    ///
    /// Pops an idle handle if there is one, otherwise builds an overflow
    /// handle. Never waits.
    ///
    /// # Errors
    ///
    /// Returns `Error::PoolShutdown` once [`shutdown`](Self::shutdown) has begun.
    pub fn acquire(&self) -> Result<PooledClient<'_, F>> {
        let pooled = {
            let mut idle = self.lock();
            // Checked under the lock so shutdown cannot miss this borrow
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::PoolShutdown);
            }
            self.in_use.fetch_add(1, Ordering::SeqCst);
            idle.pop()
        };

        let (client, overflow) = match pooled {
            Some(client) => {
                debug!("Pool ACQUIRE -> idle handle");
                (client, false)
            }
            None => {
                self.created.fetch_add(1, Ordering::SeqCst);
                self.overflow_created.fetch_add(1, Ordering::SeqCst);
                debug!("Pool ACQUIRE -> overflow handle (pool empty)");
                (self.factory.create(), true)
            }
        };

        Ok(PooledClient {
            pool: self,
            client: Some(client),
            overflow,
        })
    }

    fn release(&self, client: F::Client) {
        {
            let mut idle = self.lock();
            if !self.closed.load(Ordering::SeqCst) && idle.len() < self.pool_size {
                idle.push(client);
                debug!("Pool RELEASE -> returned to idle set");
            } else {
                drop(client);
                debug!("Pool RELEASE -> handle dropped (pool full or closed)");
            }
        }

        if self.in_use.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Stop handing out handles, wait for borrowed ones to come back, then
    /// drop every pooled handle.
    ///
    /// New [`acquire`](Self::acquire) calls fail as soon as this starts.
    pub async fn shutdown(&self) {
        {
            let _idle = self.lock();
            self.closed.store(true, Ordering::SeqCst);
        }
        info!("Client pool shutting down");

        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            let outstanding = self.in_use.load(Ordering::SeqCst);
            if outstanding == 0 {
                break;
            }
            debug!("Waiting for {} borrowed handles", outstanding);
            drained.await;
        }

        let released = {
            let mut idle = self.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        info!("✓ Client pool shut down, released {} idle handles", released);
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let idle = self.lock().len();
        PoolStats {
            pool_size: self.pool_size,
            idle,
            in_use: self.in_use.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            overflow_created: self.overflow_created.load(Ordering::SeqCst),
        }
    }
}

/// Scoped borrow of a pooled handle. Returned to the pool on drop.
pub struct PooledClient<'a, F: ClientFactory> {
    pool: &'a ClientPool<F>,
    client: Option<F::Client>,
    overflow: bool,
}

impl<F: ClientFactory> PooledClient<'_, F> {
    /// Whether this handle was built because the pool was empty.
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }
}

impl<F: ClientFactory> Deref for PooledClient<'_, F> {
    type Target = F::Client;

    fn deref(&self) -> &F::Client {
        match &self.client {
            Some(client) => client,
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl<F: ClientFactory> Drop for PooledClient<'_, F> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
