use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::connection::{Backend, RawConnection};
use crate::error::{Error, Result};
use crate::pool::{PoolConnection, PoolOptions};

/// Connections older than this are destroyed on release regardless of
/// configuration; long-lived server-side state (prepared statements, temp
/// tables) should not outlive this.
const MAX_CONN_AGE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
pub(crate) struct LiveConn {
    pub(crate) raw: Box<dyn RawConnection>,
    pub(crate) created: Instant,
}

#[derive(Debug)]
struct IdleConn {
    live: LiveConn,
    since: Instant,
}

/// State shared by every handle of one pool.
///
/// The semaphore carries `max_size` permits and is the single wait point:
/// waiters queue FIFO, and a permit holder owns at most one connection. The
/// idle queue sits behind a plain mutex; it is only touched briefly.
#[derive(Debug)]
pub(crate) struct PoolInner {
    backend: Box<dyn Backend>,
    options: PoolOptions,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn>>,
    size: AtomicU32,
    closed: AtomicBool,
}

impl PoolInner {
    pub(crate) async fn new(backend: Box<dyn Backend>, options: PoolOptions) -> Result<Arc<Self>> {
        options.validate()?;

        let pool = Arc::new(PoolInner {
            backend,
            semaphore: Arc::new(Semaphore::new(options.max_size as usize)),
            idle: Mutex::new(VecDeque::new()),
            size: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            options,
        });

        for _ in 0..pool.options.min_size {
            if !pool.try_grow() {
                break;
            }
            match pool.backend.connect().await {
                Ok(raw) => pool.push_idle(LiveConn {
                    raw,
                    created: Instant::now(),
                }),
                Err(e) => {
                    pool.shrink();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    pub(crate) fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub(crate) fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn num_idle(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<PoolConnection> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let started = Instant::now();
        match timeout(self.options.acquire_timeout, self.acquire_inner()).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "gave up waiting for a connection after {:?} (size: {}, idle: {})",
                    started.elapsed(),
                    self.size(),
                    self.num_idle()
                );
                Err(Error::PoolTimeout)
            }
        }
    }

    async fn acquire_inner(self: &Arc<Self>) -> Result<PoolConnection> {
        // FIFO: the semaphore queues waiters in arrival order
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        loop {
            if self.is_closed() {
                return Err(Error::PoolClosed);
            }

            if let Some(idle) = self.pop_idle() {
                if let Some(live) = self.validate(idle).await {
                    return Ok(PoolConnection::new(Arc::clone(self), live, permit));
                }
                continue;
            }

            if self.try_grow() {
                return match self.backend.connect().await {
                    Ok(raw) => {
                        log::trace!("opened connection {} of {}", self.size(), self.options.max_size);
                        Ok(PoolConnection::new(
                            Arc::clone(self),
                            LiveConn {
                                raw,
                                created: Instant::now(),
                            },
                            permit,
                        ))
                    }
                    Err(e) => {
                        self.shrink();
                        Err(e)
                    }
                };
            }

            // every slot is live but none is idle: a release is in flight
            tokio::task::yield_now().await;
        }
    }

    /// Expiry and liveness checks between the idle queue and a handoff.
    async fn validate(&self, mut idle: IdleConn) -> Option<LiveConn> {
        let expired = idle.live.created.elapsed() > MAX_CONN_AGE
            || self
                .options
                .idle_timeout
                .is_some_and(|limit| idle.since.elapsed() > limit);

        if expired {
            log::trace!("closing expired idle connection");
            self.shrink();
            return None;
        }

        if self.options.validation_on_acquire {
            if let Err(e) = idle.live.raw.ping().await {
                // the other end hung up while the connection sat idle
                log::info!("ping on idle connection failed: {e}");
                self.shrink();
                return None;
            }
        }

        Some(idle.live)
    }

    /// Return a borrowed connection. Unhealthy or senescent connections are
    /// destroyed; the freed slot is re-created on demand by a later acquire.
    pub(crate) fn release(&self, live: LiveConn, healthy: bool) {
        if !healthy || self.is_closed() || live.created.elapsed() > MAX_CONN_AGE {
            if !healthy {
                log::debug!("destroying unhealthy connection instead of pooling it");
            }
            self.shrink();
            return;
        }

        self.push_idle(live);
    }

    pub(crate) async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();

        let drained: Vec<IdleConn> = self.idle.lock().unwrap().drain(..).collect();
        for _ in &drained {
            self.shrink();
        }
        // dropping a connection closes it; in-use connections are destroyed
        // when their guards release into the closed pool
        drop(drained);
    }

    fn pop_idle(&self) -> Option<IdleConn> {
        self.idle.lock().unwrap().pop_front()
    }

    fn push_idle(&self, live: LiveConn) {
        self.idle.lock().unwrap().push_back(IdleConn {
            live,
            since: Instant::now(),
        });
    }

    /// Reserve a live-connection slot; fails when the pool is at `max_size`.
    fn try_grow(&self) -> bool {
        let mut current = self.size.load(Ordering::Acquire);
        loop {
            if current >= self.options.max_size {
                return false;
            }
            match self.size.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn shrink(&self) {
        self.size.fetch_sub(1, Ordering::AcqRel);
    }
}
