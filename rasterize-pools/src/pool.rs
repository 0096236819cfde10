use std::{
    borrow::Cow,
    ops::Deref,
    sync::Arc,
    time::{Duration, Instant},
};

use opentelemetry::KeyValue;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, debug_span, warn};

use crate::{
    error::Error,
    factory::ResourceFactory,
    lease::Lease,
    metrics::{pool_kv, Metrics, PoolState, POOL_METRICS},
};

/// Default interval between gatherings of pool state metrics.
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// How long an acquisition may wait for a free slot.
#[derive(Clone, Copy, Debug)]
enum Wait {
    /// Fail instantly.
    Never,
    /// Wait until the deadline.
    Until(Instant),
    /// Wait as long as needed.
    Forever,
}

/// Pool bookkeeping, guarded by the pool lock.
struct Slots<R> {
    /// Resources owned by the pool and available for lending.
    idle: Vec<R>,
    /// Resources currently owned by a [`Lease`].
    lent: usize,
    /// Reserved slots for which the factory is running.
    creating: usize,
    /// Resources ever created.
    created: u64,
    /// Resources ever discarded.
    discarded: u64,
}

impl<R> Slots<R> {
    fn total(&self) -> usize {
        self.idle.len() + self.lent + self.creating
    }

    fn has_room(&self, max_size: Option<usize>) -> bool {
        max_size.map_or(true, |max| self.total() < max)
    }
}

/// Outcome of a successful attempt to take a slot.
enum Checkout<R> {
    /// Idle resource was taken.
    Idle(R),
    /// A creation slot was reserved.
    Reserved,
}

/// Creation slot held while the factory runs.
///
/// Dropping it gives the slot back, also when the factory panics.
struct Reservation<'p, F: ResourceFactory> {
    pool: &'p ResourcePool<F>,
}

impl<F: ResourceFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        self.pool.slots.lock().creating -= 1;
        self.pool.available.notify_one();
    }
}

/// Thread-safe pool of lazily created resources.
///
/// Resources are lent out exclusively: an acquired resource is moved into a [`Lease`] and is
/// invisible to the pool and to other callers until the lease is dropped.
///
/// # Creation policy
///
/// The pool lock is never held while the factory runs. A caller that finds no idle resource
/// reserves a slot, releases the lock and creates the resource on its own. Concurrent first
/// use may thus create several resources at once, up to [`PoolBuilder::max_size`].
pub struct ResourcePool<F: ResourceFactory> {
    /// Resource factory.
    factory: F,
    /// Maximum number of live resources.
    max_size: Option<usize>,
    /// Pool label.
    label: [KeyValue; 1],
    /// Linked metrics storage.
    metrics: Arc<Metrics>,
    /// Interval between gatherings of pool state metrics.
    probe_interval: Duration,
    /// Time of last gathering of pool state metrics.
    last_gathered_at: Mutex<Instant>,
    /// Idle resources and counters.
    slots: Mutex<Slots<F::Resource>>,
    /// Signalled whenever a slot becomes available.
    available: Condvar,
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create a pool with default settings.
    pub fn new(factory: F) -> Self {
        Self::builder(factory).build()
    }

    /// Create a builder for a pool using provided factory.
    pub fn builder(factory: F) -> PoolBuilder<F> {
        PoolBuilder::new(factory)
    }

    /// Get pool label.
    pub fn label(&self) -> Cow<'_, str> {
        self.label[0].value.as_str()
    }

    /// Get factory used by this pool.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Acquire a resource, waiting for a free slot if the pool is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Create`] if a new resource was needed and the factory failed.
    pub fn get(&self) -> Result<Lease<'_, F>, Error<F::Error>> {
        self.acquire(Wait::Forever, "pool_acquire")
    }

    /// Acquire a resource without waiting for a free slot.
    ///
    /// A new resource is still created if there is room for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if all slots are taken, or [`Error::Create`] if the
    /// factory failed.
    pub fn try_get(&self) -> Result<Lease<'_, F>, Error<F::Error>> {
        self.acquire(Wait::Never, "pool_try_acquire")
    }

    /// Acquire a resource, waiting for a free slot for a bounded time.
    ///
    /// The timeout only covers waiting for a slot, not resource creation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AcquireTimeout`] if waiting time was exhausted, or [`Error::Create`]
    /// if the factory failed.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Lease<'_, F>, Error<F::Error>> {
        let wait = Instant::now()
            .checked_add(timeout)
            .map_or(Wait::Forever, Wait::Until);
        self.acquire(wait, "pool_timed_acquire")
    }

    /// Get current pool bookkeeping.
    pub fn state(&self) -> PoolState {
        Self::snapshot(self.max_size, &self.slots.lock())
    }

    /// Manually update pool metrics.
    ///
    /// Normally you wouldn't need to call this directly, as metrics collection occurs
    /// automatically as you use the pool.
    pub fn update_metrics(&self) {
        let mut last_gathered_at = self.last_gathered_at.lock();
        if last_gathered_at.elapsed() > self.probe_interval {
            *last_gathered_at = Instant::now();
            drop(last_gathered_at);
            self.metrics.record_state(&self.label, &self.state());
        }
    }

    fn snapshot(max_size: Option<usize>, slots: &Slots<F::Resource>) -> PoolState {
        PoolState {
            max_size,
            size: slots.total(),
            idle: slots.idle.len(),
            in_use: slots.lent,
            creating: slots.creating,
            created: slots.created,
            discarded: slots.discarded,
        }
    }

    fn acquire(&self, wait: Wait, span_name: &'static str) -> Result<Lease<'_, F>, Error<F::Error>> {
        let now = Instant::now();
        let span = debug_span!("pool_acquire", op = span_name, name = self.label().as_ref())
            .entered();
        let resource = match self.checkout(wait)? {
            Checkout::Idle(resource) => resource,
            Checkout::Reserved => self.create()?,
        };
        drop(span);
        self.metrics
            .wait_time
            .record(now.elapsed().as_secs_f64(), &self.label);
        self.update_metrics();
        Ok(Lease::new(self, resource))
    }

    /// Take an idle resource or reserve a creation slot.
    fn checkout(&self, wait: Wait) -> Result<Checkout<F::Resource>, Error<F::Error>> {
        let mut slots = self.slots.lock();
        loop {
            if let Some(resource) = slots.idle.pop() {
                slots.lent += 1;
                return Ok(Checkout::Idle(resource));
            }
            if slots.has_room(self.max_size) {
                slots.creating += 1;
                return Ok(Checkout::Reserved);
            }
            match wait {
                Wait::Never => return Err(Error::PoolExhausted),
                Wait::Forever => self.available.wait(&mut slots),
                Wait::Until(deadline) => {
                    if self.available.wait_until(&mut slots, deadline).timed_out()
                        && slots.idle.is_empty()
                        && !slots.has_room(self.max_size)
                    {
                        return Err(Error::AcquireTimeout);
                    }
                }
            }
        }
    }

    /// Run the factory for a previously reserved slot.
    fn create(&self) -> Result<F::Resource, Error<F::Error>> {
        let reservation = Reservation { pool: self };
        let started = Instant::now();
        let created = self.factory.create();
        self.metrics
            .create_time
            .record(started.elapsed().as_secs_f64(), &self.label);
        match created {
            Ok(resource) => {
                std::mem::forget(reservation);
                let mut slots = self.slots.lock();
                slots.creating -= 1;
                slots.lent += 1;
                slots.created += 1;
                debug!(created = slots.created, "created new pooled resource");
                Ok(resource)
            }
            Err(err) => {
                drop(reservation);
                self.metrics.create_errors.add(1, &self.label);
                warn!(error = %err, "pooled resource creation failed");
                Err(Error::Create(err))
            }
        }
    }

    /// Return a lent resource to the idle set.
    pub(crate) fn checkin(&self, resource: F::Resource) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.lent > 0, "resource returned to a pool it was not lent from");
        slots.lent -= 1;
        slots.idle.push(resource);
        drop(slots);
        self.available.notify_one();
    }

    /// Forget a lent resource and destroy it.
    pub(crate) fn discard(&self, resource: F::Resource) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.lent > 0, "resource discarded by a pool it was not lent from");
        slots.lent -= 1;
        slots.discarded += 1;
        drop(slots);
        self.available.notify_one();
        self.metrics.discarded.add(1, &self.label);
        debug!("discarding pooled resource");
        drop(resource);
    }

    pub(crate) fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub(crate) fn label_kv(&self) -> &[KeyValue; 1] {
        &self.label
    }
}

impl<F: ResourceFactory> std::fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("label", &self.label())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourcePool`].
#[must_use]
pub struct PoolBuilder<F> {
    factory: F,
    max_size: Option<usize>,
    label: Option<Cow<'static, str>>,
    probe_interval: Duration,
}

impl<F: ResourceFactory> PoolBuilder<F> {
    fn new(factory: F) -> Self {
        Self {
            factory,
            max_size: None,
            label: None,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Limit the number of live resources.
    ///
    /// Pools are unbounded by default. A bound of zero is treated as one.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size.max(1));
        self
    }

    /// Set or clear the resource limit.
    pub fn max_size_opt(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size.map(|max| max.max(1));
        self
    }

    /// Set pool label used in metrics and traces.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set interval between gatherings of pool state metrics.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Build the pool.
    ///
    /// No resources are created until the first acquisition.
    pub fn build(self) -> ResourcePool<F> {
        let label = pool_kv(self.label);
        let metrics = POOL_METRICS.deref().clone();
        let slots = Slots {
            idle: Vec::new(),
            lent: 0,
            creating: 0,
            created: 0,
            discarded: 0,
        };
        metrics.record_state(&label, &ResourcePool::<F>::snapshot(self.max_size, &slots));
        ResourcePool {
            factory: self.factory,
            max_size: self.max_size,
            label,
            metrics,
            probe_interval: self.probe_interval,
            last_gathered_at: Mutex::new(Instant::now()),
            slots: Mutex::new(slots),
            available: Condvar::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        panic::{self, AssertUnwindSafe},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    /// Factory producing sequentially numbered resources, failing on selected calls.
    struct Counter {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: Some(call),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ResourceFactory for Counter {
        type Resource = usize;
        type Error = io::Error;

        fn create(&self) -> Result<usize, io::Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(io::Error::other(format!("creation {call} failed")));
            }
            Ok(call)
        }
    }

    /// Lazy creation - nothing is built before first use.
    #[test]
    fn lazy_creation() {
        let pool = ResourcePool::new(Counter::new());
        assert_eq!(pool.factory().calls(), 0);
        assert_eq!(pool.state(), PoolState::default());
        let res = pool.get().unwrap();
        assert_eq!(*res, 1);
        assert_eq!(pool.state().in_use, 1);
    }

    /// Release and reacquire from a single thread reuses the same resource.
    #[test]
    fn reuse_after_release() {
        let pool = ResourcePool::new(Counter::new());
        for _ in 0..10 {
            let res = pool.get().unwrap();
            assert_eq!(*res, 1);
            res.release();
        }
        assert_eq!(pool.factory().calls(), 1);
        let state = pool.state();
        assert_eq!(state.idle, 1);
        assert_eq!(state.in_use, 0);
        assert_eq!(state.created, 1);
    }

    /// Two live leases never share a resource.
    #[test]
    fn distinct_live_leases() {
        let pool = ResourcePool::new(Counter::new());
        let first = pool.get().unwrap();
        let second = pool.get().unwrap();
        assert_ne!(*first, *second);
        assert_eq!(pool.state().in_use, 2);
        drop(first);
        let third = pool.get().unwrap();
        assert_eq!(*third, 1);
        assert_eq!(pool.factory().calls(), 2);
    }

    /// Factory failure is reported, and the next acquisition creates cleanly.
    #[test]
    fn creation_failure_isolation() {
        let pool = ResourcePool::new(Counter::failing_on(1));
        let err = pool.get().unwrap_err();
        assert!(matches!(err, Error::Create(_)));
        assert_eq!(err.creation_error().unwrap().to_string(), "creation 1 failed");
        assert_eq!(pool.state(), PoolState::default());
        let res = pool.get().unwrap();
        assert_eq!(*res, 2);
        let state = pool.state();
        assert_eq!(state.size, 1);
        assert_eq!(state.created, 1);
    }

    /// Failed creation does not consume a slot of a bounded pool.
    #[test]
    fn creation_failure_frees_slot() {
        let pool = ResourcePool::builder(Counter::failing_on(1))
            .max_size(1)
            .build();
        assert!(pool.try_get().is_err());
        assert_eq!(*pool.try_get().unwrap(), 2);
    }

    /// Panicking factory gives its reserved slot back.
    #[test]
    fn creation_panic_frees_slot() {
        let calls = AtomicUsize::new(0);
        let pool = ResourcePool::builder(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("driver crashed");
            }
            Ok::<_, io::Error>(7_usize)
        })
        .max_size(1)
        .build();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pool.get().map(|_| ())));
        assert!(outcome.is_err());
        let state = pool.state();
        assert_eq!((state.size, state.creating, state.created), (0, 0, 0));
        assert_eq!(*pool.try_get().unwrap(), 7);
    }

    /// Timeout too large to represent means waiting without a deadline.
    #[test]
    fn unbounded_timeout() {
        let pool = ResourcePool::builder(Counter::new()).max_size(1).build();
        assert_eq!(*pool.get_timeout(Duration::MAX).unwrap(), 1);
    }

    /// Non-blocking acquisition on a full pool.
    #[test]
    fn try_get_exhausted() {
        let pool = ResourcePool::builder(Counter::new()).max_size(2).build();
        let first = pool.try_get().unwrap();
        let _second = pool.try_get().unwrap();
        assert!(matches!(pool.try_get(), Err(Error::PoolExhausted)));
        drop(first);
        assert_eq!(*pool.try_get().unwrap(), 1);
    }

    /// Timed acquisition on a full pool.
    #[test]
    fn get_timeout_expires() {
        let pool = ResourcePool::builder(Counter::new()).max_size(1).build();
        let _held = pool.get().unwrap();
        let started = Instant::now();
        let err = pool.get_timeout(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::AcquireTimeout));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    /// Discarded resources are destroyed and their slot is freed.
    #[test]
    fn discard_frees_slot() {
        let pool = ResourcePool::builder(Counter::new()).max_size(1).build();
        let res = pool.get().unwrap();
        res.discard();
        let state = pool.state();
        assert_eq!(state.size, 0);
        assert_eq!(state.discarded, 1);
        assert_eq!(*pool.try_get().unwrap(), 2);
    }

    /// Closures are accepted as factories.
    #[test]
    fn closure_factory() {
        let pool = ResourcePool::builder(|| Ok::<_, io::Error>(String::from("ctx")))
            .label("closures")
            .build();
        assert_eq!(pool.label(), "closures");
        let mut res = pool.get().unwrap();
        res.push_str("-1");
        drop(res);
        assert_eq!(*pool.get().unwrap(), "ctx-1");
    }

    /// Zero bound is clamped.
    #[test]
    fn zero_max_size() {
        let pool = ResourcePool::builder(Counter::new()).max_size(0).build();
        assert_eq!(pool.state().max_size, Some(1));
        assert!(pool.try_get().is_ok());
    }
}
