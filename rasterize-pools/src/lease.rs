//! Exclusive ownership of pooled resources.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    time::Instant,
};

use crate::{factory::ResourceFactory, pool::ResourcePool};

/// Resource lent out by a [`ResourcePool`].
///
/// The lease owns the resource until it is dropped, at which point the resource goes back to
/// the pool's idle set. Use [`Lease::discard`] for resources that must not be reused.
#[must_use = "dropping a lease immediately returns the resource to the pool"]
pub struct Lease<'p, F: ResourceFactory> {
    /// Originating pool.
    pool: &'p ResourcePool<F>,
    /// Retrieval time.
    time: Instant,
    /// Lent resource. Only `None` while the lease is being consumed.
    resource: Option<F::Resource>,
}

impl<'p, F: ResourceFactory> Lease<'p, F> {
    pub(crate) fn new(pool: &'p ResourcePool<F>, resource: F::Resource) -> Self {
        Self {
            pool,
            // This is different from time used in wait_time metric.
            time: Instant::now(),
            resource: Some(resource),
        }
    }

    /// Return the resource to the pool.
    ///
    /// Same as dropping the lease.
    pub fn release(self) {}

    /// Destroy the resource instead of returning it to the pool.
    ///
    /// Frees up a slot in a bounded pool. Use this when the resource became permanently broken,
    /// for example after losing its graphics context.
    pub fn discard(mut self) {
        if let Some(resource) = self.resource.take() {
            self.record_use_time();
            self.pool.discard(resource);
        }
    }

    /// Get the pool this resource was acquired from.
    pub fn pool(&self) -> &'p ResourcePool<F> {
        self.pool
    }

    fn record_use_time(&self) {
        // Record time spent outside the pool.
        self.pool
            .metrics()
            .use_time
            .record(self.time.elapsed().as_secs_f64(), self.pool.label_kv());
    }
}

impl<F: ResourceFactory> Deref for Lease<'_, F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource
            .as_ref()
            .expect("lease resource is present until drop")
    }
}

impl<F: ResourceFactory> DerefMut for Lease<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource
            .as_mut()
            .expect("lease resource is present until drop")
    }
}

impl<F: ResourceFactory> AsRef<F::Resource> for Lease<'_, F> {
    fn as_ref(&self) -> &F::Resource {
        self
    }
}

impl<F: ResourceFactory> AsMut<F::Resource> for Lease<'_, F> {
    fn as_mut(&mut self) -> &mut F::Resource {
        self
    }
}

impl<F> fmt::Debug for Lease<'_, F>
where
    F: ResourceFactory,
    F::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("pool", &self.pool.label())
            .field("resource", &self.resource)
            .finish()
    }
}

impl<F: ResourceFactory> Drop for Lease<'_, F> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.record_use_time();
            self.pool.checkin(resource);
        }
    }
}
