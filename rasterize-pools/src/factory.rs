//! Resource construction.

/// Constructs new resources for a [`ResourcePool`](crate::ResourcePool).
///
/// A factory is a value object holding all configuration needed to build a resource. It is
/// owned by the pool and never sees any pool state.
///
/// Implementations must not acquire resources from the pool that owns them.
pub trait ResourceFactory {
    /// Resource type created by this factory.
    type Resource: Send;
    /// Error returned when resource creation fails.
    type Error: std::error::Error + Send + 'static;

    /// Create a new resource.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the resource could not be constructed.
    fn create(&self) -> Result<Self::Resource, Self::Error>;
}

impl<F, R, E> ResourceFactory for F
where
    F: Fn() -> Result<R, E>,
    R: Send,
    E: std::error::Error + Send + 'static,
{
    type Resource = R;
    type Error = E;

    fn create(&self) -> Result<R, E> {
        self()
    }
}
