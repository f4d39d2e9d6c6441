//! Lifecycle hooks the pool uses to manage its objects.

use async_trait::async_trait;

use crate::error::PoolError;

/// Creates, validates and destroys the objects held by an
/// [`ObjectPool`](crate::pool::ObjectPool).
///
/// One implementation per connection type. The pool owns retry decisions;
/// a factory only reports what happened to a single object.
#[async_trait]
pub trait PooledObjectFactory: Send + Sync + 'static {
    type Object: Send + Sync + 'static;

    /// Build a new object bound to an endpoint of the factory's choosing.
    async fn make_object(&self) -> Result<Self::Object, PoolError>;

    /// Release the object's resources. Must tolerate an already-closed object.
    async fn destroy_object(&self, obj: Self::Object);

    /// Side-effect free liveness check. Any error means `false`.
    async fn validate_object(&self, obj: &Self::Object) -> bool;

    /// Called before an idle object is handed to a borrower.
    async fn activate_object(&self, _obj: &mut Self::Object) -> Result<(), PoolError> {
        Ok(())
    }

    /// Called when a borrowed object is returned, before it goes idle.
    async fn passivate_object(&self, _obj: &mut Self::Object) -> Result<(), PoolError> {
        Ok(())
    }
}
