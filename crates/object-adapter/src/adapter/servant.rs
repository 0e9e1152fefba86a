//! Servant trait and servant identity

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;

use crate::types::{ObjectId, Result};

/// Trait for implementation objects served by an adapter
///
/// Servants are owned by application code. The adapter only binds them to
/// object ids and hands them to the invoker.
pub trait Servant: Send + Sync + 'static {
    /// Repository ids of the implemented interfaces, most derived first
    fn repository_ids(&self, id: &ObjectId) -> Vec<String>;

    /// Execute an operation with marshaled arguments
    fn invoke(&self, operation: &str, args: Bytes) -> Result<Bytes>;

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a servant
pub type ServantRef = Arc<dyn Servant>;

/// Identity of a servant allocation
///
/// Two handles name the same servant iff they point at the same allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServantKey(usize);

impl ServantKey {
    pub fn of(servant: &ServantRef) -> Self {
        Self(Arc::as_ptr(servant) as *const () as usize)
    }
}

/// Whether two handles name the same servant
pub fn same_servant(a: &ServantRef, b: &ServantRef) -> bool {
    ServantKey::of(a) == ServantKey::of(b)
}

/// Primary repository id of a servant, or the empty string
pub(crate) fn primary_repository_id(servant: &ServantRef, id: &ObjectId) -> String {
    servant
        .repository_ids(id)
        .into_iter()
        .next()
        .unwrap_or_default()
}
