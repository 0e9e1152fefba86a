//! Application-supplied collaborators consulted by adapters

use std::sync::Arc;

use bytes::Bytes;

use super::object_adapter::ObjectAdapter;
use super::servant::ServantRef;
use crate::types::{AdapterPath, Cookie, ObjectId, Result};

/// Servant manager for retaining adapters
///
/// Incarnates servants on demand; incarnated servants are kept in the
/// adapter's active object map until deactivated.
pub trait ServantActivator: Send + Sync {
    /// Produce a servant for an id missing from the active map
    ///
    /// `Ok(None)` means no servant exists for the id. Returning
    /// [`AdapterError::ForwardRequest`](crate::AdapterError::ForwardRequest)
    /// redirects the caller.
    fn incarnate(&self, id: &ObjectId, adapter: &Arc<ObjectAdapter>) -> Result<Option<ServantRef>>;

    /// Tear down a servant that was deactivated
    ///
    /// `cleanup_in_progress` is set when the adapter or its manager is being
    /// shut down; `remaining_activations` when the servant is still bound to
    /// other ids.
    fn etherealize(
        &self,
        id: &ObjectId,
        adapter: &Arc<ObjectAdapter>,
        servant: ServantRef,
        cleanup_in_progress: bool,
        remaining_activations: bool,
    );
}

/// Servant manager for non-retaining adapters
///
/// Consulted on every request; nothing is cached.
pub trait ServantLocator: Send + Sync {
    /// Locate a servant for one invocation
    fn preinvoke(
        &self,
        id: &ObjectId,
        adapter: &Arc<ObjectAdapter>,
        operation: &str,
        cookie: &mut Cookie,
    ) -> Result<Option<ServantRef>>;

    /// Called once the invocation finished
    fn postinvoke(
        &self,
        id: &ObjectId,
        adapter: &Arc<ObjectAdapter>,
        operation: &str,
        cookie: Cookie,
        servant: Option<ServantRef>,
    );
}

/// Servant manager installed on an adapter
#[derive(Clone)]
pub enum ServantManager {
    Activator(Arc<dyn ServantActivator>),
    Locator(Arc<dyn ServantLocator>),
}

impl ServantManager {
    pub fn is_activator(&self) -> bool {
        matches!(self, ServantManager::Activator(_))
    }

    pub fn is_locator(&self) -> bool {
        matches!(self, ServantManager::Locator(_))
    }
}

impl std::fmt::Debug for ServantManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServantManager::Activator(_) => write!(f, "ServantManager::Activator"),
            ServantManager::Locator(_) => write!(f, "ServantManager::Locator"),
        }
    }
}

/// Callback creating child adapters on demand
pub trait AdapterActivator: Send + Sync {
    /// Called when a request names a child of `parent` that does not exist
    ///
    /// Returns `Ok(true)` once the child has been created.
    fn unknown_adapter(&self, parent: &Arc<ObjectAdapter>, name: &str) -> Result<bool>;
}

/// Builds the opaque profile of an object reference
pub trait ReferenceFactory: Send + Sync {
    fn build_profile(
        &self,
        repository_id: &str,
        object_id: &ObjectId,
        adapter_path: &AdapterPath,
    ) -> Bytes;
}

/// Reference factory producing empty profiles
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProfileFactory;

impl ReferenceFactory for EmptyProfileFactory {
    fn build_profile(&self, _: &str, _: &ObjectId, _: &AdapterPath) -> Bytes {
        Bytes::new()
    }
}

/// Registry notified of servant/adapter associations
pub trait ServantRegistry: Send + Sync {
    fn register(&self, adapter: &ObjectAdapter, servant: &ServantRef);
    fn unregister(&self, adapter: &ObjectAdapter, servant: &ServantRef);
}
