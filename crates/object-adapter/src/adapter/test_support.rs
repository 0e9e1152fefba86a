//! Servants and callbacks shared by unit tests

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::callbacks::{AdapterActivator, ServantActivator, ServantLocator};
use super::object_adapter::ObjectAdapter;
use super::servant::{Servant, ServantRef};
use crate::types::{AdapterError, Cookie, ObjectId, Result};

/// Echoes its arguments; `fail` raises a servant failure
pub(crate) struct Echo {
    repository_id: String,
}

impl Echo {
    pub(crate) fn new(repository_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
        }
    }
}

impl Servant for Echo {
    fn repository_ids(&self, _id: &ObjectId) -> Vec<String> {
        vec![self.repository_id.clone()]
    }

    fn invoke(&self, operation: &str, args: Bytes) -> Result<Bytes> {
        match operation {
            "fail" => Err(AdapterError::ServantFailure("requested failure".to_string())),
            _ => Ok(args),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn echo() -> ServantRef {
    Arc::new(Echo::new("IDL:test/Echo:1.0"))
}

/// Activator recording every incarnate and etherealize call
pub(crate) struct RecordingActivator {
    /// Fixed servant to hand out; `None` with `fresh` set creates one per call
    servant: Option<ServantRef>,
    fresh: bool,
    incarnations: AtomicUsize,
    etherealized: Mutex<Vec<(ObjectId, bool, bool)>>,
}

impl RecordingActivator {
    /// Incarnates a new echo servant per id
    pub(crate) fn fresh() -> Self {
        Self {
            servant: None,
            fresh: true,
            incarnations: AtomicUsize::new(0),
            etherealized: Mutex::new(Vec::new()),
        }
    }

    /// Always incarnates the given servant
    pub(crate) fn returning(servant: Option<ServantRef>) -> Self {
        Self {
            servant,
            fresh: false,
            incarnations: AtomicUsize::new(0),
            etherealized: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn incarnations(&self) -> usize {
        self.incarnations.load(Ordering::SeqCst)
    }

    /// (id, cleanup_in_progress, remaining_activations) per etherealize call
    pub(crate) fn etherealized(&self) -> Vec<(ObjectId, bool, bool)> {
        self.etherealized.lock().clone()
    }
}

impl ServantActivator for RecordingActivator {
    fn incarnate(&self, _id: &ObjectId, _adapter: &Arc<ObjectAdapter>) -> Result<Option<ServantRef>> {
        self.incarnations.fetch_add(1, Ordering::SeqCst);
        if self.fresh {
            return Ok(Some(echo()));
        }
        Ok(self.servant.clone())
    }

    fn etherealize(
        &self,
        id: &ObjectId,
        _adapter: &Arc<ObjectAdapter>,
        _servant: ServantRef,
        cleanup_in_progress: bool,
        remaining_activations: bool,
    ) {
        self.etherealized
            .lock()
            .push((id.clone(), cleanup_in_progress, remaining_activations));
    }
}

/// Locator handing out a fixed servant and counting calls
pub(crate) struct RecordingLocator {
    servant: Option<ServantRef>,
    preinvokes: AtomicUsize,
    postinvokes: AtomicUsize,
}

impl RecordingLocator {
    pub(crate) fn returning(servant: Option<ServantRef>) -> Self {
        Self {
            servant,
            preinvokes: AtomicUsize::new(0),
            postinvokes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn preinvokes(&self) -> usize {
        self.preinvokes.load(Ordering::SeqCst)
    }

    pub(crate) fn postinvokes(&self) -> usize {
        self.postinvokes.load(Ordering::SeqCst)
    }
}

impl ServantLocator for RecordingLocator {
    fn preinvoke(
        &self,
        _id: &ObjectId,
        _adapter: &Arc<ObjectAdapter>,
        _operation: &str,
        cookie: &mut Cookie,
    ) -> Result<Option<ServantRef>> {
        let call = self.preinvokes.fetch_add(1, Ordering::SeqCst);
        let value: Arc<dyn Any + Send + Sync> = Arc::new(call);
        *cookie = Some(value);
        Ok(self.servant.clone())
    }

    fn postinvoke(
        &self,
        _id: &ObjectId,
        _adapter: &Arc<ObjectAdapter>,
        _operation: &str,
        cookie: Cookie,
        _servant: Option<ServantRef>,
    ) {
        assert!(cookie.is_some(), "postinvoke must receive the preinvoke cookie");
        self.postinvokes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates children with default policies under the parent's manager for a
/// fixed set of names
pub(crate) struct StaticAdapterActivator {
    names: Vec<String>,
    calls: AtomicUsize,
}

impl StaticAdapterActivator {
    pub(crate) fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AdapterActivator for StaticAdapterActivator {
    fn unknown_adapter(&self, parent: &Arc<ObjectAdapter>, name: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.names.iter().any(|known| known == name) {
            return Ok(false);
        }
        parent.create_child(name, Some(parent.manager().clone()), &[])?;
        Ok(true)
    }
}
