//! Greeter Demo Servants
//!
//! A greeter servant whose object id is the name it greets, and a servant
//! activator that incarnates one greeter per name on first use.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use object_adapter::{
    AdapterError, ObjectAdapter, ObjectId, Result, Servant, ServantActivator, ServantRef,
};

/// Repository id of the greeter interface
pub const GREETER_REPOSITORY_ID: &str = "IDL:demo/Greeter:1.0";

/// Greets the name it was incarnated for
pub struct Greeter {
    name: String,
    calls: AtomicUsize,
}

impl Greeter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Servant for Greeter {
    fn repository_ids(&self, _id: &ObjectId) -> Vec<String> {
        vec![GREETER_REPOSITORY_ID.to_string()]
    }

    fn invoke(&self, operation: &str, args: Bytes) -> Result<Bytes> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match operation {
            "say_hello" => Ok(Bytes::from(format!("Hello, {}! (call #{})", self.name, count))),
            "echo" => {
                let message = String::from_utf8_lossy(&args);
                Ok(Bytes::from(format!("{} says: {}", self.name, message)))
            }
            other => Err(AdapterError::ServantFailure(format!("unknown operation {}", other))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Incarnates a greeter for every UTF-8 object id
#[derive(Default)]
pub struct GreeterActivator {
    incarnated: AtomicUsize,
    etherealized: AtomicUsize,
}

impl GreeterActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incarnated(&self) -> usize {
        self.incarnated.load(Ordering::SeqCst)
    }

    pub fn etherealized(&self) -> usize {
        self.etherealized.load(Ordering::SeqCst)
    }
}

impl ServantActivator for GreeterActivator {
    fn incarnate(&self, id: &ObjectId, adapter: &Arc<ObjectAdapter>) -> Result<Option<ServantRef>> {
        let Ok(name) = std::str::from_utf8(id.as_bytes()) else {
            return Ok(None);
        };
        self.incarnated.fetch_add(1, Ordering::SeqCst);
        info!(adapter = %adapter.path(), name, "incarnating greeter");
        Ok(Some(Arc::new(Greeter::new(name))))
    }

    fn etherealize(
        &self,
        id: &ObjectId,
        adapter: &Arc<ObjectAdapter>,
        servant: ServantRef,
        cleanup_in_progress: bool,
        _remaining_activations: bool,
    ) {
        self.etherealized.fetch_add(1, Ordering::SeqCst);
        let name = servant
            .as_any()
            .downcast_ref::<Greeter>()
            .map(Greeter::name)
            .unwrap_or("?");
        info!(adapter = %adapter.path(), object = %id, name, cleanup_in_progress, "etherealizing greeter");
    }
}
