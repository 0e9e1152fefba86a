//! Shared fixtures for the integration tests

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use object_adapter::policy::Lifespan;
use object_adapter::{
    AdapterActivator, AdapterPath, AdapterRuntime, ObjectAdapter, ObjectId, Request, Result,
    RoutingKey, Servant, ServantActivator, ServantRef,
};

pub const ECHO_REPOSITORY_ID: &str = "IDL:integration/Echo:1.0";

/// Install a log subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Runtime whose root manager is already active
pub fn active_runtime() -> AdapterRuntime {
    let runtime = AdapterRuntime::new();
    runtime.root().manager().activate().unwrap();
    runtime
}

/// Two-way request against this runtime
pub fn request(runtime: &AdapterRuntime, path: &AdapterPath, id: &ObjectId, operation: &str, args: Bytes) -> Request {
    let key = RoutingKey::new(
        Lifespan::Transient,
        runtime.transient_server_id(),
        path.clone(),
        id.clone(),
    );
    Request::new(key, operation, args)
}

/// Poll a condition for up to five seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Success/failure counters shared by concurrent clients
pub struct ConcurrentStats {
    successes: AtomicUsize,
    failures: AtomicUsize,
}

impl ConcurrentStats {
    pub fn new() -> Self {
        Self {
            successes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Echoes its arguments and counts calls
pub struct EchoServant {
    calls: AtomicUsize,
}

impl EchoServant {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Servant for EchoServant {
    fn repository_ids(&self, _id: &ObjectId) -> Vec<String> {
        vec![ECHO_REPOSITORY_ID.to_string()]
    }

    fn invoke(&self, _operation: &str, args: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Servant whose `block` operation parks until the gate opens
///
/// Tracks how many invocations are inside at once.
pub struct GatedServant {
    open: Mutex<bool>,
    opened: Condvar,
    inside: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl GatedServant {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(false),
            opened: Condvar::new(),
            inside: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn inside(&self) -> usize {
        self.inside.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Servant for GatedServant {
    fn repository_ids(&self, _id: &ObjectId) -> Vec<String> {
        vec!["IDL:integration/Gated:1.0".to_string()]
    }

    fn invoke(&self, operation: &str, args: Bytes) -> Result<Bytes> {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        match operation {
            "block" => {
                let mut open = self.open.lock();
                while !*open {
                    self.opened.wait(&mut open);
                }
            }
            "sleep" => thread::sleep(Duration::from_millis(10)),
            _ => {}
        }

        self.inside.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Activator incarnating echo servants and recording etherealize calls
pub struct RecordingActivator {
    incarnations: AtomicUsize,
    etherealized: Mutex<Vec<(ObjectId, bool, bool)>>,
    /// Delay inside incarnate, to widen race windows
    delay: Duration,
}

impl RecordingActivator {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            incarnations: AtomicUsize::new(0),
            etherealized: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn incarnations(&self) -> usize {
        self.incarnations.load(Ordering::SeqCst)
    }

    pub fn etherealized(&self) -> Vec<(ObjectId, bool, bool)> {
        self.etherealized.lock().clone()
    }
}

impl ServantActivator for RecordingActivator {
    fn incarnate(&self, _id: &ObjectId, _adapter: &Arc<ObjectAdapter>) -> Result<Option<ServantRef>> {
        self.incarnations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(Some(Arc::new(EchoServant::new())))
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

/// Recreates named children under the parent's manager, activating a
/// fixed servant under a fixed id in each
pub struct RecreatingActivator {
    servant: ServantRef,
    id: ObjectId,
    calls: AtomicUsize,
}

impl RecreatingActivator {
    pub fn new(servant: ServantRef, id: ObjectId) -> Self {
        Self {
            servant,
            id,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AdapterActivator for RecreatingActivator {
    fn unknown_adapter(&self, parent: &Arc<ObjectAdapter>, name: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let child = parent.create_child(name, Some(parent.manager().clone()), &[])?;
        child.activate_object_with_id(&self.id, self.servant.clone())?;
        Ok(true)
    }
}
