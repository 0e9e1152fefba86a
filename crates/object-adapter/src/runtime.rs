//! Adapter runtime: configuration, shared context and the root adapter
//!
//! Provides a simple interface for hosting servants behind a tree of
//! adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterManager, EmptyProfileFactory, ManagerRegistry, ObjectAdapter, ReferenceFactory, ServantRegistry};
use crate::dispatch::{DirectInvoker, ForeignIdHandler, RequestDispatcher, ServantInvoker};
use crate::policy::Lifespan;
use crate::types::{AdapterError, Result, ServerId};

/// Runtime configuration
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Name of this runtime instance, used in logs
    pub orb_id: String,
    /// Server id for persistent adapters; persistent adapters cannot be
    /// created without one
    pub persistent_server_id: Option<u32>,
    /// How often a dispatch is retried after its adapter was destroyed
    pub destroyed_retry_limit: usize,
    /// Name prefix of background worker threads
    pub worker_thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            orb_id: String::new(),
            persistent_server_id: None,
            destroyed_retry_limit: crate::DEFAULT_DESTROYED_RETRY_LIMIT,
            worker_thread_name: crate::DEFAULT_WORKER_THREAD_NAME.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration
    pub fn new(orb_id: impl Into<String>) -> Self {
        Self {
            orb_id: orb_id.into(),
            ..Self::default()
        }
    }
}

/// State shared by every adapter of one runtime
pub struct RuntimeContext {
    config: RuntimeConfig,
    transient_server_id: ServerId,
    reference_factory: Arc<dyn ReferenceFactory>,
    servant_registry: Option<Arc<dyn ServantRegistry>>,
    managers: ManagerRegistry,
    background_workers: AtomicUsize,
}

impl RuntimeContext {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Server id generated for this runtime instance
    pub fn transient_server_id(&self) -> ServerId {
        self.transient_server_id
    }

    pub fn persistent_server_id(&self) -> Option<ServerId> {
        self.config.persistent_server_id.map(ServerId)
    }

    /// Server id stamped into routing keys of the given lifespan
    pub fn server_id_for(&self, lifespan: Lifespan) -> Result<ServerId> {
        match lifespan {
            Lifespan::Transient => Ok(self.transient_server_id),
            Lifespan::Persistent => self
                .persistent_server_id()
                .ok_or(AdapterError::PersistentServerIdNotSet),
        }
    }

    pub fn reference_factory(&self) -> &Arc<dyn ReferenceFactory> {
        &self.reference_factory
    }

    pub fn servant_registry(&self) -> Option<&Arc<dyn ServantRegistry>> {
        self.servant_registry.as_ref()
    }

    /// Live adapter managers
    pub fn managers(&self) -> &ManagerRegistry {
        &self.managers
    }

    /// Create and register a new manager in the HOLDING state
    pub fn create_manager(self: &Arc<Self>) -> Arc<AdapterManager> {
        let manager = Arc::new(AdapterManager::new(Arc::downgrade(self)));
        self.managers.insert(manager.clone());
        debug!(manager = manager.id().0, "adapter manager created");
        manager
    }

    /// Number of background workers started so far
    pub fn background_workers_spawned(&self) -> usize {
        self.background_workers.load(Ordering::SeqCst)
    }

    /// Run a task off the calling thread
    ///
    /// Inside a tokio runtime the task goes to its blocking pool; otherwise
    /// a named thread is started. If no thread can be started the task runs
    /// inline.
    pub(crate) fn spawn_background<F>(&self, label: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.background_workers.fetch_add(1, Ordering::SeqCst);
        debug!(label, "starting background worker");

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            drop(handle.spawn_blocking(task));
            return;
        }

        let slot = Arc::new(Mutex::new(Some(task)));
        let worker_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.config.worker_thread_name, label))
            .spawn(move || {
                let task = worker_slot.lock().take();
                if let Some(task) = task {
                    task();
                }
            });

        if let Err(err) = spawned {
            warn!(label, error = %err, "failed to start worker thread; running inline");
            let task = slot.lock().take();
            if let Some(task) = task {
                task();
            }
        }
    }
}

/// Object adapter runtime
///
/// Owns:
/// - The shared runtime context
/// - The root adapter and its manager
/// - The request dispatcher
pub struct AdapterRuntime {
    context: Arc<RuntimeContext>,
    root: Arc<ObjectAdapter>,
    dispatcher: RequestDispatcher,
}

impl AdapterRuntime {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Create a runtime with the given configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        RuntimeBuilder::new().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The root adapter
    pub fn root(&self) -> &Arc<ObjectAdapter> {
        &self.root
    }

    /// The request dispatcher
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.context.config()
    }

    pub fn transient_server_id(&self) -> ServerId {
        self.context.transient_server_id()
    }

    /// Create a manager for adapters created later
    pub fn create_manager(&self) -> Arc<AdapterManager> {
        self.context.create_manager()
    }

    pub fn background_workers_spawned(&self) -> usize {
        self.context.background_workers_spawned()
    }

    /// Shut the runtime down
    ///
    /// Deactivates every manager with servant teardown, then destroys the
    /// adapter tree.
    pub fn shutdown(&self, wait_for_completion: bool) -> Result<()> {
        info!(orb_id = %self.context.config.orb_id, wait_for_completion, "shutting down adapter runtime");
        for manager in self.context.managers().all() {
            match manager.deactivate(true, wait_for_completion) {
                Ok(()) | Err(AdapterError::AdapterInactive) => {}
                Err(err) => return Err(err),
            }
        }
        self.root.destroy(true, wait_for_completion)
    }
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the adapter runtime
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    reference_factory: Option<Arc<dyn ReferenceFactory>>,
    servant_registry: Option<Arc<dyn ServantRegistry>>,
    foreign_id_handler: Option<Arc<dyn ForeignIdHandler>>,
    invoker: Option<Arc<dyn ServantInvoker>>,
}

impl RuntimeBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            reference_factory: None,
            servant_registry: None,
            foreign_id_handler: None,
            invoker: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn orb_id(mut self, orb_id: impl Into<String>) -> Self {
        self.config.orb_id = orb_id.into();
        self
    }

    /// Enable persistent adapters under this server id
    pub fn persistent_server_id(mut self, server_id: u32) -> Self {
        self.config.persistent_server_id = Some(server_id);
        self
    }

    pub fn destroyed_retry_limit(mut self, limit: usize) -> Self {
        self.config.destroyed_retry_limit = limit;
        self
    }

    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_thread_name = name.into();
        self
    }

    /// Set the builder of reference profiles
    pub fn reference_factory(mut self, factory: Arc<dyn ReferenceFactory>) -> Self {
        self.reference_factory = Some(factory);
        self
    }

    /// Set the registry notified of servant activations
    pub fn servant_registry(mut self, registry: Arc<dyn ServantRegistry>) -> Self {
        self.servant_registry = Some(registry);
        self
    }

    /// Set the handler for requests carrying another server's id
    pub fn foreign_id_handler(mut self, handler: Arc<dyn ForeignIdHandler>) -> Self {
        self.foreign_id_handler = Some(handler);
        self
    }

    /// Set the servant invoker
    pub fn invoker(mut self, invoker: Arc<dyn ServantInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Build the runtime
    pub fn build(self) -> AdapterRuntime {
        let context = Arc::new(RuntimeContext {
            config: self.config,
            transient_server_id: ServerId::generate(),
            reference_factory: self
                .reference_factory
                .unwrap_or_else(|| Arc::new(EmptyProfileFactory)),
            servant_registry: self.servant_registry,
            managers: ManagerRegistry::new(),
            background_workers: AtomicUsize::new(0),
        });

        let manager = context.create_manager();
        let root = ObjectAdapter::new_root(context.clone(), manager);
        let invoker = self.invoker.unwrap_or_else(|| Arc::new(DirectInvoker));
        let dispatcher = RequestDispatcher::new(context.clone(), root.clone(), invoker, self.foreign_id_handler);

        info!(
            orb_id = %context.config.orb_id,
            server_id = %context.transient_server_id,
            "adapter runtime created"
        );
        AdapterRuntime {
            context,
            root,
            dispatcher,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
