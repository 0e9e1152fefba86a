//! Hierarchical object adapter
//!
//! An adapter owns a policy set, an optional active object map, a set of
//! named children and a handle to its adapter manager. It resolves object
//! ids to servants according to its policies and runs the destroy protocol:
//!
//! ```text
//! destroy(etherealize, wait)
//!   phase 1 (adapter lock)   mark destroyed, record etherealize flag
//!   phase 2 (first caller)   destroy children (synchronously)
//!                            drain in-flight invocations
//!                            etherealize active servants (if requested)
//!                            clear the active object map
//!                            leave manager and parent
//!                            wake destroy waiters
//! ```
//!
//! Phase 2 runs on the caller's thread when waiting for completion and on a
//! background worker otherwise.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard, ReentrantMutex, RwLock};
use tracing::{debug, info, trace, warn};

use super::active_map::ActiveObjectMap;
use super::callbacks::{AdapterActivator, ServantManager};
use super::current::{self, Current};
use super::manager::{AdapterManager, ManagerState};
use super::serial::SerialGate;
use super::servant::{primary_repository_id, same_servant, ServantRef};
use crate::policy::{Policy, PolicySet, RequestProcessing, ServantRetention};
use crate::runtime::RuntimeContext;
use crate::types::{
    operations, AdapterError, AdapterId, AdapterPath, Cookie, ObjectId, ObjectReference, Result,
    RoutingKey, ServerId,
};

/// How the second phase of a destroy is run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DrainMode {
    /// On the calling thread; the call returns once the adapter is gone
    Synchronous,
    /// On a background worker; the call returns immediately
    Background,
}

thread_local! {
    /// Adapters whose destroy is running on this thread
    static DESTROYING: RefCell<HashSet<AdapterId>> = RefCell::new(HashSet::new());
}

/// Marks an adapter as being destroyed by the current thread
struct DestroyMarker(AdapterId);

impl DestroyMarker {
    fn mark(id: AdapterId) -> Self {
        DESTROYING.with(|set| set.borrow_mut().insert(id));
        Self(id)
    }
}

impl Drop for DestroyMarker {
    fn drop(&mut self) {
        DESTROYING.with(|set| set.borrow_mut().remove(&self.0));
    }
}

fn destroying_on_this_thread(id: AdapterId) -> bool {
    DESTROYING.with(|set| set.borrow().contains(&id))
}

struct AdapterState {
    children: HashMap<String, Arc<ObjectAdapter>>,
    /// Admitted invocations on this adapter
    invocations: usize,
    destroyed: bool,
    destroy_complete: bool,
    /// Recorded by the first destroy call
    etherealize_on_destroy: bool,
    /// Unknown-adapter callbacks running on behalf of this adapter
    pending_child_activations: usize,
    child_activation_owner: Option<ThreadId>,
}

/// A node of the adapter tree
pub struct ObjectAdapter {
    id: AdapterId,
    name: String,
    path: AdapterPath,
    policies: PolicySet,
    server_id: ServerId,
    context: Arc<RuntimeContext>,
    manager: Arc<AdapterManager>,
    parent: Option<Weak<ObjectAdapter>>,
    /// Present iff the adapter retains servants
    active_map: Option<ActiveObjectMap>,
    state: Mutex<AdapterState>,
    changed: Condvar,
    next_system_id: AtomicU32,
    activator: RwLock<Option<Arc<dyn AdapterActivator>>>,
    servant_manager: RwLock<Option<ServantManager>>,
    /// Held across activator incarnation
    incarnation: Mutex<()>,
    /// Held across explicit activation checks
    binding: Mutex<()>,
    default_servant: RwLock<Option<ServantRef>>,
    /// Serializes unknown-adapter callbacks
    child_activation: ReentrantMutex<()>,
    /// Present iff the single-thread policy applies
    gate: Option<SerialGate>,
}

/// Tracks one outstanding unknown-adapter callback on a parent
struct PendingActivation<'a> {
    adapter: &'a ObjectAdapter,
}

impl<'a> PendingActivation<'a> {
    fn begin(adapter: &'a ObjectAdapter) -> Self {
        let mut state = adapter.state.lock();
        state.pending_child_activations += 1;
        state.child_activation_owner = Some(thread::current().id());
        Self { adapter }
    }
}

impl Drop for PendingActivation<'_> {
    fn drop(&mut self) {
        let mut state = self.adapter.state.lock();
        state.pending_child_activations -= 1;
        if state.pending_child_activations == 0 {
            state.child_activation_owner = None;
            self.adapter.changed.notify_all();
        }
    }
}

impl ObjectAdapter {
    fn create(
        context: Arc<RuntimeContext>,
        manager: Arc<AdapterManager>,
        parent: Option<&Arc<ObjectAdapter>>,
        name: &str,
        policies: PolicySet,
        server_id: ServerId,
    ) -> Arc<Self> {
        let path = match parent {
            Some(parent) => parent.path.child(name),
            None => AdapterPath::root(),
        };
        let active_map = policies
            .retains_servants()
            .then(|| ActiveObjectMap::new(policies.is_multiple_ids()));
        let gate = policies.is_single_threaded().then(SerialGate::new);

        let adapter = Arc::new(Self {
            id: AdapterId::generate(),
            name: name.to_string(),
            path,
            policies,
            server_id,
            context: context.clone(),
            manager: manager.clone(),
            parent: parent.map(Arc::downgrade),
            active_map,
            state: Mutex::new(AdapterState {
                children: HashMap::new(),
                invocations: 0,
                destroyed: false,
                destroy_complete: false,
                etherealize_on_destroy: false,
                pending_child_activations: 0,
                child_activation_owner: None,
            }),
            changed: Condvar::new(),
            next_system_id: AtomicU32::new(0),
            activator: RwLock::new(None),
            servant_manager: RwLock::new(None),
            incarnation: Mutex::new(()),
            binding: Mutex::new(()),
            default_servant: RwLock::new(None),
            child_activation: ReentrantMutex::new(()),
            gate,
        });

        // A deactivated manager has left the registry for good
        if manager.state() != ManagerState::Inactive {
            context.managers().insert(manager.clone());
        }
        manager.add_adapter(&adapter);
        debug!(adapter = %adapter.path, manager = manager.id().0, "adapter created");
        adapter
    }

    /// Create the root adapter of a runtime
    pub(crate) fn new_root(context: Arc<RuntimeContext>, manager: Arc<AdapterManager>) -> Arc<Self> {
        let server_id = context.transient_server_id();
        Self::create(
            context,
            manager,
            None,
            crate::ROOT_ADAPTER_NAME,
            PolicySet::root(),
            server_id,
        )
    }

    pub fn id(&self) -> AdapterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path from the root to this adapter
    pub fn path(&self) -> &AdapterPath {
        &self.path
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Manager governing admission to this adapter
    pub fn manager(&self) -> &Arc<AdapterManager> {
        &self.manager
    }

    /// Server id stamped into this adapter's routing keys
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Parent adapter; `None` for the root or once the parent is gone
    pub fn parent(&self) -> Option<Arc<ObjectAdapter>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Snapshot of the child adapters
    pub fn children(&self) -> Vec<Arc<ObjectAdapter>> {
        self.state.lock().children.values().cloned().collect()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Admitted invocations that have not exited yet
    pub fn invocation_count(&self) -> usize {
        self.state.lock().invocations
    }

    /// Number of servant bindings in the active object map
    pub fn active_object_count(&self) -> usize {
        self.active_map.as_ref().map_or(0, ActiveObjectMap::len)
    }

    // ------------------------------------------------------------------
    // Child registry
    // ------------------------------------------------------------------

    /// Create a named child adapter
    ///
    /// A fresh manager is created when `manager` is `None`.
    pub fn create_child(
        self: &Arc<Self>,
        name: &str,
        manager: Option<Arc<AdapterManager>>,
        policies: &[Policy],
    ) -> Result<Arc<ObjectAdapter>> {
        let policies = PolicySet::new(policies)?;
        let server_id = self.context.server_id_for(policies.lifespan())?;

        let mut state = self.state.lock();
        if state.destroyed {
            return Err(AdapterError::AdapterDestroyed(self.path.clone()));
        }
        if state.children.contains_key(name) {
            return Err(AdapterError::AdapterAlreadyExists(name.to_string()));
        }

        let manager = manager.unwrap_or_else(|| self.context.create_manager());
        let child = Self::create(
            self.context.clone(),
            manager,
            Some(self),
            name,
            policies,
            server_id,
        );
        state.children.insert(name.to_string(), child.clone());
        info!(adapter = %child.path, "child adapter created");
        Ok(child)
    }

    /// Existing child by name
    pub fn child(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.state.lock().children.get(name).cloned()
    }

    /// Find a child, optionally asking the adapter activator to create it
    ///
    /// Callbacks for one parent are serialized. While one runs, invocations
    /// entering any child of this adapter block.
    pub fn find_child(self: &Arc<Self>, name: &str, activate_if_missing: bool) -> Result<Arc<ObjectAdapter>> {
        if let Some(child) = self.child(name) {
            return Ok(child);
        }
        let not_found = || AdapterError::AdapterNotFound(name.to_string());
        if !activate_if_missing {
            return Err(not_found());
        }
        let activator = self.activator().ok_or_else(not_found)?;

        let _serial = self.child_activation.lock();
        // A callback that ran while we waited may have created it
        if let Some(child) = self.child(name) {
            return Ok(child);
        }

        let _pending = PendingActivation::begin(self);
        debug!(parent = %self.path, child = name, "invoking adapter activator");
        match activator.unknown_adapter(self, name) {
            Ok(true) => self.child(name).ok_or_else(not_found),
            Ok(false) => Err(not_found()),
            Err(err) => {
                warn!(parent = %self.path, child = name, error = %err, "adapter activator failed");
                Err(not_found())
            }
        }
    }

    /// Adapter activator consulted for unknown children
    pub fn activator(&self) -> Option<Arc<dyn AdapterActivator>> {
        self.activator.read().clone()
    }

    pub fn set_activator(&self, activator: Option<Arc<dyn AdapterActivator>>) {
        *self.activator.write() = activator;
    }

    fn remove_child(&self, name: &str, child: AdapterId) {
        let mut state = self.state.lock();
        if state.children.get(name).is_some_and(|c| c.id == child) {
            state.children.remove(name);
        }
    }

    fn wait_for_child_activations(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.pending_child_activations > 0 && state.child_activation_owner != Some(me) {
            self.changed.wait(&mut state);
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit one invocation on this adapter
    ///
    /// Every successful `enter` must be paired with one [`exit`](Self::exit)
    /// on the same thread.
    pub fn enter(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(self.await_destroyed(&mut state));
            }
        }

        if let Some(parent) = self.parent() {
            parent.wait_for_child_activations();
        }

        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(self.await_destroyed(&mut state));
            }
            state.invocations += 1;
        }

        if let Err(err) = self.manager.enter() {
            self.release_invocation();
            return Err(err);
        }
        if let Some(gate) = &self.gate {
            gate.acquire();
        }
        trace!(adapter = %self.path, "invocation admitted");
        Ok(())
    }

    /// Release one invocation admitted by [`enter`](Self::enter)
    pub fn exit(&self) {
        if let Some(gate) = &self.gate {
            gate.release();
        }
        self.release_invocation();
        self.manager.exit();
    }

    fn release_invocation(&self) {
        let mut state = self.state.lock();
        state.invocations = state.invocations.saturating_sub(1);
        if state.invocations == 0 {
            self.changed.notify_all();
        }
    }

    /// Wait for a running destroy to finish and produce the error to report
    ///
    /// Threads running the destroy, or still inside an invocation on this
    /// adapter or a descendant, fail at once: the teardown cannot finish
    /// before they return.
    fn await_destroyed(&self, state: &mut MutexGuard<'_, AdapterState>) -> AdapterError {
        if !destroying_on_this_thread(self.id) && !current::serving_within(self.id) {
            while !state.destroy_complete {
                self.changed.wait(state);
            }
        }
        AdapterError::AdapterDestroyed(self.path.clone())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state.lock().destroyed {
            return Err(AdapterError::AdapterDestroyed(self.path.clone()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destroy
    // ------------------------------------------------------------------

    /// Destroy this adapter and all of its descendants
    ///
    /// Idempotent: only the first call runs the teardown and its
    /// `etherealize` flag wins. A later call with `wait_for_completion`
    /// blocks until the teardown finished.
    pub fn destroy(self: &Arc<Self>, etherealize: bool, wait_for_completion: bool) -> Result<()> {
        if wait_for_completion && current::in_invocation() {
            return Err(AdapterError::BadInvocationOrder(
                "cannot wait for destroy while servicing a request".to_string(),
            ));
        }
        let mode = if wait_for_completion {
            DrainMode::Synchronous
        } else {
            DrainMode::Background
        };
        self.destroy_with(etherealize, mode);
        Ok(())
    }

    pub(crate) fn destroy_with(self: &Arc<Self>, etherealize: bool, mode: DrainMode) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                if mode == DrainMode::Synchronous && !destroying_on_this_thread(self.id) {
                    while !state.destroy_complete {
                        self.changed.wait(&mut state);
                    }
                }
                return;
            }
            state.destroyed = true;
            state.etherealize_on_destroy = etherealize;
        }

        info!(adapter = %self.path, etherealize, ?mode, "destroying adapter");
        match mode {
            DrainMode::Synchronous => self.complete_destroy(),
            DrainMode::Background => {
                let adapter = self.clone();
                self.context
                    .spawn_background("destroy", move || adapter.complete_destroy());
            }
        }
    }

    fn complete_destroy(self: &Arc<Self>) {
        let _marker = DestroyMarker::mark(self.id);

        let (children, etherealize) = {
            let state = self.state.lock();
            let children: Vec<_> = state.children.values().cloned().collect();
            (children, state.etherealize_on_destroy)
        };
        for child in children {
            child.destroy_with(etherealize, DrainMode::Synchronous);
        }

        {
            let mut state = self.state.lock();
            while state.invocations > 0 {
                self.changed.wait(&mut state);
            }
        }

        if etherealize {
            self.etherealize_all();
        }
        if let Some(map) = &self.active_map {
            map.clear();
        }

        self.manager.remove_adapter(self.id);
        if let Some(parent) = self.parent() {
            parent.remove_child(&self.name, self.id);
        }

        let mut state = self.state.lock();
        state.children.clear();
        state.destroy_complete = true;
        self.changed.notify_all();
        info!(adapter = %self.path, "adapter destroyed");
    }

    /// Hand every active servant back to the servant activator
    ///
    /// Bindings are removed as they are torn down, so a servant is never
    /// etherealized twice.
    pub(crate) fn etherealize_all(self: &Arc<Self>) {
        let Some(map) = &self.active_map else {
            return;
        };
        let Some(ServantManager::Activator(activator)) = self.installed_servant_manager() else {
            return;
        };

        for (id, servant) in map.entries() {
            if map.remove(&id).is_none() {
                continue;
            }
            self.unregister_servant(&servant);
            let remaining = map.contains_servant(&servant);
            debug!(adapter = %self.path, object = %id, remaining, "etherealizing servant");
            activator.etherealize(&id, self, servant, true, remaining);
        }
    }

    // ------------------------------------------------------------------
    // Servant managers and default servant
    // ------------------------------------------------------------------

    fn installed_servant_manager(&self) -> Option<ServantManager> {
        self.servant_manager.read().clone()
    }

    /// Installed servant manager
    pub fn servant_manager(&self) -> Result<Option<ServantManager>> {
        if !self.policies.uses_servant_manager() {
            return Err(AdapterError::WrongPolicy("servant manager policy required"));
        }
        Ok(self.installed_servant_manager())
    }

    /// Install the servant manager; may only be done once
    ///
    /// Retaining adapters take an activator and non-retaining ones a locator.
    pub fn set_servant_manager(&self, manager: ServantManager) -> Result<()> {
        if !self.policies.uses_servant_manager() {
            return Err(AdapterError::WrongPolicy("servant manager policy required"));
        }
        let expected_activator = self.policies.retains_servants();
        if manager.is_activator() != expected_activator {
            return Err(AdapterError::WrongPolicy(
                "servant manager kind does not match servant retention",
            ));
        }

        let mut slot = self.servant_manager.write();
        if slot.is_some() {
            return Err(AdapterError::BadInvocationOrder(
                "servant manager already set".to_string(),
            ));
        }
        debug!(adapter = %self.path, ?manager, "servant manager installed");
        *slot = Some(manager);
        Ok(())
    }

    /// Default servant for ids with no active servant
    pub fn default_servant(&self) -> Result<ServantRef> {
        if !self.policies.uses_default_servant() {
            return Err(AdapterError::WrongPolicy("default servant policy required"));
        }
        self.default_servant
            .read()
            .clone()
            .ok_or(AdapterError::NoDefaultServant)
    }

    pub fn set_default_servant(&self, servant: ServantRef) -> Result<()> {
        if !self.policies.uses_default_servant() {
            return Err(AdapterError::WrongPolicy("default servant policy required"));
        }
        *self.default_servant.write() = Some(servant);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Servant resolution
    // ------------------------------------------------------------------

    fn active_map(&self) -> Result<&ActiveObjectMap> {
        self.active_map
            .as_ref()
            .ok_or(AdapterError::WrongPolicy("servant retention required"))
    }

    /// Resolve the servant for one invocation
    ///
    /// `Ok(None)` is only returned for reserved introspection operations.
    pub fn resolve_servant(self: &Arc<Self>, id: &ObjectId, operation: &str) -> Result<Option<ServantRef>> {
        match (self.policies.retention(), self.policies.request_processing()) {
            (ServantRetention::Retain, RequestProcessing::ActiveObjectMapOnly) => {
                match self.active_map()?.get(id) {
                    Some(servant) => Ok(Some(servant)),
                    None => missing_servant(id, operation),
                }
            }
            (ServantRetention::Retain, RequestProcessing::ServantManager) => {
                self.incarnate(id, operation)
            }
            (ServantRetention::Retain, RequestProcessing::DefaultServant) => {
                if let Some(servant) = self.active_map()?.get(id) {
                    return Ok(Some(servant));
                }
                self.default_servant
                    .read()
                    .clone()
                    .map(Some)
                    .ok_or(AdapterError::NoDefaultServant)
            }
            (ServantRetention::NonRetain, RequestProcessing::ServantManager) => {
                self.locate(id, operation)
            }
            (ServantRetention::NonRetain, RequestProcessing::DefaultServant) => self
                .default_servant
                .read()
                .clone()
                .map(Some)
                .ok_or(AdapterError::NoDefaultServant),
            (retention, processing) => Err(AdapterError::Internal(format!(
                "unsupported policy combination {:?}/{:?}",
                retention, processing
            ))),
        }
    }

    fn incarnate(self: &Arc<Self>, id: &ObjectId, operation: &str) -> Result<Option<ServantRef>> {
        let map = self.active_map()?;
        if let Some(servant) = map.get(id) {
            return Ok(Some(servant));
        }

        let activator = match self.installed_servant_manager() {
            Some(ServantManager::Activator(activator)) => activator,
            Some(ServantManager::Locator(_)) => return Err(AdapterError::BadServantManager),
            None => return Err(AdapterError::NoServantManager),
        };

        let _incarnation = self.incarnation.lock();
        if let Some(servant) = map.get(id) {
            return Ok(Some(servant));
        }

        trace!(adapter = %self.path, object = %id, "incarnating servant");
        let servant = match activator.incarnate(id, self)? {
            Some(servant) => servant,
            None if operations::is_reserved(operation) => return Ok(None),
            None => return Err(AdapterError::NullServant(operation.to_string())),
        };
        if self.policies.is_unique_ids() && map.contains_servant(&servant) {
            return Err(AdapterError::ObjectAdapterConflict);
        }
        self.activate(id, servant.clone());
        Ok(Some(servant))
    }

    fn locate(self: &Arc<Self>, id: &ObjectId, operation: &str) -> Result<Option<ServantRef>> {
        let locator = match self.installed_servant_manager() {
            Some(ServantManager::Locator(locator)) => locator,
            Some(ServantManager::Activator(_)) => return Err(AdapterError::BadServantManager),
            None => return Err(AdapterError::NoServantManager),
        };

        let mut cookie: Cookie = None;
        let located = locator.preinvoke(id, self, operation, &mut cookie);
        // postinvoke is owed even when preinvoke failed
        current::with_stack(|stack| {
            if let Ok(frame) = stack.peek_mut() {
                frame.cookie = cookie;
                frame.pre_invoked = true;
            }
        });

        match located? {
            Some(servant) => Ok(Some(servant)),
            None => missing_servant(id, operation),
        }
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Bind a servant to an id without policy checks
    pub(crate) fn activate(&self, id: &ObjectId, servant: ServantRef) {
        let Some(map) = &self.active_map else {
            return;
        };
        map.put(id.clone(), servant.clone());
        if let Some(registry) = self.context.servant_registry() {
            registry.register(self, &servant);
        }
        debug!(adapter = %self.path, object = %id, "servant activated");
    }

    /// Unbind an id and etherealize its servant
    pub(crate) fn deactivate(self: &Arc<Self>, id: &ObjectId) -> Result<()> {
        let map = self.active_map()?;
        let servant = map
            .remove(id)
            .ok_or_else(|| AdapterError::ObjectNotActive(id.clone()))?;
        self.unregister_servant(&servant);
        debug!(adapter = %self.path, object = %id, "servant deactivated");

        if let Some(ServantManager::Activator(activator)) = self.installed_servant_manager() {
            let remaining = map.contains_servant(&servant);
            activator.etherealize(id, self, servant, false, remaining);
        }
        Ok(())
    }

    fn unregister_servant(&self, servant: &ServantRef) {
        if let Some(registry) = self.context.servant_registry() {
            registry.unregister(self, servant);
        }
    }

    /// Next counter id not already bound in the active map
    fn next_system_id(&self) -> ObjectId {
        loop {
            let id = ObjectId::from_counter(self.next_system_id.fetch_add(1, Ordering::Relaxed));
            if !self.active_map.as_ref().is_some_and(|map| map.contains_key(&id)) {
                return id;
            }
            trace!(adapter = %self.path, object = %id, "system id taken; skipping");
        }
    }

    fn require_system_ids(&self) -> Result<()> {
        if !self.policies.is_system_assigned_ids() {
            return Err(AdapterError::WrongPolicy("system id assignment required"));
        }
        Ok(())
    }

    /// Activate a servant under a freshly assigned system id
    pub fn activate_object(&self, servant: ServantRef) -> Result<ObjectId> {
        self.require_system_ids()?;
        let map = self.active_map()?;
        self.ensure_alive()?;

        let _binding = self.binding.lock();
        if self.policies.is_unique_ids() && map.contains_servant(&servant) {
            return Err(AdapterError::ServantAlreadyActive);
        }
        let id = self.next_system_id();
        self.activate(&id, servant);
        Ok(id)
    }

    /// Activate a servant under a caller-chosen id
    pub fn activate_object_with_id(&self, id: &ObjectId, servant: ServantRef) -> Result<()> {
        let map = self.active_map()?;
        self.ensure_alive()?;

        let _binding = self.binding.lock();
        if map.contains_key(id) {
            return Err(AdapterError::ObjectAlreadyActive(id.clone()));
        }
        if self.policies.is_unique_ids() && map.contains_servant(&servant) {
            return Err(AdapterError::ServantAlreadyActive);
        }
        self.activate(id, servant);
        Ok(())
    }

    /// Deactivate an id, etherealizing its servant through the activator
    pub fn deactivate_object(self: &Arc<Self>, id: &ObjectId) -> Result<()> {
        self.active_map()?;
        if self.policies.uses_servant_manager() && self.installed_servant_manager().is_none() {
            return Err(AdapterError::NoServantManager);
        }
        self.deactivate(id)
    }

    // ------------------------------------------------------------------
    // References and id conversion
    // ------------------------------------------------------------------

    fn make_reference(&self, repository_id: &str, id: ObjectId) -> ObjectReference {
        let profile = self
            .context
            .reference_factory()
            .build_profile(repository_id, &id, &self.path);
        ObjectReference {
            repository_id: repository_id.to_string(),
            key: RoutingKey::new(self.policies.lifespan(), self.server_id, self.path.clone(), id),
            profile,
        }
    }

    /// Reference to a not yet activated object with a fresh system id
    pub fn create_reference(&self, repository_id: &str) -> Result<ObjectReference> {
        self.require_system_ids()?;
        self.ensure_alive()?;
        let id = self.next_system_id();
        Ok(self.make_reference(repository_id, id))
    }

    /// Reference to an object with a caller-chosen id
    pub fn create_reference_with_id(&self, id: &ObjectId, repository_id: &str) -> Result<ObjectReference> {
        self.ensure_alive()?;
        if let Some(servant) = self.active_map.as_ref().and_then(|map| map.get(id)) {
            let expected = primary_repository_id(&servant, id);
            if !expected.is_empty() && expected != repository_id {
                return Err(AdapterError::BadRepositoryId {
                    expected,
                    found: repository_id.to_string(),
                });
            }
        }
        Ok(self.make_reference(repository_id, id.clone()))
    }

    /// Id of an active servant, activating it implicitly when allowed
    pub fn servant_to_id(&self, servant: &ServantRef) -> Result<ObjectId> {
        let map = self.active_map()?;
        if !(self.policies.is_unique_ids() || self.policies.is_implicitly_activated()) {
            return Err(AdapterError::WrongPolicy(
                "unique ids or implicit activation required",
            ));
        }
        self.ensure_alive()?;

        if self.policies.is_unique_ids() {
            if let Some(id) = map.id_of(servant) {
                return Ok(id);
            }
        }
        if self.policies.is_implicitly_activated()
            && (self.policies.is_multiple_ids() || !map.contains_servant(servant))
        {
            return self.activate_object(servant.clone());
        }
        if self.policies.uses_default_servant() {
            if let Some(id) = self.current_default_servant_id(servant) {
                return Ok(id);
            }
        }
        Err(AdapterError::ServantNotActive)
    }

    /// Object id of the current invocation when it is served by `servant`
    /// as this adapter's default servant
    fn current_default_servant_id(&self, servant: &ServantRef) -> Option<ObjectId> {
        let adapter = Current::adapter().ok()?;
        if adapter.id != self.id {
            return None;
        }
        let serving = Current::servant().ok()??;
        same_servant(&serving, servant)
            .then(Current::object_id)
            .and_then(|id| id.ok())
    }

    /// Reference for an active servant, activating it implicitly when allowed
    pub fn servant_to_reference(&self, servant: &ServantRef) -> Result<ObjectReference> {
        let id = self.servant_to_id(servant)?;
        let repository_id = primary_repository_id(servant, &id);
        Ok(self.make_reference(&repository_id, id))
    }

    /// Object id carried by a reference minted by this adapter
    pub fn reference_to_id(&self, reference: &ObjectReference) -> Result<ObjectId> {
        self.ensure_alive()?;
        if reference.adapter_path() != &self.path {
            return Err(AdapterError::WrongAdapter(self.path.clone()));
        }
        Ok(reference.object_id().clone())
    }

    /// Servant active for a reference, or the default servant
    pub fn reference_to_servant(&self, reference: &ObjectReference) -> Result<ServantRef> {
        if !(self.policies.retains_servants() || self.policies.uses_default_servant()) {
            return Err(AdapterError::WrongPolicy(
                "servant retention or default servant required",
            ));
        }
        let id = self.reference_to_id(reference)?;
        self.lookup_servant(&id)
    }

    /// Servant active for an id, or the default servant
    pub fn id_to_servant(&self, id: &ObjectId) -> Result<ServantRef> {
        if !(self.policies.retains_servants() || self.policies.uses_default_servant()) {
            return Err(AdapterError::WrongPolicy(
                "servant retention or default servant required",
            ));
        }
        self.ensure_alive()?;
        self.lookup_servant(id)
    }

    fn lookup_servant(&self, id: &ObjectId) -> Result<ServantRef> {
        if let Some(servant) = self.active_map.as_ref().and_then(|map| map.get(id)) {
            return Ok(servant);
        }
        if self.policies.uses_default_servant() {
            if let Some(servant) = self.default_servant.read().clone() {
                return Ok(servant);
            }
        }
        Err(AdapterError::ObjectNotActive(id.clone()))
    }

    /// Reference for an active id
    pub fn id_to_reference(&self, id: &ObjectId) -> Result<ObjectReference> {
        let map = self.active_map()?;
        self.ensure_alive()?;
        let servant = map
            .get(id)
            .ok_or_else(|| AdapterError::ObjectNotActive(id.clone()))?;
        let repository_id = primary_repository_id(&servant, id);
        Ok(self.make_reference(&repository_id, id.clone()))
    }
}

/// Outcome of a lookup that produced no servant
fn missing_servant(id: &ObjectId, operation: &str) -> Result<Option<ServantRef>> {
    if operations::is_reserved(operation) {
        Ok(None)
    } else {
        Err(AdapterError::object_not_exist(id.clone()))
    }
}

impl fmt::Debug for ObjectAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAdapter")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("policies", &self.policies)
            .field("manager", &self.manager.id())
            .finish()
    }
}
