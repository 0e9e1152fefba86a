//! Adapter manager: admission control for a group of adapters
//!
//! ```text
//!            activate()            discard_requests()
//!   HOLDING ────────────► ACTIVE ─────────────────► DISCARDING
//!      ▲  ◄──────────────   │  ◄─────────────────      │
//!      │  hold_requests()   │      activate()          │
//!      └────────────────────┼──────────────────────────┘
//!                           ▼ deactivate() (from any state)
//!                        INACTIVE (terminal)
//! ```
//!
//! Every transition bumps an epoch and broadcasts on the single condition
//! variable; blocked callers re-check their own predicate on wake.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::current;
use super::object_adapter::ObjectAdapter;
use crate::runtime::RuntimeContext;
use crate::types::{AdapterError, AdapterId, ManagerId, Result};

/// Admission state of an adapter manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// Invocations proceed
    Active,
    /// Invocations block until the state changes
    Holding,
    /// Invocations are rejected as transient
    Discarding,
    /// Invocations are rejected; terminal
    Inactive,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Active => "ACTIVE",
            ManagerState::Holding => "HOLDING",
            ManagerState::Discarding => "DISCARDING",
            ManagerState::Inactive => "INACTIVE",
        };
        f.write_str(name)
    }
}

struct ManagerInner {
    state: ManagerState,
    /// Admitted invocations not yet exited
    invocations: usize,
    /// Incremented on every transition
    epoch: u64,
    adapters: HashMap<AdapterId, Weak<ObjectAdapter>>,
}

/// Admission-control state machine shared by a group of adapters
pub struct AdapterManager {
    id: ManagerId,
    inner: Mutex<ManagerInner>,
    changed: Condvar,
    context: Weak<RuntimeContext>,
}

impl AdapterManager {
    /// Create a manager in the HOLDING state
    pub(crate) fn new(context: Weak<RuntimeContext>) -> Self {
        Self {
            id: ManagerId::generate(),
            inner: Mutex::new(ManagerInner {
                state: ManagerState::Holding,
                invocations: 0,
                epoch: 0,
                adapters: HashMap::new(),
            }),
            changed: Condvar::new(),
            context,
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Current admission state
    pub fn state(&self) -> ManagerState {
        self.inner.lock().state
    }

    /// Admitted invocations that have not exited yet
    pub fn invocation_count(&self) -> usize {
        self.inner.lock().invocations
    }

    /// Number of adapters governed by this manager
    pub fn adapter_count(&self) -> usize {
        self.inner.lock().adapters.len()
    }

    /// Let invocations proceed
    pub fn activate(&self) -> Result<()> {
        self.transition(ManagerState::Active).map(|_| ())
    }

    /// Block new invocations, optionally waiting for in-flight ones to drain
    pub fn hold_requests(&self, wait_for_completion: bool) -> Result<()> {
        self.check_wait_allowed(wait_for_completion)?;
        let epoch = self.transition(ManagerState::Holding)?;
        if wait_for_completion {
            self.wait_for_drain(epoch);
        }
        Ok(())
    }

    /// Reject new invocations, optionally waiting for in-flight ones to drain
    pub fn discard_requests(&self, wait_for_completion: bool) -> Result<()> {
        self.check_wait_allowed(wait_for_completion)?;
        let epoch = self.transition(ManagerState::Discarding)?;
        if wait_for_completion {
            self.wait_for_drain(epoch);
        }
        Ok(())
    }

    /// Permanently reject invocations
    ///
    /// With `etherealize`, every governed adapter tears down its active
    /// servants once in-flight invocations drained. Without
    /// `wait_for_completion` that work happens on a background worker.
    pub fn deactivate(self: &Arc<Self>, etherealize: bool, wait_for_completion: bool) -> Result<()> {
        self.check_wait_allowed(wait_for_completion)?;
        let epoch = self.transition(ManagerState::Inactive)?;

        if wait_for_completion {
            self.wait_for_drain(epoch);
            if etherealize {
                self.etherealize_adapters();
            }
            self.detach();
        } else if etherealize {
            let manager = self.clone();
            let task = move || {
                manager.wait_for_drain(epoch);
                manager.etherealize_adapters();
                manager.detach();
            };
            match self.context.upgrade() {
                Some(context) => context.spawn_background("deactivate", task),
                None => task(),
            }
        } else {
            self.detach();
        }
        Ok(())
    }

    /// Admit one invocation
    ///
    /// Blocks while HOLDING; fails with [`AdapterError::TransientRejection`]
    /// while DISCARDING and [`AdapterError::AdapterInactive`] once INACTIVE.
    pub fn enter(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                ManagerState::Active => {
                    inner.invocations += 1;
                    return Ok(());
                }
                ManagerState::Holding => {
                    trace!(manager = self.id.0, "enter blocked while holding");
                    self.changed.wait(&mut inner);
                }
                ManagerState::Discarding => return Err(AdapterError::TransientRejection),
                ManagerState::Inactive => return Err(AdapterError::AdapterInactive),
            }
        }
    }

    /// Release one admitted invocation
    pub fn exit(&self) {
        let mut inner = self.inner.lock();
        inner.invocations = inner.invocations.saturating_sub(1);
        if inner.invocations == 0 {
            self.changed.notify_all();
        }
    }

    pub(crate) fn add_adapter(&self, adapter: &Arc<ObjectAdapter>) {
        self.inner
            .lock()
            .adapters
            .insert(adapter.id(), Arc::downgrade(adapter));
    }

    /// Forget an adapter; the manager leaves the registry with its last one
    pub(crate) fn remove_adapter(&self, id: AdapterId) {
        let now_empty = {
            let mut inner = self.inner.lock();
            inner.adapters.remove(&id).is_some() && inner.adapters.is_empty()
        };
        if now_empty {
            debug!(manager = self.id.0, "last adapter removed; releasing manager");
            if let Some(context) = self.context.upgrade() {
                context.managers().remove(self.id);
            }
        }
    }

    fn transition(&self, next: ManagerState) -> Result<u64> {
        let mut inner = self.inner.lock();
        if inner.state == ManagerState::Inactive {
            return Err(AdapterError::AdapterInactive);
        }
        debug!(manager = self.id.0, from = %inner.state, to = %next, "manager transition");
        inner.state = next;
        inner.epoch += 1;
        self.changed.notify_all();
        Ok(inner.epoch)
    }

    /// Block until in-flight invocations drained or another transition happened
    fn wait_for_drain(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        while inner.epoch == epoch && inner.invocations > 0 {
            self.changed.wait(&mut inner);
        }
    }

    fn check_wait_allowed(&self, wait_for_completion: bool) -> Result<()> {
        if wait_for_completion && current::in_invocation() {
            return Err(AdapterError::BadInvocationOrder(
                "cannot wait for completion while servicing a request".to_string(),
            ));
        }
        Ok(())
    }

    fn governed_adapters(&self) -> Vec<Arc<ObjectAdapter>> {
        self.inner
            .lock()
            .adapters
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn etherealize_adapters(&self) {
        for adapter in self.governed_adapters() {
            adapter.etherealize_all();
        }
    }

    fn detach(&self) {
        self.inner.lock().adapters.clear();
        if let Some(context) = self.context.upgrade() {
            context.managers().remove(self.id);
        }
    }
}

impl fmt::Debug for AdapterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AdapterManager")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("invocations", &inner.invocations)
            .finish()
    }
}

/// Live managers of one runtime
#[derive(Default)]
pub struct ManagerRegistry {
    managers: Mutex<HashMap<ManagerId, Arc<AdapterManager>>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, manager: Arc<AdapterManager>) {
        self.managers.lock().insert(manager.id(), manager);
    }

    pub(crate) fn remove(&self, id: ManagerId) -> Option<Arc<AdapterManager>> {
        self.managers.lock().remove(&id)
    }

    pub fn get(&self, id: ManagerId) -> Option<Arc<AdapterManager>> {
        self.managers.lock().get(&id).cloned()
    }

    /// Snapshot of the live managers
    pub fn all(&self) -> Vec<Arc<AdapterManager>> {
        self.managers.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}
