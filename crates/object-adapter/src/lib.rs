//! Hierarchical object adapter runtime
//!
//! This crate maps incoming requests, named by an adapter path and an opaque
//! object id, to application servants. Lifecycle policies govern how that
//! mapping is formed; adapter managers gate admission; the destroy protocol
//! drains in-flight invocations before tearing an adapter down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                RequestDispatcher (dispatch)                 │
//! │  - server id check / foreign id handler                     │
//! │  - adapter path walk, retry on destroyed adapters           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ObjectAdapter tree   │  AdapterManager   │  Invocation     │
//! │  - child registry     │  - ACTIVE/HOLDING │    context      │
//! │  - servant resolution │    DISCARDING/    │  - per-thread   │
//! │  - destroy protocol   │    INACTIVE       │    frame stack  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PolicySet + validator   │   ActiveObjectMap                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Servants, servant managers, adapter activators and the reference
//! factory are supplied by the application.
//!
//! # Modules
//!
//! - [`types`]: Identifiers, requests, responses and errors
//! - [`policy`]: Lifecycle policies and the combination validator
//! - [`adapter`]: Adapters, managers and the invocation context
//! - [`dispatch`]: Request dispatch
//! - [`runtime`]: Configuration and the runtime owning the root adapter

pub mod types;
pub mod policy;
pub mod adapter;
pub mod dispatch;
pub mod runtime;

// Re-export main types and the runtime API
pub use types::{
    AdapterError, Result,
    ObjectId, AdapterPath, ServerId,
    RoutingKey, ObjectReference, Request, Response,
    CompletionStatus, ExceptionKind, SystemException,
};
pub use policy::{Policy, PolicySet};
pub use adapter::{
    AdapterActivator, AdapterManager, Current, ManagerState, ObjectAdapter,
    Servant, ServantActivator, ServantLocator, ServantManager, ServantRef,
};
pub use dispatch::{ForeignIdHandler, ForeignIdOutcome, LocalCall, RequestDispatcher, ServantInvoker};
pub use runtime::{AdapterRuntime, RuntimeBuilder, RuntimeConfig};

/// Name of the root adapter
pub const ROOT_ADAPTER_NAME: &str = "RootPOA";

/// Default number of dispatch retries after an adapter was destroyed
pub const DEFAULT_DESTROYED_RETRY_LIMIT: usize = 16;

/// Default name prefix of background worker threads
pub const DEFAULT_WORKER_THREAD_NAME: &str = "adapter-worker";
