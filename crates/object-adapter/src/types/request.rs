//! Request, response and reference types exchanged with the transport layer

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;

use super::error::{AdapterError, CompletionStatus, ExceptionKind};
use super::identifiers::{AdapterPath, ObjectId, ServerId};
use crate::policy::Lifespan;

/// Routing key carried by every request
///
/// Names the runtime (server id for the given lifespan), the adapter path
/// below the root, and the object id within that adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    /// Lifespan the key was minted under
    pub lifespan: Lifespan,
    /// Server the key belongs to
    pub server_id: ServerId,
    /// Target adapter
    pub adapter_path: AdapterPath,
    /// Target object
    pub object_id: ObjectId,
}

impl RoutingKey {
    pub fn new(
        lifespan: Lifespan,
        server_id: ServerId,
        adapter_path: AdapterPath,
        object_id: ObjectId,
    ) -> Self {
        Self {
            lifespan,
            server_id,
            adapter_path,
            object_id,
        }
    }
}

/// Object reference handed out by adapters
///
/// `profile` is produced by the configured reference factory and is opaque
/// to the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectReference {
    /// Primary interface repository id
    pub repository_id: String,
    /// Routing key requests on this reference will carry
    pub key: RoutingKey,
    /// Encoded profile from the reference factory
    pub profile: Bytes,
}

impl ObjectReference {
    pub fn object_id(&self) -> &ObjectId {
        &self.key.object_id
    }

    pub fn adapter_path(&self) -> &AdapterPath {
        &self.key.adapter_path
    }
}

/// Opaque value a servant locator hands from preinvoke to postinvoke
pub type Cookie = Option<Arc<dyn Any + Send + Sync>>;

/// Incoming request
#[derive(Clone, Debug)]
pub struct Request {
    /// Routing key
    pub key: RoutingKey,
    /// Operation name
    pub operation: String,
    /// Marshaled arguments (not interpreted by the adapter)
    pub args: Bytes,
    /// No reply expected
    pub one_way: bool,
}

impl Request {
    /// Create a two-way request
    pub fn new(key: RoutingKey, operation: impl Into<String>, args: Bytes) -> Self {
        Self {
            key,
            operation: operation.into(),
            args,
            one_way: false,
        }
    }

    /// Create a one-way request
    pub fn one_way(key: RoutingKey, operation: impl Into<String>, args: Bytes) -> Self {
        Self {
            one_way: true,
            ..Self::new(key, operation, args)
        }
    }
}

/// System exception carried by a failure response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemException {
    pub kind: ExceptionKind,
    pub minor: u32,
    pub completion: CompletionStatus,
    pub message: String,
}

impl SystemException {
    /// Convert an adapter error using the given completion status
    pub fn from_error(err: &AdapterError, completion: CompletionStatus) -> Self {
        Self {
            kind: err.exception_kind(),
            minor: err.minor_code(),
            completion,
            message: err.to_string(),
        }
    }
}

/// Outcome of dispatching one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Normal reply with marshaled results
    Reply(Bytes),
    /// One-way request completed
    NoReply,
    /// Caller should retry on another target
    LocationForward(ObjectReference),
    /// Request failed
    Failure(SystemException),
}

impl Response {
    pub fn failure(err: &AdapterError, completion: CompletionStatus) -> Self {
        Self::Failure(SystemException::from_error(err, completion))
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_) | Self::NoReply)
    }

    /// Reply body, if this is a normal reply
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Reply(body) => Some(body),
            _ => None,
        }
    }

    /// Exception details, if this is a failure
    pub fn exception(&self) -> Option<&SystemException> {
        match self {
            Self::Failure(ex) => Some(ex),
            _ => None,
        }
    }
}
