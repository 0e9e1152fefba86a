//! Request dispatcher
//!
//! Entry point for every incoming request. Resolves the target adapter by
//! walking the adapter path from the root, admits the invocation, resolves
//! the servant and invokes it. Raw errors never escape: every outcome is a
//! [`Response`].

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::invoker::{ForeignIdHandler, ForeignIdOutcome, ServantInvoker};
use super::scope::{InvocationScope, LocalCall};
use crate::adapter::{ObjectAdapter, ServantRef};
use crate::runtime::RuntimeContext;
use crate::types::{
    minor, operations, AdapterError, AdapterPath, CompletionStatus, ObjectReference, Request,
    Response, Result, RoutingKey,
};

/// Routes requests to servants
pub struct RequestDispatcher {
    context: Arc<RuntimeContext>,
    root: Arc<ObjectAdapter>,
    invoker: Arc<dyn ServantInvoker>,
    foreign_id_handler: Option<Arc<dyn ForeignIdHandler>>,
}

impl RequestDispatcher {
    pub(crate) fn new(
        context: Arc<RuntimeContext>,
        root: Arc<ObjectAdapter>,
        invoker: Arc<dyn ServantInvoker>,
        foreign_id_handler: Option<Arc<dyn ForeignIdHandler>>,
    ) -> Self {
        Self {
            context,
            root,
            invoker,
            foreign_id_handler,
        }
    }

    /// Dispatch one request
    pub fn dispatch(&self, request: &Request) -> Response {
        if !self.is_local(&request.key) {
            return self.dispatch_foreign(&request.key);
        }

        let limit = self.context.config().destroyed_retry_limit;
        let mut attempt = 0;
        loop {
            match self.internal_dispatch(request) {
                Ok(_) if request.one_way => return Response::NoReply,
                Ok(body) => return Response::Reply(body),
                Err(AdapterError::AdapterDestroyed(path)) if attempt < limit => {
                    attempt += 1;
                    debug!(adapter = %path, attempt, "adapter destroyed during dispatch; retrying");
                }
                Err(AdapterError::ForwardRequest(target)) => {
                    debug!(operation = %request.operation, "forwarding request");
                    return Response::LocationForward(*target);
                }
                Err(err) => {
                    debug!(operation = %request.operation, error = %err, "dispatch failed");
                    return Response::failure(&err, CompletionStatus::Maybe);
                }
            }
        }
    }

    /// Whether a routing key was minted by this runtime
    pub fn is_local(&self, key: &RoutingKey) -> bool {
        self.context
            .server_id_for(key.lifespan)
            .is_ok_and(|server_id| server_id == key.server_id)
    }

    fn dispatch_foreign(&self, key: &RoutingKey) -> Response {
        let not_found = || {
            let err = AdapterError::ObjectNotExist {
                id: key.object_id.clone(),
                minor: minor::BAD_SERVER_ID,
            };
            Response::failure(&err, CompletionStatus::No)
        };

        let Some(handler) = &self.foreign_id_handler else {
            debug!(server = %key.server_id, "request for unknown server id");
            return not_found();
        };
        match handler.handle(key) {
            ForeignIdOutcome::ForwardTo(target) => Response::LocationForward(target),
            ForeignIdOutcome::NotFound => not_found(),
        }
    }

    fn internal_dispatch(&self, request: &Request) -> Result<Bytes> {
        let key = &request.key;
        let adapter = self.find_adapter(&key.adapter_path)?;
        let scope = InvocationScope::enter(adapter.clone(), key.object_id.clone(), &request.operation)?;

        let servant = adapter.resolve_servant(&key.object_id, &request.operation)?;
        scope.set_servant(servant.clone());
        trace!(adapter = %adapter.path(), object = %key.object_id, operation = %request.operation, "invoking servant");
        self.invoke(servant, request)
    }

    /// Walk an adapter path from the root, activating missing children
    pub fn find_adapter(&self, path: &AdapterPath) -> Result<Arc<ObjectAdapter>> {
        let mut adapter = self.root.clone();
        for segment in path.segments() {
            adapter = adapter.find_child(segment, true)?;
        }
        Ok(adapter)
    }

    fn invoke(&self, servant: Option<ServantRef>, request: &Request) -> Result<Bytes> {
        let operation = request.operation.as_str();
        if operations::is_existence_query(operation) {
            return Ok(encode_bool(servant.is_none()));
        }

        let servant = servant.ok_or_else(|| AdapterError::NullServant(operation.to_string()))?;
        if operation == operations::IS_A {
            let wanted = String::from_utf8_lossy(&request.args);
            let implements = servant
                .repository_ids(&request.key.object_id)
                .iter()
                .any(|id| *id == wanted);
            return Ok(encode_bool(implements));
        }

        self.invoker.invoke(&servant, request).map_err(|err| {
            if !matches!(err, AdapterError::ForwardRequest(_)) {
                warn!(operation, error = %err, "servant invocation failed");
            }
            err
        })
    }

    /// Start a colocated invocation on the current thread
    ///
    /// The returned call keeps the invocation admitted until dropped.
    pub fn local_call(&self, reference: &ObjectReference, operation: &str) -> Result<LocalCall> {
        let key = &reference.key;
        if !self.is_local(key) {
            return Err(AdapterError::ObjectNotExist {
                id: key.object_id.clone(),
                minor: minor::BAD_SERVER_ID,
            });
        }

        let limit = self.context.config().destroyed_retry_limit;
        let mut attempt = 0;
        loop {
            match self.begin_local_call(key, operation) {
                Err(AdapterError::AdapterDestroyed(_)) if attempt < limit => attempt += 1,
                outcome => return outcome,
            }
        }
    }

    fn begin_local_call(&self, key: &RoutingKey, operation: &str) -> Result<LocalCall> {
        let adapter = self.find_adapter(&key.adapter_path)?;
        let scope = InvocationScope::enter(adapter.clone(), key.object_id.clone(), operation)?;
        let servant = adapter
            .resolve_servant(&key.object_id, operation)?
            .ok_or_else(|| AdapterError::NullServant(operation.to_string()))?;
        scope.set_servant(Some(servant.clone()));
        Ok(LocalCall::new(servant, operation, scope))
    }
}

fn encode_bool(value: bool) -> Bytes {
    Bytes::from_static(if value { b"\x01" } else { b"\x00" })
}
