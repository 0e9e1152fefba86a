//! Collaborators consulted by the dispatcher

use bytes::Bytes;

use crate::adapter::ServantRef;
use crate::types::{ObjectReference, Request, Result, RoutingKey};

/// Executes an operation on a resolved servant
///
/// The transport layer plugs in its own invoker when arguments need to be
/// unmarshaled before reaching the servant.
pub trait ServantInvoker: Send + Sync {
    fn invoke(&self, servant: &ServantRef, request: &Request) -> Result<Bytes>;
}

/// Invoker passing the raw arguments straight to [`Servant::invoke`](crate::Servant::invoke)
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectInvoker;

impl ServantInvoker for DirectInvoker {
    fn invoke(&self, servant: &ServantRef, request: &Request) -> Result<Bytes> {
        servant.invoke(&request.operation, request.args.clone())
    }
}

/// What to do with a request carrying another server's id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignIdOutcome {
    /// Answer with a location forward to this reference
    ForwardTo(ObjectReference),
    /// Answer with "object does not exist"
    NotFound,
}

/// Handles routing keys minted by a different server
pub trait ForeignIdHandler: Send + Sync {
    fn handle(&self, key: &RoutingKey) -> ForeignIdOutcome;
}
