//! Invocation scopes: admission plus invocation frame for one call

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::adapter::{with_stack, ObjectAdapter, ServantManager, ServantRef};
use crate::types::{ObjectId, Result};

/// One admitted invocation with its frame on this thread's stack
///
/// Dropping the scope runs any owed locator postinvoke, releases the
/// admission and pops the frame, in that order. The scope is bound to the
/// thread that created it.
pub(crate) struct InvocationScope {
    adapter: Arc<ObjectAdapter>,
    _thread_bound: PhantomData<*const ()>,
}

impl InvocationScope {
    pub(crate) fn enter(adapter: Arc<ObjectAdapter>, object_id: ObjectId, operation: &str) -> Result<Self> {
        adapter.enter()?;
        with_stack(|stack| stack.push(adapter.clone(), object_id, None, operation));
        Ok(Self {
            adapter,
            _thread_bound: PhantomData,
        })
    }

    pub(crate) fn adapter(&self) -> &Arc<ObjectAdapter> {
        &self.adapter
    }

    pub(crate) fn set_servant(&self, servant: Option<ServantRef>) {
        // The frame pushed in `enter` is on top while the scope lives
        if let Err(err) = with_stack(|stack| stack.set_servant(servant)) {
            trace!(adapter = %self.adapter.path(), error = %err, "no frame to record servant on");
        }
    }

    fn run_postinvoke(&self) {
        let owed = with_stack(|stack| {
            let frame = stack.peek_mut().ok()?;
            if !frame.pre_invoked || frame.post_invoked {
                return None;
            }
            frame.post_invoked = true;
            Some((
                frame.object_id.clone(),
                frame.operation.clone(),
                frame.cookie.take(),
                frame.servant.clone(),
            ))
        });

        if let Some((id, operation, cookie, servant)) = owed {
            if let Ok(Some(ServantManager::Locator(locator))) = self.adapter.servant_manager() {
                trace!(adapter = %self.adapter.path(), object = %id, "postinvoke");
                locator.postinvoke(&id, &self.adapter, &operation, cookie, servant);
            }
        }
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        self.run_postinvoke();
        self.adapter.exit();
        with_stack(|stack| stack.pop());
    }
}

/// Colocated invocation in progress
///
/// Holds the resolved servant while the invocation stays admitted and its
/// frame stays on the current thread's stack. Dropping the call ends the
/// invocation.
pub struct LocalCall {
    servant: ServantRef,
    operation: String,
    scope: InvocationScope,
}

impl LocalCall {
    pub(crate) fn new(servant: ServantRef, operation: &str, scope: InvocationScope) -> Self {
        Self {
            servant,
            operation: operation.to_string(),
            scope,
        }
    }

    pub fn servant(&self) -> &ServantRef {
        &self.servant
    }

    pub fn adapter(&self) -> &Arc<ObjectAdapter> {
        self.scope.adapter()
    }

    /// Run the operation on the held servant
    pub fn invoke(&self, args: Bytes) -> Result<Bytes> {
        self.servant.invoke(&self.operation, args)
    }
}
