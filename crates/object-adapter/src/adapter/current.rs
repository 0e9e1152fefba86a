//! Per-thread invocation context
//!
//! Every invocation pushes a frame describing its adapter, object id and
//! operation. Servant code reaches the frame through [`Current`], so nested
//! and colocated calls need no extra parameters.

use std::cell::RefCell;
use std::sync::Arc;

use super::object_adapter::ObjectAdapter;
use super::servant::ServantRef;
use crate::types::{AdapterError, AdapterId, Cookie, ObjectId, Result};

/// One in-flight invocation
pub struct InvocationFrame {
    /// Adapter serving the invocation
    pub adapter: Arc<ObjectAdapter>,
    /// Target object id
    pub object_id: ObjectId,
    /// Locator cookie handed from preinvoke to postinvoke
    pub cookie: Cookie,
    /// Operation name
    pub operation: String,
    /// Resolved servant, once known
    pub servant: Option<ServantRef>,
    /// Locator preinvoke has run
    pub pre_invoked: bool,
    /// Locator postinvoke has run
    pub post_invoked: bool,
}

/// LIFO stack of invocation frames
#[derive(Default)]
pub struct InvocationStack {
    frames: Vec<InvocationFrame>,
}

impl InvocationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame for a new invocation
    pub fn push(
        &mut self,
        adapter: Arc<ObjectAdapter>,
        object_id: ObjectId,
        cookie: Cookie,
        operation: impl Into<String>,
    ) {
        self.frames.push(InvocationFrame {
            adapter,
            object_id,
            cookie,
            operation: operation.into(),
            servant: None,
            pre_invoked: false,
            post_invoked: false,
        });
    }

    /// Top frame
    pub fn peek(&self) -> Result<&InvocationFrame> {
        self.frames.last().ok_or(AdapterError::NoActiveInvocation)
    }

    /// Top frame, mutably
    pub fn peek_mut(&mut self) -> Result<&mut InvocationFrame> {
        self.frames.last_mut().ok_or(AdapterError::NoActiveInvocation)
    }

    /// Remove the top frame; popping an empty stack does nothing
    pub fn pop(&mut self) -> Option<InvocationFrame> {
        self.frames.pop()
    }

    pub fn set_servant(&mut self, servant: Option<ServantRef>) -> Result<()> {
        self.peek_mut()?.servant = servant;
        Ok(())
    }

    pub fn mark_pre_invoked(&mut self) -> Result<()> {
        self.peek_mut()?.pre_invoked = true;
        Ok(())
    }

    pub fn mark_post_invoked(&mut self) -> Result<()> {
        self.peek_mut()?.post_invoked = true;
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

thread_local! {
    static STACK: RefCell<InvocationStack> = RefCell::new(InvocationStack::new());
}

/// Run a closure against this thread's stack
///
/// The closure must not call back into application code.
pub(crate) fn with_stack<R>(f: impl FnOnce(&mut InvocationStack) -> R) -> R {
    STACK.with(|stack| f(&mut stack.borrow_mut()))
}

/// Whether this thread is currently serving an invocation
pub(crate) fn in_invocation() -> bool {
    with_stack(|stack| !stack.is_empty())
}

/// Whether this thread is serving an invocation on `adapter` or on one of
/// its descendants
pub(crate) fn serving_within(adapter: AdapterId) -> bool {
    let serving: Vec<Arc<ObjectAdapter>> =
        with_stack(|stack| stack.frames.iter().map(|frame| frame.adapter.clone()).collect());
    serving.into_iter().any(|frame_adapter| {
        let mut node = Some(frame_adapter);
        while let Some(current) = node {
            if current.id() == adapter {
                return true;
            }
            node = current.parent();
        }
        false
    })
}

/// Introspection of the invocation running on this thread
///
/// Every accessor fails with [`AdapterError::NoActiveInvocation`] outside of
/// an invocation.
pub struct Current;

impl Current {
    /// Adapter serving the current invocation
    pub fn adapter() -> Result<Arc<ObjectAdapter>> {
        with_stack(|stack| stack.peek().map(|frame| frame.adapter.clone()))
    }

    /// Object id targeted by the current invocation
    pub fn object_id() -> Result<ObjectId> {
        with_stack(|stack| stack.peek().map(|frame| frame.object_id.clone()))
    }

    /// Operation of the current invocation
    pub fn operation() -> Result<String> {
        with_stack(|stack| stack.peek().map(|frame| frame.operation.clone()))
    }

    /// Servant resolved for the current invocation
    pub fn servant() -> Result<Option<ServantRef>> {
        with_stack(|stack| stack.peek().map(|frame| frame.servant.clone()))
    }

    /// Number of nested invocations on this thread
    pub fn depth() -> usize {
        with_stack(|stack| stack.depth())
    }
}
