//! Object adapters and their collaborators
//!
//! - Adapter tree: [`ObjectAdapter`] with child registry and destroy protocol
//! - Admission control: [`AdapterManager`] shared by groups of adapters
//! - Servant bookkeeping: [`ActiveObjectMap`]
//! - Per-thread invocation context: [`InvocationStack`] and [`Current`]

mod active_map;
mod callbacks;
mod current;
mod manager;
mod object_adapter;
mod serial;
mod servant;

#[cfg(test)]
pub(crate) mod test_support;

pub use active_map::*;
pub use callbacks::*;
pub use current::{Current, InvocationFrame, InvocationStack};
pub use manager::*;
pub use object_adapter::ObjectAdapter;
pub use servant::{same_servant, Servant, ServantKey, ServantRef};

pub(crate) use current::{in_invocation, with_stack};
pub(crate) use object_adapter::DrainMode;
pub(crate) use servant::primary_repository_id;
