//! Request dispatch
//!
//! Routes incoming requests to adapters and servants and turns every
//! outcome into a [`Response`](crate::Response).

mod dispatcher;
mod invoker;
mod scope;

pub use dispatcher::*;
pub use invoker::*;
pub use scope::LocalCall;
