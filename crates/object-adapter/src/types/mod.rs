//! Core adapter types
//!
//! - Identifiers: ObjectId, AdapterPath, ServerId
//! - Requests: RoutingKey, Request, Response, ObjectReference
//! - Errors: AdapterError and the system exception mapping

mod error;
mod identifiers;
mod request;

pub use error::*;
pub use identifiers::{AdapterId, AdapterPath, ManagerId, ObjectId, ServerId};
pub use request::*;

/// Reserved introspection operations
///
/// These may legitimately resolve to no servant at all.
pub mod operations {
    /// Interface membership query
    pub const IS_A: &str = "_is_a";
    /// Existence query
    pub const NON_EXISTENT: &str = "_non_existent";
    /// Existence query (legacy spelling)
    pub const NOT_EXISTENT: &str = "_not_existent";
    /// Interface description
    pub const INTERFACE: &str = "_interface";

    /// All reserved operations
    pub const RESERVED: &[&str] = &[IS_A, NON_EXISTENT, NOT_EXISTENT, INTERFACE];

    /// Whether the operation is one of the reserved introspection operations
    pub fn is_reserved(operation: &str) -> bool {
        RESERVED.contains(&operation)
    }

    /// Whether the operation is an existence query
    pub fn is_existence_query(operation: &str) -> bool {
        operation == NON_EXISTENT || operation == NOT_EXISTENT
    }
}
