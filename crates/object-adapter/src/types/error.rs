//! Object adapter error types

use thiserror::Error;

use super::identifiers::{AdapterPath, ObjectId};
use super::request::ObjectReference;

/// Result type for object adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors raised by adapters, managers and the dispatcher
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// No servant can be found for the object id
    #[error("object does not exist: {id} (minor {minor})")]
    ObjectNotExist { id: ObjectId, minor: u32 },

    /// Adapter lookup by name failed
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),

    /// The adapter was destroyed while the call was being admitted
    #[error("adapter destroyed: {0}")]
    AdapterDestroyed(AdapterPath),

    /// The adapter manager is inactive
    #[error("adapter manager is inactive")]
    AdapterInactive,

    /// The adapter manager is discarding requests
    #[error("request rejected: adapter manager is discarding")]
    TransientRejection,

    /// Default servant policy without a configured default servant
    #[error("no default servant configured")]
    NoDefaultServant,

    /// A servant returned by an activator is already bound to another id
    #[error("servant is already active under a different id")]
    ObjectAdapterConflict,

    /// Servant manager policy without a configured servant manager
    #[error("no servant manager configured")]
    NoServantManager,

    /// Servant manager kind does not match the retention policy
    #[error("servant manager kind does not match the retention policy")]
    BadServantManager,

    /// Policy list rejected by the combination validator
    #[error("invalid policy at index {index}")]
    PolicyViolation { index: usize },

    /// Introspection called outside of any invocation
    #[error("no active invocation on this thread")]
    NoActiveInvocation,

    /// Operation not permitted by the adapter's policies
    #[error("wrong policy: {0}")]
    WrongPolicy(&'static str),

    /// Reference was not created by this adapter
    #[error("reference does not belong to adapter {0}")]
    WrongAdapter(AdapterPath),

    /// A child adapter with this name already exists
    #[error("adapter already exists: {0}")]
    AdapterAlreadyExists(String),

    /// The object id is already active
    #[error("object already active: {0}")]
    ObjectAlreadyActive(ObjectId),

    /// The object id is not active
    #[error("object not active: {0}")]
    ObjectNotActive(ObjectId),

    /// The servant is already active and ids must be unique
    #[error("servant already active")]
    ServantAlreadyActive,

    /// The servant is not active and cannot be implicitly activated
    #[error("servant not active")]
    ServantNotActive,

    /// Resolution yielded no servant for an operation that needs one
    #[error("null servant for operation {0}")]
    NullServant(String),

    /// Call made in a state where it cannot be honoured
    #[error("bad invocation order: {0}")]
    BadInvocationOrder(String),

    /// Repository id does not match the active servant
    #[error("bad repository id: expected {expected}, got {found}")]
    BadRepositoryId { expected: String, found: String },

    /// Persistent adapter requested without a persistent server id
    #[error("persistent server id not configured")]
    PersistentServerIdNotSet,

    /// The request must be retried against another target
    #[error("forward request to {}", .0.repository_id)]
    ForwardRequest(Box<ObjectReference>),

    /// The servant raised a failure while executing the operation
    #[error("servant failure: {0}")]
    ServantFailure(String),

    /// Internal consistency failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Standard system exception kinds reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    ObjectNotExist,
    ObjAdapter,
    Transient,
    BadInvOrder,
    BadParam,
    Internal,
    Unknown,
}

/// Whether the target may have executed side effects before failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    Yes,
    No,
    Maybe,
}

impl AdapterError {
    /// Shorthand for a missing object
    pub fn object_not_exist(id: ObjectId) -> Self {
        Self::ObjectNotExist {
            id,
            minor: minor::NULL_SERVANT,
        }
    }

    /// The system exception kind this error is reported as
    pub fn exception_kind(&self) -> ExceptionKind {
        match self {
            Self::ObjectNotExist { .. } => ExceptionKind::ObjectNotExist,
            Self::AdapterDestroyed(_) => ExceptionKind::ObjectNotExist,
            Self::AdapterInactive => ExceptionKind::ObjAdapter,
            Self::TransientRejection => ExceptionKind::Transient,
            Self::AdapterNotFound(_)
            | Self::NoDefaultServant
            | Self::ObjectAdapterConflict
            | Self::NoServantManager
            | Self::BadServantManager
            | Self::NullServant(_)
            | Self::PersistentServerIdNotSet => ExceptionKind::ObjAdapter,
            Self::BadInvocationOrder(_) | Self::NoActiveInvocation => ExceptionKind::BadInvOrder,
            Self::BadRepositoryId { .. } | Self::PolicyViolation { .. } => ExceptionKind::BadParam,
            Self::Internal(_) => ExceptionKind::Internal,
            _ => ExceptionKind::Unknown,
        }
    }

    /// Minor code attached to the reported system exception
    pub fn minor_code(&self) -> u32 {
        match self {
            Self::ObjectNotExist { minor, .. } => *minor,
            Self::AdapterDestroyed(_) => minor::ADAPTER_DESTROYED,
            Self::AdapterNotFound(_) => minor::ADAPTER_NOT_FOUND,
            Self::NoDefaultServant => minor::NO_DEFAULT_SERVANT,
            Self::ObjectAdapterConflict => minor::SERVANT_NOT_UNIQUE,
            Self::NoServantManager => minor::NO_SERVANT_MANAGER,
            Self::BadServantManager => minor::BAD_SERVANT_MANAGER,
            Self::NullServant(_) => minor::NULL_SERVANT,
            Self::TransientRejection => minor::DISCARDING,
            Self::AdapterInactive => minor::ADAPTER_INACTIVE,
            Self::BadRepositoryId { .. } => minor::BAD_REPOSITORY_ID,
            Self::PersistentServerIdNotSet => minor::PERSISTENT_SERVER_ID_NOT_SET,
            Self::Internal(_) => minor::INTERNAL_RESOLUTION,
            _ => 0,
        }
    }
}

/// Minor codes carried by failure responses
pub mod minor {
    /// No servant was found or supplied for the target id
    pub const NULL_SERVANT: u32 = 0x0001;
    /// Routing key names a server id that is not ours
    pub const BAD_SERVER_ID: u32 = 0x0002;
    /// Adapter path could not be resolved
    pub const ADAPTER_NOT_FOUND: u32 = 0x0003;
    /// Adapter was destroyed and could not be recreated in time
    pub const ADAPTER_DESTROYED: u32 = 0x0004;
    /// Default servant policy without a default servant
    pub const NO_DEFAULT_SERVANT: u32 = 0x0005;
    /// Servant manager policy without a servant manager
    pub const NO_SERVANT_MANAGER: u32 = 0x0006;
    /// Servant manager of the wrong kind
    pub const BAD_SERVANT_MANAGER: u32 = 0x0007;
    /// Incarnated servant already bound under another id
    pub const SERVANT_NOT_UNIQUE: u32 = 0x0008;
    /// Manager is discarding requests
    pub const DISCARDING: u32 = 0x0009;
    /// Manager is inactive
    pub const ADAPTER_INACTIVE: u32 = 0x000a;
    /// Repository id mismatch
    pub const BAD_REPOSITORY_ID: u32 = 0x000b;
    /// Persistent lifespan without a persistent server id
    pub const PERSISTENT_SERVER_ID_NOT_SET: u32 = 0x000c;
    /// Policy combination reached resolution without a branch
    pub const INTERNAL_RESOLUTION: u32 = 0x000d;
}
