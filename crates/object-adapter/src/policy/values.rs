//! Policy values

/// Threading model for invocations on an adapter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ThreadPolicy {
    /// Invocations run concurrently on whatever worker dispatched them
    #[default]
    RuntimeControlled,
    /// Invocations on the adapter are serialized
    SingleThread,
}

/// Whether references outlive the runtime instance that created them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Lifespan {
    #[default]
    Transient,
    Persistent,
}

/// Whether a servant may be bound to more than one id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IdUniqueness {
    #[default]
    Unique,
    Multiple,
}

/// Who assigns object ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IdAssignment {
    User,
    #[default]
    System,
}

/// Whether active servants are kept in the active object map
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ServantRetention {
    #[default]
    Retain,
    NonRetain,
}

/// How requests for ids missing from the active map are handled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RequestProcessing {
    #[default]
    ActiveObjectMapOnly,
    DefaultServant,
    ServantManager,
}

/// Whether unknown servants are activated on demand
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ImplicitActivation {
    Implicit,
    #[default]
    NoImplicit,
}

/// Policy type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyType {
    Thread,
    Lifespan,
    IdUniqueness,
    IdAssignment,
    ServantRetention,
    RequestProcessing,
    ImplicitActivation,
}

/// One policy value as supplied when creating an adapter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Policy {
    Thread(ThreadPolicy),
    Lifespan(Lifespan),
    IdUniqueness(IdUniqueness),
    IdAssignment(IdAssignment),
    ServantRetention(ServantRetention),
    RequestProcessing(RequestProcessing),
    ImplicitActivation(ImplicitActivation),
}

impl Policy {
    /// Policy type tag
    pub fn policy_type(&self) -> PolicyType {
        match self {
            Policy::Thread(_) => PolicyType::Thread,
            Policy::Lifespan(_) => PolicyType::Lifespan,
            Policy::IdUniqueness(_) => PolicyType::IdUniqueness,
            Policy::IdAssignment(_) => PolicyType::IdAssignment,
            Policy::ServantRetention(_) => PolicyType::ServantRetention,
            Policy::RequestProcessing(_) => PolicyType::RequestProcessing,
            Policy::ImplicitActivation(_) => PolicyType::ImplicitActivation,
        }
    }
}

impl From<ThreadPolicy> for Policy {
    fn from(v: ThreadPolicy) -> Self {
        Policy::Thread(v)
    }
}

impl From<Lifespan> for Policy {
    fn from(v: Lifespan) -> Self {
        Policy::Lifespan(v)
    }
}

impl From<IdUniqueness> for Policy {
    fn from(v: IdUniqueness) -> Self {
        Policy::IdUniqueness(v)
    }
}

impl From<IdAssignment> for Policy {
    fn from(v: IdAssignment) -> Self {
        Policy::IdAssignment(v)
    }
}

impl From<ServantRetention> for Policy {
    fn from(v: ServantRetention) -> Self {
        Policy::ServantRetention(v)
    }
}

impl From<RequestProcessing> for Policy {
    fn from(v: RequestProcessing) -> Self {
        Policy::RequestProcessing(v)
    }
}

impl From<ImplicitActivation> for Policy {
    fn from(v: ImplicitActivation) -> Self {
        Policy::ImplicitActivation(v)
    }
}
