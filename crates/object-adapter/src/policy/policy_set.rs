//! Validated policy bundle and the combination validator

use std::collections::HashMap;

use super::values::*;
use crate::types::{AdapterError, Result};

/// Immutable set of the seven adapter policies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PolicySet {
    thread: ThreadPolicy,
    lifespan: Lifespan,
    id_uniqueness: IdUniqueness,
    id_assignment: IdAssignment,
    retention: ServantRetention,
    request_processing: RequestProcessing,
    implicit_activation: ImplicitActivation,
}

impl PolicySet {
    /// Build a policy set from a list of policies
    ///
    /// Unsupplied policies take their default. Fails with
    /// [`AdapterError::PolicyViolation`] carrying the lowest list index
    /// implicated in the first rule violation.
    pub fn new(policies: &[Policy]) -> Result<Self> {
        if let Some(index) = validate(policies) {
            return Err(AdapterError::PolicyViolation { index });
        }

        let mut set = Self::default();
        // Validation guarantees duplicates agree, so the order of application
        // does not matter.
        for policy in policies {
            match *policy {
                Policy::Thread(v) => set.thread = v,
                Policy::Lifespan(v) => set.lifespan = v,
                Policy::IdUniqueness(v) => set.id_uniqueness = v,
                Policy::IdAssignment(v) => set.id_assignment = v,
                Policy::ServantRetention(v) => set.retention = v,
                Policy::RequestProcessing(v) => set.request_processing = v,
                Policy::ImplicitActivation(v) => set.implicit_activation = v,
            }
        }
        Ok(set)
    }

    /// Policies of the root adapter: defaults plus implicit activation
    pub fn root() -> Self {
        Self {
            implicit_activation: ImplicitActivation::Implicit,
            ..Self::default()
        }
    }

    pub fn thread(&self) -> ThreadPolicy {
        self.thread
    }

    pub fn lifespan(&self) -> Lifespan {
        self.lifespan
    }

    pub fn id_uniqueness(&self) -> IdUniqueness {
        self.id_uniqueness
    }

    pub fn id_assignment(&self) -> IdAssignment {
        self.id_assignment
    }

    pub fn retention(&self) -> ServantRetention {
        self.retention
    }

    pub fn request_processing(&self) -> RequestProcessing {
        self.request_processing
    }

    pub fn implicit_activation(&self) -> ImplicitActivation {
        self.implicit_activation
    }

    pub fn is_single_threaded(&self) -> bool {
        self.thread == ThreadPolicy::SingleThread
    }

    pub fn is_transient(&self) -> bool {
        self.lifespan == Lifespan::Transient
    }

    pub fn is_unique_ids(&self) -> bool {
        self.id_uniqueness == IdUniqueness::Unique
    }

    pub fn is_multiple_ids(&self) -> bool {
        self.id_uniqueness == IdUniqueness::Multiple
    }

    pub fn is_system_assigned_ids(&self) -> bool {
        self.id_assignment == IdAssignment::System
    }

    pub fn retains_servants(&self) -> bool {
        self.retention == ServantRetention::Retain
    }

    pub fn uses_active_map_only(&self) -> bool {
        self.request_processing == RequestProcessing::ActiveObjectMapOnly
    }

    pub fn uses_default_servant(&self) -> bool {
        self.request_processing == RequestProcessing::DefaultServant
    }

    pub fn uses_servant_manager(&self) -> bool {
        self.request_processing == RequestProcessing::ServantManager
    }

    pub fn is_implicitly_activated(&self) -> bool {
        self.implicit_activation == ImplicitActivation::Implicit
    }

    /// Effective value of one policy type
    pub fn effective(&self, policy_type: PolicyType) -> Policy {
        match policy_type {
            PolicyType::Thread => Policy::Thread(self.thread),
            PolicyType::Lifespan => Policy::Lifespan(self.lifespan),
            PolicyType::IdUniqueness => Policy::IdUniqueness(self.id_uniqueness),
            PolicyType::IdAssignment => Policy::IdAssignment(self.id_assignment),
            PolicyType::ServantRetention => Policy::ServantRetention(self.retention),
            PolicyType::RequestProcessing => Policy::RequestProcessing(self.request_processing),
            PolicyType::ImplicitActivation => Policy::ImplicitActivation(self.implicit_activation),
        }
    }
}

/// Validate a policy list
///
/// Returns the lowest list index implicated in the first violation found, or
/// `None` when the combination is legal. Rules, checked in order:
///
/// 1. two different values of the same policy type
/// 2. active-map-only processing with an explicit non-retain
/// 3. implicit activation with user ids or non-retain
pub fn validate(policies: &[Policy]) -> Option<usize> {
    let mut seen: HashMap<PolicyType, (usize, Policy)> = HashMap::new();

    for (index, policy) in policies.iter().enumerate() {
        match seen.get(&policy.policy_type()) {
            Some((first, previous)) if previous != policy => return Some(*first),
            Some(_) => {}
            None => {
                seen.insert(policy.policy_type(), (index, *policy));
            }
        }
    }

    let processing = seen.get(&PolicyType::RequestProcessing).copied();
    let retention = seen.get(&PolicyType::ServantRetention).copied();
    let assignment = seen.get(&PolicyType::IdAssignment).copied();
    let implicit = seen.get(&PolicyType::ImplicitActivation).copied();

    let non_retain = match retention {
        Some((index, Policy::ServantRetention(ServantRetention::NonRetain))) => Some(index),
        _ => None,
    };

    let active_map_only = match processing {
        None => Some(None),
        Some((index, Policy::RequestProcessing(RequestProcessing::ActiveObjectMapOnly))) => {
            Some(Some(index))
        }
        Some(_) => None,
    };
    if let (Some(processing_index), Some(retention_index)) = (active_map_only, non_retain) {
        return Some(processing_index.map_or(retention_index, |p| p.min(retention_index)));
    }

    if let Some((implicit_index, Policy::ImplicitActivation(ImplicitActivation::Implicit))) =
        implicit
    {
        let user_ids = match assignment {
            Some((index, Policy::IdAssignment(IdAssignment::User))) => Some(index),
            _ => None,
        };
        let offenders = [user_ids, non_retain];
        if offenders.iter().any(Option::is_some) {
            let lowest = offenders
                .iter()
                .flatten()
                .copied()
                .fold(implicit_index, usize::min);
            return Some(lowest);
        }
    }

    None
}
