//! Adapter lifecycle policies
//!
//! Seven orthogonal policies govern how an adapter maps object ids to
//! servants. A [`PolicySet`] is built once from a list of [`Policy`] values,
//! validated, and never changes afterwards.

mod policy_set;
mod values;

pub use policy_set::*;
pub use values::*;
