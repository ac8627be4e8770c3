//! Authorization module - Policy Registry and Decision Engine
//!
//! This module implements the gateway authorization core:
//! - A compiled-in role/scope catalog and core rule set
//! - The policy store that plugins extend while loading
//! - Identity resolution for interactive and machine callers
//! - Role derivation and scope aggregation
//! - The per-request decision procedure, including record-level checks

pub mod catalog;
mod evaluator;
mod identity;
mod principal;
mod rule;
mod store;

pub use evaluator::{Access, AuthzRequest, BodyPeek, DecisionEngine, NoBody};
pub use identity::{resolve_identity, GroupMemberships, IdentityClaims};
pub use principal::ResolvedUser;
pub use rule::{PolicyRule, RuleSpec};
pub use store::{PolicySnapshot, PolicyStore, RegistrationReport};

/// Well-known role names
pub mod roles {
    pub const ALP_USER_ADMIN: &str = "ALP_USER_ADMIN";
    pub const ALP_SYSTEM_ADMIN: &str = "ALP_SYSTEM_ADMIN";
    pub const ALP_SQLEDITOR_ADMIN: &str = "ALP_SQLEDITOR_ADMIN";
    pub const ALP_NIFI_ADMIN: &str = "ALP_NIFI_ADMIN";
    pub const ALP_DASHBOARD_VIEWER: &str = "ALP_DASHBOARD_VIEWER";
    pub const TENANT_VIEWER: &str = "TENANT_VIEWER";
    pub const STUDY_WRITE_DQD_RESEARCHER: &str = "STUDY_WRITE_DQD_RESEARCHER";
    /// Record-scoped role; its scopes only ever count inside the record check.
    pub const STUDY_RESEARCHER: &str = "RESEARCHER";
}
