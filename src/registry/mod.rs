//! Registry Store: the exclusive owner of expected-count, quarantine,
//! at-large, and audit-log data. Every other component holds only read
//! references into this module's types.

pub mod entries;
pub mod store;

pub use entries::{
    AtLargeEntry, AuditAction, AuditEntry, ElectionMethod, ExpectedCountEntry, FailurePattern,
    GovernanceType, QuarantineEntry, RegistryName,
};
pub use store::{FileRegistryStore, RegistryError, RegistryStore};
