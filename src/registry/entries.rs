//! Registry entry types: the heterogeneous registry data modeled as a
//! closed, `_type`-discriminated tagged union rather than an open/dynamic
//! shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a city's council seats are elected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GovernanceType {
    /// Seats tied to geographic districts.
    DistrictBased,
    /// Seats elected citywide.
    AtLarge,
    /// A mix of district and at-large seats.
    Hybrid,
}

/// Election method recorded on a terminal [`AtLargeEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElectionMethod {
    /// Citywide election, no residency requirement.
    AtLarge,
    /// Citywide election with a residency-district requirement.
    AtLargeWithResidency,
    /// Proportional representation.
    Proportional,
}

/// Closed enumeration of reasons ingestion can quarantine a FIPS, matching
/// the taxonomy the upstream GIS-portal failure modes actually produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePattern {
    /// The CVRA-mandated district map has no published GIS source.
    CvraGisUnavailable,
    /// The hybrid district/at-large map has no published GIS source.
    HybridGisUnavailable,
    /// Districts failed the Tessellation Prover's containment axiom.
    ContainmentFailure,
    /// The source published a single feature where multiple were expected.
    SingleFeature,
    /// Ward-level GIS data is unpublished.
    WardGisUnavailable,
    /// The source's geometry does not describe the jurisdiction it claims to.
    WrongData,
    /// Districts failed the Tessellation Prover's exclusivity axiom.
    ExclusivityTopologyError,
    /// The source published county-level geometry for a city-level request.
    CountyForCity,
    /// The source's geometry bleeds into a neighboring jurisdiction's data.
    RegionalDataBleeding,
    /// A failure not covered by the other patterns.
    Other,
}

/// An expected district count for a city, used by the Tessellation Prover's
/// cardinality axiom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedCountEntry {
    /// FIPS key.
    #[serde(rename = "_fips")]
    pub fips: String,
    /// City name.
    pub city_name: String,
    /// State abbreviation.
    pub state: String,
    /// Expected number of districts.
    pub expected_count: u32,
    /// How the city's seats are elected.
    pub governance_type: GovernanceType,
    /// Authoritative source URL for the expected count.
    pub source_url: String,
    /// Date the expected count was last confirmed against the source.
    pub last_verified: DateTime<Utc>,
    /// Confidence (0-100) that this expected count is still accurate.
    /// Quarantining a FIPS resets this to 0; restoring does not raise it
    /// back automatically, since the quarantine itself cast doubt on the
    /// source that produced it.
    #[serde(default = "default_confidence")]
    pub confidence: u8,
}

fn default_confidence() -> u8 {
    100
}

/// A FIPS quarantined from further ingestion attempts until restored or
/// promoted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// FIPS key.
    #[serde(rename = "_fips")]
    pub fips: String,
    /// City name.
    pub city_name: String,
    /// State abbreviation.
    pub state: String,
    /// Which failure pattern triggered the quarantine.
    pub failure_pattern: FailurePattern,
    /// Free-text reason recorded alongside the pattern.
    pub reason: String,
    /// When the entry was quarantined.
    pub timestamp: DateTime<Utc>,
}

/// A city confirmed to have no district-level geometry to ingest; terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtLargeEntry {
    /// FIPS key.
    #[serde(rename = "_fips")]
    pub fips: String,
    /// City name.
    pub name: String,
    /// State abbreviation.
    pub state: String,
    /// Number of council seats.
    pub council_size: u32,
    /// How seats are elected.
    pub election_method: ElectionMethod,
    /// Authoritative source confirming at-large status.
    pub source: String,
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A FIPS was quarantined.
    Quarantine,
    /// A quarantine was lifted.
    Restore,
    /// A quarantined FIPS was promoted to at-large.
    Promote,
    /// A new entry was added to a registry.
    Add,
    /// An existing entry was modified.
    Update,
    /// An entry was removed from a registry.
    Delete,
}

/// Which registry table an audit entry concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryName {
    /// The expected-count table.
    ExpectedCount,
    /// The quarantine table.
    Quarantine,
    /// The at-large table.
    AtLarge,
}

/// One append-only audit log entry. `before`/`after` carry the affected
/// entry's prior/new state as opaque JSON so the log can record any
/// registry's entry shape without a generic type parameter leaking into
/// every caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id of this audit entry.
    pub id: Uuid,
    /// When the action occurred.
    pub timestamp: DateTime<Utc>,
    /// What action was taken.
    pub action: AuditAction,
    /// Which registry table was affected.
    pub registry: RegistryName,
    /// FIPS the action concerns.
    pub fips: String,
    /// Who (or what automated process) performed the action.
    pub actor: String,
    /// Free-text reason.
    pub reason: String,
    /// The entry's state before the action, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// The entry's state after the action, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
}
