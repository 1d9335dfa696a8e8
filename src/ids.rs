//! Shared identifiers and closed enumerations used across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for a [`crate::boundary::Boundary`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoundaryId(String);

impl BoundaryId {
    /// Wrap an arbitrary identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 7-digit Census PLACE identifier naming a U.S. municipal entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fips(String);

impl Fips {
    /// Parse and validate a FIPS code. Accepts any non-empty ASCII-digit string;
    /// callers needing strict 7-digit enforcement should check `as_str().len()`.
    pub fn new(code: impl Into<String>) -> Result<Self, FipsError> {
        let code = code.into();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(FipsError::InvalidFormat(code));
        }
        Ok(Self(code))
    }

    /// Borrow the FIPS code text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error constructing a [`Fips`].
#[derive(Debug, thiserror::Error)]
pub enum FipsError {
    /// The supplied code was not composed entirely of ASCII digits.
    #[error("invalid FIPS code: {0}")]
    InvalidFormat(String),
}

/// Identifier for a [`crate::snapshot::store::Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Generate a fresh random snapshot id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a [`crate::orchestrator::job::JobState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Boundary layer type, ordered coarsest-to-finest is NOT the `Ord` derived
/// here; see [`LayerType::precision`] for the resolution precision ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Country,
    StateProvince,
    County,
    CityLimits,
    CityCouncilDistrict,
    Ward,
    VotingPrecinct,
    Congressional,
    StateSenate,
    StateHouse,
    Municipal,
}

impl LayerType {
    /// Precision rank used for sorting resolver results; lower is finer.
    ///
    /// `voting_precinct < city_council_district < ward < city_limits <
    /// municipal < county < state_senate < state_house < congressional <
    /// state_province < country`
    pub fn precision(self) -> u8 {
        match self {
            LayerType::VotingPrecinct => 0,
            LayerType::CityCouncilDistrict => 1,
            LayerType::Ward => 2,
            LayerType::CityLimits => 3,
            LayerType::Municipal => 4,
            LayerType::County => 5,
            LayerType::StateSenate => 6,
            LayerType::StateHouse => 7,
            LayerType::Congressional => 8,
            LayerType::StateProvince => 9,
            LayerType::Country => 10,
        }
    }

    /// All variants, for iteration in tests and fixtures.
    pub const ALL: [LayerType; 11] = [
        LayerType::Country,
        LayerType::StateProvince,
        LayerType::County,
        LayerType::CityLimits,
        LayerType::CityCouncilDistrict,
        LayerType::Ward,
        LayerType::VotingPrecinct,
        LayerType::Congressional,
        LayerType::StateSenate,
        LayerType::StateHouse,
        LayerType::Municipal,
    ];
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayerType::Country => "country",
            LayerType::StateProvince => "state_province",
            LayerType::County => "county",
            LayerType::CityLimits => "city_limits",
            LayerType::CityCouncilDistrict => "city_council_district",
            LayerType::Ward => "ward",
            LayerType::VotingPrecinct => "voting_precinct",
            LayerType::Congressional => "congressional",
            LayerType::StateSenate => "state_senate",
            LayerType::StateHouse => "state_house",
            LayerType::Municipal => "municipal",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LayerType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "country" => LayerType::Country,
            "state_province" => LayerType::StateProvince,
            "county" => LayerType::County,
            "city_limits" => LayerType::CityLimits,
            "city_council_district" => LayerType::CityCouncilDistrict,
            "ward" => LayerType::Ward,
            "voting_precinct" => LayerType::VotingPrecinct,
            "congressional" => LayerType::Congressional,
            "state_senate" => LayerType::StateSenate,
            "state_house" => LayerType::StateHouse,
            "municipal" => LayerType::Municipal,
            _ => return Err(()),
        })
    }
}

/// Authority level of a boundary's source: 0 (community-maintained) through
/// 5 (federal mandate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuthorityLevel(u8);

impl AuthorityLevel {
    /// Construct an authority level, clamped to the valid `0..=5` range.
    pub fn new(level: u8) -> Result<Self, AuthorityLevelError> {
        if level > 5 {
            return Err(AuthorityLevelError::OutOfRange(level));
        }
        Ok(Self(level))
    }

    /// The raw integer value.
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Error constructing an [`AuthorityLevel`].
#[derive(Debug, thiserror::Error)]
pub enum AuthorityLevelError {
    /// The supplied level was outside `0..=5`.
    #[error("authority level {0} is out of the valid 0..=5 range")]
    OutOfRange(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_ranking_matches_spec_order() {
        assert!(LayerType::VotingPrecinct.precision() < LayerType::CityCouncilDistrict.precision());
        assert!(LayerType::CityCouncilDistrict.precision() < LayerType::Ward.precision());
        assert!(LayerType::Ward.precision() < LayerType::CityLimits.precision());
        assert!(LayerType::CityLimits.precision() < LayerType::Municipal.precision());
        assert!(LayerType::Municipal.precision() < LayerType::County.precision());
        assert!(LayerType::County.precision() < LayerType::StateSenate.precision());
        assert!(LayerType::StateSenate.precision() < LayerType::StateHouse.precision());
        assert!(LayerType::StateHouse.precision() < LayerType::Congressional.precision());
        assert!(LayerType::Congressional.precision() < LayerType::StateProvince.precision());
        assert!(LayerType::StateProvince.precision() < LayerType::Country.precision());
    }

    #[test]
    fn layer_type_round_trips_through_display_and_from_str() {
        for layer in LayerType::ALL {
            let s = layer.to_string();
            assert_eq!(LayerType::from_str(&s), Ok(layer));
        }
    }

    #[test]
    fn fips_rejects_non_digit_codes() {
        assert!(Fips::new("0550100").is_ok());
        assert!(Fips::new("abc1234").is_err());
        assert!(Fips::new("").is_err());
    }

    #[test]
    fn authority_level_rejects_out_of_range() {
        assert!(AuthorityLevel::new(5).is_ok());
        assert!(AuthorityLevel::new(6).is_err());
    }
}
