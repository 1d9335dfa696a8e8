//! Tessellation Prover: the four-axiom geometric proof that a district
//! feature collection is a valid tessellation of a municipal boundary.
//!
//! All areas are computed by [`crate::geometry::ops`] and are expressed in
//! whatever planar unit the caller's projection uses (the registry
//! convention is square meters from a local equal-area projection; the
//! prover itself is unit-agnostic as long as every input uses the same
//! unit).

use std::collections::BTreeMap;

use crate::geometry::{difference_area, intersect_area, union_area_many, MultiPolygon};

/// Default maximum tolerated pairwise overlap area (150 000 m²).
pub const DEFAULT_OVERLAP_EPSILON: f64 = 150_000.0;
/// Default maximum fraction of the district union allowed to fall outside
/// the municipal boundary.
pub const DEFAULT_OUTSIDE_RATIO: f64 = 0.15;
/// Default minimum coverage ratio.
pub const DEFAULT_MIN_COVERAGE: f64 = 0.85;
/// Default maximum coverage ratio for inland jurisdictions.
pub const DEFAULT_MAX_COVERAGE_INLAND: f64 = 1.15;
/// Maximum coverage ratio once a jurisdiction is classified coastal.
pub const DEFAULT_MAX_COVERAGE_COASTAL: f64 = 2.0;
/// Water-area ratio above which a jurisdiction is classified coastal.
pub const COASTAL_WATER_RATIO_THRESHOLD: f64 = 0.15;

/// Per-FIPS coverage-bound override, for the handful of jurisdictions whose
/// geometry is known to not fit the default bounds (San Francisco, Honolulu,
/// Portland, and NYC are common examples of coastal/island jurisdictions
/// that need wider bounds; the authoritative list is curated by operators —
/// see the test module for a worked example of the mechanism itself).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageOverride {
    /// Replacement minimum coverage ratio.
    pub min_coverage: f64,
    /// Replacement maximum coverage ratio.
    pub max_coverage: f64,
}

/// Operator-curated table of per-FIPS coverage overrides. Empty by default;
/// operators populate it from field knowledge of jurisdictions whose
/// geometry (e.g. large annexed-but-unincorporated water area) doesn't fit
/// the standard bounds.
#[derive(Debug, Clone, Default)]
pub struct TessellationExceptions {
    overrides: BTreeMap<String, CoverageOverride>,
}

impl TessellationExceptions {
    /// An empty exception table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override for a FIPS code.
    pub fn insert(&mut self, fips: impl Into<String>, over: CoverageOverride) {
        self.overrides.insert(fips.into(), over);
    }

    /// Look up the override for a FIPS code, if any.
    pub fn get(&self, fips: &str) -> Option<CoverageOverride> {
        self.overrides.get(fips).copied()
    }
}

/// Which axiom failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AxiomFailure {
    /// Actual district count didn't match the expected count.
    Cardinality { actual: usize, expected: usize },
    /// One or more district pairs overlap beyond tolerance.
    Exclusivity { total_overlap: f64, offending_pairs: Vec<(usize, usize)> },
    /// Too much of the district union falls outside the municipal boundary.
    Containment { outside_ratio: f64, max_allowed: f64 },
    /// Coverage ratio fell outside the allowed band.
    Exhaustivity { coverage: f64, min_allowed: f64, max_allowed: f64 },
}

impl AxiomFailure {
    /// A one-line remediation hint for this failure, from the fixed lookup
    /// table every validation failure must carry.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            AxiomFailure::Cardinality { .. } => "check for wrong vintage or duplicate features in the source",
            AxiomFailure::Exclusivity { .. } => "districts overlap; check for duplicate or mis-digitized features",
            AxiomFailure::Containment { .. } => "district geometry extends outside the municipal boundary; check for wrong jurisdiction",
            AxiomFailure::Exhaustivity { .. } => "coverage is outside the expected band; check for wrong granularity or wrong jurisdiction",
        }
    }
}

/// Full diagnostic output of a tessellation proof attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TessellationResult {
    /// Whether every axiom passed.
    pub valid: bool,
    /// Area of the union of all districts.
    pub union_area: f64,
    /// Area of the municipal boundary used for comparison (authoritative
    /// land area if supplied, else the boundary's own computed area).
    pub municipal_area: f64,
    /// `area(union \ municipal) / area(union)`.
    pub outside_ratio: f64,
    /// `area(union) / municipal_area`.
    pub coverage_ratio: f64,
    /// Total pairwise overlap area across all district pairs.
    pub total_overlap: f64,
    /// Area of the union not covered by the municipal boundary.
    pub outside_area: f64,
    /// Area of the municipal boundary not covered by any district.
    pub uncovered_area: f64,
    /// The first axiom that failed, if any.
    pub failure: Option<AxiomFailure>,
}

/// Inputs to a tessellation proof.
pub struct TessellationInputs<'a> {
    /// One feature collection per district.
    pub districts: &'a [MultiPolygon],
    /// The municipal boundary being tessellated.
    pub municipal: &'a MultiPolygon,
    /// Expected district count from the registry.
    pub expected_count: usize,
    /// Authoritative land area, overriding the municipal geometry's own
    /// computed area when supplied.
    pub authoritative_land_area: Option<f64>,
    /// Authoritative pre-computed district union area, overriding the
    /// geometry kernel's own union-area computation when supplied.
    pub authoritative_union_area: Option<f64>,
    /// Water area, used to classify the jurisdiction as coastal.
    pub water_area: Option<f64>,
    /// FIPS, for per-city coverage exception lookup.
    pub fips: Option<&'a str>,
}

/// Run the four-axiom tessellation proof, evaluated in cost order and
/// stopping at the first failure.
pub fn prove_tessellation(inputs: &TessellationInputs, exceptions: &TessellationExceptions) -> TessellationResult {
    let expected = inputs.expected_count;
    let actual = inputs.districts.len();

    let municipal_area = inputs.authoritative_land_area.unwrap_or_else(|| crate::geometry::multipolygon_area(inputs.municipal));
    let union_area = inputs
        .authoritative_union_area
        .unwrap_or_else(|| union_area_many(&inputs.districts.iter().collect::<Vec<_>>()));
    let outside_area = difference_area(&union_of(inputs.districts), inputs.municipal).min(union_area);
    let outside_ratio = if union_area > 0.0 { outside_area / union_area } else { 0.0 };
    let coverage_ratio = if municipal_area > 0.0 { union_area / municipal_area } else { f64::INFINITY };
    let uncovered_area = (municipal_area - (union_area - outside_area)).max(0.0);

    if actual != expected {
        return TessellationResult {
            valid: false,
            union_area,
            municipal_area,
            outside_ratio,
            coverage_ratio,
            total_overlap: 0.0,
            outside_area,
            uncovered_area,
            failure: Some(AxiomFailure::Cardinality { actual, expected }),
        };
    }

    let mut total_overlap = 0.0;
    let mut offending_pairs = Vec::new();
    for i in 0..inputs.districts.len() {
        for j in (i + 1)..inputs.districts.len() {
            let overlap = intersect_area(&inputs.districts[i], &inputs.districts[j]);
            total_overlap += overlap;
            if overlap > DEFAULT_OVERLAP_EPSILON {
                offending_pairs.push((i, j));
            }
        }
    }
    if !offending_pairs.is_empty() {
        return TessellationResult {
            valid: false,
            union_area,
            municipal_area,
            outside_ratio,
            coverage_ratio,
            total_overlap,
            outside_area,
            uncovered_area,
            failure: Some(AxiomFailure::Exclusivity { total_overlap, offending_pairs }),
        };
    }

    if outside_ratio > DEFAULT_OUTSIDE_RATIO {
        return TessellationResult {
            valid: false,
            union_area,
            municipal_area,
            outside_ratio,
            coverage_ratio,
            total_overlap,
            outside_area,
            uncovered_area,
            failure: Some(AxiomFailure::Containment { outside_ratio, max_allowed: DEFAULT_OUTSIDE_RATIO }),
        };
    }

    let override_bounds = inputs.fips.and_then(|f| exceptions.get(f));
    let is_coastal = inputs
        .water_area
        .map(|water| municipal_area > 0.0 && water / (municipal_area + water) > COASTAL_WATER_RATIO_THRESHOLD)
        .unwrap_or(false);
    let (min_coverage, max_coverage) = match override_bounds {
        Some(o) => (o.min_coverage, o.max_coverage),
        None => (
            DEFAULT_MIN_COVERAGE,
            if is_coastal { DEFAULT_MAX_COVERAGE_COASTAL } else { DEFAULT_MAX_COVERAGE_INLAND },
        ),
    };

    if coverage_ratio < min_coverage || coverage_ratio > max_coverage {
        return TessellationResult {
            valid: false,
            union_area,
            municipal_area,
            outside_ratio,
            coverage_ratio,
            total_overlap,
            outside_area,
            uncovered_area,
            failure: Some(AxiomFailure::Exhaustivity { coverage: coverage_ratio, min_allowed: min_coverage, max_allowed: max_coverage }),
        };
    }

    TessellationResult {
        valid: true,
        union_area,
        municipal_area,
        outside_ratio,
        coverage_ratio,
        total_overlap,
        outside_area,
        uncovered_area,
        failure: None,
    }
}

fn union_of(districts: &[MultiPolygon]) -> MultiPolygon {
    MultiPolygon::new(districts.iter().flat_map(|d| d.polygons.clone()).collect())
}
