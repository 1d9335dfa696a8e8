//! Sanity Checker: two cheap deterministic checks run before the expensive
//! Tessellation Prover.

use crate::geometry::{multipolygon_centroid, Coordinate, MultiPolygon};

/// Earth's mean radius in kilometers, used by the haversine distance below.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two `(lon, lat)` points in degrees, in
/// kilometers.
pub fn haversine_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let dlat = (b.y - a.y).to_radians();
    let dlon = (b.x - a.x).to_radians();
    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Configurable thresholds for the two sanity checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityThresholds {
    /// Maximum allowed centroid distance, in kilometers.
    pub max_centroid_distance_km: f64,
    /// Maximum allowed ratio between actual and expected feature counts
    /// (and its reciprocal as the minimum).
    pub max_count_ratio: f64,
}

impl Default for SanityThresholds {
    fn default() -> Self {
        Self { max_centroid_distance_km: 50.0, max_count_ratio: 3.0 }
    }
}

/// Which sanity check failed, with its numeric witnesses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SanityFailure {
    /// The districts' combined centroid is too far from the municipal
    /// centroid.
    CentroidTooFar {
        /// Measured distance in kilometers.
        distance_km: f64,
        /// The threshold that was exceeded.
        threshold_km: f64,
    },
    /// The actual/expected feature count ratio fell outside the allowed
    /// band.
    CountRatioOutOfRange {
        /// `actual / expected`.
        ratio: f64,
        /// The allowed band is `[1/max_ratio, max_ratio]`.
        max_ratio: f64,
    },
}

/// Outcome of running both sanity checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityResult {
    /// Whether every check passed.
    pub passed: bool,
    /// The measured centroid distance in kilometers, when computable.
    pub centroid_distance_km: Option<f64>,
    /// The measured actual/expected ratio.
    pub count_ratio: f64,
    /// Which check failed first, if any (centroid is checked before count).
    pub failure: Option<SanityFailure>,
}

/// Run the centroid-proximity and feature-count-ratio checks.
pub fn check_sanity(
    districts: &MultiPolygon,
    municipal: &MultiPolygon,
    actual_count: usize,
    expected_count: usize,
    thresholds: SanityThresholds,
) -> SanityResult {
    let district_centroid = multipolygon_centroid(districts);
    let municipal_centroid = multipolygon_centroid(municipal);

    let centroid_distance_km = match (district_centroid, municipal_centroid) {
        (Some(a), Some(b)) => Some(haversine_distance_km(a, b)),
        _ => None,
    };

    if let Some(distance) = centroid_distance_km {
        if distance > thresholds.max_centroid_distance_km {
            return SanityResult {
                passed: false,
                centroid_distance_km: Some(distance),
                count_ratio: ratio(actual_count, expected_count),
                failure: Some(SanityFailure::CentroidTooFar {
                    distance_km: distance,
                    threshold_km: thresholds.max_centroid_distance_km,
                }),
            };
        }
    }

    let ratio = ratio(actual_count, expected_count);
    let min_ratio = 1.0 / thresholds.max_count_ratio;
    if ratio < min_ratio || ratio > thresholds.max_count_ratio {
        return SanityResult {
            passed: false,
            centroid_distance_km,
            count_ratio: ratio,
            failure: Some(SanityFailure::CountRatioOutOfRange { ratio, max_ratio: thresholds.max_count_ratio }),
        };
    }

    SanityResult { passed: true, centroid_distance_km, count_ratio: ratio, failure: None }
}

fn ratio(actual: usize, expected: usize) -> f64 {
    if expected == 0 {
        return f64::INFINITY;
    }
    actual as f64 / expected as f64
}
