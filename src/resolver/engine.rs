//! Precision-ordered point-in-polygon resolution over a candidate list:
//! bbox prefilter, full ray casting, then sort by precision ascending.

use crate::boundary::Boundary;
use crate::geometry::{point_in_multipolygon, Coordinate};
use crate::ids::LayerType;

/// Filter `candidates` to those containing `point`, sorted by precision
/// ascending (finest first); ties break on boundary id lexicographically.
pub fn find_containing_boundaries<'a>(point: Coordinate, candidates: &'a [Boundary]) -> Vec<&'a Boundary> {
    let mut matches: Vec<&Boundary> = candidates
        .iter()
        .filter(|b| match b.bounding_box() {
            Some(bbox) => bbox.contains(point),
            None => false,
        })
        .filter(|b| point_in_multipolygon(point, &b.geometry))
        .collect();

    matches.sort_by(|a, b| {
        a.layer_type
            .precision()
            .cmp(&b.layer_type.precision())
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    matches
}

/// The finest-precision boundary containing `point`, if any.
pub fn find_finest<'a>(point: Coordinate, candidates: &'a [Boundary]) -> Option<&'a Boundary> {
    find_containing_boundaries(point, candidates).into_iter().next()
}

/// The first boundary containing `point` at exactly `precision`'s layer
/// type, if any.
pub fn at_precision<'a>(point: Coordinate, candidates: &'a [Boundary], precision: LayerType) -> Option<&'a Boundary> {
    find_containing_boundaries(point, candidates)
        .into_iter()
        .find(|b| b.layer_type == precision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::single_polygon_boundary;
    use crate::geometry::Ring;
    use crate::ids::AuthorityLevel;
    use chrono::{TimeZone, Utc};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        Ring::new(vec![
            Coordinate::new(x0, y0),
            Coordinate::new(x1, y0),
            Coordinate::new(x1, y1),
            Coordinate::new(x0, y1),
            Coordinate::new(x0, y0),
        ])
    }

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn nested_boundaries() -> Vec<Boundary> {
        vec![
            single_polygon_boundary("county-1", LayerType::County, "County", square(0.0, 0.0, 10.0, 10.0), AuthorityLevel::new(3).unwrap(), epoch()),
            single_polygon_boundary("municipal-1", LayerType::Municipal, "City", square(0.0, 0.0, 5.0, 5.0), AuthorityLevel::new(3).unwrap(), epoch()),
            single_polygon_boundary("ward-1", LayerType::Ward, "Ward", square(0.0, 0.0, 2.0, 2.0), AuthorityLevel::new(3).unwrap(), epoch()),
        ]
    }

    #[test]
    fn results_are_sorted_strictly_by_precision_ascending() {
        let boundaries = nested_boundaries();
        let matches = find_containing_boundaries(Coordinate::new(1.0, 1.0), &boundaries);
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].layer_type, LayerType::Ward);
        assert_eq!(matches[1].layer_type, LayerType::Municipal);
        assert_eq!(matches[2].layer_type, LayerType::County);
    }

    #[test]
    fn find_finest_equals_the_head_of_the_sorted_list() {
        let boundaries = nested_boundaries();
        let point = Coordinate::new(1.0, 1.0);
        let finest = find_finest(point, &boundaries).unwrap();
        let all = find_containing_boundaries(point, &boundaries);
        assert_eq!(finest, all[0]);
    }

    #[test]
    fn at_precision_returns_the_matching_layer_only() {
        let boundaries = nested_boundaries();
        let point = Coordinate::new(1.0, 1.0);
        let municipal = at_precision(point, &boundaries, LayerType::Municipal).unwrap();
        assert_eq!(municipal.id.as_str(), "municipal-1");
    }

    #[test]
    fn bbox_prefilter_excludes_points_outside_every_candidate() {
        let boundaries = nested_boundaries();
        let matches = find_containing_boundaries(Coordinate::new(50.0, 50.0), &boundaries);
        assert!(matches.is_empty());
    }

    #[test]
    fn ties_break_on_boundary_id_lexicographically() {
        let boundaries = vec![
            single_polygon_boundary("ward-b", LayerType::Ward, "Ward B", square(0.0, 0.0, 2.0, 2.0), AuthorityLevel::new(3).unwrap(), epoch()),
            single_polygon_boundary("ward-a", LayerType::Ward, "Ward A", square(0.0, 0.0, 2.0, 2.0), AuthorityLevel::new(3).unwrap(), epoch()),
        ];
        let matches = find_containing_boundaries(Coordinate::new(1.0, 1.0), &boundaries);
        assert_eq!(matches[0].id.as_str(), "ward-a");
        assert_eq!(matches[1].id.as_str(), "ward-b");
    }
}
