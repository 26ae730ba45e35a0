//! In-process planar convex hull over (longitude, latitude) pairs.
//!
//! Degenerate inputs are represented, never rejected: fewer than three
//! distinct points yield an empty collection, a point, or a line, matching
//! what a GIS tool expects to load.

use std::collections::HashSet;

use geo::{ConvexHull, MultiPoint, Point};

use crate::harvest::place::Place;

/// Computes the convex hull of a place set as WKT.
///
/// Distinct coordinates decide the shape class:
/// - 0 → `GEOMETRYCOLLECTION EMPTY`
/// - 1 → `POINT(x y)`
/// - 2 → `LINESTRING(x y, x y)`
/// - 3+ → `POLYGON((...))` with a closed exterior ring
///
/// Places whose coordinate text does not parse as a float are ignored;
/// they were tallied as skipped upstream.
pub fn convex_hull_wkt(places: &[Place]) -> String {
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut coords: Vec<(f64, f64)> = Vec::new();

    for place in places {
        let (Ok(lon), Ok(lat)) = (
            place.longitude.parse::<f64>(),
            place.latitude.parse::<f64>(),
        ) else {
            continue;
        };
        if seen.insert((lon.to_bits(), lat.to_bits())) {
            coords.push((lon, lat));
        }
    }

    match coords.as_slice() {
        [] => "GEOMETRYCOLLECTION EMPTY".to_string(),
        [(x, y)] => format!("POINT({} {})", x, y),
        [(x1, y1), (x2, y2)] => format!("LINESTRING({} {}, {} {})", x1, y1, x2, y2),
        _ => {
            let multi_point: MultiPoint<f64> =
                MultiPoint::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect());
            let hull = multi_point.convex_hull();
            let ring: Vec<String> = hull
                .exterior()
                .coords()
                .map(|c| format!("{} {}", c.x, c.y))
                .collect();
            format!("POLYGON(({}))", ring.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(lon: &str, lat: &str) -> Place {
        Place {
            name: "p".to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            country: String::new(),
            url: String::new(),
            abstract_text: String::new(),
        }
    }

    #[test]
    fn zero_points_yield_empty_collection() {
        assert_eq!(convex_hull_wkt(&[]), "GEOMETRYCOLLECTION EMPTY");
    }

    #[test]
    fn one_point_yields_point() {
        assert_eq!(convex_hull_wkt(&[place("2.8", "41.9")]), "POINT(2.8 41.9)");
    }

    #[test]
    fn two_distinct_points_yield_linestring() {
        let wkt = convex_hull_wkt(&[place("0", "0"), place("1", "1")]);
        assert_eq!(wkt, "LINESTRING(0 0, 1 1)");
    }

    #[test]
    fn duplicates_collapse_before_classification() {
        // Five copies of the same coordinate are still a single point.
        let points = vec![
            place("2.8", "41.9"),
            place("2.8", "41.9"),
            place("2.8", "41.9"),
            place("2.8", "41.9"),
            place("2.8", "41.9"),
        ];
        assert_eq!(convex_hull_wkt(&points), "POINT(2.8 41.9)");
    }

    #[test]
    fn interior_points_are_excluded_from_the_hull() {
        // Unit square plus its center; the hull ring must not contain the
        // center.
        let points = vec![
            place("0", "0"),
            place("1", "0"),
            place("1", "1"),
            place("0", "1"),
            place("0.5", "0.5"),
        ];
        let wkt = convex_hull_wkt(&points);
        assert!(wkt.starts_with("POLYGON(("));
        assert!(!wkt.contains("0.5 0.5"));
    }

    #[test]
    fn polygon_ring_is_closed() {
        let points = vec![place("0", "0"), place("4", "0"), place("2", "3")];
        let wkt = convex_hull_wkt(&points);
        let inner = wkt
            .trim_start_matches("POLYGON((")
            .trim_end_matches("))");
        let ring: Vec<&str> = inner.split(", ").collect();
        assert!(ring.len() >= 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn unparseable_coordinates_are_ignored() {
        let points = vec![place("not-a-number", "1"), place("2.8", "41.9")];
        assert_eq!(convex_hull_wkt(&points), "POINT(2.8 41.9)");
    }
}
