//! Great-circle distance on already-normalized WGS84 coordinates.

use serde::Serialize;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// A usable coordinate: both parts present, finite, in range, and not the
    /// (0, 0) placeholder some feeds emit for "unknown".
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        let (lat, lon) = (lat?, lon?);
        if !in_range(lat, lon) || (lat == 0.0 && lon == 0.0) {
            return None;
        }
        Some(Self { lat, lon })
    }
}

pub fn in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Haversine distance in meters between two known points.
pub fn distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against h drifting past 1.0 for antipodal points.
    EARTH_RADIUS_M * 2.0 * h.sqrt().min(1.0).asin()
}

/// Distance between two possibly-missing points. `None` means undefined, never zero.
pub fn haversine(a: Option<&Coordinate>, b: Option<&Coordinate>) -> Option<f64> {
    Some(distance_m(a?, b?))
}

/// Unweighted mean of the given points; `None` for an empty set.
pub fn centroid<'a, I>(points: I) -> Option<Coordinate>
where
    I: IntoIterator<Item = &'a Coordinate>,
{
    let (mut lat, mut lon, mut n) = (0.0, 0.0, 0usize);
    for p in points {
        lat += p.lat;
        lon += p.lon;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    Some(Coordinate {
        lat: lat / n as f64,
        lon: lon / n as f64,
    })
}

/// Largest pairwise distance within a set of points (0 for fewer than two).
pub fn span_m(points: &[Coordinate]) -> f64 {
    let mut span: f64 = 0.0;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            span = span.max(distance_m(a, b));
        }
    }
    span
}

/// Point `meters` due north of `origin`. Test helper for building exact spacings.
#[cfg(test)]
pub(crate) fn offset_north(origin: &Coordinate, meters: f64) -> Coordinate {
    Coordinate {
        lat: origin.lat + (meters / EARTH_RADIUS_M).to_degrees(),
        lon: origin.lon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    #[test]
    fn zero_distance_to_self() {
        let a = pt(41.48, -93.53);
        assert_eq!(distance_m(&a, &a), 0.0);
    }

    #[test]
    fn symmetric() {
        let a = pt(30.2672, -97.7431);
        let b = pt(32.7767, -96.7970);
        assert_eq!(distance_m(&a, &b), distance_m(&b, &a));
    }

    #[test]
    fn austin_to_dallas_roughly_300km() {
        let d = distance_m(&pt(30.2672, -97.7431), &pt(32.7767, -96.7970));
        assert!((d - 291_000.0).abs() < 5_000.0, "got {d}");
    }

    #[test]
    fn offset_north_is_exact() {
        let o = pt(45.0, 10.0);
        let d = distance_m(&o, &offset_north(&o, 400.0));
        assert!((d - 400.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn undefined_when_either_side_missing() {
        let a = pt(1.0, 1.0);
        assert_eq!(haversine(Some(&a), None), None);
        assert_eq!(haversine(None, Some(&a)), None);
        assert_eq!(haversine(None, None), None);
        assert_eq!(haversine(Some(&a), Some(&a)), Some(0.0));
    }

    #[test]
    fn validity_rules() {
        assert!(Coordinate::from_parts(Some(10.0), Some(20.0)).is_some());
        assert!(Coordinate::from_parts(None, Some(20.0)).is_none());
        assert!(Coordinate::from_parts(Some(0.0), Some(0.0)).is_none());
        assert!(Coordinate::from_parts(Some(0.0), Some(20.0)).is_some());
        assert!(Coordinate::from_parts(Some(91.0), Some(20.0)).is_none());
        assert!(Coordinate::from_parts(Some(10.0), Some(-181.0)).is_none());
        assert!(Coordinate::from_parts(Some(f64::NAN), Some(1.0)).is_none());
    }

    #[test]
    fn centroid_is_mean() {
        let c = centroid(&[pt(0.0, 10.0), pt(2.0, 20.0)]).unwrap();
        assert_eq!(c, pt(1.0, 15.0));
        assert!(centroid(&[] as &[Coordinate]).is_none());
    }

    #[test]
    fn span_of_line() {
        let a = pt(45.0, 10.0);
        let pts = [a, offset_north(&a, 400.0), offset_north(&a, 800.0)];
        assert!((span_m(&pts) - 800.0).abs() < 1e-6);
        assert_eq!(span_m(&pts[..1]), 0.0);
    }
}
