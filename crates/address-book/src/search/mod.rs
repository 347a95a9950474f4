//! Radius search over stored coordinates.
//!
//! Distances are great-circle distances from the haversine formula on a sphere of
//! configurable radius (6371 km, the mean Earth radius, by default). The store is
//! scanned in full except for a latitude band derived from the radius: moving
//! `d` km along any path changes latitude by at most `d / R` radians, so the band
//! can never drop a record that is actually within range.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::Result,
    model::{Address, CoordinateInput},
    store::{AddressStore, LatitudeBand},
    validation::{FieldViolation, LATITUDE_RANGE, LONGITUDE_RANGE, ValidationError, check_coordinate},
};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Widening applied to the latitude band, in degrees, to absorb rounding.
const BAND_MARGIN_DEG: f64 = 1e-6;

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> std::result::Result<Self, ValidationError> {
        let checks = [
            check_coordinate(
                "latitude",
                Some(&CoordinateInput::Number(latitude)),
                LATITUDE_RANGE,
            ),
            check_coordinate(
                "longitude",
                Some(&CoordinateInput::Number(longitude)),
                LONGITUDE_RANGE,
            ),
        ];
        let violations: Vec<FieldViolation> = checks
            .iter()
            .filter_map(|check| check.as_ref().err().cloned())
            .collect();
        if violations.is_empty() {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(ValidationError { violations })
        }
    }
}

impl From<&Address> for GeoPoint {
    fn from(address: &Address) -> Self {
        Self {
            latitude: address.latitude,
            longitude: address.longitude,
        }
    }
}

/// One search hit: the record and how far it is from the center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyAddress {
    #[serde(flatten)]
    pub address: Address,
    pub distance_km: f64,
}

/// Haversine distance in km between two points on a sphere of radius `radius_km`.
pub fn haversine_km(from: GeoPoint, to: GeoPoint, radius_km: f64) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    radius_km * c
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSearch {
    earth_radius_km: f64,
}

impl Default for DistanceSearch {
    fn default() -> Self {
        Self {
            earth_radius_km: EARTH_RADIUS_KM,
        }
    }
}

impl DistanceSearch {
    pub const fn new(earth_radius_km: f64) -> Self {
        Self { earth_radius_km }
    }

    pub const fn earth_radius_km(&self) -> f64 {
        self.earth_radius_km
    }

    pub fn distance_km(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        haversine_km(from, to, self.earth_radius_km)
    }

    /// Latitudes that can possibly lie within `radius_km` of `center`.
    pub fn latitude_band(&self, center: GeoPoint, radius_km: f64) -> LatitudeBand {
        let reach_deg = (radius_km / self.earth_radius_km).to_degrees() + BAND_MARGIN_DEG;
        LatitudeBand::new(
            (center.latitude - reach_deg).max(LATITUDE_RANGE.0),
            (center.latitude + reach_deg).min(LATITUDE_RANGE.1),
        )
    }

    /// Every stored address within `radius_km` of the center, nearest first.
    ///
    /// Ties in distance are broken by ascending id. A radius of zero or less
    /// yields an empty result; an invalid center or a non-finite radius is a
    /// validation error.
    #[instrument(name = "Radius search", level = "debug", skip(self, store))]
    pub fn search(
        &self,
        store: &dyn AddressStore,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyAddress>> {
        let center = GeoPoint::new(center_lat, center_lon)?;
        if !radius_km.is_finite() {
            return Err(ValidationError::single("radius_km", "must be a finite number").into());
        }
        if radius_km <= 0.0 {
            return Ok(Vec::new());
        }

        let candidates = store.scan(self.latitude_band(center, radius_km))?;
        let scanned = candidates.len();

        let mut hits: Vec<NearbyAddress> = candidates
            .into_par_iter()
            .filter_map(|address| {
                let distance_km = self.distance_km(center, GeoPoint::from(&address));
                (distance_km <= radius_km).then_some(NearbyAddress {
                    address,
                    distance_km,
                })
            })
            .collect();
        hits.par_sort_unstable_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.address.id.cmp(&b.address.id))
        });

        debug!(scanned, matched = hits.len(), "Radius search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AddressBookError, model::NewAddress, store::MemoryStore};

    const NYC: (f64, f64) = (40.7128, -74.0060);
    const LA: (f64, f64) = (34.0522, -118.2437);

    fn point((latitude, longitude): (f64, f64)) -> GeoPoint {
        GeoPoint::new(latitude, longitude).unwrap()
    }

    fn add(store: &MemoryStore, city: &str, (latitude, longitude): (f64, f64)) -> Address {
        store
            .create(NewAddress {
                street: "Main St".into(),
                city: city.into(),
                state: "State".into(),
                postal_code: "00000".into(),
                country: "USA".into(),
                latitude,
                longitude,
            })
            .unwrap()
    }

    #[test]
    fn test_haversine_known_distance() {
        let d = haversine_km(point(NYC), point(LA), EARTH_RADIUS_KM);
        assert!((d - 3935.7).abs() < 5.0, "NYC-LA was {d}");
    }

    #[test]
    fn test_haversine_zero_and_antipodal() {
        assert_eq!(haversine_km(point(NYC), point(NYC), EARTH_RADIUS_KM), 0.0);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        let d = haversine_km(point((0.0, 0.0)), point((0.0, 180.0)), EARTH_RADIUS_KM);
        assert!((d - half_circumference).abs() < 1e-6);
    }

    #[test]
    fn test_nyc_la_example() {
        let store = MemoryStore::new();
        let nyc = add(&store, "New York", NYC);
        add(&store, "Los Angeles", LA);

        let hits = DistanceSearch::default()
            .search(&store, NYC.0, NYC.1, 50.0)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].address, nyc);
        assert!(hits[0].distance_km.abs() < 1e-9);
    }

    #[test]
    fn test_results_sorted_and_within_radius() {
        let store = MemoryStore::new();
        add(&store, "Philadelphia", (39.9526, -75.1652));
        add(&store, "Newark", (40.7357, -74.1724));
        add(&store, "Boston", (42.3601, -71.0589));
        add(&store, "Los Angeles", LA);

        let radius = 400.0;
        let hits = DistanceSearch::default()
            .search(&store, NYC.0, NYC.1, radius)
            .unwrap();
        let cities: Vec<_> = hits.iter().map(|h| h.address.city.as_str()).collect();
        assert_eq!(cities, ["Newark", "Philadelphia", "Boston"]);
        assert!(hits.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        assert!(hits.iter().all(|h| h.distance_km <= radius));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let store = MemoryStore::new();
        let first = add(&store, "East", (0.0, 1.0));
        let second = add(&store, "West", (0.0, -1.0));

        let hits = DistanceSearch::default()
            .search(&store, 0.0, 0.0, 500.0)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].distance_km, hits[1].distance_km);
        assert_eq!(hits[0].address.id, first.id);
        assert_eq!(hits[1].address.id, second.id);
    }

    #[test]
    fn test_non_positive_radius_is_empty() {
        let store = MemoryStore::new();
        add(&store, "New York", NYC);
        let engine = DistanceSearch::default();
        assert!(engine.search(&store, NYC.0, NYC.1, 0.0).unwrap().is_empty());
        assert!(engine.search(&store, NYC.0, NYC.1, -10.0).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_center_and_radius() {
        let store = MemoryStore::new();
        let engine = DistanceSearch::default();

        let err = engine.search(&store, 95.0, -200.0, 10.0).unwrap_err();
        let AddressBookError::Validation(err) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(err.has_field("latitude") && err.has_field("longitude"));

        assert!(matches!(
            engine.search(&store, 0.0, 0.0, f64::NAN),
            Err(AddressBookError::Validation(e)) if e.has_field("radius_km")
        ));
    }

    #[test]
    fn test_band_never_drops_matches() {
        let engine = DistanceSearch::default();
        let center = point((10.0, 20.0));
        // A point due north exactly on the radius boundary.
        let radius = 100.0;
        let north = point((10.0 + (radius / EARTH_RADIUS_KM).to_degrees(), 20.0));
        let band = engine.latitude_band(center, radius);
        assert!(band.contains(north.latitude));
        assert!(engine.distance_km(center, north) <= radius + 1e-9);

        let polar = engine.latitude_band(point((89.9, 0.0)), 1000.0);
        assert_eq!(polar.max, 90.0);
    }

    #[test]
    fn test_search_across_the_pole() {
        let store = MemoryStore::new();
        let far_side = add(&store, "Far side", (89.5, 180.0));
        let hits = DistanceSearch::default()
            .search(&store, 89.5, 0.0, 200.0)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].address.id, far_side.id);
    }
}
