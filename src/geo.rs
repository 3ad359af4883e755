//! Distance check for location challenges.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// How close (in km) a player has to be to claim a challenge card.
pub const CHALLENGE_RADIUS_KM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        GeoPoint { lat, lng }
    }

    /// Great-circle distance (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

pub fn too_far(player: &GeoPoint, challenge: &GeoPoint) -> bool {
    player.distance_km(challenge) > CHALLENGE_RADIUS_KM
}
