use super::domain::Coordinates;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres (Haversine), rounded to one decimal.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    (EARTH_RADIUS_KM * c * 10.0).round() / 10.0
}

pub fn distance_between(from: Coordinates, to: Coordinates) -> f64 {
    distance_km(from.lat, from.lon, to.lat, to.lon)
}
