/// Bring a longitude into [-180, 180).
pub fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// Hemisphere-suffixed latitude as written in file headers, e.g. `51.477N`
pub fn format_latitude(latitude: f64) -> String {
    let hemisphere = if latitude >= 0.0 { 'N' } else { 'S' };
    format!("{:.3}{}", latitude.abs(), hemisphere)
}

/// Hemisphere-suffixed longitude, e.g. `0.128W`
pub fn format_longitude(longitude: f64) -> String {
    let longitude = normalize_longitude(longitude);
    let hemisphere = if longitude >= 0.0 { 'E' } else { 'W' };
    format!("{:.3}{}", longitude.abs(), hemisphere)
}

/// Calculate the distance between two points using the Haversine formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_longitude() {
        assert!((normalize_longitude(359.75) - -0.25).abs() < 1e-9);
        assert!((normalize_longitude(-0.25) - -0.25).abs() < 1e-9);
        assert!((normalize_longitude(180.0) - -180.0).abs() < 1e-9);
    }

    #[test]
    fn test_hemisphere_formatting() {
        assert_eq!(format_latitude(51.4772), "51.477N");
        assert_eq!(format_latitude(-33.9), "33.900S");
        assert_eq!(format_longitude(-0.1278), "0.128W");
        assert_eq!(format_longitude(151.2), "151.200E");
    }

    #[test]
    fn test_haversine_distance() {
        // London to Edinburgh
        let distance = haversine_distance(51.5074, -0.1278, 55.9533, -3.1883);
        assert!((distance - 534.0).abs() < 10.0); // ~534km with 10km tolerance
    }
}
