//! Unit conversion table applied by the extractors, plus the closed-form
//! boundary-layer quantities written to the surface file.
//!
//! | quantity             | source            | result                         |
//! |----------------------|-------------------|--------------------------------|
//! | temperature          | K                 | degC, `t - 273.15`             |
//! | pressure             | Pa                | hPa, `p / 100`                 |
//! | wind speed           | u, v (m/s)        | `sqrt(u^2 + v^2)` m/s          |
//! | wind direction       | u, v (m/s)        | `(270 - atan2(v, u)) mod 360`  |
//! | cloud cover          | fraction 0-1      | tenths, `round(tcc * 10)`      |
//! | precipitation        | m                 | mm, `tp * 1000`                |
//! | sensible heat flux   | J m-2 per hour    | W m-2 upward, `-sshf / 3600`   |
//! | geopotential         | m2 s-2            | m, `z / 9.80665`               |

use crate::utils::constants::{
    CALM_DIRECTION, GAS_CONSTANT_DRY_AIR, GRAVITY, KELVIN_OFFSET, MAGNUS_A, MAGNUS_B, SECONDS_PER_HOUR,
    SPECIFIC_HEAT_AIR, STANDARD_PRESSURE_HPA, VON_KARMAN,
};

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

pub fn pascal_to_hpa(pascal: f64) -> f64 {
    pascal / 100.0
}

pub fn wind_speed(u: f64, v: f64) -> f64 {
    (u * u + v * v).sqrt()
}

/// Meteorological direction the wind blows from, in [0, 360).
pub fn wind_direction(u: f64, v: f64) -> f64 {
    (270.0 - v.atan2(u).to_degrees()).rem_euclid(360.0)
}

/// Round a direction to the column's decimals, folding 360 back onto 0.
/// The calm sentinel passes through untouched.
pub fn round_direction(direction: f64, precision: usize) -> f64 {
    if direction == CALM_DIRECTION {
        return direction;
    }
    let scale = 10f64.powi(precision as i32);
    ((direction * scale).round() / scale).rem_euclid(360.0)
}

pub fn cloud_fraction_to_tenths(fraction: f64) -> f64 {
    (fraction * 10.0).round()
}

pub fn metres_to_millimetres(metres: f64) -> f64 {
    metres * 1000.0
}

/// ECMWF accumulates heat fluxes downward-positive over the hour.
pub fn accumulated_flux_to_upward_watts(joules: f64) -> f64 {
    -joules / SECONDS_PER_HOUR
}

pub fn geopotential_to_height(geopotential: f64) -> f64 {
    geopotential / GRAVITY
}

fn saturation_term(celsius: f64) -> f64 {
    MAGNUS_A * celsius / (MAGNUS_B + celsius)
}

/// Dewpoint (degC) from temperature (degC) and relative humidity (%).
pub fn dewpoint_from_relative_humidity(temperature: f64, relative_humidity: f64) -> Option<f64> {
    if relative_humidity <= 0.0 {
        return None;
    }
    let gamma = (relative_humidity / 100.0).ln() + saturation_term(temperature);
    Some(MAGNUS_B * gamma / (MAGNUS_A - gamma))
}

/// Relative humidity (%) from temperature and dewpoint (degC).
pub fn relative_humidity(temperature: f64, dewpoint: f64) -> f64 {
    let rh = 100.0 * (saturation_term(dewpoint) - saturation_term(temperature)).exp();
    rh.clamp(0.0, 100.0)
}

/// Dry-air density (kg m-3) from temperature (degC) and pressure (hPa).
pub fn air_density(temperature: f64, pressure: Option<f64>) -> f64 {
    let pressure_pa = pressure.unwrap_or(STANDARD_PRESSURE_HPA) * 100.0;
    pressure_pa / (GAS_CONSTANT_DRY_AIR * celsius_to_kelvin(temperature))
}

/// Monin-Obukhov length (m). Undefined for zero heat flux.
pub fn monin_obukhov_length(
    heat_flux: f64,
    friction_velocity: f64,
    temperature: f64,
    pressure: Option<f64>,
) -> Option<f64> {
    if heat_flux.abs() < 1e-6 {
        return None;
    }
    let rho = air_density(temperature, pressure);
    let kelvin = celsius_to_kelvin(temperature);
    Some(-rho * SPECIFIC_HEAT_AIR * kelvin * friction_velocity.powi(3) / (VON_KARMAN * GRAVITY * heat_flux))
}

/// Convective velocity scale (m/s); only defined for upward heat flux.
pub fn convective_velocity_scale(
    heat_flux: f64,
    mixing_height: f64,
    temperature: f64,
    pressure: Option<f64>,
) -> Option<f64> {
    if heat_flux <= 0.0 || mixing_height <= 0.0 {
        return None;
    }
    let rho = air_density(temperature, pressure);
    let kelvin = celsius_to_kelvin(temperature);
    Some((GRAVITY * heat_flux * mixing_height / (rho * SPECIFIC_HEAT_AIR * kelvin)).cbrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_direction_wraps_north() {
        assert_eq!(round_direction(359.96, 1), 0.0);
        assert_eq!(round_direction(359.94, 1), 359.9);
        assert_eq!(round_direction(0.04, 1), 0.0);
        assert_eq!(round_direction(CALM_DIRECTION, 1), CALM_DIRECTION);
    }

    #[test]
    fn test_wind_direction_quadrants() {
        // Wind blowing from the west pushes air eastward (u > 0)
        assert!((wind_direction(5.0, 0.0) - 270.0).abs() < 1e-9);
        assert!((wind_direction(0.0, -5.0) - 0.0).abs() < 1e-9);
        assert!((wind_direction(-5.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((wind_direction(0.0, 5.0) - 180.0).abs() < 1e-9);
        assert!((0.0..360.0).contains(&wind_direction(0.0, 0.0)));
    }

    #[test]
    fn test_basic_conversions() {
        assert!((kelvin_to_celsius(273.15)).abs() < 1e-9);
        assert!((pascal_to_hpa(101325.0) - 1013.25).abs() < 1e-9);
        assert!((wind_speed(3.0, 4.0) - 5.0).abs() < 1e-9);
        assert_eq!(cloud_fraction_to_tenths(0.64), 6.0);
        assert!((metres_to_millimetres(0.0012) - 1.2).abs() < 1e-9);
        assert!((accumulated_flux_to_upward_watts(-360000.0) - 100.0).abs() < 1e-9);
        assert!((geopotential_to_height(9806.65) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_humidity_round_trip() {
        let dewpoint = dewpoint_from_relative_humidity(20.0, 50.0).unwrap();
        assert!((dewpoint - 9.26).abs() < 0.05);
        assert!((relative_humidity(20.0, dewpoint) - 50.0).abs() < 1e-6);
        assert!((relative_humidity(15.0, 15.0) - 100.0).abs() < 1e-9);
        assert!(dewpoint_from_relative_humidity(20.0, 0.0).is_none());
    }

    #[test]
    fn test_stability_parameters() {
        // Daytime upward flux gives a negative (unstable) length
        let l = monin_obukhov_length(150.0, 0.4, 25.0, Some(1000.0)).unwrap();
        assert!(l < 0.0);
        let l = monin_obukhov_length(-20.0, 0.2, 5.0, None).unwrap();
        assert!(l > 0.0);
        assert!(monin_obukhov_length(0.0, 0.3, 10.0, None).is_none());

        let w = convective_velocity_scale(150.0, 1200.0, 25.0, Some(1000.0)).unwrap();
        assert!(w > 1.0 && w < 3.0);
        assert!(convective_velocity_scale(-10.0, 1200.0, 25.0, None).is_none());
    }
}
