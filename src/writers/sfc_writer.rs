use chrono::{Datelike, Timelike};

use crate::error::Result;
use crate::models::{CorrectedSurfaceRecord, StationRequest, SurfaceRecord};
use crate::utils::constants::{
    FORMAT_VERSION, TEMPERATURE_REFERENCE_HEIGHT, WIND_REFERENCE_HEIGHT,
};
use crate::utils::conversions::{
    celsius_to_kelvin, convective_velocity_scale, monin_obukhov_length, relative_humidity,
    round_direction,
};
use crate::utils::coordinates::{format_latitude, format_longitude};
use crate::writers::columns::{FieldValue, LineLayout};

/// Wind-speed adjustment code: not adjusted, onsite-style source
pub const WIND_ADJUSTMENT: &str = "NAD-OS";

/// Largest Monin-Obukhov length magnitude written; near-neutral hours are
/// capped here instead of overflowing the column.
pub const MAX_OBUKHOV_LENGTH: f64 = 8888.0;

pub const PRECIP_NONE: i64 = 0;
pub const PRECIP_LIQUID: i64 = 11;
pub const PRECIP_FROZEN: i64 = 22;

/// `3(I2,1X),I3,1X,I2,1X,F6.1,1X,3(F6.3,1X),2(F5.0,1X),F8.1,1X,F7.4,1X,F6.2,1X,
/// F6.2,1X,F7.2,1X,F6.1,3(1X,F6.1),1X,I5,1X,F6.2,2(1X,F6.0),1X,I5,1X,A7`
pub fn sfc_layout() -> LineLayout {
    LineLayout::new("SFC")
        .integer("yr", 2, -9)
        .space(1)
        .integer("mo", 2, -9)
        .space(1)
        .integer("dy", 2, -9)
        .space(1)
        .integer("jday", 3, -99)
        .space(1)
        .integer("hr", 2, -9)
        .space(1)
        .fixed("H", 6, 1, -999.0)
        .space(1)
        .fixed("ustar", 6, 3, -9.0)
        .space(1)
        .fixed("wstar", 6, 3, -9.0)
        .space(1)
        .fixed("vptg", 6, 3, -9.0)
        .space(1)
        .fixed("zic", 5, 0, -999.0)
        .space(1)
        .fixed("zim", 5, 0, -999.0)
        .space(1)
        .fixed("L", 8, 1, -99999.0)
        .space(1)
        .fixed("z0", 7, 4, -9.0)
        .space(1)
        .fixed("bowen", 6, 2, -9.0)
        .space(1)
        .fixed("albedo", 6, 2, -9.0)
        .space(1)
        .fixed("ws", 7, 2, 999.0)
        .space(1)
        .fixed("wd", 6, 1, -9.0)
        .space(1)
        .fixed("zref", 6, 1, -9.0)
        .space(1)
        .fixed("temp", 6, 1, 999.0)
        .space(1)
        .fixed("ztemp", 6, 1, -9.0)
        .space(1)
        .integer("ipcode", 5, 9999)
        .space(1)
        .fixed("pamt", 6, 2, -9.0)
        .space(1)
        .fixed("rh", 6, 0, 999.0)
        .space(1)
        .fixed("pres", 6, 0, 99999.0)
        .space(1)
        .integer("ccvr", 5, 99)
        .space(1)
        .text("wsadj", 7)
}

/// Decimals of the `wd` column
const DIRECTION_DECIMALS: usize = 1;

/// Header line: location, station ids and producer version
pub fn sfc_header(station: &StationRequest) -> String {
    format!(
        "{:>10}{:>10}{:10}UA_ID: {:>8}  SF_ID: {:>8}  OS_ID: {:>8}  VERSION: {}",
        format_latitude(station.latitude),
        format_longitude(station.longitude),
        "",
        station.ua_id,
        station.surf_id,
        station.id,
        FORMAT_VERSION
    )
}

fn precipitation_code(record: &SurfaceRecord) -> Option<i64> {
    record.precipitation.map(|amount| {
        if amount <= 0.0 {
            PRECIP_NONE
        } else if record.temperature.is_some_and(|t| t <= 0.0) {
            PRECIP_FROZEN
        } else {
            PRECIP_LIQUID
        }
    })
}

fn obukhov_length(record: &SurfaceRecord) -> Option<f64> {
    let (h, ustar, t) = (
        record.sensible_heat_flux?,
        record.friction_velocity?,
        record.temperature?,
    );
    monin_obukhov_length(h, ustar, t, record.pressure)
        .map(|l| l.clamp(-MAX_OBUKHOV_LENGTH, MAX_OBUKHOV_LENGTH))
}

fn convective_scale(record: &SurfaceRecord) -> Option<f64> {
    convective_velocity_scale(
        record.sensible_heat_flux?,
        record.boundary_layer_height?,
        record.temperature?,
        record.pressure,
    )
}

/// Field values for one hour, in layout order
pub fn sfc_values(record: &CorrectedSurfaceRecord, station: &StationRequest) -> Vec<FieldValue> {
    let r = &record.corrected;
    let ts = r.timestamp;
    let site = station.site.as_ref();

    let convective = r.sensible_heat_flux.is_some_and(|h| h > 0.0);
    let zic = if convective { r.boundary_layer_height } else { None };
    let roughness = r.roughness.or(site.map(|s| s.roughness));
    let rh = match (r.temperature, r.dewpoint) {
        (Some(t), Some(td)) => Some(relative_humidity(t, td)),
        _ => None,
    };

    vec![
        FieldValue::Int(Some((ts.year() % 100) as i64)),
        FieldValue::Int(Some(ts.month() as i64)),
        FieldValue::Int(Some(ts.day() as i64)),
        FieldValue::Int(Some(ts.ordinal() as i64)),
        FieldValue::Int(Some(ts.hour() as i64 + 1)),
        FieldValue::Real(r.sensible_heat_flux),
        FieldValue::Real(r.friction_velocity),
        FieldValue::Real(convective_scale(r)),
        FieldValue::Real(None),
        FieldValue::Real(zic),
        FieldValue::Real(r.boundary_layer_height),
        FieldValue::Real(obukhov_length(r)),
        FieldValue::Real(roughness),
        FieldValue::Real(site.map(|s| s.bowen_ratio)),
        FieldValue::Real(site.map(|s| s.albedo)),
        FieldValue::Real(r.wind_speed),
        FieldValue::Real(r.wind_direction.map(|d| round_direction(d, DIRECTION_DECIMALS))),
        FieldValue::Real(Some(WIND_REFERENCE_HEIGHT)),
        FieldValue::Real(r.temperature.map(celsius_to_kelvin)),
        FieldValue::Real(Some(TEMPERATURE_REFERENCE_HEIGHT)),
        FieldValue::Int(precipitation_code(r)),
        FieldValue::Real(r.precipitation),
        FieldValue::Real(rh),
        FieldValue::Real(r.pressure),
        FieldValue::Int(r.cloud_cover.map(|c| c.round() as i64)),
        FieldValue::Text(WIND_ADJUSTMENT.to_string()),
    ]
}

/// Render a full surface file: header then one line per hour.
pub fn encode_surface(records: &[CorrectedSurfaceRecord], station: &StationRequest) -> Result<String> {
    let layout = sfc_layout();
    let mut out = String::with_capacity((records.len() + 1) * (layout.line_width() + 1));

    out.push_str(&sfc_header(station));
    out.push('\n');
    for record in records {
        out.push_str(&layout.encode(&sfc_values(record, station))?);
        out.push('\n');
    }

    Ok(out)
}
