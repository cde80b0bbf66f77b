use chrono::{Datelike, Timelike};

use crate::error::Result;
use crate::models::{CorrectedSounding, StationRequest};
use crate::utils::constants::MANDATORY_LEVELS;
use crate::utils::coordinates::normalize_longitude;
use crate::writers::columns::{FieldValue, LineLayout};

pub const IGRA_MISSING: i64 = -9999;
pub const IGRA_SOURCE: &str = "ERA5";

/// IGRA v2 sounding header record (columns 1-71)
pub fn igra_header_layout() -> LineLayout {
    LineLayout::new("IGRA header")
        .left_text("headrec", 1)
        .left_text("id", 11)
        .space(1)
        .integer("year", 4, IGRA_MISSING)
        .space(1)
        .zero_padded("month", 2, IGRA_MISSING)
        .space(1)
        .zero_padded("day", 2, IGRA_MISSING)
        .space(1)
        .zero_padded("hour", 2, 99)
        .space(1)
        .integer("reltime", 4, 9999)
        .space(1)
        .integer("numlev", 4, IGRA_MISSING)
        .space(1)
        .left_text("p_src", 8)
        .space(1)
        .left_text("np_src", 8)
        .space(1)
        .integer("lat", 7, IGRA_MISSING)
        .space(1)
        .integer("lon", 8, IGRA_MISSING)
}

/// IGRA v2 data record (columns 1-51)
pub fn igra_level_layout() -> LineLayout {
    LineLayout::new("IGRA level")
        .text("lvltyp", 2)
        .space(1)
        .integer("etime", 5, IGRA_MISSING)
        .space(1)
        .integer("press", 6, IGRA_MISSING)
        .text("pflag", 1)
        .integer("gph", 5, IGRA_MISSING)
        .text("zflag", 1)
        .integer("temp", 5, IGRA_MISSING)
        .text("tflag", 1)
        .integer("rh", 5, IGRA_MISSING)
        .space(1)
        .integer("dpdp", 5, IGRA_MISSING)
        .space(1)
        .integer("wdir", 5, IGRA_MISSING)
        .space(1)
        .integer("wspd", 5, IGRA_MISSING)
}

fn tenths(value: Option<f64>) -> Option<i64> {
    value.map(|v| (v * 10.0).round() as i64)
}

fn level_type(pressure_hpa: f64) -> &'static str {
    let rounded = pressure_hpa.round();
    let mandatory = (pressure_hpa - rounded).abs() < 1e-6
        && MANDATORY_LEVELS.contains(&(rounded as u32));
    if mandatory {
        "10"
    } else {
        "20"
    }
}

/// Render the corrected soundings as an IGRA v2 station file
pub fn encode_igra(soundings: &[CorrectedSounding], station: &StationRequest) -> Result<String> {
    let header = igra_header_layout();
    let data = igra_level_layout();
    let lat = (station.latitude * 10000.0).round() as i64;
    let lon = (normalize_longitude(station.longitude) * 10000.0).round() as i64;

    let mut out = String::new();
    for sounding in soundings {
        let ts = sounding.timestamp;
        let header_values = [
            FieldValue::Text("#".to_string()),
            FieldValue::Text(station.ua_id.clone()),
            FieldValue::Int(Some(ts.year() as i64)),
            FieldValue::Int(Some(ts.month() as i64)),
            FieldValue::Int(Some(ts.day() as i64)),
            FieldValue::Int(Some(ts.hour() as i64)),
            FieldValue::Int(None),
            FieldValue::Int(Some(sounding.levels.len() as i64)),
            FieldValue::Text(IGRA_SOURCE.to_string()),
            FieldValue::Text(String::new()),
            FieldValue::Int(Some(lat)),
            FieldValue::Int(Some(lon)),
        ];
        out.push_str(&header.encode(&header_values)?);
        out.push('\n');

        for level in &sounding.levels {
            let c = &level.corrected;
            let dpdp = match (c.temperature, c.dewpoint) {
                (Some(t), Some(td)) => Some(t - td),
                _ => None,
            };
            let values = [
                FieldValue::Text(level_type(c.pressure).to_string()),
                FieldValue::Int(None),
                FieldValue::Int(Some((c.pressure * 100.0).round() as i64)),
                FieldValue::Text(String::new()),
                FieldValue::Int(c.height.map(|h| h.round() as i64)),
                FieldValue::Text(String::new()),
                FieldValue::Int(tenths(c.temperature)),
                FieldValue::Text(String::new()),
                FieldValue::Int(tenths(c.relative_humidity)),
                FieldValue::Int(tenths(dpdp)),
                FieldValue::Int(c.wind_direction.map(|d| d.round() as i64)),
                FieldValue::Int(tenths(c.wind_speed)),
            ];
            out.push_str(&data.encode(&values)?);
            out.push('\n');
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrectedLevel, CorrectionFlag, LevelField, LevelRecord};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout_widths() {
        assert_eq!(igra_header_layout().line_width(), 71);
        assert_eq!(igra_level_layout().line_width(), 51);
        assert_eq!(igra_level_layout().column("gph").unwrap().start, 16);
        assert_eq!(igra_level_layout().column("wspd").unwrap().start, 46);
    }

    #[test]
    fn test_encode_sounding() {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .ua_id("03743")
            .build()
            .unwrap();

        let record = LevelRecord {
            height: Some(112.4),
            temperature: Some(7.25),
            relative_humidity: Some(81.0),
            dewpoint: Some(4.15),
            wind_speed: Some(6.04),
            wind_direction: Some(245.6),
            ..LevelRecord::new(1000.0)
        };
        let calm = LevelRecord {
            height: Some(760.0),
            temperature: Some(1.0),
            wind_speed: Some(0.3),
            wind_direction: Some(999.0),
            ..LevelRecord::new(912.5)
        };

        let corrected = |r: LevelRecord| CorrectedLevel {
            measured: r.clone(),
            corrected: r,
            flags: [CorrectionFlag::Measured; LevelField::COUNT],
        };
        let sounding = CorrectedSounding {
            timestamp: NaiveDate::from_ymd_opt(2021, 3, 7)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            levels: vec![corrected(record), corrected(calm)],
        };

        let text = encode_igra(&[sounding], &station).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "#03743       2021 03 07 06 9999    2 ERA5               515000    -1300"
        );
        assert_eq!(
            lines[1],
            "10 -9999 100000   112    73   810    31   246    60"
        );
        assert_eq!(
            lines[2],
            "20 -9999  91250   760    10 -9999 -9999   999     3"
        );
    }
}
