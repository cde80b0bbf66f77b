use chrono::{Datelike, NaiveDateTime};
use std::collections::BTreeMap;

use crate::error::{ProcessingError, Result};
use crate::models::{LevelRecord, StationRequest, UpperAirSounding};
use crate::processors::extractor::{select_point, ExtractionLog};
use crate::readers::GridTable;
use crate::utils::constants::UPPER_AIR_VARIABLES;
use crate::utils::conversions::{
    dewpoint_from_relative_humidity, geopotential_to_height, kelvin_to_celsius, wind_direction,
    wind_speed,
};

/// Soundings at the grid point nearest the station, one per distinct
/// source timestamp in `year`, levels by decreasing pressure.
pub fn extract_upper_air(
    table: &GridTable,
    station: &StationRequest,
    year: i32,
) -> Result<(Vec<UpperAirSounding>, ExtractionLog)> {
    let names: Vec<&str> = UPPER_AIR_VARIABLES.iter().map(|(_, short)| *short).collect();
    table.require(&names)?;
    let column = |name: &str| table.variable_index(name).unwrap_or_default();
    let (z, t, u, v, r) = (column("z"), column("t"), column("u"), column("v"), column("r"));

    if !table.rows.is_empty() && !table.has_levels() {
        return Err(ProcessingError::format(
            &table.source,
            "upper-air data has no pressure_level column",
        ));
    }

    let point = select_point(table, station.latitude, station.longitude)?;
    let mut log = ExtractionLog {
        grid_point: point,
        duplicates: table.duplicates,
        ..Default::default()
    };
    let mut soundings: BTreeMap<NaiveDateTime, Vec<LevelRecord>> = BTreeMap::new();

    for row in table.rows_at(point) {
        log.source_rows += 1;
        let pressure = match row.level {
            Some(p) if row.time.year() == year && p.is_finite() && p > 0.0 => p,
            _ => {
                log.ignored_rows += 1;
                continue;
            }
        };

        let get = |i: usize| row.values.get(i).copied().flatten();
        let temperature = get(t).map(kelvin_to_celsius);
        let humidity = get(r);
        let wind = get(u).zip(get(v));

        let levels = soundings.entry(row.time).or_default();
        if levels.iter().any(|l| (l.pressure - pressure).abs() < 1e-6) {
            log.duplicates += 1;
            continue;
        }
        levels.push(LevelRecord {
            pressure,
            height: get(z).map(geopotential_to_height),
            temperature,
            relative_humidity: humidity,
            dewpoint: temperature
                .zip(humidity)
                .and_then(|(t, rh)| dewpoint_from_relative_humidity(t, rh)),
            wind_speed: wind.map(|(u, v)| wind_speed(u, v)),
            wind_direction: wind.map(|(u, v)| wind_direction(u, v)),
        });
    }

    let soundings = soundings
        .into_iter()
        .map(|(timestamp, mut levels)| {
            levels.sort_by(|a, b| b.pressure.total_cmp(&a.pressure));
            UpperAirSounding::new(timestamp, levels)
        })
        .collect();

    Ok((soundings, log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::GridRow;
    use chrono::NaiveDate;
    use std::path::Path;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn row(hour: u32, level: f64, z: f64, t: f64) -> GridRow {
        GridRow {
            time: at(hour),
            latitude: 51.5,
            longitude: 0.0,
            level: Some(level),
            // z t u v r
            values: vec![Some(z), Some(t), Some(3.0), Some(4.0), Some(70.0)],
        }
    }

    fn table() -> GridTable {
        let names = ["z", "t", "u", "v", "r"].iter().map(|s| s.to_string()).collect();
        GridTable::new(Path::new("raw/upperair.zip"), names)
    }

    fn station() -> StationRequest {
        StationRequest::builder("SiteA")
            .coordinates(51.5, 0.0)
            .year(2021)
            .build()
            .unwrap()
    }

    #[test]
    fn test_soundings_grouped_and_ordered() {
        let mut t = table();
        t.rows.push(row(6, 850.0, 14_709.975, 280.0));
        t.rows.push(row(0, 925.0, 7_354.9875, 285.0));
        t.rows.push(row(0, 1000.0, 980.665, 290.0));
        t.rows.push(row(0, 1000.0, 999.0, 999.0));

        let (soundings, log) = extract_upper_air(&t, &station(), 2021).unwrap();
        assert_eq!(soundings.len(), 2);
        assert_eq!(log.duplicates, 1);

        let first = &soundings[0];
        assert_eq!(first.timestamp, at(0));
        assert_eq!(first.levels.len(), 2);
        assert_eq!(first.levels[0].pressure, 1000.0);
        assert!((first.levels[0].height.unwrap() - 100.0).abs() < 1e-6);
        assert!((first.levels[1].height.unwrap() - 750.0).abs() < 1e-6);
        assert!(first.is_ordered());

        let level = &first.levels[0];
        assert!((level.temperature.unwrap() - 16.85).abs() < 1e-9);
        assert!((level.wind_speed.unwrap() - 5.0).abs() < 1e-9);
        assert!(level.dewpoint.unwrap() < level.temperature.unwrap());
    }

    #[test]
    fn test_requires_levels() {
        let mut t = table();
        let mut flat = row(0, 1000.0, 0.0, 280.0);
        flat.level = None;
        t.rows.push(flat);
        assert!(matches!(
            extract_upper_air(&t, &station(), 2021),
            Err(ProcessingError::Format { .. })
        ));
    }
}
