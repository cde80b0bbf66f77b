use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{ProcessingError, Result};
use crate::models::{StationRequest, SurfaceRecord};
use crate::processors::extractor::{select_point, ExtractionLog};
use crate::readers::GridTable;
use crate::utils::constants::SURFACE_VARIABLES;
use crate::utils::conversions::{
    accumulated_flux_to_upward_watts, cloud_fraction_to_tenths, kelvin_to_celsius,
    metres_to_millimetres, pascal_to_hpa, wind_direction, wind_speed,
};

/// First hour of `year` and the number of hours in it
pub fn year_hours(year: i32) -> Result<(NaiveDateTime, usize)> {
    let bounds = NaiveDate::from_ymd_opt(year, 1, 1).zip(NaiveDate::from_ymd_opt(year + 1, 1, 1));
    let out_of_range = || ProcessingError::Validation(format!("Year {} is out of range", year));
    let (first, next) = bounds.ok_or_else(out_of_range)?;
    let start = first.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?;
    Ok((start, ((next - first).num_days() * 24) as usize))
}

struct Columns {
    u10: usize,
    v10: usize,
    t2m: usize,
    d2m: usize,
    sp: usize,
    tcc: usize,
    cbh: usize,
    tp: usize,
    blh: usize,
    fsr: usize,
    sshf: usize,
    zust: usize,
}

impl Columns {
    fn resolve(table: &GridTable) -> Result<Self> {
        let names: Vec<&str> = SURFACE_VARIABLES.iter().map(|(_, short)| *short).collect();
        table.require(&names)?;
        let idx = |name: &str| table.variable_index(name).unwrap_or_default();
        Ok(Self {
            u10: idx("u10"),
            v10: idx("v10"),
            t2m: idx("t2m"),
            d2m: idx("d2m"),
            sp: idx("sp"),
            tcc: idx("tcc"),
            cbh: idx("cbh"),
            tp: idx("tp"),
            blh: idx("blh"),
            fsr: idx("fsr"),
            sshf: idx("sshf"),
            zust: idx("zust"),
        })
    }
}

fn convert(timestamp: NaiveDateTime, values: &[Option<f64>], c: &Columns) -> SurfaceRecord {
    let get = |i: usize| values.get(i).copied().flatten();
    let wind = get(c.u10).zip(get(c.v10));

    SurfaceRecord {
        timestamp,
        wind_speed: wind.map(|(u, v)| wind_speed(u, v)),
        wind_direction: wind.map(|(u, v)| wind_direction(u, v)),
        temperature: get(c.t2m).map(kelvin_to_celsius),
        pressure: get(c.sp).map(pascal_to_hpa),
        cloud_cover: get(c.tcc).map(cloud_fraction_to_tenths),
        ceiling_height: get(c.cbh),
        dewpoint: get(c.d2m).map(kelvin_to_celsius),
        precipitation: get(c.tp).map(metres_to_millimetres),
        sensible_heat_flux: get(c.sshf).map(accumulated_flux_to_upward_watts),
        friction_velocity: get(c.zust),
        boundary_layer_height: get(c.blh),
        roughness: get(c.fsr),
    }
}

/// Hourly series at the grid point nearest the station, one record for
/// every hour of `year`. Hours with no source row are all-missing.
pub fn extract_surface(
    table: &GridTable,
    station: &StationRequest,
    year: i32,
) -> Result<(Vec<SurfaceRecord>, ExtractionLog)> {
    let columns = Columns::resolve(table)?;
    let point = select_point(table, station.latitude, station.longitude)?;
    let (start, hours) = year_hours(year)?;

    let mut slots: Vec<Option<SurfaceRecord>> = vec![None; hours];
    let mut log = ExtractionLog {
        grid_point: point,
        duplicates: table.duplicates,
        ..Default::default()
    };

    for row in table.rows_at(point) {
        log.source_rows += 1;
        let offset = row.time - start;
        let on_grid = row.time.minute() == 0 && row.time.second() == 0;
        let index = usize::try_from(offset.num_hours()).ok().filter(|i| *i < hours);

        match index {
            Some(i) if on_grid && offset >= Duration::zero() => {
                if slots[i].is_some() {
                    log.duplicates += 1;
                } else {
                    slots[i] = Some(convert(row.time, &row.values, &columns));
                }
            }
            _ => log.ignored_rows += 1,
        }
    }

    let records: Vec<SurfaceRecord> = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                log.missing_hours += 1;
                SurfaceRecord::missing(start + Duration::hours(i as i64))
            })
        })
        .collect();

    Ok((records, log))
}
