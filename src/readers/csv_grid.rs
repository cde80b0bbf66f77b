use chrono::{DateTime, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;

use crate::error::{ProcessingError, Result};
use crate::readers::grid_table::{GridRow, GridTable};

const TIME_COLUMNS: &[&str] = &["valid_time", "time"];
const LEVEL_COLUMNS: &[&str] = &["pressure_level", "level"];
const IGNORED_COLUMNS: &[&str] = &["number", "expver", "step", "surface"];

const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

fn parse_value(text: &str) -> Option<Option<f64>> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") || text == "--" {
        return Some(None);
    }
    text.parse::<f64>()
        .ok()
        .map(|v| if v.is_finite() { Some(v) } else { None })
}

/// Decode an ERA5 long-format CSV table: a time column, latitude,
/// longitude, optional pressure level, then one column per variable.
pub fn read_csv_grid<R: Read>(reader: R, source: &Path) -> Result<GridTable> {
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let position = |names: &[&str]| headers.iter().position(|h| names.contains(&h));

    let time_idx = position(TIME_COLUMNS)
        .ok_or_else(|| ProcessingError::format(source, "no valid_time/time column"))?;
    let lat_idx = position(&["latitude", "lat"])
        .ok_or_else(|| ProcessingError::format(source, "no latitude column"))?;
    let lon_idx = position(&["longitude", "lon"])
        .ok_or_else(|| ProcessingError::format(source, "no longitude column"))?;
    let level_idx = position(LEVEL_COLUMNS);

    let variable_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            *i != time_idx
                && *i != lat_idx
                && *i != lon_idx
                && Some(*i) != level_idx
                && !IGNORED_COLUMNS.contains(name)
        })
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut table = GridTable::new(
        source,
        variable_columns.iter().map(|(_, n)| n.clone()).collect(),
    );

    for (line, result) in csv_reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let row_error = |what: &str, value: &str| {
            ProcessingError::format(source, format!("row {}: bad {} '{}'", line + 2, what, value))
        };

        let time = parse_timestamp(field(time_idx))
            .ok_or_else(|| row_error("timestamp", field(time_idx)))?;
        let latitude = parse_value(field(lat_idx))
            .flatten()
            .ok_or_else(|| row_error("latitude", field(lat_idx)))?;
        let longitude = parse_value(field(lon_idx))
            .flatten()
            .ok_or_else(|| row_error("longitude", field(lon_idx)))?;
        let level = match level_idx {
            Some(idx) => Some(
                parse_value(field(idx))
                    .flatten()
                    .ok_or_else(|| row_error("pressure level", field(idx)))?,
            ),
            None => None,
        };

        let mut values = Vec::with_capacity(variable_columns.len());
        for (idx, name) in &variable_columns {
            let value = parse_value(field(*idx)).ok_or_else(|| row_error(name, field(*idx)))?;
            values.push(value);
        }

        table.rows.push(GridRow {
            time,
            latitude,
            longitude,
            level,
            values,
        });
    }

    Ok(table)
}
