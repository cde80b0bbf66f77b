use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ProcessingError, Result};
use crate::utils::coordinates::{haversine_distance, normalize_longitude};

/// One grid cell at one time (and pressure level, for upper air)
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub time: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub level: Option<f64>,
    /// Aligned with `GridTable::variables`
    pub values: Vec<Option<f64>>,
}

type RowKey = (NaiveDateTime, i64, i64, i64);

fn coord_key(value: f64) -> i64 {
    (value * 1e4).round() as i64
}

impl GridRow {
    fn key(&self) -> RowKey {
        (
            self.time,
            coord_key(self.latitude),
            coord_key(normalize_longitude(self.longitude)),
            self.level.map(coord_key).unwrap_or(i64::MIN),
        )
    }

    fn is_at(&self, point: (f64, f64)) -> bool {
        coord_key(self.latitude) == coord_key(point.0)
            && coord_key(normalize_longitude(self.longitude))
                == coord_key(normalize_longitude(point.1))
    }
}

/// Long-format table decoded from a raw member file
#[derive(Debug, Clone, Default)]
pub struct GridTable {
    pub source: PathBuf,
    pub variables: Vec<String>,
    pub rows: Vec<GridRow>,
    /// Rows dropped because their (time, point, level) was already present
    pub duplicates: usize,
}

impl GridTable {
    pub fn new(source: &Path, variables: Vec<String>) -> Self {
        Self {
            source: source.to_path_buf(),
            variables,
            rows: Vec::new(),
            duplicates: 0,
        }
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    /// Column indices for `names`, or a format error naming every absent one.
    pub fn require(&self, names: &[&str]) -> Result<Vec<usize>> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| self.variable_index(n).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ProcessingError::format(
                &self.source,
                format!("missing variable column(s): {}", missing.join(", ")),
            ));
        }
        Ok(names.iter().filter_map(|n| self.variable_index(n)).collect())
    }

    pub fn has_levels(&self) -> bool {
        self.rows.iter().any(|r| r.level.is_some())
    }

    /// Combine member tables keyed by (time, point, level). The first value
    /// seen for a variable wins; repeats inside one member are duplicates.
    pub fn merge(tables: Vec<GridTable>, source: &Path) -> GridTable {
        let mut variables: Vec<String> = Vec::new();
        for table in &tables {
            for name in &table.variables {
                if !variables.contains(name) {
                    variables.push(name.clone());
                }
            }
        }

        let mut merged: BTreeMap<RowKey, GridRow> = BTreeMap::new();
        let mut duplicates = 0;

        for table in tables {
            duplicates += table.duplicates;
            let mapping: Vec<usize> = table
                .variables
                .iter()
                .filter_map(|name| variables.iter().position(|v| v == name))
                .collect();
            let mut seen: HashSet<RowKey> = HashSet::new();

            for row in table.rows {
                let key = row.key();
                if !seen.insert(key) {
                    duplicates += 1;
                    continue;
                }
                let entry = merged.entry(key).or_insert_with(|| GridRow {
                    time: row.time,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    level: row.level,
                    values: vec![None; variables.len()],
                });
                for (value, &target) in row.values.into_iter().zip(&mapping) {
                    if entry.values[target].is_none() {
                        entry.values[target] = value;
                    }
                }
            }
        }

        GridTable {
            source: source.to_path_buf(),
            variables,
            rows: merged.into_values().collect(),
            duplicates,
        }
    }

    /// Distinct grid points, sorted by latitude then longitude
    pub fn grid_points(&self) -> Vec<(f64, f64)> {
        let mut keys: BTreeMap<(i64, i64), (f64, f64)> = BTreeMap::new();
        for row in &self.rows {
            let lon = normalize_longitude(row.longitude);
            keys.entry((coord_key(row.latitude), coord_key(lon)))
                .or_insert((row.latitude, lon));
        }
        keys.into_values().collect()
    }

    /// Grid point with the smallest great-circle distance to the target;
    /// ties go to the lowest latitude, then the lowest longitude.
    pub fn nearest_point(&self, latitude: f64, longitude: f64) -> Option<(f64, f64)> {
        let target_lon = normalize_longitude(longitude);
        let mut best: Option<((f64, f64), f64)> = None;

        for point in self.grid_points() {
            let distance = haversine_distance(latitude, target_lon, point.0, point.1);
            match best {
                Some((_, best_distance)) if distance >= best_distance - 1e-9 => {}
                _ => best = Some((point, distance)),
            }
        }

        best.map(|(point, _)| point)
    }

    pub fn rows_at(&self, point: (f64, f64)) -> impl Iterator<Item = &GridRow> {
        self.rows.iter().filter(move |row| row.is_at(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn row(hour: u32, lat: f64, lon: f64, values: Vec<Option<f64>>) -> GridRow {
        GridRow {
            time: at(hour),
            latitude: lat,
            longitude: lon,
            level: None,
            values,
        }
    }

    #[test]
    fn test_nearest_point_and_ties() {
        let mut table = GridTable::new(Path::new("t.csv"), vec!["t2m".into()]);
        for lat in [51.25, 51.5, 51.75] {
            for lon in [-0.25, 0.0] {
                table.rows.push(row(0, lat, lon, vec![Some(280.0)]));
            }
        }

        assert_eq!(table.nearest_point(51.48, -0.2), Some((51.5, -0.25)));
        // Exactly between two latitudes picks the lower one
        assert_eq!(table.nearest_point(51.375, 0.0), Some((51.25, 0.0)));
        // 0-360 longitudes are matched against -180..180 grids
        assert_eq!(table.nearest_point(51.74, 359.99), Some((51.75, 0.0)));
        assert_eq!(table.grid_points().len(), 6);
        assert_eq!(table.rows_at((51.5, -0.25)).count(), 1);
    }

    #[test]
    fn test_merge_members() {
        let mut instant = GridTable::new(Path::new("instant.nc"), vec!["t2m".into(), "u10".into()]);
        instant.rows.push(row(0, 51.5, 0.0, vec![Some(280.0), Some(1.0)]));
        instant.rows.push(row(0, 51.5, 0.0, vec![Some(999.0), Some(9.0)]));
        instant.rows.push(row(1, 51.5, 0.0, vec![Some(281.0), None]));

        let mut accum = GridTable::new(Path::new("accum.nc"), vec!["tp".into(), "t2m".into()]);
        accum.rows.push(row(0, 51.5, 0.0, vec![Some(0.001), Some(100.0)]));

        let merged = GridTable::merge(vec![instant, accum], Path::new("raw.zip"));
        assert_eq!(merged.variables, vec!["t2m", "u10", "tp"]);
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.duplicates, 1);
        assert_eq!(merged.rows[0].values, vec![Some(280.0), Some(1.0), Some(0.001)]);
        assert_eq!(merged.rows[1].values, vec![Some(281.0), None, None]);
    }

    #[test]
    fn test_require_reports_missing_columns() {
        let table = GridTable::new(Path::new("raw/a.zip"), vec!["t2m".into()]);
        assert_eq!(table.require(&["t2m"]).unwrap(), vec![0]);
        let err = table.require(&["t2m", "u10", "v10"]).unwrap_err();
        assert!(err.to_string().contains("u10, v10"));
    }
}
