use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::Path;

use crate::error::{ProcessingError, Result};
use crate::readers::grid_table::GridTable;

/// CF time axis: `<unit> since <reference>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAxis {
    pub seconds_per_unit: f64,
    pub reference: NaiveDateTime,
}

impl TimeAxis {
    pub fn parse(units: &str) -> Option<Self> {
        let (unit, reference) = units.split_once(" since ")?;
        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "s" => 1.0,
            "minutes" | "minute" => 60.0,
            "hours" | "hour" | "h" => 3600.0,
            "days" | "day" => 86400.0,
            _ => return None,
        };
        let reference = reference.trim().trim_end_matches(" UTC").trim_end_matches('Z');

        let parsed = [
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M",
        ]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(reference, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(reference, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

        Some(Self {
            seconds_per_unit,
            reference: parsed,
        })
    }

    pub fn timestamp(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let seconds = (value * self.seconds_per_unit).round() as i64;
        self.reference.checked_add_signed(Duration::seconds(seconds))
    }
}

/// Decode a NetCDF member into a grid table.
#[cfg(feature = "netcdf")]
pub fn read_netcdf_grid(path: &Path) -> Result<GridTable> {
    imp::read(path)
}

#[cfg(not(feature = "netcdf"))]
pub fn read_netcdf_grid(path: &Path) -> Result<GridTable> {
    Err(ProcessingError::format(
        path,
        "NetCDF data requires building with the `netcdf` feature (or set `retrieval.format = \"csv\"`)",
    ))
}

#[cfg(feature = "netcdf")]
mod imp {
    use super::*;
    use crate::readers::grid_table::GridRow;
    use netcdf::AttributeValue;

    const TIME_NAMES: &[&str] = &["valid_time", "time"];
    const LAT_NAMES: &[&str] = &["latitude", "lat"];
    const LON_NAMES: &[&str] = &["longitude", "lon"];
    const LEVEL_NAMES: &[&str] = &["pressure_level", "level", "isobaricInhPa"];

    #[derive(Clone, Copy, PartialEq)]
    enum Axis {
        Time,
        Level,
        Lat,
        Lon,
        Singleton,
    }

    fn attribute_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
        match var.attribute_value(name).and_then(|r| r.ok())? {
            AttributeValue::Double(d) => Some(d),
            AttributeValue::Float(f) => Some(f as f64),
            AttributeValue::Short(s) => Some(s as f64),
            AttributeValue::Int(i) => Some(i as f64),
            AttributeValue::Longlong(i) => Some(i as f64),
            _ => None,
        }
    }

    fn attribute_text(var: &netcdf::Variable, name: &str) -> Option<String> {
        match var.attribute_value(name).and_then(|r| r.ok())? {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn find<'f>(
        file: &'f netcdf::File,
        names: &[&str],
    ) -> Option<(String, netcdf::Variable<'f>)> {
        names
            .iter()
            .find_map(|n| file.variable(n).map(|v| (n.to_string(), v)))
    }

    fn values(path: &Path, var: &netcdf::Variable) -> Result<Vec<Option<f64>>> {
        let raw: Vec<f64> = var
            .get_values(..)
            .map_err(|e| ProcessingError::format(path, format!("{}: {}", var.name(), e)))?;
        let fill = attribute_f64(var, "_FillValue").or_else(|| attribute_f64(var, "missing_value"));
        let scale = attribute_f64(var, "scale_factor").unwrap_or(1.0);
        let offset = attribute_f64(var, "add_offset").unwrap_or(0.0);

        Ok(raw
            .into_iter()
            .map(|v| {
                let is_fill = fill.is_some_and(|f| (v - f).abs() <= f.abs() * 1e-6);
                (v.is_finite() && !is_fill).then(|| v * scale + offset)
            })
            .collect())
    }

    fn coordinate(path: &Path, var: &netcdf::Variable) -> Result<Vec<f64>> {
        Ok(values(path, var)?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }

    pub(super) fn read(path: &Path) -> Result<GridTable> {
        let file = netcdf::open(path).map_err(|e| ProcessingError::format(path, e.to_string()))?;

        let (time_name, time_var) = find(&file, TIME_NAMES)
            .ok_or_else(|| ProcessingError::format(path, "no valid_time/time variable"))?;
        let (lat_name, lat_var) = find(&file, LAT_NAMES)
            .ok_or_else(|| ProcessingError::format(path, "no latitude variable"))?;
        let (lon_name, lon_var) = find(&file, LON_NAMES)
            .ok_or_else(|| ProcessingError::format(path, "no longitude variable"))?;
        let level = find(&file, LEVEL_NAMES);

        let units = attribute_text(&time_var, "units")
            .ok_or_else(|| ProcessingError::format(path, "time variable has no units"))?;
        let axis = TimeAxis::parse(&units).ok_or_else(|| {
            ProcessingError::format(path, format!("unsupported time units '{}'", units))
        })?;

        let times = coordinate(path, &time_var)?
            .into_iter()
            .map(|v| {
                axis.timestamp(v)
                    .ok_or_else(|| ProcessingError::format(path, format!("bad time value {}", v)))
            })
            .collect::<Result<Vec<_>>>()?;
        let lats = coordinate(path, &lat_var)?;
        let lons = coordinate(path, &lon_var)?;
        let levels = match &level {
            Some((_, var)) => Some(coordinate(path, var)?),
            None => None,
        };
        let level_name = level.as_ref().map(|(n, _)| n.clone());

        let coordinate_names = [
            Some(time_name.clone()),
            Some(lat_name.clone()),
            Some(lon_name.clone()),
            level_name.clone(),
        ];

        let mut names = Vec::new();
        let mut columns: Vec<(Vec<Axis>, Vec<usize>, Vec<Option<f64>>)> = Vec::new();

        for var in file.variables() {
            let name = var.name();
            if coordinate_names.iter().flatten().any(|c| *c == name) {
                continue;
            }
            let dims = var.dimensions();
            let dim_names: Vec<String> = dims.iter().map(|d| d.name()).collect();
            if !dim_names.contains(&time_name)
                || !dim_names.contains(&lat_name)
                || !dim_names.contains(&lon_name)
            {
                continue;
            }

            let mut axes = Vec::with_capacity(dims.len());
            for dim in dims {
                let dim_name = dim.name();
                let axis = if dim_name == time_name {
                    Axis::Time
                } else if dim_name == lat_name {
                    Axis::Lat
                } else if dim_name == lon_name {
                    Axis::Lon
                } else if level_name.as_deref() == Some(dim_name.as_str()) {
                    Axis::Level
                } else if dim.len() == 1 {
                    Axis::Singleton
                } else {
                    return Err(ProcessingError::format(
                        path,
                        format!("variable {} has unexpected dimension {}", name, dim_name),
                    ));
                };
                axes.push(axis);
            }

            let lengths: Vec<usize> = dims.iter().map(|d| d.len()).collect();
            let mut strides = vec![1usize; lengths.len()];
            for i in (0..lengths.len().saturating_sub(1)).rev() {
                strides[i] = strides[i + 1] * lengths[i + 1];
            }

            names.push(name.clone());
            columns.push((axes, strides, values(path, &var)?));
        }

        let mut table = GridTable::new(path, names);
        let level_count = levels.as_ref().map_or(1, |l| l.len());

        for (t, time) in times.iter().enumerate() {
            for l in 0..level_count {
                for (y, lat) in lats.iter().enumerate() {
                    for (x, lon) in lons.iter().enumerate() {
                        let values = columns
                            .iter()
                            .map(|(axes, strides, data)| {
                                let offset: usize = axes
                                    .iter()
                                    .zip(strides)
                                    .map(|(axis, stride)| {
                                        stride
                                            * match axis {
                                                Axis::Time => t,
                                                Axis::Level => l,
                                                Axis::Lat => y,
                                                Axis::Lon => x,
                                                Axis::Singleton => 0,
                                            }
                                    })
                                    .sum();
                                data.get(offset).copied().flatten()
                            })
                            .collect();

                        table.rows.push(GridRow {
                            time: *time,
                            latitude: *lat,
                            longitude: *lon,
                            level: levels.as_ref().map(|lv| lv[l]),
                            values,
                        });
                    }
                }
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_axis_units() {
        let axis = TimeAxis::parse("seconds since 1970-01-01").unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(axis.timestamp(1_609_459_200.0), Some(expected));

        let hours = TimeAxis::parse("hours since 1900-01-01 00:00:00.0").unwrap();
        assert_eq!(hours.seconds_per_unit, 3600.0);
        assert_eq!(hours.timestamp(1_060_680.0), Some(expected));

        assert!(TimeAxis::parse("fortnights since 1900-01-01").is_none());
        assert!(TimeAxis::parse("hours").is_none());
        assert_eq!(axis.timestamp(f64::NAN), None);
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_missing_feature_is_a_format_error() {
        let err = read_netcdf_grid(Path::new("raw/m01.nc")).unwrap_err();
        assert!(matches!(err, ProcessingError::Format { .. }));
        assert!(err.to_string().contains("netcdf"));
    }
}
