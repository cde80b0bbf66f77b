//! Shared extraction contract: one raw archive in, one series out.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ProcessingError, Result};
use crate::models::{DatasetKind, ExtractedSeries, RetrievalUnit};
use crate::processors::surface_extractor::extract_surface;
use crate::processors::upper_air_extractor::extract_upper_air;
use crate::readers::{read_raw_archive, GridTable};

/// What extraction saw and skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionLog {
    /// Selected grid point (latitude, longitude)
    pub grid_point: (f64, f64),
    pub source_rows: usize,
    pub duplicates: usize,
    /// Rows outside the unit's calendar year or off the hourly grid
    pub ignored_rows: usize,
    /// Surface hours with no source row at all
    pub missing_hours: usize,
}

/// Selected grid point, or a format error when the table has none.
pub(crate) fn select_point(table: &GridTable, latitude: f64, longitude: f64) -> Result<(f64, f64)> {
    table
        .nearest_point(latitude, longitude)
        .ok_or_else(|| ProcessingError::format(&table.source, "no grid points in raw data"))
}

/// Decode an already-loaded table for `unit`.
pub fn extract_table(table: &GridTable, unit: &RetrievalUnit) -> Result<(ExtractedSeries, ExtractionLog)> {
    let (series, log) = match unit.kind {
        DatasetKind::Surface => {
            let (records, log) = extract_surface(table, &unit.station, unit.year)?;
            (ExtractedSeries::Surface(records), log)
        }
        DatasetKind::UpperAir => {
            let (soundings, log) = extract_upper_air(table, &unit.station, unit.year)?;
            (ExtractedSeries::UpperAir(soundings), log)
        }
    };

    debug!(
        "{}: grid point ({:.3}, {:.3}), {} source rows, {} duplicates, {} ignored",
        unit, log.grid_point.0, log.grid_point.1, log.source_rows, log.duplicates, log.ignored_rows
    );
    Ok((series, log))
}

/// Read the raw archive at `raw` and extract the unit's series.
pub fn extract(raw: &Path, unit: &RetrievalUnit) -> Result<(ExtractedSeries, ExtractionLog)> {
    let table = read_raw_archive(raw)?;
    let (series, log) = extract_table(&table, unit)?;
    info!(
        "Extracted {} {} entries for {} ({} duplicate rows dropped)",
        series.len(),
        unit.kind,
        unit,
        log.duplicates
    );
    Ok((series, log))
}
