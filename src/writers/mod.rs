pub mod columns;
pub mod igra_writer;
pub mod interim_csv;
pub mod pfl_writer;
pub mod sfc_writer;

pub use columns::{ColumnSpec, FieldKind, FieldValue, LineLayout};

use crate::error::Result;
use crate::models::{CorrectedSeries, StationRequest};

/// Render the processed AERMET input for a corrected series: `.SFC` text
/// for surface data, `.PFL` text for upper air.
pub fn encode(series: &CorrectedSeries, station: &StationRequest, year: i32) -> Result<String> {
    match series {
        CorrectedSeries::Surface(records) => sfc_writer::encode_surface(records, station),
        CorrectedSeries::UpperAir(soundings) => {
            pfl_writer::encode_profile(soundings, station, year)
        }
    }
}

/// Render the interim file: surface CSV table or IGRA v2 soundings.
pub fn encode_interim(series: &CorrectedSeries, station: &StationRequest) -> Result<Vec<u8>> {
    match series {
        CorrectedSeries::Surface(records) => interim_csv::encode_surface_table(records),
        CorrectedSeries::UpperAir(soundings) => {
            Ok(igra_writer::encode_igra(soundings, station)?.into_bytes())
        }
    }
}
