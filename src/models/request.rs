//! Request Builder: expands station declarations into atomic retrieval units
//! and renders the monthly requests sent to the archive service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::models::station::{DatasetKind, StationRequest};
use crate::utils::constants::{PRESSURE_LEVELS, UPPER_AIR_HOURS};

/// File format requested from the archive service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Netcdf,
    Csv,
}

/// NetCDF when this build can read it, CSV otherwise
impl Default for DataFormat {
    fn default() -> Self {
        if cfg!(feature = "netcdf") {
            DataFormat::Netcdf
        } else {
            DataFormat::Csv
        }
    }
}

impl DataFormat {
    /// Whether this build can read archive members in this format
    pub fn is_decodable(&self) -> bool {
        match self {
            DataFormat::Netcdf => cfg!(feature = "netcdf"),
            DataFormat::Csv => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Netcdf => "netcdf",
            DataFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "netcdf" | "nc" => Some(DataFormat::Netcdf),
            "csv" => Some(DataFormat::Csv),
            _ => None,
        }
    }
}

/// One (station, year, dataset kind) triple
#[derive(Debug, Clone)]
pub struct RetrievalUnit {
    pub station: Arc<StationRequest>,
    pub year: i32,
    pub kind: DatasetKind,
    pub format: DataFormat,
    pub signature: String,
}

impl RetrievalUnit {
    pub fn new(station: Arc<StationRequest>, year: i32, kind: DatasetKind, format: DataFormat) -> Self {
        let signature = compute_signature(&station, year, kind, format);
        Self {
            station,
            year,
            kind,
            format,
            signature,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station.id
    }

    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.station.id, self.year, self.kind)
    }

    /// Member name for one month inside the committed archive, without extension
    pub fn month_member_stem(&self, month: u32) -> String {
        format!("era5_{}_{}_{:02}", self.kind, self.year, month)
    }

    /// Request body for one calendar month
    pub fn monthly_request(&self, month: u32) -> Value {
        let variables: Vec<&str> = self.kind.variables().iter().map(|(name, _)| *name).collect();
        let days: Vec<String> = (1..=days_in_month(self.year, month))
            .map(|d| format!("{:02}", d))
            .collect();
        let area = self.station.area();

        let mut request = json!({
            "product_type": ["reanalysis"],
            "variable": variables,
            "year": [self.year.to_string()],
            "month": [format!("{:02}", month)],
            "day": days,
            "area": area,
            "data_format": self.format.as_str(),
            "download_format": "unarchived",
        });

        match self.kind {
            DatasetKind::Surface => {
                let times: Vec<String> = (0..24).map(|h| format!("{:02}:00", h)).collect();
                request["time"] = json!(times);
            }
            DatasetKind::UpperAir => {
                let times: Vec<String> = UPPER_AIR_HOURS
                    .iter()
                    .map(|h| format!("{:02}:00", h))
                    .collect();
                let levels: Vec<String> = PRESSURE_LEVELS.iter().map(|l| l.to_string()).collect();
                request["time"] = json!(times);
                request["pressure_level"] = json!(levels);
            }
        }

        request
    }
}

impl fmt::Display for RetrievalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

/// Hex SHA-256 over everything that shapes the remote request.
pub fn compute_signature(
    station: &StationRequest,
    year: i32,
    kind: DatasetKind,
    format: DataFormat,
) -> String {
    let mut hasher = Sha256::new();
    let variables: Vec<&str> = kind.variables().iter().map(|(name, _)| *name).collect();

    hasher.update(station.id.as_bytes());
    hasher.update(
        format!(
            "|{:.4}|{:.4}|{:.4}|{}|{}|{}|{}|{}",
            station.latitude,
            station.longitude,
            station.area_buffer,
            year,
            kind.as_str(),
            kind.dataset_name(),
            variables.join(","),
            format.as_str()
        )
        .as_bytes(),
    );
    if kind == DatasetKind::UpperAir {
        let levels: Vec<String> = PRESSURE_LEVELS.iter().map(|l| l.to_string()).collect();
        hasher.update(format!("|{}", levels.join(",")).as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// Expand stations into units, station-major then year then kind.
pub fn build_units(stations: &[StationRequest], format: DataFormat) -> Vec<RetrievalUnit> {
    let mut units = Vec::new();
    for station in stations {
        let station = Arc::new(station.clone());
        for year in station.years() {
            for kind in &station.kinds {
                units.push(RetrievalUnit::new(Arc::clone(&station), year, *kind, format));
            }
        }
    }
    units
}
