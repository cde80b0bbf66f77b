use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{
    DEFAULT_AREA_BUFFER, DEFAULT_STATION_ID, SURFACE_DATASET, SURFACE_VARIABLES,
    UPPER_AIR_DATASET, UPPER_AIR_VARIABLES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Surface,
    #[serde(alias = "upper_air")]
    UpperAir,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Surface, DatasetKind::UpperAir];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Surface => "surface",
            DatasetKind::UpperAir => "upperair",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "surface" | "sfc" => Some(DatasetKind::Surface),
            "upperair" | "upper_air" | "pfl" | "profile" => Some(DatasetKind::UpperAir),
            _ => None,
        }
    }

    /// Remote dataset the kind is retrieved from
    pub fn dataset_name(&self) -> &'static str {
        match self {
            DatasetKind::Surface => SURFACE_DATASET,
            DatasetKind::UpperAir => UPPER_AIR_DATASET,
        }
    }

    /// (request name, short name) pairs for the kind
    pub fn variables(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            DatasetKind::Surface => SURFACE_VARIABLES,
            DatasetKind::UpperAir => UPPER_AIR_VARIABLES,
        }
    }

    pub fn processed_extension(&self) -> &'static str {
        match self {
            DatasetKind::Surface => "SFC",
            DatasetKind::UpperAir => "PFL",
        }
    }

    pub fn interim_extension(&self) -> &'static str {
        match self {
            DatasetKind::Surface => "csv",
            DatasetKind::UpperAir => "igra",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Land-use parameters written into the surface file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct SiteCharacteristics {
    #[validate(range(min = 0.0, max = 1.0))]
    pub albedo: f64,

    #[validate(range(min = 0.0, max = 10.0))]
    pub bowen_ratio: f64,

    #[validate(range(exclusive_min = 0.0, max = 5.0))]
    pub roughness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_station_request", skip_on_field_errors = false))]
pub struct StationRequest {
    #[validate(length(min = 1, max = 32), custom(function = "validate_identifier"))]
    pub id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 360.0))]
    pub longitude: f64,

    #[validate(range(min = -500.0, max = 9000.0))]
    pub elevation: f64,

    #[validate(range(min = 1940, max = 2100))]
    pub start_year: i32,

    #[validate(range(min = 1940, max = 2100))]
    pub end_year: i32,

    #[validate(length(min = 1))]
    pub kinds: Vec<DatasetKind>,

    #[validate(length(min = 1, max = 8))]
    pub ua_id: String,

    #[validate(length(min = 1, max = 8))]
    pub surf_id: String,

    #[validate(nested)]
    pub site: Option<SiteCharacteristics>,

    #[validate(range(min = 0.0, max = 5.0))]
    pub area_buffer: f64,
}

fn validate_identifier(id: &str) -> std::result::Result<(), ValidationError> {
    // The id becomes a directory name
    if id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(ValidationError::new("station_id_characters"))
    }
}

fn validate_station_request(request: &StationRequest) -> std::result::Result<(), ValidationError> {
    if request.start_year > request.end_year {
        return Err(ValidationError::new("year_range_reversed"));
    }
    let mut kinds = request.kinds.clone();
    kinds.sort();
    kinds.dedup();
    if kinds.len() != request.kinds.len() {
        return Err(ValidationError::new("duplicate_dataset_kind"));
    }
    Ok(())
}

impl StationRequest {
    pub fn builder(id: impl Into<String>) -> StationRequestBuilder {
        StationRequestBuilder::new(id)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start_year..=self.end_year
    }

    pub fn wants(&self, kind: DatasetKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Retrieval box as `[north, west, south, east]`
    pub fn area(&self) -> [f64; 4] {
        let buffer = self.area_buffer;
        [
            (self.latitude + buffer).min(90.0),
            self.longitude - buffer,
            (self.latitude - buffer).max(-90.0),
            self.longitude + buffer,
        ]
    }
}

pub struct StationRequestBuilder {
    id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    elevation: f64,
    years: Option<(i32, i32)>,
    kinds: Vec<DatasetKind>,
    ua_id: Option<String>,
    surf_id: Option<String>,
    site: Option<SiteCharacteristics>,
    area_buffer: f64,
}

impl StationRequestBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latitude: None,
            longitude: None,
            elevation: 0.0,
            years: None,
            kinds: DatasetKind::ALL.to_vec(),
            ua_id: None,
            surf_id: None,
            site: None,
            area_buffer: DEFAULT_AREA_BUFFER,
        }
    }

    pub fn coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.years = Some((start, end));
        self
    }

    pub fn year(self, year: i32) -> Self {
        self.years(year, year)
    }

    pub fn kinds(mut self, kinds: Vec<DatasetKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn ua_id(mut self, id: impl Into<String>) -> Self {
        self.ua_id = Some(id.into());
        self
    }

    pub fn surf_id(mut self, id: impl Into<String>) -> Self {
        self.surf_id = Some(id.into());
        self
    }

    pub fn site(mut self, site: SiteCharacteristics) -> Self {
        self.site = Some(site);
        self
    }

    pub fn area_buffer(mut self, buffer: f64) -> Self {
        self.area_buffer = buffer;
        self
    }

    pub fn build(self) -> Result<StationRequest> {
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Station '{}' has no coordinates",
                    self.id
                )))
            }
        };
        let (start_year, end_year) = self.years.ok_or_else(|| {
            ProcessingError::Config(format!("Station '{}' has no year range", self.id))
        })?;

        let request = StationRequest {
            id: self.id,
            latitude,
            longitude,
            elevation: self.elevation,
            start_year,
            end_year,
            kinds: self.kinds,
            ua_id: self.ua_id.unwrap_or_else(|| DEFAULT_STATION_ID.to_string()),
            surf_id: self.surf_id.unwrap_or_else(|| DEFAULT_STATION_ID.to_string()),
            site: self.site,
            area_buffer: self.area_buffer,
        };

        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_request_builder() {
        let request = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .elevation(35.0)
            .years(2020, 2021)
            .build()
            .unwrap();

        assert_eq!(request.ua_id, "99999");
        assert_eq!(request.surf_id, "99999");
        assert_eq!(request.years().collect::<Vec<_>>(), vec![2020, 2021]);
        assert!(request.wants(DatasetKind::UpperAir));

        let area = request.area();
        assert!((area[0] - 51.75).abs() < 1e-9);
        assert!((area[1] - -0.38).abs() < 1e-9);
        assert!((area[2] - 51.25).abs() < 1e-9);
        assert!((area[3] - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_requests() {
        assert!(StationRequest::builder("SiteA")
            .coordinates(95.0, 0.0)
            .year(2021)
            .build()
            .is_err());

        assert!(StationRequest::builder("SiteA")
            .coordinates(51.0, 0.0)
            .years(2022, 2021)
            .build()
            .is_err());

        assert!(StationRequest::builder("Site A/1")
            .coordinates(51.0, 0.0)
            .year(2021)
            .build()
            .is_err());

        assert!(StationRequest::builder("SiteA")
            .coordinates(51.0, 0.0)
            .year(2021)
            .site(SiteCharacteristics {
                albedo: 0.2,
                bowen_ratio: 1.0,
                roughness: 0.0,
            })
            .build()
            .is_err());

        assert!(StationRequest::builder("SiteA").year(2021).build().is_err());
    }

    #[test]
    fn test_dataset_kind_names() {
        assert_eq!(DatasetKind::parse("PFL"), Some(DatasetKind::UpperAir));
        assert_eq!(DatasetKind::parse("surface"), Some(DatasetKind::Surface));
        assert_eq!(DatasetKind::UpperAir.to_string(), "upperair");
        assert_eq!(
            serde_json::to_string(&DatasetKind::UpperAir).unwrap(),
            "\"upperair\""
        );
        assert_eq!(DatasetKind::Surface.processed_extension(), "SFC");
    }
}
