use serde::{Deserialize, Serialize};

use crate::models::sounding::{CorrectedSounding, UpperAirSounding};
use crate::models::station::DatasetKind;
use crate::models::surface::{CorrectedSurfaceRecord, SurfaceRecord};

/// Output of extraction, one variant per dataset kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ExtractedSeries {
    Surface(Vec<SurfaceRecord>),
    UpperAir(Vec<UpperAirSounding>),
}

impl ExtractedSeries {
    pub fn kind(&self) -> DatasetKind {
        match self {
            ExtractedSeries::Surface(_) => DatasetKind::Surface,
            ExtractedSeries::UpperAir(_) => DatasetKind::UpperAir,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ExtractedSeries::Surface(records) => records.len(),
            ExtractedSeries::UpperAir(soundings) => soundings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum CorrectedSeries {
    Surface(Vec<CorrectedSurfaceRecord>),
    UpperAir(Vec<CorrectedSounding>),
}

impl CorrectedSeries {
    pub fn kind(&self) -> DatasetKind {
        match self {
            CorrectedSeries::Surface(_) => DatasetKind::Surface,
            CorrectedSeries::UpperAir(_) => DatasetKind::UpperAir,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CorrectedSeries::Surface(records) => records.len(),
            CorrectedSeries::UpperAir(soundings) => soundings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
