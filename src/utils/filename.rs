use std::path::{Path, PathBuf};

use crate::models::{DatasetKind, RetrievalUnit, Stage};
use crate::utils::constants::{INTERIM_DIR, PROCESSED_DIR, RAW_DIR, REPORTS_DIR, STATE_DIR};

/// Paths of every artifact under the data directory.
///
/// ```text
/// raw/{station}/{year}/{kind}.zip            raw/{station}/{year}/{kind}.manifest.json
/// interim/{station}/{year}_surface.csv       interim/{station}/{year}_upperair.igra
/// processed/{station}/{year}.SFC             processed/{station}/{year}.PFL
/// state/{station}/{year}_{kind}.json         reports/run-{timestamp}.json
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self, station: &str, year: i32) -> PathBuf {
        self.root.join(RAW_DIR).join(station).join(year.to_string())
    }

    pub fn raw_archive(&self, unit: &RetrievalUnit) -> PathBuf {
        self.raw_dir(unit.station_id(), unit.year)
            .join(format!("{}.zip", unit.kind))
    }

    pub fn raw_manifest(&self, unit: &RetrievalUnit) -> PathBuf {
        self.raw_dir(unit.station_id(), unit.year)
            .join(format!("{}.manifest.json", unit.kind))
    }

    /// Private staging directory for monthly downloads
    pub fn raw_partial_dir(&self, unit: &RetrievalUnit) -> PathBuf {
        self.raw_dir(unit.station_id(), unit.year)
            .join(format!(".{}.partial", unit.kind))
    }

    pub fn interim_dir(&self, station: &str) -> PathBuf {
        self.root.join(INTERIM_DIR).join(station)
    }

    /// Contract interim file: surface CSV or upper-air IGRA text
    pub fn interim_file(&self, unit: &RetrievalUnit) -> PathBuf {
        self.interim_dir(unit.station_id()).join(format!(
            "{}_{}.{}",
            unit.year,
            unit.kind,
            unit.kind.interim_extension()
        ))
    }

    /// Lossless checkpoint of the extracted series
    pub fn extracted_checkpoint(&self, unit: &RetrievalUnit) -> PathBuf {
        self.interim_dir(unit.station_id())
            .join(format!("{}_{}.extracted.json", unit.year, unit.kind))
    }

    /// Lossless checkpoint of the corrected series
    pub fn corrected_checkpoint(&self, unit: &RetrievalUnit) -> PathBuf {
        self.interim_dir(unit.station_id())
            .join(format!("{}_{}.corrected.json", unit.year, unit.kind))
    }

    pub fn processed_file(&self, station: &str, year: i32, kind: DatasetKind) -> PathBuf {
        self.root
            .join(PROCESSED_DIR)
            .join(station)
            .join(format!("{}.{}", year, kind.processed_extension()))
    }

    pub fn processed_output(&self, unit: &RetrievalUnit) -> PathBuf {
        self.processed_file(unit.station_id(), unit.year, unit.kind)
    }

    pub fn state_file(&self, unit: &RetrievalUnit) -> PathBuf {
        self.root
            .join(STATE_DIR)
            .join(unit.station_id())
            .join(format!("{}_{}.json", unit.year, unit.kind))
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    /// Files written by stages from `first` onwards, latest stage first
    pub fn derived_artifacts(&self, unit: &RetrievalUnit, first: Stage) -> Vec<PathBuf> {
        let mut paths = vec![self.processed_output(unit)];
        if first <= Stage::Corrected {
            paths.push(self.corrected_checkpoint(unit));
            paths.push(self.interim_file(unit));
        }
        if first <= Stage::Extracted {
            paths.push(self.extracted_checkpoint(unit));
        }
        if first <= Stage::Retrieved {
            paths.push(self.state_file(unit));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{build_units, DataFormat, StationRequest};

    #[test]
    fn test_artifact_paths() {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .build()
            .unwrap();
        let units = build_units(&[station], DataFormat::Csv);
        let layout = DataLayout::new("/data");

        let surface = &units[0];
        let upper = &units[1];

        assert_eq!(
            layout.raw_archive(surface),
            PathBuf::from("/data/raw/SiteA/2021/surface.zip")
        );
        assert_eq!(
            layout.raw_manifest(upper),
            PathBuf::from("/data/raw/SiteA/2021/upperair.manifest.json")
        );
        assert_eq!(
            layout.interim_file(surface),
            PathBuf::from("/data/interim/SiteA/2021_surface.csv")
        );
        assert_eq!(
            layout.interim_file(upper),
            PathBuf::from("/data/interim/SiteA/2021_upperair.igra")
        );
        assert_eq!(
            layout.processed_output(upper),
            PathBuf::from("/data/processed/SiteA/2021.PFL")
        );
        assert_eq!(
            layout.state_file(surface),
            PathBuf::from("/data/state/SiteA/2021_surface.json")
        );
    }

    #[test]
    fn test_derived_artifacts_by_stage() {
        let station = StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .year(2021)
            .build()
            .unwrap();
        let units = build_units(&[station], DataFormat::Csv);
        let layout = DataLayout::new("/data");
        let unit = &units[0];

        assert_eq!(
            layout.derived_artifacts(unit, Stage::Done),
            vec![layout.processed_output(unit)]
        );
        assert_eq!(
            layout.derived_artifacts(unit, Stage::Corrected),
            vec![
                layout.processed_output(unit),
                layout.corrected_checkpoint(unit),
                layout.interim_file(unit),
            ]
        );
        let everything = layout.derived_artifacts(unit, Stage::Retrieved);
        assert_eq!(everything.len(), 5);
        assert_eq!(everything.last(), Some(&layout.state_file(unit)));
        // Raw downloads are never derived
        assert!(!everything.contains(&layout.raw_archive(unit)));
    }
}
