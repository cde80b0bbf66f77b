use std::path::{Path, PathBuf};

use crate::archive::inspector::detect_file_format;
use crate::archive::{ArchiveInspector, RawFormat};
use crate::error::Result;
use crate::readers::{read_output, DecodedOutput, OutputKind};
use crate::utils::constants::CALM_DIRECTION;
use crate::writers::columns::FieldKind;
use crate::writers::FieldValue;

/// Calendar columns, left out of the value statistics
const TIME_COLUMNS: &[&str] = &["yr", "mo", "dy", "jday", "hr", "etime"];

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: &'static str,
    pub present: usize,
    pub missing: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ColumnStats {
    fn collect(name: &'static str, values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let (min, max, sum) = present.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        let mean = if present.is_empty() {
            f64::NAN
        } else {
            sum / present.len() as f64
        };

        Self {
            name,
            present: present.len(),
            missing: values.len() - present.len(),
            min,
            max,
            mean,
        }
    }

    pub fn missing_percentage(&self) -> f64 {
        let total = self.present + self.missing;
        if total == 0 {
            0.0
        } else {
            self.missing as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputStatistics {
    pub path: PathBuf,
    pub kind: OutputKind,
    pub header: Option<String>,
    pub records: usize,
    /// Profile hours (PFL) or soundings (IGRA)
    pub profiles: usize,
    pub calm_records: usize,
    pub first: Option<String>,
    pub last: Option<String>,
    pub columns: Vec<ColumnStats>,
}

impl OutputStatistics {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} file: {}\n  Records: {}\n",
            self.kind.name(),
            self.path.display(),
            self.records
        );
        if let Some(header) = &self.header {
            summary.push_str(&format!("  Header: {}\n", header.trim_end()));
        }
        if self.profiles > 0 {
            summary.push_str(&format!("  Profiles: {}\n", self.profiles));
        }
        if let (Some(first), Some(last)) = (&self.first, &self.last) {
            summary.push_str(&format!("  Period: {} to {}\n", first, last));
        }
        if self.kind != OutputKind::Igra {
            summary.push_str(&format!("  Calm records: {}\n", self.calm_records));
        }
        summary
    }

    pub fn detailed_summary(&self) -> String {
        let mut text = self.summary();
        text.push_str("\n  Column       present  missing  missing%        min        max       mean\n");
        for column in &self.columns {
            if column.present == 0 {
                text.push_str(&format!(
                    "  {:<10} {:>9} {:>8} {:>8.1}%  (all missing)\n",
                    column.name,
                    column.present,
                    column.missing,
                    column.missing_percentage()
                ));
            } else {
                text.push_str(&format!(
                    "  {:<10} {:>9} {:>8} {:>8.1}% {:>10.2} {:>10.2} {:>10.2}\n",
                    column.name,
                    column.present,
                    column.missing,
                    column.missing_percentage(),
                    column.min,
                    column.max,
                    column.mean
                ));
            }
        }
        text
    }
}

pub struct OutputAnalyzer;

impl OutputAnalyzer {
    pub fn analyze(decoded: &DecodedOutput, path: &Path) -> OutputStatistics {
        let layout = decoded.kind.layout();

        let columns = layout
            .columns()
            .iter()
            .filter(|c| !matches!(c.kind, FieldKind::Text { .. }))
            .filter(|c| !TIME_COLUMNS.contains(&c.name))
            .map(|c| {
                let values: Vec<Option<f64>> =
                    decoded.column(c.name).into_iter().map(|v| v.as_f64()).collect();
                ColumnStats::collect(c.name, &values)
            })
            .collect();

        let calm_records = match decoded.kind {
            OutputKind::Igra => 0,
            _ => decoded
                .column("wd")
                .iter()
                .filter(|v| v.as_f64().is_some_and(|d| (d - CALM_DIRECTION).abs() < 0.5))
                .count(),
        };

        let profiles = match decoded.kind {
            OutputKind::Sfc => 0,
            OutputKind::Pfl => decoded
                .column("top")
                .iter()
                .filter(|v| v.as_i64() == Some(1))
                .count(),
            OutputKind::Igra => decoded.sounding_headers.len(),
        };

        let stamp = |record: &Vec<FieldValue>| -> Option<String> {
            let get = |name: &str| {
                layout
                    .index_of(name)
                    .and_then(|i| record.get(i))
                    .and_then(FieldValue::as_i64)
            };
            Some(format!(
                "{:02}/{:02}/{:02} hr {:02}",
                get("yr")?,
                get("mo")?,
                get("dy")?,
                get("hr")?
            ))
        };

        OutputStatistics {
            path: path.to_path_buf(),
            kind: decoded.kind,
            header: decoded.header.clone(),
            records: decoded.records.len(),
            profiles,
            calm_records,
            first: decoded.records.first().and_then(stamp),
            last: decoded.records.last().and_then(stamp),
            columns,
        }
    }

    pub fn analyze_file(path: &Path) -> Result<OutputStatistics> {
        let decoded = read_output(path)?;
        Ok(Self::analyze(&decoded, path))
    }
}

/// Human-readable report for any file the pipeline produces: decoded
/// statistics for SFC/PFL/IGRA files, a member listing for raw archives.
pub fn verify_file(path: &Path) -> Result<String> {
    if OutputKind::from_path(path).is_none() && detect_file_format(path)? == RawFormat::Zip {
        return Ok(ArchiveInspector::inspect(path)?.display_summary());
    }
    Ok(OutputAnalyzer::analyze_file(path)?.detailed_summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writers::pfl_writer::pfl_layout;

    fn line(hr: i64, height: f64, top: i64, wd: f64, ws: Option<f64>) -> String {
        pfl_layout()
            .encode(&[
                FieldValue::Int(Some(21)),
                FieldValue::Int(Some(1)),
                FieldValue::Int(Some(1)),
                FieldValue::Int(Some(hr)),
                FieldValue::Real(Some(height)),
                FieldValue::Int(Some(top)),
                FieldValue::Real(Some(wd)),
                FieldValue::Real(ws),
                FieldValue::Real(Some(280.0)),
                FieldValue::Real(None),
                FieldValue::Real(None),
            ])
            .unwrap()
    }

    #[test]
    fn test_profile_statistics() {
        let text = [
            line(1, 10.0, 0, 999.0, Some(0.0)),
            line(1, 500.0, 1, 270.0, Some(6.0)),
            line(2, 10.0, 1, 250.0, None),
        ]
        .join("\n");
        let path = Path::new("processed/SiteA/2021.PFL");
        let decoded = DecodedOutput::decode(OutputKind::Pfl, &text, path).unwrap();
        let stats = OutputAnalyzer::analyze(&decoded, path);

        assert_eq!(stats.records, 3);
        assert_eq!(stats.profiles, 2);
        assert_eq!(stats.calm_records, 1);
        assert_eq!(stats.first.as_deref(), Some("21/01/01 hr 01"));
        assert_eq!(stats.last.as_deref(), Some("21/01/01 hr 02"));

        let ws = stats.columns.iter().find(|c| c.name == "ws").unwrap();
        assert_eq!(ws.present, 2);
        assert_eq!(ws.missing, 1);
        assert!((ws.mean - 3.0).abs() < 1e-9);
        assert!((ws.missing_percentage() - 100.0 / 3.0).abs() < 1e-9);

        let sigma = stats.columns.iter().find(|c| c.name == "sigma_a").unwrap();
        assert_eq!(sigma.present, 0);
        assert!(stats.detailed_summary().contains("(all missing)"));
    }
}
