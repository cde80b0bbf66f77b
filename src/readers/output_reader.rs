use std::path::Path;

use crate::error::{ProcessingError, Result};
use crate::writers::columns::{FieldValue, LineLayout};
use crate::writers::igra_writer::{igra_header_layout, igra_level_layout};
use crate::writers::pfl_writer::pfl_layout;
use crate::writers::sfc_writer::sfc_layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Sfc,
    Pfl,
    Igra,
}

impl OutputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "sfc" => Some(OutputKind::Sfc),
            "pfl" => Some(OutputKind::Pfl),
            "igra" | "txt" => Some(OutputKind::Igra),
            _ => None,
        }
    }

    /// Layout of the data lines
    pub fn layout(&self) -> LineLayout {
        match self {
            OutputKind::Sfc => sfc_layout(),
            OutputKind::Pfl => pfl_layout(),
            OutputKind::Igra => igra_level_layout(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputKind::Sfc => "SFC",
            OutputKind::Pfl => "PFL",
            OutputKind::Igra => "IGRA",
        }
    }
}

/// An output file decoded back through its column layouts
#[derive(Debug, Clone)]
pub struct DecodedOutput {
    pub kind: OutputKind,
    /// SFC header line
    pub header: Option<String>,
    /// IGRA sounding headers, in file order
    pub sounding_headers: Vec<Vec<FieldValue>>,
    pub records: Vec<Vec<FieldValue>>,
}

impl DecodedOutput {
    pub fn decode(kind: OutputKind, text: &str, source: &Path) -> Result<Self> {
        let layout = kind.layout();
        let header_layout = igra_header_layout();
        let line_error =
            |n: usize, e: ProcessingError| ProcessingError::format(source, format!("line {}: {}", n + 1, e));

        let mut decoded = DecodedOutput {
            kind,
            header: None,
            sounding_headers: Vec::new(),
            records: Vec::new(),
        };

        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match kind {
                OutputKind::Sfc if n == 0 => decoded.header = Some(line.to_string()),
                OutputKind::Igra if line.starts_with('#') => decoded
                    .sounding_headers
                    .push(header_layout.decode(line).map_err(|e| line_error(n, e))?),
                _ => decoded
                    .records
                    .push(layout.decode(line).map_err(|e| line_error(n, e))?),
            }
        }

        Ok(decoded)
    }

    /// Column of `name` across all data records
    pub fn column(&self, name: &str) -> Vec<&FieldValue> {
        match self.kind.layout().index_of(name) {
            Some(idx) => self.records.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }
}

pub fn read_output(path: &Path) -> Result<DecodedOutput> {
    let kind = OutputKind::from_path(path).ok_or_else(|| {
        ProcessingError::format(path, "expected a .SFC, .PFL or .igra file")
    })?;
    let text = std::fs::read_to_string(path)?;
    DecodedOutput::decode(kind, &text, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(OutputKind::from_path(Path::new("p/2021.SFC")), Some(OutputKind::Sfc));
        assert_eq!(OutputKind::from_path(Path::new("p/2021.pfl")), Some(OutputKind::Pfl));
        assert_eq!(
            OutputKind::from_path(Path::new("i/2021_upperair.igra")),
            Some(OutputKind::Igra)
        );
        assert_eq!(OutputKind::from_path(Path::new("p/2021.csv")), None);
    }

    #[test]
    fn test_decode_profile_text() {
        let text = "\
21  1  1  1   100.0 0   200.0    3.00     5.0   99.0   99.00
21  1  1  1   760.0 1   999.0    0.20     5.0   99.0   99.00
";
        let decoded = DecodedOutput::decode(OutputKind::Pfl, text, Path::new("a.PFL")).unwrap();
        assert_eq!(decoded.records.len(), 2);
        let wd = decoded.column("wd");
        assert_eq!(wd[1].as_f64(), Some(999.0));
        let sigma = decoded.column("sigma_a");
        assert_eq!(sigma[0].as_f64(), None);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let text = "21  1  1  1   abc.0 0   200.0    3.00     5.0   99.0   99.00\n";
        let err = DecodedOutput::decode(OutputKind::Pfl, text, Path::new("a.PFL")).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
