use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";
const CDF_MAGIC: &[u8] = b"CDF";

/// Container format of a downloaded file or archive member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    Zip,
    NetCdf,
    Csv,
    Unknown,
}

impl RawFormat {
    /// Sniff the format from the leading bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            RawFormat::Zip
        } else if bytes.starts_with(HDF5_MAGIC)
            || (bytes.starts_with(CDF_MAGIC) && matches!(bytes.get(3), Some(1 | 2 | 5)))
        {
            RawFormat::NetCdf
        } else if !bytes.is_empty()
            && bytes
                .iter()
                .take(512)
                .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        {
            RawFormat::Csv
        } else {
            RawFormat::Unknown
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RawFormat::Zip => "zip",
            RawFormat::NetCdf => "nc",
            RawFormat::Csv => "csv",
            RawFormat::Unknown => "bin",
        }
    }
}

impl std::fmt::Display for RawFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

pub fn detect_file_format(path: &Path) -> Result<RawFormat> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;
    Ok(RawFormat::detect(&head))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub format: RawFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub format: RawFormat,
    pub members: Vec<MemberInfo>,
    pub total_size: u64,
}

impl ArchiveSummary {
    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Raw archive: {}\n  Format: {}\n  Members: {}\n  Uncompressed size: {} bytes\n",
            self.path.display(),
            self.format,
            self.members.len(),
            self.total_size
        );
        for member in &self.members {
            summary.push_str(&format!(
                "    {:<32} {:>6} {:>12} bytes\n",
                member.name, member.format, member.size
            ));
        }
        summary
    }

    pub fn count_format(&self, format: RawFormat) -> usize {
        self.members.iter().filter(|m| m.format == format).count()
    }
}

pub struct ArchiveInspector;

impl ArchiveInspector {
    /// Describe a committed raw archive without decoding its data
    pub fn inspect(path: &Path) -> Result<ArchiveSummary> {
        let format = detect_file_format(path)?;
        if format != RawFormat::Zip {
            let size = std::fs::metadata(path)?.len();
            return Ok(ArchiveSummary {
                path: path.to_path_buf(),
                format,
                members: Vec::new(),
                total_size: size,
            });
        }

        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut members = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let (size, compressed_size) = (entry.size(), entry.compressed_size());
            let mut head = Vec::with_capacity(512);
            (&mut entry).take(512).read_to_end(&mut head)?;

            members.push(MemberInfo {
                name,
                size,
                compressed_size,
                format: RawFormat::detect(&head),
            });
        }

        members.sort_by(|a, b| a.name.cmp(&b.name));
        let total_size = members.iter().map(|m| m.size).sum();

        Ok(ArchiveSummary {
            path: path.to_path_buf(),
            format,
            members,
            total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zip::{write::FileOptions, CompressionMethod, ZipWriter};

    #[test]
    fn test_detect_magic_bytes() {
        assert_eq!(RawFormat::detect(b"PK\x03\x04rest"), RawFormat::Zip);
        assert_eq!(RawFormat::detect(b"CDF\x01\x00\x00"), RawFormat::NetCdf);
        assert_eq!(RawFormat::detect(b"CDF\x02"), RawFormat::NetCdf);
        assert_eq!(RawFormat::detect(b"\x89HDF\r\n\x1a\n\x00"), RawFormat::NetCdf);
        assert_eq!(RawFormat::detect(b"valid_time,latitude\n"), RawFormat::Csv);
        assert_eq!(RawFormat::detect(b"\x00\x01\x02"), RawFormat::Unknown);
        assert_eq!(RawFormat::detect(b""), RawFormat::Unknown);
    }

    #[test]
    fn test_inspect_archive() -> Result<()> {
        let file = NamedTempFile::new()?;
        {
            let mut zip = ZipWriter::new(&file);
            let options = FileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("era5_surface_2021_02.csv", options)?;
            zip.write_all(b"valid_time,latitude,longitude,t2m\n")?;
            zip.start_file("era5_surface_2021_01.nc", options)?;
            zip.write_all(b"\x89HDF\r\n\x1a\n0000")?;
            zip.finish()?;
        }

        let summary = ArchiveInspector::inspect(file.path())?;
        assert_eq!(summary.format, RawFormat::Zip);
        assert_eq!(summary.members.len(), 2);
        assert_eq!(summary.members[0].name, "era5_surface_2021_01.nc");
        assert_eq!(summary.count_format(RawFormat::NetCdf), 1);
        assert_eq!(summary.count_format(RawFormat::Csv), 1);
        assert!(summary.display_summary().contains("Members: 2"));
        Ok(())
    }
}
