//! On-disk raw datasets: one zip archive per unit plus the manifest that
//! marks it complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive::inspector::detect_file_format;
use crate::error::{ProcessingError, Result};
use crate::models::RetrievalUnit;
use crate::utils::atomic::{remove_if_exists, write_json_atomic};
use crate::utils::constants::DEFAULT_BUFFER_SIZE;
use crate::utils::filename::DataLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawStatus {
    Pending,
    Fetched,
    Failed,
}

/// Manifest of a committed raw archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub signature: String,
    pub station: String,
    pub year: i32,
    pub kind: String,
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the archive bytes
    pub checksum: String,
    pub status: RawStatus,
    pub members: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct RawStore {
    layout: DataLayout,
}

impl RawStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// The unit's dataset if it exists: manifest present and fetched,
    /// signature matching, archive checksum matching.
    pub fn lookup(&self, unit: &RetrievalUnit) -> Option<RawDataset> {
        let manifest_path = self.layout.raw_manifest(unit);
        let text = fs::read_to_string(&manifest_path).ok()?;
        let dataset: RawDataset = match serde_json::from_str(&text) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", manifest_path.display(), e);
                return None;
            }
        };

        if dataset.signature != unit.signature || dataset.status != RawStatus::Fetched {
            debug!("{}: manifest does not match the current request", unit);
            return None;
        }

        match sha256_file(&self.layout.raw_archive(unit)) {
            Ok(checksum) if checksum == dataset.checksum => Some(dataset),
            Ok(_) => {
                warn!("{}: raw archive checksum mismatch", unit);
                None
            }
            Err(_) => None,
        }
    }

    /// True when anything of the unit's raw data is on disk, complete or not
    pub fn has_any(&self, unit: &RetrievalUnit) -> bool {
        self.layout.raw_manifest(unit).exists()
            || self.layout.raw_archive(unit).exists()
            || self.layout.raw_partial_dir(unit).exists()
    }

    /// Remove the manifest, then the archive, then any staged months.
    pub fn delete(&self, unit: &RetrievalUnit) -> Result<bool> {
        let manifest = remove_if_exists(&self.layout.raw_manifest(unit))?;
        let archive = remove_if_exists(&self.layout.raw_archive(unit))?;
        self.discard(unit)?;
        Ok(manifest || archive)
    }

    /// Fresh, empty staging directory for the unit's monthly files
    pub fn begin(&self, unit: &RetrievalUnit) -> Result<PathBuf> {
        let partial = self.layout.raw_partial_dir(unit);
        self.discard(unit)?;
        fs::create_dir_all(&partial)?;
        Ok(partial)
    }

    pub fn discard(&self, unit: &RetrievalUnit) -> Result<()> {
        let partial = self.layout.raw_partial_dir(unit);
        match fs::remove_dir_all(&partial) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Pack the staged monthly files into the unit's archive and write the
    /// manifest. Members are stored as `{stem}.{format extension}` in the
    /// order given, with a fixed timestamp so identical inputs give
    /// identical archives.
    pub fn commit(&self, unit: &RetrievalUnit, staged: &[(String, PathBuf)]) -> Result<RawDataset> {
        let archive_path = self.layout.raw_archive(unit);
        let dir = archive_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        let mut members = Vec::with_capacity(staged.len());
        {
            let mut writer = ZipWriter::new(temp.as_file_mut());
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(zip::DateTime::default());

            for (stem, file) in staged {
                let name = format!("{}.{}", stem, detect_file_format(file)?.extension());
                writer.start_file(name.as_str(), options)?;
                let mut reader = BufReader::new(File::open(file)?);
                std::io::copy(&mut reader, &mut writer)?;
                members.push(name);
            }
            writer.finish()?;
        }
        temp.as_file_mut().flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&archive_path)
            .map_err(|e| ProcessingError::Io(e.error))?;

        let dataset = RawDataset {
            signature: unit.signature.clone(),
            station: unit.station_id().to_string(),
            year: unit.year,
            kind: unit.kind.to_string(),
            size: fs::metadata(&archive_path)?.len(),
            checksum: sha256_file(&archive_path)?,
            path: archive_path,
            status: RawStatus::Fetched,
            members,
            fetched_at: Utc::now(),
        };
        write_json_atomic(&self.layout.raw_manifest(unit), &dataset)?;
        self.discard(unit)?;

        debug!(
            "Committed {} ({} members, {} bytes)",
            dataset.path.display(),
            dataset.members.len(),
            dataset.size
        );
        Ok(dataset)
    }
}
