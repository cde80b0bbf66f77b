use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory for archive members that must be decoded from a real
/// file path (NetCDF). Removed when dropped.
pub struct TempFileManager {
    temp_dir: TempDir,
    extracted_files: HashMap<String, PathBuf>,
}

impl TempFileManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            extracted_files: HashMap::new(),
        })
    }

    pub fn temp_dir_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write member bytes under a flattened copy of its name
    pub fn write_member(&mut self, member_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if let Some(path) = self.extracted_files.get(member_name) {
            return Ok(path.clone());
        }

        let flat: String = member_name
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '!' { '_' } else { c })
            .collect();
        let dest_path = self
            .temp_dir
            .path()
            .join(format!("{:03}_{}", self.extracted_files.len(), flat));

        let mut writer = BufWriter::new(File::create(&dest_path)?);
        writer.write_all(bytes)?;
        writer.flush()?;

        self.extracted_files
            .insert(member_name.to_string(), dest_path.clone());
        Ok(dest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_member_once() -> Result<()> {
        let mut manager = TempFileManager::new()?;
        assert!(manager.temp_dir_path().exists());

        let first = manager.write_member("raw.zip!era5_2021_01.nc", b"CDF\x01")?;
        let second = manager.write_member("raw.zip!era5_2021_01.nc", b"ignored")?;
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&first)?, b"CDF\x01");
        assert!(first.starts_with(manager.temp_dir_path()));

        let other = manager.write_member("raw.zip!era5_2021_02.nc", b"CDF\x02")?;
        assert_ne!(first, other);
        assert_eq!(std::fs::read_dir(manager.temp_dir_path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn test_cleanup_on_drop() -> Result<()> {
        let dir = {
            let manager = TempFileManager::new()?;
            manager.temp_dir_path().to_path_buf()
        };
        assert!(!dir.exists());
        Ok(())
    }
}
