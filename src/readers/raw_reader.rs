use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::archive::inspector::{detect_file_format, RawFormat};
use crate::archive::TempFileManager;
use crate::error::{ProcessingError, Result};
use crate::readers::csv_grid::read_csv_grid;
use crate::readers::grid_table::GridTable;
use crate::readers::netcdf_grid::read_netcdf_grid;

/// Monthly members can themselves be zips (instant + accumulated files)
const MAX_NESTING: usize = 2;

/// Decode a committed raw archive (or a bare CSV / NetCDF file) into one
/// merged grid table.
pub fn read_raw_archive(path: &Path) -> Result<GridTable> {
    let tables = match detect_file_format(path)? {
        RawFormat::Zip => {
            let mut temp = TempFileManager::new()?;
            let archive = ZipArchive::new(BufReader::new(File::open(path)?))
                .map_err(|e| ProcessingError::format(path, e.to_string()))?;
            let mut tables = Vec::new();
            read_zip(archive, path, &mut temp, 0, &mut tables)?;
            tables
        }
        RawFormat::NetCdf => vec![read_netcdf_grid(path)?],
        RawFormat::Csv => vec![read_csv_grid(BufReader::new(File::open(path)?), path)?],
        RawFormat::Unknown => {
            return Err(ProcessingError::format(path, "unrecognised raw file format"))
        }
    };

    if tables.is_empty() {
        return Err(ProcessingError::format(path, "archive has no data members"));
    }

    let merged = GridTable::merge(tables, path);
    debug!(
        "Decoded {}: {} rows, {} variables, {} duplicate rows",
        path.display(),
        merged.rows.len(),
        merged.variables.len(),
        merged.duplicates
    );
    Ok(merged)
}

fn read_zip<R: Read + Seek>(
    mut archive: ZipArchive<R>,
    label: &Path,
    temp: &mut TempFileManager,
    depth: usize,
    tables: &mut Vec<GridTable>,
) -> Result<()> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect();
    names.sort();

    for name in names {
        let mut bytes = Vec::new();
        archive.by_name(&name)?.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            continue;
        }
        let member_label = PathBuf::from(format!("{}!{}", label.display(), name));
        read_member(&member_label, bytes, temp, depth, tables)?;
    }

    Ok(())
}

fn read_member(
    label: &Path,
    bytes: Vec<u8>,
    temp: &mut TempFileManager,
    depth: usize,
    tables: &mut Vec<GridTable>,
) -> Result<()> {
    match RawFormat::detect(&bytes) {
        RawFormat::Zip if depth < MAX_NESTING => {
            let archive = ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| ProcessingError::format(label, e.to_string()))?;
            read_zip(archive, label, temp, depth + 1, tables)
        }
        RawFormat::NetCdf => {
            let path = temp.write_member(&label.to_string_lossy(), &bytes)?;
            let mut table = read_netcdf_grid(&path).map_err(|e| relabel(e, label))?;
            table.source = label.to_path_buf();
            tables.push(table);
            Ok(())
        }
        RawFormat::Csv => {
            tables.push(read_csv_grid(Cursor::new(bytes), label)?);
            Ok(())
        }
        _ => Err(ProcessingError::format(label, "unrecognised archive member")),
    }
}

fn relabel(err: ProcessingError, label: &Path) -> ProcessingError {
    match err {
        ProcessingError::Format { message, .. } => ProcessingError::format(label, message),
        other => other,
    }
}
