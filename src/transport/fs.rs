use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::io::SHARD_EXTENSIONS;
use crate::errors::CorpusError;

/// Expand a declared source path into the files to read, in read order.
///
/// A file resolves to itself. A directory resolves to every shard file beneath
/// it (see [`is_shard_file`]), sorted by path so runs see the same order.
pub fn resolve_source_files(path: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::InputMissing {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|candidate| is_shard_file(candidate))
        .collect();
    files.sort();
    Ok(files)
}

/// True if the path has a line-delimited record extension (case-insensitive).
pub fn is_shard_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SHARD_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Open an existing file for buffered reading; a missing file is `InputMissing`.
pub fn open_reader(path: &Path) -> Result<BufReader<File>, CorpusError> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(CorpusError::InputMissing {
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Create (truncating) a buffered writer, creating parent directories first.
pub fn create_writer(path: &Path) -> Result<BufWriter<File>, CorpusError> {
    ensure_parent_dir(path).map_err(|err| CorpusError::write(path, err))?;
    let file = File::create(path).map_err(|err| CorpusError::write(path, err))?;
    Ok(BufWriter::new(file))
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
