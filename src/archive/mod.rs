//! On-disk archive of compressed battle logs
//!
//! Logs are stored one file per replay at `{base}/{format}/{id}.log.gz`.
//! The path is derived from the replay id and format alone, so the archive
//! needs no index of its own.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const LOG_EXTENSION: &str = ".log.gz";

/// File count and size for one format directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatStats {
    pub files: u64,
    pub bytes: u64,
}

/// Totals over the whole archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub total_files: u64,
    pub total_bytes: u64,
    pub formats: BTreeMap<String, FormatStats>,
}

/// Gzip log store rooted at a directory
#[derive(Debug, Clone)]
pub struct LogArchive {
    base: PathBuf,
}

impl LogArchive {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the archived log for a replay
    pub fn log_path(&self, replay_id: &str, format_id: &str) -> PathBuf {
        self.base
            .join(format_id)
            .join(format!("{}{}", replay_id, LOG_EXTENSION))
    }

    /// Compresses and writes a log body
    ///
    /// # Returns
    ///
    /// The path written and the compressed size in bytes.
    pub fn save(
        &self,
        replay_id: &str,
        format_id: &str,
        content: &str,
    ) -> io::Result<(PathBuf, u64)> {
        let path = self.log_path(replay_id, format_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes())?;
        let compressed = encoder.finish()?;

        fs::write(&path, &compressed)?;
        Ok((path, compressed.len() as u64))
    }

    /// Reads and decompresses a log body
    ///
    /// A missing file is `Ok(None)`. A file that is not valid gzip or not
    /// UTF-8 is also treated as missing and logged.
    pub fn load(&self, replay_id: &str, format_id: &str) -> io::Result<Option<String>> {
        let path = self.log_path(replay_id, format_id);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut content = String::new();
        match GzDecoder::new(file).read_to_string(&mut content) {
            Ok(_) => Ok(Some(content)),
            Err(e) => {
                tracing::warn!("Unreadable archived log {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn exists(&self, replay_id: &str, format_id: &str) -> bool {
        self.log_path(replay_id, format_id).is_file()
    }

    /// Size of an archived log on disk, if present
    pub fn size(&self, replay_id: &str, format_id: &str) -> io::Result<Option<u64>> {
        match fs::metadata(self.log_path(replay_id, format_id)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Removes an archived log; returns whether a file was deleted
    pub fn delete(&self, replay_id: &str, format_id: &str) -> io::Result<bool> {
        match fs::remove_file(self.log_path(replay_id, format_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Walks the format directories and totals file counts and sizes
    pub fn stats(&self) -> io::Result<ArchiveStats> {
        let mut stats = ArchiveStats::default();

        let formats = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };

        for format_dir in formats {
            let format_dir = format_dir?;
            if !format_dir.file_type()?.is_dir() {
                continue;
            }

            let mut format_stats = FormatStats::default();
            for entry in fs::read_dir(format_dir.path())? {
                let entry = entry?;
                let is_log = entry
                    .file_name()
                    .to_str()
                    .map_or(false, |name| name.ends_with(LOG_EXTENSION));
                if !is_log {
                    continue;
                }
                format_stats.files += 1;
                format_stats.bytes += entry.metadata()?.len();
            }

            if format_stats.files > 0 {
                stats.total_files += format_stats.files;
                stats.total_bytes += format_stats.bytes;
                stats.formats.insert(
                    format_dir.file_name().to_string_lossy().into_owned(),
                    format_stats,
                );
            }
        }

        Ok(stats)
    }
}
