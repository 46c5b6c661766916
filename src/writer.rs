//! Entry emission over the zip codec.

use chrono::{Datelike, Local, Timelike};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Seek, Write};
use std::time::SystemTime;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

use crate::error::{IoContext, Result};
use crate::expand::Entry;
use crate::manifest::Manifest;
use crate::names::{self, MANIFEST_DIR, MANIFEST_NAME};
use crate::ordering;

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// `-0`: store every entry uncompressed.
    pub store_only: bool,
    /// `-M`: manifest names are ordinary entries.
    pub no_manifest: bool,
    /// Entry name of the archive being written, never added to itself.
    pub self_name: Option<String>,
}

pub struct EntryWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: WriteOptions,
}

impl<W: Write + Seek> EntryWriter<W> {
    pub fn new(inner: W, options: WriteOptions) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            options,
        }
    }

    fn file_options(&self, len: usize, time: DateTime) -> FileOptions {
        let method = if self.options.store_only || len == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        FileOptions::default()
            .compression_method(method)
            .last_modified_time(time)
            .large_file(len as u64 >= u32::MAX as u64)
    }

    pub fn write_bytes(&mut self, name: &str, bytes: &[u8], time: DateTime) -> Result<()> {
        let options = self.file_options(bytes.len(), time);
        self.zip.start_file(name, options)?;
        self.zip.write_all(bytes).at_path(name)?;
        Ok(())
    }

    fn write_dir(&mut self, name: &str, time: DateTime) -> Result<()> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(time);
        self.zip.add_directory(name, options)?;
        Ok(())
    }

    /// `META-INF/` followed by the manifest, as the first entries of a new archive.
    pub fn write_manifest(&mut self, manifest: &Manifest) -> Result<()> {
        let now = now();
        self.write_dir(MANIFEST_DIR, now)?;
        self.write_bytes(MANIFEST_NAME, &manifest.to_bytes(), now)?;
        log::info!("added manifest");
        Ok(())
    }

    /// Rewrites just the manifest entry while updating.
    pub fn update_manifest(&mut self, manifest: &Manifest) -> Result<()> {
        self.write_bytes(MANIFEST_NAME, &manifest.to_bytes(), now())?;
        log::info!("updated manifest");
        Ok(())
    }

    /// Module descriptors, root first then by release.
    pub fn write_module_infos(&mut self, infos: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let mut names: Vec<&String> = infos.keys().collect();
        ordering::sort_entry_names(&mut names)?;
        let now = now();
        for name in names {
            self.write_bytes(name, &infos[name], now)?;
            log::info!("added module-info: {name}");
        }
        Ok(())
    }

    /// Adds one expanded entry. Returns `false` when the entry is skipped:
    /// empty names, `.`, the archive itself, and the manifest names unless
    /// manifest handling is off.
    pub fn add_file(&mut self, entry: &Entry) -> Result<bool> {
        let name = entry.name.as_str();
        if name.is_empty() || name == "." || self.options.self_name.as_deref() == Some(name) {
            return Ok(false);
        }
        if (name == MANIFEST_DIR || name == MANIFEST_NAME) && !self.options.no_manifest {
            return Ok(false);
        }

        let metadata = fs::metadata(&entry.path).at_path(&entry.path)?;
        let time = metadata.modified().map(zip_time).unwrap_or_default();
        if entry.is_dir {
            self.write_dir(name, time)?;
            log::info!("adding: {name}");
            return Ok(true);
        }

        let bytes = fs::read(&entry.path).at_path(&entry.path)?;
        self.write_bytes(name, &bytes, time)?;
        log::info!("adding: {name}(in = {})", bytes.len());
        Ok(true)
    }

    /// Copies an entry of another archive without recompressing it.
    pub fn raw_copy(&mut self, entry: zip::read::ZipFile<'_>) -> Result<()> {
        self.zip.raw_copy_file(entry)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}

/// Current local time in zip precision.
pub fn now() -> DateTime {
    zip_time(SystemTime::now())
}

/// Converts to zip's MS-DOS time; anything before 1980 becomes the epoch of
/// that format.
pub fn zip_time(time: SystemTime) -> DateTime {
    let local: chrono::DateTime<Local> = time.into();
    if local.year() < 1980 {
        return DateTime::default();
    }
    DateTime::from_date_and_time(
        local.year() as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

/// Entry name the archive at `path` would get if it were added to itself.
pub fn self_entry_name(path: &std::path::Path, preserve: bool) -> String {
    names::to_entry_name(&path.to_string_lossy(), false, preserve)
}
