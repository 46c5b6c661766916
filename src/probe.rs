use chrono::NaiveDate;
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::{CompressionMethod, DateTime, ZipArchive};

use crate::error::{IoContext, Result};

pub type JarArchive = ZipArchive<Cursor<Mmap>>;

pub fn open_archive(jar_path: &Path) -> Result<JarArchive> {
    let file = File::open(jar_path).at_path(jar_path)?;
    // SAFETY: the mapping is read-only and lives no longer than the archive
    let mmap = unsafe { Mmap::map(&file).at_path(jar_path)? };
    Ok(ZipArchive::new(Cursor::new(mmap))?)
}

/// Reads one entry, `None` when the archive has no such name.
pub fn read_entry(archive: &mut JarArchive, name: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).at_path(name)?;
    Ok(Some(bytes))
}

/// Entry names in archive order.
pub fn ordered_entry_names(archive: &mut JarArchive) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index_raw(i)?.name().to_string());
    }
    Ok(names)
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub method: String,
    pub crc32: u32,
    pub modified: String,
    pub is_dir: bool,
}

/// Lists entries in archive order, keeping only names that start with one of
/// `prefixes` when any are given.
pub fn list_entries(jar_path: &Path, prefixes: &[String]) -> Result<Vec<EntryInfo>> {
    let mut archive = open_archive(jar_path)?;
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        let name = entry.name();
        if !prefixes.is_empty() && !prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }
        out.push(EntryInfo {
            name: name.to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            method: method_name(entry.compression()).to_string(),
            crc32: entry.crc32(),
            modified: format_time(entry.last_modified()),
            is_dir: entry.is_dir(),
        });
    }
    Ok(out)
}

fn method_name(method: CompressionMethod) -> &'static str {
    match method {
        CompressionMethod::Stored => "stored",
        CompressionMethod::Deflated => "deflated",
        _ => "other",
    }
}

/// `Thu Oct 16 12:00:00 2026`, the layout of a verbose listing.
pub fn format_time(time: DateTime) -> String {
    NaiveDate::from_ymd_opt(time.year() as i32, time.month() as u32, time.day() as u32)
        .and_then(|d| d.and_hms_opt(time.hour() as u32, time.minute() as u32, time.second() as u32))
        .map(|t| t.format("%a %b %d %H:%M:%S %Y").to_string())
        .unwrap_or_default()
}
