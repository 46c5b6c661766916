//! Whole-archive operations.
//!
//! Create and update write to a temp file next to the target and rename it
//! over the target only when everything succeeded. Multi-release results are
//! validated before the rename; an invalid result leaves the target alone.

use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::builder;
use crate::config::{BuildOptions, ToolConfig};
use crate::error::{IoContext, JarError, Result};
use crate::expand::{Expansion, InputSet};
use crate::fingerprint::Sha256Digester;
use crate::index;
use crate::manifest::Manifest;
use crate::probe;
use crate::updater::{self, UpdateRequest};
use crate::validator::{self, Diagnostic, ValidationReport};
use crate::writer;

/// Result of a create, update or index run.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub ok: bool,
    pub archive: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    fn new(jar: &Path, ok: bool, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            ok,
            archive: jar.to_string_lossy().to_string(),
            diagnostics,
        }
    }
}

fn temp_file_for(jar: &Path) -> Result<NamedTempFile> {
    let dir = match jar.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tempfile::Builder::new()
        .prefix(".mrjar")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .at_path(dir)
}

/// Runs `write` into a temp file, validates the result when it is a
/// multi-release archive and moves it over `jar` if nothing went wrong.
fn write_atomically<F>(
    jar: &Path,
    multi_release: bool,
    config: &ToolConfig,
    write: F,
) -> Result<Outcome>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<Vec<Diagnostic>>,
{
    let mut temp = temp_file_for(jar)?;
    let temp_path = temp.path().to_path_buf();

    let mut diagnostics = {
        let mut out = BufWriter::new(temp.as_file_mut());
        let diagnostics = write(&mut out)?;
        out.flush().at_path(&temp_path)?;
        diagnostics
    };
    if validator::has_errors(&diagnostics) {
        return Ok(Outcome::new(jar, false, diagnostics));
    }

    if multi_release {
        let report = validator::validate_archive(&temp_path, config, &Sha256Digester)?;
        diagnostics.extend(report.diagnostics);
        if !report.valid {
            log::error!("invalid multi-release archive, {} left unchanged", jar.display());
            return Ok(Outcome::new(jar, false, diagnostics));
        }
    }

    temp.persist(jar).map_err(|e| JarError::io(jar, e.error))?;
    Ok(Outcome::new(jar, true, diagnostics))
}

/// Creates `jar` from `sets`.
pub fn create_jar(
    jar: &Path,
    sets: &[InputSet],
    options: &BuildOptions,
    config: &ToolConfig,
) -> Result<Outcome> {
    let expansion = Expansion::expand(sets, options.preserve_paths)?;
    let multi_release = expansion.is_multi_release();
    let manifest = builder::prepare_manifest(options, config, multi_release)?;
    let self_name = writer::self_entry_name(jar, options.preserve_paths);

    let outcome = write_atomically(jar, multi_release, config, |out| {
        builder::build(out, &expansion, manifest.as_ref(), options, config, Some(self_name))
    })?;
    if outcome.ok {
        log::info!("created {}", jar.display());
    }
    Ok(outcome)
}

/// Updates `jar` in place with `sets`, an optional index and the manifest
/// and module options.
fn update_with(
    jar: &Path,
    expansion: &Expansion,
    index: Option<&[u8]>,
    options: &BuildOptions,
    config: &ToolConfig,
) -> Result<Outcome> {
    if !jar.is_file() {
        return Err(JarError::NoSuchFile(jar.to_path_buf()));
    }
    let manifest = match &options.manifest_file {
        Some(path) => Some(Manifest::parse(&fs::read(path).at_path(path)?)?),
        None => None,
    };
    let request = UpdateRequest {
        expansion,
        manifest: manifest.as_ref(),
        index,
    };
    let self_name = writer::self_entry_name(jar, options.preserve_paths);

    let mut old = probe::open_archive(jar)?;
    let multi_release = expansion.is_multi_release() || {
        probe::ordered_entry_names(&mut old)?
            .iter()
            .any(|n| n.starts_with(crate::names::VERSIONS_DIR))
    };

    let outcome = write_atomically(jar, multi_release, config, |out| {
        updater::update(&mut old, out, &request, options, config, Some(self_name))
    })?;
    if outcome.ok {
        log::info!("updated {}", jar.display());
    }
    Ok(outcome)
}

pub fn update_jar(
    jar: &Path,
    sets: &[InputSet],
    options: &BuildOptions,
    config: &ToolConfig,
) -> Result<Outcome> {
    let expansion = Expansion::expand(sets, options.preserve_paths)?;
    update_with(jar, &expansion, None, options, config)
}

/// Writes a fresh `META-INF/INDEX.LIST` into `jar`.
pub fn generate_index(jar: &Path, extra: &[PathBuf], config: &ToolConfig) -> Result<Outcome> {
    let text = index::generate(jar, extra)?;
    update_with(
        jar,
        &Expansion::default(),
        Some(text.as_bytes()),
        &BuildOptions::default(),
        config,
    )
}

pub fn validate_jar(jar: &Path, config: &ToolConfig) -> Result<ValidationReport> {
    validator::validate_archive(jar, config, &Sha256Digester)
}
