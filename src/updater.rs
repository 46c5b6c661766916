//! Rewriting an existing archive with new entries.
//!
//! The old archive is streamed entry by entry into the new one. Entries with
//! a replacement are rewritten from disk, the rest are raw-copied so their
//! compression method, timestamps and checksums survive unchanged. Module
//! descriptors are collected and written last, after extension.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Seek, Write};
use zip::ZipArchive;

use crate::builder;
use crate::config::{BuildOptions, ToolConfig};
use crate::error::{IoContext, Result};
use crate::expand::{self, Entry, Expansion};
use crate::manifest::Manifest;
use crate::names::{self, INDEX_NAME, MANIFEST_DIR, MANIFEST_NAME};
use crate::validator::{self, Diagnostic};
use crate::writer::{EntryWriter, WriteOptions};

/// New entries still waiting to replace an old entry of the same name, in
/// collection order.
#[derive(Debug, Default)]
pub struct PendingReplacements {
    entries: Vec<Option<Entry>>,
    by_name: HashMap<String, usize>,
}

impl PendingReplacements {
    /// Manifest names only count as replacements under `-M`.
    pub fn new(expansion: &Expansion, no_manifest: bool) -> Self {
        let mut pending = Self::default();
        for entry in &expansion.entries {
            let is_manifest = entry.name == MANIFEST_DIR || entry.name == MANIFEST_NAME;
            if is_manifest && !no_manifest {
                continue;
            }
            if pending.by_name.contains_key(&entry.name) {
                continue;
            }
            pending.by_name.insert(entry.name.clone(), pending.entries.len());
            pending.entries.push(Some(entry.clone()));
        }
        pending
    }

    pub fn take(&mut self, name: &str) -> Option<Entry> {
        let index = self.by_name.remove(name)?;
        self.entries[index].take()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries never matched against an old name.
    pub fn remaining(self) -> impl Iterator<Item = Entry> {
        self.entries.into_iter().flatten()
    }
}

/// Inputs of one update besides the old archive.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRequest<'a> {
    pub expansion: &'a Expansion,
    /// Parsed `--manifest` file, merged over the old manifest.
    pub manifest: Option<&'a Manifest>,
    /// Fresh `INDEX.LIST` content, written first; any old index is dropped.
    pub index: Option<&'a [u8]>,
}

/// What the pass over the old archive collected.
struct MergeState {
    pending: PendingReplacements,
    found_manifest: bool,
    file_names: HashSet<String>,
    module_infos: BTreeMap<String, Vec<u8>>,
}

fn read_all<R: Read>(mut reader: R, name: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).at_path(name)?;
    Ok(bytes)
}

/// Merges the new manifest and the overrides into `old` (or a fresh
/// manifest) and adds the mandatory attributes. `--main-class` replaces
/// whatever `Main-Class` the old manifest had.
fn updated_manifest(
    old: Option<Manifest>,
    request: &UpdateRequest<'_>,
    options: &BuildOptions,
    config: &ToolConfig,
) -> Manifest {
    let mut manifest = old.unwrap_or_default();
    if let Some(new) = request.manifest {
        manifest.merge(new);
    }
    manifest.ensure_defaults(&config.created_by);
    builder::apply_overrides(&mut manifest, options, request.expansion.is_multi_release());
    manifest
}

fn merge_old_entries<R: Read + Seek, W: Write + Seek>(
    old: &mut ZipArchive<R>,
    writer: &mut EntryWriter<W>,
    request: &UpdateRequest<'_>,
    mut pending: PendingReplacements,
    options: &BuildOptions,
    config: &ToolConfig,
) -> Result<MergeState> {
    let rewrite_manifest = request.manifest.is_some()
        || options.main_class.is_some()
        || request.expansion.is_multi_release();

    let mut found_manifest = false;
    let mut file_names = HashSet::new();
    let mut module_infos = request.expansion.module_infos.clone();

    for i in 0..old.len() {
        let name = old.by_index_raw(i)?.name().to_string();

        if request.index.is_some() && names::is_index_entry(&name) {
            log::info!("ignoring entry {name}");
            continue;
        }

        if names::is_manifest_entry(&name) {
            if options.no_manifest {
                log::info!("ignoring entry {name}");
                continue;
            }
            found_manifest = true;
            if rewrite_manifest {
                let bytes = read_all(old.by_index(i)?, &name)?;
                let old_manifest = Manifest::parse(&bytes)?;
                let manifest = updated_manifest(Some(old_manifest), request, options, config);
                writer.update_manifest(&manifest)?;
            } else {
                writer.raw_copy(old.by_index_raw(i)?)?;
            }
            continue;
        }

        if names::is_module_info_entry(&name) {
            if !module_infos.contains_key(&name) {
                let bytes = read_all(old.by_index(i)?, &name)?;
                module_infos.insert(name, bytes);
            }
            continue;
        }

        if !name.ends_with('/') {
            file_names.insert(name.clone());
        }
        match pending.take(&name) {
            Some(entry) => {
                writer.add_file(&entry)?;
            }
            None => writer.raw_copy(old.by_index_raw(i)?)?,
        }
    }

    Ok(MergeState {
        pending,
        found_manifest,
        file_names,
        module_infos,
    })
}

/// Streams `old` into `out` with the replacements, additions, manifest
/// changes and extended module descriptors of `request`. Returns the
/// descriptor diagnostics; when any is an error the output is incomplete
/// and must be discarded.
pub fn update<R: Read + Seek, W: Write + Seek>(
    old: &mut ZipArchive<R>,
    out: &mut W,
    request: &UpdateRequest<'_>,
    options: &BuildOptions,
    config: &ToolConfig,
    self_name: Option<String>,
) -> Result<Vec<Diagnostic>> {
    builder::check_main_class(request.manifest, options)?;
    let mut writer = EntryWriter::new(
        out,
        WriteOptions {
            store_only: options.store_only,
            no_manifest: options.no_manifest,
            self_name,
        },
    );
    if let Some(index) = request.index {
        writer.write_bytes(INDEX_NAME, index, crate::writer::now())?;
        log::info!("added index");
    }

    let pending = PendingReplacements::new(request.expansion, options.no_manifest);
    let mut state = merge_old_entries(old, &mut writer, request, pending, options, config)?;

    for entry in state.pending.remaining() {
        if writer.add_file(&entry)? && !entry.is_dir {
            state.file_names.insert(entry.name.clone());
        }
    }

    let synthesize = request.manifest.is_some() || options.main_class.is_some();
    if !state.found_manifest && !options.no_manifest && synthesize {
        let manifest = updated_manifest(None, request, options, config);
        writer.update_manifest(&manifest)?;
    }

    builder::check_module_options(options, !state.module_infos.is_empty())?;
    let packages = expand::packages_of(state.file_names.iter().map(String::as_str));
    let mut diagnostics = builder::extend_module_infos(
        &mut state.module_infos,
        &packages,
        options.main_class.as_deref(),
        options,
        config,
    )?;

    let mut entry_names = state.file_names;
    entry_names.extend(state.module_infos.keys().cloned());
    diagnostics.extend(builder::check_root_module_info(&state.module_infos, &entry_names));
    if validator::has_errors(&diagnostics) {
        return Ok(diagnostics);
    }

    writer.write_module_infos(&state.module_infos)?;
    writer.finish()?;
    Ok(diagnostics)
}
