//! Writing a new archive from expanded inputs.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{Seek, Write};

use crate::config::{BuildOptions, ToolConfig};
use crate::error::{IoContext, JarError, Result};
use crate::expand::Expansion;
use crate::hashes::Hasher;
use crate::manifest::Manifest;
use crate::module_info::{self, ModuleDescriptor, ModuleExtension};
use crate::names::MODULE_INFO;
use crate::validator::{self, Diagnostic, DiagnosticKind};
use crate::writer::{EntryWriter, WriteOptions};

/// Manifest for a new archive: the `--manifest` file or an empty one, with
/// the mandatory attributes and any `--main-class` or multi-release marker.
/// `None` under `-M`.
pub fn prepare_manifest(
    options: &BuildOptions,
    config: &ToolConfig,
    multi_release: bool,
) -> Result<Option<Manifest>> {
    if options.no_manifest {
        return Ok(None);
    }
    let mut manifest = match &options.manifest_file {
        Some(path) => Manifest::parse(&fs::read(path).at_path(path)?)?,
        None => Manifest::new(),
    };
    check_main_class(Some(&manifest), options)?;
    manifest.ensure_defaults(&config.created_by);
    apply_overrides(&mut manifest, options, multi_release);
    Ok(Some(manifest))
}

/// `--main-class` clashes only with a `Main-Class` in the manifest file
/// given on the command line.
pub(crate) fn check_main_class(given: Option<&Manifest>, options: &BuildOptions) -> Result<()> {
    let given_main = given.and_then(Manifest::main_class);
    if options.main_class.is_some() && given_main.is_some() {
        return Err(JarError::AmbiguousMainClass);
    }
    Ok(())
}

/// Applies `--main-class` and the multi-release marker.
pub(crate) fn apply_overrides(manifest: &mut Manifest, options: &BuildOptions, multi_release: bool) {
    if let Some(main) = &options.main_class {
        manifest.set_main_class(main);
    }
    if multi_release {
        manifest.set_multi_release();
    }
}

/// Module-only options are meaningless without a descriptor to carry them.
pub fn check_module_options(options: &BuildOptions, has_descriptor: bool) -> Result<()> {
    if options.has_module_options() && !has_descriptor {
        return Err(JarError::Configuration(
            "--module-version or --hash-modules given without a module-info.class".to_string(),
        ));
    }
    if let Some(version) = &options.module_version {
        module_info::check_version(version)?;
    }
    Ok(())
}

/// Extends every collected descriptor in place with the package set, main
/// class, version, resolution flags and recorded hashes. The root
/// descriptor (or the first versioned one) names the module being hashed.
pub(crate) fn extend_module_infos(
    infos: &mut BTreeMap<String, Vec<u8>>,
    packages: &BTreeSet<String>,
    main_class: Option<&str>,
    options: &BuildOptions,
    config: &ToolConfig,
) -> Result<Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    if infos.is_empty() {
        return Ok(diagnostics);
    }

    let extension = ModuleExtension {
        packages: packages.clone(),
        main_class: main_class.map(str::to_string),
        version: options.module_version.clone(),
        resolution: options.resolution,
    };

    let mut hashes = None;
    if let Some(pattern) = &options.hash_modules {
        let first = infos
            .get(MODULE_INFO)
            .or_else(|| infos.values().next())
            .map(|bytes| ModuleDescriptor::read(bytes))
            .transpose()?;
        if let Some(built) = first {
            let hasher = Hasher::new(config, &options.module_path, &built, pattern)?;
            hashes = hasher.compute_hashes(&built.name)?;
            if hashes.is_none() {
                let message = format!("no module is recorded in hash in {}", built.name);
                log::warn!("{message}");
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::NoModuleHashed,
                    MODULE_INFO,
                    message,
                ));
            }
        }
    }

    for (name, bytes) in infos.iter_mut() {
        *bytes = module_info::extend(bytes, &extension, hashes.as_ref()).map_err(|e| {
            JarError::InvalidModuleDescriptor(format!("{name}: {e}"))
        })?;
    }
    Ok(diagnostics)
}

/// Runs the root descriptor sanity check against the final entry names.
pub(crate) fn check_root_module_info(
    infos: &BTreeMap<String, Vec<u8>>,
    entry_names: &HashSet<String>,
) -> Vec<Diagnostic> {
    match infos.get(MODULE_INFO) {
        Some(bytes) => module_info::check_module_info(bytes, entry_names),
        None => Vec::new(),
    }
}

/// Writes a new archive into `out`: manifest, module descriptors, then the
/// remaining entries in collection order. Nothing is written when the
/// descriptors fail their checks; the diagnostics say why.
pub fn build<W: Write + Seek>(
    out: &mut W,
    expansion: &Expansion,
    manifest: Option<&Manifest>,
    options: &BuildOptions,
    config: &ToolConfig,
    self_name: Option<String>,
) -> Result<Vec<Diagnostic>> {
    check_module_options(options, !expansion.module_infos.is_empty())?;

    let mut infos = expansion.module_infos.clone();
    let mut diagnostics = extend_module_infos(
        &mut infos,
        &expansion.packages(),
        options.main_class.as_deref(),
        options,
        config,
    )?;

    let mut entry_names = expansion.file_names();
    entry_names.extend(infos.keys().cloned());
    diagnostics.extend(check_root_module_info(&infos, &entry_names));
    if validator::has_errors(&diagnostics) {
        return Ok(diagnostics);
    }

    let mut writer = EntryWriter::new(
        out,
        WriteOptions {
            store_only: options.store_only,
            no_manifest: options.no_manifest,
            self_name,
        },
    );
    if let Some(manifest) = manifest {
        writer.write_manifest(manifest)?;
    }
    writer.write_module_infos(&infos)?;
    for entry in &expansion.entries {
        writer.add_file(entry)?;
    }
    writer.finish()?;
    Ok(diagnostics)
}
