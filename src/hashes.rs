//! Module-path lookup, dependency resolution and the `ModuleHashes` record.
//!
//! Modules on the module path are modular jars, found directly or inside
//! directories. Resolution starts from every module whose name matches the
//! hash pattern and follows non-static `requires`; platform modules are
//! never resolved from the module path and are assumed present.

use regex_lite::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ToolConfig;
use crate::error::{IoContext, JarError, Result};
use crate::module_info::{ModuleDescriptor, ModuleHashes, RequiresFlags};
use crate::names::MODULE_INFO;
use crate::probe;

pub const HASH_ALGORITHM: &str = "SHA-256";

#[derive(Debug, Clone)]
pub struct ModuleRef {
    pub descriptor: ModuleDescriptor,
    /// `None` for the module being built.
    pub location: Option<PathBuf>,
}

/// Modules found on a module path, first occurrence of a name wins.
#[derive(Debug, Default)]
pub struct ModuleFinder {
    modules: BTreeMap<String, ModuleRef>,
}

impl ModuleFinder {
    pub fn scan(module_path: &[PathBuf]) -> Result<Self> {
        let mut finder = ModuleFinder::default();
        for entry in module_path {
            if !entry.exists() {
                return Err(JarError::NoSuchFile(entry.clone()));
            }
            if entry.is_dir() {
                let mut jars: Vec<PathBuf> = fs::read_dir(entry)
                    .at_path(entry)?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| is_jar(p))
                    .collect();
                jars.sort();
                for jar in jars {
                    finder.add_jar(&jar)?;
                }
            } else {
                finder.add_jar(entry)?;
            }
        }
        Ok(finder)
    }

    fn add_jar(&mut self, jar: &Path) -> Result<()> {
        let mut archive = probe::open_archive(jar)?;
        let Some(bytes) = probe::read_entry(&mut archive, MODULE_INFO)? else {
            log::info!("skipping {}: not a modular jar", jar.display());
            return Ok(());
        };
        let descriptor = ModuleDescriptor::read(&bytes)?;
        self.insert(ModuleRef {
            descriptor,
            location: Some(jar.to_path_buf()),
        });
        Ok(())
    }

    fn insert(&mut self, module: ModuleRef) {
        self.modules
            .entry(module.descriptor.name.clone())
            .or_insert(module);
    }

    pub fn find(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

/// Computes hashes for the module being built.
pub struct Hasher<'a> {
    config: &'a ToolConfig,
    finder: ModuleFinder,
    pattern: &'a Regex,
}

impl<'a> Hasher<'a> {
    /// The module being built is composed with the module path so that it
    /// is found under its own name; module path entries take precedence.
    pub fn new(
        config: &'a ToolConfig,
        module_path: &[PathBuf],
        built: &ModuleDescriptor,
        pattern: &'a Regex,
    ) -> Result<Self> {
        let mut finder = ModuleFinder::scan(module_path)?;
        finder.insert(ModuleRef {
            descriptor: built.clone(),
            location: None,
        });
        Ok(Self {
            config,
            finder,
            pattern,
        })
    }

    /// Resolves from the matching roots and returns the resolved module
    /// names with their direct (resolved) dependencies.
    fn resolve(&self) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let roots: Vec<&str> = self
            .finder
            .names()
            .filter(|n| self.pattern.is_match(n))
            .collect();

        let mut graph = BTreeMap::new();
        let mut queue: VecDeque<String> = roots.iter().map(|s| s.to_string()).collect();
        while let Some(name) = queue.pop_front() {
            if graph.contains_key(&name) {
                continue;
            }
            let Some(module) = self.finder.find(&name) else {
                return Err(JarError::ModuleResolution(format!("module {name} not found")));
            };
            let mut deps = BTreeSet::new();
            for requires in &module.descriptor.requires {
                if requires.flags.contains(RequiresFlags::STATIC_PHASE) {
                    continue;
                }
                if self.finder.find(&requires.name).is_none() {
                    if self.config.is_platform_module(&requires.name) {
                        continue;
                    }
                    return Err(JarError::ModuleResolution(format!(
                        "module {} not found, required by {name}",
                        requires.name
                    )));
                }
                deps.insert(requires.name.clone());
                queue.push_back(requires.name.clone());
            }
            graph.insert(name, deps);
        }
        Ok(graph)
    }

    /// Hashes of the matching modules that depend on `name`, directly or
    /// not. `None` when there are none.
    pub fn compute_hashes(&self, name: &str) -> Result<Option<ModuleHashes>> {
        let graph = self.resolve()?;

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (module, deps) in &graph {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(module.as_str());
            }
        }

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for &dependent in dependents.get(current).into_iter().flatten() {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        let mut hashes = BTreeMap::new();
        for module in seen {
            if module == name || !self.pattern.is_match(module) {
                continue;
            }
            if self.config.is_platform_module(module) {
                continue;
            }
            let Some(location) = self.finder.find(module).and_then(|m| m.location.as_ref())
            else {
                continue;
            };
            hashes.insert(module.to_string(), hash_file(location)?);
        }

        if hashes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ModuleHashes {
            algorithm: HASH_ALGORITHM.to_string(),
            hashes,
        }))
    }
}

fn is_jar(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jar"))
}

fn hash_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).at_path(path)?;
    Ok(Sha256::digest(&bytes).to_vec())
}
