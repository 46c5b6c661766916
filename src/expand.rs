//! Expansion of command inputs into archive entries.
//!
//! Directories contribute a directory entry followed by their children,
//! visited in file-name order. Module descriptors are pulled out into a
//! separate map so they can be extended before they are written.

use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, JarError, Result};
use crate::names::{self, BASE_VERSION, VERSIONS_DIR};

/// One file or directory destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub version: u32,
}

/// A command-line input, optionally relative to a `-C` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPath {
    pub path: PathBuf,
    pub base_dir: Option<PathBuf>,
}

impl InputPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base_dir: None,
        }
    }

    pub fn in_dir(base_dir: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base_dir: Some(base_dir.into()),
        }
    }

    fn disk_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(&self.path),
            None => self.path.clone(),
        }
    }
}

/// Inputs that target one release; version 0 is the base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSet {
    pub version: u32,
    pub inputs: Vec<InputPath>,
}

impl InputSet {
    pub fn base(inputs: Vec<InputPath>) -> Self {
        Self {
            version: BASE_VERSION,
            inputs,
        }
    }
}

#[derive(Debug, Default)]
pub struct Expansion {
    /// Regular entries in collection order.
    pub entries: Vec<Entry>,
    /// Module descriptor bytes by entry name, first one wins.
    pub module_infos: BTreeMap<String, Vec<u8>>,
    /// Module descriptor sources by entry name, for replacement bookkeeping.
    pub module_info_sources: HashMap<String, PathBuf>,
    seen_sources: HashSet<PathBuf>,
    dir_names: HashSet<String>,
    preserve_paths: bool,
}

impl Expansion {
    pub fn expand(sets: &[InputSet], preserve_paths: bool) -> Result<Self> {
        let mut expansion = Expansion {
            preserve_paths,
            ..Default::default()
        };
        for set in sets {
            for input in &set.inputs {
                expansion.expand_input(input, set.version)?;
            }
        }
        Ok(expansion)
    }

    fn expand_input(&mut self, input: &InputPath, version: u32) -> Result<()> {
        let root = input.disk_path();
        if fs::symlink_metadata(&root).is_err() {
            return Err(JarError::NoSuchFile(root));
        }

        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for item in walker {
            let item = item.map_err(|e| {
                JarError::io(&root, std::io::Error::other(e.to_string()))
            })?;
            let path = item.path();
            let relative = match path.strip_prefix(&root) {
                Ok(rest) if rest.as_os_str().is_empty() => input.path.clone(),
                Ok(rest) => input.path.join(rest),
                Err(_) => path.to_path_buf(),
            };
            let is_dir = item.file_type().is_some_and(|t| t.is_dir());
            self.add(path, &relative, is_dir, version)?;
        }
        Ok(())
    }

    fn add(&mut self, path: &Path, relative: &Path, is_dir: bool, version: u32) -> Result<()> {
        let mut name = names::to_entry_name(
            &relative.to_string_lossy(),
            is_dir,
            self.preserve_paths,
        );
        if version != BASE_VERSION {
            if name.starts_with(VERSIONS_DIR) {
                return Err(JarError::UnexpectedVersionedEntry { name, version });
            }
            name = names::to_versioned_name(&name, version);
        }

        let identity = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.seen_sources.insert(identity) {
            log::debug!("skipping duplicate source {}", path.display());
            return Ok(());
        }

        if is_dir {
            // a conflicting directory name is dropped but its subtree is still walked
            if self.dir_names.insert(name.clone()) {
                self.entries.push(Entry {
                    name,
                    path: path.to_path_buf(),
                    is_dir,
                    version,
                });
            }
            return Ok(());
        }

        if names::is_module_info_entry(&name) {
            if !self.module_infos.contains_key(&name) {
                let bytes = fs::read(path).at_path(path)?;
                self.module_infos.insert(name.clone(), bytes);
            }
            self.module_info_sources.insert(name, path.to_path_buf());
            return Ok(());
        }

        self.entries.push(Entry {
            name,
            path: path.to_path_buf(),
            is_dir,
            version,
        });
        Ok(())
    }

    pub fn is_multi_release(&self) -> bool {
        self.entries.iter().any(|e| e.version > BASE_VERSION)
            || self.module_info_sources.keys().any(|n| n.starts_with(VERSIONS_DIR))
    }

    /// Names of the regular file entries.
    pub fn file_names(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Every package touched by a regular file entry.
    pub fn packages(&self) -> BTreeSet<String> {
        packages_of(self.entries.iter().filter(|e| !e.is_dir).map(|e| e.name.as_str()))
    }
}

pub fn packages_of<'a>(names: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    names.filter_map(names::package_of_entry).collect()
}
