//! `META-INF/INDEX.LIST` generation.
//!
//! The index maps every jar of a class path to the packages it holds, so a
//! class loader can pick the right jar without opening all of them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::manifest::{CLASS_PATH, Manifest};
use crate::names::{INDEX_NAME, MANIFEST_DIR, MANIFEST_NAME, VERSIONS_DIR};
use crate::probe;

pub const INDEX_VERSION_HEADER: &str = "JarIndex-Version: 1.0";

/// One jar of the index with its package paths in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedJar {
    pub name: String,
    pub packages: Vec<String>,
}

/// Jars reachable from `root` through `Class-Path`, root first. Paths are
/// resolved against the directory of the jar naming them; cycles and
/// directory entries (ending in `/`) are skipped.
pub fn class_path_closure(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(jar) = stack.pop() {
        if !seen.insert(jar.clone()) {
            continue;
        }
        let mut archive = probe::open_archive(&jar)?;
        let class_path = match probe::read_entry(&mut archive, MANIFEST_NAME)? {
            Some(bytes) => Manifest::parse(&bytes)?
                .main_attributes()
                .get(CLASS_PATH)
                .map(str::to_string),
            None => None,
        };
        let dir = jar.parent().map(Path::to_path_buf).unwrap_or_default();
        out.push(jar);

        let Some(class_path) = class_path else {
            continue;
        };
        let mut next: Vec<PathBuf> = class_path
            .split_whitespace()
            .filter(|p| !p.ends_with('/'))
            .map(|p| dir.join(p))
            .collect();
        next.reverse();
        stack.extend(next);
    }
    Ok(out)
}

/// Package paths of one jar: the directory part of every entry, or the
/// entry itself at the root. Manifest, index and versioned entries are
/// left out.
pub fn jar_packages(jar: &Path) -> Result<Vec<String>> {
    let mut archive = probe::open_archive(jar)?;
    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for name in probe::ordered_entry_names(&mut archive)? {
        if name == MANIFEST_DIR
            || name == MANIFEST_NAME
            || name == INDEX_NAME
            || name.starts_with(VERSIONS_DIR)
        {
            continue;
        }
        let package = match name.rfind('/') {
            Some(i) => &name[..i],
            None => name.as_str(),
        };
        if package.is_empty() {
            continue;
        }
        if seen.insert(package.to_string()) {
            packages.push(package.to_string());
        }
    }
    Ok(packages)
}

/// Indexes `jars`, naming each relative to `base_dir` when it lies below it.
pub fn build_index(base_dir: &Path, jars: &[PathBuf]) -> Result<Vec<IndexedJar>> {
    jars.iter()
        .map(|jar| {
            let name = jar
                .strip_prefix(base_dir)
                .unwrap_or(jar)
                .to_string_lossy()
                .replace('\\', "/");
            Ok(IndexedJar {
                name,
                packages: jar_packages(jar)?,
            })
        })
        .collect()
}

/// `INDEX.LIST` text: the version header, then one block per jar.
pub fn render_index(jars: &[IndexedJar]) -> String {
    let mut out = format!("{INDEX_VERSION_HEADER}\n\n");
    for jar in jars {
        out.push_str(&jar.name);
        out.push('\n');
        for package in &jar.packages {
            out.push_str(package);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Index content for `root`: its `Class-Path` closure when it has one,
/// otherwise `root` followed by `extra`.
pub fn generate(root: &Path, extra: &[PathBuf]) -> Result<String> {
    let mut jars = class_path_closure(root)?;
    if jars.len() == 1 {
        jars.extend(extra.iter().cloned());
    }
    let base_dir = root.parent().unwrap_or_else(|| Path::new(""));
    let index = build_index(base_dir, &jars)?;
    log::info!("indexed {} jar(s) for {}", index.len(), root.display());
    Ok(render_index(&index))
}
