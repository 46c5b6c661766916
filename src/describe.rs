//! Text description of the module an archive holds.

use regex_lite::Regex;
use std::path::Path;

use crate::error::{JarError, Result};
use crate::expand;
use crate::manifest::Manifest;
use crate::module_info::ModuleDescriptor;
use crate::names::{self, MANIFEST_DIR, MANIFEST_NAME, MODULE_INFO, VERSIONS_DIR};
use crate::probe::{self, JarArchive};

const AUTOMATIC_MODULE_NAME: &str = "Automatic-Module-Name";

/// Describes the root descriptor of `jar`, or with `release` the operative
/// one: the versioned descriptor of the highest release not above it,
/// falling back to the root. Archives without descriptors are described as
/// automatic modules.
pub fn describe_module(jar: &Path, release: Option<u32>) -> Result<String> {
    let mut archive = probe::open_archive(jar)?;
    let location = format!("jar:file://{}", absolute(jar));

    let mut versioned: Vec<(u32, String)> = Vec::new();
    let mut has_root = false;
    for name in probe::ordered_entry_names(&mut archive)? {
        if !names::is_module_info_entry(&name) {
            continue;
        }
        if name == MODULE_INFO {
            has_root = true;
        } else {
            let (version, _) = names::split_versioned(&name)?;
            versioned.push((version, name));
        }
    }
    versioned.sort();

    if !has_root && versioned.is_empty() {
        return describe_automatic(&mut archive, jar);
    }

    let mut out = String::new();
    if !versioned.is_empty() {
        let releases: Vec<String> = versioned.iter().map(|(v, _)| v.to_string()).collect();
        out.push_str(&format!("releases: {}\n\n", releases.join(" ")));
    }

    let operative = match release {
        Some(release) => versioned
            .iter()
            .rev()
            .find(|(v, _)| *v <= release)
            .map(|(_, name)| name.clone()),
        None => None,
    };
    let entry = match operative {
        Some(name) => name,
        None if has_root => MODULE_INFO.to_string(),
        None => versioned[0].1.clone(),
    };

    let bytes = probe::read_entry(&mut archive, &entry)?
        .ok_or_else(|| JarError::InvalidArchiveEntry(entry.clone()))?;
    let descriptor = ModuleDescriptor::read(&bytes)?;
    out.push_str(&describe(&descriptor, &format!("{location}!/{entry}")));
    Ok(out)
}

fn absolute(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

fn modifiers_prefix(modifiers: &[&str]) -> String {
    modifiers.iter().map(|m| format!("{m} ")).collect()
}

fn modifiers_suffix(modifiers: &[&str]) -> String {
    modifiers.iter().map(|m| format!(" {m}")).collect()
}

fn joined<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let mut items: Vec<&String> = items.collect();
    items.sort();
    items.iter().map(|s| format!(" {s}")).collect()
}

/// The `--describe-module` text of one descriptor.
pub fn describe(descriptor: &ModuleDescriptor, location: &str) -> String {
    let mut lines = Vec::new();
    let mut header = format!("{} {location}", descriptor.name_and_version());
    if descriptor.is_open() {
        header.push_str(" open");
    }
    lines.push(header);

    for export in descriptor.exports.iter().filter(|e| !e.is_qualified()) {
        lines.push(format!(
            "exports {}{}",
            modifiers_prefix(&export.modifiers()),
            export.source
        ));
    }
    for requires in &descriptor.requires {
        lines.push(format!(
            "requires {}{}",
            requires.name,
            modifiers_suffix(&requires.modifiers())
        ));
    }
    for service in &descriptor.uses {
        lines.push(format!("uses {service}"));
    }
    for provides in &descriptor.provides {
        lines.push(format!(
            "provides {} with{}",
            provides.service,
            joined(provides.providers.iter())
        ));
    }
    for export in descriptor.exports.iter().filter(|e| e.is_qualified()) {
        lines.push(format!(
            "qualified exports {} to{}",
            export.source,
            joined(export.targets.iter())
        ));
    }
    for open in descriptor.opens.iter().filter(|o| !o.is_qualified()) {
        lines.push(format!("opens {}{}", modifiers_prefix(&open.modifiers()), open.source));
    }
    for open in descriptor.opens.iter().filter(|o| o.is_qualified()) {
        lines.push(format!(
            "qualified opens {} to{}",
            open.source,
            joined(open.targets.iter())
        ));
    }
    for package in descriptor.concealed_packages() {
        lines.push(format!("contains {package}"));
    }
    if let Some(main) = &descriptor.main_class {
        lines.push(format!("main-class {main}"));
    }
    if let Some(platform) = descriptor.target_platform.as_deref().filter(|p| !p.is_empty()) {
        lines.push(format!("platform {platform}"));
    }
    if let Some(hashes) = &descriptor.hashes {
        for (module, digest) in &hashes.hashes {
            lines.push(format!(
                "hashes {module} {} {}",
                hashes.algorithm,
                hex::encode(digest)
            ));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Name and version an automatic module would get from a jar file name:
/// `foo-bar-1.2.jar` is `foo.bar` at `1.2`.
pub fn automatic_name(file_name: &str) -> (String, Option<String>) {
    let stem = file_name.strip_suffix(".jar").unwrap_or(file_name);
    let (name, version) = match Regex::new(r"-(\d+(\.|$))")
        .ok()
        .and_then(|re| re.find(stem))
    {
        Some(m) => (&stem[..m.start()], Some(stem[m.start() + 1..].to_string())),
        None => (stem, None),
    };

    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '.' })
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    (cleaned.trim_matches('.').to_string(), version)
}

fn describe_automatic(archive: &mut JarArchive, jar: &Path) -> Result<String> {
    let manifest = match probe::read_entry(archive, MANIFEST_NAME)? {
        Some(bytes) => Some(Manifest::parse(&bytes)?),
        None => None,
    };
    let file_name = jar
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (derived, version) = automatic_name(&file_name);
    let name = manifest
        .as_ref()
        .and_then(|m| m.main_attributes().get(AUTOMATIC_MODULE_NAME))
        .map(str::to_string)
        .unwrap_or(derived);

    let entry_names = probe::ordered_entry_names(archive)?;
    let packages = expand::packages_of(
        entry_names
            .iter()
            .map(String::as_str)
            .filter(|n| names::is_class_entry(n))
            .filter(|n| !n.starts_with(MANIFEST_DIR) && !n.starts_with(VERSIONS_DIR)),
    );

    let mut lines = vec![
        "No module descriptor found. Derived automatic module.".to_string(),
        String::new(),
    ];
    match version {
        Some(v) => lines.push(format!("{name}@{v} automatic")),
        None => lines.push(format!("{name} automatic")),
    }
    lines.push("requires java.base mandated".to_string());
    for package in packages {
        lines.push(format!("contains {package}"));
    }
    if let Some(main) = manifest.as_ref().and_then(Manifest::main_class) {
        lines.push(format!("main-class {main}"));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}
