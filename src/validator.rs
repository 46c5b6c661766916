//! Multi-release consistency checks.
//!
//! Class entries are grouped by release, base first. The base group seeds a
//! table of known classes; every versioned group is checked against it and
//! updates it. Module descriptors are checked against the first descriptor
//! seen (the root one when present). Every problem becomes a [`Diagnostic`];
//! only malformed entry names abort validation.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::config::ToolConfig;
use crate::error::{JarError, Result};
use crate::fingerprint::{Digester, EntryFingerprint};
use crate::module_info::{ModuleDescriptor, Requires};
use crate::names::{self, BASE_VERSION, MODULE_INFO};
use crate::ordering;
use crate::probe::{self, JarArchive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NameMismatch,
    IsolatedNestedClass,
    UnexpectedNewPublicClass,
    ConcealedPublicClass,
    IncompatibleClassVersion,
    DifferentApi,
    RedundantIdenticalEntry,
    InvalidClassFile,
    InvalidModuleDescriptor,
    MissingProvider,
    ModuleNameMismatch,
    IncompatibleRequires,
    DifferentExports,
    DifferentOpens,
    DifferentProvides,
    DifferentMainClass,
    DifferentVersion,
    NoModuleHashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub entry: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        entry: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            entry: entry.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {}", self.message)
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The descriptor every later one is compared with.
#[derive(Debug, Clone)]
pub struct ModuleConsistencyRecord {
    pub base: ModuleDescriptor,
}

impl ModuleConsistencyRecord {
    /// Package of `class_name` (internal form) is part of the module but
    /// neither exported nor opened.
    pub fn is_concealed(&self, class_name: &str) -> bool {
        let package = match class_name.rfind('/') {
            Some(i) => class_name[..i].replace('/', "."),
            None => String::new(),
        };
        self.base.concealed_packages().contains(&package)
    }
}

#[derive(Debug, Clone)]
enum State {
    AwaitingBase,
    HaveBase(ModuleConsistencyRecord),
}

/// Fingerprints of one release, outer classes ahead of their nested ones.
struct Group {
    version: u32,
    entries: Vec<EntryFingerprint>,
    by_class: HashMap<String, usize>,
}

impl Group {
    fn new(version: u32) -> Self {
        Self {
            version,
            entries: Vec::new(),
            by_class: HashMap::new(),
        }
    }

    fn contains_class(&self, class_name: Option<&str>) -> bool {
        class_name.is_some_and(|c| self.by_class.contains_key(c))
    }
}

pub struct Validator<'a> {
    config: &'a ToolConfig,
    state: State,
    known: HashMap<String, EntryFingerprint>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a ToolConfig) -> Self {
        Self {
            config,
            state: State::AwaitingBase,
            known: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, kind: DiagnosticKind, entry: &str, message: String) {
        log::error!("{message}");
        self.diagnostics.push(Diagnostic::error(kind, entry, message));
    }

    fn warn(&mut self, kind: DiagnosticKind, entry: &str, message: String) {
        log::warn!("{message}");
        self.diagnostics.push(Diagnostic::warning(kind, entry, message));
    }

    /// Validates every class entry and module descriptor of `archive`.
    pub fn validate(
        mut self,
        archive: &mut JarArchive,
        digester: &dyn Digester,
    ) -> Result<ValidationReport> {
        let mut names: Vec<String> = probe::ordered_entry_names(archive)?
            .into_iter()
            .filter(|n| !n.ends_with('/'))
            .collect();
        ordering::sort_entry_names(&mut names)?;
        let present: HashSet<String> = names.iter().cloned().collect();

        if let Some(bytes) = probe::read_entry(archive, MODULE_INFO)? {
            self.check_module_descriptor(MODULE_INFO, &bytes, &present);
        }

        let mut module_infos = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        for name in names.iter().filter(|n| names::is_class_entry(n)) {
            let Some(bytes) = probe::read_entry(archive, name)? else {
                continue;
            };
            let fp = match EntryFingerprint::new(name, &bytes, digester) {
                Ok(fp) => fp,
                Err(e @ JarError::MalformedVersionedEntry(_)) => return Err(e),
                Err(e) => {
                    self.error(DiagnosticKind::InvalidClassFile, name, e.to_string());
                    continue;
                }
            };
            if !fp.is_class() {
                continue;
            }
            if fp.is_module_info() && fp.version() > BASE_VERSION {
                module_infos.insert(name.clone(), bytes);
            }

            if groups.last().is_none_or(|g| g.version != fp.version()) {
                groups.push(Group::new(fp.version()));
            }
            let Some(group) = groups.last_mut() else {
                continue;
            };
            let class_name = fp.class_name().unwrap_or_default().to_string();
            if group.by_class.contains_key(&class_name) {
                // the first declaring entry is checked with its group
                self.check_class_name(&fp);
                continue;
            }
            group.by_class.insert(class_name, group.entries.len());
            group.entries.push(fp);
        }

        for group in &groups {
            if group.version == BASE_VERSION {
                self.validate_base(group);
            } else {
                self.validate_versioned(group, &module_infos, &present);
            }
        }

        let valid = !has_errors(&self.diagnostics);
        Ok(ValidationReport {
            valid,
            diagnostics: self.diagnostics,
        })
    }

    fn check_class_name(&mut self, fp: &EntryFingerprint) -> bool {
        if fp.name_matches_class() {
            return true;
        }
        self.error(
            DiagnosticKind::NameMismatch,
            fp.entry_name(),
            format!(
                "entry: {}, contains a class with internal name {}, names do not match",
                fp.entry_name(),
                fp.class_name().unwrap_or_default()
            ),
        );
        false
    }

    fn check_nested_class(&mut self, fp: &EntryFingerprint, group: &Group, as_error: bool) -> bool {
        if group.contains_class(fp.outer_class_name()) {
            return true;
        }
        let message = format!(
            "entry: {}, is an isolated nested class, its outer class {} is not in the same release",
            fp.entry_name(),
            fp.outer_class_name().unwrap_or("<unknown>")
        );
        if as_error {
            self.error(DiagnosticKind::IsolatedNestedClass, fp.entry_name(), message);
        } else {
            self.warn(DiagnosticKind::IsolatedNestedClass, fp.entry_name(), message);
        }
        false
    }

    fn validate_base(&mut self, group: &Group) {
        for fp in &group.entries {
            if fp.is_module_info() {
                continue;
            }
            if !self.check_class_name(fp) {
                continue;
            }
            if fp.is_nested_class() {
                self.check_nested_class(fp, group, true);
            }
            if let Some(name) = fp.class_name() {
                self.known.insert(name.to_string(), fp.clone());
            }
        }
    }

    fn validate_versioned(
        &mut self,
        group: &Group,
        module_infos: &HashMap<String, Vec<u8>>,
        present: &HashSet<String>,
    ) {
        for fp in &group.entries {
            if fp.is_module_info() {
                if let Some(bytes) = module_infos.get(fp.entry_name()) {
                    self.check_module_descriptor(fp.entry_name(), bytes, present);
                }
                continue;
            }
            let entry = fp.entry_name();
            let class_name = fp.class_name().unwrap_or_default().to_string();

            let Some(known) = self.known.get(&class_name).cloned() else {
                if fp.is_nested_class() {
                    self.check_nested_class(fp, group, true);
                    continue;
                }
                if fp.is_public_class() {
                    let concealed = match &self.state {
                        State::HaveBase(record) => record.is_concealed(&class_name),
                        State::AwaitingBase => false,
                    };
                    if !concealed {
                        self.error(
                            DiagnosticKind::UnexpectedNewPublicClass,
                            entry,
                            format!(
                                "entry: {entry}, contains a new public class not found in base entries"
                            ),
                        );
                        continue;
                    }
                    self.warn(
                        DiagnosticKind::ConcealedPublicClass,
                        entry,
                        format!(
                            "entry: {entry} is a public class in a concealed package, placing this \
                             jar on the class path will result in incompatible public interfaces"
                        ),
                    );
                }
                self.known.insert(class_name, fp.clone());
                continue;
            };

            if fp.is_identical(&known) {
                self.warn(
                    DiagnosticKind::RedundantIdenticalEntry,
                    entry,
                    format!(
                        "entry: {entry}, contains a class that is identical to an entry already in the jar"
                    ),
                );
                continue;
            }

            if fp.is_nested_class() {
                self.check_nested_class(fp, group, false);
                continue;
            }

            if !fp.is_compatible_version(&known) {
                self.error(
                    DiagnosticKind::IncompatibleClassVersion,
                    entry,
                    format!(
                        "entry: {entry}, has a class version {} incompatible with an earlier version {}",
                        fp.major_version(),
                        known.major_version()
                    ),
                );
                continue;
            }
            if !fp.is_same_api(&known) {
                self.error(
                    DiagnosticKind::DifferentApi,
                    entry,
                    format!("entry: {entry}, contains a class with different api from earlier version"),
                );
                continue;
            }
            if !self.check_class_name(fp) {
                continue;
            }
            self.known.insert(class_name, fp.clone());
        }
    }

    fn check_module_descriptor(&mut self, entry: &str, bytes: &[u8], present: &HashSet<String>) {
        let descriptor = match ModuleDescriptor::read(bytes) {
            Ok(d) => d,
            Err(e) => {
                self.error(
                    DiagnosticKind::InvalidModuleDescriptor,
                    entry,
                    format!("{e} : {entry}"),
                );
                return;
            }
        };

        let record = match &self.state {
            State::HaveBase(record) => record.clone(),
            State::AwaitingBase => {
                let missing: Vec<String> = descriptor
                    .provides
                    .iter()
                    .flat_map(|p| p.providers.iter())
                    .filter(|p| !present.contains(&names::to_binary_entry_name(p)))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    for provider in missing {
                        self.error(
                            DiagnosticKind::MissingProvider,
                            entry,
                            format!("service provider {provider} not found"),
                        );
                    }
                    return;
                }
                self.state = State::HaveBase(ModuleConsistencyRecord { base: descriptor });
                return;
            }
        };
        let base = &record.base;

        if base.name != descriptor.name {
            self.error(
                DiagnosticKind::ModuleNameMismatch,
                entry,
                format!("{entry} has a different module name than the base module-info.class"),
            );
        }
        if base.requires != descriptor.requires {
            self.check_requires(entry, &descriptor.requires, &base.requires, "added");
            self.check_requires(entry, &base.requires, &descriptor.requires, "dropped");
        }
        let comparisons = [
            (base.exports == descriptor.exports, DiagnosticKind::DifferentExports, "exports"),
            (base.opens == descriptor.opens, DiagnosticKind::DifferentOpens, "opens"),
            (base.provides == descriptor.provides, DiagnosticKind::DifferentProvides, "provides"),
            (
                base.main_class == descriptor.main_class,
                DiagnosticKind::DifferentMainClass,
                "main class",
            ),
            (base.version == descriptor.version, DiagnosticKind::DifferentVersion, "version"),
        ];
        for (same, kind, what) in comparisons {
            if !same {
                self.error(
                    kind,
                    entry,
                    format!("{entry} contains a different \"{what}\" than the base module-info.class"),
                );
            }
        }
    }

    /// Reports `requires` in `ours` missing from `theirs` unless they are
    /// non-transitive and on a platform module.
    fn check_requires(
        &mut self,
        entry: &str,
        ours: &BTreeSet<Requires>,
        theirs: &BTreeSet<Requires>,
        change: &str,
    ) {
        for requires in ours.difference(theirs) {
            if requires.is_transitive() {
                self.error(
                    DiagnosticKind::IncompatibleRequires,
                    entry,
                    format!(
                        "{entry} has {change} a \"requires transitive\" on {}",
                        requires.name
                    ),
                );
            } else if !self.config.is_platform_module(&requires.name) {
                self.error(
                    DiagnosticKind::IncompatibleRequires,
                    entry,
                    format!(
                        "{entry} has {change} a \"requires\" on non-platform module {}",
                        requires.name
                    ),
                );
            }
        }
    }
}

/// Opens and validates the archive at `jar_path`.
pub fn validate_archive(
    jar_path: &std::path::Path,
    config: &ToolConfig,
    digester: &dyn Digester,
) -> Result<ValidationReport> {
    let mut archive = probe::open_archive(jar_path)?;
    Validator::new(config).validate(&mut archive, digester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Sha256Digester;
    use crate::test_support::*;
    use std::fs;

    fn validate(entries: &[(&str, &[u8])]) -> Result<ValidationReport> {
        let jar = temp_path("validator").with_extension("jar");
        write_jar(&jar, entries);
        let report = validate_archive(&jar, &ToolConfig::default(), &Sha256Digester);
        let _ = fs::remove_file(&jar);
        report
    }

    fn kinds(report: &ValidationReport) -> Vec<DiagnosticKind> {
        report.diagnostics.iter().map(|d| d.kind).collect()
    }

    fn module_exporting_p() -> Vec<u8> {
        ModuleInfoFile::new("m").exports("p").packages(&["p", "q"]).to_bytes()
    }

    #[test]
    fn new_public_class_in_concealed_package_is_a_warning() -> Result<()> {
        let report = validate(&[
            (MODULE_INFO, &module_exporting_p()),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("META-INF/versions/10/q/B.class", &ClassFile::new("q/B").to_bytes()),
        ])?;
        assert!(report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::ConcealedPublicClass]);
        assert_eq!(report.diagnostics[0].severity, Severity::Warning);
        Ok(())
    }

    #[test]
    fn new_public_class_in_exported_package_is_an_error() -> Result<()> {
        let report = validate(&[
            (MODULE_INFO, &module_exporting_p()),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("META-INF/versions/10/p/B.class", &ClassFile::new("p/B").to_bytes()),
        ])?;
        assert!(!report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::UnexpectedNewPublicClass]);
        Ok(())
    }

    #[test]
    fn new_public_class_outside_the_module_packages_is_an_error() -> Result<()> {
        let report = validate(&[
            (MODULE_INFO, &ModuleInfoFile::new("m").exports("p").packages(&["p"]).to_bytes()),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("META-INF/versions/10/z/B.class", &ClassFile::new("z/B").to_bytes()),
        ])?;
        assert!(!report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::UnexpectedNewPublicClass]);
        Ok(())
    }

    #[test]
    fn duplicate_class_in_one_release_reports_each_mismatch_once() -> Result<()> {
        let report = validate(&[
            ("p/A.class", &ClassFile::new("p/X").to_bytes()),
            ("p/X.class", &ClassFile::new("p/X").to_bytes()),
        ])?;
        assert!(!report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::NameMismatch]);
        assert_eq!(report.diagnostics[0].entry, "p/A.class");
        Ok(())
    }

    #[test]
    fn lower_class_version_is_incompatible() -> Result<()> {
        let report = validate(&[
            ("X.class", &ClassFile::new("X").major(55).to_bytes()),
            (
                "META-INF/versions/11/X.class",
                &ClassFile::new("X").major(53).field(ACC_PUBLIC, "f", "I").to_bytes(),
            ),
        ])?;
        assert!(!report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::IncompatibleClassVersion]);
        Ok(())
    }

    #[test]
    fn changed_public_api_is_an_error_and_all_errors_are_reported() -> Result<()> {
        let report = validate(&[
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
            ("p/B.class", &ClassFile::new("p/B").to_bytes()),
            (
                "META-INF/versions/9/p/A.class",
                &ClassFile::new("p/A").method(ACC_PUBLIC, "m", "()V", &[]).to_bytes(),
            ),
            ("META-INF/versions/9/p/B.class", &ClassFile::new("p/Other").to_bytes()),
        ])?;
        assert!(!report.valid);
        let kinds = kinds(&report);
        assert!(kinds.contains(&DiagnosticKind::DifferentApi));
        assert!(kinds.contains(&DiagnosticKind::UnexpectedNewPublicClass));
        Ok(())
    }

    #[test]
    fn identical_versioned_entry_is_only_a_warning() -> Result<()> {
        let bytes = ClassFile::new("p/A").to_bytes();
        let report = validate(&[("p/A.class", &bytes), ("META-INF/versions/9/p/A.class", &bytes)])?;
        assert!(report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::RedundantIdenticalEntry]);
        Ok(())
    }

    #[test]
    fn private_api_changes_and_version_bumps_are_fine() -> Result<()> {
        let report = validate(&[
            ("p/A.class", &ClassFile::new("p/A").major(52).to_bytes()),
            (
                "META-INF/versions/9/p/A.class",
                &ClassFile::new("p/A")
                    .major(53)
                    .method(ACC_PRIVATE, "helper", "()V", &[])
                    .to_bytes(),
            ),
        ])?;
        assert!(report.valid, "{:?}", report.diagnostics);
        assert!(report.diagnostics.is_empty());
        Ok(())
    }

    #[test]
    fn base_name_mismatch_and_isolated_nested_class() -> Result<()> {
        let report = validate(&[
            ("p/A.class", &ClassFile::new("p/Wrong").to_bytes()),
            (
                "p/B$C.class",
                &ClassFile::new("p/B$C")
                    .inner_class("p/B$C", Some("p/B"), ACC_PUBLIC | ACC_STATIC)
                    .to_bytes(),
            ),
        ])?;
        assert!(!report.valid);
        assert_eq!(
            kinds(&report),
            vec![DiagnosticKind::NameMismatch, DiagnosticKind::IsolatedNestedClass]
        );
        Ok(())
    }

    #[test]
    fn versioned_descriptor_may_only_vary_platform_requires() -> Result<()> {
        let base = ModuleInfoFile::new("m").exports("p").packages(&["p"]);
        let ok = base.clone().requires("java.sql", 0).uses("p.S").to_bytes();
        let bad = base.clone().requires("other", 0).to_bytes();
        let transitive = base.clone().requires("jdk.net", ACC_TRANSITIVE).to_bytes();
        let renamed = ModuleInfoFile::new("n").exports("p").packages(&["p"]).to_bytes();

        let report = validate(&[
            (MODULE_INFO, &base.to_bytes()),
            ("META-INF/versions/9/module-info.class", &ok),
            ("META-INF/versions/10/module-info.class", &bad),
            ("META-INF/versions/11/module-info.class", &transitive),
            ("META-INF/versions/12/module-info.class", &renamed),
        ])?;
        assert!(!report.valid);
        let entries: Vec<_> = report.diagnostics.iter().map(|d| (d.entry.as_str(), d.kind)).collect();
        assert_eq!(
            entries,
            vec![
                ("META-INF/versions/10/module-info.class", DiagnosticKind::IncompatibleRequires),
                ("META-INF/versions/11/module-info.class", DiagnosticKind::IncompatibleRequires),
                ("META-INF/versions/12/module-info.class", DiagnosticKind::ModuleNameMismatch),
            ]
        );
        Ok(())
    }

    #[test]
    fn versioned_descriptor_with_different_exports_is_an_error() -> Result<()> {
        let base = ModuleInfoFile::new("m").exports("p").packages(&["p", "q"]);
        let more = ModuleInfoFile::new("m").exports("p").exports("q").packages(&["p", "q"]);
        let report = validate(&[
            (MODULE_INFO, &base.to_bytes()),
            ("META-INF/versions/9/module-info.class", &more.to_bytes()),
        ])?;
        assert_eq!(kinds(&report), vec![DiagnosticKind::DifferentExports]);
        Ok(())
    }

    #[test]
    fn malformed_versioned_name_aborts() {
        let err = validate(&[("META-INF/versions/9C.class", b"x")]).unwrap_err();
        assert!(matches!(err, JarError::InvalidArchiveEntry(_)));
    }

    #[test]
    fn broken_class_file_is_reported_and_validation_continues() -> Result<()> {
        let report = validate(&[
            ("p/Broken.class", &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]),
            ("p/A.class", &ClassFile::new("p/A").to_bytes()),
        ])?;
        assert!(!report.valid);
        assert_eq!(kinds(&report), vec![DiagnosticKind::InvalidClassFile]);
        Ok(())
    }
}
