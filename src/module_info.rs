//! `module-info.class` reading and extension.
//!
//! [`ModuleInfo`] keeps the class file as parsed: the original constant pool
//! (only ever appended to) and the raw attribute table. Extending it replaces
//! or appends the `ModulePackages`, `ModuleMainClass`, `ModuleHashes` and
//! `ModuleResolution` attributes and patches the version slot of the `Module`
//! attribute; everything else is written back untouched.
//!
//! [`ModuleDescriptor`] is the decoded, comparison-ready view with dotted
//! package and class names.

use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Cursor, Read};

use crate::classfile::has_class_magic;
use crate::constant_pool::{ConstantPool, FormatError};
use crate::error::{JarError, Result};
use crate::names;
use crate::validator::{Diagnostic, DiagnosticKind};

const ACC_MODULE: u16 = 0x8000;

const MODULE: &str = "Module";
const MODULE_PACKAGES: &str = "ModulePackages";
const MODULE_MAIN_CLASS: &str = "ModuleMainClass";
const MODULE_TARGET: &str = "ModuleTarget";
const MODULE_HASHES: &str = "ModuleHashes";
const MODULE_RESOLUTION: &str = "ModuleResolution";

bitflags! {
    pub struct ModuleFlags: u16 {
        const OPEN = 0x0020;
        const SYNTHETIC = 0x1000;
        const MANDATED = 0x8000;
    }
}

bitflags! {
    pub struct RequiresFlags: u16 {
        const TRANSITIVE = 0x0020;
        const STATIC_PHASE = 0x0040;
        const SYNTHETIC = 0x1000;
        const MANDATED = 0x8000;
    }
}

bitflags! {
    /// Flags of the `ModuleResolution` attribute.
    pub struct ResolutionFlags: u16 {
        const DO_NOT_RESOLVE_BY_DEFAULT = 0x0001;
        const WARN_DEPRECATED = 0x0002;
        const WARN_DEPRECATED_FOR_REMOVAL = 0x0004;
        const WARN_INCUBATING = 0x0008;
    }
}

impl Default for ResolutionFlags {
    fn default() -> Self {
        ResolutionFlags::empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Requires {
    pub name: String,
    pub flags: RequiresFlags,
    pub compiled_version: Option<String>,
}

impl Requires {
    pub fn is_transitive(&self) -> bool {
        self.flags.contains(RequiresFlags::TRANSITIVE)
    }

    /// Lower-case modifier names, sorted.
    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.flags.contains(RequiresFlags::MANDATED) {
            out.push("mandated");
        }
        if self.flags.contains(RequiresFlags::STATIC_PHASE) {
            out.push("static");
        }
        if self.flags.contains(RequiresFlags::SYNTHETIC) {
            out.push("synthetic");
        }
        if self.flags.contains(RequiresFlags::TRANSITIVE) {
            out.push("transitive");
        }
        out
    }
}

/// An `exports` or `opens` directive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageDirective {
    pub source: String,
    pub flags: u16,
    pub targets: BTreeSet<String>,
}

impl PackageDirective {
    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn modifiers(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.flags & 0x8000 != 0 {
            out.push("mandated");
        }
        if self.flags & 0x1000 != 0 {
            out.push("synthetic");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provides {
    pub service: String,
    pub providers: Vec<String>,
}

/// Hashes of the modules that depend on the module being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHashes {
    pub algorithm: String,
    pub hashes: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub flags: ModuleFlags,
    pub version: Option<String>,
    pub requires: BTreeSet<Requires>,
    pub exports: BTreeSet<PackageDirective>,
    pub opens: BTreeSet<PackageDirective>,
    pub uses: BTreeSet<String>,
    pub provides: BTreeSet<Provides>,
    pub packages: BTreeSet<String>,
    pub main_class: Option<String>,
    pub target_platform: Option<String>,
    pub hashes: Option<ModuleHashes>,
    pub resolution: Option<ResolutionFlags>,
}

impl ModuleDescriptor {
    pub fn read(bytes: &[u8]) -> Result<Self> {
        ModuleInfo::parse(bytes)?.descriptor()
    }

    pub fn is_open(&self) -> bool {
        self.flags.contains(ModuleFlags::OPEN)
    }

    /// `name@version`, or just the name.
    pub fn name_and_version(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{}", self.name, v),
            None => self.name.clone(),
        }
    }

    /// Packages that are neither exported nor opened.
    pub fn concealed_packages(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .filter(|p| !self.is_exported_or_opened(p))
            .cloned()
            .collect()
    }

    pub fn is_exported_or_opened(&self, package: &str) -> bool {
        self.exports
            .iter()
            .chain(self.opens.iter())
            .any(|d| d.source == package)
    }
}

#[derive(Debug, Clone)]
struct RawAttribute {
    name: String,
    name_index: u16,
    data: Vec<u8>,
}

/// A parsed `module-info.class` that can be extended and written back.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    minor_version: u16,
    major_version: u16,
    pool: ConstantPool,
    // access flags through the (empty) methods table, kept verbatim
    body: Vec<u8>,
    attributes: Vec<RawAttribute>,
}

fn invalid(e: FormatError) -> JarError {
    JarError::InvalidModuleDescriptor(e.to_string())
}

fn malformed(message: &str) -> FormatError {
    FormatError::Malformed(message.to_string())
}

impl ModuleInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::read(bytes).map_err(invalid)
    }

    fn read(bytes: &[u8]) -> std::result::Result<Self, FormatError> {
        if !has_class_magic(bytes) {
            return Err(FormatError::BadMagic);
        }
        let mut r = Cursor::new(bytes);
        r.set_position(4);
        let minor_version = r.read_u16::<BigEndian>()?;
        let major_version = r.read_u16::<BigEndian>()?;
        let pool = ConstantPool::read(&mut r)?;

        let body_start = r.position() as usize;
        let access = r.read_u16::<BigEndian>()?;
        if access & ACC_MODULE == 0 {
            return Err(malformed("access_flags should be ACC_MODULE"));
        }
        let this_class = r.read_u16::<BigEndian>()?;
        if pool.class_name(this_class)? != "module-info" {
            return Err(malformed("this_class should be module-info"));
        }
        if r.read_u16::<BigEndian>()? != 0 {
            return Err(malformed("bad #super_class"));
        }
        if r.read_u16::<BigEndian>()? != 0 {
            return Err(malformed("bad #interfaces"));
        }
        if r.read_u16::<BigEndian>()? != 0 {
            return Err(malformed("bad #fields"));
        }
        if r.read_u16::<BigEndian>()? != 0 {
            return Err(malformed("bad #methods"));
        }
        let body = bytes[body_start..r.position() as usize].to_vec();

        let mut attributes = Vec::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            let name_index = r.read_u16::<BigEndian>()?;
            let name = pool.utf8(name_index)?;
            let len = r.read_u32::<BigEndian>()? as usize;
            let remaining = bytes.len().saturating_sub(r.position() as usize);
            if len > remaining {
                return Err(FormatError::Truncated);
            }
            let mut data = vec![0u8; len];
            r.read_exact(&mut data)?;
            attributes.push(RawAttribute {
                name,
                name_index,
                data,
            });
        }
        if r.position() as usize != bytes.len() {
            return Err(malformed("trailing bytes after attributes"));
        }
        if !attributes.iter().any(|a| a.name == MODULE) {
            return Err(malformed("Module attribute not found"));
        }

        Ok(Self {
            minor_version,
            major_version,
            pool,
            body,
            attributes,
        })
    }

    fn attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.data.as_slice())
    }

    pub fn descriptor(&self) -> Result<ModuleDescriptor> {
        self.decode().map_err(invalid)
    }

    fn decode(&self) -> std::result::Result<ModuleDescriptor, FormatError> {
        let pool = &self.pool;
        let module = self
            .attribute(MODULE)
            .ok_or_else(|| malformed("Module attribute not found"))?;
        let mut r = Cursor::new(module);

        let name = pool.module_name(r.read_u16::<BigEndian>()?)?;
        let flags = ModuleFlags::from_bits_truncate(r.read_u16::<BigEndian>()?);
        let version = pool.opt_utf8(r.read_u16::<BigEndian>()?)?;

        let mut requires = BTreeSet::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            let module_name = pool.module_name(r.read_u16::<BigEndian>()?)?;
            let requires_flags = RequiresFlags::from_bits_truncate(r.read_u16::<BigEndian>()?);
            let compiled_version = pool.opt_utf8(r.read_u16::<BigEndian>()?)?;
            requires.insert(Requires {
                name: module_name,
                flags: requires_flags,
                compiled_version,
            });
        }

        let exports = read_package_directives(&mut r, pool)?;
        let opens = read_package_directives(&mut r, pool)?;
        if flags.contains(ModuleFlags::OPEN) && !opens.is_empty() {
            return Err(malformed("open module must not have opens directives"));
        }

        let mut uses = BTreeSet::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            uses.insert(dotted(&pool.class_name(r.read_u16::<BigEndian>()?)?));
        }

        let mut provides = BTreeSet::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            let service = dotted(&pool.class_name(r.read_u16::<BigEndian>()?)?);
            let mut providers = Vec::new();
            for _ in 0..r.read_u16::<BigEndian>()? {
                providers.push(dotted(&pool.class_name(r.read_u16::<BigEndian>()?)?));
            }
            if providers.is_empty() {
                return Err(malformed("provides directive with no implementations"));
            }
            provides.insert(Provides { service, providers });
        }

        let main_class = match self.attribute(MODULE_MAIN_CLASS) {
            Some(data) => {
                let mut a = Cursor::new(data);
                Some(dotted(&pool.class_name(a.read_u16::<BigEndian>()?)?))
            }
            None => None,
        };

        let target_platform = match self.attribute(MODULE_TARGET) {
            Some(data) => {
                let mut a = Cursor::new(data);
                pool.opt_utf8(a.read_u16::<BigEndian>()?)?
            }
            None => None,
        };

        let hashes = match self.attribute(MODULE_HASHES) {
            Some(data) => Some(read_hashes(data, pool)?),
            None => None,
        };

        let resolution = match self.attribute(MODULE_RESOLUTION) {
            Some(data) => {
                let mut a = Cursor::new(data);
                Some(ResolutionFlags::from_bits_truncate(a.read_u16::<BigEndian>()?))
            }
            None => None,
        };

        let packages = match self.attribute(MODULE_PACKAGES) {
            Some(data) => {
                let mut a = Cursor::new(data);
                let mut set = BTreeSet::new();
                for _ in 0..a.read_u16::<BigEndian>()? {
                    set.insert(dotted(&pool.package_name(a.read_u16::<BigEndian>()?)?));
                }
                for d in exports.iter().chain(opens.iter()) {
                    if !set.contains(&d.source) {
                        return Err(FormatError::Malformed(format!(
                            "package {} missing from ModulePackages class file attribute",
                            d.source
                        )));
                    }
                }
                set
            }
            None => {
                let mut set: BTreeSet<String> = exports
                    .iter()
                    .chain(opens.iter())
                    .map(|d| d.source.clone())
                    .collect();
                let classes = provides
                    .iter()
                    .flat_map(|p| p.providers.iter())
                    .chain(main_class.iter());
                for class in classes {
                    if let Some(package) = package_of_class(class) {
                        set.insert(package);
                    }
                }
                set
            }
        };

        Ok(ModuleDescriptor {
            name,
            flags,
            version,
            requires,
            exports,
            opens,
            uses,
            provides,
            packages,
            main_class,
            target_platform,
            hashes,
            resolution,
        })
    }

    fn put_attribute(&mut self, name: &str, data: Vec<u8>) -> std::result::Result<(), FormatError> {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name == name) {
            existing.data = data;
            return Ok(());
        }
        let name_index = self.pool.intern_utf8(name)?;
        self.attributes.push(RawAttribute {
            name: name.to_string(),
            name_index,
            data,
        });
        Ok(())
    }

    /// Replaces the package set. Names are dotted.
    pub fn set_packages(&mut self, packages: &BTreeSet<String>) -> Result<()> {
        let mut data = Vec::new();
        push_u16(&mut data, packages.len() as u16);
        for package in packages {
            let index = self.pool.intern_package(&internal(package)).map_err(invalid)?;
            push_u16(&mut data, index);
        }
        self.put_attribute(MODULE_PACKAGES, data).map_err(invalid)
    }

    pub fn set_main_class(&mut self, class_name: &str) -> Result<()> {
        let index = self.pool.intern_class(&internal(class_name)).map_err(invalid)?;
        self.put_attribute(MODULE_MAIN_CLASS, index.to_be_bytes().to_vec())
            .map_err(invalid)
    }

    pub fn set_version(&mut self, version: &str) -> Result<()> {
        let index = self.pool.intern_utf8(version).map_err(invalid)?;
        let module = self
            .attributes
            .iter_mut()
            .find(|a| a.name == MODULE)
            .filter(|a| a.data.len() >= 6)
            .ok_or_else(|| JarError::InvalidModuleDescriptor("truncated Module attribute".into()))?;
        module.data[4..6].copy_from_slice(&index.to_be_bytes());
        Ok(())
    }

    pub fn set_hashes(&mut self, hashes: &ModuleHashes) -> Result<()> {
        let mut data = Vec::new();
        let algorithm = self.pool.intern_utf8(&hashes.algorithm).map_err(invalid)?;
        push_u16(&mut data, algorithm);
        push_u16(&mut data, hashes.hashes.len() as u16);
        for (module, digest) in &hashes.hashes {
            let index = self.pool.intern_module(module).map_err(invalid)?;
            push_u16(&mut data, index);
            push_u16(&mut data, digest.len() as u16);
            data.extend_from_slice(digest);
        }
        self.put_attribute(MODULE_HASHES, data).map_err(invalid)
    }

    pub fn set_resolution(&mut self, flags: ResolutionFlags) -> Result<()> {
        self.put_attribute(MODULE_RESOLUTION, flags.bits().to_be_bytes().to_vec())
            .map_err(invalid)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write().map_err(|e| JarError::InvalidModuleDescriptor(e.to_string()))
    }

    fn write(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&crate::constant_pool::CLASS_MAGIC);
        out.write_u16::<BigEndian>(self.minor_version)?;
        out.write_u16::<BigEndian>(self.major_version)?;
        self.pool.write(&mut out)?;
        out.extend_from_slice(&self.body);
        out.write_u16::<BigEndian>(self.attributes.len() as u16)?;
        for attr in &self.attributes {
            out.write_u16::<BigEndian>(attr.name_index)?;
            out.write_u32::<BigEndian>(attr.data.len() as u32)?;
            out.extend_from_slice(&attr.data);
        }
        Ok(out)
    }
}

/// What gets attached to every module descriptor of an archive.
#[derive(Debug, Clone, Default)]
pub struct ModuleExtension {
    pub packages: BTreeSet<String>,
    pub main_class: Option<String>,
    pub version: Option<String>,
    pub resolution: ResolutionFlags,
}

/// Rewrites `bytes` with the package set, optional main class and version,
/// recorded hashes and resolution flags.
pub fn extend(
    bytes: &[u8],
    extension: &ModuleExtension,
    hashes: Option<&ModuleHashes>,
) -> Result<Vec<u8>> {
    let mut info = ModuleInfo::parse(bytes)?;
    info.descriptor()?;

    info.set_packages(&extension.packages)?;
    if let Some(main) = &extension.main_class {
        info.set_main_class(main)?;
    }
    if let Some(version) = &extension.version {
        info.set_version(version)?;
    }
    if let Some(hashes) = hashes {
        info.set_hashes(hashes)?;
    }
    if !extension.resolution.is_empty() {
        info.set_resolution(extension.resolution)?;
    }
    info.to_bytes()
}

/// A module version must start with a digit.
pub fn check_version(version: &str) -> Result<()> {
    match version.chars().next() {
        Some(c) if c.is_ascii_digit() => Ok(()),
        _ => Err(JarError::Configuration(format!(
            "invalid module version: {version}"
        ))),
    }
}

/// Checks that every service provider named by the root descriptor is
/// present in the archive. Problems are reported, never raised.
pub fn check_module_info(bytes: &[u8], entries: &HashSet<String>) -> Vec<Diagnostic> {
    let entry = names::MODULE_INFO;
    let descriptor = match ModuleDescriptor::read(bytes) {
        Ok(d) => d,
        Err(e) => {
            return vec![Diagnostic::error(
                DiagnosticKind::InvalidModuleDescriptor,
                entry,
                e.to_string(),
            )];
        }
    };

    descriptor
        .provides
        .iter()
        .flat_map(|p| p.providers.iter())
        .filter(|provider| !entries.contains(&names::to_binary_entry_name(provider)))
        .map(|provider| {
            Diagnostic::error(
                DiagnosticKind::MissingProvider,
                entry,
                format!("service provider {provider} not found"),
            )
        })
        .collect()
}

fn read_package_directives(
    r: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> std::result::Result<BTreeSet<PackageDirective>, FormatError> {
    let mut out = BTreeSet::new();
    for _ in 0..r.read_u16::<BigEndian>()? {
        let source = dotted(&pool.package_name(r.read_u16::<BigEndian>()?)?);
        let flags = r.read_u16::<BigEndian>()?;
        let mut targets = BTreeSet::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            targets.insert(pool.module_name(r.read_u16::<BigEndian>()?)?);
        }
        out.insert(PackageDirective {
            source,
            flags,
            targets,
        });
    }
    Ok(out)
}

fn read_hashes(data: &[u8], pool: &ConstantPool) -> std::result::Result<ModuleHashes, FormatError> {
    let mut r = Cursor::new(data);
    let algorithm = pool.utf8(r.read_u16::<BigEndian>()?)?;
    let mut hashes = BTreeMap::new();
    for _ in 0..r.read_u16::<BigEndian>()? {
        let module = pool.module_name(r.read_u16::<BigEndian>()?)?;
        let len = r.read_u16::<BigEndian>()? as usize;
        let mut digest = vec![0u8; len];
        r.read_exact(&mut digest)?;
        hashes.insert(module, digest);
    }
    Ok(ModuleHashes { algorithm, hashes })
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn dotted(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}

fn internal(dotted_name: &str) -> String {
    dotted_name.replace('.', "/")
}

fn package_of_class(class_name: &str) -> Option<String> {
    class_name.rfind('.').map(|i| class_name[..i].to_string())
}
