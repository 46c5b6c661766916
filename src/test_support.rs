//! Synthesises minimal class files and module descriptors for tests.
//!
//! Shared between unit tests and `tests/` (included there with `#[path]`),
//! so it only uses crate dependencies, never crate items.
#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use zip::write::{FileOptions, ZipWriter};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh path under the temp dir; nothing is created.
pub fn temp_path(label: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    p.push(format!(
        "mrjar-{label}-{}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis(),
        n
    ));
    p
}

/// A fresh, existing temp directory.
pub fn temp_dir(label: &str) -> PathBuf {
    let dir = temp_path(label);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes `files` (relative `/` paths) below `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, bytes) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }
}

/// Writes a jar holding exactly `entries`, in order.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_MODULE: u16 = 0x8000;
pub const ACC_TRANSITIVE: u16 = 0x0020;
pub const ACC_MANDATED: u16 = 0x8000;

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    count: u16,
    index: HashMap<(u8, Vec<u8>), u16>,
}

impl Pool {
    fn new() -> Self {
        Self {
            count: 1,
            ..Default::default()
        }
    }

    fn add(&mut self, tag: u8, payload: Vec<u8>) -> u16 {
        if let Some(i) = self.index.get(&(tag, payload.clone())) {
            return *i;
        }
        let i = self.count;
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&payload);
        self.count += 1;
        self.index.insert((tag, payload), i);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut payload = Vec::new();
        payload.write_u16::<BigEndian>(s.len() as u16).unwrap();
        payload.extend_from_slice(s.as_bytes());
        self.add(1, payload)
    }

    fn named(&mut self, tag: u8, s: &str) -> u16 {
        let name = self.utf8(s);
        self.add(tag, name.to_be_bytes().to_vec())
    }

    fn class(&mut self, s: &str) -> u16 {
        self.named(7, s)
    }

    fn module(&mut self, s: &str) -> u16 {
        self.named(19, s)
    }

    fn package(&mut self, s: &str) -> u16 {
        self.named(20, s)
    }
}

fn finish(pool: Pool, major: u16, body: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE];
    out.write_u16::<BigEndian>(0).unwrap();
    out.write_u16::<BigEndian>(major).unwrap();
    out.write_u16::<BigEndian>(pool.count).unwrap();
    out.extend_from_slice(&pool.bytes);
    out.extend_from_slice(&body);
    out
}

fn attribute(out: &mut Vec<u8>, pool: &mut Pool, name: &str, data: &[u8]) {
    out.write_u16::<BigEndian>(pool.utf8(name)).unwrap();
    out.write_u32::<BigEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(data);
}

/// A class file with just enough structure for fingerprinting.
#[derive(Clone)]
pub struct ClassFile {
    name: String,
    super_name: Option<String>,
    access: u16,
    major: u16,
    fields: Vec<(u16, String, String)>,
    methods: Vec<(u16, String, String, Vec<String>)>,
    inner_classes: Vec<(String, Option<String>, u16)>,
    enclosing: Option<String>,
}

impl ClassFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            access: ACC_PUBLIC | ACC_SUPER,
            major: 52,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            enclosing: None,
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn major(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn super_class(mut self, name: Option<&str>) -> Self {
        self.super_name = name.map(str::to_string);
        self
    }

    pub fn field(mut self, access: u16, name: &str, desc: &str) -> Self {
        self.fields.push((access, name.to_string(), desc.to_string()));
        self
    }

    pub fn method(mut self, access: u16, name: &str, desc: &str, throws: &[&str]) -> Self {
        self.methods.push((
            access,
            name.to_string(),
            desc.to_string(),
            throws.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Records an InnerClasses entry for `inner` declared in `outer`.
    pub fn inner_class(mut self, inner: &str, outer: Option<&str>, access: u16) -> Self {
        self.inner_classes
            .push((inner.to_string(), outer.map(str::to_string), access));
        self
    }

    pub fn enclosing_class(mut self, owner: &str) -> Self {
        self.enclosing = Some(owner.to_string());
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut pool = Pool::new();
        let mut body = Vec::new();

        let this = pool.class(&self.name);
        let super_index = self.super_name.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        body.write_u16::<BigEndian>(self.access).unwrap();
        body.write_u16::<BigEndian>(this).unwrap();
        body.write_u16::<BigEndian>(super_index).unwrap();
        body.write_u16::<BigEndian>(0).unwrap();

        body.write_u16::<BigEndian>(self.fields.len() as u16).unwrap();
        for (access, name, desc) in &self.fields {
            body.write_u16::<BigEndian>(*access).unwrap();
            body.write_u16::<BigEndian>(pool.utf8(name)).unwrap();
            body.write_u16::<BigEndian>(pool.utf8(desc)).unwrap();
            body.write_u16::<BigEndian>(0).unwrap();
        }

        body.write_u16::<BigEndian>(self.methods.len() as u16).unwrap();
        for (access, name, desc, throws) in &self.methods {
            body.write_u16::<BigEndian>(*access).unwrap();
            body.write_u16::<BigEndian>(pool.utf8(name)).unwrap();
            body.write_u16::<BigEndian>(pool.utf8(desc)).unwrap();
            if throws.is_empty() {
                body.write_u16::<BigEndian>(0).unwrap();
            } else {
                body.write_u16::<BigEndian>(1).unwrap();
                let mut data = Vec::new();
                data.write_u16::<BigEndian>(throws.len() as u16).unwrap();
                for t in throws {
                    data.write_u16::<BigEndian>(pool.class(t)).unwrap();
                }
                attribute(&mut body, &mut pool, "Exceptions", &data);
            }
        }

        let mut attrs = Vec::new();
        let mut attr_count = 0u16;
        if let Some(owner) = &self.enclosing {
            let mut data = Vec::new();
            data.write_u16::<BigEndian>(pool.class(owner)).unwrap();
            data.write_u16::<BigEndian>(0).unwrap();
            attribute(&mut attrs, &mut pool, "EnclosingMethod", &data);
            attr_count += 1;
        }
        if !self.inner_classes.is_empty() {
            let mut data = Vec::new();
            data.write_u16::<BigEndian>(self.inner_classes.len() as u16).unwrap();
            for (inner, outer, access) in &self.inner_classes {
                data.write_u16::<BigEndian>(pool.class(inner)).unwrap();
                let outer_index = outer.as_deref().map(|o| pool.class(o)).unwrap_or(0);
                data.write_u16::<BigEndian>(outer_index).unwrap();
                let simple = inner.rsplit('$').next().unwrap_or(inner);
                data.write_u16::<BigEndian>(pool.utf8(simple)).unwrap();
                data.write_u16::<BigEndian>(*access).unwrap();
            }
            attribute(&mut attrs, &mut pool, "InnerClasses", &data);
            attr_count += 1;
        }
        body.write_u16::<BigEndian>(attr_count).unwrap();
        body.extend_from_slice(&attrs);

        finish(pool, self.major, body)
    }
}

/// A `module-info.class` with the directives the validator compares.
#[derive(Clone, Default)]
pub struct ModuleInfoFile {
    name: String,
    version: Option<String>,
    requires: Vec<(String, u16)>,
    exports: Vec<String>,
    opens: Vec<String>,
    uses: Vec<String>,
    provides: Vec<(String, Vec<String>)>,
    packages: Vec<String>,
    main_class: Option<String>,
}

impl ModuleInfoFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            requires: vec![("java.base".to_string(), ACC_MANDATED)],
            ..Default::default()
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn requires(mut self, module: &str, flags: u16) -> Self {
        self.requires.push((module.to_string(), flags));
        self
    }

    /// Dotted package name.
    pub fn exports(mut self, package: &str) -> Self {
        self.exports.push(package.to_string());
        self
    }

    pub fn opens(mut self, package: &str) -> Self {
        self.opens.push(package.to_string());
        self
    }

    /// Dotted class name.
    pub fn uses(mut self, service: &str) -> Self {
        self.uses.push(service.to_string());
        self
    }

    pub fn provides(mut self, service: &str, providers: &[&str]) -> Self {
        self.provides.push((
            service.to_string(),
            providers.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn packages(mut self, packages: &[&str]) -> Self {
        self.packages = packages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn main_class(mut self, class: &str) -> Self {
        self.main_class = Some(class.to_string());
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let internal = |s: &str| s.replace('.', "/");
        let mut pool = Pool::new();
        let mut body = Vec::new();

        let this = pool.class("module-info");
        body.write_u16::<BigEndian>(ACC_MODULE).unwrap();
        body.write_u16::<BigEndian>(this).unwrap();
        body.write_u16::<BigEndian>(0).unwrap();
        for _ in 0..3 {
            body.write_u16::<BigEndian>(0).unwrap();
        }

        let mut module = Vec::new();
        module.write_u16::<BigEndian>(pool.module(&self.name)).unwrap();
        module.write_u16::<BigEndian>(0).unwrap();
        let version = self.version.as_deref().map(|v| pool.utf8(v)).unwrap_or(0);
        module.write_u16::<BigEndian>(version).unwrap();

        module.write_u16::<BigEndian>(self.requires.len() as u16).unwrap();
        for (name, flags) in &self.requires {
            module.write_u16::<BigEndian>(pool.module(name)).unwrap();
            module.write_u16::<BigEndian>(*flags).unwrap();
            module.write_u16::<BigEndian>(0).unwrap();
        }
        for list in [&self.exports, &self.opens] {
            module.write_u16::<BigEndian>(list.len() as u16).unwrap();
            for package in list {
                module.write_u16::<BigEndian>(pool.package(&internal(package))).unwrap();
                module.write_u16::<BigEndian>(0).unwrap();
                module.write_u16::<BigEndian>(0).unwrap();
            }
        }
        module.write_u16::<BigEndian>(self.uses.len() as u16).unwrap();
        for service in &self.uses {
            module.write_u16::<BigEndian>(pool.class(&internal(service))).unwrap();
        }
        module.write_u16::<BigEndian>(self.provides.len() as u16).unwrap();
        for (service, providers) in &self.provides {
            module.write_u16::<BigEndian>(pool.class(&internal(service))).unwrap();
            module.write_u16::<BigEndian>(providers.len() as u16).unwrap();
            for provider in providers {
                module.write_u16::<BigEndian>(pool.class(&internal(provider))).unwrap();
            }
        }

        let mut attrs = Vec::new();
        let mut count = 1u16;
        attribute(&mut attrs, &mut pool, "Module", &module);
        if !self.packages.is_empty() {
            let mut data = Vec::new();
            data.write_u16::<BigEndian>(self.packages.len() as u16).unwrap();
            for package in &self.packages {
                data.write_u16::<BigEndian>(pool.package(&internal(package))).unwrap();
            }
            attribute(&mut attrs, &mut pool, "ModulePackages", &data);
            count += 1;
        }
        if let Some(main) = &self.main_class {
            let index = pool.class(&internal(main));
            attribute(&mut attrs, &mut pool, "ModuleMainClass", &index.to_be_bytes());
            count += 1;
        }
        body.write_u16::<BigEndian>(count).unwrap();
        body.extend_from_slice(&attrs);

        finish(pool, 53, body)
    }
}
