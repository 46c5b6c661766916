//! JAR manifest reading, merging and writing.
//!
//! Lines are wrapped at 72 bytes with single-space continuation lines.
//! Attribute names compare case-insensitively; the main section comes first
//! and each further section starts with a `Name:` attribute.

use crate::error::{JarError, Result};

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const CREATED_BY: &str = "Created-By";
pub const MAIN_CLASS: &str = "Main-Class";
pub const MULTI_RELEASE: &str = "Multi-Release";
pub const CLASS_PATH: &str = "Class-Path";
pub const DEFAULT_MANIFEST_VERSION: &str = "1.0";

const MAX_LINE: usize = 72;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or replaces; a replaced attribute keeps its position.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn merge(&mut self, other: &Attributes) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    sections: Vec<(String, Attributes)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| JarError::InvalidManifest(format!("not UTF-8: {e}")))?;

        let mut manifest = Manifest::new();
        let mut current: Option<(String, Attributes)> = None;
        let mut in_main = true;
        let mut pending: Option<(String, String)> = None;

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix(' ') {
                match pending.as_mut() {
                    Some((_, value)) => value.push_str(rest),
                    None => {
                        return Err(JarError::InvalidManifest(
                            "continuation line without a header".to_string(),
                        ));
                    }
                }
                continue;
            }

            if let Some((k, v)) = pending.take() {
                manifest.put(&mut current, in_main, k, v);
            }

            if line.is_empty() {
                if let Some(section) = current.take() {
                    manifest.push_section(section);
                }
                in_main = false;
                continue;
            }

            let (name, value) = line.split_once(": ").ok_or_else(|| {
                JarError::InvalidManifest(format!("invalid header line: {line}"))
            })?;
            pending = Some((name.to_string(), value.to_string()));
        }

        if let Some((k, v)) = pending.take() {
            manifest.put(&mut current, in_main, k, v);
        }
        if let Some(section) = current.take() {
            manifest.push_section(section);
        }
        Ok(manifest)
    }

    fn put(
        &mut self,
        current: &mut Option<(String, Attributes)>,
        in_main: bool,
        name: String,
        value: String,
    ) {
        if in_main {
            self.main.insert(&name, &value);
            return;
        }
        match current {
            Some((_, attrs)) => attrs.insert(&name, &value),
            None if name.eq_ignore_ascii_case("Name") => {
                *current = Some((value, Attributes::default()));
            }
            // attributes before a Name: header in a later section are dropped
            None => {}
        }
    }

    fn push_section(&mut self, (name, attrs): (String, Attributes)) {
        match self.sections.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.merge(&attrs),
            None => self.sections.push((name, attrs)),
        }
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.main
    }

    pub fn section(&self, name: &str) -> Option<&Attributes> {
        self.sections.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    /// Reads `other` on top of this manifest: its values win.
    pub fn merge(&mut self, other: &Manifest) {
        self.main.merge(&other.main);
        for section in &other.sections {
            self.push_section(section.clone());
        }
    }

    pub fn main_class(&self) -> Option<&str> {
        self.main.get(MAIN_CLASS)
    }

    /// Adds `Manifest-Version` and `Created-By` unless already present.
    pub fn ensure_defaults(&mut self, created_by: &str) {
        if !self.main.contains(MANIFEST_VERSION) {
            self.main.insert(MANIFEST_VERSION, DEFAULT_MANIFEST_VERSION);
        }
        if !self.main.contains(CREATED_BY) {
            self.main.insert(CREATED_BY, created_by);
        }
    }

    pub fn set_main_class(&mut self, class_name: &str) {
        self.main.insert(MAIN_CLASS, class_name);
    }

    pub fn set_multi_release(&mut self) {
        self.main.insert(MULTI_RELEASE, "true");
    }

    pub fn is_multi_release(&self) -> bool {
        self.main
            .get(MULTI_RELEASE)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        if let Some(version) = self.main.get(MANIFEST_VERSION) {
            write_header(&mut out, MANIFEST_VERSION, version);
            for (k, v) in self.main.iter() {
                if !k.eq_ignore_ascii_case(MANIFEST_VERSION) {
                    write_header(&mut out, k, v);
                }
            }
        }
        out.push_str("\r\n");

        for (name, attrs) in &self.sections {
            write_header(&mut out, "Name", name);
            for (k, v) in attrs.iter() {
                write_header(&mut out, k, v);
            }
            out.push_str("\r\n");
        }
        out.into_bytes()
    }
}

fn write_header(out: &mut String, name: &str, value: &str) {
    let line = format!("{name}: {value}");
    let mut rest = line.as_str();
    let mut limit = MAX_LINE;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        // continuation lines carry a leading space
        limit = MAX_LINE - 1;
    }
}
