//! Archive entry naming rules.
//!
//! Entry names are always `/` separated. Versioned overlays live under
//! `META-INF/versions/<N>/` and the module descriptor may appear at the root
//! or under any versioned prefix.

use crate::error::{JarError, Result};

pub const MANIFEST_DIR: &str = "META-INF/";
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
pub const INDEX_NAME: &str = "META-INF/INDEX.LIST";
pub const VERSIONS_DIR: &str = "META-INF/versions/";
pub const MODULE_INFO: &str = "module-info.class";
pub const BASE_VERSION: u32 = 0;

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null", "_",
];

/// Strips leading `/`, any `../` components and (on Windows) drive letters,
/// unless `preserve` is set.
pub fn safe_name(name: &str, preserve: bool) -> String {
    if preserve {
        return name.to_string();
    }

    let bytes = name.as_bytes();
    let len = bytes.len();
    let mut i = name.rfind("../").map(|i| i + 3).unwrap_or(0);

    if cfg!(windows) {
        loop {
            let off = i;
            if i + 1 < len && bytes[i + 1] == b':' && bytes[i].is_ascii_alphabetic() {
                i += 2;
            }
            while i < len && bytes[i] == b'/' {
                i += 1;
            }
            if i == off {
                break;
            }
        }
    } else {
        while i < len && bytes[i] == b'/' {
            i += 1;
        }
    }

    name[i..].to_string()
}

/// Turns a `/` separated relative path into an archive entry name.
pub fn to_entry_name(path: &str, is_dir: bool, preserve: bool) -> String {
    let mut name = path.replace('\\', "/");
    if is_dir && !name.ends_with('/') {
        name.push('/');
    }
    let name = safe_name(&name, preserve);
    match name.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => name,
    }
}

pub fn to_versioned_name(name: &str, version: u32) -> String {
    if version > BASE_VERSION {
        format!("{VERSIONS_DIR}{version}/{name}")
    } else {
        name.to_string()
    }
}

/// Splits an entry name into `(version, basename)`; base entries report
/// version 0 and their own name.
pub fn split_versioned(name: &str) -> Result<(u32, &str)> {
    let Some(rest) = name.strip_prefix(VERSIONS_DIR) else {
        return Ok((BASE_VERSION, name));
    };

    let malformed = || JarError::MalformedVersionedEntry(name.to_string());
    let slash = rest.find('/').ok_or_else(malformed)?;
    let digits = &rest[..slash];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let version = digits.parse::<u32>().map_err(|_| malformed())?;
    let basename = &rest[slash + 1..];
    if basename.is_empty() {
        return Err(malformed());
    }
    Ok((version, basename))
}

/// True for `module-info.class` at the root or directly under
/// `META-INF/versions/<digits>/`.
pub fn is_module_info_entry(name: &str) -> bool {
    let Some(prefix) = name.strip_suffix(MODULE_INFO) else {
        return false;
    };
    if prefix.is_empty() {
        return true;
    }
    let Some(version) = prefix.strip_prefix(VERSIONS_DIR) else {
        return false;
    };
    let Some(digits) = version.strip_suffix('/') else {
        return false;
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_manifest_entry(name: &str) -> bool {
    name.eq_ignore_ascii_case(MANIFEST_NAME)
}

pub fn is_index_entry(name: &str) -> bool {
    name.eq_ignore_ascii_case(INDEX_NAME)
}

pub fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
}

/// Dotted package name of an entry path, empty for root-level entries.
pub fn package_name(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => path[..i].replace('/', "."),
        None => String::new(),
    }
}

/// Package of a class or resource entry, with any versioned prefix removed.
/// Returns `None` for unnamed packages and for versioned names whose version
/// segment is not numeric.
pub fn package_of_entry(name: &str) -> Option<String> {
    let path = if name.starts_with(VERSIONS_DIR) {
        match split_versioned(name) {
            Ok((_, basename)) => basename,
            Err(_) => {
                log::warn!("unexpected versioned entry {name}, not added to module packages");
                return None;
            }
        }
    } else {
        name
    };

    let package = package_name(path);
    is_package_name(&package).then_some(package)
}

pub fn is_package_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_java_identifier)
}

fn is_java_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return false;
    }
    !JAVA_KEYWORDS.contains(&segment)
}

/// `p.q.Impl` -> `p/q/Impl.class`
pub fn to_binary_entry_name(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}
