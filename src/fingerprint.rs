use sha2::{Digest, Sha256};

use crate::classfile::{self, ClassDescriptor};
use crate::error::{JarError, Result};
use crate::names::{self, MODULE_INFO};

/// Byte digest used to decide whether two entries are identical.
pub trait Digester {
    fn digest(&self, bytes: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        Sha256::digest(bytes).to_vec()
    }
}

/// Comparison-ready summary of one archive entry.
#[derive(Debug, Clone)]
pub struct EntryFingerprint {
    entry_name: String,
    basename: String,
    version: u32,
    content_hash: Vec<u8>,
    class: Option<ClassDescriptor>,
}

impl EntryFingerprint {
    pub fn new(entry_name: &str, bytes: &[u8], digester: &dyn Digester) -> Result<Self> {
        let (version, basename) = names::split_versioned(entry_name)?;
        let class = classfile::extract(bytes).map_err(|e| JarError::InvalidClassFile {
            name: entry_name.to_string(),
            reason: e.to_string(),
        })?;
        // the magic and class-file version are left out so a recompile for a
        // newer release with identical content still hashes the same
        let content_hash = match class {
            Some(_) => digester.digest(&bytes[8..]),
            None => digester.digest(bytes),
        };

        Ok(Self {
            entry_name: entry_name.to_string(),
            basename: basename.to_string(),
            version,
            content_hash,
            class,
        })
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn content_hash(&self) -> &[u8] {
        &self.content_hash
    }

    pub fn is_class(&self) -> bool {
        self.class.is_some()
    }

    pub fn is_module_info(&self) -> bool {
        self.basename == MODULE_INFO
    }

    pub fn descriptor(&self) -> Option<&ClassDescriptor> {
        self.class.as_ref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.name.as_str())
    }

    pub fn is_public_class(&self) -> bool {
        self.class.as_ref().is_some_and(|c| c.is_public)
    }

    pub fn is_nested_class(&self) -> bool {
        self.class.as_ref().is_some_and(|c| c.is_nested)
    }

    pub fn outer_class_name(&self) -> Option<&str> {
        self.class.as_ref().and_then(|c| c.outer_class_name.as_deref())
    }

    pub fn major_version(&self) -> u16 {
        self.class.as_ref().map(|c| c.major_version).unwrap_or(0)
    }

    /// The entry basename agrees with the class name it declares.
    pub fn name_matches_class(&self) -> bool {
        match self.class_name() {
            Some(name) => self.basename.strip_suffix(".class") == Some(name),
            None => true,
        }
    }

    pub fn is_identical(&self, other: &EntryFingerprint) -> bool {
        self.content_hash == other.content_hash
    }

    /// A later version may only raise the class-file version.
    pub fn is_compatible_version(&self, other: &EntryFingerprint) -> bool {
        self.major_version() >= other.major_version()
    }

    pub fn is_same_api(&self, other: &EntryFingerprint) -> bool {
        match (&self.class, &other.class) {
            (Some(a), Some(b)) => a.is_same_api(b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn resources_are_not_classes() -> Result<()> {
        let fp = EntryFingerprint::new("p/res.txt", b"CAFE", &Sha256Digester)?;
        assert!(!fp.is_class());
        assert_eq!(fp.version(), 0);
        assert_eq!(fp.basename(), "p/res.txt");
        assert_eq!(fp.content_hash(), Sha256::digest(b"CAFE").as_slice());
        Ok(())
    }

    #[test]
    fn versioned_name_is_split() -> Result<()> {
        let bytes = ClassFile::new("p/C").to_bytes();
        let fp = EntryFingerprint::new("META-INF/versions/11/p/C.class", &bytes, &Sha256Digester)?;
        assert_eq!(fp.version(), 11);
        assert_eq!(fp.basename(), "p/C.class");
        assert_eq!(fp.class_name(), Some("p/C"));
        assert!(fp.name_matches_class());
        Ok(())
    }

    #[test]
    fn malformed_versioned_name_is_rejected() {
        let err = EntryFingerprint::new("META-INF/versions/9C.class", b"x", &Sha256Digester)
            .unwrap_err();
        assert!(matches!(err, JarError::MalformedVersionedEntry(_)));
    }

    #[test]
    fn identical_bytes_are_identical_and_same_api() -> Result<()> {
        let bytes = ClassFile::new("p/C")
            .method(ACC_PUBLIC, "m", "()V", &[])
            .to_bytes();
        let a = EntryFingerprint::new("p/C.class", &bytes, &Sha256Digester)?;
        let b = EntryFingerprint::new("META-INF/versions/9/p/C.class", &bytes, &Sha256Digester)?;
        assert!(a.is_identical(&b));
        assert!(a.is_same_api(&b));
        Ok(())
    }

    #[test]
    fn class_version_bump_keeps_identity_but_orders_versions() -> Result<()> {
        let old = ClassFile::new("p/C").major(52).to_bytes();
        let new = ClassFile::new("p/C").major(53).to_bytes();
        let old = EntryFingerprint::new("p/C.class", &old, &Sha256Digester)?;
        let new = EntryFingerprint::new("META-INF/versions/9/p/C.class", &new, &Sha256Digester)?;
        assert!(new.is_identical(&old));
        assert!(new.is_compatible_version(&old));
        assert!(!old.is_compatible_version(&new));
        Ok(())
    }

    #[test]
    fn digester_can_be_substituted() -> Result<()> {
        struct Constant;
        impl Digester for Constant {
            fn digest(&self, _: &[u8]) -> Vec<u8> {
                vec![0; 20]
            }
        }
        let a = EntryFingerprint::new("a.txt", b"one", &Constant)?;
        let b = EntryFingerprint::new("b.txt", b"two", &Constant)?;
        assert!(a.is_identical(&b));
        assert_eq!(a.content_hash().len(), 20);
        Ok(())
    }

    #[test]
    fn basename_mismatch_is_detected() -> Result<()> {
        let bytes = ClassFile::new("p/Other").to_bytes();
        let fp = EntryFingerprint::new("p/C.class", &bytes, &Sha256Digester)?;
        assert!(!fp.name_matches_class());
        Ok(())
    }
}
