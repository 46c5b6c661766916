use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JarError>;

#[derive(Debug, Error)]
pub enum JarError {
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip codec failure: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{} : no such file or directory", .0.display())]
    NoSuchFile(PathBuf),

    #[error("malformed versioned entry name: {0}")]
    MalformedVersionedEntry(String),

    #[error("{name}, contains a versioned entry path but --release {version} was given")]
    UnexpectedVersionedEntry { name: String, version: u32 },

    #[error("invalid archive entry name: {0}")]
    InvalidArchiveEntry(String),

    #[error("invalid class file {name}: {reason}")]
    InvalidClassFile { name: String, reason: String },

    #[error("invalid module descriptor: {0}")]
    InvalidModuleDescriptor(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Main-Class is set both by the manifest and by --main-class")]
    AmbiguousMainClass,

    #[error("module resolution failed: {0}")]
    ModuleResolution(String),
}

impl JarError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attaches the offending path to a bare `std::io::Error`.
pub trait IoContext<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| JarError::io(path, e))
    }
}
