//! # mrjar
//!
//! Builds, updates and validates multi-release modular JAR archives.
//!
//! ## Architecture
//!
//! - **names**: Entry-name normalization and versioned-name handling
//! - **ordering**: Comparator that visits base entries, then releases in numeric order
//! - **constant_pool**: Class-file constant pool reading and writing
//! - **classfile**: Public API summary of a class file
//! - **fingerprint**: Per-entry digest and class summary used for comparisons
//! - **manifest**: JAR manifest parsing, merging and writing
//! - **module_info**: Module descriptor reading and extension
//! - **hashes**: Module-path scanning, resolution and recorded module hashes
//! - **expand**: Turning command inputs into archive entries
//! - **writer**: Entry emission over the zip codec
//! - **builder**: Writing a new archive
//! - **updater**: Rewriting an existing archive with new entries
//! - **index**: `META-INF/INDEX.LIST` generation
//! - **validator**: Multi-release consistency checks
//! - **describe**: Module description output
//! - **probe**: Read-side archive helpers
//! - **archive**: Temp-file, validate and swap around whole operations
//! - **config**: Tool configuration resolved from flags and environment

pub mod archive;
pub mod builder;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod constant_pool;
pub mod describe;
pub mod error;
pub mod expand;
pub mod fingerprint;
pub mod hashes;
pub mod index;
pub mod manifest;
pub mod module_info;
pub mod names;
pub mod ordering;
pub mod probe;
pub mod updater;
pub mod validator;
pub mod writer;

#[cfg(test)]
mod test_support;
