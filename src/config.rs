use regex_lite::Regex;
use std::env;
use std::path::PathBuf;

use crate::module_info::ResolutionFlags;

pub const PLATFORM_PREFIXES_ENV: &str = "MRJAR_PLATFORM_PREFIXES";
pub const DEFAULT_PLATFORM_PREFIXES: &[&str] = &["java.", "jdk."];

/// Settings that do not change between operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Module name prefixes of the platform. A versioned descriptor may add
    /// or drop non-transitive `requires` on these freely.
    pub platform_prefixes: Vec<String>,
    /// Value of the `Created-By` manifest attribute.
    pub created_by: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            platform_prefixes: DEFAULT_PLATFORM_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            created_by: default_created_by(),
        }
    }
}

impl ToolConfig {
    /// Command-line prefixes win, then the environment, then the defaults.
    pub fn resolve(cli_prefixes: &[String]) -> Self {
        Self::resolve_with(cli_prefixes, env::var(PLATFORM_PREFIXES_ENV).ok())
    }

    fn resolve_with(cli_prefixes: &[String], env_value: Option<String>) -> Self {
        let mut config = ToolConfig::default();
        if !cli_prefixes.is_empty() {
            config.platform_prefixes = cli_prefixes.to_vec();
        } else if let Some(value) = env_value {
            let prefixes: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if !prefixes.is_empty() {
                config.platform_prefixes = prefixes;
            }
        }
        config
    }

    pub fn is_platform_module(&self, module_name: &str) -> bool {
        self.platform_prefixes
            .iter()
            .any(|p| module_name.starts_with(p.as_str()))
    }
}

fn default_created_by() -> String {
    format!("{} (mrjar)", env!("CARGO_PKG_VERSION"))
}

/// Per-operation options of create and update.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub store_only: bool,
    pub no_manifest: bool,
    pub preserve_paths: bool,
    pub manifest_file: Option<PathBuf>,
    pub main_class: Option<String>,
    pub module_version: Option<String>,
    pub hash_modules: Option<Regex>,
    pub module_path: Vec<PathBuf>,
    pub resolution: ResolutionFlags,
}

impl BuildOptions {
    /// Module-only options, which need a module descriptor to attach to.
    pub fn has_module_options(&self) -> bool {
        self.module_version.is_some() || self.hash_modules.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_java_and_jdk() {
        let config = ToolConfig::default();
        assert!(config.is_platform_module("java.sql"));
        assert!(config.is_platform_module("jdk.unsupported"));
        assert!(!config.is_platform_module("javax.inject"));
        assert!(config.created_by.ends_with("(mrjar)"));
    }

    #[test]
    fn cli_prefixes_win_over_environment() {
        let config = ToolConfig::resolve_with(&["org.".to_string()], Some("com.".to_string()));
        assert_eq!(config.platform_prefixes, vec!["org."]);
    }

    #[test]
    fn environment_is_comma_separated() {
        let config = ToolConfig::resolve_with(&[], Some("java., jdk., oracle.".to_string()));
        assert_eq!(config.platform_prefixes, vec!["java.", "jdk.", "oracle."]);

        let blank = ToolConfig::resolve_with(&[], Some(" , ".to_string()));
        assert_eq!(blank.platform_prefixes, vec!["java.", "jdk."]);
    }
}
