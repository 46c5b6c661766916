use clap::{Args, Parser, Subcommand, ValueEnum};
use regex_lite::Regex;
use std::path::PathBuf;

use crate::config::BuildOptions;
use crate::error::{JarError, Result};
use crate::expand::{InputPath, InputSet};
use crate::module_info::ResolutionFlags;

/// Lowest release a `--release` group may target.
pub const MIN_RELEASE: u32 = 9;

#[derive(Debug, Clone, Parser)]
#[command(name = "mrjar")]
#[command(about = "Create, update and validate multi-release modular JAR archives")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Log every entry as it is processed.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Module name prefix of the platform; repeatable.
    #[arg(long = "platform-prefix", value_name = "PREFIX", global = true)]
    pub platform_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Create {
        jar: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },
    Update {
        jar: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },
    List {
        jar: PathBuf,

        /// Only entries starting with one of these names.
        #[arg(value_name = "NAME")]
        prefixes: Vec<String>,

        /// Include size and modification time.
        #[arg(short = 'l', long)]
        long: bool,
    },
    DescribeModule {
        jar: PathBuf,

        #[arg(long, value_name = "N")]
        release: Option<u32>,
    },
    Validate {
        jar: PathBuf,
    },
    Index {
        jar: PathBuf,

        /// Jars to index when the root has no Class-Path.
        #[arg(value_name = "JAR")]
        extra: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Store entries without compression.
    #[arg(short = '0', long = "no-compress")]
    pub store_only: bool,

    /// Do not write or keep a manifest.
    #[arg(short = 'M', long)]
    pub no_manifest: bool,

    /// Keep leading `/` and `..` in entry names.
    #[arg(short = 'P', long)]
    pub preserve_paths: bool,

    #[arg(short = 'm', long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    #[arg(short = 'e', long, value_name = "CLASS")]
    pub main_class: Option<String>,

    #[arg(long, value_name = "VERSION")]
    pub module_version: Option<String>,

    /// Record hashes of the modules matching this pattern.
    #[arg(long, value_name = "REGEX")]
    pub hash_modules: Option<String>,

    #[arg(short = 'p', long, value_name = "PATH")]
    pub module_path: Option<String>,

    #[arg(long)]
    pub do_not_resolve_by_default: bool,

    #[arg(long, value_enum, value_name = "REASON")]
    pub warn_if_resolved: Option<WarnReason>,

    /// Files and directories, with `-C DIR FILE` and `--release N` groups.
    #[arg(value_name = "FILE", trailing_var_arg = true, allow_hyphen_values = true)]
    pub inputs: Vec<String>,
}

impl BuildArgs {
    pub fn to_options(&self) -> Result<BuildOptions> {
        let hash_modules = match &self.hash_modules {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                JarError::Configuration(format!("invalid --hash-modules pattern {pattern}: {e}"))
            })?),
            None => None,
        };
        let module_path = self
            .module_path
            .as_deref()
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default();

        let mut resolution = ResolutionFlags::empty();
        if self.do_not_resolve_by_default {
            resolution |= ResolutionFlags::DO_NOT_RESOLVE_BY_DEFAULT;
        }
        if let Some(reason) = self.warn_if_resolved {
            resolution |= reason.flag();
        }

        Ok(BuildOptions {
            store_only: self.store_only,
            no_manifest: self.no_manifest,
            preserve_paths: self.preserve_paths,
            manifest_file: self.manifest.clone(),
            main_class: self.main_class.clone(),
            module_version: self.module_version.clone(),
            hash_modules,
            module_path,
            resolution,
        })
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum WarnReason {
    Deprecated,
    DeprecatedForRemoval,
    Incubating,
}

impl WarnReason {
    pub fn flag(self) -> ResolutionFlags {
        match self {
            WarnReason::Deprecated => ResolutionFlags::WARN_DEPRECATED,
            WarnReason::DeprecatedForRemoval => ResolutionFlags::WARN_DEPRECATED_FOR_REMOVAL,
            WarnReason::Incubating => ResolutionFlags::WARN_INCUBATING,
        }
    }
}

fn parse_release(value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(v) if v >= MIN_RELEASE => Ok(v),
        _ => Err(JarError::Configuration(format!(
            "release {value} not valid, must be {MIN_RELEASE} or later"
        ))),
    }
}

/// Splits raw inputs into release groups. `-C DIR FILE` names `FILE`
/// relative to `DIR`; `--release N` (or `--release=N`) sends everything
/// after it to release `N`. Groups come back in release order, base first.
pub fn parse_input_groups(args: &[String]) -> Result<Vec<InputSet>> {
    let mut sets = vec![InputSet::base(Vec::new())];
    let mut current = 0;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let release = if arg == "--release" {
            let value = iter.next().ok_or_else(|| {
                JarError::Configuration("--release needs a version".to_string())
            })?;
            Some(parse_release(value)?)
        } else if let Some(value) = arg.strip_prefix("--release=") {
            Some(parse_release(value)?)
        } else {
            None
        };
        if let Some(version) = release {
            current = match sets.iter().position(|s| s.version == version) {
                Some(i) => i,
                None => {
                    sets.push(InputSet {
                        version,
                        inputs: Vec::new(),
                    });
                    sets.len() - 1
                }
            };
            continue;
        }

        let input = if arg == "-C" {
            let (Some(dir), Some(file)) = (iter.next(), iter.next()) else {
                return Err(JarError::Configuration(
                    "-C needs a directory and a file".to_string(),
                ));
            };
            InputPath::in_dir(dir, file)
        } else {
            InputPath::new(arg)
        };
        sets[current].inputs.push(input);
    }
    sets.sort_by_key(|s| s.version);
    Ok(sets)
}
