use anyhow::{Context, Result};
use clap::Parser;
use mrjar::archive::{self, Outcome};
use mrjar::cli::{self, Cli, Commands, OutputFormat};
use mrjar::config::ToolConfig;
use mrjar::describe;
use mrjar::probe::{self, EntryInfo};
use mrjar::validator::ValidationReport;
use serde::Serialize;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = ToolConfig::resolve(&cli.platform_prefixes);

    let ok = match cli.command.clone() {
        Commands::Create { jar, build } => {
            let sets = cli::parse_input_groups(&build.inputs)?;
            let options = build.to_options()?;
            let outcome = archive::create_jar(&jar, &sets, &options, &config)
                .with_context(|| format!("failed to create {}", jar.display()))?;
            write_outcome(&outcome, cli.format)?
        }
        Commands::Update { jar, build } => {
            let sets = cli::parse_input_groups(&build.inputs)?;
            let options = build.to_options()?;
            let outcome = archive::update_jar(&jar, &sets, &options, &config)
                .with_context(|| format!("failed to update {}", jar.display()))?;
            write_outcome(&outcome, cli.format)?
        }
        Commands::Index { jar, extra } => {
            let outcome = archive::generate_index(&jar, &extra, &config)
                .with_context(|| format!("failed to index {}", jar.display()))?;
            write_outcome(&outcome, cli.format)?
        }
        Commands::Validate { jar } => {
            let report = archive::validate_jar(&jar, &config)
                .with_context(|| format!("failed to validate {}", jar.display()))?;
            write_report(&report, &jar, cli.format)?
        }
        Commands::List {
            jar,
            prefixes,
            long,
        } => {
            let entries = probe::list_entries(&jar, &prefixes)
                .with_context(|| format!("failed to list {}", jar.display()))?;
            write_listing(&entries, long, cli.format)?;
            true
        }
        Commands::DescribeModule { jar, release } => {
            let text = describe::describe_module(&jar, release)
                .with_context(|| format!("failed to describe {}", jar.display()))?;
            write_description(&text, cli.format)?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_outcome(outcome: &Outcome, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => print_json(outcome)?,
        OutputFormat::Text => {
            for diagnostic in &outcome.diagnostics {
                println!("{diagnostic}");
            }
            if !outcome.ok {
                println!("{} not written", outcome.archive);
            }
        }
    }
    Ok(outcome.ok)
}

fn write_report(report: &ValidationReport, jar: &Path, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Text => {
            for diagnostic in &report.diagnostics {
                println!("{diagnostic}");
            }
            let verdict = if report.valid { "valid" } else { "invalid" };
            println!("{}: {verdict}", jar.display());
        }
    }
    Ok(report.valid)
}

fn write_listing(entries: &[EntryInfo], long: bool, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            for entry in entries {
                if long {
                    println!("{:>6} {} {}", entry.size, entry.modified, entry.name);
                } else {
                    println!("{}", entry.name);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Description<'a> {
    description: &'a str,
}

fn write_description(text: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&Description { description: text }),
        OutputFormat::Text => {
            print!("{text}");
            Ok(())
        }
    }
}
