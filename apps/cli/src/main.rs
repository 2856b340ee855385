//! `mcdoc` — validate datapack JSON against an mcdoc schema pack.
//!
//! The core pipeline (parse → resolve → validate) lives in the `mcdoc-*`
//! library crates and does no I/O; this binary owns file discovery, the
//! file-path → registry heuristic and diagnostic rendering.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use mcdoc_diagnostics::{Diagnostic, Severity};
use mcdoc_resolver::{resolve, Resolution, Version};
use mcdoc_validator::{validate, Start};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "mcdoc",
    about = "Schema checker for Minecraft datapack JSON",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate JSON files against a schema pack.
    Check {
        /// Directory containing the `.mcdoc` schema pack.
        #[arg(short, long)]
        schemas: PathBuf,
        /// Target game version, e.g. 1.20.1.
        #[arg(short = 'v', long, default_value = "1.20.1")]
        game_version: String,
        /// Fully qualified start type (overrides the path heuristic).
        #[arg(long, conflicts_with = "registry")]
        root: Option<String>,
        /// Registry under minecraft:resource, e.g. worldgen/biome
        /// (overrides the path heuristic).
        #[arg(long)]
        registry: Option<String>,
        /// Output format: lines (default) or json.
        #[arg(long, default_value = "lines")]
        output: String,
        /// Report warnings as well as errors.
        #[arg(long, action = ArgAction::SetTrue)]
        warnings: bool,
        /// JSON files to validate.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Parse a schema pack and report syntax errors only.
    Parse {
        /// Directory containing the `.mcdoc` schema pack.
        #[arg(short, long)]
        schemas: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(failed) => {
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Check {
            schemas,
            game_version,
            root,
            registry,
            output,
            warnings,
            files,
        } => run_check(
            &schemas,
            &game_version,
            root.as_deref(),
            registry.as_deref(),
            &output,
            warnings,
            &files,
        ),
        Commands::Parse { schemas } => run_parse(&schemas),
    }
}

/// One validated file in the JSON report.
#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    diagnostics: &'a [Diagnostic],
}

fn run_check(
    schemas: &Path,
    game_version: &str,
    root: Option<&str>,
    registry: Option<&str>,
    output: &str,
    warnings: bool,
    files: &[PathBuf],
) -> Result<bool> {
    let version: Version = game_version
        .parse()
        .with_context(|| format!("invalid game version '{}'", game_version))?;

    let (resolution, parse_diagnostics) = load_schema_pack(schemas)?;
    let mut failed = !parse_diagnostics.is_empty()
        || resolution.diagnostics.iter().any(Diagnostic::is_error);

    // Schema problems are reported once, up front.
    let mut schema_findings: Vec<Diagnostic> = parse_diagnostics;
    schema_findings.extend(resolution.diagnostics.iter().cloned());
    for diagnostic in &schema_findings {
        if diagnostic.is_error() || warnings {
            eprintln!("schema: {}", diagnostic);
        }
    }

    let mut reports: Vec<(String, Vec<Diagnostic>)> = Vec::new();
    for file in files {
        let diagnostics = check_file(&resolution, file, root, registry, version)
            .with_context(|| format!("failed to check {}", file.display()))?;
        failed |= diagnostics.iter().any(Diagnostic::is_error);
        reports.push((file.display().to_string(), diagnostics));
    }

    match output {
        "json" => {
            let report: Vec<FileReport<'_>> = reports
                .iter()
                .map(|(file, diagnostics)| FileReport {
                    file: file.clone(),
                    diagnostics,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "lines" => {
            for (file, diagnostics) in &reports {
                for diagnostic in diagnostics {
                    if diagnostic.severity == Severity::Warning && !warnings {
                        continue;
                    }
                    println!("{} {}", file, diagnostic);
                }
            }
            let checked = reports.len();
            let clean = reports
                .iter()
                .filter(|(_, d)| !d.iter().any(Diagnostic::is_error))
                .count();
            eprintln!("{}/{} file(s) passed", clean, checked);
        }
        other => anyhow::bail!("unsupported output format: {} (use lines or json)", other),
    }

    Ok(failed)
}

fn check_file(
    resolution: &Resolution,
    file: &Path,
    root: Option<&str>,
    registry: Option<&str>,
    version: Version,
) -> Result<Vec<Diagnostic>> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let inferred;
    let start = if let Some(root) = root {
        Start::Type(root)
    } else if let Some(registry) = registry {
        Start::Dispatch {
            resource: "minecraft:resource",
            key: registry,
        }
    } else {
        inferred = infer_registry(file).with_context(|| {
            format!(
                "cannot infer a registry from '{}'; pass --registry or --root",
                file.display()
            )
        })?;
        Start::Dispatch {
            resource: "minecraft:resource",
            key: &inferred,
        }
    };

    Ok(validate(
        &resolution.graph,
        &resolution.dispatchers,
        start,
        &json,
        version,
    ))
}

fn run_parse(schemas: &Path) -> Result<bool> {
    let (_, parse_diagnostics) = load_schema_pack(schemas)?;
    for diagnostic in &parse_diagnostics {
        println!("{}", diagnostic);
    }
    eprintln!("{} syntax error(s)", parse_diagnostics.len());
    Ok(!parse_diagnostics.is_empty())
}

/// Discovers and parses every `.mcdoc` file under `dir`, then resolves the
/// module set. Parse errors come back separately so `parse` can report them
/// without caring about resolution.
fn load_schema_pack(dir: &Path) -> Result<(Resolution, Vec<Diagnostic>)> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "mcdoc")
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    anyhow::ensure!(
        !paths.is_empty(),
        "no .mcdoc files found under {}",
        dir.display()
    );

    let mut source = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        source.push((module_path_for(dir, path), text));
    }

    let mut modules = Vec::new();
    let mut parse_diagnostics = Vec::new();
    for result in mcdoc_syntax::parse_all(source) {
        parse_diagnostics.extend(
            result
                .errors
                .iter()
                .map(|error| error.to_diagnostic(&result.module.path)),
        );
        modules.push(result.module);
    }

    tracing::debug!(modules = modules.len(), "loaded schema pack");
    Ok((resolve(modules), parse_diagnostics))
}

/// `<dir>/java/data/worldgen/biome.mcdoc` → `java::data::worldgen::biome`.
fn module_path_for(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if let Some(last) = segments.last_mut() {
        if let Some(stem) = last.strip_suffix(".mcdoc") {
            *last = stem.to_string();
        }
    }
    segments.join("::")
}

/// Datapack heuristic: `data/<namespace>/<registry…>/<name>.json` names the
/// registry the file belongs to, e.g. `data/foo/worldgen/biome/plains.json`
/// → `worldgen/biome`.
fn infer_registry(file: &Path) -> Option<String> {
    let components: Vec<&str> = file
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    let data_index = components.iter().rposition(|c| *c == "data")?;
    // data, namespace, registry…, file
    let registry = components.get(data_index + 2..components.len() - 1)?;
    if registry.is_empty() {
        return None;
    }
    Some(registry.join("/"))
}
