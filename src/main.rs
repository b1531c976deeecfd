use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use weft_codec::{Diagnostic, Severity};

mod config;
mod scaffold;
mod watch;

#[derive(Parser)]
#[command(name = "weft", version, about = "CLI for WeftDoc literate documents")]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check WeftDoc file(s) for errors and warnings
    Check {
        /// Files to check (default: discovered via weft.json)
        files: Vec<String>,

        /// Re-check whenever a source file changes
        #[arg(long)]
        watch: bool,
    },

    /// Reformat a WeftDoc file to canonical form
    Fmt {
        /// Path to the .weft file
        file: String,

        /// Rewrite the file in place instead of printing
        #[arg(long)]
        write: bool,

        /// Exit non-zero if the file is not already canonical
        #[arg(long, conflicts_with = "write")]
        check: bool,
    },

    /// Print the content tree of a file as JSON
    Tree {
        /// Path to the .weft file
        file: String,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// List the executable code chunks in a file
    Chunks {
        /// Path to the .weft file
        file: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Scaffold a new WeftDoc document
    New {
        /// Path of the document to create (`.weft` is appended if bare)
        path: String,

        /// Front matter title (default: derived from the file name)
        #[arg(long)]
        title: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { files, watch } => {
            if watch {
                watch::watch_and_recheck(&files, cli.quiet)?;
            } else if handle_check(&files, cli.quiet)? {
                std::process::exit(1);
            }
        }
        Commands::Fmt { file, write, check } => {
            handle_fmt(&file, write, check, cli.quiet)?;
        }
        Commands::Tree { file, pretty } => {
            handle_tree(&file, pretty)?;
        }
        Commands::Chunks { file, json } => {
            handle_chunks(&file, json)?;
        }
        Commands::New { path, title } => {
            scaffold::new_document(&path, title.as_deref(), cli.quiet)?;
        }
    }

    Ok(())
}

/// Check every target and report diagnostics to stdout. Returns whether
/// any file had errors; the caller decides the exit code so watch mode
/// can keep running.
pub(crate) fn handle_check(files: &[String], quiet: bool) -> Result<bool> {
    let targets = resolve_targets(files)?;

    if targets.is_empty() {
        if !quiet {
            println!("{}", "No WeftDoc files found".yellow());
        }
        return Ok(false);
    }

    let mut has_errors = false;

    for path in &targets {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", display, e))?;

        let result = weft_codec::parse(&content);

        if result.errors.is_empty() && result.warnings.is_empty() {
            if !quiet {
                println!("{}: {}", display, "OK".green());
            }
            continue;
        }

        for diag in result.errors.iter().chain(result.warnings.iter()) {
            let severity_str = match diag.severity {
                Severity::Error => {
                    has_errors = true;
                    format!("{}", "error".red().bold())
                }
                Severity::Warning => {
                    format!("{}", "warning".yellow().bold())
                }
            };

            let line_info = match diag.span {
                Some(span) => format!("{}:{}", display, span.start_line),
                None => display.clone(),
            };

            println!("{line_info}: {severity_str}: [{}] {}", diag.code(), diag.message);
        }
    }

    Ok(has_errors)
}

fn handle_fmt(file: &str, write: bool, check: bool, quiet: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", file, e))?;

    let result = weft_codec::parse(&content);
    report_stderr(file, result.errors.iter().chain(result.warnings.iter()));
    let Some(document) = result.document else {
        std::process::exit(1);
    };

    let rendered = document.to_source();
    report_stderr(file, rendered.errors.iter());
    let Some(canonical) = rendered.content else {
        std::process::exit(1);
    };

    if check {
        if canonical == content {
            if !quiet {
                println!("{}: {}", file, "formatted".green());
            }
        } else {
            println!("{}: {}", file, "needs formatting".red());
            std::process::exit(1);
        }
    } else if write {
        if canonical != content {
            std::fs::write(file, &canonical)
                .map_err(|e| anyhow::anyhow!("Failed to write '{}': {}", file, e))?;
        }
        if !quiet {
            println!("{} {}", "Formatted".green().bold(), file);
        }
    } else {
        // stdout carries the artifact; diagnostics went to stderr
        print!("{canonical}");
    }

    Ok(())
}

fn handle_tree(file: &str, pretty: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", file, e))?;

    let result = weft_codec::parse(&content);
    report_stderr(file, result.errors.iter());
    if result.document.is_none() {
        std::process::exit(1);
    }

    let payload = serde_json::json!({
        "document": result.document,
        "metadata": result.metadata,
        "warnings": result.warnings,
    });
    let output = if pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };
    println!("{output}");

    Ok(())
}

fn handle_chunks(file: &str, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", file, e))?;

    let result = weft_codec::parse(&content);
    report_stderr(file, result.errors.iter());
    if result.document.is_none() {
        std::process::exit(1);
    }
    let chunks = &result.metadata.code_chunks;

    if json {
        println!("{}", serde_json::to_string_pretty(chunks)?);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("no code chunks");
        return Ok(());
    }

    let rows: Vec<[String; 4]> = chunks
        .iter()
        .map(|c| {
            [
                c.label.clone().unwrap_or_else(|| "-".to_string()),
                c.engine.clone(),
                format!("{}-{}", c.source_range.start_line, c.source_range.end_line),
                c.options
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            ]
        })
        .collect();

    let width = |i: usize, head: &str| {
        rows.iter()
            .map(|r| r[i].len())
            .max()
            .unwrap_or(0)
            .max(head.len())
    };
    let label_w = width(0, "LABEL");
    let engine_w = width(1, "ENGINE");
    let lines_w = width(2, "LINES");

    let header = format!(
        "{:<label_w$}  {:<engine_w$}  {:<lines_w$}  OPTIONS",
        "LABEL", "ENGINE", "LINES"
    );
    println!("{}", header.dimmed());
    for [label, engine, lines, options] in &rows {
        println!("{label:<label_w$}  {engine:<engine_w$}  {lines:<lines_w$}  {options}");
    }

    Ok(())
}

/// Print diagnostics to stderr, keeping stdout free for command output.
fn report_stderr<'a, I>(file: &str, diagnostics: I)
where
    I: IntoIterator<Item = &'a Diagnostic>,
{
    for diag in diagnostics {
        let line_info = match diag.span {
            Some(span) => format!("{}:{}", file, span.start_line),
            None => file.to_string(),
        };
        eprintln!("{}: [{}] {}", line_info, diag.code(), diag.message);
    }
}

/// Explicit arguments, or every matching file under the configured
/// source directories.
fn resolve_targets(files: &[String]) -> Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files.iter().map(PathBuf::from).collect());
    }

    let config = config::load_config(Path::new("."))?;
    let mut targets = Vec::new();

    for source in &config.sources {
        let dir = Path::new(source);
        if !dir.exists() {
            continue;
        }
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && matches_extension(entry.path(), &config.extensions) {
                targets.push(entry.into_path());
            }
        }
    }

    Ok(targets)
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x == ext))
}
