//! `weft check --watch`: re-run checks whenever a source file changes.

use anyhow::Result;
use colored::Colorize;
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Watch the given files, or the configured source directories when
/// none are given, and re-check on each change.
///
/// Debounces rapid events (e.g. editors that write in stages) with a
/// 200ms window. Ctrl+C exits cleanly.
pub fn watch_and_recheck(files: &[String], quiet: bool) -> Result<()> {
    let mut roots: BTreeSet<PathBuf> = BTreeSet::new();
    let mut explicit: BTreeSet<PathBuf> = BTreeSet::new();
    let mut extensions: Vec<String> = Vec::new();

    if files.is_empty() {
        let config = crate::config::load_config(Path::new("."))?;
        extensions = config.extensions;
        for source in &config.sources {
            let dir = Path::new(source);
            if dir.exists() {
                roots.insert(std::fs::canonicalize(dir)?);
            }
        }
    } else {
        for file in files {
            let path = std::fs::canonicalize(file)
                .map_err(|e| anyhow::anyhow!("Cannot resolve path '{}': {}", file, e))?;
            let parent = path
                .parent()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine parent directory of '{}'", file))?
                .to_path_buf();
            roots.insert(parent);
            explicit.insert(path);
        }
    }

    if roots.is_empty() {
        anyhow::bail!("Nothing to watch: no source directories exist");
    }

    // Baseline pass before the first event.
    if let Err(e) = crate::handle_check(files, quiet) {
        eprintln!("{} {}", "Check error:".red().bold(), e);
    }

    if !quiet {
        let watched: Vec<String> = roots.iter().map(|p| p.display().to_string()).collect();
        println!(
            "{} {} for changes (Ctrl+C to stop)",
            "Watching".cyan().bold(),
            watched.join(", ")
        );
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;

    // Explicit files watch their parents flat; configured sources are
    // walked recursively anyway, so watch them recursively too.
    let mode = if explicit.is_empty() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for dir in &roots {
        watcher.watch(dir, mode)?;
    }

    let mut last_check = Instant::now();
    let debounce = Duration::from_millis(200);

    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => {
                let relevant_kind =
                    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                let affects_targets = event.paths.iter().any(|p| {
                    if explicit.is_empty() {
                        p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|ext| extensions.iter().any(|x| x == ext))
                    } else {
                        p.canonicalize().ok().is_some_and(|c| explicit.contains(&c))
                    }
                });

                if relevant_kind && affects_targets && last_check.elapsed() > debounce {
                    // Small delay to let the editor finish writing
                    std::thread::sleep(Duration::from_millis(50));

                    match crate::handle_check(files, quiet) {
                        Ok(_) => {
                            last_check = Instant::now();
                        }
                        Err(e) => {
                            eprintln!("{} {}", "Check error:".red().bold(), e);
                        }
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Keep looping
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}
