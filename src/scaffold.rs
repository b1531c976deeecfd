use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

use weft_codec::{ContentNode, Document, FrontMatter, NodeId, NodeKind, Run};

const DEFAULT_CONFIG: &str = r#"{
  "version": "1",
  "sources": ["."],
  "extensions": ["weft"]
}
"#;

/// Scaffold a starter document at the given path, plus a default
/// weft.json next to it when none exists.
pub fn new_document(path: &str, title: Option<&str>, quiet: bool) -> Result<()> {
    let mut target = PathBuf::from(path);
    if target.extension().is_none() {
        target.set_extension("weft");
    }
    if target.exists() {
        bail!("'{}' already exists", target.display());
    }

    let stem = target
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let title = title.unwrap_or(&stem);

    // Built as a tree and rendered, so the starter is canonical by
    // construction.
    let document = starter_document(title);
    let content = document
        .to_source()
        .content
        .ok_or_else(|| anyhow::anyhow!("Starter document failed to render"))?;

    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create '{}'", parent.display()))?;

    fs::write(&target, &content)
        .with_context(|| format!("Failed to write '{}'", target.display()))?;
    if !quiet {
        println!("  {} {}", "Created".green(), target.display());
    }

    let config_path = parent.join("weft.json");
    if !config_path.exists() {
        fs::write(&config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write '{}'", config_path.display()))?;
        if !quiet {
            println!("  {} {}", "Created".green(), config_path.display());
        }
    }

    if !quiet {
        println!();
        println!("{}", "Done! Next steps:".bold());
        println!("  1. Edit {} with your prose and chunks", target.display());
        println!("  2. Run `weft check` before committing");
    }

    Ok(())
}

fn starter_document(title: &str) -> Document {
    let metadata = FrontMatter {
        title: Some(title.to_string()),
        ..Default::default()
    };

    Document {
        metadata,
        children: vec![
            ContentNode::new(
                NodeId(0),
                NodeKind::Heading {
                    level: 1,
                    text: vec![Run::Text(title.to_string())],
                },
            ),
            ContentNode::new(
                NodeId(1),
                NodeKind::Paragraph {
                    text: vec![Run::Text(
                        "Describe the analysis here, then run it below.".to_string(),
                    )],
                },
            ),
            ContentNode::new(
                NodeId(2),
                NodeKind::CodeBlock {
                    language: Some("r".to_string()),
                    label: Some("setup".to_string()),
                    options: vec![("echo".to_string(), "TRUE".to_string())],
                    executable: true,
                    code: "# load packages here".to_string(),
                },
            ),
        ],
    }
}
