use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level weft.json schema.
#[derive(Debug, Deserialize)]
pub struct WeftConfig {
    #[serde(default = "default_version")]
    pub version: String,

    /// Directories scanned when no files are given on the command line.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// File extensions treated as WeftDoc sources.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_sources() -> Vec<String> {
    vec![".".to_string()]
}

fn default_extensions() -> Vec<String> {
    vec!["weft".to_string()]
}

/// Load config from a weft.json file, or return defaults if missing.
pub fn load_config(repo_root: &Path) -> Result<WeftConfig> {
    let config_path = repo_root.join("weft.json");

    if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: WeftConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(config)
    } else {
        Ok(WeftConfig {
            version: default_version(),
            sources: default_sources(),
            extensions: default_extensions(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "version": "1",
            "sources": ["docs", "notebooks"],
            "extensions": ["weft", "rmd"]
        }"#;

        let config: WeftConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.sources, vec!["docs", "notebooks"]);
        assert_eq!(config.extensions, vec!["weft", "rmd"]);
    }

    #[test]
    fn test_defaults() {
        let json = r#"{}"#;
        let config: WeftConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.sources, vec!["."]);
        assert_eq!(config.extensions, vec!["weft"]);
    }
}
