// SPDX-License-Identifier: AGPL-3.0

//! Configuration management for the analysis engine
//!
//! Values come from three places: built-in defaults, an optional `evmcov.toml`, and the
//! command line of whatever tool embeds the engine. Command-line values win over the file.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use evmcov_constants::MIN_CONTRACT_BYTECODE_LENGTH;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "evmcov.toml";

/// Which reports `record_trace` feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageMode {
    #[default]
    Coverage,
    Profile,
    Both,
}

impl CoverageMode {
    pub fn name(&self) -> &'static str {
        match self {
            CoverageMode::Coverage => "coverage",
            CoverageMode::Profile => "profile",
            CoverageMode::Both => "both",
        }
    }

    pub fn collects_coverage(&self) -> bool {
        matches!(self, CoverageMode::Coverage | CoverageMode::Both)
    }

    pub fn collects_profile(&self) -> bool {
        matches!(self, CoverageMode::Profile | CoverageMode::Both)
    }
}

impl fmt::Display for CoverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CoverageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "coverage" => Ok(CoverageMode::Coverage),
            "profile" | "profiler" => Ok(CoverageMode::Profile),
            "both" => Ok(CoverageMode::Both),
            _ => Err(anyhow::anyhow!("Invalid coverage mode: {}", s)),
        }
    }
}

/// Engine configuration, embeddable into a host CLI with `#[command(flatten)]`
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reports to collect from recorded traces
    #[arg(long, value_enum, default_value_t = CoverageMode::Coverage)]
    #[serde(default)]
    pub mode: CoverageMode,

    /// Regexes on source file paths to leave out of the reports (repeatable)
    #[arg(long = "ignore-file", value_name = "REGEX")]
    #[serde(default)]
    pub ignore_files: Vec<String>,

    /// Shortest bytecode (hex chars) an artifact needs to take part in resolution
    #[arg(long, default_value_t = MIN_CONTRACT_BYTECODE_LENGTH)]
    #[serde(default = "default_min_contract_length")]
    pub min_contract_length: usize,

    /// Build source-level stack traces for reverted transactions
    #[arg(long)]
    #[serde(default)]
    pub revert_traces: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    #[serde(default)]
    pub verbose: u8,
}

fn default_min_contract_length() -> usize {
    MIN_CONTRACT_BYTECODE_LENGTH
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: CoverageMode::default(),
            ignore_files: Vec::new(),
            min_contract_length: default_min_contract_length(),
            revert_traces: false,
            verbose: 0,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document with a `[global]` table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: TomlConfig = toml::from_str(content).context("Failed to parse config")?;
        parsed.to_config()
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// `evmcov.toml` under `root`, when present
    pub fn resolve_config_path(root: &Path) -> Option<PathBuf> {
        let default_path = root.join(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    }

    /// Merge with a higher-priority configuration (command line overrides file config)
    pub fn merge(&mut self, other: Self) {
        if other.mode != CoverageMode::default() {
            self.mode = other.mode;
        }
        for pattern in other.ignore_files {
            if !self.ignore_files.contains(&pattern) {
                self.ignore_files.push(pattern);
            }
        }
        if other.min_contract_length != default_min_contract_length() {
            self.min_contract_length = other.min_contract_length;
        }
        if other.revert_traces {
            self.revert_traces = true;
        }
        if other.verbose > 0 {
            self.verbose = other.verbose;
        }
    }

    /// Compile the ignore patterns
    pub fn file_filter(&self) -> Result<FileFilter> {
        let patterns = self
            .ignore_files
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid ignore pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileFilter { patterns })
    }

    /// True when `path` matches one of the ignore patterns
    pub fn ignored(&self, path: &str) -> Result<bool> {
        Ok(self.file_filter()?.ignored(path))
    }
}

/// Compiled form of `ignore_files`
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    patterns: Vec<Regex>,
}

impl FileFilter {
    pub fn ignored(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// TOML configuration structure (for parsing from file)
#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    global: HashMap<String, toml::Value>,
}

impl TomlConfig {
    fn to_config(self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        for (key, value) in self.global {
            // Convert kebab-case to snake_case
            let key = key.replace('-', "_");

            match key.as_str() {
                "mode" => config.mode = parse_toml_string(&value)?.parse()?,
                "ignore_files" | "ignore_file" => config.ignore_files = parse_toml_strings(&value)?,
                "min_contract_length" => config.min_contract_length = parse_toml_usize(&value)?,
                "revert_traces" => config.revert_traces = parse_toml_bool(&value)?,
                "verbose" => config.verbose = parse_toml_u8(&value)?,
                _ => {
                    // Ignore unknown fields (allows forward compatibility)
                }
            }
        }

        Ok(config)
    }
}

// TOML parsing helpers
fn parse_toml_string(value: &toml::Value) -> Result<String> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Expected string, got {:?}", value))
}

/// A single string or an array of strings
fn parse_toml_strings(value: &toml::Value) -> Result<Vec<String>> {
    match value.as_array() {
        Some(items) => items.iter().map(parse_toml_string).collect(),
        None => Ok(vec![parse_toml_string(value)?]),
    }
}

fn parse_toml_bool(value: &toml::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow::anyhow!("Expected bool, got {:?}", value))
}

fn parse_toml_usize(value: &toml::Value) -> Result<usize> {
    value
        .as_integer()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| anyhow::anyhow!("Expected usize, got {:?}", value))
}

fn parse_toml_u8(value: &toml::Value) -> Result<u8> {
    value
        .as_integer()
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| anyhow::anyhow!("Expected u8, got {:?}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        engine: EngineConfig,
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, CoverageMode::Coverage);
        assert_eq!(config.min_contract_length, 88);
        assert!(config.ignore_files.is_empty());
        assert!(!config.revert_traces);
    }

    #[test]
    fn test_cli_defaults_match_default() {
        let cli = Cli::try_parse_from(["evmcov"]).unwrap();
        assert_eq!(cli.engine, EngineConfig::default());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "evmcov",
            "--mode",
            "both",
            "--ignore-file",
            "^test/",
            "--ignore-file",
            "Mock",
            "--revert-traces",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.engine.mode, CoverageMode::Both);
        assert_eq!(cli.engine.ignore_files, vec!["^test/", "Mock"]);
        assert!(cli.engine.revert_traces);
        assert_eq!(cli.engine.verbose, 2);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("profile".parse::<CoverageMode>().unwrap(), CoverageMode::Profile);
        assert_eq!("BOTH".parse::<CoverageMode>().unwrap(), CoverageMode::Both);
        assert!("trace".parse::<CoverageMode>().is_err());
        assert!(CoverageMode::Both.collects_coverage());
        assert!(CoverageMode::Both.collects_profile());
        assert!(!CoverageMode::Profile.collects_coverage());
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(
            r#"
            [global]
            mode = "profile"
            ignore-files = ["^lib/", "\\.t\\.sol$"]
            min-contract-length = 40
            revert_traces = true
            unknown-key = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, CoverageMode::Profile);
        assert_eq!(config.ignore_files.len(), 2);
        assert_eq!(config.min_contract_length, 40);
        assert!(config.revert_traces);
    }

    #[test]
    fn test_from_toml_single_ignore_string() {
        let config = EngineConfig::from_toml_str("[global]\nignore-file = \"Mock\"\n").unwrap();
        assert_eq!(config.ignore_files, vec!["Mock"]);
    }

    #[test]
    fn test_from_toml_bad_type() {
        assert!(EngineConfig::from_toml_str("[global]\nrevert-traces = \"yes\"\n").is_err());
        assert!(EngineConfig::from_toml_str("[global]\nmode = \"fast\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[global]\nmode = \"both\"\nverbose = 3").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, CoverageMode::Both);
        assert_eq!(config.verbose, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(&dir.path().join("nope.toml")).is_err());
        assert!(EngineConfig::resolve_config_path(dir.path()).is_none());
    }

    #[test]
    fn test_resolve_config_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[global]\n").unwrap();
        assert_eq!(
            EngineConfig::resolve_config_path(dir.path()),
            Some(dir.path().join(DEFAULT_CONFIG_FILE))
        );
    }

    #[test]
    fn test_merge_command_line_wins() {
        let mut file_config = EngineConfig {
            mode: CoverageMode::Profile,
            ignore_files: vec!["^lib/".to_string()],
            min_contract_length: 40,
            ..Default::default()
        };
        let cli = EngineConfig {
            mode: CoverageMode::Both,
            ignore_files: vec!["^lib/".to_string(), "Mock".to_string()],
            verbose: 1,
            ..Default::default()
        };
        file_config.merge(cli);

        assert_eq!(file_config.mode, CoverageMode::Both);
        assert_eq!(file_config.ignore_files, vec!["^lib/", "Mock"]);
        // default on the command line leaves the file value alone
        assert_eq!(file_config.min_contract_length, 40);
        assert_eq!(file_config.verbose, 1);
    }

    #[test]
    fn test_ignored() {
        let config = EngineConfig {
            ignore_files: vec!["^test/".to_string(), "Mock\\w*\\.sol$".to_string()],
            ..Default::default()
        };
        assert!(config.ignored("test/Counter.t.sol").unwrap());
        assert!(config.ignored("src/mocks/MockToken.sol").unwrap());
        assert!(!config.ignored("src/Token.sol").unwrap());
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let config = EngineConfig {
            ignore_files: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(config.file_filter().is_err());
    }
}
