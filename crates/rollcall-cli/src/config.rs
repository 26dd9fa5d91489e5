use anyhow::{bail, Context, Result};
use rollcall_core::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration.
///
/// Layered: built-in defaults, then the TOML file (`ROLLCALL_CONFIG`, or
/// `$XDG_CONFIG_HOME/rollcall/config.toml` if it exists), then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance (exclusive) for a positive match.
    pub match_threshold: f32,
    /// Config file that was applied, if any.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load with `var` standing in for the process environment.
    fn load_with(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::defaults_with(&var);

        let (path, required) = match var("ROLLCALL_CONFIG") {
            Some(p) => (PathBuf::from(p), true),
            None => (config_dir(&var).join("rollcall/config.toml"), false),
        };
        if required || path.exists() {
            config.apply_file(&path)?;
        }

        if let Some(p) = var("ROLLCALL_DB_PATH") {
            config.db_path = PathBuf::from(p);
        }
        if let Some(t) = parse_f32(&var, "ROLLCALL_MATCH_THRESHOLD") {
            config.match_threshold = t;
        }

        config.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    fn defaults() -> Self {
        Self::defaults_with(|key| std::env::var(key).ok())
    }

    fn defaults_with(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            db_path: data_dir(&var).join("rollcall/attendance.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            source: None,
        }
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        self.apply_toml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(p) = file.db_path {
            self.db_path = p;
        }
        if let Some(t) = file.match_threshold {
            self.match_threshold = t;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.match_threshold)
    }
}

pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !threshold.is_finite() || threshold <= 0.0 {
        bail!("match threshold must be a positive number, got {threshold}");
    }
    Ok(())
}

fn data_dir(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(&var).join(".local/share"))
}

fn config_dir(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(&var).join(".config"))
}

fn home(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(var("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn parse_f32(var: impl Fn(&str) -> Option<String>, key: &str) -> Option<f32> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable value");
            None
        }
    }
}
