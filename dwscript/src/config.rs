//! Evaluator configuration
//!
//! Loaded from the `[eval]` table of a TOML file:
//!
//! ```toml
//! [eval]
//! max_recursion_depth = 512
//! source_file = "main.dws"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum call depth before a call is refused
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1024;

/// Red zone for stacker (128 KB)
pub const DEFAULT_STACK_RED_ZONE: usize = 128 * 1024;

/// Stack segment size allocated when the red zone is hit (4 MB)
pub const DEFAULT_STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum number of nested user-function calls
    pub max_recursion_depth: usize,
    /// File name recorded in call-stack frames
    pub source_file: String,
    pub stack_red_zone: usize,
    pub stack_grow_size: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            source_file: "<script>".to_string(),
            stack_red_zone: DEFAULT_STACK_RED_ZONE,
            stack_grow_size: DEFAULT_STACK_GROW_SIZE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    eval: EvalConfig,
}

impl EvalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.eval)
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&text)?)
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_source_file(mut self, name: impl Into<String>) -> Self {
        self.source_file = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.max_recursion_depth, 1024);
        assert_eq!(config.source_file, "<script>");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EvalConfig::from_toml_str("[eval]\nmax_recursion_depth = 64\n").unwrap();
        assert_eq!(config.max_recursion_depth, 64);
        assert_eq!(config.stack_red_zone, DEFAULT_STACK_RED_ZONE);
    }

    #[test]
    fn test_empty_toml() {
        let config = EvalConfig::from_toml_str("").unwrap();
        assert_eq!(config, EvalConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EvalConfig::from_toml_str("[eval]\nmax_recursion_depth = \"deep\"\n").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EvalConfig::load(Path::new("/nonexistent/dwscript.toml")).unwrap();
        assert_eq!(config, EvalConfig::default());
    }
}
