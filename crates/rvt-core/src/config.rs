use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rvt_diff::DiffConfig;
use rvt_store::DEFAULT_MAX_PIECES;

use crate::error::{CoreError, CoreResult};

/// Engine tuning knobs. Missing keys take their defaults.
///
/// ```toml
/// consolidate_depth = 32
/// max_pieces = 4096
///
/// [diff]
/// block_size = 32
/// min_block_size = 4
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Flatten a draft head once its lookup depth exceeds this.
    pub consolidate_depth: u32,
    /// Piece budget before consolidation collapses to a single leaf.
    pub max_pieces: usize,
    pub diff: DiffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consolidate_depth: 32,
            max_pieces: DEFAULT_MAX_PIECES,
            diff: DiffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CoreError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    fn check(&self) -> CoreResult<()> {
        if self.diff.min_block_size == 0 {
            return Err(CoreError::Config("diff.min_block_size must be at least 1".into()));
        }
        if self.diff.block_size < self.diff.min_block_size {
            return Err(CoreError::Config(format!(
                "diff.block_size {} is below diff.min_block_size {}",
                self.diff.block_size, self.diff.min_block_size
            )));
        }
        if self.max_pieces == 0 {
            return Err(CoreError::Config("max_pieces must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.consolidate_depth, 32);
        assert_eq!(config.max_pieces, 4096);
        assert_eq!(config.diff.block_size, 32);
        assert_eq!(config.diff.min_block_size, 4);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            consolidate_depth = 8

            [diff]
            block_size = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.consolidate_depth, 8);
        assert_eq!(config.max_pieces, 4096);
        assert_eq!(config.diff.block_size, 64);
        assert_eq!(config.diff.min_block_size, 4);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("max_pieces = 0").is_err());
        assert!(EngineConfig::from_toml_str("[diff]\nblock_size = 2").is_err());
        assert!(EngineConfig::from_toml_str("consolidate_depth = \"deep\"").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.diff.max_bucket_scan = 3;
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_pieces = 16").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_pieces, 16);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
