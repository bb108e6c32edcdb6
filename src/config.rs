use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use strata_world::{ConfigError, TaggedSimilarity, TerrainSettings};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/strata.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub seed: u64,
    pub terrain: TerrainSettings,
    /// Weights for biome-aware blending.
    pub similarity: TaggedSimilarity,
    pub region: RegionConfig,
    pub output: OutputConfig,
}

/// Inclusive chunk rectangle generated by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegionConfig {
    pub min_chunk: [i32; 2],
    pub max_chunk: [i32; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Metrics report written after a run.
    pub metrics: Option<PathBuf>,
    /// Newline-delimited JSON event log, one line per chunk.
    pub events: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            terrain: TerrainSettings::default(),
            similarity: TaggedSimilarity::default(),
            region: RegionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            min_chunk: [-2, -2],
            max_chunk: [2, 2],
        }
    }
}

impl RegionConfig {
    pub fn chunk_count(&self) -> usize {
        let w = (self.max_chunk[0] - self.min_chunk[0] + 1).max(0) as usize;
        let d = (self.max_chunk[1] - self.min_chunk[1] + 1).max(0) as usize;
        w * d
    }
}

impl GenerationConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        let cfg = match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<GenerationConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    return GenerationConfig::default();
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!(
                        "Generation config not found at {}. Using defaults",
                        path.display()
                    );
                }
                return GenerationConfig::default();
            }
        };
        match cfg.validate() {
            Ok(()) => cfg,
            Err(err) => {
                warn!("Invalid config {}: {err}. Using defaults", path.display());
                GenerationConfig::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.terrain.validate()?;
        for (field, value) in [
            ("similarity.same", self.similarity.same),
            ("similarity.ocean_land", self.similarity.ocean_land),
            ("similarity.bridge", self.similarity.bridge),
            ("similarity.default", self.similarity.default),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    generator: "config",
                    field,
                    value,
                    expected: "0..=1",
                });
            }
        }
        if self.region.chunk_count() == 0 {
            return Err(ConfigError::OutOfRange {
                generator: "config",
                field: "region",
                value: 0.0,
                expected: "at least one chunk",
            });
        }
        Ok(())
    }

    /// Save configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }
}
