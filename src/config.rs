use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// What to do with an experiment that passes classification but ends up with
/// zero accepted samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplelessPolicy {
    /// Persist the experiment without samples and report it.
    Load,
    /// Reject the experiment into the "no samples" category.
    Skip,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub downloads_dir: Option<String>,
    #[serde(default)]
    pub reports_dir: Option<String>,
    #[serde(default)]
    pub sample_suffix: Option<String>,
    #[serde(default)]
    pub max_samples: Option<usize>,
    #[serde(default)]
    pub organism_prefix: Option<String>,
    #[serde(default)]
    pub sampleless: Option<SamplelessPolicy>,
    #[serde(default)]
    pub translation_table: Option<String>,
    #[serde(default)]
    pub baseline: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub downloads_dir: Utf8PathBuf,
    pub reports_dir: Utf8PathBuf,
    pub sample_suffix: String,
    pub max_samples: usize,
    pub organism_prefix: String,
    pub sampleless: SamplelessPolicy,
    pub translation_table: Option<Utf8PathBuf>,
    pub baseline: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LoadError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("ht-metaload.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(LoadError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LoadError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LoadError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            downloads_dir: Utf8PathBuf::from(
                config.downloads_dir.unwrap_or_else(|| "downloads".to_string()),
            ),
            reports_dir: Utf8PathBuf::from(
                config.reports_dir.unwrap_or_else(|| "reports".to_string()),
            ),
            sample_suffix: config
                .sample_suffix
                .unwrap_or_else(|| "_family.xml".to_string()),
            max_samples: config.max_samples.unwrap_or(1000),
            organism_prefix: config.organism_prefix.unwrap_or_else(|| "mus".to_string()),
            sampleless: config.sampleless.unwrap_or(SamplelessPolicy::Load),
            translation_table: config.translation_table.map(Utf8PathBuf::from),
            baseline: config.baseline.map(Utf8PathBuf::from),
        }
    }
}
