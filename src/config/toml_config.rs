use crate::core::coastline::{DEFAULT_OVERPASS_TIMEOUT_SECS, DEFAULT_OVERPASS_URL};
use crate::core::geometry::DEFAULT_REFERENCE_LONGITUDE;
use crate::core::split::{DEFAULT_HOLDOUT_FRACTION, DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use crate::core::{DatasetConfigProvider, MaskConfigProvider};
use crate::domain::model::{MaskTarget, DEFAULT_SHIP_CLASSES};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_fraction, validate_non_empty_string, validate_path,
    validate_range, validate_required_field, validate_unique, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub dataset: Option<DatasetSection>,
    pub mask: Option<MaskSection>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// `[dataset]`: COCO dataset build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSection {
    pub source_dir: String,
    pub export_dir: String,
    pub classes: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub holdout_fraction: Option<f64>,
    pub test_fraction: Option<f64>,
    pub archive: Option<bool>,
    pub show_progress: Option<bool>,
}

/// `[mask]`: coastline masking of one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskSection {
    pub image: String,
    pub aoi: String,
    pub output: String,
    pub target: Option<MaskTarget>,
    pub reference_longitude: Option<f64>,
    pub coastline_file: Option<String>,
    pub overpass_url: Option<String>,
    pub overpass_timeout_secs: Option<u64>,
    pub show_progress: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_format: Option<String>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        if self.dataset.is_none() && self.mask.is_none() {
            return Err(EtlError::ConfigValidationError {
                field: "pipeline".to_string(),
                message: "configure at least one of [dataset] or [mask]".to_string(),
            });
        }
        if let Some(dataset) = &self.dataset {
            dataset.validate()?;
        }
        if let Some(mask) = &self.mask {
            mask.validate()?;
        }
        if let Some(format) = self.monitoring.as_ref().and_then(|m| m.log_format.as_deref()) {
            if !matches!(format, "text" | "json") {
                return Err(EtlError::InvalidConfigValueError {
                    field: "monitoring.log_format".to_string(),
                    value: format.to_string(),
                    reason: "Valid formats: text, json".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn dataset(&self) -> Result<&DatasetSection> {
        validate_required_field("dataset", &self.dataset)
    }

    pub fn mask(&self) -> Result<&MaskSection> {
        validate_required_field("mask", &self.mask)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_format(&self) -> &str {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format.as_deref())
            .unwrap_or("text")
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

impl DatasetConfigProvider for DatasetSection {
    fn source_dir(&self) -> &str {
        &self.source_dir
    }

    fn export_dir(&self) -> &str {
        &self.export_dir
    }

    fn classes(&self) -> Vec<String> {
        match &self.classes {
            Some(classes) if !classes.is_empty() => {
                classes.iter().map(|c| c.trim().to_lowercase()).collect()
            }
            _ => DEFAULT_SHIP_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    fn holdout_fraction(&self) -> f64 {
        self.holdout_fraction.unwrap_or(DEFAULT_HOLDOUT_FRACTION)
    }

    fn test_fraction(&self) -> f64 {
        self.test_fraction.unwrap_or(DEFAULT_TEST_FRACTION)
    }

    fn write_archive(&self) -> bool {
        self.archive.unwrap_or(false)
    }

    fn show_progress(&self) -> bool {
        self.show_progress.unwrap_or(true)
    }
}

impl Validate for DatasetSection {
    fn validate(&self) -> Result<()> {
        validate_path("dataset.source_dir", &self.source_dir)?;
        validate_path("dataset.export_dir", &self.export_dir)?;
        let classes = self.classes();
        for class in &classes {
            validate_non_empty_string("dataset.classes", class)?;
        }
        validate_unique("dataset.classes", &classes)?;
        validate_fraction("dataset.holdout_fraction", self.holdout_fraction())?;
        validate_fraction("dataset.test_fraction", self.test_fraction())?;
        Ok(())
    }
}

impl MaskConfigProvider for MaskSection {
    fn image_path(&self) -> &str {
        &self.image
    }

    fn aoi_path(&self) -> &str {
        &self.aoi
    }

    fn export_path(&self) -> &str {
        &self.output
    }

    fn mask_target(&self) -> MaskTarget {
        self.target.unwrap_or_default()
    }

    fn reference_longitude(&self) -> f64 {
        self.reference_longitude.unwrap_or(DEFAULT_REFERENCE_LONGITUDE)
    }

    fn coastline_file(&self) -> Option<&str> {
        self.coastline_file.as_deref()
    }

    fn overpass_url(&self) -> &str {
        self.overpass_url.as_deref().unwrap_or(DEFAULT_OVERPASS_URL)
    }

    fn overpass_timeout_secs(&self) -> u64 {
        self.overpass_timeout_secs.unwrap_or(DEFAULT_OVERPASS_TIMEOUT_SECS)
    }

    fn show_progress(&self) -> bool {
        self.show_progress.unwrap_or(true)
    }
}

impl Validate for MaskSection {
    fn validate(&self) -> Result<()> {
        validate_path("mask.image", &self.image)?;
        validate_file_extensions("mask.image", &[self.image.clone()], &["tif", "tiff"])?;
        validate_path("mask.aoi", &self.aoi)?;
        validate_path("mask.output", &self.output)?;
        validate_range(
            "mask.reference_longitude",
            self.reference_longitude(),
            -180.0,
            180.0,
        )?;
        match &self.coastline_file {
            Some(path) => validate_path("mask.coastline_file", path)?,
            None => validate_url("mask.overpass_url", self.overpass_url())?,
        }
        validate_range(
            "mask.overpass_timeout_secs",
            self.overpass_timeout_secs(),
            1,
            3600,
        )?;
        Ok(())
    }
}
