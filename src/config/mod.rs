pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use args::{CliConfig, CocoArgs, Command, LogFormat, MaskArgs};

#[cfg(feature = "cli")]
mod args {
    use crate::core::coastline::{DEFAULT_OVERPASS_TIMEOUT_SECS, DEFAULT_OVERPASS_URL};
    use crate::core::geometry::DEFAULT_REFERENCE_LONGITUDE;
    use crate::core::split::{DEFAULT_HOLDOUT_FRACTION, DEFAULT_SEED, DEFAULT_TEST_FRACTION};
    use crate::core::{DatasetConfigProvider, MaskConfigProvider};
    use crate::domain::model::{MaskTarget, DEFAULT_SHIP_CLASSES};
    use crate::utils::error::Result;
    use crate::utils::validation::{
        validate_file_extensions, validate_fraction, validate_non_empty_string, validate_path,
        validate_range, validate_unique, validate_url, Validate,
    };
    use clap::{Args, Parser, Subcommand, ValueEnum};

    #[derive(Debug, Clone, Parser)]
    #[command(name = "sar-ship-etl")]
    #[command(about = "Dataset and coastline-mask tooling for SAR ship detection")]
    pub struct CliConfig {
        #[command(subcommand)]
        pub command: Command,

        #[arg(short, long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, help = "Log CPU and memory usage per phase")]
        pub monitor: bool,

        #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
        pub log_format: LogFormat,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum LogFormat {
        Text,
        Json,
    }

    impl LogFormat {
        pub fn as_str(self) -> &'static str {
            match self {
                LogFormat::Text => "text",
                LogFormat::Json => "json",
            }
        }
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Split labeled chips into train/val/test and write COCO annotations
        Coco(CocoArgs),
        /// Zero out land or sea pixels of a georeferenced image
        Mask(MaskArgs),
    }

    #[derive(Debug, Clone, Args)]
    pub struct CocoArgs {
        /// Directory holding the labeled `.tif` chips
        #[arg(long)]
        pub source_dir: String,

        #[arg(long, default_value = "./dataset")]
        pub export_dir: String,

        /// Ship classes in category-id order; defaults to the built-in vocabulary
        #[arg(long, value_delimiter = ',')]
        pub classes: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        pub seed: u64,

        #[arg(long, default_value_t = DEFAULT_HOLDOUT_FRACTION)]
        pub holdout_fraction: f64,

        #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
        pub test_fraction: f64,

        #[arg(long, help = "Also bundle the annotation files into annotations.zip")]
        pub archive: bool,

        #[arg(long, help = "Print split sizes and class counts without writing anything")]
        pub dry_run: bool,

        #[arg(long)]
        pub no_progress: bool,
    }

    #[derive(Debug, Clone, Args)]
    pub struct MaskArgs {
        /// Georeferenced RGB GeoTIFF
        #[arg(long)]
        pub image: String,

        /// GeoJSON polygon in the image CRS
        #[arg(long)]
        pub aoi: String,

        #[arg(long, default_value = "./masked.tif")]
        pub output: String,

        #[arg(long, value_enum, default_value_t = MaskTarget::Land)]
        pub target: MaskTarget,

        /// Centroids east of this longitude are treated as east coasts
        #[arg(long, default_value_t = DEFAULT_REFERENCE_LONGITUDE)]
        pub reference_longitude: f64,

        /// Read coastline lines from a GeoJSON file instead of Overpass
        #[arg(long)]
        pub coastline_file: Option<String>,

        #[arg(long, default_value = DEFAULT_OVERPASS_URL)]
        pub overpass_url: String,

        #[arg(long, default_value_t = DEFAULT_OVERPASS_TIMEOUT_SECS)]
        pub overpass_timeout: u64,

        #[arg(long)]
        pub no_progress: bool,
    }

    impl CocoArgs {
        pub fn class_names(&self) -> Vec<String> {
            if self.classes.is_empty() {
                DEFAULT_SHIP_CLASSES.iter().map(|c| c.to_string()).collect()
            } else {
                self.classes.iter().map(|c| c.trim().to_lowercase()).collect()
            }
        }
    }

    impl DatasetConfigProvider for CocoArgs {
        fn source_dir(&self) -> &str {
            &self.source_dir
        }

        fn export_dir(&self) -> &str {
            &self.export_dir
        }

        fn classes(&self) -> Vec<String> {
            self.class_names()
        }

        fn seed(&self) -> u64 {
            self.seed
        }

        fn holdout_fraction(&self) -> f64 {
            self.holdout_fraction
        }

        fn test_fraction(&self) -> f64 {
            self.test_fraction
        }

        fn write_archive(&self) -> bool {
            self.archive
        }

        fn show_progress(&self) -> bool {
            !self.no_progress
        }
    }

    impl MaskConfigProvider for MaskArgs {
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
            self.target
        }

        fn reference_longitude(&self) -> f64 {
            self.reference_longitude
        }

        fn coastline_file(&self) -> Option<&str> {
            self.coastline_file.as_deref()
        }

        fn overpass_url(&self) -> &str {
            &self.overpass_url
        }

        fn overpass_timeout_secs(&self) -> u64 {
            self.overpass_timeout
        }

        fn show_progress(&self) -> bool {
            !self.no_progress
        }
    }

    impl Validate for CocoArgs {
        fn validate(&self) -> Result<()> {
            validate_path("source_dir", &self.source_dir)?;
            validate_path("export_dir", &self.export_dir)?;
            let classes = self.class_names();
            for class in &classes {
                validate_non_empty_string("classes", class)?;
            }
            validate_unique("classes", &classes)?;
            validate_fraction("holdout_fraction", self.holdout_fraction)?;
            validate_fraction("test_fraction", self.test_fraction)?;
            Ok(())
        }
    }

    impl Validate for MaskArgs {
        fn validate(&self) -> Result<()> {
            validate_path("image", &self.image)?;
            validate_file_extensions("image", &[self.image.clone()], &["tif", "tiff"])?;
            validate_path("aoi", &self.aoi)?;
            validate_path("output", &self.output)?;
            validate_range("reference_longitude", self.reference_longitude, -180.0, 180.0)?;
            match &self.coastline_file {
                Some(path) => validate_path("coastline_file", path)?,
                None => validate_url("overpass_url", &self.overpass_url)?,
            }
            validate_range("overpass_timeout", self.overpass_timeout, 1, 3600)?;
            Ok(())
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            match &self.command {
                Command::Coco(args) => args.validate(),
                Command::Mask(args) => args.validate(),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::utils::error::EtlError;

        #[test]
        fn test_coco_defaults() {
            let config =
                CliConfig::try_parse_from(["sar-ship-etl", "coco", "--source-dir", "chips"])
                    .unwrap();
            let Command::Coco(args) = config.command else {
                panic!("expected coco subcommand");
            };
            assert_eq!(args.export_dir, "./dataset");
            assert_eq!(args.seed, 42);
            assert_eq!(args.classes(), vec!["tanker", "tug", "other type", "passenger", "cargo"]);
            assert!(args.show_progress());
            assert!(args.validate().is_ok());
        }

        #[test]
        fn test_coco_class_list_and_global_flags() {
            let config = CliConfig::try_parse_from([
                "sar-ship-etl",
                "coco",
                "--source-dir",
                "chips",
                "--classes",
                "Cargo, tanker",
                "--verbose",
                "--log-format",
                "json",
            ])
            .unwrap();
            assert!(config.verbose);
            assert_eq!(config.log_format, LogFormat::Json);
            let Command::Coco(args) = &config.command else {
                panic!("expected coco subcommand");
            };
            assert_eq!(args.classes(), vec!["cargo", "tanker"]);
        }

        #[test]
        fn test_coco_rejects_bad_fraction_and_duplicates() {
            let config = CliConfig::try_parse_from([
                "sar-ship-etl",
                "coco",
                "--source-dir",
                "chips",
                "--holdout-fraction",
                "1.5",
            ])
            .unwrap();
            assert!(matches!(
                config.validate(),
                Err(EtlError::InvalidConfigValueError { .. })
            ));

            let config = CliConfig::try_parse_from([
                "sar-ship-etl",
                "coco",
                "--source-dir",
                "chips",
                "--classes",
                "cargo,cargo",
            ])
            .unwrap();
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_mask_arguments() {
            let config = CliConfig::try_parse_from([
                "sar-ship-etl",
                "mask",
                "--image",
                "scene.tif",
                "--aoi",
                "aoi.geojson",
                "--target",
                "maritime",
            ])
            .unwrap();
            let Command::Mask(args) = &config.command else {
                panic!("expected mask subcommand");
            };
            assert_eq!(args.mask_target(), MaskTarget::Maritime);
            assert_eq!(args.overpass_url(), DEFAULT_OVERPASS_URL);
            assert!(args.coastline_file().is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_mask_rejects_non_tiff_image() {
            let config = CliConfig::try_parse_from([
                "sar-ship-etl",
                "mask",
                "--image",
                "scene.png",
                "--aoi",
                "aoi.geojson",
            ])
            .unwrap();
            assert!(config.validate().is_err());
        }
    }
}
