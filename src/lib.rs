pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::pipelines::{CocoPipeline, DatasetPreview, MaskPipeline};
pub use config::cli::LocalStorage;
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use core::etl::EtlEngine;
pub use utils::error::{EtlError, Result};
