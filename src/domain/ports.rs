use crate::domain::model::{Aoi, MaskTarget};
use crate::utils::error::Result;
use async_trait::async_trait;
use geo::LineString;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// File names (not directories) directly under `dir`.
    fn list_files(
        &self,
        dir: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
    /// Human-readable location of `path`, used in COCO `file_name` fields and logs.
    fn location(&self, path: &str) -> String;
}

pub trait DatasetConfigProvider: Send + Sync {
    fn source_dir(&self) -> &str;
    fn export_dir(&self) -> &str;
    fn classes(&self) -> Vec<String>;
    fn seed(&self) -> u64;
    fn holdout_fraction(&self) -> f64;
    fn test_fraction(&self) -> f64;
    fn write_archive(&self) -> bool;
    fn show_progress(&self) -> bool;
}

pub trait MaskConfigProvider: Send + Sync {
    fn image_path(&self) -> &str;
    fn aoi_path(&self) -> &str;
    fn export_path(&self) -> &str;
    fn mask_target(&self) -> MaskTarget;
    fn reference_longitude(&self) -> f64;
    /// Local coastline GeoJSON; when unset the Overpass API is queried.
    fn coastline_file(&self) -> Option<&str>;
    fn overpass_url(&self) -> &str;
    fn overpass_timeout_secs(&self) -> u64;
    fn show_progress(&self) -> bool;
}

/// Where coastline geometry comes from.
#[async_trait]
pub trait CoastlineSource: Send + Sync {
    async fn fetch(&self, aoi: &Aoi) -> Result<Vec<LineString<f64>>>;

    fn describe(&self) -> String;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send;
    type Transformed: Send;

    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    async fn load(&self, result: Self::Transformed) -> Result<String>;

    fn name(&self) -> &str;
}
