use crate::core::coastline::coastline_source_for;
use crate::core::geometry::{is_east_coast, load_aoi, surface_polygons};
use crate::core::raster::{read_raster, write_raster};
use crate::core::rasterize::{apply_mask, rasterize_all_touched};
use crate::core::{CoastlineSource, MaskConfigProvider, Pipeline, Storage};
use crate::domain::model::{GeoTransform, MaskInput, MaskOutput};
use crate::utils::error::{EtlError, Result};
use crate::utils::progress::step_spinner;

/// Zeroes land or sea pixels of a georeferenced RGB image using an OSM coastline.
pub struct MaskPipeline<S: Storage, C: MaskConfigProvider> {
    storage: S,
    config: C,
    coastline: Box<dyn CoastlineSource>,
}

/// Runs CPU-bound raster work off the async executor.
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| EtlError::ProcessingError {
            message: format!("raster task failed: {}", e),
        })?
}

impl<S: Storage, C: MaskConfigProvider> MaskPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        let coastline = coastline_source_for(&config)?;
        Ok(Self::with_coastline_source(storage, config, coastline))
    }

    pub fn with_coastline_source(
        storage: S,
        config: C,
        coastline: Box<dyn CoastlineSource>,
    ) -> Self {
        Self {
            storage,
            config,
            coastline,
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: MaskConfigProvider> Pipeline for MaskPipeline<S, C> {
    type Extracted = MaskInput;
    type Transformed = MaskOutput;

    async fn extract(&self) -> Result<MaskInput> {
        let image = self.storage.read_file(self.config.image_path()).await?;
        let mut raster = run_blocking(move || read_raster(&image)).await?;
        tracing::info!(
            "Loaded {}x{} image from {}",
            raster.width,
            raster.height,
            self.storage.location(self.config.image_path())
        );

        let aoi_bytes = self.storage.read_file(self.config.aoi_path()).await?;
        let aoi_text = String::from_utf8(aoi_bytes).map_err(|e| EtlError::ValidationError {
            message: format!("AOI file is not UTF-8: {}", e),
        })?;
        let aoi = load_aoi(&aoi_text)?;

        if raster.transform.is_none() {
            tracing::warn!(
                "{} has no georeference; stretching it over the AOI bounds",
                self.config.image_path()
            );
            raster.transform = Some(GeoTransform::from_bounds(
                aoi.bounds,
                raster.width,
                raster.height,
            ));
        }

        Ok(MaskInput { raster, aoi })
    }

    async fn transform(&self, input: MaskInput) -> Result<MaskOutput> {
        let MaskInput { mut raster, aoi } = input;
        let show_progress = self.config.show_progress();

        let east_coast = is_east_coast(&aoi, self.config.reference_longitude());
        tracing::info!(
            east_coast,
            target = %self.config.mask_target(),
            "Coast side resolved"
        );

        let spinner = step_spinner(
            &format!("Fetching coastline from {}", self.coastline.describe()),
            show_progress,
        );
        let coastline = self.coastline.fetch(&aoi).await;
        spinner.finish_and_clear();
        let coastline = coastline?;

        let (clipped, polygons) =
            surface_polygons(coastline, &aoi, east_coast, self.config.mask_target())?;
        tracing::debug!(
            "{} coastline segments closed into {} polygons",
            clipped.len(),
            polygons.len()
        );

        let transform = raster.transform.ok_or_else(|| EtlError::UnsupportedRaster {
            message: "raster has no geotransform".to_string(),
        })?;

        let spinner = step_spinner("Burning mask", show_progress);
        let burn_polygons = polygons.clone();
        let burned = run_blocking(move || {
            let burned =
                rasterize_all_touched(&burn_polygons, &transform, raster.width, raster.height)?;
            let masked = apply_mask(&mut raster, &burned)?;
            Ok((raster, masked))
        })
        .await;
        spinner.finish_and_clear();
        let (raster, masked_pixels) = burned?;

        tracing::info!(
            masked_pixels,
            total_pixels = raster.pixel_count(),
            "Mask applied"
        );

        Ok(MaskOutput {
            raster,
            coastline: clipped,
            polygons,
            masked_pixels,
        })
    }

    async fn load(&self, output: MaskOutput) -> Result<String> {
        let raster = output.raster;
        let bytes = run_blocking(move || write_raster(&raster)).await?;
        self.storage
            .write_file(self.config.export_path(), &bytes)
            .await?;
        Ok(self.storage.location(self.config.export_path()))
    }

    fn name(&self) -> &str {
        "coastline-mask"
    }
}
