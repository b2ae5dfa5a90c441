pub mod coco_pipeline;
pub mod mask_pipeline;

pub use coco_pipeline::{CocoPipeline, DatasetPreview, StagedDataset};
pub use mask_pipeline::MaskPipeline;
