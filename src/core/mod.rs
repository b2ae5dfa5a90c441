pub mod coastline;
pub mod coco;
pub mod etl;
pub mod geometry;
pub mod raster;
pub mod rasterize;
pub mod split;

pub use crate::domain::ports::{
    CoastlineSource, DatasetConfigProvider, MaskConfigProvider, Pipeline, Storage,
};
pub use crate::utils::error::Result;
