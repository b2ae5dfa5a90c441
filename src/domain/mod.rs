// Domain layer: dataset and raster models plus the ports the pipelines depend on.

pub mod model;
pub mod ports;
