use geo::{LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OpenSARShip vocabulary, in category-id order.
pub const DEFAULT_SHIP_CLASSES: [&str; 5] = ["tanker", "tug", "other type", "passenger", "cargo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShipClass {
    pub name: String,
    pub category_id: u32,
}

/// A chip found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChipRecord {
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<ChipRecord>,
    pub val: Vec<ChipRecord>,
    pub test: Vec<ChipRecord>,
}

impl SplitPlan {
    pub fn get(&self, split: Split) -> &[ChipRecord] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A chip that was classified, measured and assigned ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledChip {
    pub file_name: String,
    pub split: Split,
    pub class: ShipClass,
    pub image_id: u64,
    pub annotation_id: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoInfo {
    pub description: String,
    pub version: String,
    pub year: i32,
    pub date_created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
    pub file_name: String,
    pub height: u32,
    pub width: u32,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub segmentation: Vec<Vec<u32>>,
    pub category_id: u32,
    pub image_id: u64,
    pub bbox: [u32; 4],
    pub area: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub info: Option<CocoInfo>,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

/// Output of the dataset transform step.
#[derive(Debug, Clone)]
pub struct DatasetBuild {
    pub train: CocoDataset,
    pub val: CocoDataset,
    pub test: CocoDataset,
    pub chips: Vec<LabeledChip>,
    pub skipped: Vec<String>,
}

impl DatasetBuild {
    pub fn dataset(&self, split: Split) -> &CocoDataset {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

/// Which side of the coastline gets zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum MaskTarget {
    #[default]
    Land,
    Maritime,
}

impl fmt::Display for MaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskTarget::Land => f.write_str("land"),
            MaskTarget::Maritime => f.write_str("maritime"),
        }
    }
}

/// Affine pixel-to-world mapping, GDAL coefficient order.
///
/// `x = c + col * a + row * b`, `y = f + col * d + row * e`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// North-up transform from an origin and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            a: pixel_width,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -pixel_height,
            f: origin_y,
        }
    }

    /// Stretches `bounds` over a `width` x `height` grid.
    pub fn from_bounds(bounds: Rect<f64>, width: u32, height: u32) -> Self {
        let min = bounds.min();
        let max = bounds.max();
        Self::north_up(
            min.x,
            max.y,
            (max.x - min.x) / f64::from(width.max(1)),
            (max.y - min.y) / f64::from(height.max(1)),
        )
    }

    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.c + col * self.a + row * self.b,
            self.f + col * self.d + row * self.e,
        )
    }

    /// `None` when the transform is degenerate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let dx = x - self.c;
        let dy = y - self.f;

        // north-up: scale by reciprocals so coordinates on pixel borders stay integral
        if self.b == 0.0 && self.d == 0.0 {
            if self.a == 0.0 || self.e == 0.0 {
                return None;
            }
            return Some((dx * (1.0 / self.a), dy * (1.0 / self.e)));
        }

        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON * f64::EPSILON {
            return None;
        }
        let col = (self.e * dx - self.b * dy) / det;
        let row = (self.a * dy - self.d * dx) / det;
        Some((col, row))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl RasterData {
    pub fn len(&self) -> usize {
        match self {
            RasterData::U8(v) => v.len(),
            RasterData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Three interleaved bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub data: RasterData,
    pub transform: Option<GeoTransform>,
    /// Raw GeoKeyDirectory, carried through untouched.
    pub geo_keys: Option<Vec<u16>>,
}

impl Raster {
    pub const BANDS: usize = 3;

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Area of interest read from GeoJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    pub polygon: Polygon<f64>,
    pub bounds: Rect<f64>,
}

#[derive(Debug, Clone)]
pub struct MaskInput {
    pub raster: Raster,
    pub aoi: Aoi,
}

#[derive(Debug, Clone)]
pub struct MaskOutput {
    pub raster: Raster,
    pub coastline: Vec<LineString<f64>>,
    pub polygons: Vec<Polygon<f64>>,
    pub masked_pixels: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_split_order_and_names() {
        let names: Vec<&str> = Split::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["train", "val", "test"]);
    }

    #[test]
    fn test_geotransform_round_trip_pixel_corner() {
        let t = GeoTransform::north_up(50.0, 27.0, 0.001, 0.001);
        let (x, y) = t.pixel_to_world(10.0, 20.0);
        assert!((x - 50.01).abs() < 1e-9);
        assert!((y - 26.98).abs() < 1e-9);

        let (col, row) = t.world_to_pixel(x, y).unwrap();
        assert!((col - 10.0).abs() < 1e-6);
        assert!((row - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_geotransform_from_bounds() {
        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 5.0 });
        let t = GeoTransform::from_bounds(bounds, 10, 5);
        assert_eq!(t.pixel_to_world(0.0, 0.0), (0.0, 5.0));
        assert_eq!(t.pixel_to_world(10.0, 5.0), (10.0, 0.0));
    }

    #[test]
    fn test_north_up_border_maps_to_whole_pixel() {
        let t = GeoTransform::north_up(50.0, 27.0, 0.1, 0.1);
        assert_eq!(t.world_to_pixel(50.5, 26.0), Some((5.0, 10.0)));
        assert_eq!(t.world_to_pixel(50.0, 27.0), Some((0.0, 0.0)));
    }

    #[test]
    fn test_degenerate_transform_has_no_inverse() {
        let t = GeoTransform::north_up(0.0, 0.0, 0.0, 0.0);
        assert!(t.world_to_pixel(1.0, 1.0).is_none());
    }
}
