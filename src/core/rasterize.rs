//! Burning polygons onto the raster grid and zeroing what they cover.

use crate::domain::model::{GeoTransform, Raster, RasterData};
use crate::utils::error::{EtlError, Result};
use geo::{LineString, Polygon};

/// Pixel-space ring: (col, row) pairs, rows growing downward.
type PixelRing = Vec<(f64, f64)>;

fn to_pixel_ring(ring: &LineString<f64>, transform: &GeoTransform) -> Result<PixelRing> {
    ring.coords()
        .map(|c| {
            transform
                .world_to_pixel(c.x, c.y)
                .ok_or_else(|| EtlError::ProcessingError {
                    message: "raster geotransform is not invertible".to_string(),
                })
        })
        .collect()
}

/// Marks every pixel a polygon touches.
///
/// A pixel counts when its center falls inside the polygon (even-odd rule,
/// holes respected) or when any ring edge passes through it. Together those
/// are exactly the pixels that intersect the polygon.
pub fn rasterize_all_touched(
    polygons: &[Polygon<f64>],
    transform: &GeoTransform,
    width: u32,
    height: u32,
) -> Result<Vec<bool>> {
    let (w, h) = (width as usize, height as usize);
    let mut burned = vec![false; w * h];

    for polygon in polygons {
        let mut rings = vec![to_pixel_ring(polygon.exterior(), transform)?];
        for interior in polygon.interiors() {
            rings.push(to_pixel_ring(interior, transform)?);
        }

        fill_centers(&rings, w, h, &mut burned);
        for ring in &rings {
            for edge in ring.windows(2) {
                burn_segment(edge[0], edge[1], w, h, &mut burned);
            }
        }
    }

    Ok(burned)
}

/// Scanline fill sampling pixel centers.
fn fill_centers(rings: &[PixelRing], w: usize, h: usize, burned: &mut [bool]) {
    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..h {
        let y = row as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for edge in ring.windows(2) {
                let ((x0, y0), (x1, y1)) = (edge[0], edge[1]);
                // half-open rule so shared vertices count once
                if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                    crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let start = (pair[0] - 0.5).ceil().max(0.0);
            let end = (pair[1] - 0.5).ceil().min(w as f64);
            if start >= end {
                continue;
            }
            let row_offset = row * w;
            for col in start as usize..end as usize {
                burned[row_offset + col] = true;
            }
        }
    }
}

/// Supercover traversal (Amanatides & Woo) of one segment.
fn burn_segment(from: (f64, f64), to: (f64, f64), w: usize, h: usize, burned: &mut [bool]) {
    let (x0, y0) = from;
    let (x1, y1) = to;
    if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
        return;
    }

    let mut cx = x0.floor() as i64;
    let mut cy = y0.floor() as i64;
    let end_x = x1.floor() as i64;
    let end_y = y1.floor() as i64;

    let dx = x1 - x0;
    let dy = y1 - y0;
    let step_x: i64 = if dx > 0.0 { 1 } else { -1 };
    let step_y: i64 = if dy > 0.0 { 1 } else { -1 };

    let mut t_max_x = if dx != 0.0 {
        let boundary = if dx > 0.0 { cx as f64 + 1.0 } else { cx as f64 };
        (boundary - x0) / dx
    } else {
        f64::INFINITY
    };
    let mut t_max_y = if dy != 0.0 {
        let boundary = if dy > 0.0 { cy as f64 + 1.0 } else { cy as f64 };
        (boundary - y0) / dy
    } else {
        f64::INFINITY
    };
    let t_delta_x = if dx != 0.0 { 1.0 / dx.abs() } else { f64::INFINITY };
    let t_delta_y = if dy != 0.0 { 1.0 / dy.abs() } else { f64::INFINITY };

    let max_steps = (end_x - cx).unsigned_abs() + (end_y - cy).unsigned_abs() + 1;
    for _ in 0..=max_steps {
        if cx >= 0 && cy >= 0 && (cx as usize) < w && (cy as usize) < h {
            burned[cy as usize * w + cx as usize] = true;
        }
        if cx == end_x && cy == end_y {
            break;
        }
        if t_max_x < t_max_y {
            cx += step_x;
            t_max_x += t_delta_x;
        } else {
            cy += step_y;
            t_max_y += t_delta_y;
        }
    }
}

/// Zeroes all bands of burned pixels and returns how many pixels were zeroed.
pub fn apply_mask(raster: &mut Raster, burned: &[bool]) -> Result<usize> {
    if burned.len() != raster.pixel_count() {
        return Err(EtlError::ProcessingError {
            message: format!(
                "mask has {} pixels but raster has {}",
                burned.len(),
                raster.pixel_count()
            ),
        });
    }

    fn zero<T: Copy + Default>(data: &mut [T], burned: &[bool]) {
        for (pixel, _) in data
            .chunks_exact_mut(Raster::BANDS)
            .zip(burned)
            .filter(|(_, hit)| **hit)
        {
            pixel.fill(T::default());
        }
    }

    match &mut raster.data {
        RasterData::U8(data) => zero(data, burned),
        RasterData::U16(data) => zero(data, burned),
    }

    Ok(burned.iter().filter(|b| **b).count())
}
