//! GeoTIFF reading and writing on top of the `tiff` crate.

use crate::domain::model::{GeoTransform, Raster, RasterData};
use crate::utils::error::{EtlError, Result};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

/// GeoKeyDirectory for plain EPSG:4326, written when the source had none.
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, // header: version, revision, minor, key count
    1024, 0, 1, 2, // GTModelType = geographic
    1025, 0, 1, 1, // GTRasterType = pixel is area
    2048, 0, 1, 4326, // GeographicType = WGS 84
];

/// Width and height from the first IFD, without decoding pixel data.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    Ok(decoder.dimensions()?)
}

pub fn read_raster(bytes: &[u8]) -> Result<Raster> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let samples = samples_per_pixel(decoder.colortype()?)?;
    let transform = read_geotransform(&mut decoder)?;
    let geo_keys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => Some(
            value
                .into_u32_vec()?
                .into_iter()
                .map(|v| v as u16)
                .collect(),
        ),
        None => None,
    };

    let data = match decoder.read_image()? {
        DecodingResult::U8(buf) => RasterData::U8(take_rgb(buf, samples)),
        DecodingResult::U16(buf) => RasterData::U16(take_rgb(buf, samples)),
        _ => {
            return Err(EtlError::UnsupportedRaster {
                message: "only 8 and 16 bit unsigned samples are supported".to_string(),
            })
        }
    };

    let expected = width as usize * height as usize * Raster::BANDS;
    if data.len() != expected {
        return Err(EtlError::UnsupportedRaster {
            message: format!(
                "decoded {} samples, expected {} for {}x{} RGB",
                data.len(),
                expected,
                width,
                height
            ),
        });
    }

    Ok(Raster {
        width,
        height,
        data,
        transform,
        geo_keys,
    })
}

fn samples_per_pixel(color: ColorType) -> Result<usize> {
    match color {
        ColorType::RGB(8 | 16) => Ok(3),
        ColorType::RGBA(8 | 16) => Ok(4),
        other => Err(EtlError::UnsupportedRaster {
            message: format!("{:?}; three bands are required", other),
        }),
    }
}

/// Keeps the first three samples of every pixel.
fn take_rgb<T: Copy>(buf: Vec<T>, samples: usize) -> Vec<T> {
    if samples == Raster::BANDS {
        return buf;
    }
    buf.chunks_exact(samples)
        .flat_map(|px| px[..Raster::BANDS].iter().copied())
        .collect()
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<GeoTransform>> {
    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = value.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(Some(GeoTransform {
                a: m[0],
                b: m[1],
                c: m[3],
                d: m[4],
                e: m[5],
                f: m[7],
            }));
        }
    }

    let tiepoint = decoder.find_tag(Tag::ModelTiepointTag)?;
    let scale = decoder.find_tag(Tag::ModelPixelScaleTag)?;
    match (tiepoint, scale) {
        (Some(tiepoint), Some(scale)) => {
            let tp = tiepoint.into_f64_vec()?;
            let sc = scale.into_f64_vec()?;
            if tp.len() < 6 || sc.len() < 2 {
                tracing::warn!("Ignoring malformed tiepoint/pixel-scale tags");
                return Ok(None);
            }
            let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
            let (sx, sy) = (sc[0], sc[1]);
            Ok(Some(GeoTransform {
                a: sx,
                b: 0.0,
                c: x - i * sx,
                d: 0.0,
                e: -sy,
                f: y + j * sy,
            }))
        }
        _ => Ok(None),
    }
}

/// Encodes an interleaved RGB TIFF, keeping the georeference when there is one.
pub fn write_raster(raster: &Raster) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;
        match &raster.data {
            RasterData::U8(data) => {
                let mut image = encoder.new_image::<colortype::RGB8>(raster.width, raster.height)?;
                write_geotags(image.encoder(), raster)?;
                image.write_data(data)?;
            }
            RasterData::U16(data) => {
                let mut image =
                    encoder.new_image::<colortype::RGB16>(raster.width, raster.height)?;
                write_geotags(image.encoder(), raster)?;
                image.write_data(data)?;
            }
        }
    }
    Ok(cursor.into_inner())
}

fn write_geotags<W: std::io::Write + std::io::Seek, K: tiff::encoder::TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    raster: &Raster,
) -> Result<()> {
    let Some(t) = raster.transform else {
        return Ok(());
    };

    if t.b == 0.0 && t.d == 0.0 {
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        let scale = [t.a, -t.e, 0.0];
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    } else {
        let matrix = [
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }

    let keys: &[u16] = raster.geo_keys.as_deref().unwrap_or(&WGS84_GEO_KEYS);
    dir.write_tag(Tag::GeoKeyDirectoryTag, keys)?;
    Ok(())
}
