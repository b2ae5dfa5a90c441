use sar_ship_etl::config::toml_config::TomlConfig;
use sar_ship_etl::core::raster::{read_raster, write_raster};
use sar_ship_etl::core::split::{split_dataset, SplitSettings};
use sar_ship_etl::domain::model::{ChipRecord, CocoDataset, GeoTransform, Raster, RasterData};
use sar_ship_etl::{CocoPipeline, EtlEngine, LocalStorage, MaskPipeline};
use std::path::Path;
use tempfile::TempDir;

const CHIPS: [&str; 12] = [
    "S1A_20200101_cargo_001.tif",
    "S1A_20200101_cargo_002.tif",
    "S1A_20200101_cargo_003.tif",
    "S1A_20200101_tanker_004.tif",
    "S1A_20200101_tanker_005.tif",
    "S1A_20200101_tug_006.tif",
    "S1A_20200101_passenger_007.tif",
    "S1A_20200101_other type_008.tif",
    "S1A_20200101_cargo_009.tif",
    "S1A_20200101_tanker_010.tif",
    "S1A_20200101_tug_011.tif",
    "S1A_20200101_dredger_012.tif",
];

fn write_chip(dir: &Path, name: &str, width: u32, height: u32) {
    let raster = Raster {
        width,
        height,
        data: RasterData::U8(vec![128; (width * height * 3) as usize]),
        transform: None,
        geo_keys: None,
    };
    std::fs::write(dir.join(name), write_raster(&raster).unwrap()).unwrap();
}

fn seed_chips(dir: &Path) {
    for (i, name) in CHIPS.iter().enumerate() {
        write_chip(dir, name, 16 + i as u32, 24);
    }
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
}

fn dataset_config(source: &Path, export: &Path, archive: bool) -> TomlConfig {
    let toml = format!(
        r#"
[pipeline]
name = "ships"
description = "integration"
version = "1.0"

[dataset]
source_dir = "{}"
export_dir = "{}"
archive = {}
show_progress = false
"#,
        source.display(),
        export.display(),
        archive
    );
    TomlConfig::from_toml_str(&toml).unwrap()
}

async fn build_dataset(source: &Path, export: &Path, archive: bool) -> String {
    let config = dataset_config(source, export, archive);
    let dataset = config.dataset().unwrap().clone();
    let pipeline = CocoPipeline::new(
        LocalStorage::new(source.to_string_lossy().into_owned()),
        LocalStorage::new(export.to_string_lossy().into_owned()),
        dataset,
    );
    EtlEngine::new_with_monitoring(pipeline, false)
        .run()
        .await
        .unwrap()
}

fn load_split(export: &Path, split: &str) -> CocoDataset {
    let bytes = std::fs::read(export.join("annotations").join(format!("{}.json", split))).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_end_to_end_coco_dataset() {
    let source = TempDir::new().unwrap();
    let export = TempDir::new().unwrap();
    seed_chips(source.path());

    let output = build_dataset(source.path(), export.path(), true).await;
    assert!(output.ends_with("annotations"));

    let splits: Vec<CocoDataset> = ["train", "val", "test"]
        .iter()
        .map(|s| load_split(export.path(), s))
        .collect();

    // ceil(0.3 * 12) = 4 held out, split 2/2; the dredger chip is dropped from its split
    let plan = split_dataset(
        CHIPS
            .iter()
            .map(|name| ChipRecord {
                file_name: name.to_string(),
            })
            .collect(),
        SplitSettings::default(),
    );
    assert_eq!(
        (plan.train.len(), plan.val.len(), plan.test.len()),
        (8, 2, 2)
    );
    let classified = |chips: &[ChipRecord]| {
        chips
            .iter()
            .filter(|c| !c.file_name.contains("dredger"))
            .count()
    };
    let sizes: Vec<usize> = splits.iter().map(|d| d.images.len()).collect();
    assert_eq!(
        sizes,
        vec![
            classified(&plan.train),
            classified(&plan.val),
            classified(&plan.test)
        ]
    );
    assert_eq!(sizes.iter().sum::<usize>(), 11);

    let mut ids: Vec<u64> = splits
        .iter()
        .flat_map(|d| d.images.iter().map(|i| i.id))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=11).collect::<Vec<u64>>());

    for dataset in &splits {
        assert_eq!(dataset.categories[0].name, "tanker");
        assert_eq!(dataset.categories[4].name, "cargo");
        for image in &dataset.images {
            assert!(Path::new(&image.file_name).exists(), "{}", image.file_name);
            assert!(!image.file_name.contains("dredger"));
        }
    }

    let raw = std::fs::read_to_string(export.path().join("annotations/train.json")).unwrap();
    assert!(raw.contains("\n    \"images\""));

    assert!(export.path().join("manifest.csv").exists());
    assert!(export.path().join("annotations.zip").exists());
}

#[tokio::test]
async fn test_same_seed_gives_same_split() {
    let source = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    seed_chips(source.path());

    build_dataset(source.path(), first.path(), false).await;
    build_dataset(source.path(), second.path(), false).await;

    for split in ["train", "val", "test"] {
        let names = |root: &Path| -> Vec<String> {
            load_split(root, split)
                .images
                .into_iter()
                .map(|i| {
                    Path::new(&i.file_name)
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .into_owned()
                })
                .collect()
        };
        assert_eq!(names(first.path()), names(second.path()));
    }
    assert!(!first.path().join("annotations.zip").exists());
}

#[tokio::test]
async fn test_end_to_end_land_mask() {
    let work = TempDir::new().unwrap();
    let root = work.path();

    let raster = Raster {
        width: 20,
        height: 20,
        data: RasterData::U16(vec![1000; 20 * 20 * 3]),
        transform: Some(GeoTransform::north_up(50.0, 27.0, 0.05, 0.05)),
        geo_keys: None,
    };
    std::fs::write(root.join("scene.tif"), write_raster(&raster).unwrap()).unwrap();
    std::fs::write(
        root.join("aoi.geojson"),
        r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "properties": {}, "geometry":
            {"type": "Polygon", "coordinates": [[[50.0, 26.0], [51.0, 26.0], [51.0, 27.0], [50.0, 27.0], [50.0, 26.0]]]}}]}"#,
    )
    .unwrap();
    std::fs::write(
        root.join("coast.geojson"),
        r#"{"type": "LineString", "coordinates": [[50.5, 27.2], [50.5, 25.8]]}"#,
    )
    .unwrap();

    let toml = format!(
        r#"
[pipeline]
name = "mask"
description = "integration"
version = "1.0"

[mask]
image = "scene.tif"
aoi = "aoi.geojson"
output = "out/masked.tif"
target = "land"
coastline_file = "{}"
show_progress = false
"#,
        root.join("coast.geojson").display()
    );
    let config = TomlConfig::from_toml_str(&toml).unwrap();
    let mask = config.mask().unwrap().clone();

    let pipeline = MaskPipeline::new(LocalStorage::new(root.to_string_lossy().into_owned()), mask)
        .unwrap();
    let output = EtlEngine::new(pipeline).run().await.unwrap();
    assert!(output.ends_with("masked.tif"));

    let masked = read_raster(&std::fs::read(root.join("out/masked.tif")).unwrap()).unwrap();
    assert_eq!(masked.width, 20);
    assert_eq!(masked.transform, raster.transform);
    let RasterData::U16(data) = &masked.data else {
        panic!("bit depth changed");
    };
    let at = |col: usize, row: usize| data[(row * 20 + col) * 3];
    assert_eq!(at(0, 10), 0);
    assert_eq!(at(8, 19), 0);
    assert_eq!(at(12, 10), 1000);
    assert_eq!(at(19, 0), 1000);
}
