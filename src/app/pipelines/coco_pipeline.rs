use crate::core::coco::{to_json_bytes, CocoBuilder};
use crate::core::raster::read_dimensions;
use crate::core::split::{split_dataset, SplitSettings};
use crate::core::{DatasetConfigProvider, Pipeline, Storage};
use crate::domain::model::{ChipRecord, DatasetBuild, Split, SplitPlan};
use crate::utils::error::{EtlError, Result};
use crate::utils::progress::split_progress;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const ANNOTATIONS_DIR: &str = "annotations";
pub const MANIFEST_FILE: &str = "manifest.csv";
pub const ARCHIVE_FILE: &str = "annotations.zip";

/// Builds a COCO train/val/test dataset from a flat directory of labeled chips.
pub struct CocoPipeline<S: Storage, C: DatasetConfigProvider> {
    source: S,
    export: S,
    config: C,
}

#[derive(Debug, Serialize)]
struct ManifestRow<'a> {
    file_name: &'a str,
    split: &'a str,
    class: &'a str,
    category_id: u32,
    image_id: u64,
    width: u32,
    height: u32,
}

/// An assembled dataset plus the chip bytes read while assembling it.
/// `payloads[i]` holds the contents of `build.chips[i]`.
#[derive(Debug)]
pub struct StagedDataset {
    pub build: DatasetBuild,
    pub payloads: Vec<Vec<u8>>,
}

/// What a run would produce, computed without touching pixel data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetPreview {
    pub split_sizes: BTreeMap<Split, usize>,
    pub class_counts: BTreeMap<String, usize>,
    pub unclassified: Vec<String>,
}

impl std::fmt::Display for DatasetPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (split, count) in &self.split_sizes {
            writeln!(f, "  {:<6} {} images", split.as_str(), count)?;
        }
        for (class, count) in &self.class_counts {
            writeln!(f, "  {:<12} {}", class, count)?;
        }
        if !self.unclassified.is_empty() {
            writeln!(f, "  unclassified: {}", self.unclassified.len())?;
        }
        Ok(())
    }
}

fn is_chip(name: &str) -> bool {
    name.to_lowercase().ends_with(".tif")
}

impl<S: Storage, C: DatasetConfigProvider> CocoPipeline<S, C> {
    pub fn new(source: S, export: S, config: C) -> Self {
        Self {
            source,
            export,
            config,
        }
    }

    fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            seed: self.config.seed(),
            holdout_fraction: self.config.holdout_fraction(),
            test_fraction: self.config.test_fraction(),
        }
    }

    pub fn plan(&self, chips: Vec<ChipRecord>) -> SplitPlan {
        split_dataset(chips, self.split_settings())
    }

    fn builder(&self) -> Result<CocoBuilder> {
        CocoBuilder::new(&self.config.classes(), self.config.export_dir())
    }

    pub async fn preview(&self) -> Result<DatasetPreview> {
        let chips = self.extract().await?;
        let plan = self.plan(chips);
        let builder = self.builder()?;

        let mut preview = DatasetPreview::default();
        for split in Split::ALL {
            let mut kept = 0;
            for chip in plan.get(split) {
                match builder.classify(&chip.file_name) {
                    Some(class) => {
                        kept += 1;
                        *preview.class_counts.entry(class.name.clone()).or_default() += 1;
                    }
                    None => preview.unclassified.push(chip.file_name.clone()),
                }
            }
            preview.split_sizes.insert(split, kept);
        }
        Ok(preview)
    }

    fn manifest(&self, build: &DatasetBuild) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for chip in &build.chips {
            writer.serialize(ManifestRow {
                file_name: &chip.file_name,
                split: chip.split.as_str(),
                class: &chip.class.name,
                category_id: chip.class.category_id,
                image_id: chip.image_id,
                width: chip.width,
                height: chip.height,
            })?;
        }
        writer.into_inner().map_err(|e| EtlError::ProcessingError {
            message: format!("failed to finish manifest: {}", e),
        })
    }

    fn archive(&self, documents: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, bytes) in documents {
            zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
            zip.write_all(bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: DatasetConfigProvider> Pipeline for CocoPipeline<S, C> {
    type Extracted = Vec<ChipRecord>;
    type Transformed = StagedDataset;

    async fn extract(&self) -> Result<Vec<ChipRecord>> {
        let names = self.source.list_files("").await?;
        let chips: Vec<ChipRecord> = names
            .into_iter()
            .filter(|name| is_chip(name))
            .map(|file_name| ChipRecord { file_name })
            .collect();

        if chips.is_empty() {
            return Err(EtlError::EmptySource {
                path: self.config.source_dir().to_string(),
            });
        }

        tracing::info!("Found {} chips in {}", chips.len(), self.config.source_dir());
        Ok(chips)
    }

    async fn transform(&self, chips: Vec<ChipRecord>) -> Result<StagedDataset> {
        let plan = self.plan(chips);
        let mut builder = self.builder()?;
        let mut payloads = Vec::new();

        for split in Split::ALL {
            let files = plan.get(split);
            let pb = split_progress(split.as_str(), files.len() as u64, self.config.show_progress());

            for chip in files {
                if builder.classify(&chip.file_name).is_none() {
                    tracing::warn!("Skipping {}: no ship class in file name", chip.file_name);
                    builder.mark_skipped(&chip.file_name);
                    pb.inc(1);
                    continue;
                }

                let bytes = self.source.read_file(&chip.file_name).await?;
                let (width, height) = read_dimensions(&bytes).map_err(|e| {
                    tracing::error!("Unreadable chip {}: {}", chip.file_name, e);
                    e
                })?;
                if builder
                    .add_chip(split, &chip.file_name, width, height)
                    .is_some()
                {
                    payloads.push(bytes);
                }
                pb.inc(1);
            }
            pb.finish_and_clear();
        }

        let build = builder.finish();
        tracing::info!(
            train = build.train.images.len(),
            val = build.val.images.len(),
            test = build.test.images.len(),
            skipped = build.skipped.len(),
            "Dataset assembled"
        );
        Ok(StagedDataset { build, payloads })
    }

    async fn load(&self, staged: StagedDataset) -> Result<String> {
        let StagedDataset { build, payloads } = staged;
        if payloads.len() != build.chips.len() {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "{} chips staged but {} payloads read",
                    build.chips.len(),
                    payloads.len()
                ),
            });
        }
        for (chip, bytes) in build.chips.iter().zip(&payloads) {
            let target = format!("{}/{}/{}", chip.split, chip.class.name, chip.file_name);
            self.export.write_file(&target, bytes).await?;
        }
        tracing::debug!("Copied {} chips into the export tree", build.chips.len());

        let mut documents = Vec::with_capacity(Split::ALL.len());
        for split in Split::ALL {
            let name = format!("{}.json", split);
            let bytes = to_json_bytes(build.dataset(split))?;
            self.export
                .write_file(&format!("{}/{}", ANNOTATIONS_DIR, name), &bytes)
                .await?;
            documents.push((name, bytes));
        }

        let manifest = self.manifest(&build)?;
        self.export.write_file(MANIFEST_FILE, &manifest).await?;

        if self.config.write_archive() {
            let archive = self.archive(&documents)?;
            tracing::debug!("Writing {} ({} bytes)", ARCHIVE_FILE, archive.len());
            self.export.write_file(ARCHIVE_FILE, &archive).await?;
        }

        Ok(self.export.location(ANNOTATIONS_DIR))
    }

    fn name(&self) -> &str {
        "coco-dataset"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CocoDataset, GeoTransform, Raster, RasterData};
    use crate::core::raster::write_raster;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        root: String,
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        reads: Arc<AtomicUsize>,
    }

    impl MockStorage {
        fn new(root: &str) -> Self {
            Self {
                root: root.to_string(),
                files: Arc::new(Mutex::new(HashMap::new())),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        async fn put(&self, path: &str, data: Vec<u8>) {
            self.files.lock().await.insert(path.to_string(), data);
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }

        fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        async fn paths(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.files.lock().await.keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn list_files(&self, _dir: &str) -> Result<Vec<String>> {
            let mut names: Vec<String> = self
                .files
                .lock()
                .await
                .keys()
                .filter(|k| !k.contains('/'))
                .cloned()
                .collect();
            names.sort();
            Ok(names)
        }

        fn location(&self, path: &str) -> String {
            format!("{}/{}", self.root, path)
        }
    }

    struct MockConfig {
        archive: bool,
        classes: Vec<String>,
    }

    impl MockConfig {
        fn new() -> Self {
            Self {
                archive: false,
                classes: crate::domain::model::DEFAULT_SHIP_CLASSES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }
        }
    }

    impl DatasetConfigProvider for MockConfig {
        fn source_dir(&self) -> &str {
            "src"
        }
        fn export_dir(&self) -> &str {
            "out"
        }
        fn classes(&self) -> Vec<String> {
            self.classes.clone()
        }
        fn seed(&self) -> u64 {
            42
        }
        fn holdout_fraction(&self) -> f64 {
            0.3
        }
        fn test_fraction(&self) -> f64 {
            0.5
        }
        fn write_archive(&self) -> bool {
            self.archive
        }
        fn show_progress(&self) -> bool {
            false
        }
    }

    fn chip_bytes(width: u32, height: u32) -> Vec<u8> {
        write_raster(&Raster {
            width,
            height,
            data: RasterData::U8(vec![7; (width * height * 3) as usize]),
            transform: Some(GeoTransform::north_up(0.0, 0.0, 1.0, 1.0)),
            geo_keys: None,
        })
        .unwrap()
    }

    async fn seeded_source() -> MockStorage {
        let source = MockStorage::new("src");
        let names = [
            "s1_cargo_01.tif",
            "s1_cargo_02.tif",
            "s1_tanker_03.tif",
            "s1_tug_04.tif",
            "s1_passenger_05.tif",
            "s1_other type_06.tif",
            "s1_cargo_07.tif",
            "s1_tanker_08.tif",
            "s1_fishing_09.tif",
            "s1_cargo_10.TIF",
        ];
        for (i, name) in names.iter().enumerate() {
            source.put(name, chip_bytes(20 + i as u32, 30)).await;
        }
        source.put("readme.txt", b"not a chip".to_vec()).await;
        source
    }

    #[tokio::test]
    async fn test_extract_filters_tif_case_insensitively() {
        let source = seeded_source().await;
        let pipeline = CocoPipeline::new(source, MockStorage::new("out"), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        assert_eq!(chips.len(), 10);
        assert!(chips.iter().any(|c| c.file_name == "s1_cargo_10.TIF"));
        assert!(!chips.iter().any(|c| c.file_name == "readme.txt"));
    }

    #[tokio::test]
    async fn test_extract_empty_source_fails() {
        let pipeline = CocoPipeline::new(
            MockStorage::new("src"),
            MockStorage::new("out"),
            MockConfig::new(),
        );
        assert!(matches!(
            pipeline.extract().await,
            Err(EtlError::EmptySource { .. })
        ));
    }

    #[tokio::test]
    async fn test_transform_assigns_sequential_ids_and_skips_unknown() {
        let source = seeded_source().await;
        let pipeline = CocoPipeline::new(source, MockStorage::new("out"), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        let staged = pipeline.transform(chips).await.unwrap();
        let build = &staged.build;

        assert_eq!(build.chips.len(), 9);
        assert_eq!(staged.payloads.len(), 9);
        assert_eq!(build.skipped, vec!["s1_fishing_09.tif".to_string()]);

        let ids: Vec<u64> = Split::ALL
            .iter()
            .flat_map(|s| build.dataset(*s).images.iter().map(|i| i.id))
            .collect();
        assert_eq!(ids, (1..=9).collect::<Vec<u64>>());

        for split in Split::ALL {
            let dataset = build.dataset(split);
            assert_eq!(dataset.images.len(), dataset.annotations.len());
            for (image, ann) in dataset.images.iter().zip(&dataset.annotations) {
                assert_eq!(ann.image_id, image.id);
                assert_eq!(ann.bbox, [0, 0, image.width, image.height]);
                assert_eq!(image.height, 30);
            }
        }
    }

    #[tokio::test]
    async fn test_load_writes_tree_annotations_and_manifest() {
        let source = seeded_source().await;
        let export = MockStorage::new("out");
        let pipeline = CocoPipeline::new(source.clone(), export.clone(), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        let staged = pipeline.transform(chips).await.unwrap();
        let first = staged.build.chips[0].clone();
        let output = pipeline.load(staged).await.unwrap();
        assert_eq!(output, "out/annotations");

        let copied = format!("{}/{}/{}", first.split, first.class.name, first.file_name);
        assert_eq!(
            export.get_file(&copied).await,
            source.get_file(&first.file_name).await
        );

        let mut total = 0;
        for split in Split::ALL {
            let bytes = export
                .get_file(&format!("annotations/{}.json", split))
                .await
                .unwrap();
            let dataset: CocoDataset = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(dataset.categories.len(), 5);
            total += dataset.images.len();
        }
        assert_eq!(total, 9);

        let manifest = export.get_file(MANIFEST_FILE).await.unwrap();
        let mut reader = csv::Reader::from_reader(manifest.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["file_name", "split", "class", "category_id", "image_id", "width", "height"]
        );
        assert_eq!(reader.records().count(), 9);

        assert!(export.get_file(ARCHIVE_FILE).await.is_none());
    }

    #[tokio::test]
    async fn test_load_with_archive() {
        let source = seeded_source().await;
        let export = MockStorage::new("out");
        let mut config = MockConfig::new();
        config.archive = true;
        let pipeline = CocoPipeline::new(source, export.clone(), config);

        let chips = pipeline.extract().await.unwrap();
        let staged = pipeline.transform(chips).await.unwrap();
        pipeline.load(staged).await.unwrap();

        let zip_bytes = export.get_file(ARCHIVE_FILE).await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["test.json", "train.json", "val.json"]);
        assert!(export.paths().await.contains(&"annotations/val.json".to_string()));
    }

    #[tokio::test]
    async fn test_preview_counts_without_reading_pixels() {
        let source = seeded_source().await;
        let pipeline = CocoPipeline::new(source, MockStorage::new("out"), MockConfig::new());

        let preview = pipeline.preview().await.unwrap();
        assert_eq!(preview.split_sizes.values().sum::<usize>(), 9);
        assert_eq!(preview.class_counts["cargo"], 4);
        assert_eq!(preview.class_counts["tanker"], 2);
        assert_eq!(preview.unclassified, vec!["s1_fishing_09.tif".to_string()]);
    }

    #[tokio::test]
    async fn test_each_chip_is_read_once_per_run() {
        let source = seeded_source().await;
        let pipeline =
            CocoPipeline::new(source.clone(), MockStorage::new("out"), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        let staged = pipeline.transform(chips).await.unwrap();
        pipeline.load(staged).await.unwrap();

        // 9 classified chips; the unclassified one and readme.txt are never opened
        assert_eq!(source.read_count(), 9);
    }

    #[tokio::test]
    async fn test_load_rejects_misaligned_payloads() {
        let source = seeded_source().await;
        let pipeline = CocoPipeline::new(source, MockStorage::new("out"), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        let mut staged = pipeline.transform(chips).await.unwrap();
        staged.payloads.pop();
        assert!(matches!(
            pipeline.load(staged).await,
            Err(EtlError::ProcessingError { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_chip_aborts_transform() {
        let source = MockStorage::new("src");
        source.put("bad_cargo.tif", b"garbage".to_vec()).await;
        let pipeline = CocoPipeline::new(source, MockStorage::new("out"), MockConfig::new());

        let chips = pipeline.extract().await.unwrap();
        assert!(matches!(
            pipeline.transform(chips).await,
            Err(EtlError::TiffError(_))
        ));
    }
}
