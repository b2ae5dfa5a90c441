use crate::domain::model::{
    CocoAnnotation, CocoCategory, CocoDataset, CocoImage, CocoInfo, DatasetBuild, LabeledChip,
    ShipClass, Split,
};
use crate::utils::error::{EtlError, Result};
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::path::Path;

/// Accumulates the three per-split COCO documents.
///
/// Image and annotation ids come from counters shared by all splits, so ids
/// stay unique when the split files are merged later.
pub struct CocoBuilder {
    classes: Vec<ShipClass>,
    export_root: String,
    next_image_id: u64,
    next_annotation_id: u64,
    train: CocoDataset,
    val: CocoDataset,
    test: CocoDataset,
    chips: Vec<LabeledChip>,
    skipped: Vec<String>,
}

impl CocoBuilder {
    pub fn new(class_names: &[String], export_root: impl Into<String>) -> Result<Self> {
        if class_names.is_empty() {
            return Err(EtlError::ValidationError {
                message: "at least one ship class is required".to_string(),
            });
        }

        let classes: Vec<ShipClass> = class_names
            .iter()
            .enumerate()
            .map(|(i, name)| ShipClass {
                name: name.to_lowercase(),
                category_id: i as u32 + 1,
            })
            .collect();

        let info = CocoInfo {
            description: "SAR ship chips".to_string(),
            version: "1.0".to_string(),
            year: Utc::now().year(),
            date_created: Utc::now().to_rfc3339(),
        };
        let categories = Self::category_info(&classes);
        let empty = CocoDataset {
            info: Some(info),
            images: Vec::new(),
            annotations: Vec::new(),
            categories,
        };

        Ok(Self {
            classes,
            export_root: export_root.into(),
            next_image_id: 1,
            next_annotation_id: 1,
            train: empty.clone(),
            val: empty.clone(),
            test: empty,
            chips: Vec::new(),
            skipped: Vec::new(),
        })
    }

    fn category_info(classes: &[ShipClass]) -> Vec<CocoCategory> {
        classes
            .iter()
            .map(|c| CocoCategory {
                id: c.category_id,
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn classes(&self) -> &[ShipClass] {
        &self.classes
    }

    pub fn category_id(&self, class_name: &str) -> Option<u32> {
        self.classes
            .iter()
            .find(|c| c.name == class_name)
            .map(|c| c.category_id)
    }

    /// First class, in vocabulary order, whose name occurs in the lowercased file name.
    pub fn classify(&self, file_name: &str) -> Option<&ShipClass> {
        let lowered = file_name.to_lowercase();
        self.classes.iter().find(|c| lowered.contains(&c.name))
    }

    /// Where the chip lands after export: `<export>/<split>/<class>/<file>`.
    pub fn export_path(&self, split: Split, class: &ShipClass, file_name: &str) -> String {
        Path::new(&self.export_root)
            .join(split.as_str())
            .join(&class.name)
            .join(file_name)
            .to_string_lossy()
            .into_owned()
    }

    pub fn image_info(&self, file_name: String, image_id: u64, width: u32, height: u32) -> CocoImage {
        CocoImage {
            file_name,
            height,
            width,
            id: image_id,
        }
    }

    /// Whole-chip box and polygon; a chip holds exactly one centered ship.
    pub fn annotation_info(
        &self,
        category_id: u32,
        image_id: u64,
        width: u32,
        height: u32,
        annotation_id: u64,
    ) -> CocoAnnotation {
        CocoAnnotation {
            id: annotation_id,
            segmentation: vec![vec![0, 0, width, 0, width, height, 0, height]],
            category_id,
            image_id,
            bbox: [0, 0, width, height],
            area: u64::from(width) * u64::from(height),
        }
    }

    fn dataset_mut(&mut self, split: Split) -> &mut CocoDataset {
        match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
            Split::Test => &mut self.test,
        }
    }

    pub fn add_image_annotation(
        &mut self,
        split: Split,
        image: CocoImage,
        annotation: CocoAnnotation,
    ) {
        let dataset = self.dataset_mut(split);
        dataset.images.push(image);
        dataset.annotations.push(annotation);
    }

    pub fn next_ids(&mut self) -> (u64, u64) {
        let ids = (self.next_image_id, self.next_annotation_id);
        self.next_image_id += 1;
        self.next_annotation_id += 1;
        ids
    }

    /// Classifies and registers one chip. Returns `None` when no class matches.
    pub fn add_chip(
        &mut self,
        split: Split,
        file_name: &str,
        width: u32,
        height: u32,
    ) -> Option<&LabeledChip> {
        let Some(class) = self.classify(file_name).cloned() else {
            tracing::warn!("Skipping {}: no ship class in file name", file_name);
            self.skipped.push(file_name.to_string());
            return None;
        };

        let (image_id, annotation_id) = self.next_ids();
        let exported = self.export_path(split, &class, file_name);
        let image = self.image_info(exported, image_id, width, height);
        let annotation =
            self.annotation_info(class.category_id, image_id, width, height, annotation_id);
        self.add_image_annotation(split, image, annotation);

        self.chips.push(LabeledChip {
            file_name: file_name.to_string(),
            split,
            class,
            image_id,
            annotation_id,
            width,
            height,
        });
        self.chips.last()
    }

    pub fn mark_skipped(&mut self, file_name: &str) {
        self.skipped.push(file_name.to_string());
    }

    pub fn finish(self) -> DatasetBuild {
        DatasetBuild {
            train: self.train,
            val: self.val,
            test: self.test,
            chips: self.chips,
            skipped: self.skipped,
        }
    }
}

/// Pretty JSON with 4-space indentation.
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}
