use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::Value;

use crate::category::{Category, CategoryKind};
use crate::coco::{RawAnnotation, RawDocument, RawImage, Segmentation};
use crate::error::{DatasetResult, SchemaError};
use crate::fold::{read_split_info, FoldId, Folds, SplitInfo};
use crate::geometry::{BBox, Polygon};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Image {
    pub(crate) id: u64,
    pub(crate) file_name: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) fold: FoldId,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Annotation {
    /// The instance id; unique within its image.
    pub(crate) id: u64,
    pub(crate) image_id: u64,
    pub(crate) category_id: u64,
    pub(crate) kind: CategoryKind,
    pub(crate) polygons: Vec<Polygon>,
    pub(crate) bbox: Option<BBox>,
    pub(crate) area: Option<f64>,
    pub(crate) iscrowd: bool,
}

/// Options that control how an annotation file is loaded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoadOptions {
    /// The number of cross-validation folds.
    pub(crate) num_folds: FoldId,

    /// An optional split file, which assigns images to folds.
    pub(crate) splits: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            num_folds: 5,
            splits: None,
        }
    }
}

/// A loaded and schema-checked annotation file.
#[derive(Debug)]
pub(crate) struct Dataset {
    images: Vec<Image>,
    annotations: Vec<Annotation>,
    categories: Vec<Category>,
    folds: Folds,
    image_index: HashMap<u64, usize>,
}

impl Dataset {
    /// Loads an annotation file with the default [LoadOptions].
    #[inline]
    pub(crate) fn load<P: AsRef<Path>>(path: P) -> DatasetResult<Self> {
        Self::load_with(path, &LoadOptions::default())
    }

    /// Loads an annotation file.
    ///
    /// This function fails with a [SchemaError], if a required key
    /// or field is missing or malformed, a category lies outside
    /// the vocabulary, or the fold assignments do not partition the
    /// image set.
    pub(crate) fn load_with<P: AsRef<Path>>(
        path: P,
        options: &LoadOptions,
    ) -> DatasetResult<Self> {
        let path = path.as_ref();
        info!("loading annotations from {}", path.display());

        let split_info = match options.splits {
            Some(ref splits) => {
                debug!("reading split file {}", splits.display());
                Some(read_split_info(splits)?)
            }
            None => None,
        };

        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, options.num_folds, split_info.as_ref())
    }

    pub(crate) fn from_reader<R: Read>(
        reader: R,
        num_folds: FoldId,
        split_info: Option<&SplitInfo>,
    ) -> DatasetResult<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        let raw = RawDocument::from_value(value)?;
        Ok(Self::from_raw(raw, num_folds, split_info)?)
    }

    fn from_raw(
        raw: RawDocument,
        num_folds: FoldId,
        split_info: Option<&SplitInfo>,
    ) -> Result<Self, SchemaError> {
        let categories = check_categories(&raw)?;
        let folds = Folds::partition(&raw.images, num_folds, split_info)?;

        let mut image_index = HashMap::with_capacity(raw.images.len());
        let mut images = Vec::with_capacity(raw.images.len());

        for (index, image) in raw.images.into_iter().enumerate() {
            if image.width == 0 || image.height == 0 {
                return Err(SchemaError::Malformed {
                    section: RawDocument::IMAGES,
                    index,
                    message: "width and height must be positive".into(),
                });
            }

            if image_index.insert(image.id, index).is_some() {
                return Err(SchemaError::DuplicateId {
                    section: RawDocument::IMAGES,
                    id: image.id,
                });
            }

            let RawImage {
                id,
                file_name,
                width,
                height,
                ..
            } = image;

            images.push(Image {
                id,
                file_name,
                width,
                height,
                // every image is covered by the partition
                fold: folds.fold_of(id).unwrap_or_default(),
            });
        }

        let kinds: HashMap<u64, CategoryKind> =
            categories.iter().map(|c| (c.id, c.kind)).collect();

        let annotations = raw
            .annotations
            .into_iter()
            .map(|annotation| check_annotation(annotation, &kinds))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "loaded {} images, {} annotations, {} categories",
            images.len(),
            annotations.len(),
            categories.len()
        );

        Ok(Self {
            images,
            annotations,
            categories,
            folds,
            image_index,
        })
    }

    #[inline]
    pub(crate) fn images(&self) -> &[Image] {
        &self.images
    }

    #[inline]
    pub(crate) fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[inline]
    pub(crate) fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[inline]
    pub(crate) fn folds(&self) -> &Folds {
        &self.folds
    }

    /// Returns the image with the given id.
    #[inline]
    pub(crate) fn image(&self, id: u64) -> Option<&Image> {
        self.image_index.get(&id).map(|idx| &self.images[*idx])
    }

    /// Groups the annotations by image id. Orphan annotations are
    /// grouped under their (unknown) image id as well.
    pub(crate) fn annotations_by_image(
        &self,
    ) -> BTreeMap<u64, Vec<&Annotation>> {
        self.annotations.iter().fold(
            BTreeMap::new(),
            |mut acc, annotation| {
                acc.entry(annotation.image_id)
                    .or_insert_with(Vec::new)
                    .push(annotation);
                acc
            },
        )
    }
}

fn check_categories(raw: &RawDocument) -> Result<Vec<Category>, SchemaError> {
    let mut seen = HashMap::new();
    let mut categories = Vec::with_capacity(raw.categories.len());

    for category in raw.categories.iter() {
        if seen.insert(category.id, ()).is_some() {
            return Err(SchemaError::DuplicateId {
                section: RawDocument::CATEGORIES,
                id: category.id,
            });
        }

        categories.push(Category {
            id: category.id,
            name: category.name.clone(),
            kind: CategoryKind::classify(category.id, &category.name)?,
        });
    }

    Ok(categories)
}

fn check_annotation(
    raw: RawAnnotation,
    kinds: &HashMap<u64, CategoryKind>,
) -> Result<Annotation, SchemaError> {
    let id = raw.id;
    let invalid = |message: String| SchemaError::InvalidGeometry {
        annotation: id,
        message,
    };

    let Some(kind) = kinds.get(&raw.category_id).copied() else {
        return Err(SchemaError::UndeclaredCategory {
            annotation: id,
            category: raw.category_id,
        });
    };

    let polygons = match raw.segmentation {
        None => vec![],
        Some(Segmentation::Polygons(rings)) => rings
            .iter()
            .map(|ring| Polygon::from_flat(ring))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?,
        Some(Segmentation::Rle(_)) => {
            return Err(invalid(
                "segmentation must be a list of polygons".into(),
            ));
        }
    };

    let bbox = raw
        .bbox
        .as_deref()
        .map(BBox::from_slice)
        .transpose()
        .map_err(invalid)?;

    if polygons.is_empty() && bbox.is_none() {
        return Err(SchemaError::MissingGeometry(id));
    }

    Ok(Annotation {
        id,
        image_id: raw.image_id,
        category_id: raw.category_id,
        kind,
        polygons,
        bbox,
        area: raw.area,
        iscrowd: raw.iscrowd != 0,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::error::DatasetError;

    type TestResult = anyhow::Result<()>;

    /// A minimal well-formed document: one image in fold 1 with a
    /// single annotation of tooth 8.
    pub(crate) fn minimal() -> Value {
        json!({
            "images": [{
                "id": 1,
                "file_name": "xray_0001.png",
                "width": 640,
                "height": 480,
                "fold": 1
            }],
            "annotations": [{
                "id": 1,
                "image_id": 1,
                "category_id": 8,
                "segmentation": [[100, 120, 140, 120, 140, 200, 100, 200]],
                "bbox": [100, 120, 40, 80],
                "area": 3200,
                "iscrowd": 0
            }],
            "categories": [
                { "id": 8, "name": "8", "supercategory": "tooth" },
                { "id": 33, "name": "implant", "supercategory": "restoration" }
            ]
        })
    }

    pub(crate) fn from_value(value: Value) -> DatasetResult<Dataset> {
        Dataset::from_reader(value.to_string().as_bytes(), 5, None)
    }

    #[test]
    fn load_minimal_document() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(minimal().to_string().as_bytes())?;

        let dataset = Dataset::load(file.path())?;
        assert_eq!(dataset.images().len(), 1);
        assert_eq!(dataset.annotations().len(), 1);

        let image = dataset.image(1).unwrap();
        assert_eq!(image.fold, 1);
        assert_eq!(image.file_name, "xray_0001.png");

        let annotation = &dataset.annotations()[0];
        assert_eq!(annotation.kind, CategoryKind::Tooth(8));
        assert_eq!(annotation.polygons[0].points().len(), 4);
        assert!(annotation.bbox.is_some());
        Ok(())
    }

    #[test]
    fn load_with_split_file() -> TestResult {
        let mut doc = minimal();
        doc["images"][0].as_object_mut().unwrap().remove("fold");

        let mut annotations = tempfile::NamedTempFile::new()?;
        annotations.write_all(doc.to_string().as_bytes())?;

        let mut splits = tempfile::NamedTempFile::new()?;
        splits.write_all(
            json!({ "fold_2": { "test": ["xray_0001.png"] } })
                .to_string()
                .as_bytes(),
        )?;

        let options = LoadOptions {
            num_folds: 5,
            splits: Some(splits.path().into()),
        };

        let dataset = Dataset::load_with(annotations.path(), &options)?;
        assert_eq!(dataset.image(1).unwrap().fold, 3);
        Ok(())
    }

    #[test]
    fn load_missing_images_key() {
        let mut doc = minimal();
        doc.as_object_mut().unwrap().remove("images");

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::MissingKey("images")))
        ));
    }

    #[test]
    fn load_undeclared_category() {
        let mut doc = minimal();
        doc["annotations"][0]["category_id"] = json!(12);

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::UndeclaredCategory {
                annotation: 1,
                category: 12
            }))
        ));
    }

    #[test]
    fn load_category_outside_vocabulary() {
        let mut doc = minimal();
        doc["categories"][1]["name"] = json!("caries");

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::UnknownCategory {
                id: 33,
                ..
            }))
        ));
    }

    #[test]
    fn load_duplicate_ids() {
        let mut doc = minimal();
        let image = doc["images"][0].clone();
        doc["images"].as_array_mut().unwrap().push(image);

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::DuplicateId {
                section: "images",
                id: 1
            }))
        ));
    }

    #[test]
    fn load_without_fold() {
        let mut doc = minimal();
        doc["images"][0].as_object_mut().unwrap().remove("fold");

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::Fold(_)))
        ));
    }

    #[test]
    fn load_missing_geometry() {
        let mut doc = minimal();
        let annotation = doc["annotations"][0].as_object_mut().unwrap();
        annotation.remove("segmentation");
        annotation.remove("bbox");

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::MissingGeometry(1)))
        ));
    }

    #[test]
    fn load_rle_segmentation() {
        let mut doc = minimal();
        doc["annotations"][0]["segmentation"] =
            json!({ "counts": [1, 2], "size": [640, 480] });

        assert!(matches!(
            from_value(doc),
            Err(DatasetError::Schema(SchemaError::InvalidGeometry { .. }))
        ));
    }

    #[test]
    fn load_keeps_orphan_annotations() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]["image_id"] = json!(99);

        let dataset = from_value(doc)?;
        assert_eq!(dataset.annotations().len(), 1);
        assert!(dataset.image(99).is_none());
        Ok(())
    }

    #[test]
    fn load_invalid_json() {
        assert!(matches!(
            Dataset::from_reader("{ images".as_bytes(), 5, None),
            Err(DatasetError::Json(_))
        ));
    }

    #[test]
    fn annotations_by_image() -> TestResult {
        let mut doc = minimal();
        let mut second = doc["annotations"][0].clone();
        second["id"] = json!(2);
        doc["annotations"].as_array_mut().unwrap().push(second);

        let dataset = from_value(doc)?;
        let groups = dataset.annotations_by_image();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&1].len(), 2);
        Ok(())
    }
}
