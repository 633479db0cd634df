use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use indicatif::ParallelProgressIterator;
use log::debug;
use rayon::prelude::*;

use crate::dataset::{Annotation, Dataset, Image};
use crate::geometry::{BBox, Point};
use crate::progress::ProgressBarBuilder;

const PBAR_FILES: &str = "Checking images: {human_pos} ({percent}%) | \
        elapsed: {elapsed_precise}{msg}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum ViolationKind {
    BBoxMismatch,
    DuplicateInstanceId,
    OrphanAnnotation,
    PointOutOfBounds,
    MissingImageFile,
}

impl ViolationKind {
    /// Whether the kind breaks one of the dataset invariants (as
    /// opposed to a quality issue).
    #[inline]
    pub(crate) fn is_invariant(&self) -> bool {
        matches!(
            self,
            Self::BBoxMismatch
                | Self::DuplicateInstanceId
                | Self::OrphanAnnotation
        )
    }
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BBoxMismatch => write!(f, "bbox mismatch"),
            Self::DuplicateInstanceId => write!(f, "duplicate instance id"),
            Self::OrphanAnnotation => write!(f, "orphan annotation"),
            Self::PointOutOfBounds => write!(f, "point out of bounds"),
            Self::MissingImageFile => write!(f, "missing image file"),
        }
    }
}

/// A non-fatal consistency problem of a loaded dataset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Violation {
    BBoxMismatch {
        annotation: u64,
        image: u64,
        expected: BBox,
        actual: BBox,
    },
    DuplicateInstanceId {
        annotation: u64,
        image: u64,
    },
    OrphanAnnotation {
        annotation: u64,
        image: u64,
    },
    PointOutOfBounds {
        annotation: u64,
        image: u64,
        point: Point,
    },
    MissingImageFile {
        image: u64,
        path: PathBuf,
    },
}

impl Violation {
    pub(crate) fn kind(&self) -> ViolationKind {
        match self {
            Self::BBoxMismatch { .. } => ViolationKind::BBoxMismatch,
            Self::DuplicateInstanceId { .. } => {
                ViolationKind::DuplicateInstanceId
            }
            Self::OrphanAnnotation { .. } => ViolationKind::OrphanAnnotation,
            Self::PointOutOfBounds { .. } => ViolationKind::PointOutOfBounds,
            Self::MissingImageFile { .. } => ViolationKind::MissingImageFile,
        }
    }

    fn annotation(&self) -> Option<u64> {
        match self {
            Self::BBoxMismatch { annotation, .. }
            | Self::DuplicateInstanceId { annotation, .. }
            | Self::OrphanAnnotation { annotation, .. }
            | Self::PointOutOfBounds { annotation, .. } => Some(*annotation),
            Self::MissingImageFile { .. } => None,
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BBoxMismatch {
                annotation,
                image,
                expected,
                actual,
            } => write!(
                f,
                "{}: annotation {annotation} (image {image}) has bbox \
                {actual}, polygon encloses {expected}",
                self.kind()
            ),
            Self::DuplicateInstanceId { annotation, image } => write!(
                f,
                "{}: annotation id {annotation} occurs more than once \
                in image {image}",
                self.kind()
            ),
            Self::OrphanAnnotation { annotation, image } => write!(
                f,
                "{}: annotation {annotation} references unknown image \
                {image}",
                self.kind()
            ),
            Self::PointOutOfBounds {
                annotation,
                image,
                point,
            } => write!(
                f,
                "{}: annotation {annotation} has point ({}, {}) outside \
                of image {image}",
                self.kind(),
                point.x,
                point.y
            ),
            Self::MissingImageFile { image, path } => write!(
                f,
                "{}: image {image} not found (path = {})",
                self.kind(),
                path.display()
            ),
        }
    }
}

/// A configurable consistency check.
#[derive(Debug, Clone)]
pub(crate) struct ConsistencyCheck {
    tolerance: f64,
    image_root: Option<PathBuf>,
    quiet: bool,
}

impl Default for ConsistencyCheck {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            image_root: None,
            quiet: true,
        }
    }
}

impl ConsistencyCheck {
    pub(crate) const DEFAULT_TOLERANCE: f64 = 1e-6;

    /// Sets the maximum absolute difference between a bbox and the
    /// enclosure of its polygon.
    pub(crate) fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// If set, every image file must exist below `root`.
    pub(crate) fn image_root(mut self, root: Option<PathBuf>) -> Self {
        self.image_root = root;
        self
    }

    pub(crate) fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Runs the check. Annotation violations come first (ordered by
    /// annotation id), followed by missing image files (ordered by
    /// image id).
    pub(crate) fn check(&self, dataset: &Dataset) -> Vec<Violation> {
        let mut violations = vec![];
        let mut seen: HashMap<u64, HashSet<u64>> = HashMap::new();

        for annotation in dataset.annotations().iter() {
            if !seen
                .entry(annotation.image_id)
                .or_default()
                .insert(annotation.id)
            {
                violations.push(Violation::DuplicateInstanceId {
                    annotation: annotation.id,
                    image: annotation.image_id,
                });
            }

            if let Some(violation) = self.check_bbox(annotation) {
                violations.push(violation);
            }

            match dataset.image(annotation.image_id) {
                None => violations.push(Violation::OrphanAnnotation {
                    annotation: annotation.id,
                    image: annotation.image_id,
                }),
                Some(image) => {
                    if let Some(violation) = check_bounds(annotation, image)
                    {
                        violations.push(violation);
                    }
                }
            }
        }

        violations.sort_by_key(|v| (v.annotation(), v.kind()));

        if let Some(ref root) = self.image_root {
            violations.extend(self.check_files(dataset, root));
        }

        debug!("consistency check found {} violations", violations.len());
        violations
    }

    fn check_bbox(&self, annotation: &Annotation) -> Option<Violation> {
        let actual = annotation.bbox?;
        let expected = BBox::enclosing(&annotation.polygons)?;

        if actual.approx_eq(&expected, self.tolerance) {
            return None;
        }

        Some(Violation::BBoxMismatch {
            annotation: annotation.id,
            image: annotation.image_id,
            expected,
            actual,
        })
    }

    fn check_files(
        &self,
        dataset: &Dataset,
        root: &Path,
    ) -> Vec<Violation> {
        let pbar = ProgressBarBuilder::new(PBAR_FILES, self.quiet)
            .len(dataset.images().len() as u64)
            .build();

        let mut missing: Vec<Violation> = dataset
            .images()
            .par_iter()
            .progress_with(pbar)
            .filter_map(|image| {
                let path = root.join(&image.file_name);
                if path.is_file() {
                    None
                } else {
                    Some(Violation::MissingImageFile {
                        image: image.id,
                        path,
                    })
                }
            })
            .collect();

        missing.sort_by_key(|v| match v {
            Violation::MissingImageFile { image, .. } => *image,
            _ => 0,
        });

        missing
    }
}

fn check_bounds(annotation: &Annotation, image: &Image) -> Option<Violation> {
    let width = image.width as f64;
    let height = image.height as f64;

    annotation
        .polygons
        .iter()
        .flat_map(|polygon| polygon.points())
        .find(|p| p.x < 0.0 || p.y < 0.0 || p.x > width || p.y > height)
        .map(|point| Violation::PointOutOfBounds {
            annotation: annotation.id,
            image: image.id,
            point: *point,
        })
}

/// Checks a dataset with the default settings.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn validate_consistency(dataset: &Dataset) -> Vec<Violation> {
    ConsistencyCheck::default().check(dataset)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dataset::tests::{from_value, minimal};

    type TestResult = anyhow::Result<()>;

    #[test]
    fn minimal_document_is_consistent() -> TestResult {
        let dataset = from_value(minimal())?;
        assert!(validate_consistency(&dataset).is_empty());
        Ok(())
    }

    #[test]
    fn orphan_annotation() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]["image_id"] = json!(2);

        let dataset = from_value(doc)?;
        let violations = validate_consistency(&dataset);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind(), ViolationKind::OrphanAnnotation);
        assert_eq!(violations[0].kind().to_string(), "orphan annotation");
        assert_eq!(
            violations[0],
            Violation::OrphanAnnotation {
                annotation: 1,
                image: 2
            }
        );
        Ok(())
    }

    #[test]
    fn bbox_mismatch() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]["bbox"] = json!([100, 120, 40, 81]);

        let dataset = from_value(doc)?;
        let violations = validate_consistency(&dataset);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind(), ViolationKind::BBoxMismatch);

        let violations = ConsistencyCheck::default()
            .tolerance(1.0)
            .check(&dataset);
        assert!(violations.is_empty());
        Ok(())
    }

    #[test]
    fn bbox_without_polygon_is_not_checked() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]
            .as_object_mut()
            .unwrap()
            .remove("segmentation");

        let dataset = from_value(doc)?;
        assert!(validate_consistency(&dataset).is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_instance_id() -> TestResult {
        let mut doc = minimal();
        let annotation = doc["annotations"][0].clone();
        doc["annotations"].as_array_mut().unwrap().push(annotation);

        let dataset = from_value(doc)?;
        let violations = validate_consistency(&dataset);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0],
            Violation::DuplicateInstanceId {
                annotation: 1,
                image: 1
            }
        );
        Ok(())
    }

    #[test]
    fn same_instance_id_in_different_images() -> TestResult {
        let mut doc = minimal();
        let mut image = doc["images"][0].clone();
        image["id"] = json!(2);
        image["file_name"] = json!("xray_0002.png");
        doc["images"].as_array_mut().unwrap().push(image);

        let mut annotation = doc["annotations"][0].clone();
        annotation["image_id"] = json!(2);
        doc["annotations"].as_array_mut().unwrap().push(annotation);

        let dataset = from_value(doc)?;
        assert!(validate_consistency(&dataset).is_empty());
        Ok(())
    }

    #[test]
    fn point_out_of_bounds() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]["segmentation"] =
            json!([[600, 400, 700, 400, 700, 450, 600, 450]]);
        doc["annotations"][0]["bbox"] = json!([600, 400, 100, 50]);

        let dataset = from_value(doc)?;
        let violations = validate_consistency(&dataset);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind(), ViolationKind::PointOutOfBounds);
        assert!(!violations[0].kind().is_invariant());
        Ok(())
    }

    #[test]
    fn missing_image_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let dataset = from_value(minimal())?;

        let check =
            ConsistencyCheck::default().image_root(Some(dir.path().into()));
        let violations = check.check(&dataset);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind(), ViolationKind::MissingImageFile);

        std::fs::write(dir.path().join("xray_0001.png"), b"")?;
        assert!(check.check(&dataset).is_empty());
        Ok(())
    }

    #[test]
    fn violation_display() {
        let violation = Violation::OrphanAnnotation {
            annotation: 3,
            image: 7,
        };

        assert_eq!(
            violation.to_string(),
            "orphan annotation: annotation 3 references unknown image 7"
        );
    }
}
