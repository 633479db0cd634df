use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ParallelProgressIterator;
use log::{info, warn};
use rayon::prelude::*;

use crate::category::Category;
use crate::dataset::{Annotation, Dataset, Image};
use crate::error::{DatasetError, DatasetResult};
use crate::fold::{FoldId, Split};
use crate::progress::ProgressBarBuilder;

const PBAR_EXPORT: &str = "Exporting fold {msg}: {human_pos}/{human_len} \
        ({percent}%) | elapsed: {elapsed_precise}";

/// Maps COCO category ids to YOLO class ids. Classes are numbered
/// in the order of the (sorted) category names.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClassMap {
    names: Vec<String>,
    classes: BTreeMap<u64, usize>,
}

impl ClassMap {
    pub(crate) fn from_categories(categories: &[Category]) -> Self {
        let mut names: Vec<String> =
            categories.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names.dedup();

        let classes = categories
            .iter()
            .filter_map(|c| {
                names
                    .binary_search(&c.name)
                    .ok()
                    .map(|class| (c.id, class))
            })
            .collect();

        Self { names, classes }
    }

    #[inline]
    pub(crate) fn class(&self, category_id: u64) -> Option<usize> {
        self.classes.get(&category_id).copied()
    }

    #[inline]
    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }
}

/// Renders the label file of an image: one line per annotation with
/// the class id followed by the normalized points of its first
/// polygon. Annotations without a polygon are skipped.
pub(crate) fn label_file(
    image: &Image,
    annotations: &[&Annotation],
    classes: &ClassMap,
) -> String {
    let width = image.width as f64;
    let height = image.height as f64;

    annotations
        .iter()
        .filter_map(|annotation| {
            let class = classes.class(annotation.category_id)?;
            let polygon = annotation.polygons.first()?;

            let mut line = class.to_string();
            for point in polygon.points() {
                let _ = write!(
                    line,
                    " {:.6} {:.6}",
                    point.x / width,
                    point.y / height
                );
            }

            Some(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the `dataset.yaml` of a fold directory.
pub(crate) fn dataset_yaml(
    fold: FoldId,
    path: &Path,
    classes: &ClassMap,
) -> String {
    let mut yaml = format!(
        "# Dataset configuration for FOLD_{}\n\
        path: {}\n\
        train: images/train\n\
        val: images/val\n\
        test: images/test\n\n\
        nc: {}\n\
        names:\n",
        fold - 1,
        path.display(),
        classes.names().len()
    );

    for (class, name) in classes.names().iter().enumerate() {
        let _ = writeln!(yaml, "  {class}: '{}'", name.replace('\'', "''"));
    }

    yaml
}

/// Counters of a single fold export.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ExportStats {
    pub(crate) images: u64,
    pub(crate) skipped: u64,
}

/// Writes YOLO instance segmentation datasets, one directory per
/// fold.
#[derive(Debug)]
pub(crate) struct Exporter {
    output: PathBuf,
    image_root: PathBuf,
    quiet: bool,
}

impl Exporter {
    pub(crate) const PREFIX: &'static str = "AKUDENTAL_YOLO_FOLD_";

    pub(crate) fn new<P1, P2>(output: P1, image_root: P2) -> Self
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        Self {
            output: output.as_ref().into(),
            image_root: image_root.as_ref().into(),
            quiet: true,
        }
    }

    pub(crate) fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Returns the output directory of a fold. Directory names use the
    /// 0-based fold index of the split file (`fold_0` -> `..._FOLD_0`).
    pub(crate) fn fold_dir(&self, fold: FoldId) -> PathBuf {
        self.output.join(format!("{}{}", Self::PREFIX, fold - 1))
    }

    /// Exports a single fold. An existing fold directory is replaced.
    /// Images that are missing on disk are skipped.
    pub(crate) fn export(
        &self,
        dataset: &Dataset,
        fold: FoldId,
    ) -> DatasetResult<ExportStats> {
        let fold_dir = self.fold_dir(fold);
        info!("exporting fold {fold} to {}", fold_dir.display());

        if fold_dir.exists() {
            fs::remove_dir_all(&fold_dir)?;
        }

        for split in Split::ALL {
            let split = split.to_string();
            fs::create_dir_all(fold_dir.join("images").join(&split))?;
            fs::create_dir_all(fold_dir.join("labels").join(&split))?;
        }

        let classes = ClassMap::from_categories(dataset.categories());
        let by_image = dataset.annotations_by_image();
        let jobs: Vec<(Split, &Image)> = dataset
            .folds()
            .splits(fold)
            .into_iter()
            .flat_map(|(split, ids)| {
                ids.into_iter()
                    .filter_map(|id| dataset.image(id))
                    .map(move |image| (split, image))
                    .collect::<Vec<_>>()
            })
            .collect();

        let pbar = ProgressBarBuilder::new(PBAR_EXPORT, self.quiet)
            .len(jobs.len() as u64)
            .build();
        pbar.set_message(fold.to_string());

        let images = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);

        jobs.par_iter().progress_with(pbar).try_for_each(
            |(split, image)| -> Result<(), DatasetError> {
                let source = self.image_root.join(&image.file_name);
                if !source.is_file() {
                    warn!("image not found, skipping {}", source.display());
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }

                let split = split.to_string();
                let target =
                    fold_dir.join("images").join(&split).join(&image.file_name);
                fs::copy(&source, target)?;

                let annotations = by_image
                    .get(&image.id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let stem = Path::new(&image.file_name)
                    .file_stem()
                    .unwrap_or_default();
                let label = fold_dir
                    .join("labels")
                    .join(&split)
                    .join(stem)
                    .with_extension("txt");
                fs::write(label, label_file(image, annotations, &classes))?;

                images.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )?;

        let yaml =
            dataset_yaml(fold, &fs::canonicalize(&fold_dir)?, &classes);
        fs::write(fold_dir.join("dataset.yaml"), yaml)?;

        Ok(ExportStats {
            images: images.into_inner(),
            skipped: skipped.into_inner(),
        })
    }
}
