use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::{env, fs};

use log::debug;

use crate::config::Config;
use crate::consistency::ConsistencyCheck;
use crate::dataset::{Dataset, LoadOptions};
use crate::error::{bail, DatasetError, DatasetResult};
use crate::fold::FoldId;

pub(crate) struct Project {
    /// The root directory of the project.
    root_dir: PathBuf,
}

impl Project {
    pub(crate) const CONFIG: &'static str = "akudental.toml";
    pub(crate) const METADATA_DIR: &'static str = "metadata";

    /// Discovers the root of the project.
    ///
    /// This function fails, if neither the current directory nor any
    /// parent directory contains a project [Config].
    pub(crate) fn discover() -> DatasetResult<Self> {
        Self::discover_from(env::current_dir()?)
    }

    pub(crate) fn discover_from<P: AsRef<Path>>(
        start: P,
    ) -> DatasetResult<Self> {
        let mut root_dir = start.as_ref().to_path_buf();

        loop {
            if let Ok(metadata) =
                fs::metadata(root_dir.join(Self::CONFIG))
            {
                if metadata.is_file() {
                    break;
                }
            }

            if !root_dir.pop() {
                bail!("not a project (or any parent directory)");
            }
        }

        Ok(Self { root_dir })
    }

    /// Returns the config associated with the project.
    #[inline]
    pub(crate) fn config(&self) -> DatasetResult<Config> {
        Config::from_path(self.root_dir.join(Self::CONFIG))
    }

    /// Returns the base directory of the project.
    #[inline]
    pub(crate) fn base_dir(&self) -> &PathBuf {
        &self.root_dir
    }
}

/// Inputs of a dataset command, merged from command line arguments
/// and the project config.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Source {
    pub(crate) annotations: PathBuf,
    pub(crate) splits: Option<PathBuf>,
    pub(crate) images: PathBuf,
    pub(crate) num_folds: FoldId,
    pub(crate) bbox_tolerance: f64,
}

/// Command line overrides for a [Source].
#[derive(Debug, Default, Clone, clap::Args)]
pub(crate) struct SourceArgs {
    /// The COCO annotation file. If not set, the file configured in
    /// `akudental.toml` is used.
    #[arg(value_name = "filename")]
    pub(crate) file: Option<PathBuf>,

    /// A split file (`fold_<k>` to train/val/test file names).
    #[arg(long, value_name = "filename")]
    pub(crate) splits: Option<PathBuf>,

    /// The directory containing the images.
    #[arg(long, value_name = "dir")]
    pub(crate) images: Option<PathBuf>,

    /// The number of cross-validation folds.
    #[arg(long, value_name = "n")]
    pub(crate) folds: Option<FoldId>,
}

/// Returns the image directory for an annotation file. Annotation
/// files inside a `metadata` directory belong to the images of its
/// parent (`<root>/metadata/akudental_instances.json`); otherwise the
/// images are expected next to the file.
fn default_image_root(file: &Path) -> PathBuf {
    let parent = file.parent().unwrap_or(Path::new(""));
    if parent.file_name() == Some(OsStr::new(Project::METADATA_DIR)) {
        return parent
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
    }

    parent.to_path_buf()
}

impl Source {
    /// Resolves the inputs. Paths of the project config are relative
    /// to the project root and are only used if no annotation file is
    /// given on the command line.
    pub(crate) fn resolve(args: &SourceArgs) -> DatasetResult<Self> {
        let project = Project::discover().ok();
        let config = project.as_ref().map(Project::config).transpose()?;
        Self::merge(args, project.as_ref(), config.as_ref())
    }

    fn merge(
        args: &SourceArgs,
        project: Option<&Project>,
        config: Option<&Config>,
    ) -> DatasetResult<Self> {
        let num_folds = args
            .folds
            .or(config.map(|c| c.dataset.num_folds))
            .unwrap_or(5);
        let bbox_tolerance = config
            .map(|c| c.validate.bbox_tolerance)
            .unwrap_or(ConsistencyCheck::DEFAULT_TOLERANCE);

        let source = match (&args.file, project.zip(config)) {
            (Some(file), _) => Self {
                annotations: file.clone(),
                splits: args.splits.clone(),
                images: args
                    .images
                    .clone()
                    .unwrap_or_else(|| default_image_root(file)),
                num_folds,
                bbox_tolerance,
            },
            (None, Some((project, config))) => {
                let root = project.base_dir();
                Self {
                    annotations: root.join(&config.dataset.annotations),
                    splits: args.splits.clone().or_else(|| {
                        config.dataset.splits.as_ref().map(|p| root.join(p))
                    }),
                    images: args.images.clone().unwrap_or_else(|| {
                        config
                            .dataset
                            .images
                            .as_ref()
                            .map(|p| root.join(p))
                            .unwrap_or_else(|| root.clone())
                    }),
                    num_folds,
                    bbox_tolerance,
                }
            }
            (None, None) => {
                return Err(DatasetError::other(
                    "no annotation file given and not a project \
                    (or any parent directory)",
                ));
            }
        };

        debug!("resolved source {source:?}");
        Ok(source)
    }

    pub(crate) fn load(&self) -> DatasetResult<Dataset> {
        let options = LoadOptions {
            num_folds: self.num_folds,
            splits: self.splits.clone(),
        };

        if options == LoadOptions::default() {
            return Dataset::load(&self.annotations);
        }

        Dataset::load_with(&self.annotations, &options)
    }

    /// Returns a consistency check with the configured bbox tolerance.
    #[inline]
    pub(crate) fn consistency_check(&self) -> ConsistencyCheck {
        ConsistencyCheck::default().tolerance(self.bbox_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn discover_from_subdirectory() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(Project::CONFIG), "")?;
        fs::create_dir_all(dir.path().join("metadata/nested"))?;

        let project =
            Project::discover_from(dir.path().join("metadata/nested"))?;
        assert_eq!(project.base_dir(), &dir.path().to_path_buf());
        Ok(())
    }

    #[test]
    fn merge_explicit_file() -> TestResult {
        let args = SourceArgs {
            file: Some("/data/annotations/instances.json".into()),
            ..Default::default()
        };

        let source = Source::merge(&args, None, None)?;
        assert_eq!(source.images, PathBuf::from("/data/annotations"));
        assert_eq!(source.splits, None);
        assert_eq!(source.num_folds, 5);
        Ok(())
    }

    #[test]
    fn merge_explicit_file_in_metadata_dir() -> TestResult {
        let dir = tempfile::tempdir()?;
        let args = SourceArgs {
            file: Some(
                dir.path().join("metadata/akudental_instances.json"),
            ),
            ..Default::default()
        };

        let source = Source::merge(&args, None, None)?;
        assert_eq!(source.images, dir.path().to_path_buf());

        let args = SourceArgs {
            file: Some("metadata/akudental_instances.json".into()),
            ..Default::default()
        };

        let source = Source::merge(&args, None, None)?;
        assert_eq!(source.images, PathBuf::new());
        assert_eq!(
            source.images.join("a.png"),
            PathBuf::from("a.png")
        );
        Ok(())
    }

    #[test]
    fn merge_explicit_file_with_image_dir() -> TestResult {
        let args = SourceArgs {
            file: Some("/data/metadata/instances.json".into()),
            images: Some("/images".into()),
            ..Default::default()
        };

        let source = Source::merge(&args, None, None)?;
        assert_eq!(source.images, PathBuf::from("/images"));
        Ok(())
    }

    #[test]
    fn merge_project_config() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut config = Config::create(dir.path().join(Project::CONFIG))?;
        config.dataset.splits = Some("metadata/splits.json".into());
        config.dataset.num_folds = 3;
        config.save()?;

        let project = Project::discover_from(dir.path())?;
        let config = project.config()?;
        let args = SourceArgs {
            folds: Some(4),
            ..Default::default()
        };

        let source = Source::merge(&args, Some(&project), Some(&config))?;
        assert_eq!(
            source.annotations,
            dir.path().join("metadata/akudental_instances.json")
        );
        assert_eq!(
            source.splits,
            Some(dir.path().join("metadata/splits.json"))
        );
        assert_eq!(source.images, dir.path().to_path_buf());
        assert_eq!(source.num_folds, 4);
        Ok(())
    }

    #[test]
    fn load_with_default_options() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("instances.json");
        fs::write(&path, crate::dataset::tests::minimal().to_string())?;

        let args = SourceArgs {
            file: Some(path),
            ..Default::default()
        };

        let dataset = Source::merge(&args, None, None)?.load()?;
        assert_eq!(dataset.images().len(), 1);
        assert_eq!(dataset.folds().num_folds(), 5);
        Ok(())
    }

    #[test]
    fn merge_without_input() {
        let args = SourceArgs::default();
        assert!(Source::merge(&args, None, None).is_err());
    }
}
