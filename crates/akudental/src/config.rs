use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::consistency::ConsistencyCheck;
use crate::error::{DatasetError, DatasetResult};
use crate::fold::FoldId;

/// Project config.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The path of the config.
    #[serde(skip)]
    path: PathBuf,

    /// Project metadata.
    pub(crate) metadata: Metadata,

    /// Runtime options.
    pub(crate) runtime: Option<Runtime>,

    /// Location and layout of the annotation files.
    #[serde(default)]
    pub(crate) dataset: DatasetConfig,

    /// Options of the consistency check.
    #[serde(default)]
    pub(crate) validate: ValidateConfig,

    /// This structure should always be constructed using a public
    /// constructor or using the update syntax:
    ///
    /// ```ignore
    /// use crate::config::Config;
    ///
    /// let config = Config {
    ///     ..Default::default()
    /// };
    /// ```
    #[doc(hidden)]
    #[serde(skip)]
    __non_exhaustive: (),
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Metadata {
    /// The name of the dataset.
    pub(crate) name: String,

    /// The version of the dataset.
    pub(crate) version: Version,

    /// A short blurb about the dataset.
    pub(crate) description: Option<String>,

    /// A list of people or organizations, which are considered as the
    /// authors of the dataset.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub(crate) authors: Vec<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: "".into(),
            version: Version::new(0, 1, 0),
            description: None,
            authors: vec![],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Runtime {
    /// Number of threads to use. If this options isn't set or a value
    /// of "0" is chosen, the maximum number of available threads
    /// is used.
    pub(crate) num_jobs: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DatasetConfig {
    /// The COCO annotation file, relative to the project root.
    pub(crate) annotations: PathBuf,

    /// An optional split file, relative to the project root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) splits: Option<PathBuf>,

    /// The directory containing the images. Defaults to the project
    /// root.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(crate) images: Option<PathBuf>,

    /// The number of cross-validation folds.
    #[serde(default = "default_num_folds")]
    pub(crate) num_folds: FoldId,
}

#[inline]
fn default_num_folds() -> FoldId {
    5
}

impl DatasetConfig {
    /// The split file shipped with the dataset.
    pub(crate) const DEFAULT_SPLITS: &'static str =
        "metadata/split_info_recreated.json";
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            annotations: PathBuf::from("metadata/akudental_instances.json"),
            splits: None,
            images: None,
            num_folds: default_num_folds(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ValidateConfig {
    /// Maximum absolute difference between a bounding box and the
    /// enclosure of its polygon.
    pub(crate) bbox_tolerance: f64,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            bbox_tolerance: ConsistencyCheck::DEFAULT_TOLERANCE,
        }
    }
}

impl Config {
    /// Creates a new default config and sets the file location.
    pub(crate) fn create<P>(path: P) -> DatasetResult<Self>
    where
        P: AsRef<Path>,
    {
        Ok(Self {
            path: path.as_ref().into(),
            ..Default::default()
        })
    }

    /// Loads an existing config from a path.
    pub(crate) fn from_path<P>(path: P) -> DatasetResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().into();
        let content = fs::read_to_string(&path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.path = path;

        Ok(config)
    }

    /// Saves the config.
    pub(crate) fn save(&self) -> DatasetResult<()> {
        let content =
            toml::to_string(self).map_err(DatasetError::other)?;
        let mut out = File::create(&self.path)?;
        out.write_all(content.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn config_save_and_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("akudental.toml");

        let mut config = Config::create(&path)?;
        config.metadata.name = "AKUDENTAL".into();
        config.dataset.splits = Some("metadata/splits.json".into());
        config.validate.bbox_tolerance = 0.5;
        config.save()?;

        let config = Config::from_path(&path)?;
        assert_eq!(config.metadata.name, "AKUDENTAL");
        assert_eq!(config.metadata.version, Version::new(0, 1, 0));
        assert_eq!(config.dataset.num_folds, 5);
        assert_eq!(
            config.dataset.splits,
            Some(PathBuf::from("metadata/splits.json"))
        );
        assert_eq!(config.validate.bbox_tolerance, 0.5);
        assert!(config.runtime.is_none());
        Ok(())
    }

    #[test]
    fn config_defaults() -> TestResult {
        let config: Config = toml::from_str(
            "[metadata]\nname = \"x\"\nversion = \"1.2.3\"\n",
        )?;

        assert_eq!(
            config.dataset.annotations,
            PathBuf::from("metadata/akudental_instances.json")
        );
        assert_eq!(config.dataset.num_folds, 5);
        assert_eq!(
            config.validate.bbox_tolerance,
            ConsistencyCheck::DEFAULT_TOLERANCE
        );
        Ok(())
    }
}
