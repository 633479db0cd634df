use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::{env, fs};

use clap::Parser;
use semver::Version;

use crate::config::DatasetConfig;
use crate::fold::FoldId;
use crate::prelude::*;

/// Initialize a new or re-initialize an existing project.
#[derive(Debug, Parser)]
pub(crate) struct Init {
    /// The name of the dataset.
    #[arg(short, long)]
    name: Option<String>,

    /// The version of the dataset.
    #[arg(long, default_value = "0.1.0")]
    version: Version,

    /// A short blurb about the dataset.
    #[arg(short, long)]
    description: Option<String>,

    /// A list of people or organizations, which are considered as the
    /// authors of the dataset.
    #[arg(short, long = "author")]
    authors: Vec<String>,

    /// The COCO annotation file, relative to the project root.
    #[arg(long, value_name = "filename")]
    annotations: Option<PathBuf>,

    /// The split file, relative to the project root.
    #[arg(long, value_name = "filename")]
    splits: Option<PathBuf>,

    /// The image directory, relative to the project root.
    #[arg(long, value_name = "dir")]
    images: Option<PathBuf>,

    /// The number of cross-validation folds.
    #[arg(long, value_name = "n", default_value = "5")]
    folds: FoldId,

    /// Whether to overwrite config with default values or not.
    #[arg(short, long)]
    force: bool,

    /// Run verbosely. Print additional progress information to the
    /// standard error stream. This option conflicts with the
    /// `--quiet` option.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Operate quietly; do not show progress. This option conflicts
    /// with the `--verbose` option.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// The location of the project.
    #[arg(default_value = ".")]
    path: PathBuf,
}

/// Returns the dataset's split file (relative to `root_dir`), if it
/// exists.
fn default_splits(root_dir: &Path) -> Option<PathBuf> {
    let splits = PathBuf::from(DatasetConfig::DEFAULT_SPLITS);
    if root_dir.join(&splits).is_file() {
        return Some(splits);
    }

    None
}

impl Init {
    pub(crate) fn execute(self) -> DatasetResult<()> {
        let root_dir = env::current_dir()?.join(self.path);
        let config = root_dir.join(Project::CONFIG);

        if self.folds == 0 {
            bail!("number of folds must be positive");
        }

        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;

            if self.verbose {
                eprintln!(
                    "Initialize new project in {}",
                    root_dir.display()
                );
            }
        } else if self.verbose {
            eprintln!(
                "Re-Initialize existing project in {}",
                root_dir.display()
            );
        }

        if config.exists() && !self.force {
            if !self.quiet {
                eprintln!(
                    "Config {} exists, use --force to overwrite.",
                    config.display()
                );
            }

            return Ok(());
        }

        let mut config = Config::create(config)?;
        config.metadata.description = self.description;
        config.metadata.authors = self.authors;
        config.metadata.version = self.version;
        config.metadata.name = self.name.unwrap_or(
            root_dir
                .file_name()
                .and_then(OsStr::to_str)
                .unwrap_or_default()
                .to_string(),
        );

        if let Some(annotations) = self.annotations {
            config.dataset.annotations = annotations;
        }

        config.dataset.splits =
            self.splits.or_else(|| default_splits(&root_dir));
        if self.verbose {
            if let Some(ref splits) = config.dataset.splits {
                eprintln!("Use split file {}.", splits.display());
            }
        }

        config.dataset.images = self.images;
        config.dataset.num_folds = self.folds;
        config.save()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn default_splits_if_present() -> TestResult {
        let dir = tempfile::tempdir()?;
        assert_eq!(default_splits(dir.path()), None);

        fs::create_dir_all(dir.path().join("metadata"))?;
        fs::write(dir.path().join(DatasetConfig::DEFAULT_SPLITS), "{}")?;
        assert_eq!(
            default_splits(dir.path()),
            Some(PathBuf::from("metadata/split_info_recreated.json"))
        );
        Ok(())
    }
}
