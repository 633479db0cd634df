use std::path::PathBuf;

use clap::Parser;
use log::info;

use crate::fold::FoldId;
use crate::prelude::*;
use crate::yolo::Exporter;

/// Export the dataset as YOLO instance segmentation datasets, one
/// directory per cross-validation fold.
#[derive(Debug, Parser)]
pub(crate) struct Export {
    /// Run verbosely. Print additional progress information to the
    /// standard error stream. This option conflicts with the
    /// `--quiet` option.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Operate quietly; do not show progress. This option conflicts
    /// with the `--verbose` option.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Export only the given fold (1-based). By default all folds are
    /// exported.
    #[arg(long, value_name = "k")]
    fold: Option<FoldId>,

    /// The output directory. Existing fold directories are replaced.
    #[arg(short, long, value_name = "dir")]
    output: PathBuf,

    #[command(flatten)]
    source: SourceArgs,
}

impl Export {
    pub(crate) fn execute(self) -> DatasetResult<()> {
        let source = Source::resolve(&self.source)?;
        let dataset = source.load()?;
        let num_folds = dataset.folds().num_folds();

        let folds: Vec<FoldId> = match self.fold {
            Some(fold) if fold == 0 || fold > num_folds => {
                bail!("fold {fold} out of range (1..={num_folds})");
            }
            Some(fold) => vec![fold],
            None => (1..=num_folds).collect(),
        };

        let exporter =
            Exporter::new(&self.output, &source.images).quiet(self.quiet);

        for fold in folds.into_iter() {
            let stats = exporter.export(&dataset, fold)?;
            info!("fold {fold}: {stats:?}");

            if self.verbose {
                eprintln!(
                    "Exported fold {fold} to {} ({} images, {} skipped).",
                    exporter.fold_dir(fold).display(),
                    stats.images,
                    stats.skipped
                );
            }
        }

        Ok(())
    }
}
