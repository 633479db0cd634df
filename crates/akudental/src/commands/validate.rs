use std::io::{self, Write};

use clap::{Parser, ValueEnum};
use csv::WriterBuilder;

use crate::consistency::Violation;
use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, PartialOrd, Default, ValueEnum)]
pub(crate) enum ValidateMode {
    Permissive,
    #[default]
    Strict,
    Pedantic,
}

impl ValidateMode {
    /// Whether a violation makes the validation fail.
    fn fails_on(&self, violation: &Violation) -> bool {
        match self {
            Self::Permissive => false,
            Self::Strict => violation.kind().is_invariant(),
            Self::Pedantic => true,
        }
    }
}

/// Check an annotation file against the dataset schema and report
/// consistency violations.
#[derive(Debug, Parser)]
pub(crate) struct Validate {
    /// Run verbosely. Print additional progress information to the
    /// standard error stream. This option conflicts with the
    /// `--quiet` option.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Operate quietly; do not show progress. This option conflicts
    /// with the `--verbose` option.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Set the validate mode: permissive, strict (default), or
    /// pedantic. Schema errors always fail. In strict mode bbox
    /// mismatches, duplicate instance ids and orphan annotations
    /// fail as well; in pedantic mode every violation fails and the
    /// image files are checked.
    #[arg(
        short,
        long,
        default_value = "strict",
        value_name = "mode",
        hide_possible_values = true,
        hide_default_value = true
    )]
    mode: ValidateMode,

    /// Check that every image file exists (implied by `--mode
    /// pedantic`).
    #[arg(long)]
    check_files: bool,

    /// Override the bbox tolerance of the project config.
    #[arg(long, value_name = "tolerance")]
    bbox_tolerance: Option<f64>,

    /// If set, the violations will be written in CSV format to the
    /// standard output (stdout).
    #[arg(long)]
    csv: bool,

    #[command(flatten)]
    source: SourceArgs,
}

impl Validate {
    pub(crate) fn execute(self) -> DatasetResult<()> {
        let source = Source::resolve(&self.source)?;
        let dataset = source.load()?;

        if self.verbose {
            eprintln!(
                "Loaded {} images and {} annotations from {}.",
                dataset.images().len(),
                dataset.annotations().len(),
                source.annotations.display()
            );
        }

        let check_files =
            self.check_files || self.mode == ValidateMode::Pedantic;
        let mut check = source.consistency_check();
        if let Some(tolerance) = self.bbox_tolerance {
            check = check.tolerance(tolerance);
        }

        let violations = check
            .image_root(check_files.then(|| source.images.clone()))
            .quiet(self.quiet)
            .check(&dataset);

        if self.csv {
            write_csv(&violations, io::stdout().lock())?;
        } else {
            let mut out = io::stdout().lock();
            for violation in violations.iter() {
                writeln!(out, "{violation}")?;
            }
        }

        let failures = violations
            .iter()
            .filter(|v| self.mode.fails_on(v))
            .count();

        if self.verbose {
            eprintln!(
                "Found {} violations ({failures} fatal).",
                violations.len()
            );
        }

        if failures > 0 {
            bail!("validation failed: {failures} violation(s)");
        }

        Ok(())
    }
}

fn write_csv<W: Write>(
    violations: &[Violation],
    out: W,
) -> DatasetResult<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(["kind", "message"])?;

    for violation in violations.iter() {
        writer.write_record([
            violation.kind().to_string(),
            violation.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = anyhow::Result<()>;

    #[test]
    fn validate_mode_fails_on() {
        let orphan = Violation::OrphanAnnotation {
            annotation: 1,
            image: 2,
        };
        let missing = Violation::MissingImageFile {
            image: 2,
            path: "2.png".into(),
        };

        assert!(!ValidateMode::Permissive.fails_on(&orphan));
        assert!(ValidateMode::Strict.fails_on(&orphan));
        assert!(!ValidateMode::Strict.fails_on(&missing));
        assert!(ValidateMode::Pedantic.fails_on(&missing));
    }

    #[test]
    fn write_violations_as_csv() -> TestResult {
        let violations = vec![Violation::OrphanAnnotation {
            annotation: 1,
            image: 2,
        }];

        let mut buf = Vec::new();
        write_csv(&violations, &mut buf)?;

        assert_eq!(
            String::from_utf8(buf)?,
            "kind,message\norphan annotation,orphan annotation: \
            annotation 1 references unknown image 2\n"
        );
        Ok(())
    }
}
