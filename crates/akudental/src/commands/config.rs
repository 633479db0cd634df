use clap::Parser;

use crate::prelude::*;

/// Get and set project config options.
#[derive(Debug, Parser)]
pub(crate) struct Config {
    /// Get the value for the given key.
    #[arg(long, conflicts_with_all = ["value", "unset", "set"])]
    get: bool,

    /// Remove the key from the config.
    #[arg(long, conflicts_with_all = ["value", "get", "set"])]
    unset: bool,

    /// Set the value for the given key.
    #[arg(long, requires = "value", conflicts_with_all = ["get", "unset"])]
    set: bool,

    /// The name of the config option.
    name: String,

    /// The (new) value of the config option.
    #[arg(conflicts_with_all = ["get", "unset"])]
    value: Option<String>,
}

const OPTIONS: [&str; 4] = [
    "runtime.num_jobs",
    "dataset.num_folds",
    "dataset.splits",
    "validate.bbox_tolerance",
];

#[inline]
fn print_option<T>(key: &str, value: Option<T>)
where
    T: ToString,
{
    println!(
        "{key} = {}",
        match value {
            Some(value) => value.to_string(),
            None => "None".to_string(),
        }
    );
}

impl Config {
    pub(crate) fn execute(self) -> DatasetResult<()> {
        let project = Project::discover()?;
        let mut config = project.config()?;

        let name = self.name.as_str();
        if !OPTIONS.contains(&name) {
            bail!("unknown config option `{name}`");
        }

        if let Some(value) = self.value {
            match name {
                "runtime.num_jobs" => {
                    let Ok(value) = value.parse::<usize>() else {
                        bail!("invalid value `{value}`");
                    };

                    if let Some(ref mut runtime) = config.runtime {
                        runtime.num_jobs = Some(value);
                    } else {
                        config.runtime = Some(Runtime {
                            num_jobs: Some(value),
                        });
                    }
                }
                "dataset.num_folds" => match value.parse::<u8>() {
                    Ok(value) if value > 0 => {
                        config.dataset.num_folds = value;
                    }
                    _ => bail!("invalid value `{value}`"),
                },
                "dataset.splits" => {
                    config.dataset.splits = Some(value.into());
                }
                "validate.bbox_tolerance" => match value.parse::<f64>() {
                    Ok(value) if value.is_finite() && value >= 0.0 => {
                        config.validate.bbox_tolerance = value;
                    }
                    _ => bail!("invalid value `{value}`"),
                },
                _ => unreachable!(),
            }

            config.save()?;
        } else if self.unset {
            match name {
                "runtime.num_jobs" => config.runtime = None,
                "dataset.splits" => config.dataset.splits = None,
                _ => bail!("config option `{name}` cannot be unset"),
            }

            config.save()?;
        } else {
            match name {
                "runtime.num_jobs" => print_option(
                    name,
                    config.runtime.and_then(|rt| rt.num_jobs),
                ),
                "dataset.num_folds" => {
                    print_option(name, Some(config.dataset.num_folds))
                }
                "dataset.splits" => print_option(
                    name,
                    config
                        .dataset
                        .splits
                        .map(|path| path.display().to_string()),
                ),
                "validate.bbox_tolerance" => print_option(
                    name,
                    Some(config.validate.bbox_tolerance),
                ),
                _ => unreachable!(),
            }
        }

        Ok(())
    }
}
