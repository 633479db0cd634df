//! Tools to check and convert the AKUDENTAL dataset, a collection of
//! annotated dental X-ray images in COCO instance segmentation
//! format. Images are assigned to cross-validation folds, either by a
//! `fold` field or by a split file.

use std::io::ErrorKind;
use std::process;

use clap::Parser;
use cli::{Args, Command};
use env_logger::Env;
use error::{DatasetError, DatasetResult};
use project::Project;
use rayon::ThreadPoolBuilder;

mod category;
mod cli;
mod coco;
mod commands;
mod config;
mod consistency;
mod dataset;
mod error;
mod fold;
mod geometry;
mod prelude;
mod progress;
mod project;
mod yolo;

fn num_threads(args: &Args) -> usize {
    if let Some(num_threads) = args.num_jobs {
        return num_threads;
    }

    if let Ok(config) = Project::discover().and_then(|p| p.config()) {
        if let Some(runtime) = config.runtime {
            if let Some(num_threads) = runtime.num_jobs {
                return num_threads;
            }
        }
    }

    0
}

#[inline]
fn is_broken_pipe(e: &csv::Error) -> bool {
    matches!(
        e.kind(),
        csv::ErrorKind::Io(io) if io.kind() == ErrorKind::BrokenPipe
    )
}

fn run(args: Args) -> DatasetResult<()> {
    match args.cmd {
        Command::Completions(cmd) => cmd.execute(),
        Command::Config(cmd) => cmd.execute(),
        Command::Export(cmd) => cmd.execute(),
        Command::Init(cmd) => cmd.execute(),
        Command::Summary(cmd) => cmd.execute(),
        Command::Validate(cmd) => cmd.execute(),
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .init();

    let args = Args::parse();

    if let Err(e) = ThreadPoolBuilder::new()
        .num_threads(num_threads(&args))
        .build_global()
    {
        eprintln!("error: {e:#}");
        process::exit(1);
    }

    match run(args) {
        Ok(()) => process::exit(0),
        Err(DatasetError::IO(e))
            if e.kind() == ErrorKind::BrokenPipe =>
        {
            process::exit(0)
        }
        Err(DatasetError::Csv(e)) if is_broken_pipe(&e) => {
            process::exit(0)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}
