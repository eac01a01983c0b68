//
// cli.rs
// Chaos-Tools-rs
//
// Defines the command-line surfaces of both converters with Clap and hands off to the batch layer.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::Level;

use crate::batch;
use crate::pipeline::{CaseOptions, Modality, MrVariant};
use crate::writer::NrrdWriter;

/// CT or MR conversion of a CHAOS dataset root.
#[derive(Parser, Debug)]
#[command(name = "chaos-tools")]
#[command(about = "Parse CHAOS dataset", long_about = None)]
pub struct Cli {
    /// modality, either MR or CT
    pub modality: String,
    /// root to data
    pub root_dir: PathBuf,
    /// folder to write output to
    pub write_to: PathBuf,
    #[command(flatten)]
    pub run: RunArgs,
}

/// MR-only conversion with the exact grey-value table.
#[derive(Parser, Debug)]
#[command(name = "chaos-mri")]
#[command(about = "Parse CHAOS MRI dataset", long_about = None)]
pub struct MriCli {
    /// root to data
    pub root_dir: PathBuf,
    /// folder to write output to
    pub write_to: PathBuf,
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Number of patients converted in parallel
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
    /// Log per-slice details
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    // Reject the modality before touching the filesystem.
    let modality: Modality = cli.modality.parse().map_err(|e: String| anyhow!(e))?;
    init_logging(cli.run.verbose);

    convert(
        modality,
        &cli.root_dir,
        &cli.write_to,
        CaseOptions::default(),
        cli.run.jobs,
    )
}

pub fn run_mri() -> Result<()> {
    let cli = MriCli::parse();
    init_logging(cli.run.verbose);

    let options = CaseOptions {
        mr_variant: MrVariant::MriOnly,
        ..CaseOptions::default()
    };
    convert(Modality::Mr, &cli.root_dir, &cli.write_to, options, cli.run.jobs)
}

/// Failed patients are reported by the batch log; they do not fail the run.
fn convert(
    modality: Modality,
    root_dir: &Path,
    write_to: &Path,
    options: CaseOptions,
    jobs: usize,
) -> Result<()> {
    let writer = NrrdWriter::default();
    batch::process_root(root_dir, write_to, modality, &options, &writer, jobs.max(1))?;
    Ok(())
}
