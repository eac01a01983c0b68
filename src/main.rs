//
// main.rs
// Chaos-Tools-rs
//
// Entry point of the CT/MR converter; argument parsing and dispatch live in the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use chaos_tools::cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}
