//
// chaos-mri.rs
// Chaos-Tools-rs
//
// Entry point of the MR-only converter that canonicalises masks with the exact grey-value table.
//
// Thales Matheus Mendonça Santos - November 2025

use chaos_tools::cli;

fn main() -> anyhow::Result<()> {
    cli::run_mri()
}
