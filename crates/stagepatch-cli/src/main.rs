//! Binary entrypoint for stagepatch.
use clap::Parser;
use stagepatch_cli::run;
use stagepatch_core::{PatchContext, PatchError, PatchProfile, DEFAULT_PRESET};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagepatch", version)]
#[command(about = "Patch a multi-stage build manifest and its helper scripts in place", long_about = None)]
struct Cli {
    /// Directory holding the manifest and the scripts directory
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Patch profile (YAML) to load instead of a built-in preset
    #[arg(long, conflicts_with = "preset")]
    profile: Option<PathBuf>,

    /// Built-in preset (ffmpeg-wasm, ffmpeg-static)
    #[arg(long, default_value = DEFAULT_PRESET)]
    preset: String,

    /// Run every pass and report, but write nothing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout only carries progress lines
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stagepatch: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<(), PatchError> {
    let profile = match &cli.profile {
        Some(path) => PatchProfile::load(path)?,
        None => PatchProfile::preset(&cli.preset)?,
    };
    let ctx = PatchContext::new(&cli.target).dry_run(cli.dry_run);
    run(&ctx, &profile).map(|_| ())
}
