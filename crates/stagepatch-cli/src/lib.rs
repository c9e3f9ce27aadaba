//! Stagepatch CLI: patch the manifest of a build directory in place, then
//! persist the auxiliary scripts.
pub mod artifacts;
pub mod workspace;

pub use artifacts::{ArtifactOutcome, ArtifactStatus};
pub use workspace::Workspace;

use stagepatch_core::{PatchContext, PatchError, PatchPhase, PatchProfile, PatchReport, STAGEPATCH_VERSION};
use stagepatch_passes::patch_manifest;
use tracing::info;

/// Run the full pipeline against `ctx.target_dir`, printing progress lines.
///
/// The manifest is written only when it changed and every pass succeeded.
/// Artifacts are persisted after the manifest write; in dry-run mode nothing
/// touches the disk.
pub fn run(ctx: &PatchContext, profile: &PatchProfile) -> Result<PatchReport, PatchError> {
    let ws = Workspace::open(&ctx.target_dir, profile)?;
    let manifest = ws.manifest_path();
    println!("stagepatch {}: {}", STAGEPATCH_VERSION, ws.display(manifest));

    let input = ws.load_manifest()?;
    let report = patch_manifest(&input, profile, ctx)?;

    for proof in &report.passes {
        let status = if proof.changed { "changed" } else { "unchanged" };
        println!("  {:<16} {:<28} {}", proof.phase.as_str(), proof.id, status);
    }

    if ctx.dry_run {
        let verdict = if report.changed { "would be rewritten" } else { "is up to date" };
        println!("  dry run: {} {}, nothing written", ws.display(manifest), verdict);
        return Ok(report);
    }

    if report.changed {
        workspace::write_atomic(manifest, &report.output)?;
        println!("  wrote {}", ws.display(manifest));
    } else {
        println!("  {} is up to date", ws.display(manifest));
    }

    let outcomes = artifacts::persist_all(&ws, profile)?;
    for outcome in &outcomes {
        let verb = match outcome.status {
            ArtifactStatus::Written => "wrote",
            ArtifactStatus::Unchanged => "kept",
        };
        println!(
            "  {:<16} {} {}",
            PatchPhase::PersistAuxiliaryArtifacts.as_str(),
            verb,
            ws.display(&outcome.path)
        );
    }

    info!(run_id = %ctx.run_id, changed = report.changed, "run complete");
    Ok(report)
}
