//! Stagepatch Passes: the manifest edits and the standard pipeline.
//!
//! # Pipeline Flow
//!
//! ```text
//! Manifest → Env → Removal → Insertion → ConfigureFlags → LibFlags → verify → Manifest
//!             ↓       ↓           ↓              ↓             ↓
//!          pinned  stages +    stage after    RUN list      ENV list
//!          values  copies      anchor + copy  replaced      replaced
//! ```
//!
//! Every pass is idempotent: running the pipeline on its own output returns
//! that output unchanged.

mod env;
mod insert;
mod remove;
mod rewrite;

pub use env::SetEnvPass;
pub use insert::InsertStagePass;
pub use remove::{verify_removed, RemoveStagesPass};
pub use rewrite::RewriteOptionsPass;

use stagefile::parse_manifest;
use stagepatch_core::{PassError, PatchContext, PatchError, PatchProfile, PatchReport, PatchRunner};
use stagepatch_render::{TemplateRenderer, TemplatesFile};
use tracing::info;

const VERIFY_ID: &str = "verify.references.v1";

/// Build the fixed-order runner for a profile
pub fn standard_runner(
    profile: &PatchProfile,
    renderer: &TemplateRenderer,
) -> Result<PatchRunner, PatchError> {
    let insert = InsertStagePass::new(&profile.insert, &profile.scripts_dir, renderer)
        .map_err(|source| PatchError::Pass { pass: "insert.stage.v1".to_string(), source })?;

    Ok(PatchRunner::new(vec![
        Box::new(SetEnvPass::new(profile.env_overrides.clone())),
        Box::new(RemoveStagesPass::new(profile.remove_stages.clone())),
        Box::new(insert),
        Box::new(RewriteOptionsPass::configure_flags(profile.configure_flags.clone())),
        Box::new(RewriteOptionsPass::lib_flags(profile.lib_flags.clone())),
    ]))
}

/// Run the standard pipeline over manifest text with the built-in templates
pub fn patch_manifest(
    input: &str,
    profile: &PatchProfile,
    ctx: &PatchContext,
) -> Result<PatchReport, PatchError> {
    let templates = TemplatesFile::builtin().map_err(|e| PatchError::Template(e.to_string()))?;
    patch_manifest_with(input, profile, &templates, ctx)
}

pub fn patch_manifest_with(
    input: &str,
    profile: &PatchProfile,
    templates: &TemplatesFile,
    ctx: &PatchContext,
) -> Result<PatchReport, PatchError> {
    let renderer = TemplateRenderer::new(templates).map_err(|e| PatchError::Template(e.to_string()))?;
    let runner = standard_runner(profile, &renderer)?;
    let report = runner.run_text(input, ctx)?;

    let patched = parse_manifest(&report.output)?;
    verify_removed(&patched, &profile.remove_stages).map_err(|source: PassError| PatchError::Pass {
        pass: VERIFY_ID.to_string(),
        source,
    })?;

    info!(
        pipeline = %report.pipeline_id,
        changed = report.changed,
        passes_changed = report.changed_passes().count(),
        "manifest patched"
    );
    Ok(report)
}
