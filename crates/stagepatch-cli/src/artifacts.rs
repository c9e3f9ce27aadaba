//! Auxiliary artifacts written next to the manifest: the companion build
//! script for the inserted stage and the patched FFmpeg helper script.
//!
//! Each artifact is handled on its own; one failing does not stop the other.
use crate::workspace::{read_text, write_atomic, Workspace};
use stagepatch_core::{CompanionScript, HelperScript, PatchError, PatchPhase, PatchProfile};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Written,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ArtifactOutcome {
    pub path: PathBuf,
    pub status: ArtifactStatus,
}

/// Write the companion script (mode 0o755). Rewritten only when its contents
/// differ; the mode is enforced either way.
pub fn persist_companion_script(ws: &Workspace, spec: &CompanionScript) -> Result<ArtifactOutcome, PatchError> {
    let path = ws.script_path(&spec.name);
    let current = std::fs::read_to_string(&path).ok();

    let status = if current.as_deref() == Some(spec.contents.as_str()) {
        debug!(path = %path.display(), "companion script up to date");
        ArtifactStatus::Unchanged
    } else {
        write_atomic(&path, &spec.contents)?;
        info!(path = %path.display(), "wrote companion script");
        ArtifactStatus::Written
    };

    make_executable(&path)?;
    Ok(ArtifactOutcome { path, status })
}

/// Drop every configured substring from the helper script
pub fn patch_helper_script(ws: &Workspace, spec: &HelperScript) -> Result<ArtifactOutcome, PatchError> {
    let path = ws.script_path(&spec.name);
    let current = read_text(&path)?;
    let patched = spec
        .remove
        .iter()
        .filter(|s| !s.is_empty())
        .fold(current.clone(), |text, needle| text.replace(needle.as_str(), ""));

    let status = if patched == current {
        debug!(path = %path.display(), "helper script already patched");
        ArtifactStatus::Unchanged
    } else {
        write_atomic(&path, &patched)?;
        info!(path = %path.display(), "patched helper script");
        ArtifactStatus::Written
    };
    Ok(ArtifactOutcome { path, status })
}

/// Run both artifact steps, collecting failures into one `Artifacts` error
pub fn persist_all(ws: &Workspace, profile: &PatchProfile) -> Result<Vec<ArtifactOutcome>, PatchError> {
    let results = [
        persist_companion_script(ws, &profile.companion_script),
        patch_helper_script(ws, &profile.helper_script),
    ];

    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => failures.push(e.to_string()),
        }
    }

    if failures.is_empty() {
        Ok(outcomes)
    } else {
        warn!(
            phase = PatchPhase::PersistAuxiliaryArtifacts.as_str(),
            failed = failures.len(),
            "artifact steps failed"
        );
        Err(PatchError::Artifacts(failures))
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), PatchError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path).map_err(|e| PatchError::io(path, e))?.permissions();
    if perms.mode() & 0o777 != 0o755 {
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(|e| PatchError::io(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), PatchError> {
    Ok(())
}
