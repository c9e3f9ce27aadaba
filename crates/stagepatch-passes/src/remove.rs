use stagefile::locator::{find_dependents, find_mounts, find_references, find_stage, instruction_region, stage_region};
use stagefile::Manifest;
use stagepatch_core::{Pass, PassError, PatchContext, PatchPhase};
use tracing::{debug, info};

/// Deletes every stage of the Removal Set together with each
/// `COPY/ADD --from=<stage>` that consumes it.
pub struct RemoveStagesPass {
    stages: Vec<String>,
}

impl RemoveStagesPass {
    pub fn new(stages: Vec<String>) -> Self {
        Self { stages }
    }

    /// A stage built `FROM` a removed one cannot be patched around
    fn check_dependents(&self, manifest: &Manifest) -> Result<(), PassError> {
        for name in &self.stages {
            for idx in find_dependents(manifest, name) {
                let dependent = match &manifest.stages[idx].name {
                    Some(n) if self.stages.contains(n) => continue,
                    Some(n) => n.clone(),
                    None => format!("#{}", idx),
                };
                return Err(PassError::DependentStage { stage: name.clone(), dependent });
            }
            // A RUN cannot be dropped without changing what its stage builds
            for path in find_mounts(manifest, name) {
                let consumer = &manifest.stages[path.stage];
                if consumer.name.as_ref().map(|n| self.stages.contains(n)).unwrap_or(false) {
                    continue;
                }
                let consumer = consumer.name.clone().unwrap_or_else(|| format!("#{}", path.stage));
                return Err(PassError::MountedStage { stage: name.clone(), consumer });
            }
        }
        Ok(())
    }
}

impl Pass for RemoveStagesPass {
    fn id(&self) -> &'static str {
        "remove.stages.v1"
    }

    fn phase(&self) -> PatchPhase {
        PatchPhase::Removal
    }

    fn run(&self, mut manifest: Manifest, _ctx: &PatchContext) -> Result<Manifest, PassError> {
        self.check_dependents(&manifest)?;

        for name in &self.stages {
            match find_stage(&manifest, name)? {
                Some(idx) => {
                    let span = stage_region(&manifest, idx);
                    manifest.stages.remove(idx);
                    info!(stage = %name, bytes = ?span, "removed stage definition");
                }
                None => debug!(stage = %name, "stage already absent"),
            }

            // Removed even when the definition is gone, so half-patched
            // manifests converge.
            let refs = find_references(&manifest, name);
            for path in refs.iter().rev() {
                debug!(stage = %name, bytes = ?instruction_region(&manifest, *path), "removing artifact copy");
                manifest.stages[path.stage].body.remove(path.index);
            }
            if !refs.is_empty() {
                info!(stage = %name, count = refs.len(), "removed artifact copies");
            }
        }

        Ok(manifest)
    }
}

/// Fails when any removed stage is still defined, copied from, mounted or
/// built upon
pub fn verify_removed(manifest: &Manifest, stages: &[String]) -> Result<(), PassError> {
    for name in stages {
        let count = find_references(manifest, name).len()
            + find_mounts(manifest, name).len()
            + find_dependents(manifest, name).len()
            + usize::from(find_stage(manifest, name)?.is_some());
        if count > 0 {
            return Err(PassError::DanglingReference { stage: name.clone(), count });
        }
    }
    Ok(())
}
