//! Pipeline Runner: encadeia passes com hash de entrada/saída e latência
use crate::context::PatchContext;
use crate::data_model::{PassProof, PatchReport};
use crate::error::PatchError;
use crate::pass::Pass;
use stagefile::{parse_manifest, serialize_manifest, Manifest};
use std::time::Instant;
use tracing::{debug, info};

pub struct PatchRunner {
    passes: Vec<Box<dyn Pass>>,
    pipeline_id: String,
}

impl PatchRunner {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        let pipeline_id = passes
            .iter()
            .map(|p| p.phase().as_str())
            .collect::<Vec<_>>()
            .join("→");

        Self { passes, pipeline_id }
    }

    /// Thread the manifest through every pass. The first failing pass aborts
    /// the run; nothing is returned for partial progress.
    pub fn run(
        &self,
        manifest: Manifest,
        ctx: &PatchContext,
    ) -> Result<(Manifest, Vec<PassProof>), PatchError> {
        let mut current = manifest;
        let mut proofs = Vec::new();

        for pass in &self.passes {
            let start = Instant::now();
            let in_hash = self.hash_manifest(&current);
            info!(pass = pass.id(), run_id = %ctx.run_id, "running pass");

            current = pass.run(current, ctx).map_err(|source| PatchError::Pass {
                pass: pass.id().to_string(),
                source,
            })?;

            let out_hash = self.hash_manifest(&current);
            let changed = in_hash != out_hash;
            if !changed {
                debug!(pass = pass.id(), "pass left manifest unchanged");
            }

            proofs.push(PassProof {
                id: pass.id().to_string(),
                phase: pass.phase(),
                in_hash,
                out_hash,
                changed,
                latency_ms: start.elapsed().as_millis() as u64,
            });
        }

        Ok((current, proofs))
    }

    /// Parse, run and serialize in one go
    pub fn run_text(&self, input: &str, ctx: &PatchContext) -> Result<PatchReport, PatchError> {
        let started_at = chrono::Utc::now();
        let manifest = parse_manifest(input)?;
        let (manifest, passes) = self.run(manifest, ctx)?;
        let output = serialize_manifest(&manifest);

        Ok(PatchReport {
            run_id: ctx.run_id.clone(),
            pipeline_id: self.pipeline_id.clone(),
            started_at,
            passes,
            changed: output != input,
            output,
        })
    }

    fn hash_manifest(&self, manifest: &Manifest) -> String {
        format!("blake3:{}", blake3::hash(serialize_manifest(manifest).as_bytes()))
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }
}
