//! Data Model: PatchPhase, PassProof, PatchReport
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchPhase {
    EnvOverride,
    Removal,
    Insertion,
    ConfigureFlagsRewrite,
    LibFlagsRewrite,
    PersistAuxiliaryArtifacts,
}

impl PatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnvOverride => "env",
            Self::Removal => "removal",
            Self::Insertion => "insertion",
            Self::ConfigureFlagsRewrite => "configure-flags",
            Self::LibFlagsRewrite => "lib-flags",
            Self::PersistAuxiliaryArtifacts => "artifacts",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassProof {
    pub id: String,
    pub phase: PatchPhase,
    pub in_hash: String,
    pub out_hash: String,
    pub changed: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchReport {
    pub run_id: String,
    pub pipeline_id: String,
    pub started_at: DateTime<Utc>,
    pub passes: Vec<PassProof>,
    /// Patched manifest text
    pub output: String,
    /// Whether `output` differs from the input
    pub changed: bool,
}

impl PatchReport {
    pub fn changed_passes(&self) -> impl Iterator<Item = &PassProof> {
        self.passes.iter().filter(|p| p.changed)
    }
}
