//! Pass Trait: contrato único para todos os passes
use crate::context::PatchContext;
use crate::data_model::PatchPhase;
use stagefile::{LocateError, Manifest};

/// One ordered edit over the manifest
pub trait Pass: Send + Sync {
    /// ID único do pass (ex: "remove.stages.v1")
    fn id(&self) -> &'static str;

    fn phase(&self) -> PatchPhase;

    /// Consume the manifest and return the edited one. Re-running a pass on
    /// its own output must return it unchanged.
    fn run(&self, manifest: Manifest, ctx: &PatchContext) -> Result<Manifest, PassError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// Insertion anchor stage is absent and the new stage is not there either
    AnchorMissing { anchor: String },
    /// Anchor stage has no reference instruction to insert after
    AnchorReferenceMissing { anchor: String },
    /// A remaining stage is built `FROM` a stage scheduled for removal
    DependentStage { stage: String, dependent: String },
    /// A remaining RUN mounts (`--mount=...,from=`) a stage scheduled for removal
    MountedStage { stage: String, consumer: String },
    /// Stage or ENV key of a pinned value is absent
    EnvMissing { stage: String, key: String },
    /// Option list's stage, instruction or lead token is absent
    ListMissing { list: String, detail: String },
    /// A removed stage is still referenced after the pipeline ran
    DanglingReference { stage: String, count: usize },
    Locate(LocateError),
    Render(String),
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::AnchorMissing { anchor } => write!(f, "ANCHOR/MISSING: stage `{}` not found", anchor),
            Self::AnchorReferenceMissing { anchor } => {
                write!(f, "ANCHOR/REFERENCE: no `COPY --from={}` to insert after", anchor)
            }
            Self::DependentStage { stage, dependent } => {
                write!(f, "REMOVE/DEPENDENT: stage `{}` is built from `{}`", dependent, stage)
            }
            Self::MountedStage { stage, consumer } => {
                write!(f, "REMOVE/MOUNTED: a RUN in `{}` mounts `{}`", consumer, stage)
            }
            Self::EnvMissing { stage, key } => write!(f, "ENV/MISSING: no `{}` in stage `{}`", key, stage),
            Self::ListMissing { list, detail } => write!(f, "LIST/MISSING: {}: {}", list, detail),
            Self::DanglingReference { stage, count } => {
                write!(f, "REFERENCE/DANGLING: `{}` still referenced {} time(s)", stage, count)
            }
            Self::Locate(e) => write!(f, "LOCATE: {}", e),
            Self::Render(msg) => write!(f, "RENDER: {}", msg),
        }
    }
}

impl std::error::Error for PassError {}

impl From<LocateError> for PassError {
    fn from(e: LocateError) -> Self {
        Self::Locate(e)
    }
}
