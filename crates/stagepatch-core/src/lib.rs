//! Stagepatch Core: Pass trait, Runner, Profile e Data Model
//!
//! Núcleo do motor de patch: cada pass consome o manifesto e devolve o
//! manifesto editado, em ordem fixa.

pub mod context;
pub mod data_model;
pub mod error;
pub mod pass;
pub mod profile;
pub mod runner;

pub use context::PatchContext;
pub use data_model::{PassProof, PatchPhase, PatchReport};
pub use error::PatchError;
pub use pass::{Pass, PassError};
pub use profile::{
    CompanionScript, EnvOverride, HelperScript, InsertSpec, NewStage, OptionListSpec, PatchProfile, ReferenceSpec,
    SourceSpec, DEFAULT_PRESET,
};
pub use runner::PatchRunner;

/// Versão do motor de patch
pub const STAGEPATCH_VERSION: &str = "1.0.0";
