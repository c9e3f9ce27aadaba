//! Stagepatch Render: handlebars rendering of inserted manifest text.
//!
//! Two templates are used by the inserter: `stage_block`, the full text of
//! the new stage, and `stage_reference`, the instruction that copies its
//! artifacts into the consuming stage.

pub mod renderer;
pub mod templates;

pub use renderer::TemplateRenderer;
pub use templates::TemplatesFile;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template load failed: {0}")]
    Template(String),
    #[error("Render failed: {0}")]
    Render(String),
}

pub const STAGE_BLOCK: &str = "stage_block";
pub const STAGE_REFERENCE: &str = "stage_reference";
