//! Patch Context: estado compartilhado durante o pipeline
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PatchContext {
    pub target_dir: PathBuf,
    pub run_id: String,
    /// Run every pass but never write to disk
    pub dry_run: bool,
}

impl PatchContext {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
