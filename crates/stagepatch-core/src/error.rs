//! Unified Error Model
use crate::pass::PassError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("MISSING/{}", .0.display())]
    MissingFile(PathBuf),

    #[error("IO/{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PARSE/{0}")]
    Parse(#[from] stagefile::ParseError),

    #[error("PROFILE/{0}")]
    Profile(String),

    #[error("TEMPLATE/{0}")]
    Template(String),

    #[error("PASS/{pass}: {source}")]
    Pass {
        pass: String,
        #[source]
        source: PassError,
    },

    #[error("ARTIFACTS/{}", .0.join("; "))]
    Artifacts(Vec<String>),
}

impl PatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
