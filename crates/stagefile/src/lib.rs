//! Stagefile: lossless block model for multi-stage build manifests.
//!
//! Manifest text is parsed once into a preamble and a list of stage blocks.
//! Every block keeps its raw physical lines, so serializing an unmodified
//! manifest reproduces the input byte for byte and edits only touch the
//! blocks they target.
pub mod ast;
pub mod locator;
pub mod parser;
pub mod serializer;

pub use ast::{Instruction, InstructionKind, Manifest, StageBlock};
pub use locator::{InstructionPath, ListRegion, LocateError};
pub use parser::{parse_manifest, ParseError};
pub use serializer::serialize_manifest;
