use crate::ast::Manifest;

/// Concatenate every raw line back into manifest text
pub fn serialize_manifest(manifest: &Manifest) -> String {
    let mut out = String::new();
    for ins in &manifest.preamble {
        out.push_str(&ins.text());
    }
    for stage in &manifest.stages {
        out.push_str(&stage.text());
    }
    out
}
