//! Region lookup over a parsed manifest.
//!
//! Absence is reported as `None`/empty so callers decide whether it means
//! "already patched" or "cannot patch". A marker that must be unique but
//! matches more than once is `LocateError::Ambiguous`.

use crate::ast::{strip_terminator, Instruction, InstructionKind, Manifest, StageBlock};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("marker `{marker}` matched {count} times, expected at most one")]
    Ambiguous { marker: String, count: usize },
    #[error("list `{marker}` is not followed by `{sentinel}`")]
    Unterminated { marker: String, sentinel: String },
}

/// Position of an instruction inside a stage body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPath {
    pub stage: usize,
    pub index: usize,
}

/// Physical-line span of an option list inside one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRegion {
    /// Line holding the lead token
    pub lead_line: usize,
    /// Byte offset just past the lead token within `lead_line`
    pub lead_end: usize,
    /// First line after the list (exclusive)
    pub end: usize,
    /// Byte offset of the sentinel within `lead_line` when the whole list
    /// sits on that one line
    pub inline_end: Option<usize>,
}

pub fn find_stage(manifest: &Manifest, name: &str) -> Result<Option<usize>, LocateError> {
    let hits: Vec<usize> = manifest
        .stages
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_named(name))
        .map(|(i, _)| i)
        .collect();
    unique(hits, name)
}

/// Byte span of a stage: its FROM line up to the next FROM or end of text
pub fn stage_region(manifest: &Manifest, index: usize) -> Range<usize> {
    let start = preamble_len(manifest)
        + manifest.stages[..index].iter().map(StageBlock::byte_len).sum::<usize>();
    start..start + manifest.stages[index].byte_len()
}

/// Byte span of a body instruction
pub fn instruction_region(manifest: &Manifest, path: InstructionPath) -> Range<usize> {
    let stage = &manifest.stages[path.stage];
    let start = stage_region(manifest, path.stage).start
        + stage.comments.iter().map(Instruction::byte_len).sum::<usize>()
        + stage.header.byte_len()
        + stage.body[..path.index].iter().map(Instruction::byte_len).sum::<usize>();
    start..start + stage.body[path.index].byte_len()
}

/// Every `COPY/ADD --from=<name>` in document order
pub fn find_references(manifest: &Manifest, name: &str) -> Vec<InstructionPath> {
    let mut out = Vec::new();
    for (s, stage) in manifest.stages.iter().enumerate() {
        for (i, ins) in stage.body.iter().enumerate() {
            if ins.copy_source(manifest.escape).as_deref() == Some(name) {
                out.push(InstructionPath { stage: s, index: i });
            }
        }
    }
    out
}

/// Every RUN whose `--mount` reads from `<name>`
pub fn find_mounts(manifest: &Manifest, name: &str) -> Vec<InstructionPath> {
    let mut out = Vec::new();
    for (s, stage) in manifest.stages.iter().enumerate() {
        for (i, ins) in stage.body.iter().enumerate() {
            if ins.mount_sources(manifest.escape).iter().any(|m| m == name) {
                out.push(InstructionPath { stage: s, index: i });
            }
        }
    }
    out
}

/// Stages declared `FROM <name>`
pub fn find_dependents(manifest: &Manifest, name: &str) -> Vec<usize> {
    manifest
        .stages
        .iter()
        .enumerate()
        .filter(|(_, s)| s.base == name)
        .map(|(i, _)| i)
        .collect()
}

/// Body instruction with the given keyword that mentions `lead` as a token
pub fn find_instruction(
    stage: &StageBlock,
    keyword: &str,
    lead: &str,
) -> Result<Option<usize>, LocateError> {
    let hits: Vec<usize> = stage
        .body
        .iter()
        .enumerate()
        .filter(|(_, ins)| ins.is_command(keyword))
        .filter(|(_, ins)| ins.lines.iter().any(|l| !is_comment(l) && token_position(l, lead).is_some()))
        .map(|(i, _)| i)
        .collect();
    unique(hits, lead)
}

/// Locate an option list starting at `lead`.
///
/// With a sentinel the list ends where the sentinel starts a token on the
/// lead line itself, or else before the first following line whose trimmed
/// text starts with it. Without one it runs to the end of the instruction.
pub fn list_region(
    ins: &Instruction,
    lead: &str,
    until: Option<&str>,
) -> Result<Option<ListRegion>, LocateError> {
    let hits: Vec<(usize, usize)> = ins
        .lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !is_comment(l))
        .filter_map(|(i, l)| token_position(l, lead).map(|pos| (i, pos + lead.len())))
        .collect();

    let (lead_line, lead_end) = match hits.as_slice() {
        [] => return Ok(None),
        [hit] => *hit,
        _ => {
            return Err(LocateError::Ambiguous { marker: lead.to_string(), count: hits.len() })
        }
    };

    if let Some(pos) = until.and_then(|sentinel| token_position(&ins.lines[lead_line][lead_end..], sentinel)) {
        let inline_end = Some(lead_end + pos);
        return Ok(Some(ListRegion { lead_line, lead_end, end: lead_line + 1, inline_end }));
    }

    let end = match until {
        None => ins.lines.len(),
        Some(sentinel) => ins.lines[lead_line + 1..]
            .iter()
            .position(|l| strip_terminator(l).trim_start().starts_with(sentinel))
            .map(|p| lead_line + 1 + p)
            .ok_or_else(|| LocateError::Unterminated {
                marker: lead.to_string(),
                sentinel: sentinel.to_string(),
            })?,
    };

    Ok(Some(ListRegion { lead_line, lead_end, end, inline_end: None }))
}

/// Byte offset of `lead` in `line` where it starts a token and is not
/// immediately followed by more identifier characters.
pub fn token_position(line: &str, lead: &str) -> Option<usize> {
    if lead.is_empty() {
        return None;
    }
    let content = strip_terminator(line);
    let word_tail = lead.chars().last().map(is_word).unwrap_or(false);
    content.match_indices(lead).map(|(pos, _)| pos).find(|&pos| {
        let before_ok = content[..pos].chars().last().map(char::is_whitespace).unwrap_or(true);
        let after_ok = !word_tail
            || content[pos + lead.len()..].chars().next().map(|c| !is_word(c)).unwrap_or(true);
        before_ok && after_ok
    })
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

fn is_comment(line: &str) -> bool {
    strip_terminator(line).trim_start().starts_with('#')
}

fn preamble_len(manifest: &Manifest) -> usize {
    manifest.preamble.iter().map(Instruction::byte_len).sum()
}

fn unique(hits: Vec<usize>, marker: &str) -> Result<Option<usize>, LocateError> {
    match hits.len() {
        0 => Ok(None),
        1 => Ok(Some(hits[0])),
        count => Err(LocateError::Ambiguous { marker: marker.to_string(), count }),
    }
}

/// Whether any instruction carries this logical text, whitespace runs
/// compared as a single space
pub fn contains_instruction(manifest: &Manifest, logical: &str) -> bool {
    let wanted: Vec<&str> = logical.split_whitespace().collect();
    manifest
        .instructions()
        .filter(|i| matches!(i.kind, InstructionKind::Command { .. }))
        .any(|i| i.logical(manifest.escape).split_whitespace().eq(wanted.iter().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_manifest;
    use crate::serializer::serialize_manifest;

    const MANIFEST: &str = "\
ARG V=1

FROM alpine AS base

FROM base AS aom-builder
RUN make install

FROM base AS ffmpeg-builder
COPY --from=aom-builder /opt/aom /opt/aom
RUN ./configure \\
    --prefix=/opt/ffmpeg \\
    --enable-libaom && \\
    make
";

    #[test]
    fn test_stage_region_slices_text() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let text = serialize_manifest(&manifest);
        let idx = find_stage(&manifest, "aom-builder").unwrap().unwrap();
        assert_eq!(&text[stage_region(&manifest, idx)], "FROM base AS aom-builder\nRUN make install\n\n");
        assert_eq!(find_stage(&manifest, "x265-builder").unwrap(), None);
    }

    #[test]
    fn test_duplicate_stage_is_ambiguous() {
        let manifest = parse_manifest("FROM a AS x\nFROM b AS x\n").unwrap();
        assert_eq!(
            find_stage(&manifest, "x"),
            Err(LocateError::Ambiguous { marker: "x".to_string(), count: 2 })
        );
    }

    #[test]
    fn test_references_and_dependents() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let refs = find_references(&manifest, "aom-builder");
        assert_eq!(refs, vec![InstructionPath { stage: 2, index: 0 }]);
        let text = serialize_manifest(&manifest);
        assert_eq!(
            &text[instruction_region(&manifest, refs[0])],
            "COPY --from=aom-builder /opt/aom /opt/aom\n"
        );
        assert_eq!(find_dependents(&manifest, "base"), vec![1, 2]);
    }

    #[test]
    fn test_list_region_with_sentinel() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        let stage = &manifest.stages[2];
        let idx = find_instruction(stage, "RUN", "./configure").unwrap().unwrap();
        let region = list_region(&stage.body[idx], "./configure", Some("make")).unwrap().unwrap();
        assert_eq!(region.lead_line, 0);
        assert_eq!(region.lead_end, "RUN ./configure".len());
        assert_eq!(region.end, 3);

        let err = list_region(&stage.body[idx], "./configure", Some("ninja")).unwrap_err();
        assert!(matches!(err, LocateError::Unterminated { .. }));
    }

    #[test]
    fn test_list_region_on_one_line() {
        let manifest = parse_manifest("FROM a AS b\nRUN ./configure --a --b && make\n").unwrap();
        let ins = &manifest.stages[0].body[0];
        let region = list_region(ins, "./configure", Some("&& make")).unwrap().unwrap();
        assert_eq!(region.end, 1);
        assert_eq!(region.inline_end, Some("RUN ./configure --a --b ".len()));
    }

    #[test]
    fn test_mounts_are_found() {
        let manifest = parse_manifest(
            "FROM a AS zimg-builder\nFROM a AS app\nRUN --mount=type=bind,from=zimg-builder,target=/opt cp /opt/x /x\n",
        )
        .unwrap();
        assert_eq!(find_mounts(&manifest, "zimg-builder"), vec![InstructionPath { stage: 1, index: 0 }]);
        assert!(find_references(&manifest, "zimg-builder").is_empty());
    }

    #[test]
    fn test_contains_instruction_ignores_spacing() {
        let manifest = parse_manifest("FROM a AS b\nCOPY  --from=x   /opt /opt\n").unwrap();
        assert!(contains_instruction(&manifest, "COPY --from=x /opt /opt"));
        assert!(!contains_instruction(&manifest, "COPY --from=x /opt /usr"));
    }

    #[test]
    fn test_token_position_respects_boundaries() {
        assert_eq!(token_position("RUN ./configure \\\n", "./configure"), Some(4));
        assert_eq!(token_position("RUN ./configure.sh\n", "./configure"), None);
        assert_eq!(token_position("ENV CGO_LDFLAGS=\"-L/x \\\n", "CGO_LDFLAGS=\""), Some(4));
        assert_eq!(token_position("ENV XCGO_LDFLAGS=1\n", "CGO_LDFLAGS"), None);
    }
}
