use crate::ast::{continues, strip_terminator, Instruction, InstructionKind, Manifest, StageBlock, DEFAULT_ESCAPE};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref KEYWORD: Regex = Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)").unwrap();
    static ref FROM_HEADER: Regex =
        Regex::new(r"(?i)^FROM\s+(?:--\S+\s+)*(\S+)(?:\s+AS\s+(\S+))?\s*$").unwrap();
    static ref DIRECTIVE: Regex = Regex::new(r"^#\s*([A-Za-z]+)\s*=\s*(\S+)\s*$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,
    #[error("invalid FROM header at line {line}")]
    InvalidHeader { line: usize },
    #[error("unsupported escape character `{0}`")]
    InvalidEscape(String),
}

/// Parse manifest text into preamble and stage blocks.
///
/// Lossless: `serialize_manifest(&parse_manifest(s)?) == s` for every input
/// that parses.
pub fn parse_manifest(input: &str) -> Result<Manifest, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty);
    }
    let escape = detect_escape(input)?;

    let mut preamble = Vec::new();
    let mut stages: Vec<StageBlock> = Vec::new();

    for (line, ins) in split_instructions(input, escape) {
        if ins.is_command("FROM") {
            let logical = ins.logical(escape);
            let caps = FROM_HEADER
                .captures(&logical)
                .ok_or(ParseError::InvalidHeader { line })?;
            let base = caps[1].to_string();
            let name = caps.get(2).map(|m| m.as_str().to_string());
            let comments = match stages.last_mut() {
                Some(previous) => trailing_comments(&mut previous.body, 0),
                None => {
                    let directives = preamble.iter().take_while(|i| is_directive(i)).count();
                    trailing_comments(&mut preamble, directives)
                }
            };
            stages.push(StageBlock { comments, header: ins, base, name, body: Vec::new() });
        } else if let Some(stage) = stages.last_mut() {
            stage.body.push(ins);
        } else {
            preamble.push(ins);
        }
    }

    Ok(Manifest { escape, preamble, stages })
}

/// Comments directly above a FROM move from the tail of the previous stage
/// (or of the preamble) to the stage they describe. Nothing below `floor`
/// is taken.
fn trailing_comments(block: &mut Vec<Instruction>, floor: usize) -> Vec<Instruction> {
    let count = block[floor..]
        .iter()
        .rev()
        .take_while(|i| i.kind == InstructionKind::Comment)
        .count();
    block.split_off(block.len() - count)
}

fn is_directive(ins: &Instruction) -> bool {
    ins.kind == InstructionKind::Comment
        && ins.lines.first().map(|l| DIRECTIVE.is_match(strip_terminator(l).trim())).unwrap_or(false)
}

/// Parser directives (`# escape=`) are only honoured before the first
/// non-directive line.
fn detect_escape(input: &str) -> Result<char, ParseError> {
    for line in input.lines() {
        let Some(caps) = DIRECTIVE.captures(line.trim()) else {
            break;
        };
        if caps[1].eq_ignore_ascii_case("escape") {
            return match &caps[2] {
                "\\" => Ok('\\'),
                "`" => Ok('`'),
                other => Err(ParseError::InvalidEscape(other.to_string())),
            };
        }
    }
    Ok(DEFAULT_ESCAPE)
}

/// Group physical lines into logical instructions, tagged with the 1-based
/// line each one starts on. Comment lines inside a continuation stay with the
/// instruction; a blank line closes it.
fn split_instructions(input: &str, escape: char) -> Vec<(usize, Instruction)> {
    let mut out = Vec::new();
    let mut open: Option<(usize, Instruction)> = None;

    for (i, line) in input.split_inclusive('\n').enumerate() {
        let trimmed = strip_terminator(line).trim();

        if let Some((start, mut ins)) = open.take() {
            if trimmed.starts_with('#') {
                ins.lines.push(line.to_string());
                open = Some((start, ins));
                continue;
            }
            if !trimmed.is_empty() {
                ins.lines.push(line.to_string());
                if continues(line, escape) {
                    open = Some((start, ins));
                } else {
                    out.push((start, ins));
                }
                continue;
            }
            out.push((start, ins));
        }

        let kind = if trimmed.is_empty() {
            InstructionKind::Blank
        } else if trimmed.starts_with('#') {
            InstructionKind::Comment
        } else {
            let keyword = KEYWORD
                .captures(trimmed)
                .map(|c| c[1].to_uppercase())
                .unwrap_or_default();
            InstructionKind::Command { keyword }
        };

        let is_command = matches!(kind, InstructionKind::Command { .. });
        let ins = Instruction { kind, lines: vec![line.to_string()] };
        if is_command && continues(line, escape) {
            open = Some((i + 1, ins));
        } else {
            out.push((i + 1, ins));
        }
    }

    if let Some(pending) = open {
        out.push(pending);
    }
    out
}
