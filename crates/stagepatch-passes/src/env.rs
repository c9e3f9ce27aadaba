use stagefile::ast::{continues, strip_terminator, terminator};
use stagefile::locator::{find_instruction, find_stage, token_position};
use stagefile::{Instruction, Manifest};
use stagepatch_core::{EnvOverride, Pass, PassError, PatchContext, PatchPhase};
use tracing::{debug, info};

/// Pins `ENV` values (`KEY=value` or the legacy `KEY value` form) in named
/// stages. The key must already be declared; nothing is appended.
pub struct SetEnvPass {
    overrides: Vec<EnvOverride>,
}

impl SetEnvPass {
    pub fn new(overrides: Vec<EnvOverride>) -> Self {
        Self { overrides }
    }

    fn apply(&self, manifest: &mut Manifest, env: &EnvOverride) -> Result<(), PassError> {
        let missing = || PassError::EnvMissing { stage: env.stage.clone(), key: env.key.clone() };
        let escape = manifest.escape;

        let s = find_stage(manifest, &env.stage)?.ok_or_else(missing)?;
        let stage = &mut manifest.stages[s];
        let i = find_instruction(stage, "ENV", &env.key)?.ok_or_else(missing)?;
        let ins = &mut stage.body[i];

        let (line, pos) = ins
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !strip_terminator(l).trim_start().starts_with('#'))
            .find_map(|(n, l)| token_position(l, &env.key).map(|p| (n, p)))
            .ok_or_else(missing)?;

        let previous = set_value(ins, line, pos + env.key.len(), &env.value, escape);
        if previous == env.value {
            debug!(stage = %env.stage, key = %env.key, "env value already pinned");
        } else {
            info!(stage = %env.stage, key = %env.key, from = %previous, to = %env.value, "pinned env value");
        }
        Ok(())
    }
}

impl Pass for SetEnvPass {
    fn id(&self) -> &'static str {
        "set.env.v1"
    }

    fn phase(&self) -> PatchPhase {
        PatchPhase::EnvOverride
    }

    fn run(&self, mut manifest: Manifest, _ctx: &PatchContext) -> Result<Manifest, PassError> {
        for env in &self.overrides {
            self.apply(&mut manifest, env)?;
        }
        Ok(manifest)
    }
}

/// Replace the value that follows the key ending at `key_end` on `line` and
/// return the old one.
///
/// `KEY=value` ends at the first unquoted blank. In the legacy `KEY value`
/// form the value is the rest of the instruction, so its continuation lines
/// collapse into the key line.
fn set_value(ins: &mut Instruction, line: usize, key_end: usize, value: &str, escape: char) -> String {
    let raw = ins.lines[line].clone();
    let content = strip_terminator(&raw);
    let rest = &content[key_end..];

    if let Some(assigned) = rest.strip_prefix('=') {
        let start = key_end + 1;
        let end = start + value_len(assigned);
        let previous = content[start..end].to_string();
        ins.lines[line] = format!("{}{}{}{}", &content[..start], value, &content[end..], terminator(&raw));
        return previous;
    }

    let start = key_end + (rest.len() - rest.trim_start().len());
    let mut previous = content[start..].to_string();
    for next in &ins.lines[line + 1..] {
        previous.push(' ');
        previous.push_str(strip_terminator(next).trim());
    }
    let previous = previous
        .split_whitespace()
        .filter(|t| *t != escape.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let last = ins.lines.last().cloned().unwrap_or_default();
    let last_term = terminator(&last);
    let tail = if continues(&last, escape) { format!(" {}", escape) } else { String::new() };
    let head = &content[..start];
    let separator = if head.ends_with(char::is_whitespace) { "" } else { " " };

    ins.lines.truncate(line);
    ins.lines.push(format!("{}{}{}{}{}", head, separator, value, tail, last_term));
    previous
}

/// Byte length of an `=` value: a quoted run up to its closing quote, or
/// everything up to the next blank
fn value_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, quote @ ('"' | '\''))) => {
            let mut escaped = false;
            for (idx, c) in chars {
                if escaped {
                    escaped = false;
                } else if c == '\\' && quote == '"' {
                    escaped = true;
                } else if c == quote {
                    return idx + c.len_utf8();
                }
            }
            text.len()
        }
        _ => text.find(char::is_whitespace).unwrap_or(text.len()),
    }
}
