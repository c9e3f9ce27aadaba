use stagefile::ast::{continues, leading_whitespace, strip_terminator, terminator};
use stagefile::locator::{find_instruction, find_stage, list_region};
use stagefile::{Instruction, ListRegion, Manifest};
use stagepatch_core::{OptionListSpec, Pass, PassError, PatchContext, PatchPhase};
use tracing::info;

/// Replaces every token of one option list with the configured ones.
///
/// The list, its stage and its sentinel must all be present: a list that
/// cannot be found means the manifest drifted from the shape the profile was
/// written for.
pub struct RewriteOptionsPass {
    id: &'static str,
    phase: PatchPhase,
    spec: OptionListSpec,
}

impl RewriteOptionsPass {
    pub fn configure_flags(spec: OptionListSpec) -> Self {
        Self { id: "rewrite.configure-flags.v1", phase: PatchPhase::ConfigureFlagsRewrite, spec }
    }

    pub fn lib_flags(spec: OptionListSpec) -> Self {
        Self { id: "rewrite.lib-flags.v1", phase: PatchPhase::LibFlagsRewrite, spec }
    }

    fn missing(&self, detail: String) -> PassError {
        PassError::ListMissing { list: self.phase.as_str().to_string(), detail }
    }
}

impl Pass for RewriteOptionsPass {
    fn id(&self) -> &'static str {
        self.id
    }

    fn phase(&self) -> PatchPhase {
        self.phase
    }

    fn run(&self, mut manifest: Manifest, _ctx: &PatchContext) -> Result<Manifest, PassError> {
        let spec = &self.spec;
        let escape = manifest.escape;

        let s = find_stage(&manifest, &spec.stage)?
            .ok_or_else(|| self.missing(format!("stage `{}` not found", spec.stage)))?;
        let stage = &mut manifest.stages[s];

        let i = find_instruction(stage, &spec.keyword, &spec.lead)?.ok_or_else(|| {
            self.missing(format!("no {} instruction with `{}` in `{}`", spec.keyword, spec.lead, spec.stage))
        })?;
        let ins = &mut stage.body[i];

        let region = list_region(ins, &spec.lead, spec.until.as_deref())?
            .ok_or_else(|| self.missing(format!("lead `{}` not found", spec.lead)))?;

        let block = render_list(ins, &region, spec, escape);
        let replaced = region.end - region.lead_line;
        ins.lines.splice(region.lead_line..region.end, block);

        info!(
            list = self.phase.as_str(),
            stage = %spec.stage,
            replaced_lines = replaced,
            tokens = spec.tokens.len(),
            "rewrote option list"
        );
        Ok(manifest)
    }
}

/// Lead line kept up to the lead token, then one token per line. The last
/// line keeps the original list's continuation and terminator so whatever
/// follows the list still parses.
fn render_list(ins: &Instruction, region: &ListRegion, spec: &OptionListSpec, escape: char) -> Vec<String> {
    let lead_line = &ins.lines[region.lead_line];
    let head = &strip_terminator(lead_line)[..region.lead_end];
    let newline = match terminator(lead_line) {
        "" => "\n",
        t => t,
    };

    let last_line = &ins.lines[region.end - 1];
    let last_term = terminator(last_line);
    let last_cont = if continues(last_line, escape) { format!(" {}", escape) } else { String::new() };
    let cont = format!(" {}", escape);

    let indent = ins.lines[region.lead_line + 1..region.end]
        .iter()
        .map(|l| strip_terminator(l))
        .find(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|l| leading_whitespace(l).to_string())
        .unwrap_or_else(|| format!("{}    ", leading_whitespace(lead_line)));

    let close = spec.close.as_deref().unwrap_or("");

    // Single-line list: keep the line single, sentinel and rest untouched
    if let Some(inline_end) = region.inline_end {
        let tail = &strip_terminator(lead_line)[inline_end..];
        let tokens: String = spec.tokens.iter().map(|t| format!(" {}", t)).collect();
        return vec![format!("{}{}{} {}{}", head, tokens, close, tail, terminator(lead_line))];
    }

    let Some((last, rest)) = spec.tokens.split_last() else {
        return vec![format!("{}{}{}{}", head, close, last_cont, last_term)];
    };

    let mut out = Vec::with_capacity(spec.tokens.len() + 1);
    out.push(format!("{}{}{}", head, cont, newline));
    for token in rest {
        out.push(format!("{}{}{}{}", indent, token, cont, newline));
    }
    out.push(format!("{}{}{}{}{}", indent, last, close, last_cont, last_term));
    out
}
