use serde_json::json;
use stagefile::ast::terminator;
use stagefile::locator::{contains_instruction, find_references, find_stage};
use stagefile::{parse_manifest, Instruction, InstructionKind, Manifest, StageBlock};
use stagepatch_core::{InsertSpec, Pass, PassError, PatchContext, PatchPhase};
use stagepatch_render::{TemplateRenderer, STAGE_BLOCK, STAGE_REFERENCE};
use tracing::{debug, info};

/// Splices a rendered stage after the anchor stage and its artifact copy
/// after the anchor's own copy.
pub struct InsertStagePass {
    anchor: String,
    name: String,
    /// Rendered stage text, `\n` terminated
    block: String,
    /// Rendered reference instruction, single line without terminator
    reference: String,
}

impl InsertStagePass {
    /// Render both templates up front so `run` is a pure text edit
    pub fn new(
        spec: &InsertSpec,
        scripts_dir: &str,
        renderer: &TemplateRenderer,
    ) -> Result<Self, PassError> {
        let stage = &spec.stage;
        let block = renderer
            .render(
                STAGE_BLOCK,
                &json!({
                    "comment": stage.comment,
                    "image": stage.image,
                    "name": stage.name,
                    "env": stage.env,
                    "source": stage.source,
                    "scripts_dir": scripts_dir,
                    "script": stage.script,
                    "script_dest": stage.script_dest(),
                    "build": stage.build,
                }),
            )
            .map_err(|e| PassError::Render(e.to_string()))?;

        let parsed = parse_manifest(&block)
            .map_err(|e| PassError::Render(format!("stage block does not parse: {}", e)))?;
        let declared = parsed.stage_names();
        if !parsed.preamble.is_empty() || declared != [stage.name.as_str()] {
            return Err(PassError::Render(format!(
                "stage block must declare exactly stage `{}`, got {:?}",
                stage.name, declared
            )));
        }

        let reference = renderer
            .render(
                STAGE_REFERENCE,
                &json!({
                    "name": stage.name,
                    "source": spec.reference.source,
                    "destination": spec.reference.destination,
                }),
            )
            .map_err(|e| PassError::Render(e.to_string()))?
            .trim()
            .to_string();

        let parsed_ref = reference_instruction(&reference, "", "\n");
        if reference.contains('\n') || parsed_ref.copy_source('\\').as_deref() != Some(stage.name.as_str()) {
            return Err(PassError::Render(format!(
                "reference `{}` must be one COPY --from={} line",
                reference, stage.name
            )));
        }

        let block = if block.ends_with('\n') { block } else { format!("{}\n", block) };

        Ok(Self { anchor: spec.anchor.clone(), name: stage.name.clone(), block, reference })
    }

    fn insert_stage(&self, manifest: &mut Manifest) -> Result<(), PassError> {
        if find_stage(manifest, &self.name)?.is_some() {
            debug!(stage = %self.name, "stage already present");
            return Ok(());
        }
        let anchor = find_stage(manifest, &self.anchor)?
            .ok_or_else(|| PassError::AnchorMissing { anchor: self.anchor.clone() })?;

        let anchor_stage = &mut manifest.stages[anchor];
        let newline = line_ending(&anchor_stage.header);
        if !anchor_stage.ends_with_newline() {
            let last = anchor_stage.body.last_mut().unwrap_or(&mut anchor_stage.header);
            if let Some(line) = last.lines.last_mut() {
                line.push_str(newline);
            }
        }

        let mut stage = self.render_stage(newline)?;
        for _ in 0..anchor_stage.trailing_blanks() {
            stage.body.push(Instruction { kind: InstructionKind::Blank, lines: vec![newline.to_string()] });
        }

        manifest.stages.insert(anchor + 1, stage);
        info!(stage = %self.name, after = %self.anchor, "inserted stage");
        Ok(())
    }

    fn insert_reference(&self, manifest: &mut Manifest) -> Result<(), PassError> {
        if contains_instruction(manifest, &self.reference) {
            debug!(reference = %self.reference, "reference already present");
            return Ok(());
        }
        let last = find_references(manifest, &self.anchor)
            .last()
            .copied()
            .ok_or_else(|| PassError::AnchorReferenceMissing { anchor: self.anchor.clone() })?;

        let body = &mut manifest.stages[last.stage].body;
        let anchor_ref = &mut body[last.index];
        let indent = anchor_ref.indent().to_string();
        let newline = line_ending(anchor_ref);

        // Anchor reference closes the file without a newline: give it one and
        // let the new line close the file instead.
        let term = match anchor_ref.lines.last_mut() {
            Some(line) if terminator(line).is_empty() => {
                line.push_str(newline);
                ""
            }
            _ => newline,
        };

        body.insert(last.index + 1, reference_instruction(&self.reference, &indent, term));
        info!(reference = %self.reference, "inserted reference");
        Ok(())
    }

    fn render_stage(&self, newline: &str) -> Result<StageBlock, PassError> {
        let text = if newline == "\n" { self.block.clone() } else { self.block.replace('\n', newline) };
        parse_manifest(&text)
            .map_err(|e| PassError::Render(e.to_string()))?
            .stages
            .into_iter()
            .next()
            .ok_or_else(|| PassError::Render("stage block declares no stage".to_string()))
    }
}

impl Pass for InsertStagePass {
    fn id(&self) -> &'static str {
        "insert.stage.v1"
    }

    fn phase(&self) -> PatchPhase {
        PatchPhase::Insertion
    }

    fn run(&self, mut manifest: Manifest, _ctx: &PatchContext) -> Result<Manifest, PassError> {
        self.insert_stage(&mut manifest)?;
        self.insert_reference(&mut manifest)?;
        Ok(manifest)
    }
}

fn reference_instruction(reference: &str, indent: &str, term: &str) -> Instruction {
    Instruction {
        kind: InstructionKind::Command { keyword: "COPY".to_string() },
        lines: vec![format!("{}{}{}", indent, reference, term)],
    }
}

/// `\r\n` when the instruction uses it, `\n` otherwise
fn line_ending(ins: &Instruction) -> &'static str {
    match ins.lines.first().map(|l| terminator(l)) {
        Some("\r\n") => "\r\n",
        _ => "\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagefile::serialize_manifest;
    use stagepatch_core::{NewStage, ReferenceSpec, SourceSpec};
    use std::collections::BTreeMap;

    const MANIFEST: &str = "\
FROM alpine AS base

FROM base AS aom-builder
RUN make -C aom install

FROM base AS opus-builder
RUN make -C opus install

FROM base AS ffmpeg-builder
COPY --from=aom-builder /opt/aom /opt/aom
COPY --from=opus-builder /opt/opus /opt/opus
";

    fn spec() -> InsertSpec {
        InsertSpec {
            anchor: "aom-builder".to_string(),
            stage: NewStage {
                name: "svtav1-builder".to_string(),
                image: "base".to_string(),
                comment: None,
                env: BTreeMap::from([("SVTAV1_VERSION".to_string(), "v2.1.0".to_string())]),
                source: None,
                script: "build-svtav1.sh".to_string(),
                script_dest: None,
                build: "/usr/local/bin/build-svtav1.sh".to_string(),
            },
            reference: ReferenceSpec { source: "/opt/svtav1".to_string(), destination: None },
        }
    }

    fn pass() -> InsertStagePass {
        InsertStagePass::new(&spec(), "scripts", &TemplateRenderer::builtin().unwrap()).unwrap()
    }

    fn run(text: &str) -> Result<String, PassError> {
        let manifest = parse_manifest(text).unwrap();
        pass().run(manifest, &PatchContext::new(".")).map(|m| serialize_manifest(&m))
    }

    #[test]
    fn test_inserts_after_anchor() {
        let out = run(MANIFEST).unwrap();
        assert_eq!(
            out,
            "\
FROM alpine AS base

FROM base AS aom-builder
RUN make -C aom install

FROM base AS svtav1-builder
ENV SVTAV1_VERSION=v2.1.0
COPY scripts/build-svtav1.sh /usr/local/bin/build-svtav1.sh
RUN /usr/local/bin/build-svtav1.sh

FROM base AS opus-builder
RUN make -C opus install

FROM base AS ffmpeg-builder
COPY --from=aom-builder /opt/aom /opt/aom
COPY --from=svtav1-builder /opt/svtav1 /opt/svtav1
COPY --from=opus-builder /opt/opus /opt/opus
"
        );
    }

    #[test]
    fn test_rerun_does_not_duplicate() {
        let once = run(MANIFEST).unwrap();
        assert_eq!(run(&once).unwrap(), once);
        assert_eq!(once.matches("AS svtav1-builder").count(), 1);
        assert_eq!(once.matches("--from=svtav1-builder").count(), 1);
    }

    #[test]
    fn test_missing_anchor_is_an_error() {
        let text = MANIFEST.replace("aom-builder", "dav1d-builder");
        assert_eq!(
            run(&text).unwrap_err(),
            PassError::AnchorMissing { anchor: "aom-builder".to_string() }
        );
    }

    #[test]
    fn test_missing_anchor_reference_is_an_error() {
        let text = MANIFEST.replace("COPY --from=aom-builder /opt/aom /opt/aom\n", "");
        assert_eq!(
            run(&text).unwrap_err(),
            PassError::AnchorReferenceMissing { anchor: "aom-builder".to_string() }
        );
    }

    #[test]
    fn test_reference_follows_last_anchor_copy_with_indent() {
        let text = "\
FROM alpine AS aom-builder
FROM alpine AS app
RUN true
    COPY --from=aom-builder /opt/aom/lib /opt/lib
    COPY --from=aom-builder /opt/aom/include /opt/include";
        let out = run(text).unwrap();
        assert!(out.ends_with(
            "    COPY --from=aom-builder /opt/aom/include /opt/include\n    COPY --from=svtav1-builder /opt/svtav1 /opt/svtav1"
        ));
    }

    #[test]
    fn test_crlf_manifest_stays_crlf() {
        let text = MANIFEST.replace('\n', "\r\n");
        let out = run(&text).unwrap();
        assert!(!out.replace("\r\n", "").contains('\n'));
        assert!(out.contains("FROM base AS svtav1-builder\r\n"));
    }

    #[test]
    fn test_reference_template_must_name_new_stage() {
        let templates = stagepatch_render::TemplatesFile::builtin()
            .unwrap()
            .with_template(STAGE_REFERENCE, "COPY --from=other {{source}} {{source}}");
        let renderer = TemplateRenderer::new(&templates).unwrap();
        assert!(matches!(InsertStagePass::new(&spec(), "scripts", &renderer), Err(PassError::Render(_))));
    }

    fn fdk_aac() -> InsertSpec {
        InsertSpec {
            anchor: "vorbis-builder".to_string(),
            stage: NewStage {
                name: "fdk-aac-builder".to_string(),
                image: "emsdk-base".to_string(),
                comment: Some("Build fdk-aac".to_string()),
                env: BTreeMap::from([("FDK_AAC_BRANCH".to_string(), "v2.0.2".to_string())]),
                source: Some(SourceSpec {
                    url: "https://github.com/mstorsjo/fdk-aac.git#$FDK_AAC_BRANCH".to_string(),
                    dest: "/src".to_string(),
                }),
                script: "fdk-aac.sh".to_string(),
                script_dest: Some("/src/build.sh".to_string()),
                build: "bash -x /src/build.sh".to_string(),
            },
            reference: ReferenceSpec { source: "$INSTALL_DIR".to_string(), destination: None },
        }
    }

    #[test]
    fn test_commented_stage_with_fetched_source() {
        let text = "\
# Build vorbis
FROM emsdk-base AS vorbis-builder
RUN bash -x /src/build.sh

# Build opus
FROM emsdk-base AS opus-builder
RUN bash -x /src/build.sh

FROM emsdk-base AS ffmpeg-base
COPY --from=vorbis-builder $INSTALL_DIR $INSTALL_DIR
COPY --from=opus-builder $INSTALL_DIR $INSTALL_DIR
";
        let pass = InsertStagePass::new(&fdk_aac(), "build", &TemplateRenderer::builtin().unwrap()).unwrap();
        let manifest = pass.run(parse_manifest(text).unwrap(), &PatchContext::new(".")).unwrap();
        let out = serialize_manifest(&manifest);
        assert_eq!(
            out,
            "\
# Build vorbis
FROM emsdk-base AS vorbis-builder
RUN bash -x /src/build.sh

# Build fdk-aac
FROM emsdk-base AS fdk-aac-builder
ENV FDK_AAC_BRANCH=v2.0.2
ADD https://github.com/mstorsjo/fdk-aac.git#$FDK_AAC_BRANCH /src
COPY build/fdk-aac.sh /src/build.sh
RUN bash -x /src/build.sh

# Build opus
FROM emsdk-base AS opus-builder
RUN bash -x /src/build.sh

FROM emsdk-base AS ffmpeg-base
COPY --from=vorbis-builder $INSTALL_DIR $INSTALL_DIR
COPY --from=fdk-aac-builder $INSTALL_DIR $INSTALL_DIR
COPY --from=opus-builder $INSTALL_DIR $INSTALL_DIR
"
        );

        let again = pass.run(parse_manifest(&out).unwrap(), &PatchContext::new(".")).unwrap();
        assert_eq!(serialize_manifest(&again), out);
    }
}
