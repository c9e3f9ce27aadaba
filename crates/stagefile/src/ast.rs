use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `--from=<stage>` flag on COPY/ADD
    static ref FROM_FLAG: Regex = Regex::new(r"(?i)(?:^|\s)--from=([^\s]+)").unwrap();
    /// `--mount=<key=value,...>` flag on RUN
    static ref MOUNT_FLAG: Regex = Regex::new(r"(?i)(?:^|\s)--mount=([^\s]+)").unwrap();
}

/// Default line-continuation character
pub const DEFAULT_ESCAPE: char = '\\';

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstructionKind {
    Blank,
    Comment,
    /// Keyword is stored uppercased (`RUN`, `COPY`, ...)
    Command { keyword: String },
}

/// One logical instruction. `lines` are the physical lines exactly as read,
/// each carrying its own terminator (the last line of a file may have none).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub lines: Vec<String>,
}

impl Instruction {
    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            InstructionKind::Command { keyword } => Some(keyword),
            _ => None,
        }
    }

    pub fn is_command(&self, keyword: &str) -> bool {
        self.keyword()
            .map(|k| k.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
    }

    pub fn is_blank(&self) -> bool {
        self.kind == InstructionKind::Blank
    }

    /// Raw text, byte-identical to the input it was parsed from
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(String::len).sum()
    }

    /// Logical form: continuation escapes and embedded comment lines dropped,
    /// physical lines joined by a single space.
    pub fn logical(&self, escape: char) -> String {
        let mut parts = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            let content = strip_terminator(line).trim();
            if i > 0 && content.starts_with('#') {
                continue;
            }
            let content = content.strip_suffix(escape).unwrap_or(content).trim();
            if !content.is_empty() {
                parts.push(content);
            }
        }
        parts.join(" ")
    }

    /// Stage named by `COPY --from=` / `ADD --from=`, if any
    pub fn copy_source(&self, escape: char) -> Option<String> {
        if !(self.is_command("COPY") || self.is_command("ADD")) {
            return None;
        }
        let logical = self.logical(escape);
        FROM_FLAG
            .captures(&logical)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_matches('"').to_string())
    }

    /// Stages named by `from=` inside the `--mount` flags of a RUN
    pub fn mount_sources(&self, escape: char) -> Vec<String> {
        if !self.is_command("RUN") {
            return Vec::new();
        }
        let logical = self.logical(escape);
        MOUNT_FLAG
            .captures_iter(&logical)
            .filter_map(|c| c.get(1))
            .flat_map(|m| m.as_str().trim_matches('"').split(','))
            .filter_map(|kv| {
                let (key, value) = kv.split_once('=')?;
                key.eq_ignore_ascii_case("from").then(|| value.to_string())
            })
            .collect()
    }

    /// Leading whitespace of the first physical line
    pub fn indent(&self) -> &str {
        self.lines.first().map(|l| leading_whitespace(l)).unwrap_or("")
    }
}

/// A `FROM ... [AS name]` header and every instruction up to the next stage.
/// Comment lines sitting directly on top of the header belong to the stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageBlock {
    pub comments: Vec<Instruction>,
    pub header: Instruction,
    pub base: String,
    pub name: Option<String>,
    pub body: Vec<Instruction>,
}

impl StageBlock {
    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for ins in self.comments.iter().chain(std::iter::once(&self.header)).chain(&self.body) {
            out.push_str(&ins.text());
        }
        out
    }

    pub fn byte_len(&self) -> usize {
        self.comments.iter().map(Instruction::byte_len).sum::<usize>()
            + self.header.byte_len()
            + self.body.iter().map(Instruction::byte_len).sum::<usize>()
    }

    /// Number of blank instructions closing the stage
    pub fn trailing_blanks(&self) -> usize {
        self.body.iter().rev().take_while(|i| i.is_blank()).count()
    }

    /// Whether the last physical line of the stage ends with a newline
    pub fn ends_with_newline(&self) -> bool {
        self.body
            .last()
            .unwrap_or(&self.header)
            .lines
            .last()
            .map(|l| l.ends_with('\n'))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub escape: char,
    pub preamble: Vec<Instruction>,
    pub stages: Vec<StageBlock>,
}

impl Manifest {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().filter_map(|s| s.name.as_deref()).collect()
    }

    /// Every instruction in document order, stage headers included
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.preamble.iter().chain(
            self.stages
                .iter()
                .flat_map(|s| s.comments.iter().chain(std::iter::once(&s.header)).chain(s.body.iter())),
        )
    }
}

/// Physical line without its `\n` / `\r\n` terminator
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// The `\n` / `\r\n` terminator of a physical line, or "" at end of file
pub fn terminator(line: &str) -> &str {
    &line[strip_terminator(line).len()..]
}

pub fn leading_whitespace(line: &str) -> &str {
    let content = strip_terminator(line);
    &content[..content.len() - content.trim_start().len()]
}

/// Whether a physical line continues onto the next one
pub fn continues(line: &str, escape: char) -> bool {
    strip_terminator(line).trim_end().ends_with(escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(keyword: &str, lines: &[&str]) -> Instruction {
        Instruction {
            kind: InstructionKind::Command { keyword: keyword.to_string() },
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_logical_joins_continuations() {
        let ins = command("RUN", &["RUN ./configure \\\n", "    # flags\n", "    --enable-gpl\n"]);
        assert_eq!(ins.logical('\\'), "RUN ./configure --enable-gpl");
    }

    #[test]
    fn test_copy_source() {
        let ins = command("COPY", &["COPY --from=x264-builder /opt/x264 /opt/x264\n"]);
        assert_eq!(ins.copy_source('\\'), Some("x264-builder".to_string()));

        let run = command("RUN", &["RUN cp --from=x /a /b\n"]);
        assert_eq!(run.copy_source('\\'), None);
    }

    #[test]
    fn test_mount_sources() {
        let run = command(
            "RUN",
            &[
                "RUN --mount=type=cache,target=/root/.cache \\\n",
                "    --mount=type=bind,from=zimg-builder,source=/opt,target=/opt cp -r /opt /dst\n",
            ],
        );
        assert_eq!(run.mount_sources('\\'), vec!["zimg-builder".to_string()]);

        let copy = command("COPY", &["COPY --mount=from=x /a /b\n"]);
        assert!(copy.mount_sources('\\').is_empty());
    }

    #[test]
    fn test_terminators() {
        assert_eq!(terminator("abc\r\n"), "\r\n");
        assert_eq!(terminator("abc\n"), "\n");
        assert_eq!(terminator("abc"), "");
        assert_eq!(leading_whitespace("    --enable-gpl \\\n"), "    ");
        assert!(continues("RUN a \\  \n", '\\'));
        assert!(!continues("RUN a\n", '\\'));
    }
}
