//! Patch profile: every parameter of a run, read once and never mutated.
//!
//! Profiles are YAML documents. The named presets are compiled into the
//! crate; callers may load another from disk.

use crate::error::PatchError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Preset used when no profile is given
pub const DEFAULT_PRESET: &str = "ffmpeg-wasm";

const PRESETS: &[(&str, &str)] = &[
    ("ffmpeg-wasm", include_str!("../profiles/ffmpeg-wasm.yaml")),
    ("ffmpeg-static", include_str!("../profiles/ffmpeg-static.yaml")),
];

const SUPPORTED_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchProfile {
    pub version: String,
    /// Manifest path relative to the target directory
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Scripts directory relative to the target directory
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    /// `ENV` values pinned before any stage is touched
    #[serde(default)]
    pub env_overrides: Vec<EnvOverride>,
    /// Removal Set
    #[serde(default)]
    pub remove_stages: Vec<String>,
    pub insert: InsertSpec,
    pub configure_flags: OptionListSpec,
    pub lib_flags: OptionListSpec,
    pub companion_script: CompanionScript,
    pub helper_script: HelperScript,
}

fn default_manifest() -> String {
    "Dockerfile".to_string()
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertSpec {
    /// Stage the new one is spliced after
    pub anchor: String,
    pub stage: NewStage,
    pub reference: ReferenceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvOverride {
    pub stage: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub image: String,
    /// Header comment text, written as `# <comment>` above the FROM
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Sources fetched with `ADD <url> <dest>` before the script is copied
    #[serde(default)]
    pub source: Option<SourceSpec>,
    /// Companion script copied into the stage
    pub script: String,
    /// Where the script lands; `/usr/local/bin/<script>` when unset
    #[serde(default)]
    pub script_dest: Option<String>,
    /// Build invocation
    pub build: String,
}

impl NewStage {
    pub fn script_dest(&self) -> String {
        self.script_dest
            .clone()
            .unwrap_or_else(|| format!("/usr/local/bin/{}", self.script))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    pub dest: String,
}

/// `COPY --from=<new stage> <source> <destination>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSpec {
    pub source: String,
    /// Defaults to `source`
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionListSpec {
    /// Stage holding the list
    pub stage: String,
    /// Instruction keyword (RUN, ENV, ...)
    #[serde(default = "default_keyword")]
    pub keyword: String,
    /// Token opening the list, kept verbatim
    pub lead: String,
    /// Line prefix that follows the list inside the same instruction
    #[serde(default)]
    pub until: Option<String>,
    /// Suffix glued to the last token (closing quote)
    #[serde(default)]
    pub close: Option<String>,
    pub tokens: Vec<String>,
}

fn default_keyword() -> String {
    "RUN".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionScript {
    pub name: String,
    pub contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperScript {
    pub name: String,
    /// Fixed substrings deleted from the helper script
    #[serde(default)]
    pub remove: Vec<String>,
}

impl PatchProfile {
    /// The default preset
    pub fn builtin() -> Result<Self, PatchError> {
        Self::preset(DEFAULT_PRESET)
    }

    pub fn preset(name: &str) -> Result<Self, PatchError> {
        let yaml = PRESETS
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, yaml)| *yaml)
            .ok_or_else(|| {
                PatchError::Profile(format!(
                    "unknown preset `{}` (known: {})",
                    name,
                    Self::preset_names().join(", ")
                ))
            })?;
        Self::from_yaml(yaml)
    }

    pub fn preset_names() -> Vec<&'static str> {
        PRESETS.iter().map(|(name, _)| *name).collect()
    }

    pub fn load(path: &Path) -> Result<Self, PatchError> {
        if !path.exists() {
            return Err(PatchError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, PatchError> {
        let profile: PatchProfile = serde_yaml::from_str(yaml)
            .map_err(|e| PatchError::Profile(format!("Failed to parse profile YAML: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        if self.version != SUPPORTED_VERSION {
            return Err(PatchError::Profile(format!(
                "unsupported profile version {} (expected {})",
                self.version, SUPPORTED_VERSION
            )));
        }

        let removed: HashSet<&str> = self.remove_stages.iter().map(String::as_str).collect();
        if removed.contains(self.insert.stage.name.as_str()) {
            return Err(PatchError::Profile(format!(
                "stage `{}` is both inserted and removed",
                self.insert.stage.name
            )));
        }
        if removed.contains(self.insert.anchor.as_str()) {
            return Err(PatchError::Profile(format!(
                "insertion anchor `{}` is scheduled for removal",
                self.insert.anchor
            )));
        }

        for env in &self.env_overrides {
            if env.key.trim().is_empty() || env.key.contains(char::is_whitespace) {
                return Err(PatchError::Profile(format!("env override: invalid key `{}`", env.key)));
            }
            if removed.contains(env.stage.as_str()) {
                return Err(PatchError::Profile(format!(
                    "env override `{}`: stage `{}` is scheduled for removal",
                    env.key, env.stage
                )));
            }
        }

        for (name, list) in [("configure_flags", &self.configure_flags), ("lib_flags", &self.lib_flags)] {
            if list.lead.trim().is_empty() {
                return Err(PatchError::Profile(format!("{}: empty lead token", name)));
            }
            if removed.contains(list.stage.as_str()) {
                return Err(PatchError::Profile(format!(
                    "{}: stage `{}` is scheduled for removal",
                    name, list.stage
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = list.tokens.iter().find(|t| !seen.insert(t.as_str())) {
                return Err(PatchError::Profile(format!("{}: duplicate token `{}`", name, dup)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_parses() {
        let profile = PatchProfile::builtin().unwrap();
        assert_eq!(profile.manifest, "Dockerfile");
        assert_eq!(profile.scripts_dir, "build");
        assert_eq!(profile.remove_stages.len(), 9);
        assert_eq!(profile.env_overrides[0].value, "n5.1.8");
        assert_eq!(profile.insert.stage.script_dest(), "/src/build.sh");
        assert_eq!(profile.configure_flags.until, None);
        assert_eq!(profile.configure_flags.tokens.len(), 19);
        assert_eq!(profile.lib_flags.tokens.len(), 7);
    }

    #[test]
    fn test_static_preset_parses() {
        let profile = PatchProfile::preset("ffmpeg-static").unwrap();
        assert_eq!(profile.scripts_dir, "scripts");
        assert!(profile.env_overrides.is_empty());
        assert_eq!(profile.configure_flags.keyword, "RUN");
        assert_eq!(profile.lib_flags.close.as_deref(), Some("\""));
        assert_eq!(profile.insert.stage.script_dest(), "/usr/local/bin/build-svtav1.sh");
    }

    #[test]
    fn test_unknown_preset() {
        let err = PatchProfile::preset("ffmpeg-arm").unwrap_err();
        assert!(err.to_string().contains("ffmpeg-wasm, ffmpeg-static"));
    }

    #[test]
    fn test_rejects_inserting_removed_stage() {
        let mut profile = PatchProfile::builtin().unwrap();
        profile.remove_stages.push(profile.insert.stage.name.clone());
        assert!(matches!(profile.validate(), Err(PatchError::Profile(_))));
    }

    #[test]
    fn test_rejects_env_override_in_removed_stage() {
        let mut profile = PatchProfile::builtin().unwrap();
        profile.env_overrides.push(EnvOverride {
            stage: profile.remove_stages[0].clone(),
            key: "X264_BRANCH".to_string(),
            value: "stable".to_string(),
        });
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("scheduled for removal"));
    }

    #[test]
    fn test_rejects_duplicate_tokens() {
        let mut profile = PatchProfile::builtin().unwrap();
        let first = profile.lib_flags.tokens[0].clone();
        profile.lib_flags.tokens.push(first);
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate token"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let (_, yaml) = PRESETS[0];
        let yaml = yaml.replacen("version: \"1.0\"", "version: \"2.0\"", 1);
        assert!(PatchProfile::from_yaml(&yaml).is_err());
    }
}
