//! Target directory layout and file I/O
use stagepatch_core::{PatchError, PatchProfile};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved paths of one build directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    manifest: PathBuf,
    scripts_dir: PathBuf,
}

impl Workspace {
    pub fn open(target: &Path, profile: &PatchProfile) -> Result<Self, PatchError> {
        if !target.is_dir() {
            return Err(PatchError::MissingFile(target.to_path_buf()));
        }
        Ok(Self {
            root: target.to_path_buf(),
            manifest: target.join(&profile.manifest),
            scripts_dir: target.join(&profile.scripts_dir),
        })
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(name)
    }

    pub fn load_manifest(&self) -> Result<String, PatchError> {
        read_text(&self.manifest)
    }

    /// Path relative to the workspace root, for progress output
    pub fn display<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }
}

/// Read a required file; absence is `MissingFile`
pub fn read_text(path: &Path) -> Result<String, PatchError> {
    if !path.is_file() {
        return Err(PatchError::MissingFile(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))
}

/// Write through a temp file in the target's directory, then rename over the
/// target. An existing target keeps its permissions.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PatchError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PatchError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PatchError::io(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PatchError::io(tmp.path(), e))?;

    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| PatchError::io(path, e))?;
    }

    tmp.persist(path).map_err(|e| PatchError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_resolves_profile_paths() {
        let dir = TempDir::new().unwrap();
        let profile = PatchProfile::builtin().unwrap();
        let ws = Workspace::open(dir.path(), &profile).unwrap();
        assert_eq!(ws.manifest_path(), dir.path().join("Dockerfile"));
        assert_eq!(ws.script_path("a.sh"), dir.path().join("build").join("a.sh"));
        assert_eq!(ws.display(ws.manifest_path()).to_string(), "Dockerfile");

        let missing = dir.path().join("nope");
        assert!(matches!(Workspace::open(&missing, &profile), Err(PatchError::MissingFile(_))));
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path(), &PatchProfile::builtin().unwrap()).unwrap();
        match ws.load_manifest() {
            Err(PatchError::MissingFile(path)) => assert_eq!(path, dir.path().join("Dockerfile")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        write_atomic(&path, "one\n").unwrap();
        write_atomic(&path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o750)).unwrap();

        write_atomic(&path, "#!/bin/sh\ntrue\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
