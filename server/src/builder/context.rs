//! Build context snapshots
//!
//! The build context is always passed in explicitly. Its whole tree is copied into
//! the image with no exclusions: every file, directory and symlink under the root
//! ends up in the archive sent to the engine.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use secondtry_models::BuildErrorKind;
use sha2::{Digest, Sha256};

use crate::{builder::constants::MAX_CONTEXT_BYTES, errors::BuildError};

/// A single entry of a build context snapshot. Paths are relative to the context root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEntry {
    Dir { path: PathBuf, mode: u32 },
    File { path: PathBuf, mode: u32, content: Vec<u8> },
    Symlink { path: PathBuf, target: PathBuf },
}

impl ContextEntry {
    pub fn path(&self) -> &Path {
        match self {
            ContextEntry::Dir { path, .. }
            | ContextEntry::File { path, .. }
            | ContextEntry::Symlink { path, .. } => path,
        }
    }
}

/// Directory tree made available to a build
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
}

/// Point-in-time copy of a build context
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Entries sorted by path
    pub entries: Vec<ContextEntry>,
    /// Total size of all file contents in bytes
    pub size: u64,
    /// `sha256:` digest over paths, kinds and contents
    pub digest: String,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Capture the full tree of the context. Runs on the blocking thread pool.
    pub async fn snapshot(&self) -> Result<ContextSnapshot, BuildError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || snapshot_dir(&root))
            .await
            .map_err(|err| BuildError::new(BuildErrorKind::SourceCopy, err.to_string()))?
    }
}

impl ContextSnapshot {
    pub fn contains_file(&self, path: &Path) -> bool {
        self.entries
            .binary_search_by(|entry| entry.path().cmp(path))
            .is_ok_and(|idx| matches!(self.entries[idx], ContextEntry::File { .. }))
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ContextEntry::File { .. }))
            .count()
    }
}

fn snapshot_dir(root: &Path) -> Result<ContextSnapshot, BuildError> {
    let source_err = |path: &Path, err: io::Error| {
        BuildError::new(
            BuildErrorKind::SourceCopy,
            format!("could not read build context at {}: {err}", path.display()),
        )
    };

    let root_meta = fs::metadata(root).map_err(|err| source_err(root, err))?;
    if !root_meta.is_dir() {
        return Err(source_err(
            root,
            io::Error::new(ErrorKind::NotADirectory, "not a directory"),
        ));
    }

    let mut entries = Vec::new();
    let mut size = 0u64;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for dir_entry in fs::read_dir(&dir).map_err(|err| source_err(&dir, err))? {
            let dir_entry = dir_entry.map_err(|err| source_err(&dir, err))?;
            let full_path = dir_entry.path();
            let rel_path = full_path
                .strip_prefix(root)
                .map_err(|err| source_err(&full_path, io::Error::other(err)))?
                .to_path_buf();
            let meta = fs::symlink_metadata(&full_path).map_err(|err| source_err(&full_path, err))?;
            let file_type = meta.file_type();

            if file_type.is_symlink() {
                let target = fs::read_link(&full_path).map_err(|err| source_err(&full_path, err))?;
                entries.push(ContextEntry::Symlink {
                    path: rel_path,
                    target,
                });
            } else if file_type.is_dir() {
                entries.push(ContextEntry::Dir {
                    path: rel_path,
                    mode: mode_of(&meta, 0o755),
                });
                pending.push(full_path);
            } else if file_type.is_file() {
                size += meta.len();
                if size > MAX_CONTEXT_BYTES {
                    return Err(BuildError::new(
                        BuildErrorKind::SourceCopy,
                        format!("build context exceeds {MAX_CONTEXT_BYTES} bytes"),
                    ));
                }
                let content = fs::read(&full_path).map_err(|err| source_err(&full_path, err))?;
                entries.push(ContextEntry::File {
                    path: rel_path,
                    mode: mode_of(&meta, 0o644),
                    content,
                });
            } else {
                tracing::debug!("Skipping special file {}", full_path.display());
            }
        }
    }
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let digest = digest_entries(&entries);
    Ok(ContextSnapshot {
        entries,
        size,
        digest,
    })
}

fn digest_entries(entries: &[ContextEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.path().to_string_lossy().as_bytes());
        hasher.update([0]);
        match entry {
            ContextEntry::Dir { mode, .. } => {
                hasher.update(b"d");
                hasher.update(mode.to_be_bytes());
            }
            ContextEntry::File { mode, content, .. } => {
                hasher.update(b"f");
                hasher.update(mode.to_be_bytes());
                hasher.update((content.len() as u64).to_be_bytes());
                hasher.update(content);
            }
            ContextEntry::Symlink { target, .. } => {
                hasher.update(b"l");
                hasher.update(target.to_string_lossy().as_bytes());
            }
        }
        hasher.update([0]);
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata, default: u32) -> u32 {
    default
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use secondtry_models::BuildErrorKind;

    use super::*;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[tokio::test]
    async fn snapshot_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "aioconsole\n");
        write(dir.path(), "secondtry/cli.py", "print('hi')\n");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main\n");
        fs::create_dir(dir.path().join("data")).unwrap();

        let snapshot = BuildContext::new(dir.path()).snapshot().await.unwrap();
        let paths: Vec<_> = snapshot.entries.iter().map(|e| e.path().to_owned()).collect();
        assert_eq!(
            paths,
            [
                ".git",
                ".git/HEAD",
                "data",
                "requirements.txt",
                "secondtry",
                "secondtry/cli.py"
            ]
            .map(PathBuf::from)
        );
        assert_eq!(snapshot.file_count(), 3);
        assert!(snapshot.contains_file(Path::new("secondtry/cli.py")));
        assert!(!snapshot.contains_file(Path::new("secondtry")));
    }

    #[tokio::test]
    async fn empty_context_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = BuildContext::new(dir.path()).snapshot().await.unwrap();
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.size, 0);
    }

    #[tokio::test]
    async fn missing_context_fails_source_copy() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildContext::new(dir.path().join("nope"))
            .snapshot()
            .await
            .unwrap_err();
        assert_eq!(err.kind, BuildErrorKind::SourceCopy);
    }

    #[tokio::test]
    async fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "secondtry/cli.py", "print('hi')\n");
        let context = BuildContext::new(dir.path());

        let first = context.snapshot().await.unwrap();
        let second = context.snapshot().await.unwrap();
        assert_eq!(first.digest, second.digest);

        write(dir.path(), "secondtry/cli.py", "print('bye')\n");
        let third = context.snapshot().await.unwrap();
        assert_ne!(first.digest, third.digest);
    }
}
