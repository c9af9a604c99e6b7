//! Dependency manifest parsing

use std::path::{Path, PathBuf};

use secondtry_models::BuildErrorKind;
use sha2::{Digest, Sha256};

use crate::{builder::validators, errors::BuildError};

/// A single package requirement from the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Everything following the name (version range, extras, markers), if present
    pub constraint: Option<String>,
}

/// The dependency manifest of a build context, read once per build.
#[derive(Debug, Clone)]
pub struct DependencyManifest {
    /// Path relative to the build context
    pub path: PathBuf,
    pub dependencies: Vec<Dependency>,
    /// Lines passed through to the installer as options (e.g. `--index-url ...`)
    pub options: Vec<String>,
    /// `sha256:` digest of the raw file contents
    pub digest: String,
}

impl DependencyManifest {
    /// Read and parse the manifest at `path` (relative to `context_root`).
    /// An absent or unreadable manifest is a [`BuildErrorKind::ManifestMissing`] error.
    pub async fn read(context_root: &Path, path: &Path) -> Result<Self, BuildError> {
        let full_path = context_root.join(path);
        let content = tokio::fs::read(&full_path).await.map_err(|err| {
            BuildError::new(
                BuildErrorKind::ManifestMissing,
                format!("could not read manifest {}: {err}", full_path.display()),
            )
        })?;
        let text = String::from_utf8(content).map_err(|_| {
            BuildError::new(
                BuildErrorKind::ManifestMissing,
                format!("manifest {} is not valid UTF-8", full_path.display()),
            )
        })?;

        Self::parse(path, &text)
    }

    /// Parse manifest text. Blank lines and `#` comments are skipped; invalid
    /// specifiers fail with [`BuildErrorKind::Dependencies`].
    pub fn parse(path: &Path, text: &str) -> Result<Self, BuildError> {
        let mut dependencies = Vec::new();
        let mut options = Vec::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('-') {
                options.push(line.to_owned());
                continue;
            }
            let dependency = parse_specifier(line).map_err(|err| {
                BuildError::new(
                    BuildErrorKind::Dependencies,
                    format!("{}:{}: {err}", path.display(), idx + 1),
                )
            })?;
            dependencies.push(dependency);
        }

        Ok(Self {
            path: path.to_owned(),
            dependencies,
            options,
            digest: digest(text.as_bytes()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

fn parse_specifier(line: &str) -> Result<Dependency, String> {
    if is_opaque_specifier(line) {
        validators::validate_constraint(line)?;
        return Ok(Dependency {
            name: line.to_owned(),
            constraint: None,
        });
    }

    let name_end = line
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | '@' | ' ' | '\t'))
        .unwrap_or(line.len());
    let (name, rest) = line.split_at(name_end);
    validators::validate_dependency_name(name)?;

    let constraint = rest.trim();
    validators::validate_constraint(constraint)?;

    Ok(Dependency {
        name: name.to_owned(),
        constraint: (!constraint.is_empty()).then(|| constraint.to_owned()),
    })
}

/// VCS requirements, direct URLs and local paths are handed to the installer as written.
fn is_opaque_specifier(line: &str) -> bool {
    line.contains("://") || line.starts_with("git+") || line.starts_with(['.', '/'])
}

/// A `#` starts a comment at the beginning of a line or after whitespace,
/// so URL fragments like `pkg @ https://host/x#egg=pkg` survive.
fn strip_comment(line: &str) -> &str {
    let mut prev_ws = true;
    for (idx, c) in line.char_indices() {
        if c == '#' && prev_ws {
            return &line[..idx];
        }
        prev_ws = c.is_whitespace();
    }
    line
}

pub fn digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}
