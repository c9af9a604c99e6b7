use std::path::{Component, Path};

/// Validate a package name from the dependency manifest.
///
/// Names follow the installer's convention: alphanumerics separated by `_`, `-` or `.`,
/// starting and ending with an alphanumeric.
pub fn validate_dependency_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("dependency name must not be empty".into());
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(format!(
            "dependency name contains forbidden character {ch:?}, \
             only alphanumerics and _ - . are allowed"
        ));
    }
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err("dependency name must start and end with an alphanumeric".into());
    }

    Ok(())
}

/// Validate a version constraint (everything after the name on a manifest line).
/// The manifest is handed to the installer as a file, so only control characters are refused.
pub fn validate_constraint(constraint: &str) -> Result<(), String> {
    match constraint.chars().find(|c| c.is_control()) {
        Some(ch) => Err(format!("constraint contains control character {ch:?}")),
        None => Ok(()),
    }
}

/// Validate a base image reference, e.g. `python:3.11-slim` or
/// `registry.example.com/lib/python@sha256:...`. It is interpolated into the `FROM` line.
pub fn validate_image_reference(image: &str) -> Result<(), String> {
    if image.is_empty() {
        return Err("image reference must not be empty".into());
    }
    if let Some(ch) = image.chars().find(|c| !is_safe_image_char(*c)) {
        return Err(format!(
            "image reference contains forbidden character {ch:?}, \
             only alphanumerics and _ - . / : @ are allowed"
        ));
    }
    if image.starts_with(['-', '.', '/', ':', '@']) {
        return Err("image reference must start with an alphanumeric".into());
    }

    Ok(())
}

/// Validate an image tag given to a build. Same rules as a base image reference,
/// minus digests.
pub fn validate_tag(tag: &str) -> Result<(), String> {
    validate_image_reference(tag)?;
    if tag.contains('@') {
        return Err("tag must not contain a digest".into());
    }
    Ok(())
}

/// Validate a dotted module name such as `secondtry.cli`.
pub fn validate_module_name(module: &str) -> Result<(), String> {
    if module.is_empty() {
        return Err("module name must not be empty".into());
    }
    for segment in module.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(format!("invalid module segment {segment:?} in '{module}'")),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid module segment {segment:?} in '{module}'"));
        }
    }
    Ok(())
}

/// Validate the manifest path. It is interpolated into `COPY` and `RUN` lines, so
/// it must be a plain relative path.
pub fn validate_manifest_path(path: &Path) -> Result<(), String> {
    if path.is_absolute() {
        return Err("manifest path must be relative to the build context".into());
    }
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err("manifest path must not contain '.' or '..'".into());
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| "manifest path must be valid UTF-8".to_string())?;
    if path_str.is_empty() {
        return Err("manifest path must not be empty".into());
    }
    if let Some(ch) = path_str
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')))
    {
        return Err(format!("manifest path contains forbidden character {ch:?}"));
    }
    Ok(())
}

/// Validate a build context directory: an absolute path inside `root`, without `..`.
pub fn validate_context_dir(dir: &Path, root: &Path) -> Result<(), String> {
    if !dir.is_absolute() {
        return Err("build context must be an absolute path".into());
    }
    if dir.components().any(|c| c == Component::ParentDir) {
        return Err("build context must not contain '..'".into());
    }
    if !dir.starts_with(root) {
        return Err(format!(
            "build context {} is outside of {}",
            dir.display(),
            root.display()
        ));
    }
    Ok(())
}

fn is_safe_image_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@')
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn accepts_valid_dependency_names() {
        for name in ["discord.py", "aioconsole", "tinydb", "typing_extensions", "a"] {
            assert!(
                validate_dependency_name(name).is_ok(),
                "expected '{name}' to be valid"
            );
        }
    }

    #[test]
    fn rejects_bad_dependency_names() {
        for name in ["", "-flag", "pkg;rm", "has space", "pkg.", "$(evil)"] {
            assert!(
                validate_dependency_name(name).is_err(),
                "expected '{name}' to be rejected"
            );
        }
    }

    #[test]
    fn constraints_allow_markers_but_not_control_chars() {
        assert!(validate_constraint(">=2.3,<3").is_ok());
        assert!(validate_constraint("; python_version < \"3.12\"").is_ok());
        assert!(validate_constraint("==1.0\n").is_err());
    }

    #[test]
    fn image_references() {
        for image in [
            "python:3.11-slim",
            "python",
            "ghcr.io/org/python:3.11",
            "python@sha256:0123abcd",
        ] {
            assert!(validate_image_reference(image).is_ok(), "{image}");
        }
        for image in ["", "python 3", "python;ls", "-python", "$IMAGE"] {
            assert!(validate_image_reference(image).is_err(), "{image}");
        }
        assert!(validate_tag("secondtry:latest").is_ok());
        assert!(validate_tag("secondtry@sha256:abc").is_err());
    }

    #[test]
    fn module_names() {
        assert!(validate_module_name("secondtry.cli").is_ok());
        assert!(validate_module_name("_private.mod_2").is_ok());
        for module in ["", "secondtry.", ".cli", "2fast", "a-b", "a b"] {
            assert!(validate_module_name(module).is_err(), "{module}");
        }
    }

    #[test]
    fn context_dirs_stay_inside_root() {
        let root = Path::new("/srv");
        assert!(validate_context_dir(Path::new("/srv/secondtry"), root).is_ok());
        assert!(validate_context_dir(Path::new("/srv"), root).is_ok());
        for dir in ["/root", "/srvx/app", "/srv/../etc", "srv/app"] {
            assert!(validate_context_dir(Path::new(dir), root).is_err(), "{dir}");
        }
    }

    #[test]
    fn manifest_paths() {
        assert!(validate_manifest_path(Path::new("requirements.txt")).is_ok());
        assert!(validate_manifest_path(Path::new("deps/prod-requirements.txt")).is_ok());
        for path in ["/requirements.txt", "../requirements.txt", "./requirements.txt", "a b.txt", "r$.txt"] {
            assert!(validate_manifest_path(Path::new(path)).is_err(), "{path}");
        }
    }
}
