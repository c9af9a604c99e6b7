//! Entry point of the built image

use std::path::PathBuf;

use crate::builder::validators;

/// The process started by default in a container from the built image: the runtime
/// executing a named module as its main program (`<runtime> -m <module>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    runtime: String,
    module: String,
}

impl EntryPoint {
    pub fn new(runtime: impl Into<String>, module: impl Into<String>) -> Result<Self, String> {
        let runtime = runtime.into();
        let module = module.into();
        if runtime.is_empty() || runtime.chars().any(|c| c.is_whitespace() || c == '"') {
            return Err(format!("invalid runtime executable '{runtime}'"));
        }
        validators::validate_module_name(&module)?;

        Ok(Self { runtime, module })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The full process invocation, e.g. `["python", "-m", "secondtry.cli"]`
    pub fn command(&self) -> Vec<String> {
        vec![self.runtime.clone(), "-m".to_owned(), self.module.clone()]
    }

    /// Paths (relative to the working directory) that would make the module resolvable:
    /// either a module file or a package with a `__main__` file.
    pub fn module_candidates(&self) -> [PathBuf; 2] {
        let base: PathBuf = self.module.split('.').collect();
        [base.with_extension("py"), base.join("__main__.py")]
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::EntryPoint;

    #[test]
    fn command_runs_module() {
        let entry = EntryPoint::new("python", "secondtry.cli").unwrap();
        assert_eq!(entry.command(), ["python", "-m", "secondtry.cli"]);
    }

    #[test]
    fn candidates_follow_module_path() {
        let entry = EntryPoint::new("python", "secondtry.cli").unwrap();
        assert_eq!(
            entry.module_candidates(),
            [
                PathBuf::from("secondtry/cli.py"),
                PathBuf::from("secondtry/cli/__main__.py")
            ]
        );
    }

    #[test]
    fn rejects_invalid_parts() {
        assert!(EntryPoint::new("", "secondtry.cli").is_err());
        assert!(EntryPoint::new("py thon", "secondtry.cli").is_err());
        assert!(EntryPoint::new("python", "secondtry..cli").is_err());
    }
}
