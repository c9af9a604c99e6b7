//! Image recipe rendering

use std::path::PathBuf;

use secondtry_models::{BuildErrorKind, BuildInput};

use crate::{
    builder::{entry::EntryPoint, lifecycle::StepPlan, validators},
    config::AppConfig,
    errors::BuildError,
};

/// Everything needed to build the image, apart from the build context itself
#[derive(Debug, Clone)]
pub struct BuildRecipe {
    /// Base runtime image with its version tag
    pub base_image: String,
    /// Shell command upgrading the package installer
    pub installer_upgrade: String,
    /// Shell command installing a manifest, given the manifest path as last argument
    pub installer_install: String,
    /// Manifest path relative to the build context
    pub manifest: PathBuf,
    /// Absolute working directory inside the image
    pub workdir: String,
    pub entry: EntryPoint,
}

/// A recipe rendered to text, along with its step plan
#[derive(Debug, Clone)]
pub struct RenderedRecipe {
    pub text: String,
    pub plan: StepPlan,
}

impl BuildRecipe {
    /// Resolve the recipe for a build: configured defaults, overridden by the build input.
    pub fn resolve(config: &AppConfig, input: &BuildInput) -> Result<Self, BuildError> {
        let recipe_err = |msg: String| BuildError::new(BuildErrorKind::Recipe, msg);

        let base_image = input
            .base_image
            .clone()
            .unwrap_or_else(|| config.base_image.clone());
        validators::validate_image_reference(&base_image).map_err(recipe_err)?;

        let manifest = input
            .manifest
            .clone()
            .unwrap_or_else(|| config.manifest.clone());
        validators::validate_manifest_path(&manifest).map_err(recipe_err)?;

        if !config.workdir.starts_with('/') || config.workdir.contains(char::is_whitespace) {
            return Err(recipe_err(format!(
                "working directory '{}' must be an absolute path without spaces",
                config.workdir
            )));
        }

        let module = input
            .entry_module
            .clone()
            .unwrap_or_else(|| config.entry_module.clone());
        let entry = EntryPoint::new(config.runtime.clone(), module).map_err(recipe_err)?;

        Ok(Self {
            base_image,
            installer_upgrade: config.installer_upgrade.clone(),
            installer_install: config.installer_install.clone(),
            manifest,
            workdir: config.workdir.clone(),
            entry,
        })
    }

    /// Render the recipe with the given template and derive its step plan
    pub fn render(&self, template: &liquid::Template) -> Result<RenderedRecipe, BuildError> {
        let recipe_err = |msg: String| BuildError::new(BuildErrorKind::Recipe, msg);

        let entry_command = serde_json::to_string(&self.entry.command())
            .map_err(|err| recipe_err(format!("failed to encode entry command: {err}")))?;
        let vars = liquid::object!({
            "base_image": self.base_image,
            "installer_upgrade": self.installer_upgrade,
            "installer_install": self.installer_install,
            "manifest": self.manifest.to_string_lossy(),
            "workdir": self.workdir,
            "entry_command": entry_command,
        });
        let text = template
            .render(&vars)
            .map_err(|err| recipe_err(format!("failed to render recipe: {err}")))?;
        let plan = StepPlan::from_recipe(&text)
            .map_err(|err| recipe_err(format!("invalid recipe template: {err}")))?;

        Ok(RenderedRecipe { text, plan })
    }
}
