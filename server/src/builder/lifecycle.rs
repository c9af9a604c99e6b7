//! Build lifecycle state machine

use secondtry_models::{BuildErrorKind, BuildStage};

/// Tracks the stage a build has reached. Stages are only ever entered in order, and a
/// failed lifecycle stays frozen at the stage it reached.
#[derive(Debug, Clone, Default)]
pub struct BuildLifecycle {
    stage: BuildStage,
    failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move from '{from}' back to '{to}'")]
    Backwards { from: BuildStage, to: BuildStage },
    #[error("build already failed at '{0}'")]
    Failed(BuildStage),
}

impl BuildLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Move forward to `to`, returning every stage entered on the way (in order).
    /// Advancing to the current stage is a no-op.
    pub fn advance(&mut self, to: BuildStage) -> Result<Vec<BuildStage>, TransitionError> {
        if self.failed {
            return Err(TransitionError::Failed(self.stage));
        }
        if to < self.stage {
            return Err(TransitionError::Backwards {
                from: self.stage,
                to,
            });
        }
        let mut entered = Vec::new();
        while self.stage < to {
            match self.stage.next() {
                Some(next) => {
                    self.stage = next;
                    entered.push(next);
                }
                None => break,
            }
        }
        Ok(entered)
    }

    /// Mark the build as failed at its current stage
    pub fn fail(&mut self) {
        self.failed = true;
    }
}

/// The error kind reported when the step that completes `stage` fails
pub fn failure_kind_for(stage: BuildStage) -> BuildErrorKind {
    match stage {
        BuildStage::Unbuilt | BuildStage::BaseSelected => BuildErrorKind::BaseImage,
        BuildStage::ToolchainUpdated => BuildErrorKind::InstallerUpgrade,
        BuildStage::DependenciesInstalled => BuildErrorKind::Dependencies,
        BuildStage::SourceCopied => BuildErrorKind::SourceCopy,
        BuildStage::ImageReady => BuildErrorKind::Recipe,
    }
}

/// Maps the numbered steps of a recipe to the lifecycle stage each one completes.
///
/// Built from the `# stage: <name>` markers of a rendered recipe: every instruction
/// above a marker (and below the previous one) belongs to that marker's stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// `steps[i]` is the stage completed by step `i + 1`
    steps: Vec<BuildStage>,
}

const STAGE_MARKER: &str = "# stage:";

impl StepPlan {
    pub fn from_recipe(recipe: &str) -> Result<Self, String> {
        let mut steps = Vec::new();
        let mut pending = 0usize;
        let mut last_stage = BuildStage::Unbuilt;
        for line in recipe.lines().map(str::trim) {
            if let Some(marker) = line.strip_prefix(STAGE_MARKER) {
                let stage: BuildStage = marker
                    .trim()
                    .parse()
                    .map_err(|_| format!("unknown stage marker '{}'", marker.trim()))?;
                if stage <= last_stage {
                    return Err(format!("stage marker '{stage}' is out of order"));
                }
                if pending == 0 {
                    return Err(format!("stage marker '{stage}' has no instructions"));
                }
                steps.extend(std::iter::repeat_n(stage, pending));
                pending = 0;
                last_stage = stage;
            } else if !line.is_empty() && !line.starts_with('#') {
                pending += 1;
            }
        }
        if pending > 0 {
            return Err("instructions after the last stage marker".into());
        }
        if last_stage != BuildStage::ImageReady {
            return Err("recipe must end with the 'image_ready' stage marker".into());
        }

        Ok(Self { steps })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The stage completed by a 1-based step number
    pub fn stage_of_step(&self, step: usize) -> Option<BuildStage> {
        step.checked_sub(1).and_then(|idx| self.steps.get(idx)).copied()
    }

    /// The furthest stage whose steps have all completed once `completed` steps are done
    pub fn stage_after(&self, completed: usize) -> BuildStage {
        let completed = completed.min(self.steps.len());
        let mut reached = BuildStage::Unbuilt;
        for (idx, stage) in self.steps.iter().enumerate() {
            let last_step_of_stage = self.steps.get(idx + 1) != Some(stage);
            if idx < completed && last_step_of_stage {
                reached = *stage;
            }
        }
        reached
    }

    /// The step started by a progress line, if it is the step right after `current`.
    /// Lines with another total or out of sequence come from the output of a step.
    pub fn next_step(&self, current: usize, line: &str) -> Option<usize> {
        let (step, total) = parse_step_line(line)?;
        (total == self.steps.len() && step == current + 1).then_some(step)
    }
}

/// Parse the step number from a classic builder progress line such as
/// `Step 3/8 : RUN pip install --upgrade pip`.
fn parse_step_line(line: &str) -> Option<(usize, usize)> {
    let rest = line.trim_start().strip_prefix("Step ")?;
    let (progress, _) = rest.split_once(' ').unwrap_or((rest, ""));
    let (current, total) = progress.split_once('/')?;
    let (current, total): (usize, usize) = (current.parse().ok()?, total.parse().ok()?);
    (1..=total).contains(&current).then_some((current, total))
}

#[cfg(test)]
mod tests {
    use secondtry_models::{BuildErrorKind, BuildStage};

    use super::*;

    const RECIPE: &str = "\
# header comment
FROM python:3.11-slim
# stage: base_selected
RUN pip install --upgrade pip
# stage: toolchain_updated
WORKDIR /app
COPY requirements.txt requirements.txt
RUN pip install -r requirements.txt
# stage: dependencies_installed
COPY . .
# stage: source_copied
CMD [\"python\",\"-m\",\"secondtry.cli\"]
# stage: image_ready
";

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut lifecycle = BuildLifecycle::new();
        assert_eq!(lifecycle.stage(), BuildStage::Unbuilt);

        let entered = lifecycle.advance(BuildStage::ToolchainUpdated).unwrap();
        assert_eq!(
            entered,
            [BuildStage::BaseSelected, BuildStage::ToolchainUpdated]
        );
        assert!(lifecycle.advance(BuildStage::ToolchainUpdated).unwrap().is_empty());
        assert_eq!(
            lifecycle.advance(BuildStage::BaseSelected),
            Err(TransitionError::Backwards {
                from: BuildStage::ToolchainUpdated,
                to: BuildStage::BaseSelected
            })
        );
    }

    #[test]
    fn failed_lifecycle_is_frozen() {
        let mut lifecycle = BuildLifecycle::new();
        lifecycle.advance(BuildStage::BaseSelected).unwrap();
        lifecycle.fail();

        assert_eq!(
            lifecycle.advance(BuildStage::ImageReady),
            Err(TransitionError::Failed(BuildStage::BaseSelected))
        );
    }

    #[test]
    fn image_ready_is_terminal() {
        let mut lifecycle = BuildLifecycle::new();
        lifecycle.advance(BuildStage::ImageReady).unwrap();
        assert_eq!(lifecycle.stage(), BuildStage::ImageReady);
        assert!(lifecycle.advance(BuildStage::ImageReady).unwrap().is_empty());
    }

    #[test]
    fn plan_maps_steps_to_stages() {
        let plan = StepPlan::from_recipe(RECIPE).unwrap();
        assert_eq!(plan.step_count(), 7);
        assert_eq!(plan.stage_of_step(1), Some(BuildStage::BaseSelected));
        assert_eq!(plan.stage_of_step(2), Some(BuildStage::ToolchainUpdated));
        assert_eq!(plan.stage_of_step(5), Some(BuildStage::DependenciesInstalled));
        assert_eq!(plan.stage_of_step(6), Some(BuildStage::SourceCopied));
        assert_eq!(plan.stage_of_step(7), Some(BuildStage::ImageReady));
        assert_eq!(plan.stage_of_step(0), None);
        assert_eq!(plan.stage_of_step(8), None);
    }

    #[test]
    fn stage_after_requires_all_steps_of_a_stage() {
        let plan = StepPlan::from_recipe(RECIPE).unwrap();
        assert_eq!(plan.stage_after(0), BuildStage::Unbuilt);
        assert_eq!(plan.stage_after(1), BuildStage::BaseSelected);
        assert_eq!(plan.stage_after(2), BuildStage::ToolchainUpdated);
        // WORKDIR and COPY manifest done, install still running
        assert_eq!(plan.stage_after(4), BuildStage::ToolchainUpdated);
        assert_eq!(plan.stage_after(5), BuildStage::DependenciesInstalled);
        assert_eq!(plan.stage_after(6), BuildStage::SourceCopied);
        assert_eq!(plan.stage_after(7), BuildStage::ImageReady);
        assert_eq!(plan.stage_after(100), BuildStage::ImageReady);
    }

    #[test]
    fn plan_rejects_malformed_markers() {
        assert!(StepPlan::from_recipe("FROM x\n# stage: nonsense\n").is_err());
        assert!(StepPlan::from_recipe("FROM x\n# stage: image_ready\nCMD x\n").is_err());
        assert!(StepPlan::from_recipe("FROM x\n# stage: source_copied\n").is_err());
        assert!(
            StepPlan::from_recipe("FROM x\n# stage: toolchain_updated\nRUN y\n# stage: base_selected\n")
                .is_err()
        );
        assert!(
            StepPlan::from_recipe("FROM x\n# stage: base_selected\n# stage: image_ready\n").is_err()
        );
    }

    #[test]
    fn failure_kinds_follow_stages() {
        assert_eq!(failure_kind_for(BuildStage::BaseSelected), BuildErrorKind::BaseImage);
        assert_eq!(
            failure_kind_for(BuildStage::ToolchainUpdated),
            BuildErrorKind::InstallerUpgrade
        );
        assert_eq!(
            failure_kind_for(BuildStage::DependenciesInstalled),
            BuildErrorKind::Dependencies
        );
        assert_eq!(failure_kind_for(BuildStage::SourceCopied), BuildErrorKind::SourceCopy);
    }

    #[test]
    fn parses_step_lines() {
        assert_eq!(parse_step_line("Step 3/7 : RUN pip install"), Some((3, 7)));
        assert_eq!(parse_step_line("Step 10/12"), Some((10, 12)));
        assert_eq!(parse_step_line(" ---> Running in abc"), None);
        assert_eq!(parse_step_line("Step x/7 : FROM"), None);
        assert_eq!(parse_step_line("Step 0/7 : FROM"), None);
        assert_eq!(parse_step_line("Step 8/7 : FROM"), None);
    }

    #[test]
    fn next_step_follows_plan_sequence() {
        let plan = StepPlan::from_recipe(RECIPE).unwrap();
        assert_eq!(plan.next_step(0, "Step 1/7 : FROM python"), Some(1));
        assert_eq!(plan.next_step(4, "Step 5/7 : RUN pip install"), Some(5));
        // Output of a step that happens to look like progress
        assert_eq!(plan.next_step(4, "Step 6/9 : copying"), None);
        assert_eq!(plan.next_step(4, "Step 7/7 : CMD"), None);
        assert_eq!(plan.next_step(4, "Step 2/7 : RUN"), None);
        assert_eq!(plan.next_step(0, "Step 0/7"), None);
    }
}
