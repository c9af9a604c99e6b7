//! The build sequence: manifest, context, base image, then the engine build.

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use secondtry_models::{BuildChunk, BuildErrorKind, BuildStage};
use tokio::sync::mpsc;

use crate::{
    builder::{
        constants::{
            APP_LABEL, BUILD_LABEL, CONTEXT_DIGEST_LABEL, MANIFEST_DIGEST_LABEL, RECIPE_FILENAME,
        },
        context::{BuildContext, ContextSnapshot},
        engine::{ImageBuildRequest, ImageEngine},
        helpers::{self, log},
        lifecycle::{BuildLifecycle, StepPlan, failure_kind_for},
        manifest::DependencyManifest,
        recipe::{BuildRecipe, RenderedRecipe},
        registry::{BuildRegistry, BuildStatus},
    },
    errors::BuildError,
};

/// Everything a single build attempt works from
pub struct BuildJob {
    pub id: String,
    pub tag: String,
    pub recipe: BuildRecipe,
    pub rendered: RenderedRecipe,
    pub context: BuildContext,
}

/// Result of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltImage {
    pub image_id: String,
    pub manifest_digest: String,
    pub context_digest: String,
}

/// Runs one build attempt to completion. Steps run strictly in sequence and the first
/// failure ends the attempt: the lifecycle is frozen, the record is marked failed, and
/// the image is never tagged.
pub struct BuildPipeline<'a, E: ImageEngine> {
    engine: &'a E,
    registry: BuildRegistry,
    tx: mpsc::Sender<BuildChunk>,
    lifecycle: BuildLifecycle,
    build_id: String,
    build_logs: String,
}

impl<'a, E: ImageEngine> BuildPipeline<'a, E> {
    pub fn new(engine: &'a E, registry: BuildRegistry, tx: mpsc::Sender<BuildChunk>) -> Self {
        Self {
            engine,
            registry,
            tx,
            lifecycle: BuildLifecycle::new(),
            build_id: String::new(),
            build_logs: String::new(),
        }
    }

    /// Run the build until it finishes or the receiver of its events is dropped. A
    /// cancelled build is marked failed and never tagged.
    pub async fn run_cancellable(self, job: BuildJob) -> Result<BuiltImage, BuildError> {
        let build_id = job.id.clone();
        let tx = self.tx.clone();
        let registry = self.registry.clone();
        tokio::select! {
            biased;
            res = self.run(job) => res,
            _ = tx.closed() => {
                tracing::info!("Build '{build_id}' cancelled (connection dropped)");
                let err = BuildError::new(BuildErrorKind::Engine, "build cancelled");
                let status = BuildStatus::Failed {
                    kind: err.kind,
                    message: err.message.clone(),
                };
                registry.set_status(&build_id, status).await;
                Err(err)
            }
        }
    }

    pub async fn run(mut self, job: BuildJob) -> Result<BuiltImage, BuildError> {
        self.build_id = job.id.clone();
        self.registry.start(&job.id, &job.tag).await;

        match self.run_steps(&job).await {
            Ok(built) => {
                self.registry
                    .set_status(
                        &job.id,
                        BuildStatus::Ready {
                            image_id: built.image_id.clone(),
                        },
                    )
                    .await;
                let ready = BuildChunk::Ready {
                    build_id: job.id.clone(),
                    tag: job.tag.clone(),
                    image_id: built.image_id.clone(),
                    entry_command: job.recipe.entry.command(),
                    manifest_digest: built.manifest_digest.clone(),
                    context_digest: built.context_digest.clone(),
                };
                let _ = self.tx.send(ready).await;
                Ok(built)
            }
            Err(err) => {
                self.lifecycle.fail();
                tracing::warn!(
                    "Build '{}' failed at stage '{}': {err}",
                    job.id,
                    self.lifecycle.stage()
                );
                self.registry
                    .set_status(
                        &job.id,
                        BuildStatus::Failed {
                            kind: err.kind,
                            message: err.message.clone(),
                        },
                    )
                    .await;
                let chunk = BuildChunk::BuildError {
                    build_id: job.id.clone(),
                    stage: self.lifecycle.stage(),
                    kind: err.kind,
                    message: err.message.clone(),
                    build_logs: std::mem::take(&mut self.build_logs),
                };
                let _ = self.tx.send(chunk).await;
                Err(err)
            }
        }
    }

    async fn run_steps(&mut self, job: &BuildJob) -> Result<BuiltImage, BuildError> {
        let BuildJob {
            tag,
            recipe,
            rendered,
            context,
            ..
        } = job;

        // The manifest has to be readable before anything else happens
        let message = format!("Reading manifest '{}'...", recipe.manifest.display());
        log::send_info(&self.tx, message).await;
        let manifest = DependencyManifest::read(context.root(), &recipe.manifest).await?;
        log::send_info(
            &self.tx,
            format!(
                "Manifest '{}' lists {} dependencies",
                manifest.path.display(),
                manifest.dependencies.len()
            ),
        )
        .await;
        for dependency in &manifest.dependencies {
            let constraint = dependency.constraint.as_deref().unwrap_or("any version");
            let message = format!("Dependency '{}' ({constraint})", dependency.name);
            log::send_debug(&self.tx, message).await;
        }
        if !manifest.options.is_empty() {
            let message = format!("Installer options: {}", manifest.options.join(" "));
            log::send_debug(&self.tx, message).await;
        }

        // Snapshot the build context
        log::send_info(
            &self.tx,
            format!("Reading build context '{}'...", context.root().display()),
        )
        .await;
        let snapshot = context.snapshot().await?;
        log::send_info(
            &self.tx,
            format!(
                "Build context has {} files ({} bytes)",
                snapshot.file_count(),
                snapshot.size
            ),
        )
        .await;
        self.warn_if_entry_unresolved(recipe, &snapshot).await;
        self.registry
            .set_digests(&job.id, &manifest.digest, &snapshot.digest)
            .await;

        // Select the base runtime
        log::send_info(&self.tx, format!("Checking base image '{}'...", recipe.base_image)).await;
        helpers::pull_image(self.engine, &recipe.base_image, &self.tx)
            .await
            .map_err(|msg| BuildError::new(BuildErrorKind::BaseImage, msg))?;
        self.reach(BuildStage::BaseSelected).await;

        // Build the image. The engine reports each step as it starts.
        log::send_info(&self.tx, format!("Building image '{tag}'...")).await;
        let labels = HashMap::from([
            (APP_LABEL.to_owned(), format!("v{}", env!("CARGO_PKG_VERSION"))),
            (BUILD_LABEL.to_owned(), job.id.clone()),
            (MANIFEST_DIGEST_LABEL.to_owned(), manifest.digest.clone()),
            (CONTEXT_DIGEST_LABEL.to_owned(), snapshot.digest.clone()),
        ]);
        let (archive, writer) = helpers::create_build_context(
            snapshot.entries,
            RECIPE_FILENAME.to_owned(),
            rendered.text.clone(),
        );
        let build_stream = self.engine.build_image(ImageBuildRequest {
            tag: tag.clone(),
            recipe_file: RECIPE_FILENAME.to_owned(),
            labels,
            context: archive,
        });
        let built = self.process_build_stream(build_stream, &rendered.plan).await;
        // A context that failed to archive outranks the engine result
        writer.finished().await?;
        let image_id = built?;
        self.reach(BuildStage::ImageReady).await;
        log::send_info(&self.tx, format!("Built image '{tag}' with ID {image_id}")).await;

        Ok(BuiltImage {
            image_id,
            manifest_digest: manifest.digest,
            context_digest: snapshot.digest,
        })
    }

    /// Process the build stream from the engine, advancing the lifecycle as steps start
    /// and sending logs to the client. Returns the image ID if the build succeeded.
    async fn process_build_stream(
        &mut self,
        mut build_stream: impl Stream<Item = Result<bollard::models::BuildInfo, bollard::errors::Error>>
        + Unpin,
        plan: &StepPlan,
    ) -> Result<String, BuildError> {
        let mut image_id = None;
        let mut error = None;
        let mut current_step = 0;
        while let Some(build_info_result) = build_stream.next().await {
            match build_info_result {
                Ok(info) => {
                    if let Some(id) = info.aux.and_then(|aux| aux.id) {
                        image_id = Some(id);
                    }
                    if let Some(stream) = info.stream {
                        for line in stream.lines() {
                            if let Some(step) = plan.next_step(current_step, line) {
                                current_step = step;
                                self.reach(plan.stage_after(step.saturating_sub(1))).await;
                            }
                        }
                        self.build_logs.push_str(&stream);
                        log::send_debug(&self.tx, stream).await;
                    }
                    if let Some(err) = info.error_detail.and_then(|e| e.message) {
                        let message = format!("Error during build: {err}");
                        self.build_logs.push('\n');
                        self.build_logs.push_str(&message);
                        log::send_info(&self.tx, message).await;
                        error.get_or_insert(err);
                    }
                }
                Err(err) => {
                    let message = format!("Error during build: {err}");
                    self.build_logs.push('\n');
                    self.build_logs.push_str(&message);
                    log::send_info(&self.tx, message).await;
                    error.get_or_insert(err.to_string());
                }
            }
        }

        match (image_id, error) {
            (Some(image_id), None) => Ok(image_id),
            (_, error) => {
                let kind = match plan.stage_of_step(current_step) {
                    Some(stage) => failure_kind_for(stage),
                    None => BuildErrorKind::Engine,
                };
                let message =
                    error.unwrap_or_else(|| "build finished without producing an image".into());
                Err(BuildError::new(kind, message))
            }
        }
    }

    /// Advance the lifecycle up to `stage`, reporting each stage entered
    async fn reach(&mut self, stage: BuildStage) {
        if stage <= self.lifecycle.stage() {
            return;
        }
        match self.lifecycle.advance(stage) {
            Ok(entered) => {
                for stage in entered {
                    tracing::info!("Build '{}' reached stage '{stage}'", self.build_id);
                    self.registry.set_stage(&self.build_id, stage).await;
                    let chunk = BuildChunk::Stage {
                        build_id: self.build_id.clone(),
                        stage,
                    };
                    let _ = self.tx.send(chunk).await;
                }
            }
            Err(err) => tracing::warn!("Build '{}': {err}", self.build_id),
        }
    }

    async fn warn_if_entry_unresolved(&self, recipe: &BuildRecipe, snapshot: &ContextSnapshot) {
        let resolvable = recipe
            .entry
            .module_candidates()
            .iter()
            .any(|path| snapshot.contains_file(path));
        if !resolvable {
            let message = format!(
                "Entry module '{}' is not in the build context, the image will fail to start",
                recipe.entry.module()
            );
            tracing::warn!("Build '{}': {message}", self.build_id);
            let _ = self.tx.send(BuildChunk::Warning(message)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use bollard::models::{BuildInfo, CreateImageInfo, ErrorDetail, ImageId};
    use futures::stream::{self, BoxStream};
    use secondtry_models::BuildInput;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::{builder::plugin::load_recipe_template, config::AppConfig};

    /// Engine that replays canned build output and records what it was asked to do
    #[derive(Default)]
    struct FakeEngine {
        base_present: bool,
        pull_error: Option<String>,
        build_output: Vec<BuildInfo>,
        /// Never finish the build, like an engine stuck on a long step
        stall_build: bool,
        calls: Arc<Mutex<Vec<String>>>,
        archive: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait]
    impl ImageEngine for FakeEngine {
        async fn image_exists(&self, image: &str) -> Result<bool, bollard::errors::Error> {
            self.calls.lock().unwrap().push(format!("exists {image}"));
            Ok(self.base_present)
        }

        fn pull_image(
            &self,
            image: &str,
        ) -> BoxStream<'static, Result<CreateImageInfo, bollard::errors::Error>> {
            self.calls.lock().unwrap().push(format!("pull {image}"));
            let info = CreateImageInfo {
                error_detail: self.pull_error.clone().map(|message| ErrorDetail {
                    message: Some(message),
                    ..Default::default()
                }),
                ..Default::default()
            };
            stream::iter(vec![Ok(info)]).boxed()
        }

        fn build_image(
            &self,
            request: ImageBuildRequest,
        ) -> BoxStream<'_, Result<BuildInfo, bollard::errors::Error>> {
            self.calls.lock().unwrap().push(format!("build {}", request.tag));
            if self.stall_build {
                return stream::pending().boxed();
            }
            let archive = self.archive.clone();
            let output = self.build_output.clone();
            // Drain the archive before replaying output, like a real engine would
            stream::once(async move {
                let bytes: Vec<u8> = request
                    .context
                    .map(|chunk| chunk.map(|b| b.to_vec()).unwrap_or_default())
                    .concat()
                    .await;
                *archive.lock().unwrap() = bytes;
                stream::iter(output.into_iter().map(Ok))
            })
            .flatten()
            .boxed()
        }
    }

    impl FakeEngine {
        async fn archive_paths(&self) -> Vec<String> {
            let bytes = self.archive.lock().unwrap().clone();
            let mut archive = tokio_tar::Archive::new(bytes.as_slice());
            let mut entries = archive.entries().unwrap();
            let mut paths = Vec::new();
            while let Some(entry) = entries.next().await {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_owned();
                let mut sink = Vec::new();
                entry.read_to_end(&mut sink).await.unwrap();
                paths.push(path);
            }
            paths
        }
    }

    fn line(text: &str) -> BuildInfo {
        BuildInfo {
            stream: Some(format!("{text}\n")),
            ..Default::default()
        }
    }

    fn successful_output() -> Vec<BuildInfo> {
        let mut output: Vec<BuildInfo> = (1..=7)
            .map(|step| line(&format!("Step {step}/7 : INSTRUCTION")))
            .collect();
        output.push(BuildInfo {
            aux: Some(ImageId {
                id: Some("sha256:built".into()),
            }),
            ..Default::default()
        });
        output
    }

    fn failing_output(failed_step: usize, message: &str) -> Vec<BuildInfo> {
        let mut output: Vec<BuildInfo> = (1..=failed_step)
            .map(|step| line(&format!("Step {step}/7 : INSTRUCTION")))
            .collect();
        output.push(BuildInfo {
            error_detail: Some(ErrorDetail {
                message: Some(message.into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        output
    }

    fn config() -> AppConfig {
        serde_json::from_value(serde_json::json!({ "api_key": "test" })).unwrap()
    }

    fn job(root: &Path) -> BuildJob {
        let recipe = BuildRecipe::resolve(&config(), &BuildInput::default()).unwrap();
        let rendered = recipe.render(&load_recipe_template().unwrap()).unwrap();
        BuildJob {
            id: "build-1".into(),
            tag: "secondtry:test".into(),
            recipe,
            rendered,
            context: BuildContext::new(root),
        }
    }

    fn write_app(root: &Path) {
        std::fs::write(root.join("requirements.txt"), "discord.py>=2.3\naioconsole\n").unwrap();
        std::fs::create_dir_all(root.join("secondtry")).unwrap();
        std::fs::write(root.join("secondtry/cli.py"), "print('ready')\n").unwrap();
    }

    async fn run(
        engine: &FakeEngine,
        registry: &BuildRegistry,
        job: BuildJob,
    ) -> (Result<BuiltImage, BuildError>, Vec<BuildChunk>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let result = BuildPipeline::new(engine, registry.clone(), tx).run(job).await;
        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }
        (result, chunks)
    }

    fn stages(chunks: &[BuildChunk]) -> Vec<BuildStage> {
        chunks
            .iter()
            .filter_map(|c| match c {
                BuildChunk::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn successful_build_passes_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: true,
            build_output: successful_output(),
            ..Default::default()
        };
        let registry = BuildRegistry::new();

        let (result, chunks) = run(&engine, &registry, job(dir.path())).await;
        let built = result.unwrap();
        assert_eq!(built.image_id, "sha256:built");
        assert_eq!(stages(&chunks), &BuildStage::ALL[1..]);
        assert!(!chunks.iter().any(|c| matches!(c, BuildChunk::Warning(_))));
        match chunks.last() {
            Some(BuildChunk::Ready {
                tag, entry_command, ..
            }) => {
                assert_eq!(tag, "secondtry:test");
                assert_eq!(entry_command, &["python", "-m", "secondtry.cli"]);
            }
            other => panic!("expected ready chunk, got {other:?}"),
        }

        let record = registry.get("build-1").await.unwrap();
        assert_eq!(record.stage, BuildStage::ImageReady);
        assert_eq!(
            record.status,
            BuildStatus::Ready {
                image_id: "sha256:built".into()
            }
        );
        assert_eq!(
            *engine.calls.lock().unwrap(),
            ["exists python:3.11-slim", "build secondtry:test"]
        );

        let paths = engine.archive_paths().await;
        assert!(paths.iter().any(|p| p == "secondtry/cli.py"));
        assert!(paths.iter().any(|p| p == "requirements.txt"));
        assert_eq!(paths.last().map(String::as_str), Some(RECIPE_FILENAME));
    }

    #[tokio::test]
    async fn missing_manifest_fails_before_any_engine_step() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("secondtry")).unwrap();
        std::fs::write(dir.path().join("secondtry/cli.py"), "").unwrap();
        let engine = FakeEngine {
            base_present: true,
            build_output: successful_output(),
            ..Default::default()
        };
        let registry = BuildRegistry::new();

        let (result, chunks) = run(&engine, &registry, job(dir.path())).await;
        assert_eq!(result.unwrap_err().kind, BuildErrorKind::ManifestMissing);
        assert!(engine.calls.lock().unwrap().is_empty());
        assert!(stages(&chunks).is_empty());
        assert!(matches!(
            chunks.last(),
            Some(BuildChunk::BuildError {
                stage: BuildStage::Unbuilt,
                kind: BuildErrorKind::ManifestMissing,
                ..
            })
        ));
        let record = registry.get("build-1").await.unwrap();
        assert!(record.stage < BuildStage::SourceCopied);
        assert!(matches!(record.status, BuildStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn unresolvable_base_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: false,
            pull_error: Some("manifest for python:0.0 not found".into()),
            build_output: successful_output(),
            ..Default::default()
        };
        let registry = BuildRegistry::new();

        let (result, chunks) = run(&engine, &registry, job(dir.path())).await;
        assert_eq!(result.unwrap_err().kind, BuildErrorKind::BaseImage);
        assert!(stages(&chunks).is_empty());
        assert_eq!(
            *engine.calls.lock().unwrap(),
            ["exists python:3.11-slim", "pull python:3.11-slim"]
        );
    }

    #[tokio::test]
    async fn dependency_failure_stops_before_source_copy() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: true,
            build_output: failing_output(5, "No matching distribution found for discord.py"),
            ..Default::default()
        };
        let registry = BuildRegistry::new();

        let (result, chunks) = run(&engine, &registry, job(dir.path())).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, BuildErrorKind::Dependencies);
        assert_eq!(
            stages(&chunks),
            [BuildStage::BaseSelected, BuildStage::ToolchainUpdated]
        );
        match chunks.last() {
            Some(BuildChunk::BuildError {
                stage, build_logs, ..
            }) => {
                assert_eq!(*stage, BuildStage::ToolchainUpdated);
                assert!(build_logs.contains("No matching distribution"));
            }
            other => panic!("expected build error, got {other:?}"),
        }
        assert_eq!(registry.ready_image("build-1").await, None);
    }

    #[tokio::test]
    async fn installer_upgrade_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: true,
            build_output: failing_output(2, "Could not fetch URL https://pypi.org/simple/pip/"),
            ..Default::default()
        };

        let (result, _) = run(&engine, &BuildRegistry::new(), job(dir.path())).await;
        assert_eq!(result.unwrap_err().kind, BuildErrorKind::InstallerUpgrade);
    }

    #[tokio::test]
    async fn build_without_image_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let mut output = successful_output();
        output.pop();
        let engine = FakeEngine {
            base_present: true,
            build_output: output,
            ..Default::default()
        };

        let (result, chunks) = run(&engine, &BuildRegistry::new(), job(dir.path())).await;
        assert!(result.is_err());
        assert!(!stages(&chunks).contains(&BuildStage::ImageReady));
    }

    #[tokio::test]
    async fn empty_context_builds_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "").unwrap();
        let engine = FakeEngine {
            base_present: true,
            build_output: successful_output(),
            ..Default::default()
        };

        let (result, chunks) = run(&engine, &BuildRegistry::new(), job(dir.path())).await;
        assert!(result.is_ok());
        assert!(stages(&chunks).contains(&BuildStage::SourceCopied));
        assert!(chunks.iter().any(
            |c| matches!(c, BuildChunk::Warning(msg) if msg.contains("secondtry.cli"))
        ));
    }

    #[tokio::test]
    async fn step_like_output_does_not_advance_stages() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let mut output = failing_output(5, "No matching distribution found for aioconsole");
        let error = output.pop().unwrap();
        output.extend([
            line("Step 7/7 : printed by a dependency"),
            line("Step 6/9 : also not ours"),
            line("Step 0/7"),
            error,
        ]);
        let engine = FakeEngine {
            base_present: true,
            build_output: output,
            ..Default::default()
        };

        let (result, chunks) = run(&engine, &BuildRegistry::new(), job(dir.path())).await;
        assert_eq!(result.unwrap_err().kind, BuildErrorKind::Dependencies);
        assert_eq!(
            stages(&chunks),
            [BuildStage::BaseSelected, BuildStage::ToolchainUpdated]
        );
    }

    #[tokio::test]
    async fn long_symlink_target_is_archived_with_the_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        std::os::unix::fs::symlink("x".repeat(150), dir.path().join("data")).unwrap();
        let engine = FakeEngine {
            base_present: true,
            build_output: successful_output(),
            ..Default::default()
        };

        let (result, _) = run(&engine, &BuildRegistry::new(), job(dir.path())).await;
        assert!(result.is_ok());
        let paths = engine.archive_paths().await;
        assert!(paths.iter().any(|p| p == "data"));
        assert!(paths.iter().any(|p| p == "secondtry/cli.py"));
        assert_eq!(paths.last().map(String::as_str), Some(RECIPE_FILENAME));
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_build() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: true,
            stall_build: true,
            ..Default::default()
        };
        let registry = BuildRegistry::new();
        let (tx, mut rx) = mpsc::channel(1024);

        // Stop listening once the engine build has started
        let client = async move {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                let started =
                    matches!(&chunk, BuildChunk::Info(msg) if msg.starts_with("Building image"));
                chunks.push(chunk);
                if started {
                    break;
                }
            }
            chunks
        };
        let pipeline = BuildPipeline::new(&engine, registry.clone(), tx);
        let (result, chunks) = tokio::join!(pipeline.run_cancellable(job(dir.path())), client);

        let err = result.unwrap_err();
        assert_eq!(err.message, "build cancelled");
        assert!(!chunks.iter().any(|c| matches!(c, BuildChunk::Ready { .. })));
        let record = registry.get("build-1").await.unwrap();
        assert_eq!(
            record.status,
            BuildStatus::Failed {
                kind: BuildErrorKind::Engine,
                message: "build cancelled".into()
            }
        );
        assert_eq!(registry.ready_image("build-1").await, None);
    }

    #[tokio::test]
    async fn digests_follow_build_inputs() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path());
        let engine = FakeEngine {
            base_present: true,
            build_output: successful_output(),
            ..Default::default()
        };
        let registry = BuildRegistry::new();

        let (first, _) = run(&engine, &registry, job(dir.path())).await;
        let (second, _) = run(&engine, &registry, job(dir.path())).await;
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first, second);

        std::fs::write(dir.path().join("secondtry/cli.py"), "print('changed')\n").unwrap();
        let (third, _) = run(&engine, &registry, job(dir.path())).await;
        let third = third.unwrap();
        assert_eq!(first.manifest_digest, third.manifest_digest);
        assert_ne!(first.context_digest, third.context_digest);

        let record = registry.get("build-1").await.unwrap();
        assert_eq!(record.context_digest, Some(third.context_digest));
    }
}
