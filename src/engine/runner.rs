//! Stack runner and builder.
//!
//! [`StackRunner`] (constructed via [`StackRunnerBuilder`]) applies a stack's
//! bindings in order against one exclusively owned model, records every
//! binding's outcome, and stops at the first fatal error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use super::config::EngineConfig;
use super::record::{format_elapsed, BindingOutcome, BindingStatus, RunRecord, RunState, SkipReason};
use super::run_dir::RunDirectory;
use super::stop::StopSignal;
use crate::codec::StackCodec;
use crate::error::{LayerError, LayerStackError, StackResult};
use crate::layer::{LayerContext, LayerImpl, LayerRegistry, LogLine, ModelAdapter};
use crate::stack::{LayerBinding, Stack};

/// Result of a run that did not hit a fatal error. `record.state` is
/// `Succeeded` or `Stopped`.
#[derive(Debug)]
pub struct RunReport<M> {
    pub model: Option<M>,
    pub record: RunRecord,
}

/// A run that halted on a fatal error, with everything produced so far.
pub struct RunFailure<M> {
    /// Binding the error is attached to; `None` for errors before the first
    /// binding or while saving the final model.
    pub index: Option<usize>,
    pub error: LayerStackError,
    pub record: RunRecord,
    /// The model as left by the last binding that ran.
    pub model: Option<M>,
}

impl<M> fmt::Debug for RunFailure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFailure")
            .field("index", &self.index)
            .field("error", &self.error)
            .field("state", &self.record.state)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}

impl<M> fmt::Display for RunFailure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stack '{}' failed: {}", self.record.stack, self.error)
    }
}

impl<M> std::error::Error for RunFailure<M> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Stack runner with builder-based configuration.
pub struct StackRunner<M>
where
    M: Send + Sync + 'static,
{
    stack: Stack,
    registry: Arc<LayerRegistry<M>>,
    model: Option<M>,
    model_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    run_dir: Option<PathBuf>,
    config: EngineConfig,
    stop_signal: StopSignal,
    start_at: usize,
}

impl<M> StackRunner<M>
where
    M: Send + Sync + 'static,
{
    pub fn builder(stack: Stack, registry: Arc<LayerRegistry<M>>) -> StackRunnerBuilder<M> {
        StackRunnerBuilder {
            stack,
            registry,
            model: None,
            model_path: None,
            save_path: None,
            run_dir: None,
            config: EngineConfig::default(),
            stop_signal: None,
            start_at: 0,
        }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }

    /// Run the stack to completion, a stop request, or the first fatal error.
    pub async fn run(self) -> Result<RunReport<M>, RunFailure<M>> {
        let started = Instant::now();
        let StackRunner {
            stack,
            registry,
            model,
            model_path,
            save_path,
            run_dir,
            config,
            stop_signal,
            start_at,
        } = self;

        let run_path = run_dir.or_else(|| stack.run_dir().map(Path::to_path_buf));
        let mut record = RunRecord::new(
            stack.name(),
            stack.uuid(),
            run_path.clone().unwrap_or_default(),
        );
        let mut run = Run {
            stack: &stack,
            registry: registry.as_ref(),
            config: &config,
            model,
            started,
        };

        let Some(run_path) = run_path else {
            let error = LayerStackError::NotRunnable("no run directory set".into());
            return Err(run.fail(None, error, record));
        };
        if start_at > stack.len() {
            let error = LayerStackError::BindingOutOfRange {
                index: start_at,
                len: stack.len(),
            };
            return Err(run.fail(None, error, record));
        }
        let run_dir = match RunDirectory::open(&run_path, config.lock_run_dir).await {
            Ok(dir) => dir,
            Err(error) => return Err(run.fail(None, error, record)),
        };
        if config.archive {
            if let Err(error) = StackCodec::default().archive(&stack, &run_dir.archive_path()) {
                return Err(run.fail(None, error, record));
            }
        }

        tracing::info!(
            stack = %stack.name(),
            run_dir = %run_path.display(),
            bindings = stack.len(),
            start_at,
            "Running stack"
        );

        let model_path = model_path.or_else(|| stack.model().map(Path::to_path_buf));
        if let Err(error) = run.prepare_model(&run_dir, model_path.as_deref(), start_at).await {
            let index = error.binding_index();
            return Err(run.fail(index, error, record));
        }

        for (index, binding) in stack.bindings().iter().enumerate() {
            if index < start_at {
                record.outcomes.push(BindingOutcome::skipped(
                    index,
                    binding.name(),
                    binding.uuid(),
                    SkipReason::BeforeStart,
                ));
                continue;
            }
            if stop_signal.is_triggered() {
                tracing::info!(stack = %stack.name(), next = index, "Stop requested, ending run");
                record.state = RunState::Stopped { next: index };
                record.elapsed = started.elapsed();
                return Ok(RunReport {
                    model: run.model,
                    record,
                });
            }
            if !binding.is_enabled() {
                tracing::debug!(index, layer = %binding.name(), "Skipping disabled binding");
                record.outcomes.push(BindingOutcome::skipped(
                    index,
                    binding.name(),
                    binding.uuid(),
                    SkipReason::Disabled,
                ));
                continue;
            }

            record.state = RunState::Running { index };
            let ctx = LayerContext::new(stack.name(), binding.name(), index, run_dir.path());
            let span = tracing::info_span!(
                "layer",
                stack = %stack.name(),
                layer = %binding.name(),
                index,
                logger = %ctx.logger_name(),
            );
            let binding_started = Instant::now();
            let result = run
                .apply_binding(index, binding, &run_dir, &ctx)
                .instrument(span)
                .await;
            let elapsed = binding_started.elapsed();

            let (status, checkpoint, error) = match result {
                Ok(checkpoint) => {
                    ctx.info(format!("Finished in {}", format_elapsed(elapsed)));
                    (BindingStatus::Succeeded, checkpoint, None)
                }
                Err(error) => {
                    ctx.error(error.to_string());
                    let status = BindingStatus::Failed {
                        error: error.to_string(),
                    };
                    (status, None, Some(error))
                }
            };
            let log = ctx.take_lines();
            if config.file_log {
                write_log(&run_dir, &log).await;
            }
            record.outcomes.push(BindingOutcome {
                index,
                layer: binding.name().to_string(),
                uuid: binding.uuid(),
                status,
                elapsed,
                log,
                checkpoint,
            });
            if let Some(error) = error {
                return Err(run.fail(Some(index), error, record));
            }
        }

        if let Some(save_path) = &save_path {
            if let Err(error) = run.save_model(save_path).await {
                let index = error.binding_index();
                return Err(run.fail(index, error, record));
            }
        }

        record.state = RunState::Succeeded;
        record.elapsed = started.elapsed();
        let summary = format!("Stack ran successfully in {}", format_elapsed(record.elapsed));
        tracing::info!(stack = %stack.name(), "{}", summary);
        if config.file_log {
            write_log(&run_dir, &[run_line(stack.name(), tracing::Level::INFO, summary)]).await;
        }
        Ok(RunReport {
            model: run.model,
            record,
        })
    }
}

/// Mutable state of one run.
struct Run<'a, M>
where
    M: Send + Sync + 'static,
{
    stack: &'a Stack,
    registry: &'a LayerRegistry<M>,
    config: &'a EngineConfig,
    model: Option<M>,
    started: Instant,
}

impl<'a, M> Run<'a, M>
where
    M: Send + Sync + 'static,
{
    fn fail(self, index: Option<usize>, error: LayerStackError, mut record: RunRecord) -> RunFailure<M> {
        record.elapsed = self.started.elapsed();
        if let Some(index) = index {
            record.state = RunState::Failed { index };
        }
        tracing::error!(
            stack = %self.stack.name(),
            error = %error,
            "Stack failed after {}",
            format_elapsed(record.elapsed)
        );
        RunFailure {
            index,
            error,
            record,
            model: self.model,
        }
    }

    fn model_adapter(&self, index: usize) -> StackResult<Option<Arc<dyn ModelAdapter<M>>>> {
        let binding = &self.stack.bindings()[index];
        let registered = self
            .registry
            .get(&binding.uuid())
            .ok_or_else(|| unresolved(binding))?;
        Ok(registered.implementation().adapter())
    }

    /// Pick up the starting model: an explicit instance, the latest
    /// checkpoint before `start_at`, or `model_path` loaded by the first
    /// enabled binding.
    async fn prepare_model(
        &mut self,
        run_dir: &RunDirectory,
        model_path: Option<&Path>,
        start_at: usize,
    ) -> StackResult<()> {
        if self.model.is_some() {
            return Ok(());
        }
        if start_at > 0 {
            if let Some((index, dir)) = run_dir.latest_checkpoint(start_at).await? {
                if index < self.stack.len() {
                    if let Some(adapter) = self.model_adapter(index)? {
                        tracing::info!(checkpoint = %dir.display(), "Resuming from checkpoint");
                        self.model = Some(adapter.load_model(&dir).await.map_err(|source| {
                            LayerStackError::LayerApply {
                                index,
                                layer: self.stack.bindings()[index].name().to_string(),
                                source,
                            }
                        })?);
                        return Ok(());
                    }
                }
            }
        }
        let Some(path) = model_path else {
            return Ok(());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Model path does not exist, starting without a model");
            return Ok(());
        }
        let Some((index, binding)) = self
            .stack
            .bindings()
            .iter()
            .enumerate()
            .skip(start_at)
            .find(|(_, b)| b.is_enabled())
        else {
            return Ok(());
        };
        let adapter = self.model_adapter(index)?.ok_or_else(|| {
            LayerStackError::Config(format!(
                "to load the model at {}, the first layer must be a model layer, but '{}' is model-free",
                path.display(),
                binding.name()
            ))
        })?;
        tracing::info!(path = %path.display(), layer = %binding.name(), "Loading model");
        let model = adapter
            .load_model(path)
            .await
            .map_err(|source| LayerStackError::LayerApply {
                index,
                layer: binding.name().to_string(),
                source,
            })?;
        self.model = Some(model);
        Ok(())
    }

    /// Resolve, check, and apply one binding. Returns the checkpoint written.
    async fn apply_binding(
        &mut self,
        index: usize,
        binding: &LayerBinding,
        run_dir: &RunDirectory,
        ctx: &LayerContext,
    ) -> StackResult<Option<PathBuf>> {
        ctx.info(format!("Running {}", binding.name()));
        let registered = self
            .registry
            .get(&binding.uuid())
            .ok_or_else(|| unresolved(binding))?;
        let args = binding.resolve(index).map_err(LayerStackError::Validation)?;
        let apply_error = |source: LayerError| LayerStackError::LayerApply {
            index,
            layer: binding.name().to_string(),
            source,
        };

        match registered.implementation() {
            LayerImpl::ModelFree(layer) => {
                if layer.apply(ctx, &args).await.map_err(apply_error)? {
                    Ok(None)
                } else {
                    Err(apply_error(LayerError::ExecutionError(
                        "layer reported failure".into(),
                    )))
                }
            }
            LayerImpl::Model(layer) => {
                let model = self
                    .model
                    .as_mut()
                    .ok_or_else(|| LayerStackError::ModelNotInitialized {
                        index,
                        layer: binding.name().to_string(),
                    })?;
                let adapter = layer.adapter();
                if !adapter.check_model_type(model) {
                    return Err(LayerStackError::ModelType {
                        index,
                        layer: binding.name().to_string(),
                    });
                }
                layer.apply(ctx, model, &args).await.map_err(apply_error)?;
                if !self.config.checkpoint {
                    return Ok(None);
                }
                let dir = run_dir.checkpoint_dir(index);
                adapter.save_model(model, &dir).await.map_err(apply_error)?;
                ctx.debug(format!("Checkpoint saved to {}", dir.display()));
                Ok(Some(dir))
            }
        }
    }

    /// Save the final model with the adapter of the last enabled model layer.
    async fn save_model(&self, save_path: &Path) -> StackResult<()> {
        let Some(model) = &self.model else {
            return Err(LayerStackError::Config(format!(
                "cannot save to {}: the run produced no model",
                save_path.display()
            )));
        };
        for (index, binding) in self.stack.bindings().iter().enumerate().rev() {
            if !binding.is_enabled() {
                continue;
            }
            if let Some(adapter) = self.model_adapter(index)? {
                tracing::info!(path = %save_path.display(), layer = %binding.name(), "Saving model");
                return adapter
                    .save_model(model, save_path)
                    .await
                    .map_err(|source| LayerStackError::LayerApply {
                        index,
                        layer: binding.name().to_string(),
                        source,
                    });
            }
        }
        Err(LayerStackError::Config(format!(
            "cannot save to {}: the stack has no enabled model layer",
            save_path.display()
        )))
    }
}

fn unresolved(binding: &LayerBinding) -> LayerStackError {
    LayerStackError::UnresolvedLayer {
        uuid: binding.uuid(),
        name: binding.name().to_string(),
        version: binding.version().to_string(),
    }
}

fn run_line(stack: &str, level: tracing::Level, message: String) -> LogLine {
    LogLine {
        timestamp: chrono::Utc::now(),
        level: level.to_string(),
        logger: stack.to_string(),
        message,
    }
}

async fn write_log(run_dir: &RunDirectory, lines: &[LogLine]) {
    if let Err(e) = run_dir.append_log(lines).await {
        tracing::warn!(error = %e, "Failed to append to stack.log");
    }
}

/// Builder for configuring and launching a [`StackRunner`].
pub struct StackRunnerBuilder<M>
where
    M: Send + Sync + 'static,
{
    stack: Stack,
    registry: Arc<LayerRegistry<M>>,
    model: Option<M>,
    model_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    run_dir: Option<PathBuf>,
    config: EngineConfig,
    stop_signal: Option<StopSignal>,
    start_at: usize,
}

impl<M> StackRunnerBuilder<M>
where
    M: Send + Sync + 'static,
{
    /// Start from this model instead of loading one.
    pub fn model(mut self, model: M) -> Self {
        self.model = Some(model);
        self
    }

    /// Load the starting model from `path`, overriding the stack's model path.
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Save the final model here after a successful run.
    pub fn save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Override the stack's run directory.
    pub fn run_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(path.into());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = Some(signal);
        self
    }

    /// Resume at binding `index`. Earlier bindings are skipped and the model
    /// comes from the latest checkpoint before `index` when there is one.
    pub fn start_at(mut self, index: usize) -> Self {
        self.start_at = index;
        self
    }

    pub fn build(self) -> StackRunner<M> {
        StackRunner {
            stack: self.stack,
            registry: self.registry,
            model: self.model,
            model_path: self.model_path,
            save_path: self.save_path,
            run_dir: self.run_dir,
            config: self.config,
            stop_signal: self.stop_signal.unwrap_or_default(),
            start_at: self.start_at,
        }
    }

    /// Build and run.
    pub async fn run(self) -> Result<RunReport<M>, RunFailure<M>> {
        self.build().run().await
    }
}
