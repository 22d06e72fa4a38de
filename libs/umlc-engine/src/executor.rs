//! Compile/Run Orchestrator
//!
//! **Responsibility:**
//! Turn one [`ExecutionRequest`] into one [`ExecutionResult`].
//!
//! **Flow:**
//! 1. Validate the request and resolve its language profile
//! 2. Write the source into a fresh run directory (workspace.rs)
//! 3. Compile if the pipeline has a compile step; stop on failure
//! 4. Run with the request's stdin and timeout (engine.rs)
//! 5. Remove the run directory, then fold everything into a result
//!
//! Every [`ExecutionError`] is converted here; callers never see one.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use umlc_common::config::Settings;
use umlc_common::types::{
    combine_output, DependencyStatus, ExecutionRequest, ExecutionResult, ExecutionStatus, Language,
    RunMode, RunPhase,
};

use crate::cancel::CancelToken;
use crate::config::{LanguageConfigManager, LanguageProfile};
use crate::engine::{ProcessEngine, ProcessOutput, ProcessSpec, Termination};
use crate::error::{ExecResult, ExecutionError};
use crate::workspace::RunWorkspace;

pub const EMPTY_SOURCE_MESSAGE: &str = "No code to run!";
pub const INTERPRETED_COMPILE_NOTE: &str = "No compilation needed for interpreted language";
const COMPILE_OK_MESSAGE: &str = "Compilation successful";

/// Phases entered so far, mirrored to an optional observer.
struct PhaseTrace<'a> {
    phases: Vec<RunPhase>,
    observer: Option<&'a watch::Sender<RunPhase>>,
}

impl<'a> PhaseTrace<'a> {
    fn new(observer: Option<&'a watch::Sender<RunPhase>>) -> Self {
        Self {
            phases: vec![RunPhase::Idle],
            observer,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug_assert!(!self.phases.contains(&phase), "phase {} re-entered", phase);
        self.phases.push(phase);
        if let Some(observer) = self.observer {
            observer.send_replace(phase);
        }
        debug!(phase = %phase, "Entered phase");
    }
}

/// Side results of a run that survive a later failure.
#[derive(Default)]
struct Collected {
    compile: Option<ProcessOutput>,
    notes: Vec<String>,
}

pub struct Orchestrator {
    config: Arc<LanguageConfigManager>,
    settings: Arc<Settings>,
    dependencies: Arc<DependencyStatus>,
    engine: ProcessEngine,
}

impl Orchestrator {
    pub fn new(
        config: Arc<LanguageConfigManager>,
        settings: Arc<Settings>,
        dependencies: Arc<DependencyStatus>,
    ) -> Self {
        let engine = ProcessEngine::new(settings.output_limit_bytes);
        Self {
            config,
            settings,
            dependencies,
            engine,
        }
    }

    pub async fn execute(&self, request: &ExecutionRequest, cancel: &CancelToken) -> ExecutionResult {
        self.execute_inner(request, cancel, None).await
    }

    /// Like [`execute`](Self::execute), publishing each phase to `phases`.
    pub async fn execute_observed(
        &self,
        request: &ExecutionRequest,
        cancel: &CancelToken,
        phases: &watch::Sender<RunPhase>,
    ) -> ExecutionResult {
        self.execute_inner(request, cancel, Some(phases)).await
    }

    #[tracing::instrument(
        skip(self, request, cancel, observer),
        fields(run_id = %request.id, language = %request.language, mode = ?request.mode)
    )]
    async fn execute_inner(
        &self,
        request: &ExecutionRequest,
        cancel: &CancelToken,
        observer: Option<&watch::Sender<RunPhase>>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut trace = PhaseTrace::new(observer);
        let mut collected = Collected::default();

        let profile = match self
            .validate(request)
            .and_then(|()| self.config.get_profile(&request.language))
        {
            Ok(profile) => profile,
            Err(err) => {
                trace.enter(RunPhase::Aborted);
                trace.enter(RunPhase::Cleaned);
                return self.build_result(request, trace, collected, Err(err), false, started);
            }
        };
        self.note_missing_tools(profile, &mut collected.notes);

        trace.enter(RunPhase::Writing);
        let mut workspace = match RunWorkspace::create(self.settings.temp_root.as_deref()) {
            Ok(workspace) => workspace,
            Err(e) => {
                let err = ExecutionError::io("Failed to create run directory", e);
                trace.enter(RunPhase::Aborted);
                trace.enter(RunPhase::Cleaned);
                return self.build_result(request, trace, collected, Err(err), false, started);
            }
        };

        let outcome = self
            .run_pipeline(request, profile, &mut workspace, &mut trace, &mut collected, cancel)
            .await;

        trace.enter(if reached_capture(&outcome) {
            RunPhase::Captured
        } else {
            RunPhase::Aborted
        });

        let run_dir = workspace.path().to_path_buf();
        let cleanup_failed = match workspace.close() {
            Ok(()) => false,
            Err(e) => {
                warn!(path = %run_dir.display(), error = %e, "Failed to remove run directory");
                collected
                    .notes
                    .push(format!("Failed to remove temporary files in {}: {}", run_dir.display(), e));
                true
            }
        };
        trace.enter(RunPhase::Cleaned);

        self.build_result(request, trace, collected, outcome, cleanup_failed, started)
    }

    fn validate(&self, request: &ExecutionRequest) -> ExecResult<()> {
        if request.source_code.trim().is_empty() {
            return Err(ExecutionError::InvalidRequest(EMPTY_SOURCE_MESSAGE.to_string()));
        }
        if request.source_code.len() > self.settings.max_source_bytes {
            return Err(ExecutionError::InvalidRequest(format!(
                "Source is too large ({} bytes, limit {})",
                request.source_code.len(),
                self.settings.max_source_bytes
            )));
        }
        Ok(())
    }

    /// The probe is advisory: note what it reported, then try anyway.
    fn note_missing_tools(&self, profile: &LanguageProfile, notes: &mut Vec<String>) {
        for tool in &profile.required_tools {
            let reported_missing = self
                .dependencies
                .get(tool)
                .map(|status| !status.available)
                .unwrap_or(false);
            if reported_missing {
                notes.push(format!("'{}' was reported missing at startup", tool));
            }
        }
    }

    /// Returns `Ok(None)` when the request stops after compilation.
    async fn run_pipeline(
        &self,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
        workspace: &mut RunWorkspace,
        trace: &mut PhaseTrace<'_>,
        collected: &mut Collected,
        cancel: &CancelToken,
    ) -> ExecResult<Option<ProcessOutput>> {
        workspace
            .write_source(profile, &request.source_code)
            .map_err(|e| ExecutionError::io("Failed to write source file", e))?;
        let ctx = workspace.template_context();

        if let Some(compile) = profile.pipeline.compile_step() {
            trace.enter(RunPhase::Compiling);
            let command = compile.render(&ctx);
            let spec = ProcessSpec::new(command.program, command.args, self.settings.compile_timeout())
                .cwd(workspace.path());
            let output = self.engine.run(&spec, cancel).await?;

            match output.termination {
                Termination::TimedOut => {
                    return Err(ExecutionError::Timeout {
                        phase: "Compilation",
                        timeout_ms: self.settings.compile_timeout_ms,
                        output,
                    })
                }
                Termination::Cancelled => return Err(ExecutionError::Cancelled { output }),
                Termination::Exited if !output.success() => {
                    info!(exit_code = ?output.exit_code, "Compilation failed");
                    return Err(ExecutionError::Compile { output });
                }
                Termination::Exited => {
                    info!(compile_ms = output.elapsed_ms, "Compilation succeeded");
                    collected.compile = Some(output);
                }
            }
        }

        if request.mode == RunMode::CompileOnly {
            return Ok(None);
        }

        trace.enter(RunPhase::Running);
        if request.language == Language::Python
            && request.stdin.is_none()
            && request.source_code.contains("input(")
        {
            collected
                .notes
                .push("Program reads input but no stdin was provided; it received empty input".to_string());
        }

        let command = profile.pipeline.run_step().render(&ctx);
        let timeout_ms = request.timeout_ms.unwrap_or(self.settings.run_timeout_ms);
        let spec = ProcessSpec::new(
            command.program,
            command.args,
            std::time::Duration::from_millis(timeout_ms),
        )
        .cwd(workspace.path())
        .stdin(request.stdin.clone());
        let output = self.engine.run(&spec, cancel).await?;

        match output.termination {
            Termination::TimedOut => Err(ExecutionError::Timeout {
                phase: "Execution",
                timeout_ms,
                output,
            }),
            Termination::Cancelled => Err(ExecutionError::Cancelled { output }),
            Termination::Exited if output.success() => Ok(Some(output)),
            Termination::Exited => Err(ExecutionError::Runtime { output }),
        }
    }

    fn build_result(
        &self,
        request: &ExecutionRequest,
        trace: PhaseTrace<'_>,
        collected: Collected,
        outcome: ExecResult<Option<ProcessOutput>>,
        cleanup_failed: bool,
        started: Instant,
    ) -> ExecutionResult {
        let Collected { compile, mut notes } = collected;
        let compile_ms = compile.as_ref().map(|c| c.elapsed_ms);
        let compiler_output = compile
            .as_ref()
            .map(|c| combine_output(&c.stdout, &c.stderr, None))
            .filter(|text| !text.trim().is_empty());

        let (mut status, shown, diagnostic) = match &outcome {
            Ok(Some(run)) => (ExecutionStatus::Success, Some(run), None),
            Ok(None) => {
                let message = if compile.is_some() {
                    COMPILE_OK_MESSAGE
                } else {
                    INTERPRETED_COMPILE_NOTE
                };
                (ExecutionStatus::Success, compile.as_ref(), Some(message.to_string()))
            }
            Err(err) => (err.status(), err.output(), Some(diagnostic_for(err))),
        };

        if cleanup_failed && status == ExecutionStatus::Success {
            status = ExecutionStatus::IoError;
        }

        let empty = ProcessOutput::default();
        let shown = shown.unwrap_or(&empty);
        if shown.truncated || compile.as_ref().map(|c| c.truncated).unwrap_or(false) {
            notes.push(format!(
                "Output truncated to {} bytes per stream",
                self.settings.output_limit_bytes
            ));
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %request.id,
            language = %request.language,
            status = %status,
            elapsed_ms = elapsed_ms,
            "Run finished"
        );

        ExecutionResult {
            request_id: request.id,
            language: request.language,
            status,
            output: combine_output(&shown.stdout, &shown.stderr, diagnostic.as_deref()),
            stdout: shown.stdout.clone(),
            stderr: shown.stderr.clone(),
            compiler_output,
            exit_code: shown.exit_code,
            signal: shown.signal,
            elapsed_ms,
            compile_ms,
            phases: trace.phases,
            notes,
            truncated: shown.truncated,
            finished_at: Utc::now(),
        }
    }
}

/// Compile and runtime failures still produced normal output; everything
/// else ended the run early.
fn reached_capture(outcome: &ExecResult<Option<ProcessOutput>>) -> bool {
    matches!(
        outcome,
        Ok(_) | Err(ExecutionError::Compile { .. }) | Err(ExecutionError::Runtime { .. })
    )
}

fn diagnostic_for(err: &ExecutionError) -> String {
    match err {
        ExecutionError::Compile { .. } => "Compilation failed".to_string(),
        ExecutionError::Runtime { output } => match (output.signal, output.exit_code) {
            (Some(signal), _) => describe_signal(signal),
            (None, Some(code)) => format!("Process exited with code {}", code),
            (None, None) => "Process exited abnormally".to_string(),
        },
        ExecutionError::Cancelled { .. } => "Run cancelled".to_string(),
        ExecutionError::InvalidRequest(message) => message.clone(),
        other => other.to_string(),
    }
}

fn describe_signal(signal: i32) -> String {
    let name = match signal {
        4 => Some("illegal instruction"),
        6 => Some("aborted"),
        8 => Some("floating point exception"),
        9 => Some("killed"),
        11 => Some("segmentation fault"),
        13 => Some("broken pipe"),
        15 => Some("terminated"),
        _ => None,
    };
    match name {
        Some(name) => format!("Process terminated by signal {} ({})", signal, name),
        None => format!("Process terminated by signal {}", signal),
    }
}
