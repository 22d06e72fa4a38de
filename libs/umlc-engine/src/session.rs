//! Front-end facing run session.
//!
//! A [`Session`] runs at most one request at a time on a background task and
//! hands back a [`RunHandle`] the UI loop can poll, watch or cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};
use umlc_common::config::Settings;
use umlc_common::types::{DependencyStatus, ExecutionRequest, ExecutionResult, RunPhase};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::LanguageConfigManager;
use crate::executor::Orchestrator;
use crate::probe::DependencyProber;

/// Everything a front-end needs, built once at startup.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub config: Arc<LanguageConfigManager>,
    pub dependencies: Arc<DependencyStatus>,
}

impl AppContext {
    pub fn new(settings: Settings, config: LanguageConfigManager, dependencies: DependencyStatus) -> Self {
        Self {
            settings: Arc::new(settings),
            config: Arc::new(config),
            dependencies: Arc::new(dependencies),
        }
    }

    /// Load language profiles and probe their tools.
    pub async fn bootstrap(settings: Settings) -> Result<Self> {
        let config = LanguageConfigManager::load_or_builtin(&settings.languages_config)?;
        info!(languages = ?config.list_languages(), "Language profiles ready");

        let dependencies = DependencyProber::new(settings.probe_timeout())
            .probe(&config)
            .await;

        Ok(Self::new(settings, config, dependencies))
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.config.clone(),
            self.settings.clone(),
            self.dependencies.clone(),
        )
    }

    pub fn session(&self) -> Session {
        Session::new(self.orchestrator())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a run is already in progress")]
    Busy,

    #[error("run task ended without producing a result")]
    Lost,
}

pub struct Session {
    orchestrator: Arc<Orchestrator>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the run task ends, including by panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Session {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start `request` in the background. Must be called inside a tokio runtime.
    pub fn start(&self, request: ExecutionRequest) -> Result<RunHandle, SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(run_id = %request.id, "Rejected run, session busy");
            return Err(SessionError::Busy);
        }
        let guard = InFlightGuard(self.in_flight.clone());

        let id = request.id;
        let cancel = CancelToken::new();
        let (phase_tx, phase_rx) = watch::channel(RunPhase::Idle);
        let (result_tx, result_rx) = oneshot::channel();

        let orchestrator = self.orchestrator.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = orchestrator.execute_observed(&request, &token, &phase_tx).await;
            // free the session before the caller can observe the result
            drop(guard);
            let _ = result_tx.send(result);
        });

        Ok(RunHandle {
            id,
            cancel,
            phase: phase_rx,
            result: result_rx,
        })
    }
}

/// Caller's side of one background run.
pub struct RunHandle {
    id: Uuid,
    cancel: CancelToken,
    phase: watch::Receiver<RunPhase>,
    result: oneshot::Receiver<ExecutionResult>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request termination; the run still cleans up and reports `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn phase_updates(&self) -> watch::Receiver<RunPhase> {
        self.phase.clone()
    }

    pub async fn wait(self) -> Result<ExecutionResult, SessionError> {
        self.result.await.map_err(|_| SessionError::Lost)
    }

    /// Non-blocking poll. Yields the result once; `None` while still running.
    pub fn try_result(&mut self) -> Option<Result<ExecutionResult, SessionError>> {
        match self.result.try_recv() {
            Ok(result) => Some(Ok(result)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Lost)),
        }
    }
}
