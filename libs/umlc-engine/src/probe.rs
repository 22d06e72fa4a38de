use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};
use umlc_common::types::{DependencyStatus, ToolStatus};

use crate::cancel::CancelToken;
use crate::config::{LanguageConfigManager, ToolSpec};
use crate::engine::{ProcessEngine, ProcessSpec};

/// Checks which external toolchains are usable on this machine.
pub struct DependencyProber {
    engine: ProcessEngine,
    timeout: Duration,
}

impl DependencyProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            // version banners are short
            engine: ProcessEngine::new(16 * 1024),
            timeout,
        }
    }

    /// Probe every tool referenced by a configured language.
    ///
    /// Never fails: anything that goes wrong for a tool marks it unavailable.
    pub async fn probe(&self, config: &LanguageConfigManager) -> DependencyStatus {
        self.probe_tools(config.required_tools()).await
    }

    pub async fn probe_tools<'a>(&self, tools: impl IntoIterator<Item = &'a ToolSpec>) -> DependencyStatus {
        let checks = tools.into_iter().map(|tool| async move {
            let status = self.probe_tool(tool).await;
            (tool.id.clone(), status)
        });
        let tools: BTreeMap<String, ToolStatus> = join_all(checks).await.into_iter().collect();

        let status = DependencyStatus::new(tools);
        for warning in status.warnings() {
            warn!("{}", warning);
        }
        status
    }

    pub async fn probe_tool(&self, tool: &ToolSpec) -> ToolStatus {
        let path = match ProcessEngine::resolve_program(&tool.program) {
            Ok(path) => path,
            Err(_) => {
                info!(tool = %tool.id, program = %tool.program, "Tool not found on PATH");
                return ToolStatus::missing();
            }
        };

        let spec = ProcessSpec::new(
            path.to_string_lossy().into_owned(),
            tool.version_args.clone(),
            self.timeout,
        );
        let output = match self.engine.run(&spec, &CancelToken::new()).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %tool.id, error = %e, "Version probe failed to start");
                return ToolStatus {
                    available: false,
                    path: Some(path),
                    version: None,
                };
            }
        };

        if !output.success() {
            warn!(
                tool = %tool.id,
                exit_code = ?output.exit_code,
                termination = ?output.termination,
                "Version probe did not succeed"
            );
            return ToolStatus {
                available: false,
                path: Some(path),
                version: None,
            };
        }

        // javac/java print their banner on stderr
        let version = first_line(&output.stdout).or_else(|| first_line(&output.stderr));
        info!(tool = %tool.id, version = ?version, "Tool available");
        ToolStatus {
            available: true,
            path: Some(path),
            version,
        }
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
