use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Languages the runner knows how to drive.
///
/// The set is closed: every variant must have exactly one profile in the
/// language configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Cpp,
    Java,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::Java,
        Language::JavaScript,
    ];

    /// Parse a user-facing tag, accepting the usual aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Some(Language::Python),
            "c" => Some(Language::C),
            "cpp" | "c++" | "cxx" | "cc" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "javascript" | "js" | "node" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Guess the language of a saved source file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(Language::Python),
            "c" => Some(Language::C),
            "cpp" | "cxx" | "cc" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "js" | "mjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Extension (without the dot) used when writing a source file.
    pub fn canonical_extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "js",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_tag(s).ok_or_else(|| format!("unknown language tag: {}", s))
    }
}

/// Whether a run stops after the compile phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Run,
    CompileOnly,
}

/// One request to compile and/or run a piece of source code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub language: Language,
    pub source_code: String,
    /// Text fed to the program's stdin. `None` means stdin is empty.
    #[serde(default)]
    pub stdin: Option<String>,
    /// Overrides the configured run timeout for this request.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub mode: RunMode,
}

impl ExecutionRequest {
    pub fn new(language: Language, source_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            language,
            source_code: source_code.into(),
            stdin: None,
            timeout_ms: None,
            mode: RunMode::Run,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn compile_only(mut self) -> Self {
        self.mode = RunMode::CompileOnly;
        self
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    CompileError,
    RuntimeError,
    Timeout,
    Cancelled,
    ToolMissing,
    ConfigurationError,
    IoError,
    Rejected,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }

    /// Short human label, used by front-ends next to the output panel.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::CompileError => "compilation failed",
            ExecutionStatus::RuntimeError => "runtime error",
            ExecutionStatus::Timeout => "timed out",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::ToolMissing => "toolchain missing",
            ExecutionStatus::ConfigurationError => "configuration error",
            ExecutionStatus::IoError => "i/o error",
            ExecutionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a single run.
///
/// `Idle → Writing → Compiling → Running → Captured → Cleaned`, with
/// `Compiling` skipped for interpreted languages and `Aborted` replacing
/// `Captured` on timeout, cancellation or infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Writing,
    Compiling,
    Running,
    Captured,
    Aborted,
    Cleaned,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Writing => "writing",
            RunPhase::Compiling => "compiling",
            RunPhase::Running => "running",
            RunPhase::Captured => "captured",
            RunPhase::Aborted => "aborted",
            RunPhase::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Outcome of a run, handed to the front-end by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub request_id: Uuid,
    pub language: Language,
    pub status: ExecutionStatus,
    /// stdout, then stderr, then the runner's own diagnostic line.
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    /// Compiler chatter (warnings) from a successful compile phase.
    pub compiler_output: Option<String>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub elapsed_ms: u64,
    pub compile_ms: Option<u64>,
    pub phases: Vec<RunPhase>,
    pub notes: Vec<String>,
    pub truncated: bool,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True when the given phase was entered at some point during the run.
    pub fn reached(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Join captured streams into the text shown in the output panel.
///
/// Ordering is fixed: stdout first, then stderr, then the diagnostic (if
/// any) in square brackets. Each piece starts on its own line.
pub fn combine_output(stdout: &str, stderr: &str, diagnostic: Option<&str>) -> String {
    let mut combined = String::with_capacity(stdout.len() + stderr.len() + 64);
    for piece in [stdout, stderr] {
        if piece.is_empty() {
            continue;
        }
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(piece);
    }
    if let Some(diagnostic) = diagnostic {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push('[');
        combined.push_str(diagnostic);
        combined.push(']');
    }
    combined
}

/// Probe result for one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn missing() -> Self {
        Self {
            available: false,
            path: None,
            version: None,
        }
    }
}

/// Availability of every external tool, keyed by tool id.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub tools: BTreeMap<String, ToolStatus>,
}

impl DependencyStatus {
    pub fn new(tools: BTreeMap<String, ToolStatus>) -> Self {
        Self { tools }
    }

    /// Unknown tools count as unavailable.
    pub fn is_available(&self, tool: &str) -> bool {
        self.tools.get(tool).map(|t| t.available).unwrap_or(false)
    }

    pub fn get(&self, tool: &str) -> Option<&ToolStatus> {
        self.tools.get(tool)
    }

    pub fn missing(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, status)| !status.available)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn all_available<'a>(&self, tools: impl IntoIterator<Item = &'a str>) -> bool {
        tools.into_iter().all(|tool| self.is_available(tool))
    }

    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.tools
            .iter()
            .map(|(id, status)| (id.clone(), status.available))
            .collect()
    }

    /// One banner line per unavailable tool.
    pub fn warnings(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, status)| !status.available)
            .map(|(id, status)| match &status.path {
                Some(path) => format!(
                    "'{}' was found at {} but its version check failed; languages that need it may not run",
                    id,
                    path.display()
                ),
                None => format!("'{}' was not found on PATH; languages that need it will not run", id),
            })
            .collect()
    }
}
