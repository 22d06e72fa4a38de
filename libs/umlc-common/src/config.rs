// Runtime settings shared by the engine and front-ends
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1024 * 1024; // 1MB per stream
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Wall-clock bound for the run phase
    pub run_timeout_ms: u64,

    /// Wall-clock bound for the compile phase
    pub compile_timeout_ms: u64,

    /// Wall-clock bound for each `--version` probe
    pub probe_timeout_ms: u64,

    /// Bytes kept per captured stream; the rest is drained and dropped
    pub output_limit_bytes: usize,

    /// Largest accepted source text
    pub max_source_bytes: usize,

    /// Parent directory for per-run scratch directories (system temp if unset)
    pub temp_root: Option<PathBuf>,

    /// Optional language profile overrides
    pub languages_config: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            temp_root: None,
            languages_config: PathBuf::from(DEFAULT_LANGUAGES_CONFIG),
        }
    }
}

impl Settings {
    /// Load settings from `UMLC_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            run_timeout_ms: parse_env("UMLC_RUN_TIMEOUT_MS").unwrap_or(defaults.run_timeout_ms),
            compile_timeout_ms: parse_env("UMLC_COMPILE_TIMEOUT_MS")
                .unwrap_or(defaults.compile_timeout_ms),
            probe_timeout_ms: parse_env("UMLC_PROBE_TIMEOUT_MS")
                .unwrap_or(defaults.probe_timeout_ms),
            output_limit_bytes: parse_env("UMLC_OUTPUT_LIMIT_BYTES")
                .unwrap_or(defaults.output_limit_bytes),
            max_source_bytes: parse_env("UMLC_MAX_SOURCE_BYTES")
                .unwrap_or(defaults.max_source_bytes),
            temp_root: env::var("UMLC_TEMP_DIR").ok().map(PathBuf::from),
            languages_config: env::var("UMLC_LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.languages_config),
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.run_timeout(), Duration::from_secs(10));
        assert_eq!(settings.compile_timeout(), Duration::from_secs(30));
        assert_eq!(settings.probe_timeout_ms, 5_000);
        assert!(settings.temp_root.is_none());
        assert_eq!(settings.languages_config, PathBuf::from("config/languages.json"));
    }

    #[test]
    fn test_parse_env_ignores_garbage() {
        env::set_var("UMLC_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(parse_env::<u64>("UMLC_TEST_PARSE_GARBAGE"), None);
        env::set_var("UMLC_TEST_PARSE_OK", " 42 ");
        assert_eq!(parse_env::<u64>("UMLC_TEST_PARSE_OK"), Some(42));
        assert_eq!(parse_env::<u64>("UMLC_TEST_PARSE_UNSET"), None);
    }
}
