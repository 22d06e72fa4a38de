// CLI commands for running sources and managing language profiles
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tokio::signal;
use tracing::info;
use umlc_common::config::Settings;
use umlc_common::types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Language, RunMode};
use umlc_engine::config::Pipeline;
use umlc_engine::{AppContext, LanguageConfigManager};

/// Resolve the stdin text from `--input` or `--stdin-file`
pub fn read_stdin_source(input: Option<String>, stdin_file: Option<&Path>) -> Result<Option<String>> {
    match (input, stdin_file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("Failed to read stdin file {}", path.display())),
        (None, None) => Ok(None),
    }
}

/// Explicit tag wins; otherwise detect from the file extension
fn resolve_language(file: &Path, lang: Option<&str>) -> Result<Language> {
    if let Some(tag) = lang {
        return match Language::from_tag(tag) {
            Some(language) => Ok(language),
            None => bail!(
                "Unknown language '{}'. Supported: python, c, cpp, java, javascript",
                tag
            ),
        };
    }
    Language::from_path(file).with_context(|| {
        format!(
            "Cannot detect the language of {}; pass --lang",
            file.display()
        )
    })
}

/// Compile and/or run one source file
#[allow(clippy::too_many_arguments)]
pub async fn run_file(
    settings: Settings,
    file: &Path,
    lang: Option<&str>,
    stdin: Option<String>,
    timeout_ms: Option<u64>,
    mode: RunMode,
    json: bool,
    save_output: Option<&Path>,
) -> Result<ExitCode> {
    let result = execute_file(settings, file, lang, stdin, timeout_ms, mode, json).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        print_result(&result);
    }

    if let Some(path) = save_output {
        fs::write(path, &result.output)
            .with_context(|| format!("Failed to save output to {}", path.display()))?;
        info!(path = %path.display(), "Saved output");
        if !json {
            eprintln!("💾 Output saved to {}", path.display());
        }
    }

    Ok(ExitCode::from(exit_code(result.status)))
}

/// Bootstrap, start the run on a session and wait for it (Ctrl+C cancels).
///
/// Only input problems (unknown tag, unreadable file, broken config file)
/// are errors; everything about the run itself comes back as a result.
async fn execute_file(
    settings: Settings,
    file: &Path,
    lang: Option<&str>,
    stdin: Option<String>,
    timeout_ms: Option<u64>,
    mode: RunMode,
    quiet: bool,
) -> Result<ExecutionResult> {
    let language = resolve_language(file, lang)?;
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let ctx = AppContext::bootstrap(settings).await?;
    if !quiet {
        // an unconfigured language is reported by the run itself
        if let Ok(profile) = ctx.config.get_profile(&language) {
            for tool in &profile.required_tools {
                if !ctx.dependencies.is_available(tool) {
                    eprintln!("⚠ '{}' is not available", tool);
                }
            }
        }
    }

    let mut request = ExecutionRequest::new(language, source);
    request.stdin = stdin;
    request.timeout_ms = timeout_ms;
    request.mode = mode;

    if !quiet {
        let action = match mode {
            RunMode::Run => "Running",
            RunMode::CompileOnly => "Compiling",
        };
        eprintln!("→ {} {} ({})", action, file.display(), language.display_name());
    }

    let session = ctx.session();
    let handle = session.start(request)?;
    let cancel = handle.cancel_token();
    let wait = handle.wait();
    tokio::pin!(wait);

    let result = tokio::select! {
        result = &mut wait => result?,
        _ = signal::ctrl_c() => {
            eprintln!("⏹ Cancelling...");
            cancel.cancel();
            wait.await?
        }
    };
    Ok(result)
}

fn print_result(result: &ExecutionResult) {
    if !result.output.is_empty() {
        print!("{}", result.output);
        if !result.output.ends_with('\n') {
            println!();
        }
    }
    for note in &result.notes {
        eprintln!("ℹ {}", note);
    }
    eprintln!(
        "{} {} ({}ms)",
        status_glyph(result.status),
        result.status.label(),
        result.elapsed_ms
    );
}

fn status_glyph(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Success => "✓",
        ExecutionStatus::CompileError => "✗",
        ExecutionStatus::RuntimeError => "✗",
        ExecutionStatus::Timeout => "⏱",
        ExecutionStatus::Cancelled => "⏹",
        ExecutionStatus::ToolMissing => "⚠",
        ExecutionStatus::ConfigurationError => "⚠",
        ExecutionStatus::IoError => "⚠",
        ExecutionStatus::Rejected => "⚠",
    }
}

/// Process exit code per status; only `Success` maps to 0
fn exit_code(status: ExecutionStatus) -> u8 {
    match status {
        ExecutionStatus::Success => 0,
        ExecutionStatus::RuntimeError => 1,
        ExecutionStatus::CompileError => 2,
        ExecutionStatus::Timeout => 3,
        ExecutionStatus::ToolMissing => 4,
        ExecutionStatus::ConfigurationError => 5,
        ExecutionStatus::IoError => 6,
        ExecutionStatus::Rejected => 7,
        ExecutionStatus::Cancelled => 130,
    }
}

/// Probe every configured toolchain and print the result
pub async fn probe(settings: Settings, json: bool) -> Result<()> {
    let ctx = AppContext::bootstrap(settings).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(ctx.dependencies.as_ref())
                .context("Failed to serialize dependency status")?
        );
        return Ok(());
    }

    println!("🔍 Toolchains");
    for (id, status) in &ctx.dependencies.tools {
        if status.available {
            println!(
                "  ✓ {:<8} {}",
                id,
                status.version.as_deref().unwrap_or("(no version reported)")
            );
        } else {
            println!("  ✗ {:<8} not available", id);
        }
    }

    println!();
    println!("📋 Languages");
    for language in ctx.config.list_languages() {
        let profile = ctx.config.get_profile(&language)?;
        let ready = ctx
            .dependencies
            .all_available(profile.required_tools.iter().map(String::as_str));
        println!(
            "  {} {:<11} {}",
            if ready { "✓" } else { "✗" },
            language.display_name(),
            if ready { "ready" } else { "missing toolchain" }
        );
    }

    let warnings = ctx.dependencies.warnings();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("⚠ {}", warning);
        }
    }

    Ok(())
}

/// Print configured languages with their commands
pub fn list_languages(settings: &Settings) -> Result<()> {
    let manager = LanguageConfigManager::load_or_builtin(&settings.languages_config)?;

    for language in manager.list_languages() {
        let profile = manager.get_profile(&language)?;
        println!("{} (.{})", language.display_name(), profile.extension);
        match &profile.pipeline {
            Pipeline::Compiled { compile, run } => {
                println!("  compile: {} {}", compile.program, compile.args.join(" "));
                println!("  run:     {} {}", run.program, run.args.join(" "));
            }
            Pipeline::Interpreted { run } => {
                println!("  run:     {} {}", run.program, run.args.join(" "));
            }
        }
    }

    Ok(())
}

/// Write the built-in profiles so they can be customised
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    LanguageConfigManager::builtin().save(path)?;
    println!("✅ Wrote default language profiles to {}", path.display());
    println!("   Edit it, then point UMLC_LANGUAGES_CONFIG or --config at it");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_language() {
        assert_eq!(
            resolve_language(Path::new("hello.cpp"), None).unwrap(),
            Language::Cpp
        );
        assert_eq!(
            resolve_language(Path::new("script.txt"), Some("js")).unwrap(),
            Language::JavaScript
        );
        assert!(resolve_language(Path::new("notes.txt"), None).is_err());
        assert!(resolve_language(Path::new("main.py"), Some("cobol")).is_err());
    }

    #[test]
    fn test_exit_codes_only_zero_on_success() {
        let statuses = [
            ExecutionStatus::CompileError,
            ExecutionStatus::RuntimeError,
            ExecutionStatus::Timeout,
            ExecutionStatus::Cancelled,
            ExecutionStatus::ToolMissing,
            ExecutionStatus::ConfigurationError,
            ExecutionStatus::IoError,
            ExecutionStatus::Rejected,
        ];
        assert_eq!(exit_code(ExecutionStatus::Success), 0);
        for status in statuses {
            assert_ne!(exit_code(status), 0, "{}", status);
        }
    }

    #[test]
    fn test_read_stdin_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, "42\n").unwrap();

        assert_eq!(read_stdin_source(None, Some(&path)).unwrap(), Some("42\n".to_string()));
        assert_eq!(
            read_stdin_source(Some("x".to_string()), None).unwrap(),
            Some("x".to_string())
        );
        assert_eq!(read_stdin_source(None, None).unwrap(), None);
        assert!(read_stdin_source(None, Some(&PathBuf::from("/no/such/input"))).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_language_is_a_result_in_text_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("partial.json");
        fs::write(
            &config,
            r#"{
                "tools": [{ "id": "node", "program": "node" }],
                "languages": [{
                    "language": "javascript",
                    "extension": "js",
                    "pipeline": { "kind": "interpreted", "run": { "program": "node", "args": ["{file}"] } },
                    "required_tools": ["node"]
                }]
            }"#,
        )
        .unwrap();
        let source = dir.path().join("h.py");
        fs::write(&source, "print('hi')\n").unwrap();
        let settings = Settings {
            languages_config: config,
            temp_root: Some(dir.path().join("runs")),
            ..Settings::default()
        };

        for quiet in [false, true] {
            let result = execute_file(settings.clone(), &source, None, None, None, RunMode::Run, quiet)
                .await
                .unwrap();
            assert_eq!(result.status, ExecutionStatus::ConfigurationError);
            assert_eq!(exit_code(result.status), 5);
            assert!(result.output.contains("python"), "{}", result.output);
        }
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/languages.json");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
        assert!(LanguageConfigManager::load(&path).is_ok());
    }
}
