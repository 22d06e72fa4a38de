mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use umlc_common::config::{Settings, DEFAULT_LANGUAGES_CONFIG};
use umlc_common::types::RunMode;

#[derive(Parser)]
#[command(name = "umlc")]
#[command(about = "UMLC - Compile and run Python, C, C++, Java and JavaScript with local toolchains", long_about = None)]
struct Cli {
    /// Language profile file (overrides UMLC_LANGUAGES_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile (if needed) and run a source file
    Run {
        /// Source file; the language is detected from its extension
        file: PathBuf,

        /// Language tag (python, c, cpp, java, javascript)
        #[arg(short, long)]
        lang: Option<String>,

        /// Text passed to the program's stdin
        #[arg(short, long, conflicts_with = "stdin_file")]
        input: Option<String>,

        /// File whose contents are passed to the program's stdin
        #[arg(long)]
        stdin_file: Option<PathBuf>,

        /// Run timeout in milliseconds (defaults to UMLC_RUN_TIMEOUT_MS or 10000)
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,

        /// Also write the combined output to this file
        #[arg(long)]
        save_output: Option<PathBuf>,
    },

    /// Compile a source file without running it
    Compile {
        file: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check which toolchains are installed
    Probe {
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List configured languages and their commands
    Languages,

    /// Write the built-in language profiles to a file for editing
    Init {
        #[arg(short, long, default_value = DEFAULT_LANGUAGES_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout carries program output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(config) = cli.config {
        settings.languages_config = config;
    }

    match cli.command {
        Commands::Run {
            file,
            lang,
            input,
            stdin_file,
            timeout_ms,
            json,
            save_output,
        } => {
            let stdin = commands::read_stdin_source(input, stdin_file.as_deref())?;
            commands::run_file(
                settings,
                &file,
                lang.as_deref(),
                stdin,
                timeout_ms,
                RunMode::Run,
                json,
                save_output.as_deref(),
            )
            .await
        }
        Commands::Compile { file, lang, json } => {
            commands::run_file(
                settings,
                &file,
                lang.as_deref(),
                None,
                None,
                RunMode::CompileOnly,
                json,
                None,
            )
            .await
        }
        Commands::Probe { json } => {
            commands::probe(settings, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Languages => {
            commands::list_languages(&settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { path, force } => {
            commands::init_config(&path, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_input_conflicts_with_stdin_file() {
        let parsed = Cli::try_parse_from([
            "umlc", "run", "main.py", "--input", "x", "--stdin-file", "in.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["umlc", "languages", "--config", "custom.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.json")));
    }
}
