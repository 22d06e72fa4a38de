// Language profile management for the UMLC engine
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use umlc_common::types::Language;

use crate::error::{ExecResult, ExecutionError};

/// A program plus arguments with `{placeholder}` slots.
///
/// Recognised placeholders: `{file}`, `{dir}`, `{output}`, `{class_name}`,
/// `{stem}`. Substitution is per argument; nothing goes through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Values substituted into a [`CommandTemplate`] for one run.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub file: PathBuf,
    pub dir: PathBuf,
    pub output: PathBuf,
    pub class_name: String,
    pub stem: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, ctx: &TemplateContext) -> RenderedCommand {
        RenderedCommand {
            program: substitute(&self.program, ctx),
            args: self.args.iter().map(|arg| substitute(arg, ctx)).collect(),
        }
    }
}

fn substitute(part: &str, ctx: &TemplateContext) -> String {
    if !part.contains('{') {
        return part.to_string();
    }
    part.replace("{file}", &ctx.file.to_string_lossy())
        .replace("{dir}", &ctx.dir.to_string_lossy())
        .replace("{output}", &ctx.output.to_string_lossy())
        .replace("{class_name}", &ctx.class_name)
        .replace("{stem}", &ctx.stem)
}

/// How a language turns source into a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pipeline {
    /// Two phases: the compile step must succeed before run is spawned.
    Compiled {
        compile: CommandTemplate,
        run: CommandTemplate,
    },
    /// The interpreter reads the source file directly.
    Interpreted { run: CommandTemplate },
}

impl Pipeline {
    pub fn compile_step(&self) -> Option<&CommandTemplate> {
        match self {
            Pipeline::Compiled { compile, .. } => Some(compile),
            Pipeline::Interpreted { .. } => None,
        }
    }

    pub fn run_step(&self) -> &CommandTemplate {
        match self {
            Pipeline::Compiled { run, .. } | Pipeline::Interpreted { run } => run,
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, Pipeline::Compiled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub language: Language,
    /// Extension without the leading dot
    pub extension: String,
    pub pipeline: Pipeline,
    /// Tool ids the prober checks for this language
    pub required_tools: Vec<String>,
}

/// An external program checked by the dependency prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub program: String,
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

impl ToolSpec {
    fn new(id: &str, program: &str, version_flag: &str) -> Self {
        Self {
            id: id.to_string(),
            program: program.to_string(),
            version_args: vec![version_flag.to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    tools: Vec<ToolSpec>,
    languages: Vec<LanguageProfile>,
}

fn python_program() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Registry of language profiles and the tools they need.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    profiles: HashMap<Language, LanguageProfile>,
    tools: BTreeMap<String, ToolSpec>,
}

impl LanguageConfigManager {
    /// The profiles shipped with the binary.
    pub fn builtin() -> Self {
        let python = python_program();
        let tools = vec![
            ToolSpec::new("gcc", "gcc", "--version"),
            ToolSpec::new("g++", "g++", "--version"),
            ToolSpec::new("javac", "javac", "-version"),
            ToolSpec::new("java", "java", "-version"),
            ToolSpec::new("node", "node", "--version"),
            ToolSpec::new(python, python, "--version"),
        ];

        let profiles = vec![
            LanguageProfile {
                language: Language::Python,
                extension: "py".to_string(),
                pipeline: Pipeline::Interpreted {
                    // -u: unbuffered so partial output survives a timeout kill
                    run: CommandTemplate::new(python, &["-u", "{file}"]),
                },
                required_tools: vec![python.to_string()],
            },
            LanguageProfile {
                language: Language::C,
                extension: "c".to_string(),
                pipeline: Pipeline::Compiled {
                    compile: CommandTemplate::new("gcc", &["{file}", "-o", "{output}"]),
                    run: CommandTemplate::new("{output}", &[]),
                },
                required_tools: vec!["gcc".to_string()],
            },
            LanguageProfile {
                language: Language::Cpp,
                extension: "cpp".to_string(),
                pipeline: Pipeline::Compiled {
                    compile: CommandTemplate::new("g++", &["{file}", "-o", "{output}"]),
                    run: CommandTemplate::new("{output}", &[]),
                },
                required_tools: vec!["g++".to_string()],
            },
            LanguageProfile {
                language: Language::Java,
                extension: "java".to_string(),
                pipeline: Pipeline::Compiled {
                    compile: CommandTemplate::new("javac", &["-encoding", "UTF-8", "{file}"]),
                    run: CommandTemplate::new("java", &["-cp", "{dir}", "{class_name}"]),
                },
                required_tools: vec!["javac".to_string(), "java".to_string()],
            },
            LanguageProfile {
                language: Language::JavaScript,
                extension: "js".to_string(),
                pipeline: Pipeline::Interpreted {
                    run: CommandTemplate::new("node", &["{file}"]),
                },
                required_tools: vec!["node".to_string()],
            },
        ];

        Self {
            profiles: profiles.into_iter().map(|p| (p.language, p)).collect(),
            tools: tools.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Load language profiles from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json_str(&content)
            .with_context(|| format!("Invalid language config {}", config_path.display()))
    }

    /// Load from `config_path` if it exists, otherwise use the built-in profiles
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let manager = Self::load(config_path)?;
            tracing::info!(path = %config_path.display(), "Loaded language profiles from file");
            Ok(manager)
        } else {
            tracing::debug!(path = %config_path.display(), "No language config file, using built-in profiles");
            Ok(Self::builtin())
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages.json")?;

        let mut tools = BTreeMap::new();
        for tool in languages_json.tools {
            if tool.program.trim().is_empty() {
                bail!("Tool '{}' has an empty program", tool.id);
            }
            if tools.insert(tool.id.clone(), tool).is_some() {
                bail!("Duplicate tool id in languages.json");
            }
        }

        let mut profiles = HashMap::new();
        for profile in languages_json.languages {
            validate_profile(&profile, &tools)?;
            let language = profile.language;
            if profiles.insert(language, profile).is_some() {
                bail!("Language '{}' is configured more than once", language);
            }
        }

        if profiles.is_empty() {
            bail!("No languages configured in languages.json");
        }

        Ok(Self { profiles, tools })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let languages_json = LanguagesJson {
            tools: self.tools.values().cloned().collect(),
            languages: self
                .list_languages()
                .into_iter()
                .filter_map(|lang| self.profiles.get(&lang).cloned())
                .collect(),
        };
        serde_json::to_string_pretty(&languages_json).context("Failed to serialize languages.json")
    }

    /// Write the current profiles to `config_path`, creating parent directories
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        fs::write(config_path, self.to_json_pretty()?)
            .with_context(|| format!("Failed to write {}", config_path.display()))
    }

    /// Get the profile for a language
    pub fn get_profile(&self, language: &Language) -> ExecResult<&LanguageProfile> {
        self.profiles
            .get(language)
            .ok_or(ExecutionError::Configuration(*language))
    }

    /// Replace (or add) a profile. Its tools must already be declared.
    pub fn insert_profile(&mut self, profile: LanguageProfile) -> Result<()> {
        validate_profile(&profile, &self.tools)?;
        self.profiles.insert(profile.language, profile);
        Ok(())
    }

    pub fn insert_tool(&mut self, tool: ToolSpec) {
        self.tools.insert(tool.id.clone(), tool);
    }

    pub fn remove_profile(&mut self, language: &Language) -> Option<LanguageProfile> {
        self.profiles.remove(language)
    }

    /// List configured languages in a stable order
    pub fn list_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.profiles.keys().copied().collect();
        languages.sort();
        languages
    }

    pub fn tool(&self, id: &str) -> Option<&ToolSpec> {
        self.tools.get(id)
    }

    /// Distinct tools referenced by at least one profile
    pub fn required_tools(&self) -> Vec<&ToolSpec> {
        let mut ids: Vec<&str> = self
            .profiles
            .values()
            .flat_map(|p| p.required_tools.iter().map(String::as_str))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().filter_map(|id| self.tools.get(id)).collect()
    }
}

fn validate_profile(profile: &LanguageProfile, tools: &BTreeMap<String, ToolSpec>) -> Result<()> {
    if profile.extension.trim().is_empty() || profile.extension.starts_with('.') {
        bail!(
            "Language '{}' needs an extension without a leading dot",
            profile.language
        );
    }
    if profile.pipeline.run_step().program.trim().is_empty() {
        bail!("Language '{}' has an empty run command", profile.language);
    }
    if let Some(compile) = profile.pipeline.compile_step() {
        if compile.program.trim().is_empty() {
            bail!("Language '{}' has an empty compile command", profile.language);
        }
    }
    for tool in &profile.required_tools {
        if !tools.contains_key(tool) {
            bail!(
                "Language '{}' requires undeclared tool '{}'",
                profile.language,
                tool
            );
        }
    }
    Ok(())
}
