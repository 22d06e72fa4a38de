use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use umlc_common::types::Language;

use crate::config::{LanguageProfile, TemplateContext};

const DEFAULT_JAVA_CLASS: &str = "Main";

/// Scratch directory owning every file produced by one run.
///
/// Dropping it removes the directory; [`close`](Self::close) does the same
/// but reports failures.
pub struct RunWorkspace {
    dir: TempDir,
    source_path: PathBuf,
    class_name: String,
}

impl RunWorkspace {
    /// Create a unique directory under `temp_root` (system temp if `None`).
    pub fn create(temp_root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("umlc-");
        let dir = match temp_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self {
            source_path: dir.path().join("main"),
            class_name: DEFAULT_JAVA_CLASS.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Write `source` verbatim under the file name the language needs.
    pub fn write_source(&mut self, profile: &LanguageProfile, source: &str) -> io::Result<&Path> {
        let stem = if profile.language == Language::Java {
            self.class_name = java_class_name(source);
            self.class_name.clone()
        } else {
            "main".to_string()
        };
        self.source_path = self.dir.path().join(format!("{}.{}", stem, profile.extension));
        fs::write(&self.source_path, source)?;
        debug!(path = %self.source_path.display(), bytes = source.len(), "Wrote source file");
        Ok(&self.source_path)
    }

    pub fn template_context(&self) -> TemplateContext {
        let stem = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        TemplateContext {
            file: self.source_path.clone(),
            dir: self.dir.path().to_path_buf(),
            output: self.dir.path().join(executable_name()),
            class_name: self.class_name.clone(),
            stem,
        }
    }

    /// Remove the directory and everything in it.
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "Removed run directory");
        Ok(())
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "main.exe"
    } else {
        "main"
    }
}

/// Modifiers that may sit between `public` and `class`.
const CLASS_MODIFIERS: &[&str] = &[
    "public",
    "final",
    "abstract",
    "static",
    "strictfp",
    "sealed",
    "non-sealed",
];

/// Entry class for a Java source: first public class (any modifier order),
/// else first class, else `Main`.
pub fn java_class_name(source: &str) -> String {
    let mut first_class = None;
    for line in source.lines() {
        let line = line.trim_start();
        if line.starts_with("//") || line.starts_with('*') || line.starts_with("/*") {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        for (idx, word) in words.iter().enumerate() {
            if *word != "class" {
                continue;
            }
            let Some(name) = words.get(idx + 1).map(|next| ident_prefix(next)) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let is_public = words[..idx]
                .iter()
                .rev()
                .take_while(|w| CLASS_MODIFIERS.contains(*w))
                .any(|w| *w == "public");
            if is_public {
                return name;
            }
            first_class.get_or_insert(name);
        }
    }
    first_class.unwrap_or_else(|| DEFAULT_JAVA_CLASS.to_string())
}

fn ident_prefix(word: &str) -> String {
    word.chars().take_while(|c| is_ident_char(*c)).collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageConfigManager;

    #[test]
    fn test_java_class_detection() {
        assert_eq!(java_class_name("public class Hello {}"), "Hello");
        assert_eq!(
            java_class_name("class Helper {}\npublic class App { }"),
            "App"
        );
        assert_eq!(java_class_name("final class Solo {}"), "Solo");
        assert_eq!(java_class_name("// class Commented\nclass Real {}"), "Real");
        assert_eq!(java_class_name("int subclass = 1;"), "Main");
        assert_eq!(java_class_name(""), "Main");
    }

    #[test]
    fn test_java_public_class_with_modifiers() {
        let source = "class Helper {\n}\npublic final class Hello {\n}\n";
        assert_eq!(java_class_name(source), "Hello");
        assert_eq!(
            java_class_name("class A {}\npublic abstract class Shape {}"),
            "Shape"
        );
        assert_eq!(
            java_class_name("class A {}\nfinal public class Reordered {}"),
            "Reordered"
        );
        assert_eq!(
            java_class_name("class A {}\npublic sealed class Expr permits Lit {}"),
            "Expr"
        );
        assert_eq!(java_class_name("class A {}\nfinal class B {}"), "A");
        assert_eq!(java_class_name("Object k = Hello.class;\nclass Real {}"), "Real");
    }

    #[test]
    fn test_file_names() {
        let manager = LanguageConfigManager::builtin();
        let root = tempfile::tempdir().unwrap();

        let mut ws = RunWorkspace::create(Some(root.path())).unwrap();
        ws.write_source(manager.get_profile(&Language::Java).unwrap(), "public class Greeter {}")
            .unwrap();
        assert!(ws.source_path().ends_with("Greeter.java"));
        let ctx = ws.template_context();
        assert_eq!(ctx.class_name, "Greeter");
        assert_eq!(ctx.stem, "Greeter");
        assert_eq!(ctx.dir, ws.path());

        let mut ws = RunWorkspace::create(Some(root.path())).unwrap();
        let path = ws
            .write_source(manager.get_profile(&Language::Python).unwrap(), "print(1)\n")
            .unwrap()
            .to_path_buf();
        assert!(path.ends_with("main.py"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print(1)\n");
    }

    #[test]
    fn test_close_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let ws = RunWorkspace::create(Some(root.path())).unwrap();
        fs::write(ws.path().join("artifact.class"), b"\xca\xfe").unwrap();
        let path = ws.path().to_path_buf();

        ws.close().unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unique_directories() {
        let a = RunWorkspace::create(None).unwrap();
        let b = RunWorkspace::create(None).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
