//! Compiler configuration
//!
//! Settings that drive the external C toolchain. The effective
//! configuration is built in three layers: library defaults, an optional
//! `ember.toml` project file (`[build]` table), then command-line flags.
//!
//! # Example
//!
//! ```toml
//! # ember.toml
//! [build]
//! cc = "clang"
//! cflags = ["-O2", "-Wall"]
//! libraries = ["curl"]
//! keep-c = true
//! ```

use serde::Deserialize;
use std::path::Path;

/// Effective settings handed to the library entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// C compiler executable driven by `build`.
    pub cc: String,
    /// Extra flags appended to the C compiler command line.
    pub cflags: Vec<String>,
    /// Extra libraries linked with `-l` (the math library is always
    /// linked).
    pub libraries: Vec<String>,
    /// Keep the intermediate `.c` file next to the output.
    pub keep_c: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            cc: "cc".to_string(),
            cflags: Vec::new(),
            libraries: Vec::new(),
            keep_c: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Set the C compiler executable (builder pattern).
    pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = cc.into();
        self
    }

    /// Add a flag for the C compiler.
    pub fn with_cflag(mut self, flag: impl Into<String>) -> Self {
        self.cflags.push(flag.into());
        self
    }

    /// Add a library to link.
    pub fn with_library(mut self, lib: impl Into<String>) -> Self {
        self.libraries.push(lib.into());
        self
    }

    /// Keep the intermediate C file.
    pub fn with_keep_c(mut self, keep: bool) -> Self {
        self.keep_c = keep;
        self
    }

    /// Layer a project file's `[build]` table over this configuration.
    /// Scalar fields replace, list fields extend.
    pub fn merge_project(&mut self, project: ProjectConfig) {
        let build = project.build;
        if let Some(cc) = build.cc {
            self.cc = cc;
        }
        self.cflags.extend(build.cflags);
        self.libraries.extend(build.libraries);
        if let Some(keep_c) = build.keep_c {
            self.keep_c = keep_c;
        }
    }
}

/// The `[build]` table of `ember.toml`. Every field is optional; absent
/// fields keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    pub cc: Option<String>,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    pub keep_c: Option<bool>,
}

/// A parsed `ember.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub build: BuildConfig,
}

impl ProjectConfig {
    /// Parse project configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("failed to parse project config: {}", e))
    }

    /// Load project configuration from a file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.cc, "cc");
        assert!(config.cflags.is_empty());
        assert!(!config.keep_c);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_cc("clang")
            .with_cflag("-O2")
            .with_library("curl")
            .with_keep_c(true);
        assert_eq!(config.cc, "clang");
        assert_eq!(config.cflags, vec!["-O2"]);
        assert_eq!(config.libraries, vec!["curl"]);
        assert!(config.keep_c);
    }

    #[test]
    fn test_project_file_parsing() {
        let project = ProjectConfig::from_toml(
            "[build]\ncc = \"clang\"\ncflags = [\"-O1\"]\nkeep-c = true\n",
        )
        .unwrap();
        assert_eq!(project.build.cc.as_deref(), Some("clang"));
        assert_eq!(project.build.cflags, vec!["-O1"]);
        assert_eq!(project.build.keep_c, Some(true));
    }

    #[test]
    fn test_empty_project_file() {
        let project = ProjectConfig::from_toml("").unwrap();
        assert!(project.build.cc.is_none());
        assert!(project.build.cflags.is_empty());
    }

    #[test]
    fn test_merge_replaces_scalars_and_extends_lists() {
        let mut config = CompilerConfig::new().with_cflag("-g");
        let project = ProjectConfig::from_toml(
            "[build]\ncc = \"clang\"\ncflags = [\"-O2\"]\nlibraries = [\"m2\"]\n",
        )
        .unwrap();
        config.merge_project(project);
        assert_eq!(config.cc, "clang");
        assert_eq!(config.cflags, vec!["-g", "-O2"]);
        assert_eq!(config.libraries, vec!["m2"]);
        // keep-c untouched when absent
        assert!(!config.keep_c);
    }

    #[test]
    fn test_invalid_toml_reports_error() {
        let result = ProjectConfig::from_toml("[build\ncc = ");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("failed to parse"));
    }
}
