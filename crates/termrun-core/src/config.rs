//! Configuration types for termrun.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Platform};

lazy_static! {
    static ref LANGUAGE_TAG: Regex = Regex::new(r"^[a-z0-9][a-z0-9+#._-]*$").unwrap();
}

/// Check that a language tag is usable as a registry key.
pub(crate) fn is_valid_tag(tag: &str) -> bool {
    LANGUAGE_TAG.is_match(&tag.trim().to_lowercase())
}

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Execution settings
    pub execution: ExecutionSettings,
    /// Extra or replacement interpreter definitions
    pub languages: Vec<LanguageConfig>,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.max_sessions == 0 {
            return Err(Error::Config("server.max_sessions must be > 0".to_string()));
        }

        if self.execution.grace_period_ms == 0 {
            return Err(Error::Config(
                "execution.grace_period_ms must be > 0".to_string(),
            ));
        }

        for language in &self.languages {
            language.validate()?;
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_sessions: 32,
            log_level: "info".to_string(),
        }
    }
}

/// When to run interpreters inside a pseudo-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyPolicy {
    /// PTY for sessions with a rendering surface, on platforms that support it
    #[default]
    Auto,
    /// Always use plain pipes
    Never,
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Grace window between an interrupt request and the forceful kill
    pub grace_period_ms: u64,
    /// Working directory for interpreters (None = the user's home directory)
    pub working_directory: Option<PathBuf>,
    /// Pseudo-terminal policy
    pub pty: PtyPolicy,
    /// TERM environment variable value inside a PTY
    pub term: String,
    /// Write a synthetic `$ <command>` line into the session buffer before output
    pub echo_command: bool,
    /// How long to wait for output readers to drain after the process exits
    pub drain_timeout_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 3000,
            working_directory: None,
            pty: PtyPolicy::Auto,
            term: "xterm-256color".to_string(),
            echo_command: true,
            drain_timeout_ms: 500,
        }
    }
}

impl ExecutionSettings {
    /// Grace window as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Reader drain timeout as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// A user-defined interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Primary tag (case-insensitive)
    pub tag: String,
    /// Interpreter binary
    pub command: String,
    /// Arguments placed before the code (e.g. `-c`)
    #[serde(default)]
    pub args: Vec<String>,
    /// Additional tags resolving to the same interpreter
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Per-platform substitutes
    #[serde(default)]
    pub overrides: PlatformOverrides,
}

impl LanguageConfig {
    /// Validate the language definition.
    pub fn validate(&self) -> crate::Result<()> {
        for tag in std::iter::once(&self.tag).chain(self.aliases.iter()) {
            if !is_valid_tag(tag) {
                return Err(Error::Config(format!("invalid language tag '{tag}'")));
            }
        }

        if self.command.trim().is_empty() {
            return Err(Error::Config(format!(
                "language '{}' command cannot be empty",
                self.tag
            )));
        }

        if let Some(empty) = self
            .overrides
            .iter()
            .find(|o| o.command.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "language '{}' has an override with an empty command (args: {:?})",
                self.tag, empty.args
            )));
        }

        Ok(())
    }
}

/// Per-platform interpreter substitutes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformOverrides {
    /// Linux substitute
    pub linux: Option<LanguageOverride>,
    /// macOS substitute
    pub macos: Option<LanguageOverride>,
    /// Windows substitute
    pub windows: Option<LanguageOverride>,
    /// Substitute for other Unix systems
    pub unix: Option<LanguageOverride>,
}

impl PlatformOverrides {
    /// The override applying to `platform`, if any.
    pub fn for_platform(&self, platform: Platform) -> Option<&LanguageOverride> {
        match platform {
            Platform::Linux => self.linux.as_ref(),
            Platform::MacOS => self.macos.as_ref(),
            Platform::Windows => self.windows.as_ref(),
            Platform::OtherUnix => self.unix.as_ref(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &LanguageOverride> {
        [&self.linux, &self.macos, &self.windows, &self.unix]
            .into_iter()
            .flatten()
    }
}

/// Replacement interpreter for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageOverride {
    /// Interpreter binary
    pub command: String,
    /// Replacement arguments (None keeps the base arguments)
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.max_sessions, 32);
        assert_eq!(config.execution.grace_period(), Duration::from_secs(3));
        assert_eq!(config.execution.pty, PtyPolicy::Auto);
        assert!(config.execution.echo_command);
        assert!(config.languages.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_sessions() {
        let mut config = ServerConfig::default();
        config.server.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_grace_period() {
        let mut config = ServerConfig::default();
        config.execution.grace_period_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  max_sessions: 5
  log_level: debug

execution:
  grace_period_ms: 1500
  working_directory: /tmp
  pty: never
  term: xterm
  echo_command: false

languages:
  - tag: deno
    command: deno
    args: ["eval"]
    aliases: [denojs]
    overrides:
      windows:
        command: deno.exe
"#;

        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.max_sessions, 5);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.execution.grace_period_ms, 1500);
        assert_eq!(
            config.execution.working_directory,
            Some(PathBuf::from("/tmp"))
        );
        assert_eq!(config.execution.pty, PtyPolicy::Never);
        assert!(!config.execution.echo_command);
        assert_eq!(config.languages.len(), 1);
        let deno = &config.languages[0];
        assert_eq!(deno.args, vec!["eval"]);
        assert_eq!(
            deno.overrides
                .for_platform(Platform::Windows)
                .map(|o| o.command.as_str()),
            Some("deno.exe")
        );
        assert!(deno.overrides.for_platform(Platform::Linux).is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml("execution:\n  pty: auto\n").unwrap();
        assert_eq!(config.execution.grace_period_ms, 3000);
        assert_eq!(config.server.max_sessions, 32);
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ServerConfig::from_yaml("server: [unclosed");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_language_tag() {
        let language = LanguageConfig {
            tag: "two words".to_string(),
            command: "x".to_string(),
            args: vec![],
            aliases: vec![],
            overrides: PlatformOverrides::default(),
        };
        assert!(language.validate().is_err());
    }

    #[test]
    fn test_empty_language_command() {
        let language = LanguageConfig {
            tag: "deno".to_string(),
            command: "  ".to_string(),
            args: vec![],
            aliases: vec![],
            overrides: PlatformOverrides::default(),
        };
        assert!(language.validate().is_err());
    }

    #[test]
    fn test_empty_override_command() {
        let yaml = r#"
languages:
  - tag: deno
    command: deno
    overrides:
      macos:
        command: ""
"#;
        assert!(ServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_tag_validation_is_case_insensitive() {
        assert!(is_valid_tag("Python"));
        assert!(is_valid_tag("c++"));
        assert!(is_valid_tag("c#"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("-x"));
    }
}
