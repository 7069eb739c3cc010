//! Language registry: maps a language tag to an interpreter invocation.
//!
//! Lookup is a pure function of the tag and the target platform. Tags are
//! case-insensitive; per-platform overrides are applied after the tag is
//! found, so `python` resolves to `python3 -c` on Unix and `python -c` on
//! Windows.

use std::collections::{BTreeMap, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{is_valid_tag, LanguageConfig, LanguageOverride, PlatformOverrides};
use crate::{Error, Platform, Result};

/// Interpreter command plus the arguments that precede the code.
///
/// The code itself is always passed as one final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Invocation {
    /// Interpreter binary
    pub command: String,
    /// Arguments placed before the code (e.g. `-c`, `-e`)
    pub arg_prefix: Vec<String>,
}

impl Invocation {
    /// Create an invocation.
    pub fn new<I, S>(command: impl Into<String>, arg_prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            arg_prefix: arg_prefix.into_iter().map(Into::into).collect(),
        }
    }
}

struct BuiltinLanguage {
    tags: &'static [&'static str],
    command: &'static str,
    args: &'static [&'static str],
    windows: Option<(&'static str, &'static [&'static str])>,
}

const BUILTINS: &[BuiltinLanguage] = &[
    BuiltinLanguage {
        tags: &["python", "py", "python3"],
        command: "python3",
        args: &["-c"],
        windows: Some(("python", &["-c"])),
    },
    BuiltinLanguage {
        tags: &["javascript", "js", "node"],
        command: "node",
        args: &["-e"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["typescript", "ts"],
        command: "npx",
        args: &["tsx", "-e"],
        windows: Some(("npx.cmd", &["tsx", "-e"])),
    },
    BuiltinLanguage {
        tags: &["bash"],
        command: "bash",
        args: &["-c"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["sh", "shell"],
        command: "sh",
        args: &["-c"],
        windows: Some(("cmd", &["/C"])),
    },
    BuiltinLanguage {
        tags: &["zsh"],
        command: "zsh",
        args: &["-c"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["fish"],
        command: "fish",
        args: &["-c"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["powershell", "pwsh", "ps1"],
        command: "pwsh",
        args: &["-NoProfile", "-Command"],
        windows: Some(("powershell", &["-NoProfile", "-Command"])),
    },
    BuiltinLanguage {
        tags: &["ruby", "rb"],
        command: "ruby",
        args: &["-e"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["perl", "pl"],
        command: "perl",
        args: &["-e"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["php"],
        command: "php",
        args: &["-r"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["lua"],
        command: "lua",
        args: &["-e"],
        windows: None,
    },
    BuiltinLanguage {
        tags: &["r"],
        command: "Rscript",
        args: &["-e"],
        windows: None,
    },
];

#[derive(Debug, Clone)]
struct Entry {
    command: String,
    args: Vec<String>,
    overrides: PlatformOverrides,
}

/// Case-insensitive table of interpreters.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    entries: Vec<Entry>,
    tags: HashMap<String, usize>,
    platform: Platform,
}

impl LanguageRegistry {
    /// Registry with the built-in interpreters for the current platform.
    pub fn new() -> Self {
        Self::with_platform(Platform::detect())
    }

    /// Registry with the built-in interpreters for `platform`.
    pub fn with_platform(platform: Platform) -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(BUILTINS.len()),
            tags: HashMap::new(),
            platform,
        };

        for builtin in BUILTINS {
            let overrides = PlatformOverrides {
                windows: builtin.windows.map(|(command, args)| LanguageOverride {
                    command: command.to_string(),
                    args: Some(args.iter().map(|a| a.to_string()).collect()),
                }),
                ..PlatformOverrides::default()
            };
            registry.insert(
                builtin.tags.iter().copied(),
                Entry {
                    command: builtin.command.to_string(),
                    args: builtin.args.iter().map(|a| a.to_string()).collect(),
                    overrides,
                },
            );
        }

        registry
    }

    /// Built-ins extended (or shadowed) by user definitions.
    pub fn from_config(languages: &[LanguageConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for language in languages {
            registry.register(language)?;
        }
        Ok(registry)
    }

    /// Add a user-defined interpreter; its tags replace existing ones.
    pub fn register(&mut self, language: &LanguageConfig) -> Result<()> {
        language.validate()?;
        let tags = std::iter::once(language.tag.as_str())
            .chain(language.aliases.iter().map(String::as_str));
        self.insert(
            tags,
            Entry {
                command: language.command.clone(),
                args: language.args.clone(),
                overrides: language.overrides.clone(),
            },
        );
        Ok(())
    }

    fn insert<'a>(&mut self, tags: impl Iterator<Item = &'a str>, entry: Entry) {
        let index = self.entries.len();
        self.entries.push(entry);
        for tag in tags {
            self.tags.insert(normalize_tag(tag), index);
        }
    }

    /// Resolve a tag to the invocation for this registry's platform.
    pub fn resolve(&self, tag: &str) -> Result<Invocation> {
        let key = normalize_tag(tag);
        if !is_valid_tag(&key) {
            return Err(Error::UnsupportedLanguage(tag.to_string()));
        }

        let entry = self
            .tags
            .get(&key)
            .map(|&index| &self.entries[index])
            .ok_or_else(|| Error::UnsupportedLanguage(tag.to_string()))?;

        let invocation = match entry.overrides.for_platform(self.platform) {
            Some(over) => Invocation {
                command: over.command.clone(),
                arg_prefix: over.args.clone().unwrap_or_else(|| entry.args.clone()),
            },
            None => Invocation {
                command: entry.command.clone(),
                arg_prefix: entry.args.clone(),
            },
        };
        Ok(invocation)
    }

    /// Whether `tag` resolves.
    pub fn supports(&self, tag: &str) -> bool {
        self.tags.contains_key(&normalize_tag(tag))
    }

    /// All known tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// All known tags with their resolved invocation, sorted by tag.
    pub fn describe(&self) -> BTreeMap<String, Invocation> {
        self.tags
            .keys()
            .filter_map(|tag| self.resolve(tag).ok().map(|inv| (tag.clone(), inv)))
            .collect()
    }

    /// Platform overrides are resolved for.
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
