//! Platform detection for per-platform interpreter selection.
//!
//! Interpreter binaries differ between operating systems (`python3` vs
//! `python`, `pwsh` vs `powershell`); the language registry applies
//! overrides keyed by the platform detected here.

use serde::{Deserialize, Serialize};

/// Platforms with distinct interpreter conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux (including WSL, which runs Linux binaries)
    Linux,
    /// macOS
    MacOS,
    /// Windows
    Windows,
    /// Any other Unix-like system
    OtherUnix,
}

impl Platform {
    /// Detect the platform this binary was built for.
    ///
    /// ```
    /// use termrun_core::Platform;
    ///
    /// let platform = Platform::detect();
    /// println!("Running on: {platform}");
    /// ```
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::OtherUnix
        }
    }

    /// Get the platform name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOS => "macOS",
            Platform::Windows => "Windows",
            Platform::OtherUnix => "Unix",
        }
    }

    /// Key used for overrides in the `languages` configuration section.
    pub fn config_key(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOS => "macos",
            Platform::Windows => "windows",
            Platform::OtherUnix => "unix",
        }
    }

    /// Check if this is a Unix-like platform.
    ///
    /// Unix platforms get pseudo-terminal wrapping for attached sessions.
    pub fn is_unix(&self) -> bool {
        !matches!(self, Platform::Windows)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
