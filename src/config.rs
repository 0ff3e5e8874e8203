//! Configuration management for the policy language server.
//!
//! Handles:
//! - Command-line argument parsing
//! - User-level configuration file
//! - Settings pushed by the connected editor

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::policy::EngineSettings;

/// Executable the server invokes when none is configured.
pub const DEFAULT_ENGINE_PROGRAM: &str = "gatekeeper";

/// Seconds to wait for an engine run before killing it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments for the policy language server
#[derive(Debug, Parser)]
#[command(name = "policy-language-server")]
#[command(about = "Language server for policy checks on infrastructure-as-code files")]
#[command(version)]
pub struct Args {
    /// Policy engine executable to invoke
    #[arg(long, help = "Policy engine executable (name or path)")]
    pub engine: Option<String>,

    /// Arguments passed to the policy engine on every run
    #[arg(long, help = "Extra arguments for the policy engine")]
    pub engine_args: Option<String>,

    /// Bounded wait for one engine run
    #[arg(long, help = "Seconds to wait for the policy engine before giving up")]
    pub timeout: Option<u64>,

    /// Log level for the language server
    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,
}

/// User-level configuration file, `policy-ls/config.toml` under the
/// platform config directory.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    engine: Option<String>,
    arguments: Option<String>,
    timeout_secs: Option<u64>,
}

/// Settings section the editor pushes via `workspace/didChangeConfiguration`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    pub program: Option<String>,
    pub arguments: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine executable name or path
    pub engine_program: String,
    /// Raw argument string handed to the engine, opaque to the server
    pub engine_arguments: String,
    /// Bounded wait for one engine run
    pub timeout: Duration,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        let file = Self::user_config_path()
            .map(Self::load_file)
            .unwrap_or_default();

        Ok(Config {
            engine_program: args
                .engine
                .or(file.engine)
                .unwrap_or_else(|| DEFAULT_ENGINE_PROGRAM.to_string()),
            engine_arguments: args.engine_args.or(file.arguments).unwrap_or_default(),
            timeout: Duration::from_secs(
                args.timeout
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            log_level: args.log_level,
        })
    }

    /// Fold editor-pushed settings into the current configuration
    pub fn apply_client_settings(&mut self, settings: &ClientSettings) {
        if let Some(program) = &settings.program {
            self.engine_program = program.clone();
        }
        if let Some(arguments) = &settings.arguments {
            self.engine_arguments = arguments.clone();
        }
        if let Some(secs) = settings.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
    }

    /// Engine identity and wait bound, as consumed by the validation service
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            program: self.engine_program.clone(),
            timeout: self.timeout,
        }
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("policy-ls").join("config.toml"))
    }

    fn load_file(path: PathBuf) -> ConfigFile {
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                log::warn!("ignoring malformed config file {}: {}", path.display(), e);
                ConfigFile::default()
            }),
            Err(_) => ConfigFile::default(),
        }
    }
}
