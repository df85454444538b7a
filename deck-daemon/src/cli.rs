//! Command line and config file discovery

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable overriding the config location
pub const CONFIG_ENV: &str = "CYBERDECK_CONFIG";

/// Errors from argument parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("more than one config path given")]
    ExtraPath,
}

/// Parsed command line
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Run against simulated hardware
    pub simulate: bool,
    /// Print usage and exit
    pub help: bool,
}

pub const USAGE: &str = "\
Usage: cyberdeck [--simulate] [CONFIG]

Drives the OLED animation and the screen-tilt servo behind one I2C multiplexer.

Options:
  --simulate   Run against simulated devices; type cw, ccw, click, double,
               long or quit on stdin to drive the encoder
  -h, --help   Show this message

CONFIG defaults to $CYBERDECK_CONFIG, then $XDG_CONFIG_HOME/cyberdeck/config.json.";

impl Args {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Args::default();
        for arg in args {
            let arg = arg.into();
            match arg.as_str() {
                "--simulate" => parsed.simulate = true,
                "-h" | "--help" => parsed.help = true,
                s if s.starts_with('-') => return Err(ArgsError::UnknownOption(arg)),
                _ => {
                    if parsed.config.is_some() {
                        return Err(ArgsError::ExtraPath);
                    }
                    parsed.config = Some(PathBuf::from(arg));
                }
            }
        }
        Ok(parsed)
    }
}

/// Pick the config file: explicit path, then the environment, then the user
/// config directory
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_override: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }
    config_dir
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("cyberdeck")
        .join("config.json")
}

/// [`resolve_config_path`] against the real environment
pub fn config_path(args: &Args) -> PathBuf {
    resolve_config_path(
        args.config.as_deref(),
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        dirs::config_dir(),
    )
}
