//! Tracing subscriber setup for the command-line tool.
//!
//! Output goes to one of: nowhere, stdout, stderr, or an appended file.
//! `RUST_LOG` overrides the level chosen on the command line.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    Off,
    Stdout,
    #[default]
    Stderr,
    /// Append to a file, without ANSI colours
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("log target must not be empty".to_string()),
            "0" | "off" => Ok(LogTarget::Off),
            "1" | "stdout" => Ok(LogTarget::Stdout),
            "2" | "stderr" => Ok(LogTarget::Stderr),
            filename => Ok(LogTarget::File(PathBuf::from(filename))),
        }
    }
}

impl std::fmt::Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTarget::Off => write!(f, "off"),
            LogTarget::Stdout => write!(f, "stdout"),
            LogTarget::Stderr => write!(f, "stderr"),
            LogTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber for `target`.
pub fn init_logging(target: &LogTarget, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    match target {
        LogTarget::Off => {}
        LogTarget::Stdout => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter_for(level))
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogTarget::Stderr => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter_for(level))
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter_for(level))
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_target() {
        assert_eq!("0".parse::<LogTarget>().unwrap(), LogTarget::Off);
        assert_eq!("stdout".parse::<LogTarget>().unwrap(), LogTarget::Stdout);
        assert_eq!("2".parse::<LogTarget>().unwrap(), LogTarget::Stderr);
        assert_eq!(
            "build.log".parse::<LogTarget>().unwrap(),
            LogTarget::File(PathBuf::from("build.log"))
        );
        assert!("  ".parse::<LogTarget>().is_err());
    }
}
