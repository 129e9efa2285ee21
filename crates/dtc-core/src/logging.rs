//! Logging initialization using the `tracing` ecosystem.
//!
//! Replaces the C++-style file logger with:
//! - Console output (colored, human-readable)
//! - File output (daily rotation via `tracing-appender`)
//! - A profile selector mapping the server's three verbosity tiers onto
//!   `EnvFilter` levels; `RUST_LOG` overrides the profile when set.

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Verbosity profile selected via `--log-profile`.
///
/// `Std` keeps only errors, `Advanced` is the operational default, and
/// `Verbose` turns on per-frame tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogProfile {
    Std,
    #[default]
    Advanced,
    Verbose,
}

impl LogProfile {
    /// The default `EnvFilter` directive for this profile.
    pub fn filter(self) -> &'static str {
        match self {
            Self::Std => "error",
            Self::Advanced => "info",
            Self::Verbose => "trace",
        }
    }
}

impl FromStr for LogProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "std" => Ok(Self::Std),
            "advanced" => Ok(Self::Advanced),
            "verbose" => Ok(Self::Verbose),
            other => Err(format!("unknown log profile: {other}")),
        }
    }
}

impl std::fmt::Display for LogProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Std => write!(f, "std"),
            Self::Advanced => write!(f, "advanced"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. After this, all `tracing::info!()`
/// etc. macros will produce output.
///
/// # Parameters
///
/// - `profile`: default level if `RUST_LOG` env var is not set
/// - `log_dir`: optional directory for daily-rotating log files
/// - `file_prefix`: log file prefix (e.g. `"dtc_server"`)
pub fn init_logging(profile: LogProfile, log_dir: Option<&str>, file_prefix: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(profile.filter()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true);

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, file_prefix);
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parsing() {
        assert_eq!("std".parse::<LogProfile>().unwrap(), LogProfile::Std);
        assert_eq!("ADVANCED".parse::<LogProfile>().unwrap(), LogProfile::Advanced);
        assert_eq!("verbose".parse::<LogProfile>().unwrap(), LogProfile::Verbose);
        assert!("chatty".parse::<LogProfile>().is_err());
    }

    #[test]
    fn profile_filter_levels() {
        assert_eq!(LogProfile::Std.filter(), "error");
        assert_eq!(LogProfile::Advanced.filter(), "info");
        assert_eq!(LogProfile::Verbose.filter(), "trace");
    }
}
