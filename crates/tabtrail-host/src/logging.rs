//! Logging setup for the native host.
//!
//! Stdout carries native-messaging frames, so every layer writes to stderr.
//! Levels come from a preset, per-target `--log` overrides, or `RUST_LOG`.

use std::collections::BTreeMap;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const TARGET_PREFIX: &str = "tabtrail::";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Startup, navigation summaries and failures
    #[default]
    Production,
    /// Adds history and observer activity
    Verbose,
    /// Every decision the engine makes
    Debug,
    /// Including individual bridge frames
    Trace,
    /// Warnings and errors only
    Quiet,
}

impl LogPreset {
    fn directives(self) -> Vec<&'static str> {
        match self {
            LogPreset::Production => vec![
                "tabtrail::startup=info",
                "tabtrail::history=warn",
                "tabtrail::reconcile=warn",
                "tabtrail::nav=info",
                "tabtrail::feed=info",
                "tabtrail::menu=warn",
                "tabtrail::bridge=info",
                "tabtrail::http=info",
                "tower_http=warn",
            ],
            LogPreset::Verbose => vec!["tabtrail=info", "tower_http=info"],
            LogPreset::Debug => vec!["tabtrail=debug", "tabtrail::bridge::frame=off", "tower_http=debug"],
            LogPreset::Trace => vec!["tabtrail=trace", "tower_http=trace"],
            LogPreset::Quiet => vec!["tabtrail=warn", "tower_http=error"],
        }
    }
}

/// Logging configuration built from CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides, e.g. "tabtrail::nav" -> DEBUG.
    pub overrides: BTreeMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    /// Build from CLI flags. The quietest flag wins, then the most detailed.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        // "nav=debug,bridge=trace" or fully qualified targets.
        let overrides = log_overrides
            .iter()
            .flat_map(|spec| spec.split(','))
            .filter_map(|part| {
                let (target, level) = part.split_once('=')?;
                let level = parse_level(level.trim())?;
                Some((qualify_target(target.trim()), level))
            })
            .collect();

        Self {
            preset,
            overrides,
            format,
        }
    }

    /// `RUST_LOG` wins over everything else.
    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let mut directives: Vec<String> = self
            .preset
            .directives()
            .into_iter()
            .map(String::from)
            .collect();
        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level.as_str().to_lowercase()));
        }

        EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn qualify_target(target: &str) -> String {
    if target.starts_with(TARGET_PREFIX) || target == "tabtrail" || target == "tower_http" {
        target.to_string()
    } else {
        format!("{}{}", TARGET_PREFIX, target)
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(false)
                        .with_target(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_quiet_flag_wins() {
        let config = LogConfig::from_cli(true, true, true, true, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Quiet);
        let config = LogConfig::from_cli(true, true, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Debug);
        let config = LogConfig::from_cli(false, false, false, false, vec![], LogFormat::Json);
        assert_eq!(config.preset, LogPreset::Production);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides_are_qualified() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["nav=debug,bridge=trace".into(), "tabtrail::menu=warn".into()],
            LogFormat::Text,
        );
        assert_eq!(config.overrides.get("tabtrail::nav"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("tabtrail::bridge"), Some(&Level::TRACE));
        assert_eq!(config.overrides.get("tabtrail::menu"), Some(&Level::WARN));
    }

    #[test]
    fn test_bad_overrides_are_skipped() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["nav=loud".into(), "garbage".into(), "tower_http=info".into()],
            LogFormat::Text,
        );
        assert_eq!(config.overrides.len(), 1);
        assert_eq!(config.overrides.get("tower_http"), Some(&Level::INFO));
    }
}
