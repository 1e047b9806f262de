//! Log setup for the command line tool.
//!
//! Events go to exactly one format sink (stderr or a log file) and optionally to the
//! journal as well. A level that does not parse fails the setup, an unavailable journal
//! only produces a warning.
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

const SYSLOG_IDENTIFIER: &str = "cgscope";

/// Debug builds log everything a developer may want to see, release builds only errors.
const DEFAULT_LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::DEBUG
} else {
    LevelFilter::ERROR
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub journald: bool,
}

impl From<&crate::Opts> for ObservabilityConfig {
    fn from(opts: &crate::Opts) -> Self {
        Self {
            log_level: opts.global.log_level.clone(),
            log_file: opts.global.log.clone(),
            log_format: opts.global.log_format,
            journald: opts.global.systemd_log,
        }
    }
}

fn parse_level(level: Option<&str>) -> Result<LevelFilter> {
    match level {
        None => Ok(DEFAULT_LOG_LEVEL),
        Some(level) => level
            .parse()
            .with_context(|| format!("invalid log level {level:?}")),
    }
}

fn format_layer(format: LogFormat, log_file: Option<&PathBuf>) -> Result<BoxedLayer> {
    let Some(path) = log_file else {
        let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        return Ok(match format {
            LogFormat::Text => layer.without_time().boxed(),
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
        });
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {path:?}"))?;
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(file));
    Ok(match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    })
}

fn journald_layer() -> Option<BoxedLayer> {
    match tracing_journald::layer() {
        Ok(layer) => Some(
            layer
                .with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned())
                .boxed(),
        ),
        Err(err) => {
            eprintln!("journald is not available, not logging to it: {err}");
            None
        }
    }
}

pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = parse_level(config.log_level.as_deref())?;

    let mut layers = vec![format_layer(config.log_format, config.log_file.as_ref())?];
    if config.journald {
        layers.extend(journald_layer());
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(level))
        .try_init()
        .context("failed to install the log subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("warn")).unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level(Some("trace")).unwrap(), LevelFilter::TRACE);
        assert_eq!(parse_level(Some("off")).unwrap(), LevelFilter::OFF);
        assert_eq!(parse_level(None).unwrap(), DEFAULT_LOG_LEVEL);
        assert!(parse_level(Some("verbose")).is_err());
    }

    #[test]
    fn test_unwritable_log_file() {
        let result = format_layer(
            LogFormat::Text,
            Some(&PathBuf::from("/nonexistent/dir/cgscope.log")),
        );
        assert!(result.is_err());
    }

    // the global subscriber can only be installed once per process, so this is the
    // only test that calls init
    #[test]
    fn test_json_logfile() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let log_file = temp_dir.path().join("test.log");
        std::fs::write(&log_file, "previous run\n")?;
        let config = ObservabilityConfig {
            log_file: Some(log_file.clone()),
            log_level: Some("info".to_owned()),
            log_format: LogFormat::Json,
            ..Default::default()
        };
        init(config)?;

        tracing::debug!("filtered out");
        tracing::error!(unit = "foo.scope", "testing json log");
        let data = std::fs::read_to_string(&log_file)?;
        assert!(data.starts_with("previous run\n"), "log file was truncated");
        assert!(!data.contains("filtered out"));
        // other tests of this binary may log concurrently once the subscriber is global
        let line = data
            .lines()
            .find(|l| l.contains("testing json log"))
            .expect("event is logged");
        let value: serde_json::Value = serde_json::from_str(line)?;
        assert_eq!(value["message"], "testing json log");
        assert_eq!(value["unit"], "foo.scope");
        assert_eq!(value["level"], "ERROR");

        Ok(())
    }
}
