//! Logging setup shared by the nexus binaries.
//!
//! Everything is driven by environment variables so that the API server, test
//! harnesses and ad-hoc tools all pick up the same knobs:
//!
//! * `NEXUS_LOG_LEVEL`     - filter directive, default `info` (`RUST_LOG` wins if set)
//! * `NEXUS_LOG_OUTPUT`    - `console`, `file` or `both`
//! * `NEXUS_LOG_FORMAT`    - `human` or `json`
//! * `NEXUS_LOG_FILE_PATH` - rolling log file, default `/tmp/nexus.log`

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    None,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            "none" | "off" => LogOutput::None,
            _ => LogOutput::Console,
        }
    }

    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub output: LogOutput,
    pub json: bool,
    pub file_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            json: false,
            file_path: PathBuf::from("/tmp/nexus.log"),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env::var("NEXUS_LOG_LEVEL").unwrap_or(defaults.level),
            output: env::var("NEXUS_LOG_OUTPUT")
                .map(|v| LogOutput::parse(&v))
                .unwrap_or(defaults.output),
            json: env::var("NEXUS_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json),
            file_path: env::var("NEXUS_LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in ["tokio=warn", "hyper=warn", "tower_http=info"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

// Writes every buffer to both sinks; succeeds if either does.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// Initializes the global subscriber from `NEXUS_LOG_*` variables.
///
/// Keep the returned guard alive for the lifetime of the process when file
/// output is enabled, otherwise buffered lines are lost on exit.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogConfig::from_env())
}

/// Initializes the global subscriber from an explicit configuration.
pub fn init_with(config: &LogConfig) -> Option<WorkerGuard> {
    let subscriber = registry().with(config.env_filter());

    let log_dir = config
        .file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("/tmp"))
        .to_path_buf();
    let log_filename = config
        .file_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "nexus.log".into());

    let output = config.output;
    if output.console() && output.file() {
        let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let writer = MakeTee {
            make_a: io::stdout,
            make_b: non_blocking,
        };
        let layer = tracing_subscriber::fmt::layer().with_writer(writer);
        if config.json {
            subscriber.with(layer.json()).init();
        } else {
            subscriber.with(layer.pretty()).init();
        }
        Some(guard)
    } else if output.file() {
        let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking);
        if config.json {
            subscriber.with(layer.json()).init();
        } else {
            subscriber.with(layer).init();
        }
        Some(guard)
    } else if output.console() {
        let layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);
        if config.json {
            subscriber.with(layer.json()).init();
        } else {
            subscriber.with(layer.pretty()).init();
        }
        None
    } else {
        subscriber.init();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_parsing() {
        assert_eq!(LogOutput::parse("file"), LogOutput::File);
        assert_eq!(LogOutput::parse("BOTH"), LogOutput::Both);
        assert_eq!(LogOutput::parse("off"), LogOutput::None);
        assert_eq!(LogOutput::parse("anything-else"), LogOutput::Console);
    }

    #[test]
    fn test_tee_writes_to_both_sinks() {
        let mut tee = Tee {
            a: Vec::new(),
            b: Vec::new(),
        };
        tee.write_all(b"hello").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.a, b"hello");
        assert_eq!(tee.b, b"hello");
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.output, LogOutput::Console);
        assert!(!config.json);
    }
}
