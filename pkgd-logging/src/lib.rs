//! Tracing setup shared by the pkgd binaries.
//!
//! Configuration comes from the environment:
//!
//! | Variable          | Values                      | Default           |
//! |-------------------|-----------------------------|-------------------|
//! | `PKGD_LOG_LEVEL`  | any `EnvFilter` directive   | `info`            |
//! | `PKGD_LOG_OUTPUT` | `console`, `file`, `both`   | `console`         |
//! | `PKGD_LOG_FORMAT` | `human`, `json`             | `human`           |
//! | `PKGD_LOG_FILE`   | path of the rolling log     | `/tmp/pkgd.log`   |
//!
//! `RUST_LOG`, when set, takes precedence over `PKGD_LOG_LEVEL`.

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/pkgd.log";

/// Noisy dependencies capped regardless of the requested level.
const QUIET_DIRECTIVES: [&str; 3] = ["tokio=warn", "hyper=warn", "tower_http=info"];

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
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

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            other => Err(format!("unknown log output '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::default(),
            format: LogFormat::default(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    /// Read `PKGD_LOG_*` variables. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            level: lookup("PKGD_LOG_LEVEL").unwrap_or(defaults.level),
            output: lookup("PKGD_LOG_OUTPUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.output),
            format: lookup("PKGD_LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            file: lookup("PKGD_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.file),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        QUIET_DIRECTIVES.iter().fold(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level)),
            |filter, directive| match directive.parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            },
        )
    }

    fn file_parts(&self) -> (&Path, &Path) {
        let dir = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/tmp"));
        let name = self
            .file
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("pkgd.log"));
        (dir, name)
    }
}

/// Install the global tracing subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the life of the process. Installing twice is a no-op.
pub fn init_subscriber(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(settings.env_filter());
    let is_json = settings.format == LogFormat::Json;
    let (log_dir, log_filename) = settings.file_parts();

    let mut guard: Option<WorkerGuard> = None;

    let installed = match settings.output {
        LogOutput::Both => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker);

            let tee_writer = MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            };
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer.with_ansi(false)).try_init()
            }
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer).try_init()
            }
        }
        LogOutput::File => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init()
            } else {
                subscriber.with(fmt_layer).try_init()
            }
        }
    };

    if installed.is_err() {
        return None;
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(settings(&[]), LogSettings::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let settings = settings(&[
            ("PKGD_LOG_LEVEL", "debug"),
            ("PKGD_LOG_OUTPUT", "both"),
            ("PKGD_LOG_FORMAT", "JSON"),
            ("PKGD_LOG_FILE", "/var/log/pkgd/server.log"),
        ]);
        assert_eq!(settings.level, "debug");
        assert_eq!(settings.output, LogOutput::Both);
        assert_eq!(settings.format, LogFormat::Json);

        let (dir, name) = settings.file_parts();
        assert_eq!(dir, Path::new("/var/log/pkgd"));
        assert_eq!(name, Path::new("server.log"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = settings(&[("PKGD_LOG_OUTPUT", "syslog"), ("PKGD_LOG_FORMAT", "xml")]);
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);
    }

    #[test]
    fn test_bare_file_name_logs_to_tmp() {
        let settings = settings(&[("PKGD_LOG_FILE", "pkgd.log")]);
        let (dir, name) = settings.file_parts();
        assert_eq!(dir, Path::new("/tmp"));
        assert_eq!(name, Path::new("pkgd.log"));
    }

    #[test]
    fn test_tee_writes_both() {
        let mut tee = Tee {
            a: Vec::new(),
            b: Vec::new(),
        };
        tee.write_all(b"line\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.a, b"line\n");
        assert_eq!(tee.b, b"line\n");
    }
}
