use std::ffi::OsString;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging knobs read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `CM_LOG_DIR`: write `<dir>/<app>.log`, rotated daily, instead of stdout.
    pub log_dir: Option<PathBuf>,
    /// `CM_LOG_FORMAT=json` switches to one JSON object per line.
    pub format: LogFormat,
    /// `CM_LOG_INCLUDE_BACKTRACE`: also run the default panic hook.
    pub include_backtrace: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let text = |name: &str| lookup(name).and_then(|value| value.into_string().ok());

        Self {
            log_dir: lookup("CM_LOG_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            format: match text("CM_LOG_FORMAT") {
                Some(format) if format.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            include_backtrace: text("CM_LOG_INCLUDE_BACKTRACE")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Logs panics through `tracing` with thread and location. Installed once per
/// process no matter how often it is called.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();
        let include_backtrace = LoggingConfig::from_env().include_backtrace;

        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("unknown");

            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic payload not string".into());

            tracing::error!(
                application = app_name,
                %thread_name,
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %message,
                "panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn rotating_file_writer(app_name: &'static str, dir: &Path) -> Option<BoxMakeWriter> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        tracing::warn!(error = %err, "failed to create CM_LOG_DIR; falling back to stdout");
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(BoxMakeWriter::new(non_blocking))
}

/// Installs the global subscriber. `RUST_LOG` filters (default `info`);
/// see [`LoggingConfig`] for the rest.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let config = LoggingConfig::from_env();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = config
        .log_dir
        .as_ref()
        .and_then(|dir| rotating_file_writer(app_name, dir))
        .unwrap_or_else(|| BoxMakeWriter::new(std::io::stdout));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
