use configuration::{LogFormat, LoggingSettings};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Must be held for the lifetime of the process or buffered file logs are lost.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// - console: human or JSON lines on stderr, routed through the indicatif
///   layer so progress bars are not torn by log output
/// - file: optional daily-rolling file at `settings.file`, non-blocking
///
/// `RUST_LOG` wins over the configured level.
pub fn init(settings: &LoggingSettings, format: LogFormat) -> anyhow::Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    let indicatif = IndicatifLayer::new();
    let console = match format {
        LogFormat::Console => fmt::layer()
            .with_writer(indicatif.get_stderr_writer())
            .with_target(false)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(indicatif.get_stderr_writer())
            .boxed(),
    };

    let (file_layer, file_guard) = match settings.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "tidewatch.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .with(indicatif)
        .try_init()?;

    Ok(LogGuard { _file: file_guard })
}
