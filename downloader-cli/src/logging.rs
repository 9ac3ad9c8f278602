//! Dual-destination logging: human-readable lines on stderr, plus the
//! `<base>/log.txt` contract line format every front-end shares.

use std::fmt;
use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// `<ts> [<logger>] [<thread>] [<level>] <message>`, matching the archive
/// layout's log file contract.
struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        SystemTime.format_time(&mut writer)?;
        let metadata = event.metadata();
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("worker");
        write!(writer, " [{}] [{thread_name}] [{}] ", metadata.target(), metadata.level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Installs the global subscriber: an `EnvFilter`-gated stderr layer for the
/// operator plus a file layer writing `<data_dir>/log.txt` in the fixed
/// format. The returned guard must be held for the process lifetime or the
/// file writer's background thread drops queued lines on exit.
pub fn init(data_dir: &Path, verbose: u8, quiet: bool) -> anyhow::Result<WorkerGuard> {
    let default_level = level_filter(verbose, quiet);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_appender = tracing_appender::rolling::never(data_dir, "log.txt");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LogLineFormat);

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to install logging subscriber: {error}"))?;

    Ok(guard)
}
