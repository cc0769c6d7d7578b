use std::io::Error;
use std::io::Write;
use std::sync::OnceLock;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};
use ts_obs_config::Environment;

/// JSON field name for the application name in logs.
const APP_KEY_IN_LOG: &str = "app";
/// JSON field name for the Kubernetes namespace in logs.
const NAMESPACE_KEY_IN_LOG: &str = "namespace";
/// JSON field name for the Helm release in logs.
const RELEASE_KEY_IN_LOG: &str = "release";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Log flusher handle for ensuring logs are written before the process exits.
///
/// Production mode returns a [`WorkerGuard`] that must be kept alive until the
/// command finished. Development mode writes synchronously.
#[must_use]
pub enum LogFlusher {
    /// Flusher owning the non-blocking writer's background worker.
    Flusher(WorkerGuard),
    /// Development flusher that doesn't require explicit flushing.
    NullFlusher,
}

/// Identifies the release a command runs against, injected into every JSON log line.
#[derive(Debug, Clone)]
pub struct ReleaseRef {
    pub namespace: String,
    pub release: String,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test", "debug").expect("Failed to initialize tracing for tests");
        }
    });
}

static APP_NAME: OnceLock<String> = OnceLock::new();
static RELEASE_REF: OnceLock<ReleaseRef> = OnceLock::new();

/// Sets the release reference injected into all structured log entries.
pub fn set_global_release_ref(release_ref: ReleaseRef) {
    let _ = RELEASE_REF.set(release_ref);
}

/// Returns the release reference, if one has been set.
pub fn get_global_release_ref() -> Option<&'static ReleaseRef> {
    RELEASE_REF.get()
}

/// Writer wrapper that injects top-level fields into JSON log entries.
///
/// Fields already present in an entry are left untouched. Entries that are not
/// JSON objects are written as they are.
struct FieldInjectingWriter<W> {
    inner: W,
}

impl<W> FieldInjectingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

fn inject_field(map: &mut serde_json::Map<String, serde_json::Value>, key: &str, value: &str) -> bool {
    if map.contains_key(key) {
        return false;
    }

    map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    true
}

impl<W> Write for FieldInjectingWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(json_str) = std::str::from_utf8(buf)
            && let Ok(serde_json::Value::Object(mut map)) =
                serde_json::from_str::<serde_json::Value>(json_str)
        {
            let mut modified = false;

            if let Some(app_name) = APP_NAME.get() {
                modified |= inject_field(&mut map, APP_KEY_IN_LOG, app_name);
            }

            if let Some(release_ref) = get_global_release_ref() {
                modified |= inject_field(&mut map, NAMESPACE_KEY_IN_LOG, &release_ref.namespace);
                modified |= inject_field(&mut map, RELEASE_KEY_IN_LOG, &release_ref.release);
            }

            if modified && let Ok(modified) = serde_json::to_string(&map) {
                // Preserve trailing newline if present
                let output = if json_str.ends_with('\n') {
                    format!("{modified}\n")
                } else {
                    modified
                };

                // The caller only knows about the original buffer.
                return self.inner.write_all(output.as_bytes()).map(|_| buf.len());
            }
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Initializes tracing for the application.
///
/// `default_directive` is used when `RUST_LOG` is not set. Logs always go to
/// stderr so stdout only carries command results.
pub fn init_tracing(app_name: &str, default_directive: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with_release(app_name, default_directive, None)
}

/// Initializes tracing like [`init_tracing`], tagging JSON entries with the
/// release the command runs against.
pub fn init_tracing_with_release(
    app_name: &str,
    default_directive: &str,
    release_ref: Option<ReleaseRef>,
) -> Result<LogFlusher, TracingError> {
    let _ = APP_NAME.set(app_name.to_string());

    if let Some(release_ref) = release_ref {
        set_global_release_ref(release_ref);
    }

    // Capture records from crates logging through `log` (kube, sqlx).
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

/// Configures JSON logging to stderr through a non-blocking writer.
fn configure_prod_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || FieldInjectingWriter::new(writer.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Configures pretty-printed console logging to stderr.
fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Replaces the default panic hook so panics are also recorded by tracing.
///
/// The previous hook still runs afterwards.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
