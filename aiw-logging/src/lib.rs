//! Tracing setup shared by the service binaries.
//!
//! Everything is driven by environment variables:
//!
//! - `LOG_LEVEL`: default filter when `RUST_LOG` is unset (`info`)
//! - `LOG_FORMAT`: `human` or `json`
//! - `LOG_OUTPUT`: `console`, `file` or `both`
//! - `LOG_FILE_PATH`: file target, rolled daily (`/tmp/aiw-api.log`)
//! - `LOG_WORKSPACE`: only emit events recorded inside a span whose
//!   `workspace_id` field contains this value

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{field::Visit, span, subscriber::Interest, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Context, Layer},
    prelude::*,
    registry::LookupSpan,
    EnvFilter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
    pub workspace: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("none") | Some("off") => LogOutput::Off,
            _ => LogOutput::Console,
        };

        Self {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format,
            output,
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp/aiw-api.log")),
            workspace: lookup("LOG_WORKSPACE").filter(|s| !s.trim().is_empty()),
        }
    }
}

// --- Writer that duplicates output to two sinks ---
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

// --- Workspace scoping ---

/// `workspace_id` value recorded on a span, stored in its extensions.
struct WorkspaceTag(String);

struct WorkspaceIdVisitor<'a>(&'a mut Option<String>);

impl Visit for WorkspaceIdVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "workspace_id" {
            *self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "workspace_id" {
            *self.0 = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

/// Drops events that are not inside a span for the selected workspace.
struct WorkspaceFilterLayer {
    workspace: Option<String>,
}

impl<S> Layer<S> for WorkspaceFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if self.workspace.is_none() {
            return;
        }
        let mut workspace_id = None;
        attrs.record(&mut WorkspaceIdVisitor(&mut workspace_id));
        if let (Some(value), Some(span)) = (workspace_id, ctx.span(id)) {
            span.extensions_mut().insert(WorkspaceTag(value));
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        if self.workspace.is_none() {
            return;
        }
        let mut workspace_id = None;
        values.record(&mut WorkspaceIdVisitor(&mut workspace_id));
        if let (Some(value), Some(span)) = (workspace_id, ctx.span(id)) {
            span.extensions_mut().replace(WorkspaceTag(value));
        }
    }

    fn register_callsite(&self, _meta: &'static Metadata<'static>) -> Interest {
        // The answer depends on the current span, so it cannot be cached per callsite.
        if self.workspace.is_some() {
            Interest::sometimes()
        } else {
            Interest::always()
        }
    }

    fn enabled(&self, meta: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        let Some(wanted) = &self.workspace else {
            return true;
        };
        // Spans themselves must stay enabled so their fields can be inspected.
        if meta.is_span() {
            return true;
        }

        let Some(scope) = ctx.current_span().id().and_then(|id| ctx.span_scope(id)) else {
            return false;
        };

        scope.into_iter().any(|span| {
            span.extensions()
                .get::<WorkspaceTag>()
                .is_some_and(|tag| tag.0.contains(wanted.as_str()))
        })
    }
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// The returned guard must be held for the lifetime of the process when
/// file output is enabled, otherwise buffered lines are lost.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(LogSettings::from_env())
}

pub fn init_with(settings: LogSettings) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level))
        .add_directive("tokio=warn".parse().expect("static directive"))
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("sqlx=warn".parse().expect("static directive"));

    let workspace_layer = WorkspaceFilterLayer {
        workspace: settings.workspace.clone(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(workspace_layer);

    let log_dir = settings
        .file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("/tmp"))
        .to_path_buf();
    let log_filename = settings
        .file_path
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_else(|| "aiw-api.log".into());
    let is_json = settings.format == LogFormat::Json;

    macro_rules! finish {
        ($writer:expr) => {{
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer($writer);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
        }};
    }

    match settings.output {
        LogOutput::Console => {
            finish!(io::stdout);
            None
        }
        LogOutput::File => {
            let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            finish!(non_blocking);
            Some(guard)
        }
        LogOutput::Both => {
            let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            finish!(MakeTee {
                make_a: io::stdout,
                make_b: non_blocking,
            });
            Some(guard)
        }
        LogOutput::Off => {
            subscriber.init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.level, "info");
        assert_eq!(s.format, LogFormat::Human);
        assert_eq!(s.output, LogOutput::Console);
        assert_eq!(s.file_path, PathBuf::from("/tmp/aiw-api.log"));
        assert!(s.workspace.is_none());
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "json"),
            ("LOG_OUTPUT", "both"),
            ("LOG_FILE_PATH", "/var/log/aiw.log"),
            ("LOG_WORKSPACE", "demo"),
        ]);
        assert_eq!(s.level, "debug");
        assert_eq!(s.format, LogFormat::Json);
        assert_eq!(s.output, LogOutput::Both);
        assert_eq!(s.file_path, PathBuf::from("/var/log/aiw.log"));
        assert_eq!(s.workspace.as_deref(), Some("demo"));
    }

    #[test]
    fn test_blank_workspace_filter_is_ignored() {
        let s = settings(&[("LOG_WORKSPACE", "  ")]);
        assert!(s.workspace.is_none());
    }
}
