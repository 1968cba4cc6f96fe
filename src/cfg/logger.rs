// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{Event, Subscriber, span};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields,
        format::{JsonFields, Writer},
    },
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
};

/// Selects which of the two append-only log files a process writes to
/// (spec.md §7: "the two append-only log files, one per harvest mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    Ranking,
    DataStore,
}

impl HarvestMode {
    fn file_name(self) -> &'static str {
        match self {
            HarvestMode::Ranking => "ranking.log",
            HarvestMode::DataStore => "datastore.log",
        }
    }
}

#[derive(Default, Debug)]
struct SpanFields(pub serde_json::Map<String, serde_json::Value>);

struct CaptureSpanFieldsLayer;

impl<S> Layer<S> for CaptureSpanFieldsLayer
where S: Subscriber + for<'a> LookupSpan<'a>
{
    fn on_new_span(
        &self,
        attrs: &span::Attributes<'_>,
        id: &span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut map = serde_json::Map::with_capacity(8);
            let mut vis = FieldVisitor(&mut map);
            attrs.record(&mut vis);
            span.extensions_mut().insert(SpanFields(map));
        }
    }

    fn on_record(
        &self,
        id: &span::Id,
        values: &span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id)
            && let Some(fields) = span.extensions_mut().get_mut::<SpanFields>()
        {
            let mut vis = FieldVisitor(&mut fields.0);
            values.record(&mut vis);
        }
    }
}

struct FieldVisitor<'a>(&'a mut serde_json::Map<String, serde_json::Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn Debug) {
        self.0
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), json!(value));
    }
}

struct JsonFormatter;

#[derive(serde::Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    target: String,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut fields = serde_json::Map::new();
        let mut vis = FieldVisitor(&mut fields);
        event.record(&mut vis);

        if let Some(scope) = ctx.event_scope() {
            let mut span_names = Vec::with_capacity(4);
            for span in scope.from_root() {
                span_names.push(span.name().to_string());
                if let Some(ext) = span.extensions().get::<SpanFields>() {
                    for (k, v) in &ext.0 {
                        fields.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }
            fields.insert("span_names".to_string(), json!(span_names));
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            fields,
        };

        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?
        )
    }
}

/// Initializes the global `tracing` subscriber for one harvest-mode process
/// and returns the guard that must stay alive for the lifetime of the
/// process (dropping it flushes and stops the background writer thread).
///
/// Writes newline-delimited JSON to `<log_dir>/<mode>.log`, append-only
/// (`Rotation::NEVER`), plus whatever `RUST_LOG`/`level` selects via
/// `EnvFilter`.
pub fn init_logger(mode: HarvestMode, log_dir: &Path, level: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {log_dir:?}"))?;

    let appender = RollingFileAppender::new(Rotation::NEVER, log_dir, mode.file_name());
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level")?;

    let json_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .event_format(JsonFormatter)
        .fmt_fields(JsonFields::default());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(CaptureSpanFieldsLayer)
        .with(json_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install global tracing subscriber")?;

    Ok(guard)
}

/// Resolves the directory the two log files are written under, defaulting
/// to `./logs` relative to the current working directory.
pub fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
