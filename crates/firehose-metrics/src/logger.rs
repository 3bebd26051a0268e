// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for processes embedding the pipeline.
//!
//! Lines look like:
//! ```text
//! FIREHOSE_METRICS | WARN | Attempt 1/3 failed for 1 of 3 batches: Error shipping data: ...
//! ```
//!
//! The library itself only emits `tracing` events; [`init_from`] is for
//! binaries that have no subscriber of their own.

use crate::config::MetricsConfig;
use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "FIREHOSE_METRICS | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter for `log_level` with the HTTP stack silenced.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{log_level}"))
        .map_err(|e| format!("could not parse log level in configuration: {e}"))
}

/// Installs the global subscriber at the configured `log_level`.
pub fn init_from(config: &MetricsConfig) -> Result<(), String> {
    config.validate().map_err(|e| e.to_string())?;
    init(&config.log_level)
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init(log_level: &str) -> Result<(), String> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("setting default subscriber failed: {e}"))
}
